/// Stateless selection wizard for greenlight.
///
/// - **Token codec** (`token`): wizard state in component custom ids
/// - **Policy** (`policy`) and **paging** (`paging`): which affordances a list offers
/// - **Views** (`views`): response builders
/// - **Wizard** (`wizard`) and **dispatch** (`dispatch`): the multi-step flow
pub mod context;
pub mod dispatch;
pub mod paging;
pub mod policy;
pub mod token;
pub mod views;
pub mod wizard;

#[cfg(test)]
mod testing;

pub use dispatch::{DispatchOutcome, InteractionDispatcher};
pub use token::{ActionKind, DecodeError, TokenError, WizardToken};
pub use wizard::{SelectionWizard, WizardDeps, WizardStep};
