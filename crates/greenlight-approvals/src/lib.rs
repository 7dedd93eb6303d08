/// Approval state for greenlight.
///
/// - **Record store** (`store`): durable request → surfaces mapping
/// - **Decision applier** (`applier`): best-effort fan-out of a decision to every surface
/// - **Reaction handler** (`reactions`): admin reactions as decisions
/// - **Reconciler** (`reconcile`): sweeps against the mediation authority
/// - **Supervisor** (`supervisor`): trigger points and the retry schedule
pub mod applier;
pub mod locks;
pub mod reactions;
pub mod reconcile;
pub mod store;
pub mod supervisor;

#[cfg(test)]
mod testing;

pub use applier::{DecisionApplier, SurfaceOutcome, SurfaceReport};
pub use locks::RequestLocks;
pub use reactions::{extract_request_id, request_marker, ReactionHandler, ReactionOutcome};
pub use reconcile::{Reconciler, ReconcilerDeps, SweepOutcome, SweepReport};
pub use store::ApprovalStore;
pub use supervisor::{ConnectionMonitor, ReconcileSupervisor};
