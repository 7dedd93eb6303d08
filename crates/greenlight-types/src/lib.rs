/// Shared types, traits, and errors for greenlight.
///
/// This crate is the foundation every other greenlight crate depends on.
/// It contains:
/// - **Data model** (`model`) for approval records, catalog entities and wizard views
/// - **Capability traits** (`traits`) for catalogs, the mediation authority and chat surfaces
/// - **Error types** (`errors`) for unified error handling
/// - **Config types** (`config`) and the directory loader (`config_loader`)
/// - **Tracing setup** (`telemetry`)
pub mod config;
pub mod config_loader;
pub mod errors;
pub mod model;
pub mod telemetry;
pub mod traits;

pub use errors::GreenlightError;
pub use model::*;
pub use traits::*;
