/// Mediation authority adapters for greenlight.
///
/// - **Overseerr** (`overseerr`): request status and decisions over the v1 HTTP API
pub mod overseerr;

pub use overseerr::OverseerrAuthority;
