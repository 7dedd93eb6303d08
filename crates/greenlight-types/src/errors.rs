/// Unified error type for greenlight.
///
/// Capability traits and cross-crate APIs return this type. Component
/// boundaries decide which variants are contained and which surface to the
/// user as a generic retry leaf.
#[derive(Debug, thiserror::Error)]
pub enum GreenlightError {
    /// A media catalog backend was unreachable or returned an unexpected payload.
    #[error("catalog error: {0}")]
    Catalog(String),

    /// A chat surface (channel, message, DM) could not be read or edited.
    #[error("surface error: {0}")]
    Surface(String),

    /// The approval state file could not be read or written.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// The mediation authority rejected a call or could not be reached.
    #[error("authority error: {0}")]
    Authority(String),

    /// Error from configuration loading or validation.
    #[error("config error: {0}")]
    Config(String),

    /// Serialization or deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Generic internal error for unexpected conditions.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for GreenlightError {
    fn from(err: serde_json::Error) -> Self {
        GreenlightError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for GreenlightError {
    fn from(err: serde_yaml::Error) -> Self {
        GreenlightError::Serialization(err.to_string())
    }
}
