//! Error types for the Murano charm.

use charm_tools::ToolError;
use thiserror::Error;

/// Errors that abort a hook execution.
///
/// Every variant is fatal for the current hook: the process exits non-zero,
/// Juju marks the unit as errored and replays the hook later.
#[derive(Error, Debug)]
pub enum CharmError {
    /// A required charm option is unset.
    #[error("Missing configuration option: {0}")]
    MissingConfig(String),

    /// A charm option has an unusable value.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Process settings could not be loaded.
    #[error("Settings error: {0}")]
    Settings(String),

    /// Hook tool, command or template failure.
    #[error(transparent)]
    Tool(#[from] ToolError),

    /// Relation data is missing or malformed.
    #[error("Relation error: {0}")]
    Relation(String),

    /// Unit state could not be loaded or saved.
    #[error("State error: {0}")]
    State(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias using CharmError.
pub type CharmResult<T> = Result<T, CharmError>;

impl From<envy::Error> for CharmError {
    fn from(err: envy::Error) -> Self {
        CharmError::Settings(err.to_string())
    }
}

impl From<serde_yaml::Error> for CharmError {
    fn from(err: serde_yaml::Error) -> Self {
        CharmError::InvalidConfig(err.to_string())
    }
}
