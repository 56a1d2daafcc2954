//! Tool error types.

use thiserror::Error;

/// Errors raised by charm plumbing.
#[derive(Debug, Error)]
pub enum ToolError {
    /// Process could not be spawned or awaited.
    #[error("Process error: {0}")]
    Process(String),

    /// Process ran but exited non-zero.
    #[error("Command `{command}` exited with code {code}: {stderr}")]
    CommandFailed {
        command: String,
        code: i32,
        stderr: String,
    },

    /// Process exceeded its time budget.
    #[error("Command `{command}` timed out after {seconds} seconds")]
    Timeout { command: String, seconds: u64 },

    /// Invalid configuration value.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Template rendering error.
    #[error("Template error: {0}")]
    Template(String),

    /// Hook tool returned something we could not interpret.
    #[error("Hook tool error: {0}")]
    HookTool(String),

    /// Credential file could not be parsed.
    #[error("Credential parse error: {0}")]
    Credentials(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for ToolError {
    fn from(e: std::io::Error) -> Self {
        ToolError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for ToolError {
    fn from(e: serde_json::Error) -> Self {
        ToolError::Json(e.to_string())
    }
}

impl From<minijinja::Error> for ToolError {
    fn from(e: minijinja::Error) -> Self {
        ToolError::Template(e.to_string())
    }
}

impl From<dotenvy::Error> for ToolError {
    fn from(e: dotenvy::Error) -> Self {
        ToolError::Credentials(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ToolError::CommandFailed {
            command: "apt-get install murano-api".to_string(),
            code: 100,
            stderr: "E: Unable to locate package".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Command `apt-get install murano-api` exited with code 100: E: Unable to locate package"
        );

        let err = ToolError::Timeout {
            command: "murano-db-manage".to_string(),
            seconds: 30,
        };
        assert_eq!(
            err.to_string(),
            "Command `murano-db-manage` timed out after 30 seconds"
        );
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let tool_err: ToolError = io_err.into();
        assert!(matches!(tool_err, ToolError::Io(_)));
    }
}
