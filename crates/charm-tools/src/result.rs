//! Command execution result types.

use serde::{Deserialize, Serialize};

/// Outcome class of a finished command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandStatus {
    /// Exit code zero.
    Success,
    /// Non-zero exit code, or killed by a signal.
    Failed,
}

impl CommandStatus {
    /// Returns true if the status indicates success.
    pub fn is_success(&self) -> bool {
        matches!(self, CommandStatus::Success)
    }
}

impl std::fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommandStatus::Success => write!(f, "success"),
            CommandStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Captured output of a finished command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandOutput {
    /// Execution status.
    pub status: CommandStatus,

    /// Exit code, `-1` when the process was terminated by a signal.
    pub exit_code: i32,

    /// Standard output.
    pub stdout: String,

    /// Standard error.
    pub stderr: String,

    /// Execution duration in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl CommandOutput {
    /// Build an output record from an exit code and captured streams.
    pub fn from_exit(exit_code: i32, stdout: String, stderr: String) -> Self {
        let status = if exit_code == 0 {
            CommandStatus::Success
        } else {
            CommandStatus::Failed
        };

        Self {
            status,
            exit_code,
            stdout,
            stderr,
            duration_ms: None,
        }
    }

    /// A successful, empty result.
    pub fn ok() -> Self {
        Self::from_exit(0, String::new(), String::new())
    }

    /// A successful result with the given stdout.
    pub fn with_stdout(stdout: impl Into<String>) -> Self {
        Self::from_exit(0, stdout.into(), String::new())
    }

    /// Set the execution duration.
    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    /// Returns true if the command exited zero.
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Stdout with surrounding whitespace removed.
    pub fn trimmed_stdout(&self) -> &str {
        self.stdout.trim()
    }
}
