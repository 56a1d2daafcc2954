//! External command execution.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;

use crate::error::ToolError;
use crate::result::CommandOutput;

/// A single command invocation: program, argv and environment overrides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    /// Program to execute (resolved through `PATH`).
    pub program: String,

    /// Arguments, passed verbatim (no shell).
    #[serde(default)]
    pub args: Vec<String>,

    /// Extra environment variables layered over the inherited environment.
    #[serde(default)]
    pub env: BTreeMap<String, String>,

    /// Working directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cwd: Option<PathBuf>,

    /// Per-command timeout; falls back to the runner's default.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
}

impl CommandSpec {
    /// Create a command with no arguments.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
            cwd: None,
            timeout_seconds: None,
        }
    }

    /// Create a command from a full argv (`argv[0]` is the program).
    pub fn from_argv<S: AsRef<str>>(argv: &[S]) -> Self {
        let mut iter = argv.iter().map(|s| s.as_ref().to_string());
        let program = iter.next().unwrap_or_default();
        Self::new(program).args(iter)
    }

    /// Append one argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set one environment variable.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Set several environment variables.
    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (k, v) in vars {
            self.env.insert(k.into(), v.into());
        }
        self
    }

    /// Set the working directory.
    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Set the timeout in seconds.
    pub fn timeout_seconds(mut self, seconds: u64) -> Self {
        self.timeout_seconds = Some(seconds);
        self
    }

    /// The full argv as a vector.
    pub fn argv(&self) -> Vec<&str> {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect()
    }
}

impl std::fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.argv().join(" "))
    }
}

/// Something that can run commands.
///
/// The hook executable talks to the host only through this trait so the
/// orchestration logic can be exercised without touching the system.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run the command and capture its output. A non-zero exit is not an error.
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, ToolError>;

    /// Run the command and fail on a non-zero exit.
    async fn check(&self, spec: &CommandSpec) -> Result<CommandOutput, ToolError> {
        let output = self.run(spec).await?;
        if output.is_success() {
            Ok(output)
        } else {
            Err(ToolError::CommandFailed {
                command: spec.to_string(),
                code: output.exit_code,
                stderr: output.stderr.trim().to_string(),
            })
        }
    }
}

/// Runs commands on the local system with `tokio::process`.
#[derive(Debug, Clone, Default)]
pub struct SystemRunner {
    default_timeout: Option<Duration>,
}

impl SystemRunner {
    /// Create a runner without a default timeout.
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a timeout to every command that does not set its own.
    pub fn with_default_timeout(mut self, duration: Duration) -> Self {
        self.default_timeout = Some(duration);
        self
    }
}

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, ToolError> {
        let start = std::time::Instant::now();

        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .envs(&spec.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(dir) = &spec.cwd {
            cmd.current_dir(dir);
        }

        tracing::debug!(command = %spec, "Executing command");

        let child = cmd
            .spawn()
            .map_err(|e| ToolError::Process(format!("Failed to spawn `{}`: {}", spec.program, e)))?;

        let limit = spec
            .timeout_seconds
            .map(Duration::from_secs)
            .or(self.default_timeout);

        // Dropping the future on timeout drops the child, which kills it.
        let waited = match limit {
            Some(duration) => match timeout(duration, child.wait_with_output()).await {
                Ok(result) => result,
                Err(_) => {
                    return Err(ToolError::Timeout {
                        command: spec.to_string(),
                        seconds: duration.as_secs(),
                    })
                }
            },
            None => child.wait_with_output().await,
        };

        let output = waited
            .map_err(|e| ToolError::Process(format!("Failed to wait for `{}`: {}", spec.program, e)))?;

        let exit_code = output.status.code().unwrap_or(-1);
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        let duration_ms = start.elapsed().as_millis() as u64;

        tracing::debug!(
            command = %spec,
            exit_code,
            duration_ms,
            "Command finished"
        );

        Ok(CommandOutput::from_exit(exit_code, stdout, stderr).with_duration(duration_ms))
    }
}
