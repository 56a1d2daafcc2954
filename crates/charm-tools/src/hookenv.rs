//! Access to the Juju hook environment.
//!
//! Hook tools (`config-get`, `relation-get`, `status-set`, ...) are only
//! available while a hook is executing. [`JujuHookTools`] invokes them
//! through a [`CommandRunner`] and decodes their JSON output.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::command::{CommandRunner, CommandSpec};
use crate::error::ToolError;

/// Relation settings as exchanged over a relation.
pub type RelationSettings = BTreeMap<String, String>;

/// Workload status states understood by `status-set`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusState {
    Maintenance,
    Waiting,
    Blocked,
    Active,
}

impl std::fmt::Display for StatusState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Maintenance => write!(f, "maintenance"),
            Self::Waiting => write!(f, "waiting"),
            Self::Blocked => write!(f, "blocked"),
            Self::Active => write!(f, "active"),
        }
    }
}

/// A workload status with its message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadStatus {
    pub state: StatusState,
    pub message: String,
}

impl WorkloadStatus {
    pub fn new(state: StatusState, message: impl Into<String>) -> Self {
        Self {
            state,
            message: message.into(),
        }
    }

    pub fn active(message: impl Into<String>) -> Self {
        Self::new(StatusState::Active, message)
    }

    pub fn blocked(message: impl Into<String>) -> Self {
        Self::new(StatusState::Blocked, message)
    }

    pub fn waiting(message: impl Into<String>) -> Self {
        Self::new(StatusState::Waiting, message)
    }

    pub fn maintenance(message: impl Into<String>) -> Self {
        Self::new(StatusState::Maintenance, message)
    }
}

/// The hook tools a charm needs.
#[async_trait]
pub trait HookTools: Send + Sync {
    /// The charm's configuration as a JSON object.
    async fn config(&self) -> Result<serde_json::Value, ToolError>;

    /// This unit's private address.
    async fn unit_private_address(&self) -> Result<String, ToolError>;

    /// Relation ids established on an endpoint.
    async fn relation_ids(&self, endpoint: &str) -> Result<Vec<String>, ToolError>;

    /// Remote units participating in a relation.
    async fn related_units(&self, relation_id: &str) -> Result<Vec<String>, ToolError>;

    /// Settings published by a remote unit.
    async fn relation_get(
        &self,
        relation_id: &str,
        unit: &str,
    ) -> Result<RelationSettings, ToolError>;

    /// Publish settings on a relation for this unit.
    async fn relation_set(
        &self,
        relation_id: &str,
        settings: &RelationSettings,
    ) -> Result<(), ToolError>;

    /// Set the unit's workload status.
    async fn status_set(&self, status: &WorkloadStatus) -> Result<(), ToolError>;

    /// Whether this unit is the application leader.
    async fn is_leader(&self) -> Result<bool, ToolError>;

    /// Open a TCP port for the unit.
    async fn open_port(&self, port: u16) -> Result<(), ToolError>;
}

/// [`HookTools`] backed by the real Juju hook tool binaries.
#[derive(Clone)]
pub struct JujuHookTools {
    runner: Arc<dyn CommandRunner>,
}

impl JujuHookTools {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    async fn json<T: serde::de::DeserializeOwned>(&self, spec: CommandSpec) -> Result<T, ToolError> {
        let output = self.runner.check(&spec).await?;
        let stdout = output.trimmed_stdout();
        // Some hook tools print nothing instead of `null`.
        let stdout = if stdout.is_empty() { "null" } else { stdout };
        serde_json::from_str(stdout)
            .map_err(|e| ToolError::HookTool(format!("`{}` returned invalid JSON: {}", spec, e)))
    }
}

impl std::fmt::Debug for JujuHookTools {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JujuHookTools").finish_non_exhaustive()
    }
}

#[async_trait]
impl HookTools for JujuHookTools {
    async fn config(&self) -> Result<serde_json::Value, ToolError> {
        let value: Option<serde_json::Value> = self
            .json(CommandSpec::new("config-get").arg("--format=json"))
            .await?;
        Ok(value.unwrap_or_else(|| serde_json::json!({})))
    }

    async fn unit_private_address(&self) -> Result<String, ToolError> {
        let output = self
            .runner
            .check(&CommandSpec::new("unit-get").arg("private-address"))
            .await?;
        let address = output.trimmed_stdout();
        if address.is_empty() {
            return Err(ToolError::HookTool("unit-get returned no private-address".to_string()));
        }
        Ok(address.to_string())
    }

    async fn relation_ids(&self, endpoint: &str) -> Result<Vec<String>, ToolError> {
        let ids: Option<Vec<String>> = self
            .json(CommandSpec::new("relation-ids").args([endpoint, "--format=json"]))
            .await?;
        Ok(ids.unwrap_or_default())
    }

    async fn related_units(&self, relation_id: &str) -> Result<Vec<String>, ToolError> {
        let units: Option<Vec<String>> = self
            .json(CommandSpec::new("relation-list").args(["-r", relation_id, "--format=json"]))
            .await?;
        Ok(units.unwrap_or_default())
    }

    async fn relation_get(
        &self,
        relation_id: &str,
        unit: &str,
    ) -> Result<RelationSettings, ToolError> {
        let raw: Option<BTreeMap<String, serde_json::Value>> = self
            .json(CommandSpec::new("relation-get").args([
                "-r",
                relation_id,
                "--format=json",
                "-",
                unit,
            ]))
            .await?;

        Ok(raw
            .unwrap_or_default()
            .into_iter()
            .filter_map(|(k, v)| match v {
                serde_json::Value::Null => None,
                serde_json::Value::String(s) => Some((k, s)),
                other => Some((k, other.to_string())),
            })
            .collect())
    }

    async fn relation_set(
        &self,
        relation_id: &str,
        settings: &RelationSettings,
    ) -> Result<(), ToolError> {
        let spec = CommandSpec::new("relation-set")
            .args(["-r", relation_id])
            .args(settings.iter().map(|(k, v)| format!("{k}={v}")));
        self.runner.check(&spec).await?;
        Ok(())
    }

    async fn status_set(&self, status: &WorkloadStatus) -> Result<(), ToolError> {
        let spec = CommandSpec::new("status-set")
            .arg(status.state.to_string())
            .arg(status.message.clone());
        self.runner.check(&spec).await?;
        Ok(())
    }

    async fn is_leader(&self) -> Result<bool, ToolError> {
        let leader: Option<bool> = self
            .json(CommandSpec::new("is-leader").arg("--format=json"))
            .await?;
        Ok(leader.unwrap_or(false))
    }

    async fn open_port(&self, port: u16) -> Result<(), ToolError> {
        self.runner
            .check(&CommandSpec::new("open-port").arg(format!("{port}/tcp")))
            .await?;
        Ok(())
    }
}
