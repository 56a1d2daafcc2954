//! In-memory hook environment and command recorder for tests.

use async_trait::async_trait;
use charm_tools::hookenv::RelationSettings;
use charm_tools::{CommandOutput, CommandRunner, CommandSpec, HookTools, ToolError, WorkloadStatus};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use crate::charm::MuranoCharm;
use crate::options::CharmOptions;
use crate::settings::Settings;

/// Records every command and answers from a small set of rules.
#[derive(Default)]
pub(crate) struct RecordingRunner {
    calls: Mutex<Vec<CommandSpec>>,
    failing: Mutex<Vec<String>>,
    stopped: Mutex<Vec<String>>,
}

impl RecordingRunner {
    /// Make every command whose rendering starts with `prefix` exit 1.
    pub(crate) fn fail_on(&self, prefix: &str) {
        self.failing.lock().unwrap().push(prefix.to_string());
    }

    /// Report `service` as inactive to `systemctl is-active`.
    pub(crate) fn stop_service(&self, service: &str) {
        self.stopped.lock().unwrap().push(service.to_string());
    }

    pub(crate) fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().unwrap().clone()
    }

    /// Rendered command lines, in call order.
    pub(crate) fn lines(&self) -> Vec<String> {
        self.calls().iter().map(ToString::to_string).collect()
    }

    /// How many recorded command lines start with `prefix`.
    pub(crate) fn count(&self, prefix: &str) -> usize {
        self.lines().iter().filter(|l| l.starts_with(prefix)).count()
    }
}

#[async_trait]
impl CommandRunner for RecordingRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, ToolError> {
        self.calls.lock().unwrap().push(spec.clone());
        let line = spec.to_string();

        if self.failing.lock().unwrap().iter().any(|p| line.starts_with(p)) {
            return Ok(CommandOutput::from_exit(1, String::new(), "failed".to_string()));
        }
        if spec.program == "systemctl" && spec.args.first().map(String::as_str) == Some("is-active") {
            let stopped = self.stopped.lock().unwrap();
            if spec.args.iter().any(|a| stopped.contains(a)) {
                return Ok(CommandOutput::from_exit(3, String::new(), String::new()));
            }
        }
        Ok(CommandOutput::ok())
    }
}

struct Inner {
    root: tempfile::TempDir,
    config: Mutex<serde_json::Value>,
    address: Mutex<String>,
    leader: Mutex<bool>,
    remote: Mutex<BTreeMap<String, BTreeMap<String, RelationSettings>>>,
    local: Mutex<BTreeMap<String, RelationSettings>>,
    statuses: Mutex<Vec<WorkloadStatus>>,
    ports: Mutex<Vec<u16>>,
    runner: Arc<RecordingRunner>,
}

/// A unit with in-memory relations, config and status.
#[derive(Clone)]
pub(crate) struct FakeUnit {
    inner: Arc<Inner>,
}

pub(crate) fn identity_settings() -> RelationSettings {
    settings(&[
        ("service_host", "10.0.0.2"),
        ("service_port", "5000"),
        ("auth_host", "10.0.0.2"),
        ("auth_port", "35357"),
        ("service_tenant", "services"),
        ("service_username", "murano"),
        ("service_password", "idpw"),
    ])
}

fn settings(pairs: &[(&str, &str)]) -> RelationSettings {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

impl FakeUnit {
    pub(crate) fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                root: tempfile::tempdir().unwrap(),
                config: Mutex::new(serde_json::json!({})),
                address: Mutex::new("10.0.0.5".to_string()),
                leader: Mutex::new(true),
                remote: Mutex::new(BTreeMap::new()),
                local: Mutex::new(BTreeMap::new()),
                statuses: Mutex::new(Vec::new()),
                ports: Mutex::new(Vec::new()),
                runner: Arc::new(RecordingRunner::default()),
            }),
        }
    }

    /// Merge keys into the charm config.
    pub(crate) fn with_config(self, values: serde_json::Value) -> Self {
        {
            let mut config = self.inner.config.lock().unwrap();
            if let (Some(config), Some(values)) = (config.as_object_mut(), values.as_object()) {
                for (k, v) in values {
                    config.insert(k.clone(), v.clone());
                }
            }
        }
        self
    }

    pub(crate) fn with_database(self) -> Self {
        self.join("shared-db:1", "mysql/0");
        self.publish(
            "shared-db:1",
            "mysql/0",
            &[("db_host", "10.0.0.3"), ("password", "dbpw")],
        );
        self
    }

    pub(crate) fn with_amqp(self) -> Self {
        self.join("amqp:2", "rabbitmq-server/0");
        self.publish(
            "amqp:2",
            "rabbitmq-server/0",
            &[("hostname", "10.0.0.4"), ("password", "mqpw")],
        );
        self
    }

    pub(crate) fn with_identity(self) -> Self {
        self.join("identity-service:3", "keystone/0");
        let pairs = identity_settings();
        self.inner
            .remote
            .lock()
            .unwrap()
            .entry("identity-service:3".to_string())
            .or_default()
            .insert("keystone/0".to_string(), pairs);
        self
    }

    /// A remote unit joins a relation without publishing anything.
    pub(crate) fn join(&self, relation_id: &str, unit: &str) {
        self.inner
            .remote
            .lock()
            .unwrap()
            .entry(relation_id.to_string())
            .or_default()
            .entry(unit.to_string())
            .or_default();
    }

    /// A remote unit publishes settings.
    pub(crate) fn publish(&self, relation_id: &str, unit: &str, pairs: &[(&str, &str)]) {
        self.inner
            .remote
            .lock()
            .unwrap()
            .entry(relation_id.to_string())
            .or_default()
            .entry(unit.to_string())
            .or_default()
            .extend(settings(pairs));
    }

    /// The relation is broken: remote units and their data disappear.
    pub(crate) fn remove_relation(&self, relation_id: &str) {
        self.inner.remote.lock().unwrap().remove(relation_id);
    }

    pub(crate) fn local_settings(&self, relation_id: &str) -> RelationSettings {
        self.inner
            .local
            .lock()
            .unwrap()
            .get(relation_id)
            .cloned()
            .unwrap_or_default()
    }

    pub(crate) fn set_address(&self, address: &str) {
        *self.inner.address.lock().unwrap() = address.to_string();
    }

    pub(crate) fn set_leader(&self, leader: bool) {
        *self.inner.leader.lock().unwrap() = leader;
    }

    pub(crate) fn statuses(&self) -> Vec<WorkloadStatus> {
        self.inner.statuses.lock().unwrap().clone()
    }

    pub(crate) fn ports(&self) -> Vec<u16> {
        self.inner.ports.lock().unwrap().clone()
    }

    pub(crate) fn runner(&self) -> Arc<RecordingRunner> {
        self.inner.runner.clone()
    }

    /// Settings with every path under this unit's temporary root.
    pub(crate) fn settings(&self) -> Settings {
        Settings::rooted_at(self.inner.root.path())
    }

    pub(crate) fn charm(&self) -> MuranoCharm {
        let config = self.inner.config.lock().unwrap().clone();
        MuranoCharm::new(
            CharmOptions::from_config(&config).unwrap(),
            self.settings(),
            Arc::new(self.clone()),
            self.inner.runner.clone(),
        )
        .unwrap()
    }
}

#[async_trait]
impl HookTools for FakeUnit {
    async fn config(&self) -> Result<serde_json::Value, ToolError> {
        Ok(self.inner.config.lock().unwrap().clone())
    }

    async fn unit_private_address(&self) -> Result<String, ToolError> {
        Ok(self.inner.address.lock().unwrap().clone())
    }

    async fn relation_ids(&self, endpoint: &str) -> Result<Vec<String>, ToolError> {
        Ok(self
            .inner
            .remote
            .lock()
            .unwrap()
            .keys()
            .filter(|id| id.split(':').next() == Some(endpoint))
            .cloned()
            .collect())
    }

    async fn related_units(&self, relation_id: &str) -> Result<Vec<String>, ToolError> {
        Ok(self
            .inner
            .remote
            .lock()
            .unwrap()
            .get(relation_id)
            .map(|units| units.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn relation_get(
        &self,
        relation_id: &str,
        unit: &str,
    ) -> Result<RelationSettings, ToolError> {
        Ok(self
            .inner
            .remote
            .lock()
            .unwrap()
            .get(relation_id)
            .and_then(|units| units.get(unit))
            .cloned()
            .unwrap_or_default())
    }

    async fn relation_set(
        &self,
        relation_id: &str,
        settings: &RelationSettings,
    ) -> Result<(), ToolError> {
        self.inner
            .local
            .lock()
            .unwrap()
            .entry(relation_id.to_string())
            .or_default()
            .extend(settings.clone());
        Ok(())
    }

    async fn status_set(&self, status: &WorkloadStatus) -> Result<(), ToolError> {
        self.inner.statuses.lock().unwrap().push(status.clone());
        Ok(())
    }

    async fn is_leader(&self) -> Result<bool, ToolError> {
        Ok(*self.inner.leader.lock().unwrap())
    }

    async fn open_port(&self, port: u16) -> Result<(), ToolError> {
        self.inner.ports.lock().unwrap().push(port);
        Ok(())
    }
}
