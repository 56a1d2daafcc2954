//! Hook dispatch.
//!
//! A hook run loads the persisted flags, probes the relations, turns the
//! hook name plus whatever the relations currently show into events, feeds them to the state
//! machine and executes the resulting actions in order. State is saved only
//! when every action succeeded; on failure Juju replays the hook against the
//! previous state.

use chrono::Utc;
use serde::Serialize;

use crate::charm::MuranoCharm;
use crate::error::CharmResult;
use crate::ha;
use crate::lifecycle;
use crate::relations::{self, Interface, Probe, RelationSnapshot, HA_ENDPOINT};
use crate::state::{Action, Event, Flag, FlagSet, Machine, Plan, Stage, StateStore, UnitState};
use crate::status;

/// Events named by the hook itself.
pub fn hook_events(hook: &str) -> Vec<Event> {
    match hook {
        "install" => return vec![Event::Install],
        "upgrade-charm" => return vec![Event::UpgradeCharm],
        "config-changed" => return vec![Event::ConfigChanged],
        "update-status" => return vec![Event::UpdateStatus],
        _ => {}
    }

    if let Some(endpoint) = hook.strip_suffix("-relation-joined") {
        if endpoint == HA_ENDPOINT {
            return vec![Event::HaJoined];
        }
        if let Some(interface) = Interface::from_endpoint(endpoint) {
            return vec![Event::RelationJoined(interface)];
        }
    }
    if let Some(endpoint) = hook.strip_suffix("-relation-changed") {
        if endpoint == HA_ENDPOINT {
            return vec![Event::HaJoined];
        }
        if let Some(interface) = Interface::from_endpoint(endpoint) {
            return vec![Event::RelationChanged(interface)];
        }
    }

    vec![Event::UpdateStatus]
}

/// Current state of every required relation.
async fn probe_all(charm: &MuranoCharm) -> CharmResult<Vec<(Interface, Probe)>> {
    let mut probes = Vec::with_capacity(Interface::ALL.len());
    for interface in Interface::ALL {
        probes.push((interface, relations::probe(charm.unit(), interface).await?));
    }
    Ok(probes)
}

/// Events for relation progress not yet recorded in the flags.
fn discovered_events(probes: &[(Interface, Probe)], flags: &FlagSet) -> Vec<Event> {
    let mut events = Vec::new();
    for (interface, found) in probes {
        if found.connected && !flags.contains(Flag::connected(*interface)) {
            events.push(Event::RelationJoined(*interface));
        }
        if found.available && !flags.contains(Flag::available(*interface)) {
            events.push(Event::RelationAvailable(*interface));
        }
    }
    events
}

/// Result of one hook execution.
#[derive(Debug, Clone, Serialize)]
pub struct HookOutcome {
    pub hook: String,
    pub actions: Vec<Action>,
    pub stage: Stage,
    pub state: UnitState,
}

/// Run one hook to completion.
pub async fn run_hook(charm: &MuranoCharm, store: &StateStore, hook: &str) -> CharmResult<HookOutcome> {
    let mut state = store.load().await?;
    let mut machine = Machine::new(state.flags.clone());
    let mut plan = Plan::default();

    let probes = probe_all(charm).await?;
    machine.observe(&probes);

    for event in hook_events(hook) {
        machine.apply(event, &mut plan);
    }
    for event in discovered_events(&probes, machine.flags()) {
        tracing::debug!(event = ?event, "Relation progress discovered");
        machine.apply(event, &mut plan);
    }

    let actions = plan.into_actions();
    tracing::info!(hook, actions = ?actions, stage = %machine.stage(), "Dispatching hook");

    let mut executor = Executor {
        charm,
        machine: &mut machine,
        snapshot: None,
    };
    for action in &actions {
        executor.run(*action).await?;
    }

    let stage = machine.stage();
    state.flags = machine.into_flags();
    state.last_hook = Some(hook.to_string());
    state.updated_at = Some(Utc::now());
    store.save(&state).await?;

    Ok(HookOutcome {
        hook: hook.to_string(),
        actions,
        stage,
        state,
    })
}

struct Executor<'a> {
    charm: &'a MuranoCharm,
    machine: &'a mut Machine,
    snapshot: Option<RelationSnapshot>,
}

impl Executor<'_> {
    async fn relation_data(&mut self) -> CharmResult<&RelationSnapshot> {
        let snapshot = match self.snapshot.take() {
            Some(snapshot) => snapshot,
            None => relations::snapshot(self.charm.unit()).await?,
        };
        Ok(&*self.snapshot.insert(snapshot))
    }

    async fn run(&mut self, action: Action) -> CharmResult<()> {
        tracing::debug!(action = ?action, "Running action");
        let charm = self.charm;

        match action {
            Action::Install => lifecycle::install(charm).await?,
            Action::RequestDatabase => relations::request_database(charm).await?,
            Action::RequestAmqp => relations::request_amqp(charm).await?,
            Action::RegisterEndpoints => relations::register_endpoints(charm).await?,
            Action::RenderConfig => {
                let snapshot = self.relation_data().await?.clone();
                lifecycle::render_config(charm, &snapshot).await?;
            }
            Action::DbSync => {
                lifecycle::db_sync(charm, &mut *self.machine).await?;
            }
            Action::ImportPackage => {
                let identity = self.relation_data().await?.identity.clone();
                let credentials = lifecycle::credentials_for(&identity, &charm.options().region);
                lifecycle::import_package(charm, &credentials).await?;
            }
            Action::ConfigureHa => ha::configure_ha(charm).await?,
            Action::AssessStatus => {
                status::assess_status(charm, self.machine.flags()).await?;
            }
        }
        Ok(())
    }
}

/// Standalone package import using the credentials file on disk.
pub async fn import_package_action(charm: &MuranoCharm) -> CharmResult<bool> {
    let path = &charm.settings().novarc_path;
    let credentials = charm_tools::CredentialStore::load(path).await?;
    tracing::debug!(path = %path.display(), variables = credentials.len(), "Loaded credentials");
    lifecycle::import_package(charm, &credentials).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeUnit;
    use charm_tools::StatusState;

    fn store(unit: &FakeUnit) -> StateStore {
        StateStore::new(unit.settings().state_file())
    }

    #[test]
    fn test_hook_events() {
        assert_eq!(hook_events("install"), vec![Event::Install]);
        assert_eq!(hook_events("upgrade-charm"), vec![Event::UpgradeCharm]);
        assert_eq!(
            hook_events("amqp-relation-joined"),
            vec![Event::RelationJoined(Interface::Amqp)]
        );
        assert_eq!(
            hook_events("identity-service-relation-changed"),
            vec![Event::RelationChanged(Interface::IdentityService)]
        );
        assert_eq!(hook_events("ha-relation-changed"), vec![Event::HaJoined]);
        assert_eq!(hook_events("leader-elected"), vec![Event::UpdateStatus]);
        assert_eq!(hook_events("cluster-relation-joined"), vec![Event::UpdateStatus]);
    }

    #[tokio::test]
    async fn test_install_hook() {
        let unit = FakeUnit::new();
        let charm = unit.charm();
        let store = store(&unit);

        let outcome = run_hook(&charm, &store, "install").await.unwrap();
        assert_eq!(outcome.actions, vec![Action::Install, Action::AssessStatus]);
        assert_eq!(outcome.stage, Stage::AwaitingRelations);
        assert_eq!(unit.runner().count("apt-get"), 2);

        let status = unit.statuses().last().cloned().unwrap();
        assert_eq!(
            status.message,
            "Missing relations: shared-db, amqp, identity-service"
        );

        let saved = store.load().await.unwrap();
        assert!(saved.flags.contains(Flag::CharmInstalled));
        assert_eq!(saved.last_hook.as_deref(), Some("install"));
    }

    #[tokio::test]
    async fn test_full_deployment() {
        let unit = FakeUnit::new();
        let charm = unit.charm();
        let store = store(&unit);
        run_hook(&charm, &store, "install").await.unwrap();

        unit.join("shared-db:1", "mysql/0");
        let outcome = run_hook(&charm, &store, "shared-db-relation-joined")
            .await
            .unwrap();
        assert_eq!(
            outcome.actions,
            vec![Action::RequestDatabase, Action::AssessStatus]
        );
        assert_eq!(
            unit.local_settings("shared-db:1").get("username").map(String::as_str),
            Some("murano")
        );
        assert_eq!(unit.statuses().last().map(|s| s.state), Some(StatusState::Blocked));

        let unit = unit.with_database().with_amqp().with_identity();
        let outcome = run_hook(&charm, &store, "identity-service-relation-changed")
            .await
            .unwrap();
        assert!(outcome.actions.contains(&Action::RenderConfig));
        assert!(outcome.actions.contains(&Action::DbSync));
        assert!(outcome.actions.contains(&Action::ImportPackage));
        assert_eq!(outcome.stage, Stage::Ready);
        assert_eq!(unit.runner().count("murano-db-manage"), 1);
        assert!(charm.settings().conf_path.exists());
        assert!(charm.settings().novarc_path.exists());
        assert_eq!(
            unit.statuses().last(),
            Some(&charm_tools::WorkloadStatus::active("Unit is ready"))
        );

        let restarts = unit.runner().count("systemctl restart");
        let outcome = run_hook(&charm, &store, "update-status").await.unwrap();
        assert_eq!(outcome.actions, vec![Action::AssessStatus]);
        assert_eq!(unit.runner().count("systemctl restart"), restarts);
        assert_eq!(unit.runner().count("murano-db-manage"), 1);
    }

    #[tokio::test]
    async fn test_failed_action_keeps_previous_state() {
        let unit = FakeUnit::new();
        let charm = unit.charm();
        let store = store(&unit);
        run_hook(&charm, &store, "install").await.unwrap();
        let before = store.load().await.unwrap();

        let unit = unit.with_database().with_amqp().with_identity();
        unit.runner().fail_on("murano-db-manage");

        let result = run_hook(&charm, &store, "amqp-relation-changed").await;
        assert!(result.is_err());
        assert_eq!(store.load().await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_install_with_relations_present() {
        let unit = FakeUnit::new().with_database().with_amqp().with_identity();
        let charm = unit.charm();
        let store = store(&unit);

        let outcome = run_hook(&charm, &store, "install").await.unwrap();
        assert_eq!(
            outcome.actions,
            vec![
                Action::Install,
                Action::RequestDatabase,
                Action::RequestAmqp,
                Action::RegisterEndpoints,
                Action::RenderConfig,
                Action::DbSync,
                Action::ImportPackage,
                Action::AssessStatus,
            ]
        );
        assert_eq!(outcome.stage, Stage::Ready);

        let restarts = unit.runner().count("systemctl restart");
        let outcome = run_hook(&charm, &store, "config-changed").await.unwrap();
        assert_eq!(outcome.actions, vec![Action::RenderConfig, Action::AssessStatus]);
        assert_eq!(unit.runner().count("systemctl restart"), restarts);
    }

    #[tokio::test]
    async fn test_replaced_amqp_relation_waits_for_data() {
        let unit = FakeUnit::new().with_database().with_amqp().with_identity();
        let charm = unit.charm();
        let store = store(&unit);
        run_hook(&charm, &store, "install").await.unwrap();
        let restarts = unit.runner().count("systemctl restart");

        unit.remove_relation("amqp:2");
        let outcome = run_hook(&charm, &store, "amqp-relation-broken").await.unwrap();
        assert_eq!(outcome.actions, vec![Action::AssessStatus]);
        assert_eq!(
            unit.statuses().last(),
            Some(&charm_tools::WorkloadStatus::blocked("Missing relations: amqp"))
        );

        unit.join("amqp:7", "rabbitmq-server/1");
        let outcome = run_hook(&charm, &store, "amqp-relation-joined").await.unwrap();
        assert_eq!(outcome.actions, vec![Action::RequestAmqp, Action::AssessStatus]);

        for hook in ["amqp-relation-changed", "config-changed", "upgrade-charm"] {
            let outcome = run_hook(&charm, &store, hook).await.unwrap();
            assert!(!outcome.actions.contains(&Action::RenderConfig), "{hook}");
            assert_eq!(
                unit.statuses().last(),
                Some(&charm_tools::WorkloadStatus::waiting("Incomplete relations: amqp"))
            );
        }
        assert_eq!(unit.runner().count("systemctl restart"), restarts);

        unit.publish(
            "amqp:7",
            "rabbitmq-server/1",
            &[("hostname", "10.0.0.40"), ("password", "newpw")],
        );
        let outcome = run_hook(&charm, &store, "amqp-relation-changed").await.unwrap();
        assert!(outcome.actions.contains(&Action::RenderConfig));
        let conf = std::fs::read_to_string(&charm.settings().conf_path).unwrap();
        assert!(conf.contains("rabbit_hosts = 10.0.0.40"));
        assert!(unit.runner().count("systemctl restart") > restarts);
    }

    #[tokio::test]
    async fn test_ha_joined_sends_resources() {
        let unit = FakeUnit::new();
        let charm = unit.charm();
        let store = store(&unit);
        run_hook(&charm, &store, "install").await.unwrap();

        unit.join("ha:4", "hacluster/0");
        let outcome = run_hook(&charm, &store, "ha-relation-joined").await.unwrap();
        assert_eq!(outcome.actions, vec![Action::ConfigureHa, Action::AssessStatus]);
        assert!(unit.local_settings("ha:4").contains_key("json_resources"));
    }

    #[tokio::test]
    async fn test_import_package_action_reads_novarc() {
        let unit = FakeUnit::new();
        let charm = unit.charm();
        let novarc = &charm.settings().novarc_path;
        std::fs::create_dir_all(novarc.parent().unwrap()).unwrap();
        std::fs::write(novarc, "export OS_USERNAME=admin\nexport OS_PASSWORD=secret\n").unwrap();
        let artifact = &charm.settings().package_path;
        std::fs::create_dir_all(artifact.parent().unwrap()).unwrap();
        std::fs::write(artifact, b"zip").unwrap();

        assert!(import_package_action(&charm).await.unwrap());
        let calls = unit.runner().calls();
        assert_eq!(calls[0].env.get("OS_PASSWORD").map(String::as_str), Some("secret"));
    }
}
