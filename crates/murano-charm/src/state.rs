//! Unit state machine.
//!
//! Setup progress is recorded as a set of flags that only ever grow. The
//! flags determine a [`Stage`]; events are handled by an exhaustive match on
//! `(stage, event)` that yields the actions to run. Actions are gated on
//! flags they set themselves, so replaying a hook cannot repeat a one-shot
//! action.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::error::{CharmError, CharmResult};
use crate::relations::{Interface, Probe};

/// A completed setup step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Flag {
    #[serde(rename = "charm.installed")]
    CharmInstalled,
    #[serde(rename = "shared-db.connected")]
    SharedDbConnected,
    #[serde(rename = "amqp.connected")]
    AmqpConnected,
    #[serde(rename = "identity-service.connected")]
    IdentityConnected,
    #[serde(rename = "shared-db.available")]
    SharedDbAvailable,
    #[serde(rename = "amqp.available")]
    AmqpAvailable,
    #[serde(rename = "identity-service.available")]
    IdentityAvailable,
    #[serde(rename = "config.rendered")]
    ConfigRendered,
    #[serde(rename = "db.synced")]
    DbSynced,
    #[serde(rename = "io-murano.imported")]
    PackageImported,
    #[serde(rename = "ha.connected")]
    HaConnected,
}

impl Flag {
    pub fn name(&self) -> &'static str {
        match self {
            Self::CharmInstalled => "charm.installed",
            Self::SharedDbConnected => "shared-db.connected",
            Self::AmqpConnected => "amqp.connected",
            Self::IdentityConnected => "identity-service.connected",
            Self::SharedDbAvailable => "shared-db.available",
            Self::AmqpAvailable => "amqp.available",
            Self::IdentityAvailable => "identity-service.available",
            Self::ConfigRendered => "config.rendered",
            Self::DbSynced => "db.synced",
            Self::PackageImported => "io-murano.imported",
            Self::HaConnected => "ha.connected",
        }
    }

    pub fn connected(interface: Interface) -> Self {
        match interface {
            Interface::SharedDb => Self::SharedDbConnected,
            Interface::Amqp => Self::AmqpConnected,
            Interface::IdentityService => Self::IdentityConnected,
        }
    }

    pub fn available(interface: Interface) -> Self {
        match interface {
            Interface::SharedDb => Self::SharedDbAvailable,
            Interface::Amqp => Self::AmqpAvailable,
            Interface::IdentityService => Self::IdentityAvailable,
        }
    }
}

impl std::fmt::Display for Flag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Monotonic set of flags.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FlagSet(BTreeSet<Flag>);

impl FlagSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, flag: Flag) -> bool {
        self.0.contains(&flag)
    }

    /// Add a flag. Returns `true` if it was not already set.
    pub fn insert(&mut self, flag: Flag) -> bool {
        self.0.insert(flag)
    }

    pub fn iter(&self) -> impl Iterator<Item = Flag> + '_ {
        self.0.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<Flag> for FlagSet {
    fn from_iter<I: IntoIterator<Item = Flag>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Where the unit is in its setup sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Packages not installed yet.
    Uninstalled,
    /// Installed, waiting for database, queue and identity data.
    AwaitingRelations,
    /// Configuration rendered; core package not imported yet.
    Configured,
    /// Fully set up.
    Ready,
}

impl Stage {
    pub fn is_configured(&self) -> bool {
        matches!(self, Self::Configured | Self::Ready)
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Uninstalled => write!(f, "uninstalled"),
            Self::AwaitingRelations => write!(f, "awaiting_relations"),
            Self::Configured => write!(f, "configured"),
            Self::Ready => write!(f, "ready"),
        }
    }
}

/// Something that happened to the unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Install,
    UpgradeCharm,
    ConfigChanged,
    UpdateStatus,
    /// A remote unit joined the interface's relation.
    RelationJoined(Interface),
    /// The interface's relation data became complete.
    RelationAvailable(Interface),
    /// Complete relation data changed.
    RelationChanged(Interface),
    HaJoined,
}

/// Work the dispatcher performs for the unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Install,
    RequestDatabase,
    RequestAmqp,
    RegisterEndpoints,
    RenderConfig,
    DbSync,
    ImportPackage,
    ConfigureHa,
    AssessStatus,
}

impl Action {
    fn request_for(interface: Interface) -> Self {
        match interface {
            Interface::SharedDb => Self::RequestDatabase,
            Interface::Amqp => Self::RequestAmqp,
            Interface::IdentityService => Self::RegisterEndpoints,
        }
    }
}

/// Ordered, duplicate-free list of actions; status assessment always last.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Plan {
    actions: Vec<Action>,
    assess: bool,
}

impl Plan {
    pub fn push(&mut self, action: Action) {
        if action == Action::AssessStatus {
            self.assess = true;
        } else if !self.actions.contains(&action) {
            self.actions.push(action);
        }
    }

    pub fn extend<I: IntoIterator<Item = Action>>(&mut self, actions: I) {
        for action in actions {
            self.push(action);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty() && !self.assess
    }

    pub fn into_actions(self) -> Vec<Action> {
        let mut actions = self.actions;
        if self.assess {
            actions.push(Action::AssessStatus);
        }
        actions
    }
}

/// The unit state machine.
///
/// Flags record what has been seen at some point. Relations can lose their
/// data later, so rendering additionally requires the relations observed in
/// the current hook to be complete.
#[derive(Debug, Clone, Default)]
pub struct Machine {
    flags: FlagSet,
    /// Live completeness of all required relations; `None` until observed.
    relations_complete: Option<bool>,
}

impl Machine {
    pub fn new(flags: FlagSet) -> Self {
        Self {
            flags,
            relations_complete: None,
        }
    }

    /// Record what the relations currently show.
    pub fn observe(&mut self, probes: &[(Interface, Probe)]) {
        let complete = Interface::ALL
            .iter()
            .all(|i| probes.iter().any(|(seen, p)| seen == i && p.available));
        self.relations_complete = Some(complete);
    }

    pub fn flags(&self) -> &FlagSet {
        &self.flags
    }

    pub fn into_flags(self) -> FlagSet {
        self.flags
    }

    /// Record a flag set by an action outcome rather than by a transition.
    pub fn mark(&mut self, flag: Flag) -> bool {
        self.flags.insert(flag)
    }

    pub fn stage(&self) -> Stage {
        if !self.flags.contains(Flag::CharmInstalled) {
            Stage::Uninstalled
        } else if !self.flags.contains(Flag::ConfigRendered) {
            Stage::AwaitingRelations
        } else if !self.flags.contains(Flag::PackageImported) {
            Stage::Configured
        } else {
            Stage::Ready
        }
    }

    /// Every interface has been available and none is known to be incomplete now.
    fn can_render(&self) -> bool {
        let flagged = Interface::ALL
            .iter()
            .all(|i| self.flags.contains(Flag::available(*i)));
        flagged && self.relations_complete.unwrap_or(true)
    }

    fn rerender(&self, plan: &mut Plan) {
        if self.stage().is_configured() && self.can_render() {
            plan.push(Action::RenderConfig);
        }
    }

    /// Apply an event and return the actions it triggers.
    pub fn handle(&mut self, event: Event) -> Vec<Action> {
        let mut plan = Plan::default();
        self.apply(event, &mut plan);
        plan.into_actions()
    }

    /// Apply an event, appending its actions to `plan`.
    pub fn apply(&mut self, event: Event, plan: &mut Plan) {
        let stage = self.stage();

        match (stage, event) {
            (Stage::Uninstalled, Event::Install) => {
                plan.push(Action::Install);
                self.flags.insert(Flag::CharmInstalled);
            }
            (_, Event::Install) => {}

            (_, Event::UpgradeCharm) => {
                plan.push(Action::Install);
                self.flags.insert(Flag::CharmInstalled);
                self.rerender(plan);
            }

            (Stage::Configured | Stage::Ready, Event::ConfigChanged) => {
                self.rerender(plan);
            }
            (Stage::Uninstalled | Stage::AwaitingRelations, Event::ConfigChanged) => {}

            (_, Event::UpdateStatus) => {}

            (_, Event::RelationJoined(interface)) => {
                self.flags.insert(Flag::connected(interface));
                plan.push(Action::request_for(interface));
            }

            (_, Event::RelationAvailable(interface)) => {
                self.flags.insert(Flag::connected(interface));
                let newly = self.flags.insert(Flag::available(interface));
                if !newly {
                    self.rerender(plan);
                }
            }

            (Stage::Configured | Stage::Ready, Event::RelationChanged(interface)) => {
                if self.flags.contains(Flag::available(interface)) {
                    self.rerender(plan);
                }
            }
            (Stage::Uninstalled | Stage::AwaitingRelations, Event::RelationChanged(_)) => {}

            (_, Event::HaJoined) => {
                self.flags.insert(Flag::HaConnected);
                plan.push(Action::ConfigureHa);
            }
        }

        self.advance(plan);

        if self.stage() != Stage::Uninstalled {
            plan.push(Action::AssessStatus);
        }
    }

    /// Move forward through the stages as far as the flags allow.
    fn advance(&mut self, plan: &mut Plan) {
        loop {
            match self.stage() {
                Stage::Uninstalled => return,
                Stage::AwaitingRelations => {
                    if !self.can_render() {
                        return;
                    }
                    plan.push(Action::RenderConfig);
                    self.flags.insert(Flag::ConfigRendered);
                }
                Stage::Configured => {
                    self.sync_database(plan);
                    // The import authenticates with identity relation data.
                    if !self.can_render() {
                        return;
                    }
                    plan.push(Action::ImportPackage);
                    self.flags.insert(Flag::PackageImported);
                }
                Stage::Ready => {
                    self.sync_database(plan);
                    return;
                }
            }
        }
    }

    fn sync_database(&self, plan: &mut Plan) {
        if !self.flags.contains(Flag::DbSynced) {
            plan.push(Action::DbSync);
        }
    }
}

/// What is persisted between hook executions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitState {
    pub flags: FlagSet,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_hook: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// JSON file holding the [`UnitState`].
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the state; a missing file is a fresh unit.
    pub async fn load(&self) -> CharmResult<UnitState> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => serde_json::from_str(&content).map_err(|e| {
                CharmError::State(format!("Corrupt state file {}: {}", self.path.display(), e))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(UnitState::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Save the state, replacing the previous file atomically.
    pub async fn save(&self, state: &UnitState) -> CharmResult<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(state)?).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}
