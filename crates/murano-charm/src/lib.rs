//! Murano Charm
//!
//! Deploys and operates the Murano application catalog (`murano-api`,
//! `murano-engine`) under Juju.
//!
//! This crate provides:
//! - Charm options and process settings
//! - Relation adapters for the database, message queue and identity service
//! - A persisted unit state machine that sequences setup across hooks
//! - Lifecycle actions: install, render, database sync, package import
//! - HA resource definitions and workload status assessment

pub mod charm;
pub mod error;
pub mod ha;
pub mod handlers;
pub mod lifecycle;
pub mod options;
pub mod relations;
pub mod settings;
pub mod state;
pub mod status;

#[cfg(test)]
mod testing;

pub use charm::MuranoCharm;
pub use error::{CharmError, CharmResult};
pub use options::CharmOptions;
pub use settings::Settings;
pub use state::{Machine, StateStore};
