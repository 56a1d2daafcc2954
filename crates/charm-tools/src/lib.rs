//! Charm Tool Library
//!
//! Shared plumbing for charms that run as a single executable per hook.
//!
//! This crate provides:
//! - Process execution behind the [`CommandRunner`] trait
//! - Access to the Juju hook tools behind the [`HookTools`] trait
//! - Package source / apt / service helpers for the host
//! - Template rendering with Jinja2-compatible syntax
//! - A structured credential store for `export KEY=VALUE` files

pub mod command;
pub mod credentials;
pub mod error;
pub mod hookenv;
pub mod host;
pub mod result;
pub mod template;

pub use command::{CommandRunner, CommandSpec, SystemRunner};
pub use credentials::CredentialStore;
pub use error::ToolError;
pub use hookenv::{HookTools, JujuHookTools, StatusState, WorkloadStatus};
pub use result::{CommandOutput, CommandStatus};
pub use template::TemplateEngine;
