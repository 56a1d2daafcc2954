//! The Murano charm: static service descriptor plus the handful of values
//! derived from charm options and the unit's address.

use charm_tools::host::PackageSource;
use charm_tools::{CommandRunner, CommandSpec, HookTools, TemplateEngine};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

use crate::error::{CharmError, CharmResult};
use crate::options::CharmOptions;
use crate::relations::Interface;
use crate::settings::Settings;

pub const CHARM_NAME: &str = "murano";

/// First OpenStack release the charm supports.
pub const MIN_RELEASE: &str = "mitaka";

pub const PACKAGES: &[&str] = &["murano-api", "murano-engine", "python-pymysql", "python-apt"];

/// Init services the charm manages.
pub const SERVICES: &[&str] = &["haproxy", "murano-api", "murano-engine"];

pub const DEFAULT_SERVICE: &str = "murano-api";

pub const SERVICE_TYPE: &str = "murano";

pub const API_PORT: u16 = 8082;

pub const HA_RESOURCES: &[&str] = &["vips", "haproxy"];

/// Network planes an API endpoint is exposed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkPlane {
    Public,
    Admin,
    Internal,
}

/// Files the charm writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigFile {
    MuranoConf,
    Novarc,
}

impl ConfigFile {
    /// Template name registered with the engine.
    pub fn template(&self) -> &'static str {
        match self {
            Self::MuranoConf => "murano.conf",
            Self::Novarc => "novarc",
        }
    }

    pub fn path<'a>(&self, settings: &'a Settings) -> &'a Path {
        match self {
            Self::MuranoConf => &settings.conf_path,
            Self::Novarc => &settings.novarc_path,
        }
    }

    /// Unix mode for the rendered file.
    pub fn mode(&self) -> u32 {
        match self {
            Self::MuranoConf => 0o640,
            Self::Novarc => 0o600,
        }
    }
}

/// Immutable description of the service the charm deploys.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceDescriptor {
    pub name: &'static str,
    pub release: &'static str,
    pub packages: &'static [&'static str],
    pub services: &'static [&'static str],
    pub default_service: &'static str,
    pub service_type: &'static str,
    pub api_ports: &'static [(NetworkPlane, u16)],
    pub required_relations: &'static [Interface],
    pub restart_map: &'static [(ConfigFile, &'static [&'static str])],
    pub ha_resources: &'static [&'static str],
}

pub const DESCRIPTOR: ServiceDescriptor = ServiceDescriptor {
    name: CHARM_NAME,
    release: MIN_RELEASE,
    packages: PACKAGES,
    services: SERVICES,
    default_service: DEFAULT_SERVICE,
    service_type: SERVICE_TYPE,
    api_ports: &[
        (NetworkPlane::Public, API_PORT),
        (NetworkPlane::Admin, API_PORT),
        (NetworkPlane::Internal, API_PORT),
    ],
    required_relations: &Interface::ALL,
    restart_map: &[
        (ConfigFile::MuranoConf, &["murano-api", "murano-engine"]),
        (ConfigFile::Novarc, &[]),
    ],
    ha_resources: HA_RESOURCES,
};

impl ServiceDescriptor {
    /// Services restarted when `file` changes.
    pub fn restarts_for(&self, file: ConfigFile) -> &'static [&'static str] {
        self.restart_map
            .iter()
            .find(|(f, _)| *f == file)
            .map(|(_, services)| *services)
            .unwrap_or(&[])
    }

    /// Every service that appears in the restart map, deduplicated.
    pub fn managed_services(&self) -> Vec<&'static str> {
        let mut out: Vec<&'static str> = Vec::new();
        for (_, services) in self.restart_map {
            for service in *services {
                if !out.contains(service) {
                    out.push(service);
                }
            }
        }
        out
    }
}

/// Message queue user and vhost to request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AmqpCredentials {
    pub username: String,
    pub vhost: String,
}

/// One database the charm needs created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatabaseSetup {
    pub database: String,
    pub username: String,
    pub hostname: String,
}

const MURANO_CONF_TEMPLATE: &str = include_str!("../templates/murano.conf");
const NOVARC_TEMPLATE: &str = include_str!("../templates/novarc");

/// The charm instance for one hook execution.
///
/// Built once by the entry point and handed by reference to everything that
/// needs configuration, hook tools or command execution.
pub struct MuranoCharm {
    options: CharmOptions,
    settings: Settings,
    unit: Arc<dyn HookTools>,
    runner: Arc<dyn CommandRunner>,
    templates: TemplateEngine,
}

impl MuranoCharm {
    pub fn new(
        options: CharmOptions,
        settings: Settings,
        unit: Arc<dyn HookTools>,
        runner: Arc<dyn CommandRunner>,
    ) -> CharmResult<Self> {
        let mut templates = TemplateEngine::new();
        templates.add_template(ConfigFile::MuranoConf.template(), MURANO_CONF_TEMPLATE)?;
        templates.add_template(ConfigFile::Novarc.template(), NOVARC_TEMPLATE)?;

        Ok(Self {
            options,
            settings,
            unit,
            runner,
            templates,
        })
    }

    /// Read charm options through the hook tools and build the charm.
    pub async fn load(
        settings: Settings,
        unit: Arc<dyn HookTools>,
        runner: Arc<dyn CommandRunner>,
    ) -> CharmResult<Self> {
        let config = unit.config().await?;
        let options = CharmOptions::from_config(&config)?;
        tracing::debug!(origin = %options.openstack_origin, "Charm options loaded");
        Self::new(options, settings, unit, runner)
    }

    pub fn descriptor(&self) -> &'static ServiceDescriptor {
        &DESCRIPTOR
    }

    pub fn options(&self) -> &CharmOptions {
        &self.options
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn unit(&self) -> &dyn HookTools {
        self.unit.as_ref()
    }

    pub fn runner(&self) -> &dyn CommandRunner {
        self.runner.as_ref()
    }

    pub fn templates(&self) -> &TemplateEngine {
        &self.templates
    }

    /// Username and vhost to request from the message queue.
    pub fn get_amqp_credentials(&self) -> CharmResult<AmqpCredentials> {
        Ok(AmqpCredentials {
            username: self.options.rabbit_user()?.to_string(),
            vhost: self.options.rabbit_vhost()?.to_string(),
        })
    }

    /// Databases to request; the hostname is this unit's private address,
    /// looked up on every call.
    pub async fn get_database_setup(&self) -> CharmResult<Vec<DatabaseSetup>> {
        let database = self.options.database_name()?.to_string();
        let username = self.options.database_user()?.to_string();
        let hostname = self.unit.unit_private_address().await?;

        Ok(vec![DatabaseSetup {
            database,
            username,
            hostname,
        }])
    }

    /// Package source from `openstack-origin`.
    pub fn package_source(&self) -> CharmResult<PackageSource> {
        PackageSource::parse(&self.options.openstack_origin)
            .map_err(|e| CharmError::InvalidConfig(e.to_string()))
    }

    /// OpenStack release being deployed.
    pub fn release(&self) -> CharmResult<String> {
        let source = self.package_source()?;
        Ok(source.release().unwrap_or(MIN_RELEASE).to_string())
    }

    /// URL of the API on this unit.
    pub async fn api_endpoint(&self) -> CharmResult<String> {
        let address = self.unit.unit_private_address().await?;
        Ok(format!("http://{address}:{API_PORT}"))
    }

    /// `murano-db-manage --config-file <conf> upgrade`
    pub fn sync_command(&self) -> CommandSpec {
        CommandSpec::new("murano-db-manage")
            .arg("--config-file")
            .arg(self.settings.conf_path.display().to_string())
            .arg("upgrade")
    }
}

impl std::fmt::Debug for MuranoCharm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MuranoCharm")
            .field("options", &self.options)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}
