//! Charm options (`config.yaml`) as seen by the charm.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{CharmError, CharmResult};

/// The option schema shipped with the charm.
const CONFIG_YAML: &str = include_str!("../config.yaml");

/// One entry of `config.yaml`.
#[derive(Debug, Clone, Deserialize)]
struct OptionSpec {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    default: Option<serde_yaml::Value>,
}

#[derive(Debug, Clone, Deserialize)]
struct ConfigSchema {
    options: BTreeMap<String, OptionSpec>,
}

/// Typed charm options.
///
/// Required string options are kept optional here so an unset value surfaces
/// as [`CharmError::MissingConfig`] at the point of use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharmOptions {
    #[serde(rename = "openstack-origin", default = "default_origin")]
    pub openstack_origin: String,

    #[serde(rename = "rabbit-user", default)]
    pub rabbit_user: Option<String>,

    #[serde(rename = "rabbit-vhost", default)]
    pub rabbit_vhost: Option<String>,

    #[serde(rename = "database-user", default)]
    pub database_user: Option<String>,

    #[serde(default)]
    pub database: Option<String>,

    #[serde(default)]
    pub debug: bool,

    #[serde(default)]
    pub verbose: bool,

    #[serde(default = "default_region")]
    pub region: String,

    #[serde(default)]
    pub vip: Option<String>,

    #[serde(default = "default_vip_iface")]
    pub vip_iface: String,

    #[serde(default = "default_vip_cidr")]
    pub vip_cidr: u8,
}

fn default_origin() -> String {
    "distro".to_string()
}

fn default_region() -> String {
    "RegionOne".to_string()
}

fn default_vip_iface() -> String {
    "eth0".to_string()
}

fn default_vip_cidr() -> u8 {
    24
}

impl CharmOptions {
    /// Defaults declared in `config.yaml`, as a JSON object.
    pub fn schema_defaults() -> CharmResult<serde_json::Map<String, serde_json::Value>> {
        let schema: ConfigSchema = serde_yaml::from_str(CONFIG_YAML)?;
        let mut defaults = serde_json::Map::new();

        for (name, spec) in schema.options {
            let Some(value) = spec.default else { continue };
            if value.is_null() {
                continue;
            }
            let json = serde_json::to_value(&value)?;
            tracing::trace!(option = %name, kind = %spec.kind, "Option default");
            defaults.insert(name, json);
        }

        Ok(defaults)
    }

    /// Options from `config.yaml` defaults alone.
    pub fn defaults() -> CharmResult<Self> {
        Self::from_config(&serde_json::Value::Object(serde_json::Map::new()))
    }

    /// Merge `config-get` output over the schema defaults.
    ///
    /// Keys reported as `null` or empty strings count as unset.
    pub fn from_config(config: &serde_json::Value) -> CharmResult<Self> {
        let mut merged = Self::schema_defaults()?;

        if let Some(values) = config.as_object() {
            for (key, value) in values {
                match value {
                    serde_json::Value::Null => {
                        merged.remove(key);
                    }
                    serde_json::Value::String(s) if s.trim().is_empty() => {
                        merged.remove(key);
                    }
                    other => {
                        merged.insert(key.clone(), other.clone());
                    }
                }
            }
        } else if !config.is_null() {
            return Err(CharmError::InvalidConfig(
                "config-get did not return an object".to_string(),
            ));
        }

        serde_json::from_value(serde_json::Value::Object(merged))
            .map_err(|e| CharmError::InvalidConfig(e.to_string()))
    }

    pub fn rabbit_user(&self) -> CharmResult<&str> {
        required("rabbit-user", &self.rabbit_user)
    }

    pub fn rabbit_vhost(&self) -> CharmResult<&str> {
        required("rabbit-vhost", &self.rabbit_vhost)
    }

    pub fn database_name(&self) -> CharmResult<&str> {
        required("database", &self.database)
    }

    pub fn database_user(&self) -> CharmResult<&str> {
        required("database-user", &self.database_user)
    }

    /// Configured virtual IPs.
    pub fn vips(&self) -> Vec<&str> {
        self.vip
            .as_deref()
            .map(|v| v.split_whitespace().collect())
            .unwrap_or_default()
    }
}

fn required<'a>(name: &str, value: &'a Option<String>) -> CharmResult<&'a str> {
    value
        .as_deref()
        .ok_or_else(|| CharmError::MissingConfig(name.to_string()))
}
