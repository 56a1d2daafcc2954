//! Relation adapters for the interfaces the charm consumes.
//!
//! Each required interface is *connected* once a remote unit has joined and
//! *available* once some remote unit has published every key the charm
//! needs. Data is read fresh from the hook tools on every call.

use charm_tools::hookenv::RelationSettings;
use charm_tools::HookTools;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::charm::{MuranoCharm, API_PORT, SERVICE_TYPE};
use crate::error::{CharmError, CharmResult};

/// Endpoint name of the hacluster subordinate relation.
pub const HA_ENDPOINT: &str = "ha";

/// Interfaces the charm requires before it can configure Murano.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Interface {
    #[serde(rename = "shared-db")]
    SharedDb,
    #[serde(rename = "amqp")]
    Amqp,
    #[serde(rename = "identity-service")]
    IdentityService,
}

impl Interface {
    /// All required interfaces, in the order they are reported.
    pub const ALL: [Interface; 3] = [
        Interface::SharedDb,
        Interface::Amqp,
        Interface::IdentityService,
    ];

    /// The relation endpoint name in `metadata.yaml`.
    pub fn endpoint(&self) -> &'static str {
        match self {
            Self::SharedDb => "shared-db",
            Self::Amqp => "amqp",
            Self::IdentityService => "identity-service",
        }
    }

    pub fn from_endpoint(endpoint: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|i| i.endpoint() == endpoint)
    }
}

impl std::fmt::Display for Interface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.endpoint())
    }
}

/// Data published by the database provider (mysql-shared).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseData {
    pub db_host: String,
    pub password: String,
}

/// Data published by the message queue provider (rabbitmq).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmqpData {
    pub hostname: String,
    pub password: String,
}

impl AmqpData {
    /// Older rabbitmq charms only publish `private-address`.
    fn from_settings(settings: &RelationSettings) -> Option<Self> {
        let hostname = settings
            .get("hostname")
            .or_else(|| settings.get("private-address"))?;
        let password = settings.get("password")?;
        Some(Self {
            hostname: hostname.clone(),
            password: password.clone(),
        })
    }
}

/// Data published by the identity provider (keystone).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityData {
    pub service_host: String,
    pub service_port: String,
    #[serde(default = "default_protocol")]
    pub service_protocol: String,
    pub auth_host: String,
    pub auth_port: String,
    #[serde(default = "default_protocol")]
    pub auth_protocol: String,
    pub service_tenant: String,
    pub service_username: String,
    pub service_password: String,
}

fn default_protocol() -> String {
    "http".to_string()
}

impl IdentityData {
    /// Public keystone endpoint, e.g. `http://10.0.0.2:5000`.
    pub fn service_uri(&self) -> String {
        format!(
            "{}://{}:{}",
            self.service_protocol, self.service_host, self.service_port
        )
    }

    /// Admin keystone endpoint, e.g. `http://10.0.0.2:35357`.
    pub fn auth_uri(&self) -> String {
        format!("{}://{}:{}", self.auth_protocol, self.auth_host, self.auth_port)
    }
}

/// What a probe of one interface found.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Probe {
    pub connected: bool,
    pub available: bool,
}

/// Complete data from all three required interfaces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationSnapshot {
    pub database: DatabaseData,
    /// Every rabbitmq unit with complete data; at least one.
    pub amqp: Vec<AmqpData>,
    pub identity: IdentityData,
}

/// Settings from every remote unit on every relation of an endpoint.
async fn remote_settings(
    unit: &dyn HookTools,
    endpoint: &str,
) -> CharmResult<Vec<RelationSettings>> {
    let mut all = Vec::new();
    for relation_id in unit.relation_ids(endpoint).await? {
        for remote in unit.related_units(&relation_id).await? {
            all.push(unit.relation_get(&relation_id, &remote).await?);
        }
    }
    Ok(all)
}

/// Interpret relation settings as `T`; `None` when required keys are missing.
fn complete<T: DeserializeOwned>(settings: &RelationSettings) -> Option<T> {
    let value = serde_json::to_value(settings).ok()?;
    serde_json::from_value(value).ok()
}

fn is_complete(interface: Interface, settings: &RelationSettings) -> bool {
    match interface {
        Interface::SharedDb => complete::<DatabaseData>(settings).is_some(),
        Interface::Amqp => AmqpData::from_settings(settings).is_some(),
        Interface::IdentityService => complete::<IdentityData>(settings).is_some(),
    }
}

/// Check whether an interface is connected and whether its data is complete.
pub async fn probe(unit: &dyn HookTools, interface: Interface) -> CharmResult<Probe> {
    let settings = remote_settings(unit, interface.endpoint()).await?;
    Ok(Probe {
        connected: !settings.is_empty(),
        available: settings.iter().any(|s| is_complete(interface, s)),
    })
}

/// Collect complete data from all required interfaces.
pub async fn snapshot(unit: &dyn HookTools) -> CharmResult<RelationSnapshot> {
    let database = remote_settings(unit, Interface::SharedDb.endpoint())
        .await?
        .iter()
        .find_map(complete::<DatabaseData>)
        .ok_or_else(|| incomplete(Interface::SharedDb))?;

    let amqp: Vec<AmqpData> = remote_settings(unit, Interface::Amqp.endpoint())
        .await?
        .iter()
        .filter_map(AmqpData::from_settings)
        .collect();
    if amqp.is_empty() {
        return Err(incomplete(Interface::Amqp));
    }

    let identity = remote_settings(unit, Interface::IdentityService.endpoint())
        .await?
        .iter()
        .find_map(complete::<IdentityData>)
        .ok_or_else(|| incomplete(Interface::IdentityService))?;

    Ok(RelationSnapshot {
        database,
        amqp,
        identity,
    })
}

fn incomplete(interface: Interface) -> CharmError {
    CharmError::Relation(format!("{interface} relation data is incomplete"))
}

/// Publish the same settings on every relation of an endpoint.
pub(crate) async fn publish(
    unit: &dyn HookTools,
    endpoint: &str,
    settings: &RelationSettings,
) -> CharmResult<usize> {
    let ids = unit.relation_ids(endpoint).await?;
    for relation_id in &ids {
        unit.relation_set(relation_id, settings).await?;
    }
    Ok(ids.len())
}

/// Ask the database provider for a database and user.
pub async fn request_database(charm: &MuranoCharm) -> CharmResult<()> {
    for setup in charm.get_database_setup().await? {
        let settings = RelationSettings::from([
            ("database".to_string(), setup.database.clone()),
            ("username".to_string(), setup.username.clone()),
            ("hostname".to_string(), setup.hostname.clone()),
        ]);
        let count = publish(charm.unit(), Interface::SharedDb.endpoint(), &settings).await?;
        tracing::info!(
            database = %setup.database,
            username = %setup.username,
            relations = count,
            "Requested database access"
        );
    }
    Ok(())
}

/// Ask the message queue provider for a user and vhost.
pub async fn request_amqp(charm: &MuranoCharm) -> CharmResult<()> {
    let credentials = charm.get_amqp_credentials()?;
    let settings = RelationSettings::from([
        ("username".to_string(), credentials.username.clone()),
        ("vhost".to_string(), credentials.vhost.clone()),
    ]);
    let count = publish(charm.unit(), Interface::Amqp.endpoint(), &settings).await?;
    tracing::info!(
        username = %credentials.username,
        vhost = %credentials.vhost,
        relations = count,
        "Requested message queue access"
    );
    Ok(())
}

/// Register the API endpoints with the identity service.
pub async fn register_endpoints(charm: &MuranoCharm) -> CharmResult<()> {
    let url = charm.api_endpoint().await?;
    let settings = RelationSettings::from([
        ("service".to_string(), SERVICE_TYPE.to_string()),
        ("region".to_string(), charm.options().region.clone()),
        ("public_url".to_string(), url.clone()),
        ("admin_url".to_string(), url.clone()),
        ("internal_url".to_string(), url.clone()),
    ]);
    let count = publish(charm.unit(), Interface::IdentityService.endpoint(), &settings).await?;
    tracing::info!(url = %url, port = API_PORT, relations = count, "Registered endpoints");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{identity_settings, FakeUnit};

    #[test]
    fn test_interface_endpoints() {
        assert_eq!(Interface::SharedDb.endpoint(), "shared-db");
        assert_eq!(
            Interface::from_endpoint("identity-service"),
            Some(Interface::IdentityService)
        );
        assert_eq!(Interface::from_endpoint("ha"), None);
    }

    #[test]
    fn test_identity_uris() {
        let identity: IdentityData = complete(&identity_settings()).unwrap();
        assert_eq!(identity.service_uri(), "http://10.0.0.2:5000");
        assert_eq!(identity.auth_uri(), "http://10.0.0.2:35357");
    }

    #[test]
    fn test_amqp_falls_back_to_private_address() {
        let settings = RelationSettings::from([
            ("private-address".to_string(), "10.0.0.9".to_string()),
            ("password".to_string(), "pw".to_string()),
        ]);
        let amqp = AmqpData::from_settings(&settings).unwrap();
        assert_eq!(amqp.hostname, "10.0.0.9");
    }

    #[tokio::test]
    async fn test_probe_states() {
        let unit = FakeUnit::new();
        assert_eq!(
            probe(&unit, Interface::SharedDb).await.unwrap(),
            Probe::default()
        );

        unit.join("shared-db:1", "mysql/0");
        assert_eq!(
            probe(&unit, Interface::SharedDb).await.unwrap(),
            Probe {
                connected: true,
                available: false
            }
        );

        unit.publish(
            "shared-db:1",
            "mysql/0",
            &[("db_host", "10.0.0.3"), ("password", "dbpw")],
        );
        assert_eq!(
            probe(&unit, Interface::SharedDb).await.unwrap(),
            Probe {
                connected: true,
                available: true
            }
        );
    }

    #[tokio::test]
    async fn test_snapshot_requires_all_interfaces() {
        let unit = FakeUnit::new().with_database().with_amqp();
        let err = snapshot(&unit).await.unwrap_err();
        assert!(matches!(err, CharmError::Relation(msg) if msg.contains("identity-service")));

        let unit = unit.with_identity();
        let snap = snapshot(&unit).await.unwrap();
        assert_eq!(snap.database.db_host, "10.0.0.3");
        assert_eq!(snap.amqp.len(), 1);
        assert_eq!(snap.identity.service_username, "murano");
    }

    #[tokio::test]
    async fn test_requests_publish_relation_data() {
        let unit = FakeUnit::new();
        unit.join("shared-db:1", "mysql/0");
        unit.join("amqp:2", "rabbitmq-server/0");
        unit.join("identity-service:3", "keystone/0");
        let charm = unit.charm();

        request_database(&charm).await.unwrap();
        request_amqp(&charm).await.unwrap();
        register_endpoints(&charm).await.unwrap();

        let db = unit.local_settings("shared-db:1");
        assert_eq!(db.get("database").map(String::as_str), Some("murano"));
        assert_eq!(db.get("hostname").map(String::as_str), Some("10.0.0.5"));

        let amqp = unit.local_settings("amqp:2");
        assert_eq!(amqp.get("vhost").map(String::as_str), Some("openstack"));

        let identity = unit.local_settings("identity-service:3");
        assert_eq!(
            identity.get("public_url").map(String::as_str),
            Some("http://10.0.0.5:8082")
        );
        assert_eq!(identity.get("service").map(String::as_str), Some("murano"));
        assert_eq!(identity.get("region").map(String::as_str), Some("RegionOne"));
    }
}
