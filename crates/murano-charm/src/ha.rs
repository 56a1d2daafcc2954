//! Pacemaker resources sent to the hacluster subordinate.

use charm_tools::hookenv::RelationSettings;
use serde_json::{json, Map, Value};
use std::net::IpAddr;

use crate::charm::{MuranoCharm, CHARM_NAME};
use crate::error::{CharmError, CharmResult};
use crate::relations::{publish, HA_ENDPOINT};

/// Resource definitions for one unit's HA configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HaResources {
    pub resources: Map<String, Value>,
    pub resource_params: Map<String, Value>,
    pub clones: Map<String, Value>,
    pub init_services: Vec<String>,
}

impl HaResources {
    /// haproxy cloned on every node plus one address resource per VIP.
    pub fn build(vips: &[&str], iface: &str, cidr: u8) -> CharmResult<Self> {
        let mut out = Self::default();

        let haproxy = format!("res_{CHARM_NAME}_haproxy");
        out.resources.insert(haproxy.clone(), json!("lsb:haproxy"));
        out.resource_params
            .insert(haproxy.clone(), json!("op monitor interval=\"5s\""));
        out.clones
            .insert(format!("cl_{CHARM_NAME}_haproxy"), json!(haproxy));
        out.init_services.push("haproxy".to_string());

        for (index, vip) in vips.iter().enumerate() {
            let addr: IpAddr = vip
                .parse()
                .map_err(|_| CharmError::InvalidConfig(format!("vip is not an IP address: {vip}")))?;

            let name = match index {
                0 => format!("res_{CHARM_NAME}_{iface}_vip"),
                n => format!("res_{CHARM_NAME}_{iface}_vip_{n}"),
            };
            let (agent, params) = match addr {
                IpAddr::V4(_) => (
                    "ocf:heartbeat:IPaddr2",
                    format!("params ip=\"{vip}\" cidr_netmask=\"{cidr}\" nic=\"{iface}\""),
                ),
                IpAddr::V6(_) => (
                    "ocf:heartbeat:IPv6addr",
                    format!("params ipv6addr=\"{vip}\" cidr_netmask=\"{cidr}\" nic=\"{iface}\""),
                ),
            };
            out.resources.insert(name.clone(), json!(agent));
            out.resource_params.insert(name, json!(params));
        }

        Ok(out)
    }

    /// Relation settings in the hacluster `json_*` format.
    pub fn to_settings(&self) -> CharmResult<RelationSettings> {
        Ok(RelationSettings::from([
            ("json_resources".to_string(), serde_json::to_string(&self.resources)?),
            (
                "json_resource_params".to_string(),
                serde_json::to_string(&self.resource_params)?,
            ),
            ("json_clones".to_string(), serde_json::to_string(&self.clones)?),
            (
                "json_init_services".to_string(),
                serde_json::to_string(&self.init_services)?,
            ),
        ]))
    }
}

/// Send resource definitions on every `ha` relation.
pub async fn configure_ha(charm: &MuranoCharm) -> CharmResult<()> {
    let options = charm.options();
    let vips = options.vips();
    if vips.is_empty() {
        tracing::warn!("HA relation joined but no vip is configured");
    }

    let resources = HaResources::build(&vips, &options.vip_iface, options.vip_cidr)?;
    let count = publish(charm.unit(), HA_ENDPOINT, &resources.to_settings()?).await?;
    tracing::info!(
        resources = resources.resources.len(),
        relations = count,
        "Sent HA resources"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeUnit;

    #[test]
    fn test_haproxy_only_without_vip() {
        let resources = HaResources::build(&[], "eth0", 24).unwrap();
        assert_eq!(resources.resources.len(), 1);
        assert_eq!(resources.resources["res_murano_haproxy"], "lsb:haproxy");
        assert_eq!(resources.clones["cl_murano_haproxy"], "res_murano_haproxy");
        assert_eq!(resources.init_services, vec!["haproxy"]);
    }

    #[test]
    fn test_vip_resources() {
        let resources = HaResources::build(&["10.0.0.100", "fd00::100"], "eth1", 16).unwrap();
        assert_eq!(
            resources.resources["res_murano_eth1_vip"],
            "ocf:heartbeat:IPaddr2"
        );
        assert_eq!(
            resources.resource_params["res_murano_eth1_vip"],
            "params ip=\"10.0.0.100\" cidr_netmask=\"16\" nic=\"eth1\""
        );
        assert_eq!(
            resources.resources["res_murano_eth1_vip_1"],
            "ocf:heartbeat:IPv6addr"
        );
    }

    #[test]
    fn test_invalid_vip() {
        let err = HaResources::build(&["not-an-ip"], "eth0", 24).unwrap_err();
        assert!(matches!(err, CharmError::InvalidConfig(_)));
    }

    #[tokio::test]
    async fn test_configure_ha_publishes_json() {
        let unit = FakeUnit::new().with_config(json!({"vip": "10.0.0.100"}));
        unit.join("ha:4", "hacluster/0");
        let charm = unit.charm();

        configure_ha(&charm).await.unwrap();

        let settings = unit.local_settings("ha:4");
        let resources: Value = serde_json::from_str(&settings["json_resources"]).unwrap();
        assert_eq!(resources["res_murano_eth0_vip"], "ocf:heartbeat:IPaddr2");
        let services: Vec<String> =
            serde_json::from_str(&settings["json_init_services"]).unwrap();
        assert_eq!(services, vec!["haproxy"]);
    }
}
