//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::str::FromStr;

use serde::Deserialize;
use serde_json::Value;
use vxplane_bgp::api::VrfMsg;
use vxplane_dataplane::config::DataplaneCfg;
use vxplane_utils::bgp::RouteTarget;

// Accepted configuration file formats.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ConfigType {
    Toml,
    Yaml,
    Json,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    pub dataplane: DataplaneCfg,
    // Opaque configuration for the external BGP speaker. The agent only
    // peeks at the VRF list to register it through the RPC surface.
    #[serde(default)]
    pub bgp: Option<Value>,
}

#[derive(Debug)]
pub enum ConfigError {
    Read(std::io::Error),
    Parse(String),
}

// ===== impl Config =====

impl Config {
    pub fn load(path: &str, format: ConfigType) -> Result<Config, ConfigError> {
        let contents =
            std::fs::read_to_string(path).map_err(ConfigError::Read)?;
        Config::parse(&contents, format)
    }

    pub fn parse(
        contents: &str,
        format: ConfigType,
    ) -> Result<Config, ConfigError> {
        match format {
            ConfigType::Toml => toml::from_str(contents)
                .map_err(|error| ConfigError::Parse(error.to_string())),
            ConfigType::Yaml => serde_yaml::from_str(contents)
                .map_err(|error| ConfigError::Parse(error.to_string())),
            ConfigType::Json => serde_json::from_str(contents)
                .map_err(|error| ConfigError::Parse(error.to_string())),
        }
    }
}

// ===== impl ConfigType =====

impl FromStr for ConfigType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "toml" => Ok(ConfigType::Toml),
            "yaml" => Ok(ConfigType::Yaml),
            "json" => Ok(ConfigType::Json),
            _ => Err(format!("unknown configuration format: {}", s)),
        }
    }
}

// ===== impl ConfigError =====

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Read(error) => {
                write!(f, "cannot read configuration file: {}", error)
            }
            ConfigError::Parse(reason) => {
                write!(f, "cannot parse configuration file: {}", reason)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

// ===== global functions =====

// Extracts the VRF registrations from the speaker's configuration section.
pub fn speaker_vrfs(bgp: &Value) -> Vec<VrfMsg> {
    let mut vrfs = vec![];
    let Some(list) = bgp.get("vrfs").and_then(Value::as_array) else {
        return vrfs;
    };

    for entry in list {
        let Some(config) = entry.get("config") else {
            continue;
        };
        let Some(name) = config.get("name").and_then(Value::as_str) else {
            continue;
        };
        let Some(rd) = config
            .get("rd")
            .and_then(Value::as_str)
            .and_then(|rd| rd.parse().ok())
        else {
            continue;
        };
        let import_rt = route_targets(config.get("import-rt-list"));
        let export_rt = route_targets(config.get("export-rt-list"));
        let id = config.get("id").and_then(Value::as_u64).unwrap_or(0) as u32;

        vrfs.push(VrfMsg::new(name.to_owned(), rd, import_rt, export_rt, id));
    }
    vrfs
}

fn route_targets(value: Option<&Value>) -> Vec<RouteTarget> {
    value
        .and_then(Value::as_array)
        .map(|list| {
            list.iter()
                .filter_map(Value::as_str)
                .filter_map(|rt| rt.parse().ok())
                .collect()
        })
        .unwrap_or_default()
}

// ===== tests =====

#[cfg(test)]
mod tests {
    use super::*;
    use vxplane_dataplane::config::DataplaneType;

    const TOML_CONFIG: &str = r#"
[dataplane]
type = "netlink"

[[dataplane.virtual-network-list]]
rd = "65000:10"
vni = 10
vxlan-port = 8472
vtep-interface = "eth1"
etag = 10
sniff-interfaces = ["eth2"]
member-interfaces = ["eth2"]

[bgp.global.config]
as = 65000
router-id = "192.168.0.1"

[[bgp.vrfs]]
[bgp.vrfs.config]
name = "blue"
rd = "65000:100"
id = 1
import-rt-list = ["65000:100"]
export-rt-list = ["65000:100"]
"#;

    #[test]
    fn parse_toml_config() {
        let config = Config::parse(TOML_CONFIG, ConfigType::Toml).unwrap();
        assert_eq!(config.dataplane.dataplane_type, DataplaneType::Netlink);
        assert_eq!(config.dataplane.virtual_networks.len(), 1);

        let vn = &config.dataplane.virtual_networks[0];
        assert_eq!(vn.rd, "65000:10".parse().unwrap());
        assert_eq!(vn.vni, 10);
        assert_eq!(vn.vxlan_port, 8472);
        assert_eq!(vn.vtep_interface, "eth1");
        assert_eq!(vn.sniff_interfaces, vec!["eth2".to_owned()]);
    }

    #[test]
    fn parse_json_config() {
        let contents = r#"{
            "dataplane": {
                "type": "netlink",
                "virtual-network-list": [{
                    "rd": "65000:10",
                    "vni": 10,
                    "vtep-interface": "eth1",
                    "etag": 10
                }]
            }
        }"#;
        let config = Config::parse(contents, ConfigType::Json).unwrap();
        let vn = &config.dataplane.virtual_networks[0];
        // Optional fields fall back to their defaults.
        assert_eq!(vn.vxlan_port, 4789);
        assert!(vn.sniff_interfaces.is_empty());
    }

    #[test]
    fn unknown_dataplane_type_is_rejected() {
        let contents = "[dataplane]\ntype = \"dpdk\"\n";
        assert!(Config::parse(contents, ConfigType::Toml).is_err());
    }

    #[test]
    fn vrfs_are_extracted_from_the_opaque_section() {
        let config = Config::parse(TOML_CONFIG, ConfigType::Toml).unwrap();
        let vrfs = speaker_vrfs(config.bgp.as_ref().unwrap());
        assert_eq!(vrfs.len(), 1);
        assert_eq!(vrfs[0].name, "blue");
        assert_eq!(vrfs[0].rd, "65000:100".parse().unwrap());
        assert_eq!(vrfs[0].import_rt.len(), 1);
        assert_eq!(vrfs[0].id, 1);
    }
}
