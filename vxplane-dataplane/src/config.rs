//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use serde::{Deserialize, Serialize};
use vxplane_utils::bgp::RouteDistinguisher;

// Dataplane engine selector. Only the netlink engine exists today; the tag
// keeps the configuration format open for other engines.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum DataplaneType {
    #[serde(rename = "netlink")]
    Netlink,
}

#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DataplaneCfg {
    #[serde(rename = "type")]
    pub dataplane_type: DataplaneType,
    #[serde(rename = "virtual-network-list", default)]
    pub virtual_networks: Vec<VirtualNetworkCfg>,
}

// Configuration of one tenant overlay. The route distinguisher is the
// primary key: changing any other field of an existing RD is handled as
// delete-then-add.
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct VirtualNetworkCfg {
    pub rd: RouteDistinguisher,
    pub vni: u32,
    #[serde(rename = "vxlan-port", default = "default_vxlan_port")]
    pub vxlan_port: u16,
    #[serde(rename = "vtep-interface")]
    pub vtep_interface: String,
    pub etag: u32,
    #[serde(rename = "sniff-interfaces", default)]
    pub sniff_interfaces: Vec<String>,
    #[serde(rename = "member-interfaces", default)]
    pub member_interfaces: Vec<String>,
}

fn default_vxlan_port() -> u16 {
    4789
}

// ===== impl VirtualNetworkCfg =====

impl VirtualNetworkCfg {
    pub fn validate(&self) -> Result<(), String> {
        if self.vni >= 1 << 24 {
            return Err(format!("VNI {} exceeds 24 bits", self.vni));
        }
        if self.vxlan_port == 0 {
            return Err("VXLAN UDP port cannot be zero".to_owned());
        }
        if self.vtep_interface.is_empty() {
            return Err("VTEP interface name cannot be empty".to_owned());
        }
        Ok(())
    }

    // Names of the kernel objects owned by this virtual network.
    pub fn vxlan_name(&self) -> String {
        format!("vxlan{}", self.vni)
    }

    pub fn bridge_name(&self) -> String {
        format!("br{}", self.vni)
    }
}

// ===== global functions =====

// Diffs two configuration snapshots at the virtual-network-list level.
// Returns the networks to start and the networks to stop; an RD whose
// record changed appears in both lists.
pub fn virtual_network_diff(
    old: Option<&DataplaneCfg>,
    new: &DataplaneCfg,
) -> (Vec<VirtualNetworkCfg>, Vec<VirtualNetworkCfg>) {
    let old_list: &[VirtualNetworkCfg] = match old {
        Some(old) => &old.virtual_networks,
        None => &[],
    };

    let mut added = vec![];
    let mut deleted = vec![];

    for new_vn in new.virtual_networks.iter() {
        match old_list.iter().find(|old_vn| old_vn.rd == new_vn.rd) {
            None => added.push(new_vn.clone()),
            Some(old_vn) if old_vn != new_vn => {
                deleted.push(old_vn.clone());
                added.push(new_vn.clone());
            }
            Some(_) => (),
        }
    }

    for old_vn in old_list.iter() {
        if !new.virtual_networks.iter().any(|new_vn| new_vn.rd == old_vn.rd)
        {
            deleted.push(old_vn.clone());
        }
    }

    (added, deleted)
}

// ===== tests =====

#[cfg(test)]
mod tests {
    use super::*;

    fn network(rd: &str, vni: u32) -> VirtualNetworkCfg {
        VirtualNetworkCfg {
            rd: rd.parse().unwrap(),
            vni,
            vxlan_port: 4789,
            vtep_interface: "eth0".to_owned(),
            etag: vni,
            sniff_interfaces: vec!["eth1".to_owned()],
            member_interfaces: vec!["eth1".to_owned()],
        }
    }

    fn dataplane(networks: Vec<VirtualNetworkCfg>) -> DataplaneCfg {
        DataplaneCfg {
            dataplane_type: DataplaneType::Netlink,
            virtual_networks: networks,
        }
    }

    #[test]
    fn initial_snapshot_adds_everything() {
        let new = dataplane(vec![network("65000:10", 10)]);
        let (added, deleted) = virtual_network_diff(None, &new);
        assert_eq!(added.len(), 1);
        assert!(deleted.is_empty());
    }

    #[test]
    fn identical_snapshot_is_noop() {
        let cfg = dataplane(vec![
            network("65000:10", 10),
            network("65000:20", 20),
        ]);
        let (added, deleted) = virtual_network_diff(Some(&cfg), &cfg);
        assert!(added.is_empty());
        assert!(deleted.is_empty());
    }

    #[test]
    fn removed_rd_is_deleted() {
        let old = dataplane(vec![
            network("65000:10", 10),
            network("65000:20", 20),
        ]);
        let new = dataplane(vec![network("65000:10", 10)]);
        let (added, deleted) = virtual_network_diff(Some(&old), &new);
        assert!(added.is_empty());
        assert_eq!(deleted.len(), 1);
        assert_eq!(deleted[0].rd, "65000:20".parse().unwrap());
    }

    #[test]
    fn changed_record_is_delete_then_add() {
        let old = dataplane(vec![network("65000:10", 10)]);
        let mut changed = network("65000:10", 10);
        changed.vni = 11;
        let new = dataplane(vec![changed]);
        let (added, deleted) = virtual_network_diff(Some(&old), &new);
        assert_eq!(added.len(), 1);
        assert_eq!(deleted.len(), 1);
        assert_eq!(added[0].vni, 11);
        assert_eq!(deleted[0].vni, 10);
    }

    #[test]
    fn validation_rejects_oversized_vni() {
        let mut cfg = network("65000:10", 1 << 24);
        assert!(cfg.validate().is_err());
        cfg.vni = (1 << 24) - 1;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn derived_link_names() {
        let cfg = network("65000:10", 10);
        assert_eq!(cfg.vxlan_name(), "vxlan10");
        assert_eq!(cfg.bridge_name(), "br10");
    }
}
