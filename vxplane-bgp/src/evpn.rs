//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

//! Builders for the paths the agent originates: EVPN MAC/IP advertisements
//! for locally learned MACs and the router-ID host route.

use std::net::Ipv4Addr;

use ipnetwork::Ipv4Network;
use vxplane_utils::bgp::{
    ExtCommunity, Origin, RouteDistinguisher, TunnelType,
};
use vxplane_utils::mac_addr::MacAddr;

use crate::api::{Nlri, Path, ESI_SINGLE_HOMED};

// Builds a MAC/IP Advertisement for a locally learned MAC: label carries
// the VNI, the VXLAN encapsulation extended-community marks the tunnel
// type, and the nexthop is the local VTEP (the router-ID).
pub fn mac_advertisement(
    rd: RouteDistinguisher,
    etag: u32,
    mac: MacAddr,
    vni: u32,
    router_id: Ipv4Addr,
) -> Path {
    Path {
        nlri: Nlri::MacIpAdvertisement {
            rd,
            etag,
            mac,
            ip: None,
            esi: ESI_SINGLE_HOMED,
        },
        nexthop: Some(router_id.into()),
        label: vni,
        origin: Origin::Igp,
        ext_communities: vec![ExtCommunity::TunnelEncap(TunnelType::Vxlan)],
        neighbor: None,
        source_id: None,
        withdraw: false,
    }
}

pub fn mac_withdrawal(
    rd: RouteDistinguisher,
    etag: u32,
    mac: MacAddr,
    vni: u32,
    router_id: Ipv4Addr,
) -> Path {
    Path {
        withdraw: true,
        ..mac_advertisement(rd, etag, mac, vni, router_id)
    }
}

// Builds the IPv4 host route announcing the local router-ID (installed on
// the loopback at startup).
pub fn router_id_host_route(router_id: Ipv4Addr) -> Path {
    // A /32 prefix is always valid.
    let prefix = Ipv4Network::new(router_id, 32).unwrap();
    Path {
        nlri: Nlri::Ipv4Unicast { prefix },
        nexthop: Some(Ipv4Addr::UNSPECIFIED.into()),
        label: 0,
        origin: Origin::Igp,
        ext_communities: vec![],
        neighbor: None,
        source_id: None,
        withdraw: false,
    }
}
