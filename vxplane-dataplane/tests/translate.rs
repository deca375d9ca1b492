//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::{IpAddr, Ipv4Addr};

use vxplane_bgp::api::{Nlri, Path, ESI_SINGLE_HOMED};
use vxplane_bgp::evpn;
use vxplane_dataplane::config::VirtualNetworkCfg;
use vxplane_dataplane::translate::{
    evpn_macip_to_fdb, local_mac_learn_to_evpn, EvpnContext,
};
use vxplane_utils::bgp::{ExtCommunity, RouteDistinguisher, TunnelType};
use vxplane_utils::mac_addr::MacAddr;

fn rd() -> RouteDistinguisher {
    "65000:10".parse().unwrap()
}

fn mac() -> MacAddr {
    "aa:aa:aa:aa:aa:02".parse().unwrap()
}

fn remote_vtep() -> Ipv4Addr {
    Ipv4Addr::new(192, 168, 0, 2)
}

fn context() -> EvpnContext {
    EvpnContext { rd: rd(), etag: 10, vxlan_ifindex: 7 }
}

// A MAC advertisement as it would come back from a remote speaker.
fn received_mac_advertisement() -> Path {
    let mut path = evpn::mac_advertisement(
        rd(),
        10,
        mac(),
        10,
        remote_vtep(),
    );
    path.neighbor = Some(IpAddr::from(remote_vtep()));
    path.source_id = Some(remote_vtep());
    path
}

#[test]
fn mac_advertisement_round_trip() {
    let entry =
        evpn_macip_to_fdb(&received_mac_advertisement(), &context()).unwrap();
    assert_eq!(entry.ifindex, 7);
    assert_eq!(entry.mac, mac());
    assert_eq!(entry.vtep, remote_vtep());
    assert_eq!(entry.vni, 10);
}

#[test]
fn self_originated_paths_are_ignored() {
    let mut path = received_mac_advertisement();
    path.neighbor = None;
    assert_eq!(evpn_macip_to_fdb(&path, &context()), None);
}

#[test]
fn foreign_rd_or_etag_is_ignored() {
    let mut ctx = context();
    ctx.rd = "65000:20".parse().unwrap();
    assert_eq!(
        evpn_macip_to_fdb(&received_mac_advertisement(), &ctx),
        None
    );

    let mut ctx = context();
    ctx.etag = 20;
    assert_eq!(
        evpn_macip_to_fdb(&received_mac_advertisement(), &ctx),
        None
    );
}

#[test]
fn missing_vxlan_encapsulation_is_ignored() {
    let mut path = received_mac_advertisement();
    path.ext_communities.clear();
    assert_eq!(evpn_macip_to_fdb(&path, &context()), None);

    let mut path = received_mac_advertisement();
    path.ext_communities =
        vec![ExtCommunity::TunnelEncap(TunnelType::Nvgre)];
    assert_eq!(evpn_macip_to_fdb(&path, &context()), None);
}

#[test]
fn ipv4_unicast_paths_are_not_fdb_material() {
    let mut path = received_mac_advertisement();
    path.nlri = Nlri::Ipv4Unicast { prefix: "10.0.0.0/24".parse().unwrap() };
    assert_eq!(evpn_macip_to_fdb(&path, &context()), None);
}

#[test]
fn local_learn_builds_scoped_advertisement() {
    let cfg = VirtualNetworkCfg {
        rd: rd(),
        vni: 10,
        vxlan_port: 4789,
        vtep_interface: "eth1".to_owned(),
        etag: 10,
        sniff_interfaces: vec!["eth2".to_owned()],
        member_interfaces: vec!["eth2".to_owned()],
    };
    let router_id = Ipv4Addr::new(192, 168, 0, 1);

    let path = local_mac_learn_to_evpn(mac(), &cfg, router_id);
    assert!(path.is_self_originated());
    assert!(!path.withdraw);
    assert_eq!(path.label, 10);
    assert_eq!(path.nexthop, Some(IpAddr::from(router_id)));
    assert_eq!(
        path.ext_communities,
        vec![ExtCommunity::TunnelEncap(TunnelType::Vxlan)]
    );
    match path.nlri {
        Nlri::MacIpAdvertisement { rd: nlri_rd, etag, mac: nlri_mac, ip, esi } => {
            assert_eq!(nlri_rd, rd());
            assert_eq!(etag, 10);
            assert_eq!(nlri_mac, mac());
            assert_eq!(ip, None);
            assert_eq!(esi, ESI_SINGLE_HOMED);
        }
        _ => panic!("unexpected NLRI kind"),
    }
}
