//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

//! Mapping between BGP path records and kernel operations. The EVPN
//! conversions are pure; IPv4 nexthop resolution consults the kernel
//! neighbour tables.

use std::net::{IpAddr, Ipv4Addr};

use tracing::warn;
use vxplane_bgp::api::{Nlri, Path};
use vxplane_bgp::evpn;
use vxplane_kernel::{Kernel, AF_INET, AF_INET6};
use vxplane_utils::bgp::RouteDistinguisher;
use vxplane_utils::mac_addr::MacAddr;
use vxplane_utils::southbound::{FdbEntryMsg, Nexthop, RouteMsg};

use crate::config::VirtualNetworkCfg;

// Scope of one virtual network, as the translator needs it.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct EvpnContext {
    pub rd: RouteDistinguisher,
    pub etag: u32,
    pub vxlan_ifindex: u32,
}

// Converts a MAC/IP Advertisement path into the FDB entry it implies for
// the given virtual network. Returns `None` for self-originated paths,
// paths scoped to another (RD, etag), and paths without a VXLAN
// encapsulation extended-community.
pub fn evpn_macip_to_fdb(
    path: &Path,
    ctx: &EvpnContext,
) -> Option<FdbEntryMsg> {
    if path.is_self_originated() {
        return None;
    }
    let Nlri::MacIpAdvertisement { rd, etag, mac, .. } = &path.nlri else {
        return None;
    };
    if *rd != ctx.rd || *etag != ctx.etag {
        return None;
    }
    if !path.has_vxlan_encap() {
        return None;
    }
    let Some(IpAddr::V4(vtep)) = path.nexthop else {
        return None;
    };

    Some(FdbEntryMsg::new(ctx.vxlan_ifindex, *mac, vtep, path.label))
}

// Builds the MAC Advertisement announcing a locally learned MAC.
pub fn local_mac_learn_to_evpn(
    mac: MacAddr,
    cfg: &VirtualNetworkCfg,
    router_id: Ipv4Addr,
) -> Path {
    evpn::mac_advertisement(cfg.rd, cfg.etag, mac, cfg.vni, router_id)
}

// Converts an IPv4-unicast best path (or an ECMP group of sibling paths)
// into a kernel route. Paths whose nexthop cannot be resolved are skipped;
// a route with no usable nexthop is dropped entirely.
pub async fn path_to_kernel_route(
    kernel: &Kernel,
    paths: &[Path],
    router_id: Ipv4Addr,
) -> Option<RouteMsg> {
    let first = paths.first()?;
    let Nlri::Ipv4Unicast { prefix } = &first.nlri else {
        return None;
    };

    let mut nexthops = vec![];
    for path in paths.iter() {
        if let Some(nexthop) = resolve_nexthop(kernel, path).await {
            nexthops.push(nexthop);
        }
    }
    if nexthops.is_empty() {
        return None;
    }

    Some(RouteMsg::new(*prefix, Some(router_id), nexthops))
}

// Resolves a path's nexthop to something the kernel can forward through.
//
// IPv4 nexthops are used as-is. Other nexthops (IPv6 link-local learned
// over unnumbered peerings, tunnels) are resolved through the neighbour
// tables: find the nexthop's hardware address among the IPv6 neighbours,
// then reuse the IPv4 neighbour with the same hardware address on that
// link. When no such IPv4 neighbour exists, a link-local one is fabricated
// at 169.254.0.1 so the route can still be installed onlink.
pub async fn resolve_nexthop(kernel: &Kernel, path: &Path) -> Option<Nexthop> {
    if path.is_self_originated() {
        return None;
    }
    let nexthop = path.nexthop?;

    let nexthop = match nexthop {
        IpAddr::V4(addr) => {
            return Some(Nexthop::new(0, Some(addr), false));
        }
        IpAddr::V6(_) => nexthop,
    };

    let neighbours = match kernel.neigh_list(AF_INET6).await {
        Ok(neighbours) => neighbours,
        Err(error) => {
            error.log();
            return None;
        }
    };
    let Some(neighbour) =
        neighbours.iter().find(|entry| entry.addr == Some(nexthop))
    else {
        warn!(%nexthop, "no neighbour info for nexthop");
        return None;
    };
    let lladdr = neighbour.lladdr?;

    let v4_neighbours = match kernel.neigh_list(AF_INET).await {
        Ok(neighbours) => neighbours,
        Err(error) => {
            error.log();
            return None;
        }
    };
    if let Some(IpAddr::V4(gateway)) = v4_neighbours
        .iter()
        .filter(|entry| entry.ifindex == neighbour.ifindex)
        .find(|entry| entry.lladdr == Some(lladdr))
        .and_then(|entry| entry.addr)
    {
        return Some(Nexthop::new(neighbour.ifindex, Some(gateway), false));
    }

    // No IPv4 neighbour shares the hardware address; fabricate one.
    let gateway = Ipv4Addr::new(169, 254, 0, 1);
    if let Err(error) =
        kernel.neigh_add(neighbour.ifindex, gateway.into(), lladdr).await
    {
        error.log();
    }
    Some(Nexthop::new(neighbour.ifindex, Some(gateway), true))
}
