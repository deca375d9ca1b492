//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::{IpAddr, Ipv4Addr};

use bitflags::bitflags;
use derive_new::new;
use ipnetwork::Ipv4Network;
use serde::{Deserialize, Serialize};

use crate::mac_addr::MacAddr;

bitflags! {
    // Neighbour cache entry states (NUD_* in the neighbour.h kernel
    // header).
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    #[derive(Deserialize, Serialize)]
    #[serde(transparent)]
    pub struct NeighbourState: u16 {
        const INCOMPLETE = 0x01;
        const REACHABLE = 0x02;
        const STALE = 0x04;
        const DELAY = 0x08;
        const PROBE = 0x10;
        const FAILED = 0x20;
        const NOARP = 0x40;
        const PERMANENT = 0x80;
    }
}

// Resolved IPv4 nexthop, ready to be programmed into the kernel.
//
// An `ifindex` of zero leaves the output interface unspecified, letting the
// kernel pick it from the gateway's connected route.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd, new)]
#[derive(Deserialize, Serialize)]
pub struct Nexthop {
    pub ifindex: u32,
    pub gateway: Option<Ipv4Addr>,
    pub onlink: bool,
}

// Kernel route derived from an IPv4-unicast best path.
#[derive(Clone, Debug, Eq, PartialEq, new)]
#[derive(Deserialize, Serialize)]
pub struct RouteMsg {
    pub prefix: Ipv4Network,
    // Preferred source address (the local router-ID).
    pub source: Option<Ipv4Addr>,
    pub nexthops: Vec<Nexthop>,
}

// Bridge FDB entry pointing a remote MAC at its VTEP.
#[derive(Clone, Copy, Debug, Eq, PartialEq, new)]
#[derive(Deserialize, Serialize)]
pub struct FdbEntryMsg {
    // VXLAN device the entry is installed on (with the `self` flag).
    pub ifindex: u32,
    pub mac: MacAddr,
    // Remote VTEP carried in the entry's destination field.
    pub vtep: Ipv4Addr,
    pub vni: u32,
}

// Neighbour cache entry as dumped from the kernel.
#[derive(Clone, Debug, Eq, PartialEq, new)]
#[derive(Deserialize, Serialize)]
pub struct NeighbourMsg {
    pub ifindex: u32,
    pub addr: Option<IpAddr>,
    pub lladdr: Option<MacAddr>,
    pub state: NeighbourState,
}

// ===== impl NeighbourMsg =====

impl NeighbourMsg {
    // Entries the agent (or an administrator) pinned, as opposed to
    // entries the kernel learned on its own.
    pub fn is_permanent(&self) -> bool {
        self.state.contains(NeighbourState::PERMANENT)
    }
}

// MAC learning event observed on a bridge port.
#[derive(Clone, Copy, Debug, Eq, PartialEq, new)]
#[derive(Deserialize, Serialize)]
pub struct MacLearnMsg {
    pub ifindex: u32,
    pub mac: MacAddr,
    // Set when the kernel flushed the entry (RTM_DELNEIGH).
    pub deleted: bool,
}
