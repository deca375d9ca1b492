//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;

use async_trait::async_trait;
use derive_new::new;
use ipnetwork::Ipv4Network;
use serde::{Deserialize, Serialize};
use vxplane_utils::bgp::{
    AfiSafi, ExtCommunity, Origin, RouteDistinguisher, RouteTarget,
    TunnelType,
};
use vxplane_utils::mac_addr::MacAddr;
use vxplane_utils::Receiver;

use crate::error::Error;

// Ethernet Segment Identifier of single-homed segments (RFC 7432).
pub const ESI_SINGLE_HOMED: [u8; 10] = [0; 10];

// NLRI kinds the agent consumes. Anything else never leaves the speaker.
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum Nlri {
    Ipv4Unicast {
        prefix: Ipv4Network,
    },
    // EVPN MAC/IP Advertisement route (RFC 7432, route type 2).
    MacIpAdvertisement {
        rd: RouteDistinguisher,
        etag: u32,
        mac: MacAddr,
        ip: Option<IpAddr>,
        esi: [u8; 10],
    },
    // EVPN Inclusive Multicast Ethernet Tag route (route type 3).
    InclusiveMulticast {
        rd: RouteDistinguisher,
        etag: u32,
        originator: IpAddr,
    },
}

// A BGP path as observed through the speaker's watch stream, reduced to the
// attributes the dataplane acts on.
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct Path {
    pub nlri: Nlri,
    // Nexthop from MP_REACH_NLRI or the NEXT_HOP attribute.
    pub nexthop: Option<IpAddr>,
    // MPLS label / VNI field of EVPN NLRIs.
    pub label: u32,
    pub origin: Origin,
    pub ext_communities: Vec<ExtCommunity>,
    // Address of the peer the path was learned from. Absent on paths the
    // local speaker originated itself.
    pub neighbor: Option<IpAddr>,
    // BGP identifier of the originating speaker.
    pub source_id: Option<Ipv4Addr>,
    pub withdraw: bool,
}

// Events produced by the speaker's watch channel.
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum WatchEvent {
    // New set of best paths. `multipath` groups ECMP siblings of the same
    // destination; when present it supersedes `paths`.
    BestPath {
        paths: Vec<Path>,
        multipath: Vec<Vec<Path>>,
    },
    // Per-peer update (used for EVPN route propagation).
    PeerUpdate {
        paths: Vec<Path>,
    },
    // The watch was shut down; no further events will arrive.
    Closed,
}

// Target table of a path mutation.
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum Table {
    Global,
    Vrf(String),
}

// Global configuration of the running speaker.
#[derive(Clone, Copy, Debug, Eq, PartialEq, new)]
#[derive(Deserialize, Serialize)]
pub struct GlobalInfo {
    pub router_id: Ipv4Addr,
    pub local_as: u32,
}

// VRF registration request.
#[derive(Clone, Debug, Eq, PartialEq, new)]
#[derive(Deserialize, Serialize)]
pub struct VrfMsg {
    pub name: String,
    pub rd: RouteDistinguisher,
    pub import_rt: Vec<RouteTarget>,
    pub export_rt: Vec<RouteTarget>,
    pub id: u32,
}

// RPC surface of the external BGP speaker.
//
// Implementations wrap whatever wire transport the speaker exposes; the
// agent is indifferent to it. All methods must be safe for concurrent use.
#[async_trait]
pub trait SpeakerRpc: Send + Sync {
    // Opens a fresh watch stream. Events observed before the call are not
    // replayed.
    async fn watch(&self) -> Result<Receiver<WatchEvent>, Error>;

    async fn add_path(&self, table: Table, path: Path) -> Result<(), Error>;

    async fn delete_path(&self, table: Table, path: Path)
        -> Result<(), Error>;

    async fn get_global(&self) -> Result<GlobalInfo, Error>;

    async fn add_vrf(&self, vrf: VrfMsg) -> Result<(), Error>;
}

pub type SpeakerRpcRef = Arc<dyn SpeakerRpc>;

// ===== impl Nlri =====

impl Nlri {
    pub fn afi_safi(&self) -> AfiSafi {
        match self {
            Nlri::Ipv4Unicast { .. } => AfiSafi::Ipv4Unicast,
            Nlri::MacIpAdvertisement { .. }
            | Nlri::InclusiveMulticast { .. } => AfiSafi::L2vpnEvpn,
        }
    }
}

// ===== impl Path =====

impl Path {
    // Paths without a peer address were originated by the local speaker.
    pub fn is_self_originated(&self) -> bool {
        self.neighbor.is_none()
    }

    // Returns true if the path carries a VXLAN tunnel encapsulation
    // extended-community.
    pub fn has_vxlan_encap(&self) -> bool {
        self.ext_communities.iter().any(|comm| {
            matches!(comm, ExtCommunity::TunnelEncap(TunnelType::Vxlan))
        })
    }
}
