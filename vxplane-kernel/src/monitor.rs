//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use futures::channel::mpsc::UnboundedReceiver;
use netlink_packet_core::{NetlinkMessage, NetlinkPayload};
use netlink_packet_route::constants::{AF_BRIDGE, RTNLGRP_NEIGH};
use netlink_packet_route::neighbour::{NeighbourMessage, Nla};
use netlink_packet_route::rtnl::RtnlMessage;
use netlink_sys::{AsyncSocket, SocketAddr};
use rtnetlink::new_connection;
use vxplane_utils::mac_addr::MacAddr;
use vxplane_utils::southbound::{MacLearnMsg, NeighbourState};

use crate::{Error, Result};

pub type NetlinkMonitor =
    UnboundedReceiver<(NetlinkMessage<RtnlMessage>, SocketAddr)>;

// ===== global functions =====

// Opens a netlink socket subscribed to neighbour table notifications.
pub fn neigh_monitor() -> Result<NetlinkMonitor> {
    let (mut conn, _, monitor) = new_connection().map_err(Error::Socket)?;

    let groups = 1 << (RTNLGRP_NEIGH - 1);
    let addr = SocketAddr::new(0, groups);
    conn.socket_mut()
        .socket_mut()
        .bind(&addr)
        .map_err(Error::Socket)?;
    tokio::spawn(conn);

    Ok(monitor)
}

// Decodes a monitor message into a MAC learning event, if it is one.
//
// Permanent entries are skipped: those are the agent's own installs, not
// kernel learning.
pub fn mac_learn(msg: &NetlinkMessage<RtnlMessage>) -> Option<MacLearnMsg> {
    match &msg.payload {
        NetlinkPayload::InnerMessage(RtnlMessage::NewNeighbour(msg)) => {
            decode_neighbour(msg, false)
        }
        NetlinkPayload::InnerMessage(RtnlMessage::DelNeighbour(msg)) => {
            decode_neighbour(msg, true)
        }
        _ => None,
    }
}

// ===== helper functions =====

fn decode_neighbour(
    msg: &NeighbourMessage,
    deleted: bool,
) -> Option<MacLearnMsg> {
    if msg.header.family as u16 != AF_BRIDGE {
        return None;
    }
    let state = NeighbourState::from_bits_truncate(msg.header.state);
    if state.contains(NeighbourState::PERMANENT) {
        return None;
    }

    let mut mac = None;
    for nla in msg.nlas.iter() {
        if let Nla::LinkLocalAddress(bytes) = nla {
            mac = MacAddr::try_from(bytes.as_slice()).ok();
        }
    }
    let mac = mac?;
    if mac.is_unspecified() || mac.is_multicast() {
        return None;
    }

    Some(MacLearnMsg::new(msg.header.ifindex, mac, deleted))
}
