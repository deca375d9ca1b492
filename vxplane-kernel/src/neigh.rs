//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use futures::TryStreamExt;
use netlink_packet_route::constants::{
    AF_BRIDGE, NTF_SELF, NUD_NOARP, NUD_PERMANENT,
};
use netlink_packet_route::neighbour::{NeighbourMessage, Nla};
use vxplane_utils::mac_addr::MacAddr;
use vxplane_utils::southbound::{FdbEntryMsg, NeighbourMsg, NeighbourState};

use crate::{Error, Kernel, Result};

// ===== impl Kernel =====

impl Kernel {
    // Installs a permanent neighbour cache entry.
    pub async fn neigh_add(
        &self,
        ifindex: u32,
        addr: IpAddr,
        lladdr: MacAddr,
    ) -> Result<()> {
        let request = self
            .handle()
            .neighbours()
            .add(ifindex, addr)
            .link_local_address(&lladdr.as_bytes())
            .state(NUD_PERMANENT)
            .replace();
        request.execute().await.map_err(Error::from_netlink)
    }

    // Dumps the neighbour table of the given address family. The kernel
    // dispatches the dump on the family: AF_BRIDGE selects the FDB,
    // AF_INET/AF_INET6 the neighbour caches.
    pub async fn neigh_list(&self, family: u16) -> Result<Vec<NeighbourMsg>> {
        let mut request = self.handle().neighbours().get();
        request.message_mut().header.family = family as u8;
        let mut neighbours = request.execute();

        let mut list = vec![];
        loop {
            match neighbours.try_next().await {
                Ok(Some(msg)) => {
                    if msg.header.family as u16 != family {
                        continue;
                    }
                    list.push(neighbour_msg(msg));
                }
                Ok(None) => break,
                Err(error) => return Err(Error::from_netlink(error)),
            }
        }
        Ok(list)
    }

    // Installs a bridge FDB entry on the VXLAN device, pointing the remote
    // MAC at its VTEP. The entry carries the `self` flag so it lands in the
    // device's own FDB rather than the bridge master's.
    pub async fn fdb_append(&self, entry: &FdbEntryMsg) -> Result<()> {
        let mut request = self
            .handle()
            .neighbours()
            .add_bridge(entry.ifindex, &entry.mac.as_bytes())
            .state(NUD_NOARP | NUD_PERMANENT)
            .flags(NTF_SELF)
            .replace();
        request
            .message_mut()
            .nlas
            .push(Nla::Destination(entry.vtep.octets().to_vec()));
        request.message_mut().nlas.push(Nla::Vni(entry.vni));
        request.execute().await.map_err(Error::from_netlink)
    }

    // Removes a bridge FDB entry. Identity on absence.
    pub async fn fdb_remove(&self, ifindex: u32, mac: MacAddr) -> Result<()> {
        let mut message = NeighbourMessage::default();
        message.header.family = AF_BRIDGE as u8;
        message.header.ifindex = ifindex;
        message.header.flags = NTF_SELF;
        message.nlas.push(Nla::LinkLocalAddress(mac.as_bytes().to_vec()));

        match self.handle().neighbours().del(message).execute().await {
            Ok(()) => Ok(()),
            Err(error) => match Error::from_netlink(error) {
                Error::NotFound => Ok(()),
                error => Err(error),
            },
        }
    }
}

// ===== helper functions =====

fn neighbour_msg(msg: NeighbourMessage) -> NeighbourMsg {
    let mut addr = None;
    let mut lladdr = None;
    for nla in msg.nlas.into_iter() {
        match nla {
            // The destination length tells the family apart; AF_BRIDGE
            // entries carry the remote VTEP address here.
            Nla::Destination(bytes) => {
                addr = match bytes.len() {
                    4 => <[u8; 4]>::try_from(bytes.as_slice())
                        .ok()
                        .map(|octets| IpAddr::from(Ipv4Addr::from(octets))),
                    16 => <[u8; 16]>::try_from(bytes.as_slice())
                        .ok()
                        .map(|octets| IpAddr::from(Ipv6Addr::from(octets))),
                    _ => None,
                };
            }
            Nla::LinkLocalAddress(bytes) => {
                lladdr = MacAddr::try_from(bytes.as_slice()).ok();
            }
            _ => (),
        }
    }
    NeighbourMsg::new(
        msg.header.ifindex,
        addr,
        lladdr,
        NeighbourState::from_bits_truncate(msg.header.state),
    )
}
