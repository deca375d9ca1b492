//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::{Ipv4Addr, Ipv6Addr};

use futures::TryStreamExt;
use ipnetwork::IpNetwork;
use netlink_packet_route::address::nlas::Nla;
use netlink_packet_route::constants::{AF_INET, AF_INET6};

use crate::{Error, Kernel, Result};

// ===== impl Kernel =====

impl Kernel {
    // Lists the addresses assigned to an interface.
    pub async fn addr_list(&self, ifindex: u32) -> Result<Vec<IpNetwork>> {
        let mut addresses = self
            .handle()
            .address()
            .get()
            .set_link_index_filter(ifindex)
            .execute();

        let mut list = vec![];
        loop {
            match addresses.try_next().await {
                Ok(Some(msg)) => {
                    let mut addr = None;
                    for nla in msg.nlas.into_iter() {
                        if let Nla::Address(bytes) = nla {
                            addr = Some(bytes);
                        }
                    }
                    let Some(addr) = addr else {
                        continue;
                    };
                    if let Some(addr) = parse_address(
                        msg.header.family,
                        msg.header.prefix_len,
                        addr,
                    ) {
                        list.push(addr);
                    }
                }
                Ok(None) => break,
                Err(error) => return Err(Error::from_netlink(error)),
            }
        }
        Ok(list)
    }

    // Assigns an address to an interface. Identity if already present.
    pub async fn addr_ensure(
        &self,
        ifindex: u32,
        addr: &IpNetwork,
    ) -> Result<()> {
        let assigned = self.addr_list(ifindex).await?;
        if assigned.contains(addr) {
            return Ok(());
        }

        match self
            .handle()
            .address()
            .add(ifindex, addr.ip(), addr.prefix())
            .execute()
            .await
        {
            Ok(()) => Ok(()),
            Err(error) => match Error::from_netlink(error) {
                // Another writer raced us to the same address.
                Error::Conflict(_) => Ok(()),
                error => Err(error),
            },
        }
    }
}

// ===== helper functions =====

fn parse_address(
    family: u8,
    prefixlen: u8,
    bytes: Vec<u8>,
) -> Option<IpNetwork> {
    let addr = match family as u16 {
        AF_INET => {
            let addr_array: [u8; 4] = bytes.try_into().ok()?;
            Ipv4Addr::from(addr_array).into()
        }
        AF_INET6 => {
            let addr_array: [u8; 16] = bytes.try_into().ok()?;
            Ipv6Addr::from(addr_array).into()
        }
        _ => return None,
    };
    IpNetwork::new(addr, prefixlen).ok()
}
