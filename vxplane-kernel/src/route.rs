//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use ipnetwork::Ipv4Network;
use netlink_packet_route::route::nlas::{NextHop, NextHopFlags, Nla};
use vxplane_utils::southbound::{Nexthop, RouteMsg};

use crate::{Error, Kernel, Result};

// Route protocol types as defined in the rtnetlink.h kernel header.
const NETLINK_PROTO_BGP: u8 = 186;

// ===== impl Kernel =====

impl Kernel {
    // Installs or replaces an IPv4 route in the main table.
    //
    // Onlink gateways and multipath routes are emitted through an
    // RTA_MULTIPATH attribute; a one-element multipath is equivalent to a
    // plain gateway route as far as the kernel is concerned.
    pub async fn route_replace(&self, route: &RouteMsg) -> Result<()> {
        if route.nexthops.is_empty() {
            return Ok(());
        }

        // Create netlink request.
        let mut request = self.handle().route().add();
        request = request.protocol(NETLINK_PROTO_BGP);

        // Set destination prefix.
        let mut request = request
            .v4()
            .replace()
            .destination_prefix(route.prefix.ip(), route.prefix.prefix());

        // Set preferred source address.
        if let Some(source) = route.source {
            request = request.pref_source(source);
        }

        // Add nexthops.
        match route.nexthops.as_slice() {
            [nexthop] if !nexthop.onlink => {
                if let Some(gateway) = nexthop.gateway {
                    request = request.gateway(gateway);
                }
                if nexthop.ifindex != 0 {
                    request = request.output_interface(nexthop.ifindex);
                }
            }
            nexthops => {
                let hops =
                    nexthops.iter().map(next_hop).collect::<Vec<_>>();
                request.message_mut().nlas.push(Nla::MultiPath(hops));
            }
        }

        // Execute request.
        request.execute().await.map_err(Error::from_netlink)
    }

    // Removes an IPv4 route from the main table. Identity on absence.
    pub async fn route_delete(&self, prefix: &Ipv4Network) -> Result<()> {
        // Create netlink request. Matching on the protocol restricts the
        // deletion to routes this agent installed.
        let mut request = self
            .handle()
            .route()
            .add()
            .protocol(NETLINK_PROTO_BGP)
            .v4()
            .destination_prefix(prefix.ip(), prefix.prefix());

        // Execute request.
        let request = self.handle().route().del(request.message_mut().clone());
        match request.execute().await {
            Ok(()) => Ok(()),
            Err(error) => match Error::from_netlink(error) {
                Error::NotFound => Ok(()),
                error => Err(error),
            },
        }
    }
}

// ===== helper functions =====

fn next_hop(nexthop: &Nexthop) -> NextHop {
    let mut flags = NextHopFlags::empty();
    if nexthop.onlink {
        flags |= NextHopFlags::RTNH_F_ONLINK;
    }

    let mut nlas = vec![];
    if let Some(gateway) = nexthop.gateway {
        nlas.push(Nla::Gateway(gateway.octets().to_vec()));
    }

    NextHop {
        flags,
        hops: 0,
        interface_id: nexthop.ifindex,
        nlas,
    }
}
