//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use futures::TryStreamExt;
use netlink_packet_route::link::nlas::{Info, InfoData, InfoKind, InfoVxlan, Nla};
use netlink_packet_route::LinkMessage;
use std::net::Ipv4Addr;

use crate::{Error, Kernel, Result};

// Specification of a link owned by the agent.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum LinkSpec {
    Vxlan(VxlanSpec),
    Bridge(BridgeSpec),
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct VxlanSpec {
    pub name: String,
    pub vni: u32,
    pub port: u16,
    // Local VTEP address.
    pub local: Ipv4Addr,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BridgeSpec {
    pub name: String,
}

// ===== impl LinkSpec =====

impl LinkSpec {
    pub fn name(&self) -> &str {
        match self {
            LinkSpec::Vxlan(vxlan) => &vxlan.name,
            LinkSpec::Bridge(bridge) => &bridge.name,
        }
    }
}

// ===== impl Kernel =====

impl Kernel {
    // Returns the interface index of the named link, if it exists.
    pub async fn link_index(&self, name: &str) -> Result<Option<u32>> {
        match self.link_get(name).await {
            Ok(link) => Ok(Some(link.header.index)),
            Err(Error::NotFound) => Ok(None),
            Err(error) => Err(error),
        }
    }

    async fn link_get(&self, name: &str) -> Result<LinkMessage> {
        let mut links = self
            .handle()
            .link()
            .get()
            .match_name(name.to_owned())
            .execute();
        match links.try_next().await {
            Ok(Some(link)) => Ok(link),
            Ok(None) => Err(Error::NotFound),
            Err(error) => Err(Error::from_netlink(error)),
        }
    }

    // Creates the requested link unless a compatible one already exists.
    // Returns the interface index in either case; an existing link of a
    // different kind or with different attributes is a conflict.
    pub async fn link_ensure(&self, spec: &LinkSpec) -> Result<u32> {
        match self.link_get(spec.name()).await {
            Ok(link) => {
                link_compatible(&link, spec)?;
                self.link_up(link.header.index).await?;
                Ok(link.header.index)
            }
            Err(Error::NotFound) => {
                self.link_create(spec).await?;
                let link = self.link_get(spec.name()).await?;
                self.link_up(link.header.index).await?;
                Ok(link.header.index)
            }
            Err(error) => Err(error),
        }
    }

    async fn link_create(&self, spec: &LinkSpec) -> Result<()> {
        let request = self.handle().link().add();
        match spec {
            LinkSpec::Vxlan(vxlan) => {
                // Learning and ARP proxying stay off: the FDB of this device
                // is controlled exclusively by the agent.
                request
                    .vxlan(vxlan.name.clone(), vxlan.vni)
                    .port(vxlan.port)
                    .local(vxlan.local)
                    .learning(0)
                    .proxy(0)
                    .execute()
                    .await
            }
            LinkSpec::Bridge(bridge) => {
                request.bridge(bridge.name.clone()).execute().await
            }
        }
        .map_err(Error::from_netlink)
    }

    pub async fn link_up(&self, ifindex: u32) -> Result<()> {
        self.handle()
            .link()
            .set(ifindex)
            .up()
            .execute()
            .await
            .map_err(Error::from_netlink)
    }

    // Deletes the named link. Identity if the link does not exist.
    pub async fn link_remove(&self, name: &str) -> Result<()> {
        let Some(ifindex) = self.link_index(name).await? else {
            return Ok(());
        };
        match self.handle().link().del(ifindex).execute().await {
            Ok(()) => Ok(()),
            Err(error) => match Error::from_netlink(error) {
                Error::NotFound => Ok(()),
                error => Err(error),
            },
        }
    }

    pub async fn link_enslave(&self, ifindex: u32, master: u32) -> Result<()> {
        self.handle()
            .link()
            .set(ifindex)
            .master(master)
            .execute()
            .await
            .map_err(Error::from_netlink)?;
        self.link_up(ifindex).await
    }

    // Ensures a bridge exists and enslaves the given members to it.
    pub async fn bridge_ensure(
        &self,
        name: &str,
        members: &[u32],
    ) -> Result<u32> {
        let spec = LinkSpec::Bridge(BridgeSpec { name: name.to_owned() });
        let bridge = self.link_ensure(&spec).await?;
        for member in members.iter().copied() {
            self.link_enslave(member, bridge).await?;
        }
        Ok(bridge)
    }
}

// ===== helper functions =====

fn link_compatible(link: &LinkMessage, spec: &LinkSpec) -> Result<()> {
    // Fetch the link kind and type-specific attributes.
    let mut kind = None;
    let mut vxlan_attrs = None;
    for nla in link.nlas.iter() {
        if let Nla::Info(infos) = nla {
            for info in infos.iter() {
                match info {
                    Info::Kind(link_kind) => kind = Some(link_kind.clone()),
                    Info::Data(InfoData::Vxlan(attrs)) => {
                        vxlan_attrs = Some(attrs)
                    }
                    _ => (),
                }
            }
        }
    }

    match spec {
        LinkSpec::Bridge(bridge) => {
            if kind != Some(InfoKind::Bridge) {
                return Err(Error::Conflict(format!(
                    "link {} exists but is not a bridge",
                    bridge.name
                )));
            }
        }
        LinkSpec::Vxlan(vxlan) => {
            if kind != Some(InfoKind::Vxlan) {
                return Err(Error::Conflict(format!(
                    "link {} exists but is not a VXLAN device",
                    vxlan.name
                )));
            }
            for attr in vxlan_attrs.into_iter().flatten() {
                match attr {
                    InfoVxlan::Id(vni) if *vni != vxlan.vni => {
                        return Err(Error::Conflict(format!(
                            "link {} carries VNI {}, expected {}",
                            vxlan.name, vni, vxlan.vni
                        )));
                    }
                    InfoVxlan::Port(port) if *port != vxlan.port => {
                        return Err(Error::Conflict(format!(
                            "link {} uses UDP port {}, expected {}",
                            vxlan.name, port, vxlan.port
                        )));
                    }
                    InfoVxlan::Local(local)
                        if local.as_slice()
                            != vxlan.local.octets().as_slice() =>
                    {
                        return Err(Error::Conflict(format!(
                            "link {} is bound to another VTEP address",
                            vxlan.name
                        )));
                    }
                    _ => (),
                }
            }
        }
    }

    Ok(())
}
