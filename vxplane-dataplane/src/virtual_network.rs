//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

//! Per-tenant overlay worker. Each worker exclusively owns one VXLAN
//! device and one bridge, translates EVPN routes scoped to its (RD, etag)
//! into FDB entries, and advertises MACs learned on its sniff interfaces.

use std::collections::{BTreeMap, BTreeSet};
use std::net::Ipv4Addr;

use futures::StreamExt;
use ipnetwork::IpNetwork;
use tokio::sync::mpsc;
use tracing::{debug, debug_span, info, Instrument};
use vxplane_bgp::api::{Nlri, Path, Table, WatchEvent};
use vxplane_bgp::{evpn, SpeakerClient};
use vxplane_kernel::{Kernel, LinkSpec, VxlanSpec, AF_BRIDGE};
use vxplane_utils::mac_addr::MacAddr;
use vxplane_utils::southbound::{FdbEntryMsg, MacLearnMsg};
use vxplane_utils::worker::Worker;
use vxplane_utils::{Receiver, Sender};

use crate::config::VirtualNetworkCfg;
use crate::error::{retry_transient, Error};
use crate::translate::{self, EvpnContext};

// Worker lifecycle states.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum State {
    Init,
    Provisioning,
    Running,
    Stopping,
    Failed,
    Terminated,
}

pub struct VirtualNetwork {
    cfg: VirtualNetworkCfg,
    state: State,
    kernel: Kernel,
    speaker: SpeakerClient,
    router_id: Ipv4Addr,
    // Kernel objects owned by this worker.
    vxlan_ifindex: u32,
    bridge_ifindex: u32,
    sniff_ifindexes: BTreeSet<u32>,
    // MACs this worker advertised into EVPN.
    advertised: BTreeSet<MacAddr>,
    // FDB entries installed from remote advertisements.
    fdb: BTreeMap<MacAddr, FdbEntryMsg>,
}

// Handle held by the supervisor. Stopping is a rendezvous: the call
// returns only once the worker finished its teardown, so an RD can be
// safely re-added right after.
#[derive(Debug)]
pub struct VirtualNetworkHandle {
    shutdown_tx: Sender<()>,
    worker: Worker<State>,
}

// ===== impl VirtualNetworkHandle =====

impl VirtualNetworkHandle {
    pub async fn stop(self) -> State {
        let _ = self.shutdown_tx.send(()).await;
        self.worker.join_or(State::Terminated).await
    }
}

// ===== impl VirtualNetwork =====

impl VirtualNetwork {
    async fn run(mut self, mut shutdown_rx: Receiver<()>) -> State {
        // Reject inconsistent configuration before touching the kernel.
        if let Err(reason) = self.cfg.validate() {
            Error::InvalidNetworkConfig(self.cfg.rd, reason).log();
            return self.fail(&mut shutdown_rx).await;
        }

        self.state = State::Provisioning;
        if let Err(error) = self.provision().await {
            error.log();
            return self.fail(&mut shutdown_rx).await;
        }

        let mut monitor_rx = match vxplane_kernel::neigh_monitor() {
            Ok(monitor_rx) => monitor_rx,
            Err(error) => {
                Error::Kernel(error).log();
                return self.fail(&mut shutdown_rx).await;
            }
        };
        let mut watch_rx = self.speaker.subscribe();

        self.state = State::Running;
        info!(
            vni = self.cfg.vni,
            vxlan = self.vxlan_ifindex,
            bridge = self.bridge_ifindex,
            "virtual network is running"
        );

        // Advertise MACs the kernel learned before the worker started.
        self.advertise_existing().await;

        loop {
            tokio::select! {
                event = watch_rx.recv() => match event {
                    Some(WatchEvent::BestPath { paths, multipath }) => {
                        for path in
                            paths.iter().chain(multipath.iter().flatten())
                        {
                            self.process_path(path).await;
                        }
                    }
                    Some(WatchEvent::PeerUpdate { paths }) => {
                        for path in paths.iter() {
                            self.process_path(path).await;
                        }
                    }
                    Some(WatchEvent::Closed) | None => break,
                },
                Some((msg, _)) = monitor_rx.next() => {
                    if let Some(learn) = vxplane_kernel::mac_learn(&msg) {
                        self.process_learn(learn).await;
                    }
                }
                _ = shutdown_rx.recv() => break,
            }
        }

        self.state = State::Stopping;
        self.teardown().await;
        self.state = State::Terminated;
        self.state
    }

    // Parks a failed worker until the supervisor asks it to terminate.
    // Kernel objects are not touched: a conflict means they are not ours.
    async fn fail(&mut self, shutdown_rx: &mut Receiver<()>) -> State {
        self.state = State::Failed;
        let _ = shutdown_rx.recv().await;
        State::Terminated
    }

    async fn provision(&mut self) -> Result<(), Error> {
        // The VTEP address is the first IPv4 address of the configured
        // interface.
        let vtep_ifindex = self
            .kernel
            .link_index(&self.cfg.vtep_interface)
            .await?
            .ok_or_else(|| {
                Error::InterfaceNotFound(self.cfg.vtep_interface.clone())
            })?;
        let local = self
            .kernel
            .addr_list(vtep_ifindex)
            .await?
            .into_iter()
            .find_map(|addr| match addr {
                IpNetwork::V4(network) => Some(network.ip()),
                IpNetwork::V6(_) => None,
            })
            .ok_or_else(|| {
                Error::VtepAddressNotFound(self.cfg.vtep_interface.clone())
            })?;

        let vxlan = LinkSpec::Vxlan(VxlanSpec {
            name: self.cfg.vxlan_name(),
            vni: self.cfg.vni,
            port: self.cfg.vxlan_port,
            local,
        });
        self.vxlan_ifindex = self.kernel.link_ensure(&vxlan).await?;

        let mut members = vec![self.vxlan_ifindex];
        for name in self.cfg.member_interfaces.iter() {
            let ifindex = self
                .kernel
                .link_index(name)
                .await?
                .ok_or_else(|| Error::InterfaceNotFound(name.clone()))?;
            members.push(ifindex);
        }
        self.bridge_ifindex = self
            .kernel
            .bridge_ensure(&self.cfg.bridge_name(), &members)
            .await?;

        for name in self.cfg.sniff_interfaces.iter() {
            let ifindex = self
                .kernel
                .link_index(name)
                .await?
                .ok_or_else(|| Error::InterfaceNotFound(name.clone()))?;
            self.sniff_ifindexes.insert(ifindex);
        }

        Ok(())
    }

    // Sweeps the bridge neighbour table for MACs already learned on the
    // sniff interfaces.
    async fn advertise_existing(&mut self) {
        let neighbours = match self.kernel.neigh_list(AF_BRIDGE).await {
            Ok(neighbours) => neighbours,
            Err(error) => {
                Error::Kernel(error).log();
                return;
            }
        };

        let macs = neighbours
            .iter()
            .filter(|entry| self.sniff_ifindexes.contains(&entry.ifindex))
            .filter(|entry| !entry.is_permanent())
            .filter_map(|entry| entry.lladdr)
            .filter(|mac| !mac.is_unspecified() && !mac.is_multicast())
            .collect::<Vec<_>>();
        for mac in macs {
            self.advertise(mac).await;
        }
    }

    async fn process_learn(&mut self, learn: MacLearnMsg) {
        if !self.sniff_ifindexes.contains(&learn.ifindex) {
            return;
        }
        if learn.deleted {
            // The kernel flushed the entry; withdrawing lets a later
            // re-learn re-advertise the MAC.
            self.withdraw(learn.mac).await;
        } else {
            self.advertise(learn.mac).await;
        }
    }

    async fn advertise(&mut self, mac: MacAddr) {
        // One advertisement per MAC per virtual network.
        if !self.advertised.insert(mac) {
            return;
        }
        let path =
            translate::local_mac_learn_to_evpn(mac, &self.cfg, self.router_id);
        debug!(%mac, "advertising locally learned MAC");
        if let Err(error) = self.speaker.add_path(Table::Global, path).await {
            error.log();
            self.advertised.remove(&mac);
        }
    }

    async fn withdraw(&mut self, mac: MacAddr) {
        if !self.advertised.remove(&mac) {
            return;
        }
        let path = evpn::mac_withdrawal(
            self.cfg.rd,
            self.cfg.etag,
            mac,
            self.cfg.vni,
            self.router_id,
        );
        debug!(%mac, "withdrawing MAC advertisement");
        if let Err(error) = self.speaker.delete_path(Table::Global, path).await
        {
            error.log();
        }
    }

    async fn process_path(&mut self, path: &Path) {
        match &path.nlri {
            Nlri::MacIpAdvertisement { rd, etag, mac, .. } => {
                if path.is_self_originated()
                    || *rd != self.cfg.rd
                    || *etag != self.cfg.etag
                {
                    return;
                }

                if path.withdraw {
                    let Some(entry) = self.fdb.remove(mac) else {
                        return;
                    };
                    info!(%mac, vtep = %entry.vtep, "removing FDB entry");
                    if let Err(error) = retry_transient(|| {
                        self.kernel.fdb_remove(entry.ifindex, entry.mac)
                    })
                    .await
                    {
                        Error::Kernel(error).log();
                    }
                    return;
                }

                let ctx = EvpnContext {
                    rd: self.cfg.rd,
                    etag: self.cfg.etag,
                    vxlan_ifindex: self.vxlan_ifindex,
                };
                let Some(entry) = translate::evpn_macip_to_fdb(path, &ctx)
                else {
                    return;
                };
                info!(%mac, vtep = %entry.vtep, "installing FDB entry");
                match retry_transient(|| self.kernel.fdb_append(&entry)).await
                {
                    Ok(()) => {
                        self.fdb.insert(entry.mac, entry);
                    }
                    Err(error) => Error::Kernel(error).log(),
                }
            }
            // Ingress-replication discovery is informational; MAC routes
            // carry the remote VTEP directly.
            Nlri::InclusiveMulticast { rd, .. } => {
                if *rd == self.cfg.rd {
                    debug!("ignoring inclusive-multicast route");
                }
            }
            Nlri::Ipv4Unicast { .. } => (),
        }
    }

    // Removes, in reverse order of creation, every kernel object this
    // worker owns, and withdraws everything it advertised.
    async fn teardown(&mut self) {
        let macs = self.advertised.iter().copied().collect::<Vec<_>>();
        for mac in macs {
            self.withdraw(mac).await;
        }

        let entries = self.fdb.values().copied().collect::<Vec<_>>();
        for entry in entries {
            if let Err(error) =
                self.kernel.fdb_remove(entry.ifindex, entry.mac).await
            {
                Error::Kernel(error).log();
            }
        }
        self.fdb.clear();

        if let Err(error) =
            self.kernel.link_remove(&self.cfg.bridge_name()).await
        {
            Error::Kernel(error).log();
        }
        if let Err(error) =
            self.kernel.link_remove(&self.cfg.vxlan_name()).await
        {
            Error::Kernel(error).log();
        }

        info!("virtual network terminated");
    }
}

// ===== global functions =====

pub fn start(
    cfg: VirtualNetworkCfg,
    router_id: Ipv4Addr,
    kernel: Kernel,
    speaker: SpeakerClient,
) -> VirtualNetworkHandle {
    let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
    let span = debug_span!("virtual-network", rd = %cfg.rd);

    let network = VirtualNetwork {
        cfg,
        state: State::Init,
        kernel,
        speaker,
        router_id,
        vxlan_ifindex: 0,
        bridge_ifindex: 0,
        sniff_ifindexes: Default::default(),
        advertised: Default::default(),
        fdb: Default::default(),
    };
    let worker = Worker::spawn(network.run(shutdown_rx).instrument(span));

    VirtualNetworkHandle { shutdown_tx, worker }
}
