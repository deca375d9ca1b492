//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

//! Top-level event loop: owns configuration snapshots, the speaker client
//! and the kernel handle, and starts or stops the per-tenant workers.

use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use ipnetwork::{IpNetwork, Ipv4Network};
use tracing::{debug, info, warn};
use vxplane_bgp::api::{GlobalInfo, Table};
use vxplane_bgp::{evpn, SpeakerClient};
use vxplane_dataplane::config::{
    virtual_network_diff, DataplaneCfg, DataplaneType,
};
use vxplane_dataplane::virtual_network::{self, VirtualNetworkHandle};
use vxplane_dataplane::{rib_sync, Error};
use vxplane_kernel::Kernel;
use vxplane_utils::bgp::RouteDistinguisher;
use vxplane_utils::Receiver;

use crate::config::{self, Config};

pub struct Supervisor {
    kernel: Kernel,
    speaker: SpeakerClient,
    global: GlobalInfo,
    // Skip speaker-side configuration (remote-BGP mode).
    remote: bool,
    dataplane_cfg: Option<DataplaneCfg>,
    networks: BTreeMap<RouteDistinguisher, VirtualNetworkHandle>,
}

// ===== impl Supervisor =====

impl Supervisor {
    async fn apply_snapshot(&mut self, config: Config) {
        // Register speaker VRFs once, from the first snapshot.
        if self.dataplane_cfg.is_none() && !self.remote {
            if let Some(bgp) = &config.bgp {
                for vrf in config::speaker_vrfs(bgp) {
                    info!(name = %vrf.name, rd = %vrf.rd, "registering VRF");
                    if let Err(error) = self.speaker.add_vrf(vrf).await {
                        error.log();
                    }
                }
            }
        }

        // Single dataplane engine today; the tag is still dispatched on so
        // new engines slot in here.
        match config.dataplane.dataplane_type {
            DataplaneType::Netlink => (),
        }

        let (added, deleted) = virtual_network_diff(
            self.dataplane_cfg.as_ref(),
            &config.dataplane,
        );

        // Stop removed networks first and wait for their teardown, so a
        // changed RD can be restarted right away.
        for cfg in deleted {
            info!(rd = %cfg.rd, "virtual network removed");
            if let Some(handle) = self.networks.remove(&cfg.rd) {
                handle.stop().await;
            }
        }
        for cfg in added {
            info!(rd = %cfg.rd, "virtual network added");
            let handle = virtual_network::start(
                cfg.clone(),
                self.global.router_id,
                self.kernel.clone(),
                self.speaker.clone(),
            );
            self.networks.insert(cfg.rd, handle);
        }

        self.dataplane_cfg = Some(config.dataplane);
    }

    // Shutdown cascade: closing the watch makes every subscriber observe
    // `Closed`; each worker is then awaited through its teardown.
    async fn shutdown(&mut self) {
        self.speaker.close();
        let networks = std::mem::take(&mut self.networks);
        for (rd, handle) in networks {
            debug!(%rd, "stopping virtual network");
            handle.stop().await;
        }
        info!("shutdown complete");
    }
}

// ===== global functions =====

pub async fn run(
    speaker: SpeakerClient,
    mut config_rx: Receiver<Config>,
    mut shutdown_rx: Receiver<()>,
    remote: bool,
) -> Result<(), Error> {
    // Nothing can proceed without the speaker's identity.
    let global = speaker.wait_ready().await;
    info!(
        router_id = %global.router_id,
        local_as = global.local_as,
        "speaker is ready"
    );

    let kernel = Kernel::init();

    // The router-ID must exist as a host address on the loopback. Existing
    // addresses are left alone.
    ensure_router_id_address(&kernel, global.router_id).await?;

    // Announce the router-ID host route.
    let path = evpn::router_id_host_route(global.router_id);
    if let Err(error) = speaker.add_path(Table::Global, path).await {
        error.log();
    }

    // Start the watch plumbing and the RIB synchronizer.
    let _watch_worker = speaker.start_watch();
    let _rib_sync = rib_sync::start(kernel.clone(), &speaker, global.router_id);

    let mut supervisor = Supervisor {
        kernel,
        speaker: speaker.clone(),
        global,
        remote,
        dataplane_cfg: None,
        networks: BTreeMap::new(),
    };

    loop {
        tokio::select! {
            snapshot = config_rx.recv() => match snapshot {
                Some(config) => supervisor.apply_snapshot(config).await,
                None => break,
            },
            _ = shutdown_rx.recv() => break,
        }
    }

    supervisor.shutdown().await;
    Ok(())
}

async fn ensure_router_id_address(
    kernel: &Kernel,
    router_id: Ipv4Addr,
) -> Result<(), Error> {
    let lo = kernel
        .link_index("lo")
        .await?
        .ok_or_else(|| Error::InterfaceNotFound("lo".to_owned()))?;

    // A /32 prefix is always valid.
    let addr = IpNetwork::V4(Ipv4Network::new(router_id, 32).unwrap());
    match kernel.addr_ensure(lo, &addr).await {
        Ok(()) => Ok(()),
        Err(error) => {
            warn!(%addr, "failed to install the router-ID on the loopback");
            Err(error.into())
        }
    }
}
