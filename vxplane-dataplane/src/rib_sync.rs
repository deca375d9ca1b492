//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

//! Global RIB synchronizer: applies the speaker's IPv4-unicast best paths
//! to the kernel main table, in the order they are received.

use std::net::Ipv4Addr;

use tracing::{debug, debug_span, info, Instrument};
use vxplane_bgp::api::{Nlri, Path, WatchEvent};
use vxplane_bgp::SpeakerClient;
use vxplane_kernel::Kernel;
use vxplane_utils::worker::Worker;
use vxplane_utils::Receiver;

use crate::error::retry_transient;
use crate::translate;

struct RibSync {
    kernel: Kernel,
    router_id: Ipv4Addr,
}

// ===== impl RibSync =====

impl RibSync {
    async fn run(self, mut watch_rx: Receiver<WatchEvent>) {
        loop {
            match watch_rx.recv().await {
                Some(WatchEvent::BestPath { paths, multipath }) => {
                    if multipath.is_empty() {
                        for path in paths.iter() {
                            self.process_paths(std::slice::from_ref(path))
                                .await;
                        }
                    } else {
                        for group in multipath.iter() {
                            self.process_paths(group).await;
                        }
                    }
                }
                Some(WatchEvent::PeerUpdate { paths }) => {
                    for path in paths.iter() {
                        self.process_paths(std::slice::from_ref(path)).await;
                    }
                }
                Some(WatchEvent::Closed) | None => break,
            }
        }
    }

    // Applies one best path (or one group of ECMP siblings) to the kernel.
    // Partial failures are logged and never reorder subsequent events.
    async fn process_paths(&self, paths: &[Path]) {
        let Some(first) = paths.first() else {
            return;
        };
        // The watch stream carries every address family; only IPv4 unicast
        // is synchronized here.
        let Nlri::Ipv4Unicast { prefix } = &first.nlri else {
            debug!("skipping path of unrelated address family");
            return;
        };
        if first.is_self_originated() {
            return;
        }

        if first.withdraw {
            info!(%prefix, "deleting route");
            if let Err(error) =
                retry_transient(|| self.kernel.route_delete(prefix)).await
            {
                error.log();
            }
            return;
        }

        let Some(route) = translate::path_to_kernel_route(
            &self.kernel,
            paths,
            self.router_id,
        )
        .await
        else {
            debug!(%prefix, "no usable nexthop, not installing route");
            return;
        };
        info!(%prefix, "replacing route");
        if let Err(error) =
            retry_transient(|| self.kernel.route_replace(&route)).await
        {
            error.log();
        }
    }
}

// ===== global functions =====

pub fn start(
    kernel: Kernel,
    speaker: &SpeakerClient,
    router_id: Ipv4Addr,
) -> Worker<()> {
    let watch_rx = speaker.subscribe();
    let sync = RibSync { kernel, router_id };
    let span = debug_span!("rib-sync");
    Worker::spawn(sync.run(watch_rx).instrument(span))
}
