//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

//! Thin, idempotent wrapper over the rtnetlink operations the agent needs:
//! links, addresses, routes, neighbours and bridge FDB entries.
//!
//! Every `ensure` operation is the identity when the kernel already matches
//! the requested state, and every `remove` is the identity on absence. The
//! adapter never retries internally; transient conditions are reported to
//! the caller as [`Error::Transient`].

mod addr;
mod error;
mod link;
mod monitor;
mod neigh;
mod route;

use capctl::caps::CapState;
use rtnetlink::new_connection;
use tracing::error;

pub use crate::error::Error;
pub use crate::link::{BridgeSpec, LinkSpec, VxlanSpec};
pub use crate::monitor::{mac_learn, neigh_monitor, NetlinkMonitor};
// Address families callers filter on.
pub use netlink_packet_route::constants::{AF_BRIDGE, AF_INET, AF_INET6};

pub type Result<T> = std::result::Result<T, Error>;

// Handle used to send netlink requests to the kernel.
//
// Cloning is cheap; all clones share the same underlying connection.
#[derive(Clone, Debug)]
pub struct Kernel {
    handle: rtnetlink::Handle,
}

// ===== impl Kernel =====

impl Kernel {
    pub fn init() -> Kernel {
        // Create netlink connection.
        let (conn, handle, _) = new_connection().unwrap();

        // Spawn the netlink connection on a separate thread with permanent
        // elevated capabilities.
        std::thread::spawn(|| {
            // Raise capabilities.
            let mut caps = CapState::get_current().unwrap();
            caps.effective = caps.permitted;
            if let Err(error) = caps.set_current() {
                error!("failed to update current capabilities: {}", error);
            }

            // Serve requests initiated by the netlink handle.
            futures::executor::block_on(conn)
        });

        Kernel { handle }
    }

    pub(crate) fn handle(&self) -> &rtnetlink::Handle {
        &self.handle
    }
}
