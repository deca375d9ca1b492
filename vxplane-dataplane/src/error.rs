//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::error;
use vxplane_utils::bgp::RouteDistinguisher;

// Dataplane errors.
#[derive(Debug)]
pub enum Error {
    // Malformed or internally inconsistent virtual network configuration.
    InvalidNetworkConfig(RouteDistinguisher, String),
    // A configured interface does not exist in the kernel.
    InterfaceNotFound(String),
    // The VTEP interface carries no usable IPv4 address.
    VtepAddressNotFound(String),
    // Kernel operation failure.
    Kernel(vxplane_kernel::Error),
}

// ===== impl Error =====

impl Error {
    pub fn log(&self) {
        match self {
            Error::InvalidNetworkConfig(rd, reason) => {
                error!(%rd, %reason, "{}", self);
            }
            Error::InterfaceNotFound(name)
            | Error::VtepAddressNotFound(name) => {
                error!(%name, "{}", self);
            }
            Error::Kernel(error) => {
                error.log();
            }
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::InvalidNetworkConfig(..) => {
                write!(f, "invalid virtual network configuration")
            }
            Error::InterfaceNotFound(..) => {
                write!(f, "interface not found")
            }
            Error::VtepAddressNotFound(..) => {
                write!(f, "no IPv4 address on the VTEP interface")
            }
            Error::Kernel(error) => error.fmt(f),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Kernel(error) => Some(error),
            _ => None,
        }
    }
}

impl From<vxplane_kernel::Error> for Error {
    fn from(error: vxplane_kernel::Error) -> Error {
        Error::Kernel(error)
    }
}

// ===== global functions =====

// Bounded retry for EAGAIN-class kernel errors. The kernel adapter itself
// never retries; callers opt in per operation.
const KERNEL_ATTEMPTS: usize = 3;
const KERNEL_RETRY_DELAY: Duration = Duration::from_millis(100);

pub(crate) async fn retry_transient<F, Fut>(
    operation: F,
) -> vxplane_kernel::Result<()>
where
    F: Fn() -> Fut,
    Fut: Future<Output = vxplane_kernel::Result<()>>,
{
    let mut attempt = 1;
    loop {
        match operation().await {
            Err(error)
                if error.is_transient() && attempt < KERNEL_ATTEMPTS =>
            {
                attempt += 1;
                sleep(KERNEL_RETRY_DELAY).await;
            }
            result => return result,
        }
    }
}
