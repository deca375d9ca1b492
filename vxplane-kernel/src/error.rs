//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use tracing::{error, warn};

// Kernel adapter errors.
//
// Netlink errno codes are classified into the four outcomes callers can act
// on; anything else is surfaced as a raw request failure.
#[derive(Debug)]
pub enum Error {
    // EAGAIN-class condition; the caller may retry the operation.
    Transient(i32),
    // An object exists with attributes incompatible with the requested
    // state; the caller must remove it explicitly first.
    Conflict(String),
    // Missing privileges (CAP_NET_ADMIN).
    NotPermitted,
    // Strict lookup found no matching object.
    NotFound,
    // Failed to open a netlink socket.
    Socket(std::io::Error),
    // Unclassified netlink failure.
    Request(rtnetlink::Error),
}

// ===== impl Error =====

impl Error {
    pub(crate) fn from_netlink(error: rtnetlink::Error) -> Error {
        if let rtnetlink::Error::NetlinkError(msg) = &error {
            let errno = -msg.code;
            if errno == libc::EAGAIN
                || errno == libc::EBUSY
                || errno == libc::ENOBUFS
                || errno == libc::ENOMEM
            {
                return Error::Transient(errno);
            }
            if errno == libc::EEXIST {
                return Error::Conflict(
                    "object already exists with different attributes"
                        .to_owned(),
                );
            }
            if errno == libc::EPERM || errno == libc::EACCES {
                return Error::NotPermitted;
            }
            if errno == libc::ENOENT
                || errno == libc::ENODEV
                || errno == libc::ESRCH
                || errno == libc::EADDRNOTAVAIL
            {
                return Error::NotFound;
            }
        }
        Error::Request(error)
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound)
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Transient(_))
    }

    pub fn log(&self) {
        match self {
            Error::Transient(errno) => {
                warn!(%errno, "{}", self);
            }
            Error::Conflict(reason) => {
                error!(%reason, "{}", self);
            }
            Error::NotPermitted | Error::NotFound => {
                warn!("{}", self);
            }
            Error::Socket(error) => {
                error!(%error, "{}", self);
            }
            Error::Request(error) => {
                error!(%error, "{}", self);
            }
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Transient(..) => {
                write!(f, "transient kernel error")
            }
            Error::Conflict(..) => {
                write!(f, "conflicting kernel object")
            }
            Error::NotPermitted => {
                write!(f, "operation not permitted")
            }
            Error::NotFound => {
                write!(f, "kernel object not found")
            }
            Error::Socket(..) => {
                write!(f, "failed to open netlink socket")
            }
            Error::Request(..) => {
                write!(f, "netlink request failed")
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Socket(error) => Some(error),
            Error::Request(error) => Some(error),
            _ => None,
        }
    }
}
