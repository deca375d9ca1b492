//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use tracing::{debug, warn};

// Speaker client errors.
#[derive(Debug)]
pub enum Error {
    // The speaker is unreachable or refused the connection.
    Io(std::io::Error),
    // The speaker sent something the client could not decode.
    Decode(serde_json::Error),
    // The speaker rejected the request.
    Rejected(String),
    // The per-call deadline expired.
    Timeout(&'static str),
    // The client was shut down.
    Closed,
}

// ===== impl Error =====

impl Error {
    pub fn log(&self) {
        match self {
            Error::Io(error) => {
                debug!(%error, "{}", self);
            }
            Error::Decode(error) => {
                warn!(%error, "{}", self);
            }
            Error::Rejected(reason) => {
                warn!(%reason, "{}", self);
            }
            Error::Timeout(operation) => {
                warn!(%operation, "{}", self);
            }
            Error::Closed => {
                debug!("{}", self);
            }
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Io(..) => {
                write!(f, "speaker unavailable")
            }
            Error::Decode(..) => {
                write!(f, "failed to decode speaker response")
            }
            Error::Rejected(..) => {
                write!(f, "request rejected by the speaker")
            }
            Error::Timeout(..) => {
                write!(f, "speaker request timed out")
            }
            Error::Closed => {
                write!(f, "speaker client is closed")
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(error) => Some(error),
            Error::Decode(error) => Some(error),
            _ => None,
        }
    }
}
