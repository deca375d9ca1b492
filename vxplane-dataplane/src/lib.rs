//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

//! Dataplane actors of the agent: the per-tenant virtual network workers,
//! the global RIB synchronizer, and the pure path translation between BGP
//! paths and kernel state.

pub mod config;
pub mod error;
pub mod rib_sync;
pub mod translate;
pub mod virtual_network;

pub use crate::error::Error;
