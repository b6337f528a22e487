// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The per-node unseal protocol.
//!
//! Every node of a cluster must independently collect a threshold count
//! of master secret shares before it can serve cryptographic
//! operations. This crate contains the node-local coordinator state
//! machine, the one-time token broker that hands the reconstructed
//! secret to the key hierarchy, and the forwarder that routes
//! administrative calls to specific nodes or fans queries across all of
//! them. The network transport itself sits behind the [`NodeRouter`]
//! trait.

use serde::{Deserialize, Serialize};

mod broker;
mod coordinator;
mod error;
mod forwarder;
mod router;

pub use broker::{OneTimeToken, OneTimeTokenBroker};
pub use coordinator::{
    CoordinatorConfig, InitOutcome, NullHandler, ShareReceipt,
    UnsealCoordinator, UnsealHandler,
};
pub use error::UnsealError;
pub use forwarder::{DistributedForwarder, SealStatus};
pub use router::NodeRouter;

/// Identifier of one cluster node hosting a coordinator instance.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct NodeId(String);

impl NodeId {
    pub fn new<S: Into<String>>(id: S) -> NodeId {
        NodeId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> NodeId {
        NodeId(id.to_string())
    }
}
