// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The routing seam to other cluster nodes.
//!
//! Request routing is an external collaborator: real deployments bind
//! an RPC substrate here, tests wire coordinators together in-process.
//! Transport faults surface as [`UnsealError::StorageUnavailable`] so
//! callers can apply their own retry policy; a remote coordinator's own
//! error is propagated unchanged.

use async_trait::async_trait;

use crate::{NodeId, ShareReceipt, UnsealError};

#[async_trait]
pub trait NodeRouter: Send + Sync {
    /// Re-issue a share submission to the named node and return its
    /// result or error as-is.
    async fn submit_share(
        &self,
        target: &NodeId,
        admin_token: &str,
        share_hex: &str,
    ) -> Result<ShareReceipt, UnsealError>;

    /// Enumerate the live nodes currently hosting a coordinator.
    async fn discover(&self) -> Result<Vec<NodeId>, UnsealError>;

    /// Query one node's public seal state.
    async fn is_sealed(&self, node: &NodeId) -> Result<bool, UnsealError>;
}
