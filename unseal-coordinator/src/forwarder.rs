// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Cluster-facing front of the local coordinator.
//!
//! Trustees hand shares to whichever node they reach; the forwarder
//! either applies the submission locally or re-issues it to the
//! addressed node through the [`NodeRouter`]. It also aggregates the
//! cluster-wide seal picture for operators.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use slog::{debug, o, Logger};

use crate::{
    NodeId, NodeRouter, ShareReceipt, UnsealCoordinator, UnsealError,
};

/// Cluster seal inventory: every discovered node, partitioned by state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealStatus {
    pub sealed: Vec<NodeId>,
    pub unsealed: Vec<NodeId>,
}

pub struct DistributedForwarder {
    log: Logger,
    local: Arc<UnsealCoordinator>,
    router: Arc<dyn NodeRouter>,
}

impl DistributedForwarder {
    pub fn new(
        log: &Logger,
        local: Arc<UnsealCoordinator>,
        router: Arc<dyn NodeRouter>,
    ) -> DistributedForwarder {
        let log = log.new(o!(
            "component" => "DistributedForwarder",
            "node" => local.node_id().to_string(),
        ));
        DistributedForwarder { log, local, router }
    }

    /// Submit one share toward `target`, forwarding if it is not this
    /// node. The receipt always reflects the target's share count.
    pub async fn submit_share(
        &self,
        target: &NodeId,
        admin_token: &str,
        share_hex: &str,
    ) -> Result<ShareReceipt, UnsealError> {
        if target == self.local.node_id() {
            return self.local.submit_share(admin_token, share_hex).await;
        }
        debug!(self.log, "forwarding share submission";
            "target" => target.to_string(),
        );
        self.router.submit_share(target, admin_token, share_hex).await
    }

    /// Query every discovered node's seal state. A node that cannot be
    /// reached fails the whole query rather than being silently
    /// misclassified.
    pub async fn seal_status(
        &self,
        admin_token: &str,
    ) -> Result<SealStatus, UnsealError> {
        self.local.check_admin(admin_token)?;
        let nodes = self.router.discover().await?;
        let queries = nodes.iter().map(|node| async move {
            let sealed = if node == self.local.node_id() {
                self.local.is_sealed().await
            } else {
                self.router.is_sealed(node).await?
            };
            Ok::<_, UnsealError>((node.clone(), sealed))
        });

        let mut status =
            SealStatus { sealed: Vec::new(), unsealed: Vec::new() };
        for (node, sealed) in
            futures::future::try_join_all(queries).await?
        {
            if sealed {
                status.sealed.push(node);
            } else {
                status.unsealed.push(node);
            }
        }
        Ok(status)
    }
}
