// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Lifecycle glue between the unseal coordinator and the key hierarchy.
//!
//! One handle per node process. It is registered as the coordinator's
//! unseal handler; when the node crosses the share threshold the handle
//! redeems the one-time token, builds the hierarchy, and publishes it
//! to the rest of the service. Before that moment every accessor call
//! observes `None`.

use std::sync::Arc;

use async_trait::async_trait;
use slog::{error, info, o, Logger};
use tokio::sync::RwLock;

use custody_store::KeychainStore;
use unseal_coordinator::{
    NodeId, OneTimeToken, OneTimeTokenBroker, UnsealHandler,
};

use crate::{HierarchyConfig, KeyHierarchy};

pub struct KeyServiceHandle {
    log: Logger,
    config: HierarchyConfig,
    store: Arc<dyn KeychainStore>,
    broker: Arc<OneTimeTokenBroker>,
    hierarchy: RwLock<Option<Arc<KeyHierarchy>>>,
}

impl KeyServiceHandle {
    pub fn new(
        log: &Logger,
        config: HierarchyConfig,
        store: Arc<dyn KeychainStore>,
        broker: Arc<OneTimeTokenBroker>,
    ) -> Arc<KeyServiceHandle> {
        Arc::new(KeyServiceHandle {
            log: log.new(o!("component" => "KeyServiceHandle")),
            config,
            store,
            broker,
            hierarchy: RwLock::new(None),
        })
    }

    /// The hierarchy, once the node has unsealed.
    pub async fn hierarchy(&self) -> Option<Arc<KeyHierarchy>> {
        self.hierarchy.read().await.clone()
    }
}

#[async_trait]
impl UnsealHandler for KeyServiceHandle {
    async fn on_unseal(&self, node_id: &NodeId, token: OneTimeToken) {
        match KeyHierarchy::bootstrap(
            &self.log,
            self.config.clone(),
            self.store.clone(),
            &self.broker,
            &token,
        ) {
            Ok(hierarchy) => {
                *self.hierarchy.write().await = Some(Arc::new(hierarchy));
                info!(self.log, "key service online";
                    "node" => node_id.to_string(),
                );
            }
            // The coordinator stays unsealed; only this node's key
            // service failed to come up.
            Err(err) => {
                error!(self.log, "key service bootstrap failed";
                    "node" => node_id.to_string(),
                    "error" => %err,
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use custody_crypto::MasterSecret;
    use custody_store::MemoryKeychainStore;

    #[tokio::test]
    async fn handle_publishes_the_hierarchy_on_unseal() {
        let log = Logger::root(slog::Discard, o!());
        let broker = Arc::new(OneTimeTokenBroker::new(&log));
        let handle = KeyServiceHandle::new(
            &log,
            HierarchyConfig::new("service-token", "admin-token"),
            Arc::new(MemoryKeychainStore::new()),
            broker.clone(),
        );

        assert!(handle.hierarchy().await.is_none());

        let token = broker.mint(MasterSecret::generate());
        handle.on_unseal(&NodeId::new("node-1"), token).await;
        assert!(handle.hierarchy().await.is_some());
    }

    #[tokio::test]
    async fn consumed_token_leaves_the_handle_offline() {
        let log = Logger::root(slog::Discard, o!());
        let broker = Arc::new(OneTimeTokenBroker::new(&log));
        let handle = KeyServiceHandle::new(
            &log,
            HierarchyConfig::new("service-token", "admin-token"),
            Arc::new(MemoryKeychainStore::new()),
            broker.clone(),
        );

        let token = broker.mint(MasterSecret::generate());
        broker.redeem(&token).unwrap();
        handle.on_unseal(&NodeId::new("node-1"), token).await;
        assert!(handle.hierarchy().await.is_none());
    }
}
