// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The node-local seal state machine.
//!
//! A node starts sealed, accumulates distinct shares submitted by
//! trustees, and once the threshold count is reached reconstructs the
//! master secret, checks it against the persisted verification record,
//! and hands it to the key hierarchy through a one-time token. Unsealed
//! is terminal for the process lifetime; a restart loses the secret and
//! the whole dance repeats.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use slog::{info, o, warn, Logger};
use subtle::ConstantTimeEq;
use tokio::sync::Mutex;

use custody_crypto::{
    MasterSecret, SecretSharingError, Share, VerificationParams,
    VerificationRecord,
};
use custody_store::VerificationStore;

use crate::{NodeId, OneTimeToken, OneTimeTokenBroker, UnsealError};

/// Callback fired, at most once per node, when the coordinator has a
/// verified master secret waiting behind a one-time token.
#[async_trait]
pub trait UnsealHandler: Send + Sync {
    async fn on_unseal(&self, node_id: &NodeId, token: OneTimeToken);
}

/// Handler for nodes with nothing to bootstrap (tools, tests).
pub struct NullHandler;

#[async_trait]
impl UnsealHandler for NullHandler {
    async fn on_unseal(&self, _node_id: &NodeId, _token: OneTimeToken) {}
}

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub node_id: NodeId,
    pub admin_token: String,
    pub total_shares: u8,
    pub threshold: u8,
    /// Check reconstructions against the stored verification record.
    pub verify: bool,
    pub verification: VerificationParams,
}

impl CoordinatorConfig {
    pub fn new<S: Into<String>>(
        node_id: NodeId,
        admin_token: S,
    ) -> CoordinatorConfig {
        CoordinatorConfig {
            node_id,
            admin_token: admin_token.into(),
            total_shares: 5,
            threshold: 3,
            verify: true,
            verification: VerificationParams::default(),
        }
    }
}

/// Result of `init`: the freshly split shares, which must be handed to
/// trustees and not retained, and the persisted verification record.
pub struct InitOutcome {
    pub shares: Vec<String>,
    pub verification: String,
}

/// Current distinct-share count on the target node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareReceipt {
    pub received: usize,
}

struct SealState {
    /// Collected fragments keyed by share index. Keying by index keeps
    /// submission idempotent while letting a corrupted fragment be
    /// corrected by resubmitting the genuine share for that index.
    collected: BTreeMap<u8, Share>,
    secret: Option<MasterSecret>,
}

/// The per-node unseal coordinator.
///
/// One instance per node process, constructed at service startup;
/// deliberately not a process-wide singleton so multiple simulated
/// nodes in one test process stay independent.
pub struct UnsealCoordinator {
    log: Logger,
    config: CoordinatorConfig,
    state: Mutex<SealState>,
    verification: Arc<dyn VerificationStore>,
    broker: Arc<OneTimeTokenBroker>,
    handler: Arc<dyn UnsealHandler>,
}

impl UnsealCoordinator {
    pub fn new(
        log: &Logger,
        config: CoordinatorConfig,
        verification: Arc<dyn VerificationStore>,
        broker: Arc<OneTimeTokenBroker>,
        handler: Arc<dyn UnsealHandler>,
    ) -> UnsealCoordinator {
        let log = log.new(o!(
            "component" => "UnsealCoordinator",
            "node" => config.node_id.to_string(),
        ));
        UnsealCoordinator {
            log,
            config,
            state: Mutex::new(SealState {
                collected: BTreeMap::new(),
                secret: None,
            }),
            verification,
            broker,
            handler,
        }
    }

    pub fn node_id(&self) -> &NodeId {
        &self.config.node_id
    }

    pub(crate) fn check_admin(&self, token: &str) -> Result<(), UnsealError> {
        let ok: bool = token
            .as_bytes()
            .ct_eq(self.config.admin_token.as_bytes())
            .into();
        if ok { Ok(()) } else { Err(UnsealError::Unauthorized) }
    }

    /// Create the master secret: generate, split N/T, persist the
    /// verification record, and return the shares for out-of-band
    /// distribution. The presence of a verification record makes this a
    /// one-time operation; neither the secret nor the shares are
    /// retained.
    pub async fn init(
        &self,
        admin_token: &str,
    ) -> Result<InitOutcome, UnsealError> {
        self.check_admin(admin_token)?;
        if self.verification.load().await?.is_some() {
            return Err(UnsealError::AlreadyInitialized);
        }

        let secret = MasterSecret::generate();
        let shares =
            secret.split(self.config.threshold, self.config.total_shares)?;
        let record =
            VerificationRecord::compute(&secret, &self.config.verification);
        self.verification.store(record.as_bytes()).await?;

        info!(self.log, "master secret initialized";
            "total_shares" => self.config.total_shares,
            "threshold" => self.config.threshold,
        );
        Ok(InitOutcome {
            shares: shares
                .expose_secret()
                .iter()
                .map(Share::to_hex)
                .collect(),
            verification: record.to_hex(),
        })
    }

    /// Reconstruct from a threshold set of shares and return a freshly
    /// salted verification record, without storing it or retaining the
    /// secret. Lets an operator rotate the stored record out of band.
    pub async fn recompute_verification(
        &self,
        admin_token: &str,
        share_hexes: &[String],
    ) -> Result<String, UnsealError> {
        self.check_admin(admin_token)?;
        let shares = self.parse_threshold_set(share_hexes)?;
        let secret = MasterSecret::reconstruct(&shares)?;
        Ok(VerificationRecord::compute(&secret, &self.config.verification)
            .to_hex())
    }

    /// Replace the stored verification record, completing the rotation
    /// started by `recompute_verification`. Refused once this node is
    /// unsealed; input that is not a hex-packed record is refused as
    /// `VerificationFailed`.
    pub async fn set_verification(
        &self,
        admin_token: &str,
        record_hex: &str,
    ) -> Result<(), UnsealError> {
        self.check_admin(admin_token)?;
        let record = VerificationRecord::from_hex(record_hex)
            .map_err(|_| UnsealError::VerificationFailed)?;

        // Hold the seal lock so the write cannot interleave with a
        // threshold-crossing verification.
        let state = self.state.lock().await;
        if state.secret.is_some() {
            return Err(UnsealError::AlreadyUnsealed);
        }
        self.verification.store(record.as_bytes()).await?;
        info!(self.log, "verification record replaced");
        Ok(())
    }

    /// Compute the share at `index` from a threshold set, to replace a
    /// lost trustee fragment. The secret itself is never returned.
    pub async fn new_share(
        &self,
        admin_token: &str,
        index: u8,
        share_hexes: &[String],
    ) -> Result<String, UnsealError> {
        self.check_admin(admin_token)?;
        let shares = self.parse_threshold_set(share_hexes)?;
        Ok(MasterSecret::derive_share(index, &shares)?.to_hex())
    }

    /// Accept one share for this node.
    ///
    /// Insertion is idempotent and keyed by share index; the returned
    /// count only grows with distinct indices, and a resubmission for a
    /// held index replaces that fragment. Crossing the threshold
    /// triggers, under the same lock, reconstruction, verification, and
    /// the one-shot bootstrap handoff. A verification mismatch discards
    /// the reconstruction but keeps the collected shares, so retrying
    /// with a corrected fragment or record can still succeed.
    pub async fn submit_share(
        &self,
        admin_token: &str,
        share_hex: &str,
    ) -> Result<ShareReceipt, UnsealError> {
        self.check_admin(admin_token)?;
        let share = Share::from_hex(share_hex)?;

        let mut state = self.state.lock().await;
        if state.secret.is_some() {
            return Err(UnsealError::AlreadyUnsealed);
        }

        state.collected.insert(share.index(), share);
        let received = state.collected.len();

        if received >= self.config.threshold as usize {
            let shares: Vec<Share> =
                state.collected.values().cloned().collect();
            let secret = MasterSecret::reconstruct(&shares)?;

            if self.config.verify {
                match self.verification.load().await? {
                    Some(bytes) => {
                        let record = VerificationRecord::from_bytes(bytes);
                        if !record.verify(&secret) {
                            warn!(self.log,
                                "reconstructed master secret failed \
                                 verification";
                                "received" => received,
                            );
                            return Err(UnsealError::VerificationFailed);
                        }
                    }
                    // No record configured: accept the reconstruction.
                    None => {}
                }
            }

            let token = self.broker.mint(secret.clone());
            state.secret = Some(secret);
            info!(self.log, "node unsealed"; "received" => received);
            self.handler.on_unseal(&self.config.node_id, token).await;
        }

        Ok(ShareReceipt { received })
    }

    /// Whether this node currently lacks the master secret. Public,
    /// unauthenticated, carries no secret material.
    pub async fn is_sealed(&self) -> bool {
        self.state.lock().await.secret.is_none()
    }

    fn parse_threshold_set(
        &self,
        share_hexes: &[String],
    ) -> Result<Vec<Share>, UnsealError> {
        if share_hexes.len() < self.config.threshold as usize {
            return Err(SecretSharingError::NotEnoughShares.into());
        }
        share_hexes
            .iter()
            .map(|hex| Share::from_hex(hex).map_err(UnsealError::from))
            .collect()
    }
}
