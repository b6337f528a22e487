// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Storage seams for the custody service.
//!
//! Persistent storage is an external collaborator: a keyed store holding
//! one keychain row per `(owner, service)` pair, and a singleton slot
//! for the verification record. This crate defines the async traits the
//! rest of the workspace programs against, plus an in-memory
//! implementation for tests and simulation and a file-backed
//! verification store for single-node deployments.

use std::collections::BTreeMap;

use async_trait::async_trait;

mod file;
mod memory;

pub use file::FileVerificationStore;
pub use memory::{MemoryKeychainStore, MemoryVerificationStore};

/// The keychain alias naming the currently active key of a scope.
pub const DEFAULT_KEY_ALIAS: &str = "default";

/// A keychain row: key id (or the `"default"` alias) to opaque blob.
pub type Keychain = BTreeMap<String, String>;

#[derive(thiserror::Error, Debug)]
pub enum StorageError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// The keyed store holding per-`(owner, service)` keychains.
///
/// Values are opaque to the store: base64-encoded JSON blobs produced
/// by the key hierarchy. Implementations must make `insert_entry` a
/// single atomic write; the default alias is deliberately
/// last-write-wins under concurrent inserts for the same scope (every
/// inserted record stays retrievable by id, only the alias races).
#[async_trait]
pub trait KeychainStore: Send + Sync {
    /// Read one entry of a scope's keychain by id or alias.
    async fn read_entry(
        &self,
        owner: &str,
        service: &str,
        id: &str,
    ) -> Result<Option<String>, StorageError>;

    /// Insert an entry under `id` and repoint the `"default"` alias at
    /// it, as one write.
    async fn insert_entry(
        &self,
        owner: &str,
        service: &str,
        id: &str,
        blob: String,
    ) -> Result<(), StorageError>;

    /// Read every keychain of an owner, keyed by service.
    async fn read_owner(
        &self,
        owner: &str,
    ) -> Result<BTreeMap<String, Keychain>, StorageError>;

    /// Remove every keychain of an owner.
    async fn delete_owner(&self, owner: &str) -> Result<(), StorageError>;

    /// All owners currently holding at least one keychain.
    async fn list_owners(&self) -> Result<Vec<String>, StorageError>;
}

/// Singleton storage for the packed verification record.
///
/// Presence of a record doubles as the idempotency guard that makes
/// `init` a one-time operation.
#[async_trait]
pub trait VerificationStore: Send + Sync {
    async fn load(&self) -> Result<Option<Vec<u8>>, StorageError>;

    async fn store(&self, record: &[u8]) -> Result<(), StorageError>;
}
