// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Mutex-guarded in-process stores, used by tests and multi-node
//! simulations. Each simulated node constructs its own instances so
//! nodes stay independent within one process.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::{
    Keychain, KeychainStore, StorageError, VerificationStore,
    DEFAULT_KEY_ALIAS,
};

/// In-memory keychain rows keyed by `(owner, service)`.
#[derive(Default)]
pub struct MemoryKeychainStore {
    rows: Mutex<BTreeMap<(String, String), Keychain>>,
}

impl MemoryKeychainStore {
    pub fn new() -> MemoryKeychainStore {
        MemoryKeychainStore::default()
    }
}

#[async_trait]
impl KeychainStore for MemoryKeychainStore {
    async fn read_entry(
        &self,
        owner: &str,
        service: &str,
        id: &str,
    ) -> Result<Option<String>, StorageError> {
        let rows = self.rows.lock().unwrap();
        Ok(rows
            .get(&(owner.to_string(), service.to_string()))
            .and_then(|keychain| keychain.get(id))
            .cloned())
    }

    async fn insert_entry(
        &self,
        owner: &str,
        service: &str,
        id: &str,
        blob: String,
    ) -> Result<(), StorageError> {
        let mut rows = self.rows.lock().unwrap();
        let keychain = rows
            .entry((owner.to_string(), service.to_string()))
            .or_default();
        keychain.insert(id.to_string(), blob.clone());
        keychain.insert(DEFAULT_KEY_ALIAS.to_string(), blob);
        Ok(())
    }

    async fn read_owner(
        &self,
        owner: &str,
    ) -> Result<BTreeMap<String, Keychain>, StorageError> {
        let rows = self.rows.lock().unwrap();
        Ok(rows
            .iter()
            .filter(|((row_owner, _), _)| row_owner == owner)
            .map(|((_, service), keychain)| {
                (service.clone(), keychain.clone())
            })
            .collect())
    }

    async fn delete_owner(&self, owner: &str) -> Result<(), StorageError> {
        let mut rows = self.rows.lock().unwrap();
        rows.retain(|(row_owner, _), _| row_owner != owner);
        Ok(())
    }

    async fn list_owners(&self) -> Result<Vec<String>, StorageError> {
        let rows = self.rows.lock().unwrap();
        let mut owners: Vec<String> =
            rows.keys().map(|(owner, _)| owner.clone()).collect();
        owners.dedup();
        Ok(owners)
    }
}

/// In-memory singleton slot for the verification record.
#[derive(Default)]
pub struct MemoryVerificationStore {
    record: Mutex<Option<Vec<u8>>>,
}

impl MemoryVerificationStore {
    pub fn new() -> MemoryVerificationStore {
        MemoryVerificationStore::default()
    }

    /// Seed a record directly, e.g. to simulate an operator configuring
    /// verification out of band.
    pub fn preset(record: Vec<u8>) -> MemoryVerificationStore {
        MemoryVerificationStore { record: Mutex::new(Some(record)) }
    }
}

#[async_trait]
impl VerificationStore for MemoryVerificationStore {
    async fn load(&self) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.record.lock().unwrap().clone())
    }

    async fn store(&self, record: &[u8]) -> Result<(), StorageError> {
        *self.record.lock().unwrap() = Some(record.to_vec());
        Ok(())
    }
}
