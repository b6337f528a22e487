// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! A file-backed verification record store.
//!
//! Holds the packed record in a single file. Useful for single-node
//! deployments where the record doubles as the "init already ran"
//! marker across restarts.

use async_trait::async_trait;
use camino::Utf8PathBuf;

use crate::{StorageError, VerificationStore};

pub struct FileVerificationStore {
    path: Utf8PathBuf,
}

impl FileVerificationStore {
    pub fn new(path: Utf8PathBuf) -> FileVerificationStore {
        FileVerificationStore { path }
    }
}

#[async_trait]
impl VerificationStore for FileVerificationStore {
    async fn load(&self) -> Result<Option<Vec<u8>>, StorageError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Ok(None)
            }
            Err(err) => Err(StorageError::Unavailable(format!(
                "read {}: {err}",
                self.path
            ))),
        }
    }

    async fn store(&self, record: &[u8]) -> Result<(), StorageError> {
        tokio::fs::write(&self.path, record).await.map_err(|err| {
            StorageError::Unavailable(format!("write {}: {err}", self.path))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino_tempfile::Utf8TempDir;

    #[tokio::test]
    async fn load_store_round_trip() {
        let dir = Utf8TempDir::new().unwrap();
        let store =
            FileVerificationStore::new(dir.path().join("verification.rec"));

        assert!(store.load().await.unwrap().is_none());
        store.store(&[1, 2, 3, 4]).await.unwrap();
        assert_eq!(store.load().await.unwrap(), Some(vec![1, 2, 3, 4]));

        // Overwrite replaces the record.
        store.store(&[9, 9]).await.unwrap();
        assert_eq!(store.load().await.unwrap(), Some(vec![9, 9]));
    }
}
