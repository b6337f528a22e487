// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The key hierarchy: per-`(owner, service)` key records derived under
//! the master secret, with envelope encryption on top.
//!
//! The hierarchy only exists on an unsealed node. It holds the master
//! secret in memory for its whole lifetime and never persists it; the
//! stored key records are only useful together with that secret, since
//! every key leaving the hierarchy is the owner-scoped HMAC of the raw
//! record material.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{Duration, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use slog::{info, o, warn, Logger};

use custody_crypto::{
    decrypt_payload, derive_envelope_key, encrypt_payload, owner_key_hash,
    KdfParams, MasterSecret, ENVELOPE_IV_SIZE,
};
use custody_store::{Keychain, KeychainStore, DEFAULT_KEY_ALIAS};
use unseal_coordinator::{OneTimeToken, OneTimeTokenBroker};

use crate::auth::{authorize, Caller, Grant, Operation};
use crate::envelope::Envelope;
use crate::record::KeyRecord;
use crate::{KeyError, OwnerClaims, ServiceScope};

#[derive(Clone)]
pub struct HierarchyConfig {
    pub service_token: String,
    pub admin_token: String,
    /// Default key lifetime in days; values below one day are clamped
    /// up.
    pub expiration_days: i64,
    pub kdf: KdfParams,
}

impl HierarchyConfig {
    pub fn new<S: Into<String>, T: Into<String>>(
        service_token: S,
        admin_token: T,
    ) -> HierarchyConfig {
        HierarchyConfig {
            service_token: service_token.into(),
            admin_token: admin_token.into(),
            expiration_days: 30,
            kdf: KdfParams::default(),
        }
    }

    fn ttl(&self) -> Duration {
        Duration::days(self.expiration_days.max(1))
    }
}

impl std::fmt::Debug for HierarchyConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HierarchyConfig")
            .field("service_token", &"<elided>")
            .field("admin_token", &"<elided>")
            .field("expiration_days", &self.expiration_days)
            .finish()
    }
}

/// A key as handed to callers: the record id plus the owner-scoped
/// transform of its material. Raw record keys never leave the
/// hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedKey {
    pub id: String,
    pub key: String,
}

/// Everything an owner had at deletion time, returned to the admin for
/// out-of-band archival before the purge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OwnerBackup {
    pub owner: String,
    pub services: BTreeMap<String, Keychain>,
}

pub struct KeyHierarchy {
    log: Logger,
    config: HierarchyConfig,
    master: MasterSecret,
    store: Arc<dyn KeychainStore>,
}

impl KeyHierarchy {
    /// Build the hierarchy by redeeming a one-time unseal token for the
    /// master secret. A consumed or unknown token fails `Unauthorized`,
    /// and redemption consumes the token regardless of outcome.
    pub fn bootstrap(
        log: &Logger,
        config: HierarchyConfig,
        store: Arc<dyn KeychainStore>,
        broker: &OneTimeTokenBroker,
        token: &OneTimeToken,
    ) -> Result<KeyHierarchy, KeyError> {
        let master =
            broker.redeem(token).map_err(|_| KeyError::Unauthorized)?;
        let log = log.new(o!("component" => "KeyHierarchy"));
        info!(log, "key hierarchy bootstrapped");
        Ok(KeyHierarchy { log, config, master, store })
    }

    /// Owner-scoped key lookup; the owner comes from validated claims.
    pub async fn get_oek(
        &self,
        claims: &OwnerClaims,
        service: &str,
        id: Option<&str>,
    ) -> Result<ResolvedKey, KeyError> {
        let Grant::Scope(owner) = authorize(
            &self.config,
            Caller::Owner(claims),
            Operation::ResolveKey,
        )?
        else {
            return Err(KeyError::Unauthorized);
        };
        self.get_key(&owner, service, id).await
    }

    /// Service-to-service variant: the service name is both the owner
    /// scope and the service of the keychain row.
    pub async fn get_sek(
        &self,
        scope: &ServiceScope,
        id: Option<&str>,
    ) -> Result<ResolvedKey, KeyError> {
        let owner = self.service_owner(scope)?;
        self.get_key(&owner, &scope.service, id).await
    }

    /// Serialize `value` and seal it under the scope's current default
    /// key: fresh IV, one-time PBKDF2 key over the resolved material
    /// and that IV, AES-256-CBC.
    pub async fn encrypt(
        &self,
        scope: &ServiceScope,
        value: &serde_json::Value,
    ) -> Result<String, KeyError> {
        let owner = self.service_owner(scope)?;
        let resolved = self.get_key(&owner, &scope.service, None).await?;

        let mut iv = [0u8; ENVELOPE_IV_SIZE];
        OsRng.fill_bytes(&mut iv);
        let one_time =
            derive_envelope_key(resolved.key.as_bytes(), &iv, &self.config.kdf);

        // Plain JSON value, serialization cannot fail.
        let plaintext = serde_json::to_vec(value).unwrap();
        let ciphertext = encrypt_payload(&one_time, &iv, &plaintext)
            .map_err(|_| KeyError::DecryptionFailed)?;

        Ok(Envelope {
            key_id: resolved.id,
            iv: hex::encode(iv),
            data: base64_encode(&ciphertext),
        }
        .encode())
    }

    /// Open an envelope produced by `encrypt`. Empty or blank input is
    /// `Ok(Value::Null)`. Past authorization, every failure except a
    /// storage fault collapses into `DecryptionFailed`.
    pub async fn decrypt(
        &self,
        scope: &ServiceScope,
        envelope: &str,
    ) -> Result<serde_json::Value, KeyError> {
        let owner = self.service_owner(scope)?;
        if envelope.trim().is_empty() {
            return Ok(serde_json::Value::Null);
        }

        let envelope = Envelope::decode(envelope)
            .map_err(|_| KeyError::DecryptionFailed)?;
        let resolved = self
            .get_key(&owner, &scope.service, Some(&envelope.key_id))
            .await
            .map_err(|err| match err {
                KeyError::StorageUnavailable(err) => {
                    KeyError::StorageUnavailable(err)
                }
                _ => KeyError::DecryptionFailed,
            })?;

        let iv = hex::decode(&envelope.iv)
            .map_err(|_| KeyError::DecryptionFailed)?;
        if iv.len() != ENVELOPE_IV_SIZE {
            return Err(KeyError::DecryptionFailed);
        }
        let ciphertext = base64_decode(&envelope.data)
            .map_err(|_| KeyError::DecryptionFailed)?;

        let one_time =
            derive_envelope_key(resolved.key.as_bytes(), &iv, &self.config.kdf);
        let plaintext = decrypt_payload(&one_time, &iv, &ciphertext)
            .map_err(|_| KeyError::DecryptionFailed)?;
        serde_json::from_slice(&plaintext)
            .map_err(|_| KeyError::DecryptionFailed)
    }

    /// Return a full backup of the owner's keychains, then purge them.
    pub async fn delete_owner(
        &self,
        admin_token: &str,
        owner: &str,
    ) -> Result<OwnerBackup, KeyError> {
        authorize(
            &self.config,
            Caller::Admin(admin_token),
            Operation::ManageOwners,
        )?;
        let services = self.store.read_owner(owner).await?;
        self.store.delete_owner(owner).await?;
        info!(self.log, "owner deleted";
            "owner" => owner,
            "services" => services.len(),
        );
        Ok(OwnerBackup { owner: owner.to_string(), services })
    }

    pub async fn get_owners(
        &self,
        admin_token: &str,
    ) -> Result<Vec<String>, KeyError> {
        authorize(
            &self.config,
            Caller::Admin(admin_token),
            Operation::ManageOwners,
        )?;
        Ok(self.store.list_owners().await?)
    }

    fn service_owner(
        &self,
        scope: &ServiceScope,
    ) -> Result<String, KeyError> {
        match authorize(
            &self.config,
            Caller::Service(scope),
            Operation::ResolveKey,
        )? {
            Grant::Scope(owner) => Ok(owner),
            Grant::Admin => Err(KeyError::Unauthorized),
        }
    }

    /// Shared lookup behind `get_oek`/`get_sek`.
    ///
    /// An explicit id is returned regardless of expiry or `KeyNotFound`.
    /// A stored blob that no longer decodes is also reported as
    /// `KeyNotFound` (the corruption itself goes to the log), so a
    /// tampered store never yields key material. Without an id, the
    /// default record is returned while unexpired; an expired or
    /// undecodable default is rotated out by creating a fresh one.
    /// Concurrent creation for the same scope may race; every created
    /// record stays retrievable by id and only the default alias is
    /// last-write-wins.
    async fn get_key(
        &self,
        owner: &str,
        service: &str,
        id: Option<&str>,
    ) -> Result<ResolvedKey, KeyError> {
        if let Some(id) = id {
            let blob = self
                .store
                .read_entry(owner, service, id)
                .await?
                .ok_or(KeyError::KeyNotFound)?;
            let record = self.decode_record(owner, service, &blob)?;
            return self.resolve(owner, &record);
        }

        let now = Utc::now().timestamp_millis();
        if let Some(blob) =
            self.store.read_entry(owner, service, DEFAULT_KEY_ALIAS).await?
        {
            match self.decode_record(owner, service, &blob) {
                Ok(record) if !record.is_expired(now) => {
                    return self.resolve(owner, &record);
                }
                // Expired or undecodable: fall through and rotate.
                Ok(_) | Err(_) => {}
            }
        }

        let record = KeyRecord::generate(self.config.ttl());
        self.store
            .insert_entry(
                owner,
                service,
                &record.guid.to_string(),
                record.encode(),
            )
            .await?;
        info!(self.log, "issued new default key";
            "owner" => owner,
            "service" => service,
            "id" => record.guid.to_string(),
        );
        self.resolve(owner, &record)
    }

    fn decode_record(
        &self,
        owner: &str,
        service: &str,
        blob: &str,
    ) -> Result<KeyRecord, KeyError> {
        KeyRecord::decode(blob).map_err(|_| {
            warn!(self.log, "undecodable keychain entry";
                "owner" => owner,
                "service" => service,
            );
            KeyError::KeyNotFound
        })
    }

    fn resolve(
        &self,
        owner: &str,
        record: &KeyRecord,
    ) -> Result<ResolvedKey, KeyError> {
        let raw = record.raw_key().map_err(|_| KeyError::KeyNotFound)?;
        Ok(ResolvedKey {
            id: record.guid.to_string(),
            key: owner_key_hash(self.master.expose(), owner, &raw),
        })
    }
}

impl std::fmt::Debug for KeyHierarchy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyHierarchy")
            .field("config", &self.config)
            .finish()
    }
}

fn base64_encode(bytes: &[u8]) -> String {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

fn base64_decode(s: &str) -> Result<Vec<u8>, base64::DecodeError> {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.decode(s)
}

#[cfg(test)]
mod tests {
    use super::*;
    use custody_store::MemoryKeychainStore;
    use serde_json::json;
    use slog::o;

    const SERVICE_TOKEN: &str = "shared-service-token";
    const ADMIN_TOKEN: &str = "hierarchy-admin-token";

    fn hierarchy(store: Arc<dyn KeychainStore>) -> KeyHierarchy {
        let log = Logger::root(slog::Discard, o!());
        let broker = OneTimeTokenBroker::new(&log);
        let token = broker.mint(MasterSecret::generate());
        let mut config = HierarchyConfig::new(SERVICE_TOKEN, ADMIN_TOKEN);
        config.kdf.iterations = 10;
        KeyHierarchy::bootstrap(&log, config, store, &broker, &token)
            .unwrap()
    }

    fn scope(service: &str) -> ServiceScope {
        ServiceScope {
            token: SERVICE_TOKEN.to_string(),
            service: service.to_string(),
        }
    }

    #[tokio::test]
    async fn default_key_is_stable_inside_the_ttl() {
        let h = hierarchy(Arc::new(MemoryKeychainStore::new()));
        let claims = OwnerClaims::for_owner("acme");

        let first = h.get_oek(&claims, "mail", None).await.unwrap();
        let second = h.get_oek(&claims, "mail", None).await.unwrap();
        assert_eq!(first, second);

        // The same record fetched by id resolves identically.
        let by_id =
            h.get_oek(&claims, "mail", Some(&first.id)).await.unwrap();
        assert_eq!(by_id, first);
    }

    #[tokio::test]
    async fn expired_default_rotates_but_stays_retrievable() {
        let store = Arc::new(MemoryKeychainStore::new());
        let h = hierarchy(store.clone());
        let claims = OwnerClaims::for_owner("acme");

        // Plant an already-expired default record.
        let mut stale = KeyRecord::generate(Duration::days(1));
        stale.exp = stale.iat - 1;
        let stale_id = stale.guid.to_string();
        store
            .insert_entry("acme", "mail", &stale_id, stale.encode())
            .await
            .unwrap();

        let fresh = h.get_oek(&claims, "mail", None).await.unwrap();
        assert_ne!(fresh.id, stale_id);

        // The rotated-out record still resolves by id, unchanged.
        let historical =
            h.get_oek(&claims, "mail", Some(&stale_id)).await.unwrap();
        assert_eq!(historical.id, stale_id);
        assert_ne!(historical.key, fresh.key);

        // The new record is now the default.
        let again = h.get_oek(&claims, "mail", None).await.unwrap();
        assert_eq!(again, fresh);
    }

    #[tokio::test]
    async fn undecodable_entries_read_as_missing_and_rotate() {
        let store = Arc::new(MemoryKeychainStore::new());
        let h = hierarchy(store.clone());
        let claims = OwnerClaims::for_owner("acme");

        // A corrupt blob lands at both its id and the default alias.
        store
            .insert_entry("acme", "mail", "bad-id", "*** not a record".into())
            .await
            .unwrap();

        assert!(matches!(
            h.get_oek(&claims, "mail", Some("bad-id")).await,
            Err(KeyError::KeyNotFound)
        ));

        // The corrupt default does not wedge the scope; a fresh record
        // takes over as the default.
        let fresh = h.get_oek(&claims, "mail", None).await.unwrap();
        let again = h.get_oek(&claims, "mail", None).await.unwrap();
        assert_eq!(fresh, again);
    }

    #[tokio::test]
    async fn distinct_scopes_get_distinct_defaults() {
        let h = hierarchy(Arc::new(MemoryKeychainStore::new()));
        let acme = OwnerClaims::for_owner("acme");
        let globex = OwnerClaims::for_owner("globex");

        let a = h.get_oek(&acme, "mail", None).await.unwrap();
        let b = h.get_oek(&globex, "mail", None).await.unwrap();
        assert_ne!(a.id, b.id);
        assert_ne!(a.key, b.key);

        let c = h.get_oek(&acme, "billing", None).await.unwrap();
        assert_ne!(a.id, c.id);
        assert_ne!(a.key, c.key);
    }

    #[tokio::test]
    async fn missing_id_and_missing_claims_fail_cleanly() {
        let h = hierarchy(Arc::new(MemoryKeychainStore::new()));
        let claims = OwnerClaims::for_owner("acme");

        assert!(matches!(
            h.get_oek(&claims, "mail", Some("no-such-id")).await,
            Err(KeyError::KeyNotFound)
        ));
        assert!(matches!(
            h.get_oek(&OwnerClaims::default(), "mail", None).await,
            Err(KeyError::Unauthorized)
        ));

        let bad = ServiceScope {
            token: "wrong".to_string(),
            service: "mail".to_string(),
        };
        assert!(matches!(
            h.get_sek(&bad, None).await,
            Err(KeyError::Unauthorized)
        ));
    }

    #[tokio::test]
    async fn encrypt_decrypt_round_trip() {
        let h = hierarchy(Arc::new(MemoryKeychainStore::new()));
        let scope = scope("mail");

        let value = json!({"to": "user@example.com", "attempts": 3});
        let sealed = h.encrypt(&scope, &value).await.unwrap();
        assert_ne!(sealed, value.to_string());

        let opened = h.decrypt(&scope, &sealed).await.unwrap();
        assert_eq!(opened, value);
    }

    #[tokio::test]
    async fn empty_input_decrypts_to_null() {
        let h = hierarchy(Arc::new(MemoryKeychainStore::new()));
        let scope = scope("mail");
        assert_eq!(
            h.decrypt(&scope, "").await.unwrap(),
            serde_json::Value::Null
        );
        assert_eq!(
            h.decrypt(&scope, "   ").await.unwrap(),
            serde_json::Value::Null
        );
    }

    #[tokio::test]
    async fn every_tampered_envelope_fails_the_same_way() {
        let h = hierarchy(Arc::new(MemoryKeychainStore::new()));
        let scope = scope("mail");
        let sealed =
            h.encrypt(&scope, &json!({"secret": true})).await.unwrap();

        // Not an envelope at all.
        assert!(matches!(
            h.decrypt(&scope, "garbage").await,
            Err(KeyError::DecryptionFailed)
        ));

        // Valid envelope shape, unknown key id.
        let mut envelope = Envelope::decode(&sealed).unwrap();
        envelope.key_id = "no-such-id".to_string();
        assert!(matches!(
            h.decrypt(&scope, &envelope.encode()).await,
            Err(KeyError::DecryptionFailed)
        ));

        // Corrupted ciphertext.
        let mut envelope = Envelope::decode(&sealed).unwrap();
        envelope.data = base64_encode(b"not the ciphertext!!");
        assert!(matches!(
            h.decrypt(&scope, &envelope.encode()).await,
            Err(KeyError::DecryptionFailed)
        ));

        // Wrong scope: a different service cannot open it.
        assert!(matches!(
            h.decrypt(&self::scope("billing"), &sealed).await,
            Err(KeyError::DecryptionFailed)
        ));

        // The untouched envelope still opens.
        assert!(h.decrypt(&scope, &sealed).await.is_ok());
    }

    #[tokio::test]
    async fn delete_owner_backs_up_then_purges() {
        let store = Arc::new(MemoryKeychainStore::new());
        let h = hierarchy(store);
        let claims = OwnerClaims::for_owner("acme");

        let mail = h.get_oek(&claims, "mail", None).await.unwrap();
        h.get_oek(&claims, "billing", None).await.unwrap();

        assert!(matches!(
            h.delete_owner("wrong", "acme").await,
            Err(KeyError::Unauthorized)
        ));

        let backup = h.delete_owner(ADMIN_TOKEN, "acme").await.unwrap();
        assert_eq!(backup.owner, "acme");
        assert_eq!(backup.services.len(), 2);
        assert!(backup.services["mail"].contains_key(&mail.id));

        // The purge severs history; a new request starts a new lineage.
        assert!(matches!(
            h.get_oek(&claims, "mail", Some(&mail.id)).await,
            Err(KeyError::KeyNotFound)
        ));
        let fresh = h.get_oek(&claims, "mail", None).await.unwrap();
        assert_ne!(fresh.id, mail.id);
    }

    #[tokio::test]
    async fn get_owners_lists_for_admins_only() {
        let h = hierarchy(Arc::new(MemoryKeychainStore::new()));
        h.get_oek(&OwnerClaims::for_owner("acme"), "mail", None)
            .await
            .unwrap();
        h.get_sek(&scope("mail"), None).await.unwrap();

        assert!(matches!(
            h.get_owners("wrong").await,
            Err(KeyError::Unauthorized)
        ));
        let owners = h.get_owners(ADMIN_TOKEN).await.unwrap();
        assert_eq!(owners, vec!["acme".to_string(), "mail".to_string()]);
    }

    #[tokio::test]
    async fn bootstrap_token_is_single_use() {
        let log = Logger::root(slog::Discard, o!());
        let broker = OneTimeTokenBroker::new(&log);
        let token = broker.mint(MasterSecret::generate());
        let store: Arc<dyn KeychainStore> =
            Arc::new(MemoryKeychainStore::new());
        let config = HierarchyConfig::new(SERVICE_TOKEN, ADMIN_TOKEN);

        assert!(KeyHierarchy::bootstrap(
            &log,
            config.clone(),
            store.clone(),
            &broker,
            &token,
        )
        .is_ok());
        assert!(matches!(
            KeyHierarchy::bootstrap(&log, config, store, &broker, &token),
            Err(KeyError::Unauthorized)
        ));
    }
}
