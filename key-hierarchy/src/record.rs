// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The persisted key record.
//!
//! Stored as base64-encoded JSON with short field names; the wire
//! layout is shared with external consumers of the keychain rows and
//! must not change.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{Duration, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Raw key size before the owner-scoped transform.
pub const RAW_KEY_SIZE: usize = 32;

#[derive(Debug, Error)]
#[error("malformed key record")]
pub struct MalformedRecord;

/// One immutable key generation: a random 256-bit key with its issue
/// and expiry instants in unix milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRecord {
    pub guid: Uuid,
    /// Hex-encoded raw key material.
    pub key: String,
    pub iat: i64,
    pub exp: i64,
}

impl KeyRecord {
    pub fn generate(ttl: Duration) -> KeyRecord {
        let mut raw = [0u8; RAW_KEY_SIZE];
        OsRng.fill_bytes(&mut raw);
        let now = Utc::now();
        KeyRecord {
            guid: Uuid::new_v4(),
            key: hex::encode(raw),
            iat: now.timestamp_millis(),
            exp: (now + ttl).timestamp_millis(),
        }
    }

    /// Expiry only gates the default alias; records fetched by id stay
    /// usable forever so old ciphertext remains decryptable.
    pub fn is_expired(&self, now_millis: i64) -> bool {
        now_millis > self.exp
    }

    pub fn raw_key(&self) -> Result<Vec<u8>, MalformedRecord> {
        hex::decode(&self.key).map_err(|_| MalformedRecord)
    }

    pub fn encode(&self) -> String {
        // Serialization of a plain struct with string/int fields cannot
        // fail.
        let json = serde_json::to_vec(self).unwrap();
        BASE64.encode(json)
    }

    pub fn decode(blob: &str) -> Result<KeyRecord, MalformedRecord> {
        let json = BASE64.decode(blob).map_err(|_| MalformedRecord)?;
        serde_json::from_slice(&json).map_err(|_| MalformedRecord)
    }
}
