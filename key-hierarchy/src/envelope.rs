// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The encryption envelope wire form.
//!
//! An envelope travels as one opaque base64(JSON) string naming the key
//! record used, the fresh IV, and the ciphertext. The layout is shared
//! with external consumers and must not change.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
#[error("malformed envelope")]
pub struct MalformedEnvelope;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "keyId")]
    pub key_id: String,
    /// Hex-encoded 16-byte IV.
    pub iv: String,
    /// Base64-encoded ciphertext.
    pub data: String,
}

impl Envelope {
    pub fn encode(&self) -> String {
        // Plain string struct, serialization cannot fail.
        let json = serde_json::to_vec(self).unwrap();
        BASE64.encode(json)
    }

    pub fn decode(blob: &str) -> Result<Envelope, MalformedEnvelope> {
        let json =
            BASE64.decode(blob.trim()).map_err(|_| MalformedEnvelope)?;
        serde_json::from_slice(&json).map_err(|_| MalformedEnvelope)
    }
}
