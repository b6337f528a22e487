// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The persisted verification record used to confirm that a
//! reconstructed master secret equals the original.
//!
//! The record packs its own parameters so nothing else needs storing:
//! `u32be(salt_len) ‖ u32be(iterations) ‖ salt ‖ digest` with
//! `digest = PBKDF2-HMAC-SHA512(secret, salt, iterations)`. It can
//! confirm a reconstruction but is useless for recovering the secret.

use pbkdf2::pbkdf2_hmac;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha512;
use subtle::ConstantTimeEq;
use thiserror::Error;

use crate::MasterSecret;

const HEADER_LEN: usize = 8;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("malformed verification record")]
pub struct InvalidRecord;

/// PBKDF2 parameters for verification records.
#[derive(Debug, Clone)]
pub struct VerificationParams {
    pub iterations: u32,
    pub salt_len: usize,
    pub digest_len: usize,
}

impl Default for VerificationParams {
    fn default() -> Self {
        VerificationParams {
            iterations: 100_000,
            salt_len: 16,
            digest_len: 32,
        }
    }
}

/// An opaque, self-describing verification record.
///
/// Its presence in the verification store also serves as the guard
/// preventing a second `init`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationRecord(Vec<u8>);

impl VerificationRecord {
    /// Compute a freshly salted record for `secret`.
    pub fn compute(
        secret: &MasterSecret,
        params: &VerificationParams,
    ) -> VerificationRecord {
        let mut salt = vec![0u8; params.salt_len];
        OsRng.fill_bytes(&mut salt);

        let mut digest = vec![0u8; params.digest_len];
        pbkdf2_hmac::<Sha512>(
            secret.expose(),
            &salt,
            params.iterations,
            &mut digest,
        );

        let mut packed =
            Vec::with_capacity(HEADER_LEN + salt.len() + digest.len());
        packed.extend_from_slice(&(salt.len() as u32).to_be_bytes());
        packed.extend_from_slice(&params.iterations.to_be_bytes());
        packed.extend_from_slice(&salt);
        packed.extend_from_slice(&digest);
        VerificationRecord(packed)
    }

    /// Recompute the digest with the packed parameters and compare.
    /// Malformed records verify as false rather than erroring, so a
    /// corrupt store cannot be distinguished from a wrong secret.
    pub fn verify(&self, secret: &MasterSecret) -> bool {
        let buf = &self.0;
        if buf.len() < HEADER_LEN {
            return false;
        }
        let salt_len =
            u32::from_be_bytes(buf[0..4].try_into().unwrap()) as usize;
        let iterations = u32::from_be_bytes(buf[4..8].try_into().unwrap());
        let Some(rest) = buf.get(HEADER_LEN..) else {
            return false;
        };
        if rest.len() <= salt_len {
            return false;
        }
        let (salt, digest) = rest.split_at(salt_len);

        let mut recomputed = vec![0u8; digest.len()];
        pbkdf2_hmac::<Sha512>(
            secret.expose(),
            salt,
            iterations,
            &mut recomputed,
        );
        recomputed.ct_eq(digest).into()
    }

    pub fn from_bytes(bytes: Vec<u8>) -> VerificationRecord {
        VerificationRecord(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    pub fn from_hex(s: &str) -> Result<VerificationRecord, InvalidRecord> {
        Ok(VerificationRecord(
            hex::decode(s.trim()).map_err(|_| InvalidRecord)?,
        ))
    }
}
