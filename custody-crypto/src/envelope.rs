// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Payload cipher primitives for the encryption envelope, plus the
//! keyed hash that transforms stored key material before it ever leaves
//! the key hierarchy.
//!
//! A one-time symmetric key is derived per envelope via PBKDF2 over the
//! resolved key material and the envelope's fresh IV, and the payload is
//! encrypted with AES-256-CBC under that key.

use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use hmac::{Hmac, Mac};
use pbkdf2::pbkdf2_hmac;
use sha2::{Sha256, Sha512};
use thiserror::Error;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// AES-CBC initialization vector size.
pub const ENVELOPE_IV_SIZE: usize = 16;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum EnvelopeError {
    #[error("failed to encrypt")]
    FailedToEncrypt,

    #[error("failed to decrypt")]
    FailedToDecrypt,
}

/// PBKDF2 parameters for per-envelope key derivation.
#[derive(Debug, Clone)]
pub struct KdfParams {
    pub iterations: u32,
    pub key_len: usize,
}

impl Default for KdfParams {
    fn default() -> Self {
        KdfParams { iterations: 1000, key_len: 32 }
    }
}

/// Derive a one-time envelope key from key material and an IV.
pub fn derive_envelope_key(
    material: &[u8],
    iv: &[u8],
    params: &KdfParams,
) -> Vec<u8> {
    let mut key = vec![0u8; params.key_len];
    pbkdf2_hmac::<Sha512>(material, iv, params.iterations, &mut key);
    key
}

/// AES-256-CBC encrypt with PKCS7 padding.
pub fn encrypt_payload(
    key: &[u8],
    iv: &[u8],
    plaintext: &[u8],
) -> Result<Vec<u8>, EnvelopeError> {
    let cipher = Aes256CbcEnc::new_from_slices(key, iv)
        .map_err(|_| EnvelopeError::FailedToEncrypt)?;
    Ok(cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext))
}

/// AES-256-CBC decrypt with PKCS7 padding. All failures (bad key
/// length, bad IV, bad padding) collapse into one error so callers
/// cannot turn decryption into an oracle.
pub fn decrypt_payload(
    key: &[u8],
    iv: &[u8],
    ciphertext: &[u8],
) -> Result<Vec<u8>, EnvelopeError> {
    let cipher = Aes256CbcDec::new_from_slices(key, iv)
        .map_err(|_| EnvelopeError::FailedToDecrypt)?;
    cipher
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| EnvelopeError::FailedToDecrypt)
}

/// The owner-scoped transform applied to stored key material:
/// `hex(HMAC-SHA256(key = master ‖ owner, msg = raw key))`.
///
/// A leak of the persisted store alone is useless without the master
/// secret held only by unsealed nodes.
pub fn owner_key_hash(master: &[u8], owner: &str, raw_key: &[u8]) -> String {
    let mut mac_key =
        Vec::with_capacity(master.len() + owner.len());
    mac_key.extend_from_slice(master);
    mac_key.extend_from_slice(owner.as_bytes());

    // HMAC accepts keys of any length.
    let mut mac = Hmac::<Sha256>::new_from_slice(&mac_key).unwrap();
    mac.update(raw_key);
    hex::encode(mac.finalize().into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encrypt_decrypt_round_trip() {
        let params = KdfParams::default();
        let iv = [7u8; ENVELOPE_IV_SIZE];
        let key = derive_envelope_key(b"resolved key material", &iv, &params);

        let plaintext = br#"{"any":"payload","n":42}"#;
        let ciphertext = encrypt_payload(&key, &iv, plaintext).unwrap();
        assert_ne!(&ciphertext[..], &plaintext[..]);

        let recovered = decrypt_payload(&key, &iv, &ciphertext).unwrap();
        assert_eq!(recovered, plaintext);
    }

    #[test]
    fn wrong_key_fails_to_decrypt() {
        let params = KdfParams::default();
        let iv = [7u8; ENVELOPE_IV_SIZE];
        let key = derive_envelope_key(b"material", &iv, &params);
        let other = derive_envelope_key(b"other material", &iv, &params);

        let ciphertext =
            encrypt_payload(&key, &iv, b"a secret payload").unwrap();
        // PKCS7 unpadding rejects garbage with overwhelming probability.
        let result = decrypt_payload(&other, &iv, &ciphertext);
        if let Ok(bytes) = result {
            assert_ne!(bytes, b"a secret payload");
        }
    }

    #[test]
    fn bad_key_length_is_rejected() {
        let iv = [0u8; ENVELOPE_IV_SIZE];
        assert_eq!(
            encrypt_payload(&[1, 2, 3], &iv, b"x"),
            Err(EnvelopeError::FailedToEncrypt)
        );
        assert_eq!(
            decrypt_payload(&[1, 2, 3], &iv, &[0u8; 16]),
            Err(EnvelopeError::FailedToDecrypt)
        );
    }

    #[test]
    fn owner_key_hash_is_scoped_by_owner_and_master() {
        let master = [3u8; 64];
        let a = owner_key_hash(&master, "owner-a", b"raw");
        let b = owner_key_hash(&master, "owner-b", b"raw");
        assert_ne!(a, b);

        let other_master = [4u8; 64];
        let c = owner_key_hash(&other_master, "owner-a", b"raw");
        assert_ne!(a, c);

        // Deterministic for a fixed scope.
        assert_eq!(a, owner_key_hash(&master, "owner-a", b"raw"));
    }
}
