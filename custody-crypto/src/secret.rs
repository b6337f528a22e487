// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The master secret and its threshold shares.

use rand::rngs::OsRng;
use rand::RngCore;
use secrecy::{ExposeSecret, Secret};
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::shamir;
use crate::SecretSharingError;

/// Size of the master secret in bytes (512 bits).
pub const MASTER_SECRET_SIZE: usize = 64;

/// Each share is one x-coordinate byte followed by one y-byte per
/// secret byte.
pub const SHARE_SIZE: usize = MASTER_SECRET_SIZE + 1;

/// A boxed array containing the master secret bytes.
///
/// This should never be used directly, and always wrapped in a `Secret`
/// upon construction. We separate the two types because a `Secret` must
/// contain `Zeroize`-able data, and a `Box<[u8; 64]>` is not zeroizable
/// on its own. Boxing keeps the bytes from being littered around memory
/// via moves.
#[derive(Zeroize, ZeroizeOnDrop)]
struct MasterSecretData(Box<[u8; MASTER_SECRET_SIZE]>);

/// The high-entropy master secret at the root of the key hierarchy.
///
/// Exists only in volatile memory on an unsealed node. It is never
/// persisted; a process restart loses it and requires a re-unseal from
/// threshold shares.
pub struct MasterSecret {
    secret: Secret<MasterSecretData>,
}

impl MasterSecret {
    /// Generate a fresh random secret, rejecting the (astronomically
    /// unlikely) all-zero value.
    pub fn generate() -> MasterSecret {
        let mut rng = OsRng;
        let mut data = Box::new([0u8; MASTER_SECRET_SIZE]);
        while data.ct_eq(&[0u8; MASTER_SECRET_SIZE]).into() {
            rng.fill_bytes(&mut *data);
        }
        MasterSecret { secret: Secret::new(MasterSecretData(data)) }
    }

    /// Split the secret into `total_shares` shares of which any
    /// `threshold` reconstruct it.
    pub fn split(
        &self,
        threshold: u8,
        total_shares: u8,
    ) -> Result<Secret<Vec<Share>>, SecretSharingError> {
        let raw = shamir::split(
            self.secret.expose_secret().0.as_ref(),
            threshold,
            total_shares,
            &mut OsRng,
        )?;
        Ok(Secret::new(raw.into_iter().map(Share).collect()))
    }

    /// Combine shares into a secret by interpolation at x = 0.
    ///
    /// Note that below-threshold input does not fail here: it simply
    /// interpolates to an unrelated value (the scheme leaks nothing
    /// below the threshold, including the fact of being below it).
    /// Callers enforce the threshold count and verify the result.
    pub fn reconstruct(
        shares: &[Share],
    ) -> Result<MasterSecret, SecretSharingError> {
        let raw: Vec<Vec<u8>> =
            shares.iter().map(|s| s.0.clone()).collect();
        let bytes = shamir::interpolate(&raw, 0)?;
        let data: Box<[u8; MASTER_SECRET_SIZE]> = bytes
            .into_boxed_slice()
            .try_into()
            .map_err(|_| SecretSharingError::InconsistentShares)?;
        Ok(MasterSecret { secret: Secret::new(MasterSecretData(data)) })
    }

    /// Derive the share at `index` from a reconstructing set, without
    /// returning the secret itself. Used to replace a lost fragment.
    pub fn derive_share(
        index: u8,
        shares: &[Share],
    ) -> Result<Share, SecretSharingError> {
        let raw: Vec<Vec<u8>> =
            shares.iter().map(|s| s.0.clone()).collect();
        Ok(Share(shamir::derive_share(index, &raw)?))
    }

    /// Expose the raw secret bytes for key derivation.
    pub fn expose(&self) -> &[u8; MASTER_SECRET_SIZE] {
        &self.secret.expose_secret().0
    }
}

impl Clone for MasterSecret {
    fn clone(&self) -> Self {
        MasterSecret {
            secret: Secret::new(MasterSecretData(Box::new(
                *self.secret.expose_secret().0,
            ))),
        }
    }
}

impl PartialEq for MasterSecret {
    fn eq(&self, other: &Self) -> bool {
        self.secret
            .expose_secret()
            .0
            .ct_eq(&*other.secret.expose_secret().0)
            .into()
    }
}

impl Eq for MasterSecret {}

// We don't want to risk debug-logging secret material, so implement
// `Debug` manually and omit the contents.
impl std::fmt::Debug for MasterSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MasterSecret").finish()
    }
}

/// One fragment of the split master secret.
///
/// Wire form is a hex string; the first byte is the non-zero share
/// index. Ordered so a `BTreeSet` collects submissions idempotently.
#[derive(
    Clone, PartialEq, Eq, PartialOrd, Ord, Zeroize, ZeroizeOnDrop,
)]
pub struct Share(Vec<u8>);

impl Share {
    /// Parse and structurally validate the hex wire form.
    pub fn from_hex(s: &str) -> Result<Share, SecretSharingError> {
        let bytes = hex::decode(s.trim())
            .map_err(|_| SecretSharingError::InvalidShare)?;
        if bytes.len() != SHARE_SIZE || bytes[0] == 0 {
            return Err(SecretSharingError::InvalidShare);
        }
        Ok(Share(bytes))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    /// The share's x-coordinate.
    pub fn index(&self) -> u8 {
        self.0[0]
    }
}

impl std::fmt::Debug for Share {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Share").field("index", &self.index()).finish()
    }
}
