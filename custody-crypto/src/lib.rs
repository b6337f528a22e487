// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Cryptographic primitives for the custody service: threshold secret
//! sharing of the master secret, the salted verification record, and the
//! envelope cipher used for payload encryption.

mod envelope;
mod field;
mod secret;
mod shamir;
mod verification;

pub use envelope::{
    decrypt_payload, derive_envelope_key, encrypt_payload, owner_key_hash,
    EnvelopeError, KdfParams, ENVELOPE_IV_SIZE,
};
pub use secret::{MasterSecret, Share, MASTER_SECRET_SIZE, SHARE_SIZE};
pub use shamir::SecretSharingError;
pub use verification::{InvalidRecord, VerificationParams, VerificationRecord};
