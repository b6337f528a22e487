// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use custody_store::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("unauthorized")]
    Unauthorized,

    #[error("no key record with the requested id")]
    KeyNotFound,

    // Deliberately generic: every structural or cryptographic failure
    // during decryption maps here so callers cannot distinguish them.
    #[error("failed to decrypt")]
    DecryptionFailed,

    #[error(transparent)]
    StorageUnavailable(#[from] StorageError),
}
