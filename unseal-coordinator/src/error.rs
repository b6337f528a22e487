// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error kinds for the unseal protocol.

use custody_crypto::SecretSharingError;
use custody_store::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum UnsealError {
    #[error("not authorized")]
    Unauthorized,

    #[error("master secret is already initialized")]
    AlreadyInitialized,

    #[error("node is already unsealed")]
    AlreadyUnsealed,

    #[error("invalid share: {0}")]
    InvalidShare(#[from] SecretSharingError),

    // Fatal to this unseal attempt only: the reconstruction is
    // discarded, collected shares are kept, and resubmission retries.
    #[error(
        "master secret verification failed; check the shares and the \
         verification record"
    )]
    VerificationFailed,

    #[error(transparent)]
    StorageUnavailable(#[from] StorageError),
}
