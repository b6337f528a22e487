// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Owner and service keys derived under the node's master secret.
//!
//! The hierarchy comes to life when the local unseal coordinator hands
//! over the reconstructed master secret through a one-time token. From
//! then on it issues per-`(owner, service)` key records with a rolling
//! default, hands out only owner-scoped transforms of the stored
//! material, and offers envelope encryption on top of the resolved
//! keys.

mod auth;
mod bootstrap;
mod envelope;
mod error;
mod hierarchy;
mod record;

pub use auth::{OwnerClaims, ServiceScope};
pub use bootstrap::KeyServiceHandle;
pub use envelope::Envelope;
pub use error::KeyError;
pub use hierarchy::{
    HierarchyConfig, KeyHierarchy, OwnerBackup, ResolvedKey,
};
pub use record::{KeyRecord, RAW_KEY_SIZE};
