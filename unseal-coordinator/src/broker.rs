// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! One-time token handoff of the reconstructed master secret.
//!
//! The moment a node unseals, the coordinator mints a token carrying a
//! copy of the secret. The key hierarchy bootstrap redeems it exactly
//! once; the token is marked consumed before the outcome is inspected,
//! so neither repeated nor mismatched calls ever see the secret again.
//! A token whose consumer never arrives simply stays pending and inert.

use std::collections::BTreeMap;
use std::sync::Mutex;

use rand::rngs::OsRng;
use rand::RngCore;
use slog::{info, o, Logger};
use subtle::ConstantTimeEq;

use custody_crypto::MasterSecret;

use crate::UnsealError;

/// A credential valid for exactly one successful master secret fetch.
#[derive(Clone)]
pub struct OneTimeToken(String);

impl OneTimeToken {
    fn generate() -> OneTimeToken {
        let mut bytes = [0u8; 32];
        OsRng.fill_bytes(&mut bytes);
        OneTimeToken(hex::encode(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl PartialEq for OneTimeToken {
    fn eq(&self, other: &Self) -> bool {
        self.0.as_bytes().ct_eq(other.0.as_bytes()).into()
    }
}

impl Eq for OneTimeToken {}

impl std::fmt::Debug for OneTimeToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OneTimeToken").finish()
    }
}

enum TokenState {
    Pending(MasterSecret),
    Consumed,
}

/// Mints and redeems one-time tokens for same-node secret handoff.
pub struct OneTimeTokenBroker {
    log: Logger,
    tokens: Mutex<BTreeMap<String, TokenState>>,
}

impl OneTimeTokenBroker {
    pub fn new(log: &Logger) -> OneTimeTokenBroker {
        OneTimeTokenBroker {
            log: log.new(o!("component" => "OneTimeTokenBroker")),
            tokens: Mutex::new(BTreeMap::new()),
        }
    }

    /// Mint a token carrying a volatile copy of the secret.
    pub fn mint(&self, secret: MasterSecret) -> OneTimeToken {
        let token = OneTimeToken::generate();
        self.tokens
            .lock()
            .unwrap()
            .insert(token.0.clone(), TokenState::Pending(secret));
        token
    }

    /// Redeem a token for the master secret. Valid for one successful
    /// call; the token is consumed regardless of outcome.
    pub fn redeem(
        &self,
        token: &OneTimeToken,
    ) -> Result<MasterSecret, UnsealError> {
        let mut tokens = self.tokens.lock().unwrap();
        let Some(state) = tokens.get_mut(&token.0) else {
            return Err(UnsealError::Unauthorized);
        };
        match std::mem::replace(state, TokenState::Consumed) {
            TokenState::Pending(secret) => {
                info!(self.log, "master secret handed off");
                Ok(secret)
            }
            TokenState::Consumed => Err(UnsealError::Unauthorized),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log() -> Logger {
        Logger::root(slog::Discard, o!())
    }

    #[test]
    fn token_is_valid_exactly_once() {
        let broker = OneTimeTokenBroker::new(&log());
        let secret = MasterSecret::generate();
        let token = broker.mint(secret.clone());

        let fetched = broker.redeem(&token).unwrap();
        assert_eq!(fetched, secret);

        assert!(matches!(
            broker.redeem(&token),
            Err(UnsealError::Unauthorized)
        ));
    }

    #[test]
    fn unknown_token_is_rejected_without_consuming_others() {
        let broker = OneTimeTokenBroker::new(&log());
        let secret = MasterSecret::generate();
        let token = broker.mint(secret.clone());

        let forged = OneTimeToken::generate();
        assert!(matches!(
            broker.redeem(&forged),
            Err(UnsealError::Unauthorized)
        ));

        // The real token is still redeemable.
        assert_eq!(broker.redeem(&token).unwrap(), secret);
    }

    #[test]
    fn tokens_are_independent() {
        let broker = OneTimeTokenBroker::new(&log());
        let s1 = MasterSecret::generate();
        let s2 = MasterSecret::generate();
        let t1 = broker.mint(s1.clone());
        let t2 = broker.mint(s2.clone());

        assert_eq!(broker.redeem(&t2).unwrap(), s2);
        assert_eq!(broker.redeem(&t1).unwrap(), s1);
    }
}
