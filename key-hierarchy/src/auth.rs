// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Caller authorization for key operations.
//!
//! Three kinds of credential reach the hierarchy: validated tenant
//! claims, the shared service token of a peer service, and the admin
//! token. A single predicate maps credential plus intent to either a
//! resolved key scope or an admin grant; everything else is refused.

use subtle::ConstantTimeEq;

use crate::{HierarchyConfig, KeyError};

/// Tenant identity extracted from an already-authenticated request
/// context. `owner_id` absent means the request carried no usable
/// identity, not an anonymous grant.
#[derive(Debug, Clone, Default)]
pub struct OwnerClaims {
    pub owner_id: Option<String>,
}

impl OwnerClaims {
    pub fn for_owner<S: Into<String>>(owner_id: S) -> OwnerClaims {
        OwnerClaims { owner_id: Some(owner_id.into()) }
    }
}

/// Service-to-service credential: the shared token plus the service
/// name, which doubles as the key scope.
#[derive(Clone)]
pub struct ServiceScope {
    pub token: String,
    pub service: String,
}

impl std::fmt::Debug for ServiceScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceScope")
            .field("token", &"<elided>")
            .field("service", &self.service)
            .finish()
    }
}

pub(crate) enum Caller<'a> {
    Owner(&'a OwnerClaims),
    Service(&'a ServiceScope),
    Admin(&'a str),
}

#[derive(Clone, Copy)]
pub(crate) enum Operation {
    ResolveKey,
    ManageOwners,
}

pub(crate) enum Grant {
    /// Key operations scoped to this owner.
    Scope(String),
    Admin,
}

/// Resolve a caller's grant for an operation, or refuse it. Token
/// comparisons are constant-time.
pub(crate) fn authorize(
    config: &HierarchyConfig,
    caller: Caller<'_>,
    operation: Operation,
) -> Result<Grant, KeyError> {
    match (caller, operation) {
        (Caller::Owner(claims), Operation::ResolveKey) => claims
            .owner_id
            .clone()
            .map(Grant::Scope)
            .ok_or(KeyError::Unauthorized),
        (Caller::Service(scope), Operation::ResolveKey) => {
            if token_matches(&scope.token, &config.service_token) {
                Ok(Grant::Scope(scope.service.clone()))
            } else {
                Err(KeyError::Unauthorized)
            }
        }
        (Caller::Admin(token), Operation::ManageOwners) => {
            if token_matches(token, &config.admin_token) {
                Ok(Grant::Admin)
            } else {
                Err(KeyError::Unauthorized)
            }
        }
        _ => Err(KeyError::Unauthorized),
    }
}

fn token_matches(presented: &str, expected: &str) -> bool {
    presented.as_bytes().ct_eq(expected.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> HierarchyConfig {
        HierarchyConfig::new("service-token", "admin-token")
    }

    #[test]
    fn owner_claims_resolve_to_their_owner() {
        let claims = OwnerClaims::for_owner("acme");
        match authorize(
            &config(),
            Caller::Owner(&claims),
            Operation::ResolveKey,
        ) {
            Ok(Grant::Scope(owner)) => assert_eq!(owner, "acme"),
            other => panic!("unexpected grant: {:?}", other.is_ok()),
        }
    }

    #[test]
    fn missing_owner_id_is_refused() {
        let claims = OwnerClaims::default();
        assert!(matches!(
            authorize(
                &config(),
                Caller::Owner(&claims),
                Operation::ResolveKey
            ),
            Err(KeyError::Unauthorized)
        ));
    }

    #[test]
    fn service_token_scopes_to_the_service_name() {
        let scope = ServiceScope {
            token: "service-token".to_string(),
            service: "billing".to_string(),
        };
        match authorize(
            &config(),
            Caller::Service(&scope),
            Operation::ResolveKey,
        ) {
            Ok(Grant::Scope(owner)) => assert_eq!(owner, "billing"),
            other => panic!("unexpected grant: {:?}", other.is_ok()),
        }

        let bad = ServiceScope {
            token: "wrong".to_string(),
            service: "billing".to_string(),
        };
        assert!(matches!(
            authorize(&config(), Caller::Service(&bad), Operation::ResolveKey),
            Err(KeyError::Unauthorized)
        ));
    }

    #[test]
    fn admin_grant_does_not_cover_key_resolution() {
        assert!(matches!(
            authorize(
                &config(),
                Caller::Admin("admin-token"),
                Operation::ResolveKey
            ),
            Err(KeyError::Unauthorized)
        ));
        assert!(matches!(
            authorize(
                &config(),
                Caller::Admin("admin-token"),
                Operation::ManageOwners
            ),
            Ok(Grant::Admin)
        ));
        assert!(matches!(
            authorize(
                &config(),
                Caller::Admin("wrong"),
                Operation::ManageOwners
            ),
            Err(KeyError::Unauthorized)
        ));
    }
}
