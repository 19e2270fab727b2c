//! Bearer-token authentication
//!
//! The verifier turns a bearer token into a [`Principal`] using a
//! Redis-backed claim cache in front of the identity provider. Failures are
//! classified so metrics can distinguish bad tokens from provider outages.

pub mod token_cache;
pub mod verifier;

use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use thiserror::Error;

pub use token_cache::TokenClaimCache;
pub use verifier::KeycloakVerifier;

/// Identity extracted from a validated bearer token.
///
/// Immutable for the lifetime of a connection; role checks use the role set
/// captured here, never a re-fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    /// Opaque user identifier (`sub` claim)
    pub user_id: String,

    /// Display username (`preferred_username` claim)
    pub username: String,

    /// Deduplicated role names
    pub roles: BTreeSet<String>,

    /// Absolute token expiry
    pub expires_at: DateTime<Utc>,
}

impl Principal {
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }

    /// True when the principal holds every named role
    pub fn has_all_roles<S: AsRef<str>>(&self, roles: &[S]) -> bool {
        roles.iter().all(|r| self.roles.contains(r.as_ref()))
    }

    pub fn roles_vec(&self) -> Vec<String> {
        self.roles.iter().cloned().collect()
    }
}

/// Why a bearer token was rejected
#[derive(Debug, Error)]
pub enum AuthFailure {
    #[error("invalid token: {0}")]
    Invalid(String),

    #[error("token expired")]
    Expired,

    #[error("identity provider unavailable: {0}")]
    ProviderUnavailable(String),
}

impl AuthFailure {
    /// Metric label for this failure class
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Invalid(_) => "invalid",
            Self::Expired => "expired",
            Self::ProviderUnavailable(_) => "provider_unavailable",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn principal(roles: &[&str]) -> Principal {
        Principal {
            user_id: "u-1".into(),
            username: "alice".into(),
            roles: roles.iter().map(|r| r.to_string()).collect(),
            expires_at: Utc::now() + chrono::Duration::hours(1),
        }
    }

    #[test]
    fn test_has_all_roles_requires_every_role() {
        let p = principal(&["admin", "reader"]);
        assert!(p.has_all_roles(&["admin"]));
        assert!(p.has_all_roles(&["admin", "reader"]));
        assert!(!p.has_all_roles(&["admin", "writer"]));
    }

    #[test]
    fn test_role_comparison_is_case_sensitive() {
        let p = principal(&["Admin"]);
        assert!(!p.has_role("admin"));
        assert!(p.has_role("Admin"));
    }

    #[test]
    fn test_empty_role_list_always_passes() {
        let p = principal(&[]);
        assert!(p.has_all_roles::<&str>(&[]));
    }

    #[test]
    fn test_failure_reasons() {
        assert_eq!(AuthFailure::Invalid("x".into()).reason(), "invalid");
        assert_eq!(AuthFailure::Expired.reason(), "expired");
        assert_eq!(
            AuthFailure::ProviderUnavailable("x".into()).reason(),
            "provider_unavailable"
        );
    }
}
