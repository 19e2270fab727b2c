//! Keycloak bearer-token verifier

use chrono::{DateTime, TimeZone, Utc};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use super::{AuthFailure, Principal, TokenClaimCache};
use crate::config::KeycloakConfig;

/// Realm metadata served by the identity provider's public realm endpoint
#[derive(Debug, Deserialize)]
struct RealmInfo {
    public_key: String,
}

/// Validates bearer tokens against the Keycloak realm key.
///
/// Claims are cached in Redis keyed by token hash; the realm public key is
/// fetched lazily over HTTP and kept in-process. A failed key fetch is a
/// provider outage, which denies authentication (no unauthenticated
/// fallback) but is reported distinctly.
#[derive(Clone)]
pub struct KeycloakVerifier {
    http: reqwest::Client,
    config: KeycloakConfig,
    cache: TokenClaimCache,
    decoding_key: Arc<RwLock<Option<DecodingKey>>>,
}

impl KeycloakVerifier {
    pub fn new(config: KeycloakConfig, cache: TokenClaimCache) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
            cache,
            decoding_key: Arc::new(RwLock::new(None)),
        }
    }

    /// Validate a bearer token and derive its principal
    pub async fn verify(&self, token: &str) -> Result<Principal, AuthFailure> {
        if let Some(claims) = self.cache.get(token).await {
            match principal_from_claims(&claims, &self.config.client_id) {
                Ok(principal) if principal.expires_at > Utc::now() => return Ok(principal),
                Ok(_) => {
                    self.cache.invalidate(token).await;
                    return Err(AuthFailure::Expired);
                }
                Err(e) => {
                    // Stale cache shape; fall through to a full decode
                    tracing::warn!("Discarding unusable cached claims: {}", e);
                }
            }
        }

        let key = self.decoding_key().await?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.validate_aud = false;

        let claims = match decode::<Value>(token, &key, &validation) {
            Ok(data) => data.claims,
            Err(e) => {
                return Err(match e.kind() {
                    jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthFailure::Expired,
                    _ => AuthFailure::Invalid(e.to_string()),
                })
            }
        };

        let principal = principal_from_claims(&claims, &self.config.client_id)
            .map_err(AuthFailure::Invalid)?;

        self.cache.put(token, &claims, None).await;

        Ok(principal)
    }

    /// Probe the identity provider; used by startup validation
    pub async fn check_provider(&self) -> Result<(), AuthFailure> {
        self.fetch_decoding_key().await.map(|_| ())
    }

    async fn decoding_key(&self) -> Result<DecodingKey, AuthFailure> {
        if let Some(key) = self.decoding_key.read().await.clone() {
            return Ok(key);
        }

        let key = self.fetch_decoding_key().await?;
        *self.decoding_key.write().await = Some(key.clone());
        Ok(key)
    }

    async fn fetch_decoding_key(&self) -> Result<DecodingKey, AuthFailure> {
        let url = self.config.realm_url();

        let info: RealmInfo = self
            .http
            .get(&url)
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map_err(|e| AuthFailure::ProviderUnavailable(e.to_string()))?
            .error_for_status()
            .map_err(|e| AuthFailure::ProviderUnavailable(e.to_string()))?
            .json()
            .await
            .map_err(|e| AuthFailure::ProviderUnavailable(e.to_string()))?;

        let pem = format!(
            "-----BEGIN PUBLIC KEY-----\n{}\n-----END PUBLIC KEY-----\n",
            info.public_key
        );

        DecodingKey::from_rsa_pem(pem.as_bytes()).map_err(|e| {
            AuthFailure::ProviderUnavailable(format!("invalid realm public key: {}", e))
        })
    }
}

/// Derive a principal from decoded claims.
///
/// Role names come from the provider-specific claim path
/// `resource_access.<client_id>.roles`.
pub fn principal_from_claims(claims: &Value, client_id: &str) -> Result<Principal, String> {
    let user_id = claims
        .get("sub")
        .and_then(Value::as_str)
        .ok_or_else(|| "missing sub claim".to_string())?
        .to_string();

    let username = claims
        .get("preferred_username")
        .and_then(Value::as_str)
        .unwrap_or(user_id.as_str())
        .to_string();

    let exp = claims
        .get("exp")
        .and_then(Value::as_i64)
        .ok_or_else(|| "missing exp claim".to_string())?;

    let expires_at: DateTime<Utc> = Utc
        .timestamp_opt(exp, 0)
        .single()
        .ok_or_else(|| format!("invalid exp claim: {}", exp))?;

    let roles: BTreeSet<String> = claims
        .get("resource_access")
        .and_then(|ra| ra.get(client_id))
        .and_then(|client| client.get("roles"))
        .and_then(Value::as_array)
        .map(|values| {
            values
                .iter()
                .filter_map(Value::as_str)
                .map(String::from)
                .collect()
        })
        .unwrap_or_default();

    Ok(Principal {
        user_id,
        username,
        roles,
        expires_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn claims(exp: i64) -> Value {
        json!({
            "sub": "f7a2c1e0-9b1d-4b7f-8a57-2f6d3a1c0e9b",
            "preferred_username": "alice",
            "exp": exp,
            "resource_access": {
                "gateway": {"roles": ["admin", "reader", "admin"]},
                "other-client": {"roles": ["ignored"]}
            }
        })
    }

    #[test]
    fn test_principal_from_claims() {
        let principal = principal_from_claims(&claims(4_102_444_800), "gateway").unwrap();

        assert_eq!(principal.user_id, "f7a2c1e0-9b1d-4b7f-8a57-2f6d3a1c0e9b");
        assert_eq!(principal.username, "alice");
        // Deduplicated, only this client's roles
        assert_eq!(principal.roles_vec(), vec!["admin", "reader"]);
    }

    #[test]
    fn test_principal_missing_roles_is_empty() {
        let raw = json!({"sub": "u", "preferred_username": "u", "exp": 4_102_444_800i64});
        let principal = principal_from_claims(&raw, "gateway").unwrap();
        assert!(principal.roles.is_empty());
    }

    #[test]
    fn test_principal_username_falls_back_to_sub() {
        let raw = json!({"sub": "service-account", "exp": 4_102_444_800i64});
        let principal = principal_from_claims(&raw, "gateway").unwrap();
        assert_eq!(principal.username, "service-account");
    }

    #[test]
    fn test_principal_requires_sub_and_exp() {
        assert!(principal_from_claims(&json!({"exp": 1}), "gateway").is_err());
        assert!(principal_from_claims(&json!({"sub": "u"}), "gateway").is_err());
    }
}
