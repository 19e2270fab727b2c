//! Redis-backed token-claim cache
//!
//! Keys are the SHA-256 of the token bytes, never the token itself. TTL
//! follows token expiry with a 30-second buffer. Every operation fails open:
//! a store outage means the verifier simply calls the provider.

use chrono::Utc;
use deadpool_redis::Pool;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::ops::DerefMut;
use std::time::Duration;

use crate::metrics::{TOKEN_CACHE_HITS_TOTAL, TOKEN_CACHE_MISSES_TOTAL};

/// Expire cached claims this long before the token itself expires
const TOKEN_CACHE_BUFFER_SECONDS: i64 = 30;

#[derive(Clone)]
pub struct TokenClaimCache {
    pool: Pool,
}

impl TokenClaimCache {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    fn cache_key(token: &str) -> String {
        let hash = Sha256::digest(token.as_bytes());
        format!("token:claims:{}", hex::encode(hash))
    }

    /// Fetch cached claims; `None` on miss or any store error
    pub async fn get(&self, token: &str) -> Option<Value> {
        let key = Self::cache_key(token);

        let mut conn = match self.pool.get().await {
            Ok(conn) => conn,
            Err(e) => {
                tracing::warn!("Token cache unavailable: {}", e);
                return None;
            }
        };

        let cached: Option<String> = match redis::cmd("GET")
            .arg(&key)
            .query_async(conn.deref_mut())
            .await
        {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("Token cache read failed: {}", e);
                return None;
            }
        };

        match cached {
            Some(raw) => match serde_json::from_str(&raw) {
                Ok(claims) => {
                    metrics::counter!(TOKEN_CACHE_HITS_TOTAL).increment(1);
                    tracing::debug!("Token claims cache hit: {}...", &key[13..21]);
                    Some(claims)
                }
                Err(e) => {
                    tracing::warn!("Error decoding cached token claims: {}", e);
                    None
                }
            },
            None => {
                metrics::counter!(TOKEN_CACHE_MISSES_TOTAL).increment(1);
                None
            }
        }
    }

    /// Cache claims with a TTL derived from the `exp` claim (minus buffer).
    /// A zero or negative TTL skips caching.
    pub async fn put(&self, token: &str, claims: &Value, ttl: Option<Duration>) {
        let ttl_secs = match ttl {
            Some(ttl) => ttl.as_secs() as i64,
            None => match claims.get("exp").and_then(Value::as_i64) {
                Some(exp) => exp - Utc::now().timestamp() - TOKEN_CACHE_BUFFER_SECONDS,
                None => return,
            },
        };

        if ttl_secs <= 0 {
            return;
        }

        let raw = match serde_json::to_string(claims) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!("Error serializing token claims: {}", e);
                return;
            }
        };

        let key = Self::cache_key(token);

        let mut conn = match self.pool.get().await {
            Ok(conn) => conn,
            Err(e) => {
                tracing::warn!("Token cache unavailable: {}", e);
                return;
            }
        };

        if let Err(e) = redis::cmd("SETEX")
            .arg(&key)
            .arg(ttl_secs)
            .arg(raw)
            .query_async::<()>(conn.deref_mut())
            .await
        {
            tracing::warn!("Token cache write failed: {}", e);
        }
    }

    /// Drop cached claims for a token (logout path)
    pub async fn invalidate(&self, token: &str) {
        let key = Self::cache_key(token);

        let mut conn = match self.pool.get().await {
            Ok(conn) => conn,
            Err(e) => {
                tracing::warn!("Token cache unavailable: {}", e);
                return;
            }
        };

        if let Err(e) = redis::cmd("DEL")
            .arg(&key)
            .query_async::<()>(conn.deref_mut())
            .await
        {
            tracing::warn!("Token cache invalidation failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_key_is_sha256_of_token() {
        // sha256("abc")
        let key = TokenClaimCache::cache_key("abc");
        assert_eq!(
            key,
            "token:claims:ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_cache_key_never_contains_token() {
        let token = "eyJhbGciOiJSUzI1NiJ9.secret-token-body.sig";
        let key = TokenClaimCache::cache_key(token);
        assert!(!key.contains("secret"));
        assert!(key.starts_with("token:claims:"));
        assert_eq!(key.len(), "token:claims:".len() + 64);
    }
}
