//! Fail-fast startup validation
//!
//! Every check must pass before the listener opens; a failure exits the
//! process with a nonzero code.

use crate::cache;
use crate::config::Environment;
use crate::error::{Error, Result};
use crate::state::AppState;

pub async fn validate(state: &AppState) -> Result<()> {
    let config = state.config();

    let required = [
        ("DB_USER", config.database.user.as_str()),
        ("DB_HOST", config.database.host.as_str()),
        ("DB_NAME", config.database.name.as_str()),
        ("REDIS_IP", config.redis.ip.as_str()),
        ("KEYCLOAK_REALM", config.keycloak.realm.as_str()),
        ("KEYCLOAK_CLIENT_ID", config.keycloak.client_id.as_str()),
        ("KEYCLOAK_BASE_URL", config.keycloak.base_url.as_str()),
    ];

    for (name, value) in required {
        if value.trim().is_empty() {
            return Err(Error::Internal(format!(
                "Startup validation failed: {} must be set and non-empty",
                name
            )));
        }
    }

    if config.service.environment == Environment::Production && config.service.debug_auth_bypass {
        return Err(Error::Internal(
            "Startup validation failed: debug_auth_bypass must be disabled in production".into(),
        ));
    }

    sqlx::query("SELECT 1")
        .fetch_one(state.db())
        .await
        .map_err(|e| Error::Internal(format!("Startup validation failed: database: {}", e)))?;

    cache::ping(&state.redis().main)
        .await
        .map_err(|e| Error::Internal(format!("Startup validation failed: redis (main): {}", e)))?;
    cache::ping(&state.redis().auth)
        .await
        .map_err(|e| Error::Internal(format!("Startup validation failed: redis (auth): {}", e)))?;

    state.verifier().check_provider().await.map_err(|e| {
        Error::Internal(format!("Startup validation failed: identity provider: {}", e))
    })?;

    tracing::info!("Startup validation passed");
    Ok(())
}
