//! Admission pipeline: ordered middleware with dependency validation
//!
//! Stages are declared in LOGICAL execution order (request to response).
//! Axum applies the innermost layer last, so [`MiddlewarePipeline::apply`]
//! attaches them in reverse; callers only ever think in execution order.
//!
//! A dependency map is validated at startup: rate limiting and auditing
//! consume the principal, so they must execute after authentication.

pub mod audit;
pub mod auth;
pub mod correlation;
pub mod metrics;
pub mod rate_limit;
pub mod request_size;
pub mod security_headers;
pub mod trusted_host;

use axum::{middleware::from_fn, middleware::from_fn_with_state, Router};

use crate::error::{Error, Result};
use crate::state::AppState;

pub use correlation::CorrelationId;

/// One stage of the admission pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    TrustedHost,
    CorrelationId,
    RequestSpan,
    Authentication,
    RateLimit,
    RequestSizeLimit,
    Audit,
    SecurityHeaders,
    Metrics,
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Self::TrustedHost => "TrustedHost",
            Self::CorrelationId => "CorrelationId",
            Self::RequestSpan => "RequestSpan",
            Self::Authentication => "Authentication",
            Self::RateLimit => "RateLimit",
            Self::RequestSizeLimit => "RequestSizeLimit",
            Self::Audit => "Audit",
            Self::SecurityHeaders => "SecurityHeaders",
            Self::Metrics => "Metrics",
        }
    }
}

/// (stage, stage it requires to have executed earlier)
const DEPENDENCIES: &[(Stage, Stage)] = &[
    (Stage::RequestSpan, Stage::CorrelationId),
    (Stage::RateLimit, Stage::Authentication),
    (Stage::Audit, Stage::Authentication),
];

pub struct MiddlewarePipeline {
    stages: Vec<Stage>,
}

impl MiddlewarePipeline {
    /// The standard pipeline in logical execution order
    pub fn standard() -> Self {
        Self {
            stages: vec![
                Stage::TrustedHost,
                Stage::CorrelationId,
                Stage::RequestSpan,
                Stage::Authentication,
                Stage::RateLimit,
                Stage::RequestSizeLimit,
                Stage::Audit,
                Stage::SecurityHeaders,
                Stage::Metrics,
            ],
        }
    }

    #[cfg(test)]
    fn with_stages(stages: Vec<Stage>) -> Self {
        Self { stages }
    }

    /// Verify that every stage's dependencies execute before it.
    ///
    /// Called at startup; a violation refuses to launch.
    pub fn validate_dependencies(&self) -> Result<()> {
        let position = |stage: Stage| self.stages.iter().position(|s| *s == stage);

        for (stage, required) in DEPENDENCIES {
            let Some(stage_pos) = position(*stage) else {
                continue;
            };

            let Some(required_pos) = position(*required) else {
                return Err(Error::Internal(format!(
                    "Middleware dependency violation: {} requires {} which is not in the pipeline",
                    stage.name(),
                    required.name()
                )));
            };

            if required_pos >= stage_pos {
                return Err(Error::Internal(format!(
                    "Middleware dependency violation: {} must execute before {}",
                    required.name(),
                    stage.name()
                )));
            }
        }

        tracing::info!("Middleware pipeline validated: {}", self.visualize());
        Ok(())
    }

    /// Execution order as a readable arrow chain, for logs
    pub fn visualize(&self) -> String {
        self.stages
            .iter()
            .map(|s| s.name())
            .collect::<Vec<_>>()
            .join(" -> ")
    }

    /// Attach all stages to the router (reversed so execution matches the
    /// declared order).
    pub fn apply(&self, mut router: Router<AppState>, state: AppState) -> Router<AppState> {
        for stage in self.stages.iter().rev() {
            router = match stage {
                Stage::TrustedHost => router.layer(from_fn_with_state(
                    state.clone(),
                    trusted_host::trusted_host_middleware,
                )),
                Stage::CorrelationId => router.layer(from_fn(correlation::correlation_middleware)),
                Stage::RequestSpan => router.layer(from_fn(correlation::request_span_middleware)),
                Stage::Authentication => {
                    router.layer(from_fn_with_state(state.clone(), auth::auth_middleware))
                }
                Stage::RateLimit => router.layer(from_fn_with_state(
                    state.clone(),
                    rate_limit::rate_limit_middleware,
                )),
                Stage::RequestSizeLimit => router.layer(from_fn_with_state(
                    state.clone(),
                    request_size::request_size_middleware,
                )),
                Stage::Audit => {
                    router.layer(from_fn_with_state(state.clone(), audit::audit_middleware))
                }
                Stage::SecurityHeaders => {
                    router.layer(from_fn(security_headers::security_headers_middleware))
                }
                Stage::Metrics => router.layer(from_fn(metrics::metrics_middleware)),
            };
        }
        router
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_pipeline_is_valid() {
        assert!(MiddlewarePipeline::standard().validate_dependencies().is_ok());
    }

    #[test]
    fn test_rate_limit_before_auth_is_rejected() {
        let pipeline = MiddlewarePipeline::with_stages(vec![
            Stage::RateLimit,
            Stage::Authentication,
        ]);
        assert!(pipeline.validate_dependencies().is_err());
    }

    #[test]
    fn test_audit_without_auth_is_rejected() {
        let pipeline = MiddlewarePipeline::with_stages(vec![Stage::Audit]);
        assert!(pipeline.validate_dependencies().is_err());
    }

    #[test]
    fn test_stage_without_dependencies_is_fine_alone() {
        let pipeline = MiddlewarePipeline::with_stages(vec![
            Stage::SecurityHeaders,
            Stage::Metrics,
        ]);
        assert!(pipeline.validate_dependencies().is_ok());
    }

    #[test]
    fn test_visualize_follows_declared_order() {
        let rendered = MiddlewarePipeline::standard().visualize();
        assert!(rendered.starts_with("TrustedHost -> CorrelationId"));
        assert!(rendered.ends_with("SecurityHeaders -> Metrics"));
        let auth_pos = rendered.find("Authentication").unwrap();
        assert!(auth_pos < rendered.find("RateLimit").unwrap());
        assert!(auth_pos < rendered.find("Audit").unwrap());
    }
}
