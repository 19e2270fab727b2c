//! Package router: write-once handler registry with role gates and payload
//! schema validation

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use super::frames::{PkgId, RequestFrame, ResponseFrame, RspCode};
use super::registry::ConnectionRegistry;
use crate::auth::Principal;
use crate::error::{Error, Result};

/// Per-dispatch context handed to handlers
pub struct HandlerContext {
    pub principal: Principal,
    pub registry: Arc<ConnectionRegistry>,
}

/// A registered package handler.
///
/// Returning `Err` is the unhandled-failure path: the dispatch loop closes
/// the connection and records an audit entry; no partial response is sent.
#[async_trait]
pub trait PackageHandler: Send + Sync {
    async fn handle(&self, ctx: &HandlerContext, request: RequestFrame) -> Result<ResponseFrame>;
}

struct Registration {
    handler: Arc<dyn PackageHandler>,
    schema: Option<jsonschema::Validator>,
    required_roles: Vec<String>,
}

/// Registry of handlers keyed by package type.
///
/// Populated once at startup, then frozen behind `Arc`; reads need no
/// synchronization.
#[derive(Default)]
pub struct PackageRouter {
    handlers: HashMap<PkgId, Registration>,
}

impl PackageRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for a package type.
    ///
    /// A second registration for the same package is a programmer error and
    /// fails loudly, leaving the first registration in place.
    pub fn register(
        &mut self,
        pkg_id: PkgId,
        handler: Arc<dyn PackageHandler>,
        schema: Option<Value>,
        required_roles: &[&str],
    ) -> Result<()> {
        if self.handlers.contains_key(&pkg_id) {
            return Err(Error::Internal(format!(
                "Handler already registered for pkg_id {}",
                pkg_id
            )));
        }

        let schema = match schema {
            Some(raw) => Some(jsonschema::validator_for(&raw).map_err(|e| {
                Error::Internal(format!("Invalid payload schema for pkg_id {}: {}", pkg_id, e))
            })?),
            None => None,
        };

        self.handlers.insert(
            pkg_id,
            Registration {
                handler,
                schema,
                required_roles: required_roles.iter().map(|r| r.to_string()).collect(),
            },
        );

        tracing::info!("Registered handler for pkg_id {}", pkg_id);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Route a request to its handler.
    ///
    /// Unknown package types, failed role gates and schema violations all
    /// produce error responses without invoking the handler; handler errors
    /// propagate to the caller.
    pub async fn dispatch(
        &self,
        ctx: &HandlerContext,
        request: RequestFrame,
    ) -> Result<ResponseFrame> {
        let Some(registration) = self.handlers.get(&request.pkg_id) else {
            return Ok(ResponseFrame::err(
                request.pkg_id,
                request.req_id,
                RspCode::Error,
                format!("No handler found for pkg_id {}", request.pkg_id),
            ));
        };

        // Requires ALL listed roles; an empty list means any authenticated
        // principal.
        if !registration.required_roles.is_empty()
            && !ctx.principal.has_all_roles(&registration.required_roles)
        {
            return Ok(ResponseFrame::err(
                request.pkg_id,
                request.req_id,
                RspCode::PermissionDenied,
                format!("Missing required role(s) for pkg_id {}", request.pkg_id),
            ));
        }

        if let Some(validator) = &registration.schema {
            let payload = Value::Object(request.data.clone());
            if let Err(violation) = validator.validate(&payload) {
                return Ok(ResponseFrame::err(
                    request.pkg_id,
                    request.req_id,
                    RspCode::InvalidData,
                    violation.to_string(),
                ));
            }
        }

        registration.handler.handle(ctx, request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::codec::WireFormat;
    use crate::ws::connection::test_support::principal;
    use crate::ws::registry::ConnectionRegistry;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use uuid::Uuid;

    struct OkHandler {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl PackageHandler for OkHandler {
        async fn handle(
            &self,
            _ctx: &HandlerContext,
            request: RequestFrame,
        ) -> Result<ResponseFrame> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(ResponseFrame::ok(
                request.pkg_id,
                request.req_id,
                json!({"handled": true}),
            ))
        }
    }

    struct FailingHandler;

    #[async_trait]
    impl PackageHandler for FailingHandler {
        async fn handle(
            &self,
            _ctx: &HandlerContext,
            _request: RequestFrame,
        ) -> Result<ResponseFrame> {
            Err(Error::Internal("handler blew up".into()))
        }
    }

    fn ctx(roles: &[&str]) -> HandlerContext {
        HandlerContext {
            principal: principal("alice", roles),
            registry: Arc::new(ConnectionRegistry::new(Duration::from_secs(5))),
        }
    }

    fn request(pkg_id: PkgId, data: Value) -> RequestFrame {
        RequestFrame {
            pkg_id,
            req_id: Uuid::new_v4(),
            method: None,
            data: data.as_object().cloned().unwrap_or_default(),
        }
    }

    fn router_with(
        pkg_id: PkgId,
        schema: Option<Value>,
        roles: &[&str],
    ) -> (PackageRouter, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut router = PackageRouter::new();
        router
            .register(pkg_id, Arc::new(OkHandler { calls: calls.clone() }), schema, roles)
            .unwrap();
        (router, calls)
    }

    #[test]
    fn test_duplicate_registration_fails_and_keeps_first() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut router = PackageRouter::new();
        router
            .register(PkgId(1), Arc::new(OkHandler { calls: calls.clone() }), None, &[])
            .unwrap();

        let second = router.register(PkgId(1), Arc::new(FailingHandler), None, &[]);
        assert!(second.is_err());
        assert_eq!(router.len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_package_returns_error_response() {
        let (router, _) = router_with(PkgId(1), None, &[]);

        let response = router
            .dispatch(&ctx(&[]), request(PkgId(9999), json!({})))
            .await
            .unwrap();

        assert_eq!(response.status_code, RspCode::Error);
        assert_eq!(response.pkg_id, PkgId(9999));
        let data = response.data.unwrap();
        assert!(data["msg"]
            .as_str()
            .unwrap()
            .starts_with("No handler found"));
    }

    #[tokio::test]
    async fn test_role_gate_denies_without_invoking_handler() {
        let (router, calls) = router_with(PkgId(1), None, &["admin"]);

        let response = router
            .dispatch(&ctx(&["reader"]), request(PkgId(1), json!({})))
            .await
            .unwrap();

        assert_eq!(response.status_code, RspCode::PermissionDenied);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_role_gate_requires_all_roles() {
        let (router, calls) = router_with(PkgId(1), None, &["admin", "writer"]);

        let denied = router
            .dispatch(&ctx(&["admin"]), request(PkgId(1), json!({})))
            .await
            .unwrap();
        assert_eq!(denied.status_code, RspCode::PermissionDenied);

        let allowed = router
            .dispatch(&ctx(&["admin", "writer"]), request(PkgId(1), json!({})))
            .await
            .unwrap();
        assert_eq!(allowed.status_code, RspCode::Ok);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_schema_violation_returns_invalid_data() {
        let schema = json!({
            "type": "object",
            "properties": {"message": {"type": "string"}},
            "required": ["message"]
        });
        let (router, calls) = router_with(PkgId(3), Some(schema), &[]);

        let invalid = router
            .dispatch(&ctx(&[]), request(PkgId(3), json!({})))
            .await
            .unwrap();
        assert_eq!(invalid.status_code, RspCode::InvalidData);
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let valid = router
            .dispatch(&ctx(&[]), request(PkgId(3), json!({"message": "hi"})))
            .await
            .unwrap();
        assert_eq!(valid.status_code, RspCode::Ok);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_handler_error_propagates() {
        let mut router = PackageRouter::new();
        router
            .register(PkgId(1), Arc::new(FailingHandler), None, &[])
            .unwrap();

        let result = router.dispatch(&ctx(&[]), request(PkgId(1), json!({}))).await;
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_schema_is_a_registration_error() {
        let mut router = PackageRouter::new();
        let result = router.register(
            PkgId(1),
            Arc::new(FailingHandler),
            Some(json!({"type": "no-such-type"})),
            &[],
        );
        assert!(result.is_err());
    }
}
