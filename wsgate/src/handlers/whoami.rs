//! Principal snapshot handler

use async_trait::async_trait;
use serde_json::json;

use crate::error::Result;
use crate::ws::frames::{RequestFrame, ResponseFrame};
use crate::ws::router::{HandlerContext, PackageHandler};

pub struct WhoamiHandler;

#[async_trait]
impl PackageHandler for WhoamiHandler {
    async fn handle(&self, ctx: &HandlerContext, request: RequestFrame) -> Result<ResponseFrame> {
        let principal = &ctx.principal;

        Ok(ResponseFrame::ok(
            request.pkg_id,
            request.req_id,
            json!({
                "user_id": principal.user_id,
                "username": principal.username,
                "roles": principal.roles_vec(),
                "token_expires_at": principal.expires_at.to_rfc3339(),
            }),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::connection::test_support::principal;
    use crate::ws::frames::PkgId;
    use crate::ws::registry::ConnectionRegistry;
    use std::sync::Arc;
    use std::time::Duration;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_reports_principal_fields() {
        let ctx = HandlerContext {
            principal: principal("alice", &["admin", "reader"]),
            registry: Arc::new(ConnectionRegistry::new(Duration::from_secs(5))),
        };
        let request = RequestFrame {
            pkg_id: PkgId::WHOAMI,
            req_id: Uuid::new_v4(),
            method: None,
            data: Default::default(),
        };

        let response = WhoamiHandler.handle(&ctx, request).await.unwrap();
        let data = response.data.unwrap();

        assert_eq!(data["username"], "alice");
        assert_eq!(data["roles"], serde_json::json!(["admin", "reader"]));
    }
}
