//! Echo handler: round-trip check for clients and tests

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::ws::frames::{RequestFrame, ResponseFrame};
use crate::ws::router::{HandlerContext, PackageHandler};

pub struct EchoHandler;

#[async_trait]
impl PackageHandler for EchoHandler {
    async fn handle(&self, _ctx: &HandlerContext, request: RequestFrame) -> Result<ResponseFrame> {
        let mut data = request.data.clone();
        data.insert(
            "message".to_string(),
            Value::String("test response".to_string()),
        );

        Ok(ResponseFrame::ok(
            request.pkg_id,
            request.req_id,
            Value::Object(data),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::connection::test_support::principal;
    use crate::ws::frames::{PkgId, RspCode};
    use crate::ws::registry::ConnectionRegistry;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;
    use uuid::Uuid;

    fn ctx() -> HandlerContext {
        HandlerContext {
            principal: principal("alice", &[]),
            registry: Arc::new(ConnectionRegistry::new(Duration::from_secs(5))),
        }
    }

    #[tokio::test]
    async fn test_empty_payload_yields_message_only() {
        let req_id: Uuid = "11111111-1111-1111-1111-111111111111".parse().unwrap();
        let request = RequestFrame {
            pkg_id: PkgId::ECHO,
            req_id,
            method: None,
            data: Default::default(),
        };

        let response = EchoHandler.handle(&ctx(), request).await.unwrap();

        assert_eq!(response.pkg_id, PkgId::ECHO);
        assert_eq!(response.req_id, req_id);
        assert_eq!(response.status_code, RspCode::Ok);
        assert_eq!(response.data, Some(json!({"message": "test response"})));
    }

    #[tokio::test]
    async fn test_payload_fields_are_echoed() {
        let request = RequestFrame {
            pkg_id: PkgId::ECHO,
            req_id: Uuid::new_v4(),
            method: None,
            data: json!({"k": "v"}).as_object().cloned().unwrap(),
        };

        let response = EchoHandler.handle(&ctx(), request).await.unwrap();
        let data = response.data.unwrap();
        assert_eq!(data["k"], "v");
        assert_eq!(data["message"], "test response");
    }
}
