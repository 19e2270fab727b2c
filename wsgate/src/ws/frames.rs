//! Request, response and broadcast frame types

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use uuid::Uuid;

/// Package type discriminator.
///
/// The set of routable packages is fixed at startup by handler registration;
/// unknown values still decode so the router can answer them with an ERROR
/// response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PkgId(pub i32);

impl PkgId {
    /// Echo test package
    pub const ECHO: PkgId = PkgId(1);
    /// Principal snapshot
    pub const WHOAMI: PkgId = PkgId(2);
    /// Admin broadcast to all live connections
    pub const NOTIFY: PkgId = PkgId(3);
}

impl fmt::Display for PkgId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i32> for PkgId {
    fn from(value: i32) -> Self {
        Self(value)
    }
}

/// Response status codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "i32", try_from = "i32")]
pub enum RspCode {
    Ok = 0,
    Error = 1,
    InvalidData = 2,
    PermissionDenied = 3,
}

impl From<RspCode> for i32 {
    fn from(code: RspCode) -> Self {
        code as i32
    }
}

impl TryFrom<i32> for RspCode {
    type Error = String;

    fn try_from(value: i32) -> Result<Self, String> {
        match value {
            0 => Ok(Self::Ok),
            1 => Ok(Self::Error),
            2 => Ok(Self::InvalidData),
            3 => Ok(Self::PermissionDenied),
            other => Err(format!("unknown status code {}", other)),
        }
    }
}

impl fmt::Display for RspCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Ok => "OK",
            Self::Error => "ERROR",
            Self::InvalidData => "INVALID_DATA",
            Self::PermissionDenied => "PERMISSION_DENIED",
        };
        write!(f, "{}<{}>", name, *self as i32)
    }
}

/// Pagination metadata attached to list responses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meta {
    pub page: u32,
    pub per_page: u32,
    pub total: u32,
    pub pages: u32,
}

/// Inbound request frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestFrame {
    pub pkg_id: PkgId,

    /// Client-generated correlation UUID, echoed on the response
    pub req_id: Uuid,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,

    #[serde(default)]
    pub data: Map<String, Value>,
}

/// Outbound response frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseFrame {
    pub pkg_id: PkgId,
    pub req_id: Uuid,
    pub status_code: RspCode,
    pub data: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Meta>,
}

impl ResponseFrame {
    /// Successful response
    pub fn ok(pkg_id: PkgId, req_id: Uuid, data: Value) -> Self {
        Self {
            pkg_id,
            req_id,
            status_code: RspCode::Ok,
            data: Some(data),
            meta: None,
        }
    }

    /// Error response; `msg` and the stable error code land in `data`
    pub fn err(pkg_id: PkgId, req_id: Uuid, status_code: RspCode, msg: impl Into<String>) -> Self {
        let code = match status_code {
            RspCode::InvalidData => "validation_error",
            RspCode::PermissionDenied => "permission_denied",
            _ => "error",
        };
        Self {
            pkg_id,
            req_id,
            status_code,
            data: Some(serde_json::json!({ "code": code, "msg": msg.into() })),
            meta: None,
        }
    }

    /// Attach pagination metadata
    pub fn with_meta(mut self, meta: Meta) -> Self {
        self.meta = Some(meta);
        self
    }
}

/// Broadcast frame fanned out to every live connection.
///
/// Carries the well-known nil request identifier and no status code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BroadcastFrame {
    pub pkg_id: PkgId,
    pub req_id: Uuid,
    pub data: Value,
}

impl BroadcastFrame {
    pub fn new(pkg_id: PkgId, data: Value) -> Self {
        Self {
            pkg_id,
            req_id: Uuid::nil(),
            data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_rsp_code_round_trip() {
        for code in [
            RspCode::Ok,
            RspCode::Error,
            RspCode::InvalidData,
            RspCode::PermissionDenied,
        ] {
            let value: i32 = code.into();
            assert_eq!(RspCode::try_from(value).unwrap(), code);
        }
        assert!(RspCode::try_from(42).is_err());
    }

    #[test]
    fn test_rsp_code_serializes_as_integer() {
        let json = serde_json::to_value(RspCode::PermissionDenied).unwrap();
        assert_eq!(json, json!(3));
    }

    #[test]
    fn test_request_frame_optional_fields_default() {
        let frame: RequestFrame = serde_json::from_value(json!({
            "pkg_id": 1,
            "req_id": "11111111-1111-1111-1111-111111111111"
        }))
        .unwrap();

        assert_eq!(frame.pkg_id, PkgId::ECHO);
        assert!(frame.method.is_none());
        assert!(frame.data.is_empty());
    }

    #[test]
    fn test_ok_constructor() {
        let req_id = Uuid::new_v4();
        let frame = ResponseFrame::ok(PkgId(7), req_id, json!({"x": 1}));

        assert_eq!(frame.status_code, RspCode::Ok);
        assert_eq!(frame.req_id, req_id);
        assert_eq!(frame.data, Some(json!({"x": 1})));
        assert!(frame.meta.is_none());
    }

    #[test]
    fn test_err_constructor_embeds_code_and_msg() {
        let frame = ResponseFrame::err(
            PkgId(9999),
            Uuid::nil(),
            RspCode::Error,
            "No handler found for pkg_id 9999",
        );

        let data = frame.data.unwrap();
        assert_eq!(data["code"], "error");
        assert!(data["msg"].as_str().unwrap().starts_with("No handler found"));
    }

    #[test]
    fn test_broadcast_frame_uses_nil_req_id() {
        let frame = BroadcastFrame::new(PkgId::NOTIFY, json!({"message": "hi"}));
        assert!(frame.req_id.is_nil());
    }

    #[test]
    fn test_response_serializes_uuid_canonical() {
        let req_id: Uuid = "11111111-1111-1111-1111-111111111111".parse().unwrap();
        let frame = ResponseFrame::ok(PkgId::ECHO, req_id, json!({}));
        let json = serde_json::to_value(&frame).unwrap();

        assert_eq!(json["req_id"], "11111111-1111-1111-1111-111111111111");
        assert_eq!(json["pkg_id"], 1);
        assert_eq!(json["status_code"], 0);
        assert!(json.get("meta").is_none());
    }
}
