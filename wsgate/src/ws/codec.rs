//! Format-negotiated encoding and decoding of wire frames
//!
//! Two codecs implement the same small interface: UTF-8 JSON text frames and
//! a protobuf binary envelope. The envelope nests the free-form payload as a
//! JSON string, keeping the outer shape tight while payloads stay schema-free.

use axum::extract::ws::Message;
use prost::Message as ProstMessage;
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

use super::frames::{BroadcastFrame, Meta, PkgId, RequestFrame, ResponseFrame, RspCode};
use crate::error::{Error, Result};

/// Negotiated wire format for one connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireFormat {
    Json,
    Protobuf,
}

impl WireFormat {
    /// Resolve the `format` query parameter; invalid values coerce to JSON
    /// with a warning.
    pub fn negotiate(raw: Option<&str>) -> Self {
        match raw.map(|s| s.to_ascii_lowercase()) {
            None => Self::Json,
            Some(s) if s == "json" => Self::Json,
            Some(s) if s == "protobuf" => Self::Protobuf,
            Some(other) => {
                tracing::warn!("Invalid format '{}' specified, defaulting to json", other);
                Self::Json
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Protobuf => "protobuf",
        }
    }

    /// Codec instance for this format
    pub fn codec(&self) -> &'static dyn FrameCodec {
        match self {
            Self::Json => &JsonCodec,
            Self::Protobuf => &BinaryCodec,
        }
    }
}

/// Frame decoding failure; closes the connection with code 1003
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid JSON frame: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid binary frame: {0}")]
    Binary(#[from] prost::DecodeError),

    #[error("invalid field: {0}")]
    Field(String),

    #[error("frame type does not match negotiated format")]
    UnsupportedFrame,
}

/// Encode/decode interface implemented once per wire format
pub trait FrameCodec: Send + Sync {
    fn decode_request(&self, msg: &Message) -> std::result::Result<RequestFrame, DecodeError>;

    fn decode_response(&self, msg: &Message) -> std::result::Result<ResponseFrame, DecodeError>;

    fn encode_response(&self, frame: &ResponseFrame) -> Result<Message>;

    fn encode_broadcast(&self, frame: &BroadcastFrame) -> Result<Message>;
}

/// UTF-8 JSON text frames
pub struct JsonCodec;

impl FrameCodec for JsonCodec {
    fn decode_request(&self, msg: &Message) -> std::result::Result<RequestFrame, DecodeError> {
        match msg {
            Message::Text(text) => Ok(serde_json::from_str(text.as_str())?),
            _ => Err(DecodeError::UnsupportedFrame),
        }
    }

    fn decode_response(&self, msg: &Message) -> std::result::Result<ResponseFrame, DecodeError> {
        match msg {
            Message::Text(text) => Ok(serde_json::from_str(text.as_str())?),
            _ => Err(DecodeError::UnsupportedFrame),
        }
    }

    fn encode_response(&self, frame: &ResponseFrame) -> Result<Message> {
        let text = serde_json::to_string(frame)
            .map_err(|e| Error::Internal(format!("Failed to serialize response: {}", e)))?;
        Ok(Message::Text(text.into()))
    }

    fn encode_broadcast(&self, frame: &BroadcastFrame) -> Result<Message> {
        let text = serde_json::to_string(frame)
            .map_err(|e| Error::Internal(format!("Failed to serialize broadcast: {}", e)))?;
        Ok(Message::Text(text.into()))
    }
}

/// Protobuf binary envelopes

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RequestEnvelope {
    #[prost(int32, tag = "1")]
    pub pkg_id: i32,
    #[prost(string, tag = "2")]
    pub req_id: String,
    #[prost(string, tag = "3")]
    pub method: String,
    #[prost(string, tag = "4")]
    pub data_json: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ResponseEnvelope {
    #[prost(int32, tag = "1")]
    pub pkg_id: i32,
    #[prost(string, tag = "2")]
    pub req_id: String,
    #[prost(int32, tag = "3")]
    pub status_code: i32,
    #[prost(string, tag = "4")]
    pub data_json: String,
    #[prost(message, optional, tag = "5")]
    pub meta: Option<MetaEnvelope>,
}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct MetaEnvelope {
    #[prost(int32, tag = "1")]
    pub page: i32,
    #[prost(int32, tag = "2")]
    pub per_page: i32,
    #[prost(int32, tag = "3")]
    pub total: i32,
    #[prost(int32, tag = "4")]
    pub pages: i32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct BroadcastEnvelope {
    #[prost(int32, tag = "1")]
    pub pkg_id: i32,
    #[prost(string, tag = "2")]
    pub req_id: String,
    #[prost(string, tag = "3")]
    pub data_json: String,
}

pub struct BinaryCodec;

impl FrameCodec for BinaryCodec {
    fn decode_request(&self, msg: &Message) -> std::result::Result<RequestFrame, DecodeError> {
        let bytes = match msg {
            Message::Binary(bytes) => bytes.as_ref(),
            _ => return Err(DecodeError::UnsupportedFrame),
        };

        let envelope = RequestEnvelope::decode(bytes)?;

        let req_id: Uuid = envelope
            .req_id
            .parse()
            .map_err(|e| DecodeError::Field(format!("req_id: {}", e)))?;

        let method = if envelope.method.is_empty() {
            None
        } else {
            Some(envelope.method)
        };

        Ok(RequestFrame {
            pkg_id: PkgId(envelope.pkg_id),
            req_id,
            method,
            data: parse_data_object(&envelope.data_json)?,
        })
    }

    fn decode_response(&self, msg: &Message) -> std::result::Result<ResponseFrame, DecodeError> {
        let bytes = match msg {
            Message::Binary(bytes) => bytes.as_ref(),
            _ => return Err(DecodeError::UnsupportedFrame),
        };

        let envelope = ResponseEnvelope::decode(bytes)?;

        let req_id: Uuid = envelope
            .req_id
            .parse()
            .map_err(|e| DecodeError::Field(format!("req_id: {}", e)))?;

        let status_code =
            RspCode::try_from(envelope.status_code).map_err(DecodeError::Field)?;

        let data = if envelope.data_json.is_empty() {
            None
        } else {
            Some(serde_json::from_str(&envelope.data_json)?)
        };

        Ok(ResponseFrame {
            pkg_id: PkgId(envelope.pkg_id),
            req_id,
            status_code,
            data,
            meta: envelope.meta.map(|m| Meta {
                page: m.page as u32,
                per_page: m.per_page as u32,
                total: m.total as u32,
                pages: m.pages as u32,
            }),
        })
    }

    fn encode_response(&self, frame: &ResponseFrame) -> Result<Message> {
        let data_json = match &frame.data {
            Some(value) => serde_json::to_string(value)
                .map_err(|e| Error::Internal(format!("Failed to serialize response: {}", e)))?,
            None => String::new(),
        };

        let envelope = ResponseEnvelope {
            pkg_id: frame.pkg_id.0,
            req_id: frame.req_id.to_string(),
            status_code: frame.status_code.into(),
            data_json,
            meta: frame.meta.map(|m| MetaEnvelope {
                page: m.page as i32,
                per_page: m.per_page as i32,
                total: m.total as i32,
                pages: m.pages as i32,
            }),
        };

        Ok(Message::Binary(envelope.encode_to_vec().into()))
    }

    fn encode_broadcast(&self, frame: &BroadcastFrame) -> Result<Message> {
        let data_json = serde_json::to_string(&frame.data)
            .map_err(|e| Error::Internal(format!("Failed to serialize broadcast: {}", e)))?;

        let envelope = BroadcastEnvelope {
            pkg_id: frame.pkg_id.0,
            req_id: frame.req_id.to_string(),
            data_json,
        };

        Ok(Message::Binary(envelope.encode_to_vec().into()))
    }
}

fn parse_data_object(raw: &str) -> std::result::Result<Map<String, Value>, DecodeError> {
    if raw.is_empty() {
        return Ok(Map::new());
    }
    match serde_json::from_str::<Value>(raw)? {
        Value::Object(map) => Ok(map),
        other => Err(DecodeError::Field(format!(
            "data must be an object, got {}",
            match other {
                Value::Null => "null",
                Value::Bool(_) => "a boolean",
                Value::Number(_) => "a number",
                Value::String(_) => "a string",
                Value::Array(_) => "an array",
                Value::Object(_) => unreachable!(),
            }
        ))),
    }
}
