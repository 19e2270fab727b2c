//! Live WebSocket connection state

use axum::extract::ws::{CloseFrame, Message};
use chrono::{DateTime, Utc};
use futures::{Sink, SinkExt};
use std::fmt;
use std::hash::{Hash, Hasher};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::codec::WireFormat;
use crate::auth::Principal;
use crate::error::{Error, Result};

/// Unique identifier for a WebSocket connection
#[derive(Clone, Copy, Eq)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    #[must_use]
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }

    /// First 8 characters, the correlation-id fallback
    pub fn short(&self) -> String {
        self.0.to_string()[..8].to_string()
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConnectionId({})", self.0)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl PartialEq for ConnectionId {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Hash for ConnectionId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

type BoxedSink = Box<dyn Sink<Message, Error = axum::Error> + Send + Unpin>;

/// One live WebSocket conversation.
///
/// Writes to the socket go through a per-connection mutex so a broadcast and
/// a direct response can never interleave fragments.
pub struct Connection {
    pub id: ConnectionId,
    pub principal: Principal,
    pub format: WireFormat,
    pub correlation_id: String,
    pub created_at: DateTime<Utc>,
    sink: Mutex<BoxedSink>,
}

impl Connection {
    pub fn new<S>(
        id: ConnectionId,
        principal: Principal,
        format: WireFormat,
        correlation_id: String,
        sink: S,
    ) -> Self
    where
        S: Sink<Message, Error = axum::Error> + Send + Unpin + 'static,
    {
        Self {
            id,
            principal,
            format,
            correlation_id,
            created_at: Utc::now(),
            sink: Mutex::new(Box::new(sink)),
        }
    }

    /// Send a frame; serialized against all other sends on this connection
    pub async fn send(&self, message: Message) -> Result<()> {
        let mut sink = self.sink.lock().await;
        sink.send(message)
            .await
            .map_err(|e| Error::Internal(format!("WebSocket send failed: {}", e)))
    }

    /// Send a close frame; send failures are ignored (peer may be gone)
    pub async fn close(&self, code: u16, reason: &'static str) {
        let frame = CloseFrame {
            code,
            reason: reason.into(),
        };
        if let Err(e) = self.send(Message::Close(Some(frame))).await {
            tracing::debug!(connection_id = %self.id, "Close frame not delivered: {}", e);
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("username", &self.principal.username)
            .field("format", &self.format)
            .field("correlation_id", &self.correlation_id)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use chrono::Duration;
    use futures::channel::mpsc as futures_mpsc;
    use std::collections::BTreeSet;
    use std::sync::Arc;

    pub fn principal(username: &str, roles: &[&str]) -> Principal {
        Principal {
            user_id: format!("id-{}", username),
            username: username.to_string(),
            roles: roles.iter().map(|r| r.to_string()).collect::<BTreeSet<_>>(),
            expires_at: Utc::now() + Duration::hours(1),
        }
    }

    /// Connection writing into an in-memory channel, for registry tests
    pub fn channel_connection(
        username: &str,
        format: WireFormat,
    ) -> (Arc<Connection>, futures_mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = futures_mpsc::unbounded();
        let sink = tx.sink_map_err(|e| axum::Error::new(e));
        let conn = Arc::new(Connection::new(
            ConnectionId::new(),
            principal(username, &[]),
            format,
            "testcorr".to_string(),
            sink,
        ));
        (conn, rx)
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::channel_connection;
    use super::*;
    use futures::StreamExt;

    #[test]
    fn test_connection_id_uniqueness() {
        assert_ne!(ConnectionId::new(), ConnectionId::new());
    }

    #[test]
    fn test_connection_id_short_is_8_chars() {
        assert_eq!(ConnectionId::new().short().len(), 8);
    }

    #[tokio::test]
    async fn test_send_reaches_sink() {
        let (conn, mut rx) = channel_connection("alice", WireFormat::Json);

        conn.send(Message::Text("hello".into())).await.unwrap();

        let received = rx.next().await.unwrap();
        assert_eq!(received, Message::Text("hello".into()));
    }

    #[tokio::test]
    async fn test_close_sends_close_frame() {
        let (conn, mut rx) = channel_connection("alice", WireFormat::Json);

        conn.close(1008, "Message rate limit exceeded").await;

        match rx.next().await.unwrap() {
            Message::Close(Some(frame)) => {
                assert_eq!(frame.code, 1008);
                assert_eq!(frame.reason.as_str(), "Message rate limit exceeded");
            }
            other => panic!("expected close frame, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_concurrent_sends_do_not_interleave() {
        let (conn, rx) = channel_connection("alice", WireFormat::Json);

        let mut tasks = Vec::new();
        for i in 0..16 {
            let conn = conn.clone();
            tasks.push(tokio::spawn(async move {
                conn.send(Message::Text(format!("m{}", i).into())).await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        drop(conn);
        let frames: Vec<Message> = rx.collect().await;
        assert_eq!(frames.len(), 16);
    }
}
