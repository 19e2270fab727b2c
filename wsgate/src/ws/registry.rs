//! Live connection registry and broadcast fan-out

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;

use super::connection::{Connection, ConnectionId};
use super::frames::BroadcastFrame;

/// Session key for a username (`session:<username>`)
pub fn session_key(username: &str) -> String {
    format!("session:{}", username)
}

#[derive(Default)]
struct Inner {
    connections: HashMap<ConnectionId, Arc<Connection>>,
    /// Most recent connection per session key
    sessions: HashMap<String, ConnectionId>,
}

/// Process-wide set of live connections.
///
/// Guarded by a single mutex; broadcast copies a snapshot under the lock and
/// releases it before any send.
pub struct ConnectionRegistry {
    inner: Mutex<Inner>,
    send_timeout: Duration,
}

impl ConnectionRegistry {
    pub fn new(send_timeout: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            send_timeout,
        }
    }

    pub fn add(&self, conn: Arc<Connection>) {
        let mut inner = self.inner.lock().expect("connection registry poisoned");
        inner
            .sessions
            .insert(session_key(&conn.principal.username), conn.id);
        inner.connections.insert(conn.id, conn);
    }

    /// Remove a connection; removing an unknown connection is a no-op
    pub fn remove(&self, conn: &Connection) {
        let mut inner = self.inner.lock().expect("connection registry poisoned");
        inner.connections.remove(&conn.id);

        let key = session_key(&conn.principal.username);
        if inner.sessions.get(&key) == Some(&conn.id) {
            inner.sessions.remove(&key);
        }
    }

    pub fn count(&self) -> usize {
        self.inner
            .lock()
            .expect("connection registry poisoned")
            .connections
            .len()
    }

    /// Most recent connection for a session key
    pub fn session(&self, username: &str) -> Option<Arc<Connection>> {
        let inner = self.inner.lock().expect("connection registry poisoned");
        let id = inner.sessions.get(&session_key(username))?;
        inner.connections.get(id).cloned()
    }

    /// Snapshot of all live connections
    pub fn snapshot(&self) -> Vec<Arc<Connection>> {
        self.inner
            .lock()
            .expect("connection registry poisoned")
            .connections
            .values()
            .cloned()
            .collect()
    }

    /// Shortest remaining token lifetime among live connections; drives the
    /// session-sync interval.
    pub fn min_token_remaining(&self) -> Option<Duration> {
        let now = Utc::now();
        self.snapshot()
            .iter()
            .map(|conn| {
                (conn.principal.expires_at - now)
                    .to_std()
                    .unwrap_or(Duration::ZERO)
            })
            .min()
    }

    /// Fan a frame out to all current connections.
    ///
    /// Sends run concurrently, each encoded in the receiver's negotiated
    /// format and bounded by the send timeout. Failed or timed-out
    /// connections are closed and removed. Returns the delivered count.
    pub async fn broadcast(&self, frame: BroadcastFrame) -> usize {
        let snapshot = self.snapshot();
        let send_timeout = self.send_timeout;

        let tasks = snapshot.into_iter().map(|conn| {
            let frame = frame.clone();
            tokio::spawn(async move {
                let message = match conn.format.codec().encode_broadcast(&frame) {
                    Ok(message) => message,
                    Err(e) => {
                        tracing::error!(connection_id = %conn.id, "Broadcast encode failed: {}", e);
                        return Err(conn);
                    }
                };

                match tokio::time::timeout(send_timeout, conn.send(message)).await {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(e)) => {
                        tracing::warn!(connection_id = %conn.id, "Broadcast send failed: {}", e);
                        Err(conn)
                    }
                    Err(_) => {
                        tracing::warn!(connection_id = %conn.id, "Broadcast send timed out");
                        Err(conn)
                    }
                }
            })
        });

        let mut sent = 0;
        let mut failed = Vec::new();

        for result in join_all(tasks).await {
            match result {
                Ok(Ok(())) => sent += 1,
                Ok(Err(conn)) => failed.push(conn),
                Err(e) => tracing::error!("Broadcast task panicked: {}", e),
            }
        }

        for conn in failed {
            conn.close(1011, "Broadcast delivery failed").await;
            self.remove(&conn);
        }

        tracing::debug!(sent, "Broadcast completed");
        sent
    }

    /// Close every live connection; used at shutdown (code 1001)
    pub async fn close_all(&self, code: u16, reason: &'static str) {
        let snapshot = self.snapshot();
        for conn in snapshot {
            conn.close(code, reason).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::codec::WireFormat;
    use crate::ws::connection::test_support::channel_connection;
    use crate::ws::frames::PkgId;
    use axum::extract::ws::Message;
    use futures::StreamExt;
    use serde_json::json;

    fn registry() -> ConnectionRegistry {
        ConnectionRegistry::new(Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_add_remove_and_count() {
        let registry = registry();
        let (a, _rx_a) = channel_connection("alice", WireFormat::Json);
        let (b, _rx_b) = channel_connection("bob", WireFormat::Json);

        registry.add(a.clone());
        registry.add(b.clone());
        assert_eq!(registry.count(), 2);

        registry.remove(&a);
        assert_eq!(registry.count(), 1);

        // Removal of an unknown connection is a no-op
        registry.remove(&a);
        assert_eq!(registry.count(), 1);
    }

    #[tokio::test]
    async fn test_session_tracks_most_recent_connection() {
        let registry = registry();
        let (first, _rx1) = channel_connection("alice", WireFormat::Json);
        let (second, _rx2) = channel_connection("alice", WireFormat::Json);

        registry.add(first.clone());
        registry.add(second.clone());

        let current = registry.session("alice").unwrap();
        assert_eq!(current.id, second.id);

        // Removing the older connection must not clear the session mapping
        registry.remove(&first);
        assert!(registry.session("alice").is_some());

        registry.remove(&second);
        assert!(registry.session("alice").is_none());
    }

    #[tokio::test]
    async fn test_broadcast_reaches_all_formats() {
        let registry = registry();
        let (json_conn, mut json_rx) = channel_connection("alice", WireFormat::Json);
        let (proto_conn, mut proto_rx) = channel_connection("bob", WireFormat::Protobuf);

        registry.add(json_conn);
        registry.add(proto_conn);

        let sent = registry
            .broadcast(BroadcastFrame::new(PkgId::NOTIFY, json!({"message": "hi"})))
            .await;
        assert_eq!(sent, 2);

        assert!(matches!(json_rx.next().await.unwrap(), Message::Text(_)));
        assert!(matches!(proto_rx.next().await.unwrap(), Message::Binary(_)));
    }

    #[tokio::test]
    async fn test_broadcast_evicts_dead_connections() {
        let registry = registry();
        let (alive, mut alive_rx) = channel_connection("alice", WireFormat::Json);
        let (dead, dead_rx) = channel_connection("bob", WireFormat::Json);
        drop(dead_rx); // receiver gone; sends will fail

        registry.add(alive);
        registry.add(dead);
        assert_eq!(registry.count(), 2);

        let sent = registry
            .broadcast(BroadcastFrame::new(PkgId::NOTIFY, json!({"message": "hi"})))
            .await;

        assert_eq!(sent, 1);
        assert_eq!(registry.count(), 1);
        assert!(alive_rx.next().await.is_some());
    }
}
