//! Real-time fan-out to connected clients.
//!
//! Every connection gets its own bounded outbound channel, the same
//! per-worker `mpsc::channel` shape other background workers in this
//! crate use to hand off state to a consumer — here a `publish` fans
//! the same event out to every registered connection's channel rather
//! than to a single task. A connection that can't keep up is dropped
//! rather than allowed to stall the publisher or the other
//! subscribers.

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

use crate::events::ServerEvent;

const CHANNEL_CAPACITY: usize = 256;

struct Connection {
    id: Uuid,
    sender: mpsc::Sender<ServerEvent>,
}

/// Fans `ServerEvent`s out to every connected client. Cloning a `Hub`
/// shares the same connection registry; there is no per-project
/// partitioning here, consumers filter on `ServerEvent::project_id`.
#[derive(Clone)]
pub struct Hub {
    connections: Arc<Mutex<Vec<Connection>>>,
}

impl Hub {
    pub fn new() -> Self {
        Self { connections: Arc::new(Mutex::new(Vec::new())) }
    }

    /// Registers a new connection with a bounded outbound buffer and
    /// returns its receiving half.
    pub async fn subscribe(&self) -> mpsc::Receiver<ServerEvent> {
        let (sender, receiver) = mpsc::channel(CHANNEL_CAPACITY);
        let id = Uuid::new_v4();
        self.connections.lock().await.push(Connection { id, sender });
        receiver
    }

    /// Publishes an event to every current connection. A connection
    /// whose buffer is full, or whose receiver has already dropped, is
    /// closed and deregistered on this call rather than blocked on or
    /// retried: dropping its `Sender` here closes that connection's
    /// outbound buffer for good.
    pub async fn publish(&self, event: ServerEvent) {
        let mut connections = self.connections.lock().await;
        connections.retain(|conn| match conn.sender.try_send(event.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(connection_id = %conn.id, "outbound buffer full, closing connection");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });
    }

    pub async fn subscriber_count(&self) -> usize {
        self.connections.lock().await.len()
    }
}

impl Default for Hub {
    fn default() -> Self {
        Self::new()
    }
}
