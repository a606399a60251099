use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{Mutex, mpsc};
use tracing::debug;

pub type ConnectionId = u64;

struct Subscriber {
    id: ConnectionId,
    tx: mpsc::UnboundedSender<String>,
}

/// Process-wide map from chat id to its live connections. One instance is
/// created at server start and held in `AppState`; tests construct their own.
/// Nothing here is ever persisted.
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    inner: Arc<Mutex<HashMap<i64, Vec<Subscriber>>>>,
    next_id: Arc<AtomicU64>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection to a chat's fan-out set, creating the set if absent.
    /// Returns the connection's id and the receiving end of its queue.
    pub async fn register(
        &self,
        chat_id: i64,
    ) -> (ConnectionId, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let mut inner = self.inner.lock().await;
        inner.entry(chat_id).or_default().push(Subscriber { id, tx });
        debug!(chat_id, conn = id, "registered connection");

        (id, rx)
    }

    /// Drop a connection; the chat's entry is removed once it empties so
    /// short-lived anonymous chats don't accumulate here.
    pub async fn unregister(&self, chat_id: i64, conn_id: ConnectionId) {
        let mut inner = self.inner.lock().await;
        if let Some(subscribers) = inner.get_mut(&chat_id) {
            subscribers.retain(|s| s.id != conn_id);
            if subscribers.is_empty() {
                inner.remove(&chat_id);
            }
        }
        debug!(chat_id, conn = conn_id, "unregistered connection");
    }

    /// Deliver `payload` to every connection currently registered for the
    /// chat. Best-effort: a connection whose receiver is gone is pruned and
    /// the rest still get the payload.
    pub async fn broadcast(&self, chat_id: i64, payload: &str) {
        let mut inner = self.inner.lock().await;
        let Some(subscribers) = inner.get_mut(&chat_id) else {
            return;
        };

        subscribers.retain(|s| match s.tx.send(payload.to_owned()) {
            Ok(()) => true,
            Err(_) => {
                debug!(chat_id, conn = s.id, "pruning dead connection");
                false
            }
        });

        if subscribers.is_empty() {
            inner.remove(&chat_id);
        }
    }

    /// Number of live connections for a chat.
    pub async fn connection_count(&self, chat_id: i64) -> usize {
        self.inner
            .lock()
            .await
            .get(&chat_id)
            .map(Vec::len)
            .unwrap_or(0)
    }
}
