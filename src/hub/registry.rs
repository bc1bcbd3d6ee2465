//! Connection registry — live sockets, their roles, and the worker-id index.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{RwLock, mpsc};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::RoutingError;
use crate::protocol::Envelope;

/// Outbound side of one live socket.
///
/// Frames go through a bounded queue drained by the socket's writer. Sends never
/// wait: when the queue is full the new frame is dropped and counted.
#[derive(Debug)]
pub struct ConnectionHandle {
    pub id: Uuid,
    tx: mpsc::Sender<Arc<String>>,
    cancel: CancellationToken,
    drops: AtomicU64,
}

impl ConnectionHandle {
    pub fn new(tx: mpsc::Sender<Arc<String>>) -> Self {
        Self {
            id: Uuid::new_v4(),
            tx,
            cancel: CancellationToken::new(),
            drops: AtomicU64::new(0),
        }
    }

    /// Queue an already-encoded frame. Returns false if it was not queued.
    pub fn send(&self, frame: Arc<String>) -> bool {
        match self.tx.try_send(frame) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                let total = self.drops.fetch_add(1, Ordering::Relaxed) + 1;
                debug!(conn_id = %self.id, total_drops = total, "Outbound queue full, frame dropped");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    /// Encode and queue an envelope.
    pub fn send_envelope(&self, envelope: &Envelope) -> bool {
        match envelope.encode() {
            Ok(json) => self.send(Arc::new(json)),
            Err(e) => {
                warn!(conn_id = %self.id, kind = %envelope.kind, error = %e, "Failed to encode envelope");
                false
            }
        }
    }

    /// Total frames dropped because the queue was full.
    pub fn drop_count(&self) -> u64 {
        self.drops.load(Ordering::Relaxed)
    }

    /// Ask the socket task to shut down.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled() || self.tx.is_closed()
    }

    /// Token cancelled when the connection is closed from the hub side.
    pub fn close_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

/// Role of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionRole {
    /// Identified remote worker.
    Worker,
    /// Control/observer client (the default until a `connect` arrives).
    Observer,
}

/// Registry entry for one connection.
#[derive(Debug, Clone)]
pub struct ConnectionRecord {
    pub handle: Arc<ConnectionHandle>,
    pub role: ConnectionRole,
    /// Set only when `role` is `Worker`.
    pub worker_id: Option<String>,
    pub last_activity: Instant,
}

/// Result of removing a connection.
#[derive(Debug)]
pub struct Removed {
    pub record: ConnectionRecord,
    /// Worker id whose mapping pointed at this connection and was released.
    /// `None` for observers and for workers that had already been superseded.
    pub released_worker: Option<String>,
}

#[derive(Default)]
struct RegistryInner {
    connections: HashMap<Uuid, ConnectionRecord>,
    /// worker id → connection currently holding it.
    workers: HashMap<String, Uuid>,
}

/// Tracks every live connection. All mutation happens under one write lock so
/// the connection table and the worker index never disagree.
#[derive(Default)]
pub struct ConnectionRegistry {
    inner: RwLock<RegistryInner>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit a new connection as an unidentified observer.
    pub async fn register(&self, handle: Arc<ConnectionHandle>) -> Uuid {
        let id = handle.id;
        let record = ConnectionRecord {
            handle,
            role: ConnectionRole::Observer,
            worker_id: None,
            last_activity: Instant::now(),
        };
        self.inner.write().await.connections.insert(id, record);
        debug!(conn_id = %id, "Connection registered");
        id
    }

    /// Promote a connection to the worker role bound to `worker_id`.
    ///
    /// A previous holder of the same id is not closed, only superseded in the
    /// index; its handle is returned so the caller can log or clean up.
    pub async fn identify(
        &self,
        id: Uuid,
        worker_id: &str,
    ) -> Result<Option<Arc<ConnectionHandle>>, RoutingError> {
        let mut inner = self.inner.write().await;
        let RegistryInner {
            connections,
            workers,
        } = &mut *inner;

        let record = connections
            .get_mut(&id)
            .ok_or(RoutingError::UnknownConnection { id })?;

        // Re-binding a connection to a different id releases the old one.
        if let Some(previous) = record.worker_id.take()
            && previous != worker_id
            && workers.get(&previous) == Some(&id)
        {
            workers.remove(&previous);
        }

        record.role = ConnectionRole::Worker;
        record.worker_id = Some(worker_id.to_string());
        record.last_activity = Instant::now();

        let superseded = match workers.insert(worker_id.to_string(), id) {
            Some(prev) if prev != id => connections.get(&prev).map(|r| Arc::clone(&r.handle)),
            _ => None,
        };

        if let Some(ref old) = superseded {
            info!(worker_id, conn_id = %id, superseded = %old.id, "Worker identified, superseding previous connection");
        } else {
            info!(worker_id, conn_id = %id, "Worker identified");
        }

        Ok(superseded)
    }

    /// Refresh the activity timestamp. Returns false for unknown connections.
    pub async fn touch(&self, id: Uuid) -> bool {
        match self.inner.write().await.connections.get_mut(&id) {
            Some(record) => {
                record.last_activity = Instant::now();
                true
            }
            None => false,
        }
    }

    /// Delete a connection record. Only the first caller for a given id gets `Some`.
    pub async fn remove(&self, id: Uuid) -> Option<Removed> {
        let mut inner = self.inner.write().await;
        let record = inner.connections.remove(&id)?;

        let released_worker = match record.worker_id {
            Some(ref worker_id) if inner.workers.get(worker_id) == Some(&id) => {
                inner.workers.remove(worker_id);
                Some(worker_id.clone())
            }
            _ => None,
        };

        debug!(conn_id = %id, role = ?record.role, "Connection removed");
        Some(Removed {
            record,
            released_worker,
        })
    }

    /// Snapshot of mapped worker ids.
    pub async fn list_worker_ids(&self) -> Vec<String> {
        self.inner.read().await.workers.keys().cloned().collect()
    }

    /// Connection currently holding `worker_id`.
    pub async fn find_by_worker_id(&self, worker_id: &str) -> Option<Arc<ConnectionHandle>> {
        let inner = self.inner.read().await;
        let id = inner.workers.get(worker_id)?;
        inner.connections.get(id).map(|r| Arc::clone(&r.handle))
    }

    pub async fn get(&self, id: Uuid) -> Option<ConnectionRecord> {
        self.inner.read().await.connections.get(&id).cloned()
    }

    /// Whether `id` is the connection the index maps `worker_id` to.
    pub async fn is_current(&self, id: Uuid, worker_id: &str) -> bool {
        self.inner.read().await.workers.get(worker_id) == Some(&id)
    }

    /// Consistent snapshot of every observer connection.
    pub async fn observers(&self) -> Vec<Arc<ConnectionHandle>> {
        self.inner
            .read()
            .await
            .connections
            .values()
            .filter(|r| r.role == ConnectionRole::Observer)
            .map(|r| Arc::clone(&r.handle))
            .collect()
    }

    /// Connections silent for longer than `threshold`.
    pub async fn stale(&self, threshold: Duration) -> Vec<Uuid> {
        let now = Instant::now();
        self.inner
            .read()
            .await
            .connections
            .values()
            .filter(|r| now.saturating_duration_since(r.last_activity) > threshold)
            .map(|r| r.handle.id)
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.connections.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.connections.is_empty()
    }
}
