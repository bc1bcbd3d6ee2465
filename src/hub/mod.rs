//! Worker hub — shared connection registry, state store and correlator.
//!
//! One `Hub` per process (or per test). Socket handlers, the sweeper and the
//! tool adapter all go through it; none of them touch the maps directly.
//!
//! - `registry`: live connections and the worker-id index
//! - `store`: last-known state per worker
//! - `correlator`: pending status queries and their timeouts
//! - `router`: inbound envelope dispatch
//! - `sweeper`: eviction of silent connections
//! - `adapter`: call surface for the tool layer

pub mod adapter;
pub mod correlator;
pub mod registry;
pub mod router;
pub mod store;
pub mod sweeper;

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::HubConfig;
use crate::error::RoutingError;
use crate::protocol::{CommandPayload, Envelope, WorkerState};

pub use adapter::WorkerAdapter;
pub use correlator::{Correlator, QueryOutcome, Requester};
pub use registry::{ConnectionHandle, ConnectionRecord, ConnectionRegistry, ConnectionRole};
pub use store::StateStore;
pub use sweeper::spawn_sweeper;

/// Command whose successful delivery implies the worker goes offline.
pub const TERMINATE_COMMAND: &str = "terminate";

/// Shared synchronization core.
pub struct Hub {
    config: HubConfig,
    registry: ConnectionRegistry,
    store: StateStore,
    correlator: Arc<Correlator>,
}

impl Hub {
    pub fn new(config: HubConfig) -> Arc<Self> {
        let correlator = Correlator::new(config.query_timeout);
        Arc::new(Self {
            config,
            registry: ConnectionRegistry::new(),
            store: StateStore::new(),
            correlator,
        })
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn correlator(&self) -> &Arc<Correlator> {
        &self.correlator
    }

    /// Register a new connection and queue the last-known state of every worker.
    ///
    /// Returns the handle and the receiving end of its outbound queue.
    pub async fn connect(&self) -> (Arc<ConnectionHandle>, mpsc::Receiver<Arc<String>>) {
        let (tx, rx) = mpsc::channel(self.config.outbound_buffer);
        let handle = Arc::new(ConnectionHandle::new(tx));
        let conn_id = self.registry.register(Arc::clone(&handle)).await;

        let snapshot = self.store.get_all().await;
        for state in &snapshot {
            handle.send_envelope(&Envelope::state_update(state));
        }

        info!(conn_id = %conn_id, known_workers = snapshot.len(), "Client connected");
        (handle, rx)
    }

    /// Remove a connection. If it was the live holder of a worker id, the worker
    /// is marked offline and the transition is broadcast, unless the worker was
    /// already offline (for example after a delivered `terminate`).
    ///
    /// Only the first call for a connection has any effect.
    pub async fn disconnect(&self, conn_id: Uuid) -> Option<WorkerState> {
        let removed = self.registry.remove(conn_id).await?;
        removed.record.handle.close();

        let worker_id = removed.released_worker?;
        let Some(state) = self.store.mark_offline(&worker_id).await else {
            debug!(conn_id = %conn_id, worker_id = %worker_id, "Worker already offline");
            return None;
        };
        let recipients = self.broadcast_state(&state).await;
        info!(conn_id = %conn_id, worker_id = %worker_id, recipients, "Worker went offline");
        Some(state)
    }

    /// Fan a state record out to every observer.
    pub async fn broadcast_state(&self, state: &WorkerState) -> usize {
        self.broadcast(&Envelope::state_update(state)).await
    }

    /// Send an envelope to every observer. Returns how many accepted it.
    ///
    /// Sends never block; observers that keep overflowing their queue past
    /// `max_send_drops` are closed.
    pub async fn broadcast(&self, envelope: &Envelope) -> usize {
        let frame = match envelope.encode() {
            Ok(json) => Arc::new(json),
            Err(e) => {
                warn!(kind = %envelope.kind, error = %e, "Failed to encode broadcast");
                return 0;
            }
        };

        let observers = self.registry.observers().await;
        let mut delivered = 0;
        for observer in &observers {
            if observer.send(Arc::clone(&frame)) {
                delivered += 1;
                continue;
            }
            let drops = observer.drop_count();
            if drops >= self.config.max_send_drops {
                warn!(conn_id = %observer.id, drops, "Closing slow observer");
                observer.close();
            }
        }

        debug!(kind = %envelope.kind, recipients = observers.len(), delivered, "Broadcast");
        delivered
    }

    /// Build and route a command to a worker.
    pub async fn send_command(
        &self,
        worker_id: &str,
        command: &CommandPayload,
    ) -> Result<(), RoutingError> {
        let frame = Envelope::command(worker_id, command)
            .encode()
            .map_err(|_| RoutingError::SendFailed {
                worker_id: worker_id.to_string(),
            })?;
        self.forward_command(worker_id, Arc::new(frame), &command.command)
            .await
    }

    /// Deliver an encoded command frame to the worker's live connection.
    ///
    /// Fire-and-forget: nothing is queued when the worker is absent.
    pub(crate) async fn forward_command(
        &self,
        worker_id: &str,
        frame: Arc<String>,
        command: &str,
    ) -> Result<(), RoutingError> {
        let not_connected = || RoutingError::NotConnected {
            worker_id: worker_id.to_string(),
        };

        let handle = self
            .registry
            .find_by_worker_id(worker_id)
            .await
            .ok_or_else(not_connected)?;
        if handle.is_closed() {
            return Err(not_connected());
        }
        if !handle.send(frame) {
            return Err(RoutingError::SendFailed {
                worker_id: worker_id.to_string(),
            });
        }

        info!(worker_id, command, conn_id = %handle.id, "Command forwarded");

        if command == TERMINATE_COMMAND
            && let Some(state) = self.store.mark_offline(worker_id).await
        {
            self.broadcast_state(&state).await;
        }
        Ok(())
    }

    /// Start a correlated status query against a worker.
    ///
    /// The receiver always completes: with the worker's answer, with a
    /// synthetic offline record on timeout, or immediately with an offline
    /// record when the worker has no live connection.
    pub async fn request_status(
        &self,
        worker_id: &str,
        requester: Requester,
    ) -> oneshot::Receiver<QueryOutcome> {
        let Some(handle) = self
            .registry
            .find_by_worker_id(worker_id)
            .await
            .filter(|h| !h.is_closed())
        else {
            let (tx, rx) = oneshot::channel();
            let mut state = self.store.get_or_offline(worker_id).await;
            if !state.is_offline() {
                state.set_offline();
            }
            debug!(worker_id, %requester, "Status query for unconnected worker");
            let _ = tx.send(QueryOutcome::Unreachable(state));
            return rx;
        };

        let (request_id, rx) = self.correlator.open(worker_id, requester, None).await;
        if !handle.send_envelope(&Envelope::status_request(worker_id, &request_id)) {
            warn!(worker_id, request_id = %request_id, "Could not deliver status request");
            self.correlator.expire(&request_id).await;
        }
        rx
    }
}
