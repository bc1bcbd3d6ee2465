//! Message router — dispatches inbound envelopes by kind.
//!
//! Every dispatched message gets exactly one direct reply: `ack` on success or
//! `error` on failure. A status query additionally produces a `statusResponse`
//! later, once the worker answers or the query times out.

use std::sync::Arc;

use tracing::{debug, warn};

use super::correlator::Requester;
use super::registry::{ConnectionHandle, ConnectionRole};
use super::Hub;
use crate::error::{Error, ProtocolError, RoutingError};
use crate::protocol::{CommandPayload, Envelope, EnvelopeKind, StatePatch, WorkerState};

impl Hub {
    /// Handle one inbound text frame from `conn`.
    ///
    /// Never fails: decode and routing errors are answered with an `error`
    /// envelope and the connection stays open.
    pub async fn dispatch(&self, conn: &Arc<ConnectionHandle>, text: &str) {
        self.registry.touch(conn.id).await;

        let envelope = match Envelope::parse(text) {
            Ok(envelope) => envelope,
            Err(e) => {
                debug!(conn_id = %conn.id, error = %e, text, "Rejected inbound frame");
                conn.send_envelope(&Envelope::error(e.to_string()));
                return;
            }
        };

        let result = match envelope.kind {
            EnvelopeKind::Connect => self.handle_connect(conn, &envelope).await,
            EnvelopeKind::StateUpdate => self.handle_state_update(conn, &envelope).await,
            EnvelopeKind::Command => self.handle_command(conn, &envelope, text).await,
            EnvelopeKind::StatusRequest => self.handle_status_request(conn, &envelope).await,
            EnvelopeKind::StatusResponse => self.handle_status_response(conn, &envelope).await,
            EnvelopeKind::Ack | EnvelopeKind::Error => {
                // Replies from clients are consumed; answering them would loop.
                debug!(conn_id = %conn.id, kind = %envelope.kind, "Client reply consumed");
                return;
            }
        };

        match result {
            Ok(()) => {
                conn.send_envelope(&Envelope::ack());
            }
            Err(e) => {
                match e {
                    Error::Routing(_) => {
                        warn!(conn_id = %conn.id, kind = %envelope.kind, error = %e, "Routing failed")
                    }
                    _ => debug!(conn_id = %conn.id, kind = %envelope.kind, error = %e, "Invalid envelope"),
                }
                let mut reply = Envelope::error(e.to_string());
                reply.worker_id = envelope.worker_id.clone();
                reply.request_id = envelope.request_id.clone();
                conn.send_envelope(&reply);
            }
        }
    }

    async fn handle_connect(
        &self,
        conn: &Arc<ConnectionHandle>,
        envelope: &Envelope,
    ) -> Result<(), Error> {
        let worker_id = envelope.require_worker_id()?;
        self.registry.identify(conn.id, worker_id).await?;
        Ok(())
    }

    async fn handle_state_update(
        &self,
        conn: &Arc<ConnectionHandle>,
        envelope: &Envelope,
    ) -> Result<(), Error> {
        let worker_id = envelope.require_worker_id()?;
        if !self.registry.is_current(conn.id, worker_id).await {
            return Err(RoutingError::NotIdentified {
                expected: worker_id.to_string(),
            }
            .into());
        }

        let patch: StatePatch = envelope.payload_as()?;
        let state = self.store.upsert(worker_id, &patch).await;
        self.broadcast_state(&state).await;
        Ok(())
    }

    async fn handle_command(
        &self,
        conn: &Arc<ConnectionHandle>,
        envelope: &Envelope,
        raw: &str,
    ) -> Result<(), Error> {
        self.require_role(conn, ConnectionRole::Observer, envelope.kind)
            .await?;
        let worker_id = envelope.require_worker_id()?;
        let command: CommandPayload = envelope.payload_as()?;
        if command.command.trim().is_empty() {
            return Err(ProtocolError::InvalidPayload {
                kind: envelope.kind.to_string(),
                reason: "command name is empty".into(),
            }
            .into());
        }

        self.forward_command(worker_id, Arc::new(raw.to_string()), &command.command)
            .await?;
        Ok(())
    }

    async fn handle_status_request(
        &self,
        conn: &Arc<ConnectionHandle>,
        envelope: &Envelope,
    ) -> Result<(), Error> {
        let worker_id = envelope.require_worker_id()?.to_string();
        let rx = self
            .request_status(&worker_id, Requester::Connection(conn.id))
            .await;

        // Answer the observer with its own request id once the query completes.
        let requester = Arc::clone(conn);
        let client_request_id = envelope.request_id.clone();
        tokio::spawn(async move {
            let state = match rx.await {
                Ok(outcome) => outcome.into_state(),
                Err(_) => WorkerState::offline(worker_id.as_str()),
            };
            requester.send_envelope(&Envelope::status_response(client_request_id, &state));
        });
        Ok(())
    }

    async fn handle_status_response(
        &self,
        conn: &Arc<ConnectionHandle>,
        envelope: &Envelope,
    ) -> Result<(), Error> {
        let record = self.require_role(conn, ConnectionRole::Worker, envelope.kind).await?;
        let Some(request_id) = envelope.request_id.as_deref() else {
            return Err(ProtocolError::InvalidPayload {
                kind: envelope.kind.to_string(),
                reason: "missing requestId".into(),
            }
            .into());
        };
        let worker_id = record.worker_id.unwrap_or_default();

        match self.correlator.target_of(request_id).await {
            Some(target) if target == worker_id => {}
            Some(target) => {
                debug!(request_id, worker_id = %worker_id, expected = %target, "Response from a different worker dropped");
                return Ok(());
            }
            None => {
                debug!(request_id, worker_id = %worker_id, "Unmatched status response dropped");
                return Ok(());
            }
        }
        if !self.registry.is_current(conn.id, &worker_id).await {
            debug!(request_id, worker_id = %worker_id, conn_id = %conn.id, "Response from superseded connection dropped");
            return Ok(());
        }

        // The answer is merged over the last-known record for the requester only;
        // stored state changes through `stateUpdate`.
        let patch: StatePatch = envelope.payload_as()?;
        let mut state = self
            .store
            .get(&worker_id)
            .await
            .unwrap_or_else(|| WorkerState::new(worker_id.as_str()));
        patch.apply_to(&mut state);

        self.correlator.resolve(request_id, state).await;
        Ok(())
    }

    async fn require_role(
        &self,
        conn: &Arc<ConnectionHandle>,
        role: ConnectionRole,
        kind: EnvelopeKind,
    ) -> Result<super::ConnectionRecord, RoutingError> {
        let record = self
            .registry
            .get(conn.id)
            .await
            .ok_or(RoutingError::UnknownConnection { id: conn.id })?;
        if record.role != role {
            let role = match record.role {
                ConnectionRole::Worker => "worker",
                ConnectionRole::Observer => "observer",
            };
            return Err(RoutingError::WrongRole {
                role: role.to_string(),
                kind: kind.to_string(),
            });
        }
        Ok(record)
    }
}
