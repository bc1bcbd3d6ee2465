//! Adapter — the narrow call surface the tool-invocation layer uses.
//!
//! Tools never see connections; they read the state store and route
//! commands and queries through the hub.

use std::sync::Arc;

use serde_json::Value;
use tracing::{info, warn};

use super::Hub;
use super::correlator::Requester;
use crate::protocol::{CommandPayload, WorkerState};

#[derive(Clone)]
pub struct WorkerAdapter {
    hub: Arc<Hub>,
}

impl WorkerAdapter {
    pub fn new(hub: Arc<Hub>) -> Self {
        Self { hub }
    }

    /// Every known worker, sorted by id.
    pub async fn list_workers(&self) -> Vec<WorkerState> {
        let mut workers = self.hub.store().get_all().await;
        workers.sort_by(|a, b| a.id.cmp(&b.id));
        workers
    }

    /// Last-known state, or `None` if the worker was never seen.
    pub async fn get_worker_state(&self, worker_id: &str) -> Option<WorkerState> {
        self.hub.store().get(worker_id).await
    }

    /// Route a command. Returns false when the worker has no live connection.
    pub async fn send_command(
        &self,
        worker_id: &str,
        command: &str,
        parameters: Option<Value>,
    ) -> bool {
        let payload = CommandPayload {
            command: command.to_string(),
            parameters,
        };
        match self.hub.send_command(worker_id, &payload).await {
            Ok(()) => {
                info!(worker_id, command, "Command sent via adapter");
                true
            }
            Err(e) => {
                warn!(worker_id, command, error = %e, "Adapter command not delivered");
                false
            }
        }
    }

    /// Ask the worker for its current state and wait for the answer.
    ///
    /// Resolves to an offline record if the worker is unreachable or silent
    /// past the query timeout.
    pub async fn query_status(&self, worker_id: &str) -> WorkerState {
        let rx = self.hub.request_status(worker_id, Requester::Adapter).await;
        match rx.await {
            Ok(outcome) => outcome.into_state(),
            Err(_) => WorkerState::offline(worker_id),
        }
    }

    /// Worker ids with a mapped connection.
    pub async fn connected_worker_ids(&self) -> Vec<String> {
        let mut ids = self.hub.registry().list_worker_ids().await;
        ids.sort();
        ids
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::config::HubConfig;
    use crate::protocol::{StatePatch, WorkerStatus};

    fn adapter() -> (Arc<Hub>, WorkerAdapter) {
        let hub = Hub::new(HubConfig {
            query_timeout: Duration::from_millis(50),
            ..HubConfig::default()
        });
        (Arc::clone(&hub), WorkerAdapter::new(hub))
    }

    #[tokio::test]
    async fn send_command_without_connection_returns_false() {
        let (_hub, adapter) = adapter();
        assert!(!adapter.send_command("ghost", "stop", None).await);
    }

    #[tokio::test]
    async fn send_command_reaches_worker() {
        let (hub, adapter) = adapter();
        let (worker, mut rx) = hub.connect().await;
        hub.registry().identify(worker.id, "w1").await.unwrap();

        let params = serde_json::json!({"task": "charge"});
        assert!(adapter.send_command("w1", "setTask", Some(params)).await);

        let json: Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(json["payload"]["command"], "setTask");
        assert_eq!(json["payload"]["parameters"]["task"], "charge");
    }

    #[tokio::test]
    async fn get_and_list_workers() {
        let (hub, adapter) = adapter();
        assert!(adapter.get_worker_state("w1").await.is_none());

        hub.store()
            .upsert(
                "w2",
                &StatePatch {
                    status: Some(WorkerStatus::Working),
                    ..Default::default()
                },
            )
            .await;
        hub.store().upsert("w1", &StatePatch::default()).await;

        let ids: Vec<String> = adapter.list_workers().await.into_iter().map(|w| w.id).collect();
        assert_eq!(ids, vec!["w1", "w2"]);
        assert_eq!(
            adapter.get_worker_state("w2").await.unwrap().status,
            WorkerStatus::Working
        );
    }

    #[tokio::test]
    async fn query_status_times_out_offline() {
        let (hub, adapter) = adapter();
        let (worker, _rx) = hub.connect().await;
        hub.registry().identify(worker.id, "w1").await.unwrap();

        let state = adapter.query_status("w1").await;
        assert_eq!(state.status, WorkerStatus::Offline);
        assert!(!state.active);
        assert_eq!(adapter.connected_worker_ids().await, vec!["w1".to_string()]);
    }
}
