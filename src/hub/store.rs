//! State store — last-known state per worker.

use std::collections::HashMap;

use tokio::sync::RwLock;
use tracing::debug;

use crate::protocol::{StatePatch, WorkerState};

/// In-memory map of worker id → last-known state. Records are never deleted.
#[derive(Default)]
pub struct StateStore {
    workers: RwLock<HashMap<String, WorkerState>>,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, worker_id: &str) -> Option<WorkerState> {
        self.workers.read().await.get(worker_id).cloned()
    }

    /// All known records. Order is unspecified.
    pub async fn get_all(&self) -> Vec<WorkerState> {
        self.workers.read().await.values().cloned().collect()
    }

    /// Merge a report into the worker's record, creating it if absent.
    pub async fn upsert(&self, worker_id: &str, patch: &StatePatch) -> WorkerState {
        let mut workers = self.workers.write().await;
        let state = workers
            .entry(worker_id.to_string())
            .or_insert_with(|| WorkerState::new(worker_id));
        patch.apply_to(state);
        debug!(worker_id, status = %state.status, "Worker state updated");
        state.clone()
    }

    /// Mark a worker offline, keeping its last pose, battery and task.
    ///
    /// Returns the new record, or `None` if it was already offline so callers
    /// broadcast the transition only once.
    pub async fn mark_offline(&self, worker_id: &str) -> Option<WorkerState> {
        let mut workers = self.workers.write().await;
        if workers.get(worker_id).is_some_and(|s| s.is_offline()) {
            return None;
        }
        let state = workers
            .entry(worker_id.to_string())
            .or_insert_with(|| WorkerState::offline(worker_id));
        state.set_offline();
        debug!(worker_id, "Worker marked offline");
        Some(state.clone())
    }

    /// The worker's record, lazily created as offline if it was never seen.
    pub async fn get_or_offline(&self, worker_id: &str) -> WorkerState {
        if let Some(state) = self.get(worker_id).await {
            return state;
        }
        self.workers
            .write()
            .await
            .entry(worker_id.to_string())
            .or_insert_with(|| WorkerState::offline(worker_id))
            .clone()
    }

    pub async fn len(&self) -> usize {
        self.workers.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.workers.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Vec3, WorkerStatus};

    #[tokio::test]
    async fn upsert_creates_then_merges() {
        let store = StateStore::new();
        assert!(store.get("w1").await.is_none());

        let first = StatePatch {
            battery_level: Some(80.0),
            status: Some(WorkerStatus::Idle),
            ..Default::default()
        };
        let state = store.upsert("w1", &first).await;
        assert_eq!(state.id, "w1");
        assert!(state.active);
        assert_eq!(state.battery_level, Some(80.0));

        let second = StatePatch {
            status: Some(WorkerStatus::Working),
            current_task: Some("inspect".into()),
            ..Default::default()
        };
        store.upsert("w1", &second).await;

        let state = store.get("w1").await.unwrap();
        assert_eq!(state.status, WorkerStatus::Working);
        assert_eq!(state.current_task.as_deref(), Some("inspect"));
        assert_eq!(state.battery_level, Some(80.0));
    }

    #[tokio::test]
    async fn sequence_keeps_last_value_per_field() {
        let store = StateStore::new();
        for level in [90.0, 75.0, 60.0] {
            store
                .upsert(
                    "w1",
                    &StatePatch {
                        battery_level: Some(level),
                        ..Default::default()
                    },
                )
                .await;
        }
        store
            .upsert(
                "w1",
                &StatePatch {
                    position: Some(Vec3::new(3.0, 0.0, 1.0)),
                    ..Default::default()
                },
            )
            .await;

        let state = store.get("w1").await.unwrap();
        assert_eq!(state.battery_level, Some(60.0));
        assert_eq!(state.position, Some(Vec3::new(3.0, 0.0, 1.0)));
    }

    #[tokio::test]
    async fn mark_offline_preserves_history() {
        let store = StateStore::new();
        store
            .upsert(
                "w1",
                &StatePatch {
                    battery_level: Some(33.0),
                    current_task: Some("haul".into()),
                    ..Default::default()
                },
            )
            .await;

        let state = store.mark_offline("w1").await.unwrap();
        assert!(!state.active);
        assert_eq!(state.status, WorkerStatus::Offline);
        assert_eq!(state.battery_level, Some(33.0));
        assert_eq!(state.current_task.as_deref(), Some("haul"));
    }

    #[tokio::test]
    async fn mark_offline_reports_only_the_transition() {
        let store = StateStore::new();
        store.upsert("w1", &StatePatch::default()).await;

        assert!(store.mark_offline("w1").await.is_some());
        assert!(store.mark_offline("w1").await.is_none());
        assert!(store.get("w1").await.unwrap().is_offline());

        // A worker never seen is recorded as offline once.
        assert!(store.mark_offline("ghost").await.is_some());
        assert!(store.mark_offline("ghost").await.is_none());
    }

    #[tokio::test]
    async fn get_or_offline_creates_lazily() {
        let store = StateStore::new();
        let state = store.get_or_offline("ghost").await;
        assert_eq!(state.status, WorkerStatus::Offline);
        assert!(!state.active);
        assert_eq!(store.len().await, 1);

        // Existing records are returned untouched.
        store.upsert("w1", &StatePatch::default()).await;
        assert!(store.get_or_offline("w1").await.active);
    }

    #[tokio::test]
    async fn get_all_returns_every_record() {
        let store = StateStore::new();
        store.upsert("a", &StatePatch::default()).await;
        store.upsert("b", &StatePatch::default()).await;
        store.mark_offline("c").await;

        let mut ids: Vec<String> = store.get_all().await.into_iter().map(|s| s.id).collect();
        ids.sort();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }
}
