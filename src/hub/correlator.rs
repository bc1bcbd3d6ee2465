//! Request/response correlator — pending status queries keyed by request id.
//!
//! Each query gets a table entry and a timer. Whichever of `resolve` (the
//! worker answered) or `expire` (the timer fired) removes the entry first
//! completes the waiting caller; the other finds nothing and is a no-op.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use rand::distributions::Alphanumeric;
use tokio::sync::{Mutex, oneshot};
use tokio::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

use crate::protocol::{WorkerState, now_millis};

/// Who is waiting on a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requester {
    /// An observer socket; the answer is sent back as a `statusResponse`.
    Connection(Uuid),
    /// The tool-invocation adapter, awaiting in-process.
    Adapter,
}

impl std::fmt::Display for Requester {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connection(id) => write!(f, "connection:{id}"),
            Self::Adapter => write!(f, "adapter"),
        }
    }
}

/// How a query completed.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutcome {
    /// The worker answered with its state.
    Reported(WorkerState),
    /// No answer before the deadline; carries a synthetic offline record.
    TimedOut(WorkerState),
    /// The worker had no live connection; carries an offline record.
    Unreachable(WorkerState),
}

impl QueryOutcome {
    pub fn into_state(self) -> WorkerState {
        match self {
            Self::Reported(state) | Self::TimedOut(state) | Self::Unreachable(state) => state,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::TimedOut(_))
    }
}

#[derive(Debug)]
struct PendingQuery {
    target: String,
    requester: Requester,
    created_at: Instant,
    reply: oneshot::Sender<QueryOutcome>,
}

/// Table of in-flight status queries.
pub struct Correlator {
    pending: Mutex<HashMap<String, PendingQuery>>,
    default_timeout: Duration,
}

impl Correlator {
    pub fn new(default_timeout: Duration) -> Arc<Self> {
        Arc::new(Self {
            pending: Mutex::new(HashMap::new()),
            default_timeout,
        })
    }

    /// Record a pending query for `target` and start its timeout timer.
    ///
    /// Returns the new request id and the receiver that completes exactly once.
    pub async fn open(
        self: &Arc<Self>,
        target: &str,
        requester: Requester,
        timeout: Option<Duration>,
    ) -> (String, oneshot::Receiver<QueryOutcome>) {
        let timeout = timeout.unwrap_or(self.default_timeout);
        let (reply, rx) = oneshot::channel();
        let created_at = Instant::now();

        let request_id = {
            let mut pending = self.pending.lock().await;
            let request_id = unique_request_id(&pending);
            pending.insert(
                request_id.clone(),
                PendingQuery {
                    target: target.to_string(),
                    requester,
                    created_at,
                    reply,
                },
            );
            request_id
        };

        let weak = Arc::downgrade(self);
        let timer_id = request_id.clone();
        tokio::spawn(async move {
            tokio::time::sleep_until(created_at + timeout).await;
            if let Some(correlator) = weak.upgrade() {
                correlator.expire(&timer_id).await;
            }
        });

        debug!(request_id = %request_id, worker_id = target, %requester, ?timeout, "Status query opened");
        (request_id, rx)
    }

    /// Complete a pending query with the worker's reported state.
    ///
    /// Returns false if the id is unknown or already completed.
    pub async fn resolve(&self, request_id: &str, state: WorkerState) -> bool {
        let Some(query) = self.pending.lock().await.remove(request_id) else {
            debug!(request_id, "Dropping response for unknown or expired request");
            return false;
        };

        debug!(
            request_id,
            worker_id = %query.target,
            requester = %query.requester,
            elapsed_ms = query.created_at.elapsed().as_millis() as u64,
            "Status query resolved"
        );
        // The requester may have gone away; the query still counts as resolved.
        let _ = query.reply.send(QueryOutcome::Reported(state));
        true
    }

    /// Complete a pending query with a synthetic offline record.
    ///
    /// Fired by the timer. Returns false if the query was already resolved.
    pub async fn expire(&self, request_id: &str) -> bool {
        let Some(query) = self.pending.lock().await.remove(request_id) else {
            return false;
        };

        info!(request_id, worker_id = %query.target, requester = %query.requester, "Status query timed out");
        let _ = query
            .reply
            .send(QueryOutcome::TimedOut(WorkerState::offline(query.target)));
        true
    }

    /// Worker a pending query is addressed to.
    pub async fn target_of(&self, request_id: &str) -> Option<String> {
        self.pending
            .lock()
            .await
            .get(request_id)
            .map(|q| q.target.clone())
    }

    pub async fn len(&self) -> usize {
        self.pending.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.pending.lock().await.is_empty()
    }
}

/// Millisecond time component plus a random suffix, unique within the table.
fn unique_request_id(pending: &HashMap<String, PendingQuery>) -> String {
    let mut rng = rand::thread_rng();
    loop {
        let suffix: String = (&mut rng)
            .sample_iter(&Alphanumeric)
            .take(8)
            .map(char::from)
            .collect();
        let id = format!("{:x}-{}", now_millis(), suffix);
        if !pending.contains_key(&id) {
            return id;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::WorkerStatus;

    #[tokio::test]
    async fn resolve_completes_caller() {
        let correlator = Correlator::new(Duration::from_secs(5));
        let (id, rx) = correlator.open("w1", Requester::Adapter, None).await;
        assert_eq!(correlator.target_of(&id).await.as_deref(), Some("w1"));

        let mut state = WorkerState::new("w1");
        state.status = WorkerStatus::Working;
        assert!(correlator.resolve(&id, state).await);

        let outcome = rx.await.unwrap();
        assert!(!outcome.is_timeout());
        assert_eq!(outcome.into_state().status, WorkerStatus::Working);
        assert!(correlator.is_empty().await);
    }

    #[tokio::test]
    async fn second_resolve_is_noop() {
        let correlator = Correlator::new(Duration::from_secs(5));
        let (id, _rx) = correlator.open("w1", Requester::Adapter, None).await;

        assert!(correlator.resolve(&id, WorkerState::new("w1")).await);
        assert!(!correlator.resolve(&id, WorkerState::new("w1")).await);
    }

    #[tokio::test]
    async fn unknown_id_is_dropped() {
        let correlator = Correlator::new(Duration::from_secs(5));
        assert!(!correlator.resolve("nope", WorkerState::new("w1")).await);
        assert!(!correlator.expire("nope").await);
    }

    #[tokio::test]
    async fn timeout_yields_offline() {
        let correlator = Correlator::new(Duration::from_secs(5));
        let (id, rx) = correlator
            .open("w9", Requester::Adapter, Some(Duration::from_millis(20)))
            .await;

        let outcome = tokio::time::timeout(Duration::from_secs(2), rx)
            .await
            .unwrap()
            .unwrap();
        assert!(outcome.is_timeout());
        let state = outcome.into_state();
        assert_eq!(state.id, "w9");
        assert!(!state.active);
        assert_eq!(state.status, WorkerStatus::Offline);

        // Late response after expiry loses the race.
        assert!(!correlator.resolve(&id, WorkerState::new("w9")).await);
    }

    #[tokio::test]
    async fn resolve_before_timer_wins() {
        let correlator = Correlator::new(Duration::from_millis(30));
        let (id, rx) = correlator.open("w1", Requester::Adapter, None).await;
        assert!(correlator.resolve(&id, WorkerState::new("w1")).await);

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(!correlator.expire(&id).await);
        assert!(!rx.await.unwrap().is_timeout());
    }

    #[tokio::test]
    async fn ids_are_unique() {
        let correlator = Correlator::new(Duration::from_secs(5));
        let mut ids = std::collections::HashSet::new();
        for _ in 0..200 {
            let (id, _rx) = correlator.open("w1", Requester::Adapter, None).await;
            assert!(ids.insert(id));
        }
        assert_eq!(correlator.len().await, 200);
    }
}
