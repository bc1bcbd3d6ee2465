//! Call context — who invoked a tool and when.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Context for a single tool invocation.
#[derive(Debug, Clone, Serialize)]
pub struct CallContext {
    /// Unique call ID.
    pub call_id: Uuid,
    /// Label of the caller (e.g. "rest", an agent session name).
    pub caller: String,
    /// When the call started.
    pub started_at: DateTime<Utc>,
    /// Free-form caller metadata.
    pub metadata: serde_json::Value,
}

impl Default for CallContext {
    fn default() -> Self {
        Self {
            call_id: Uuid::new_v4(),
            caller: "anonymous".to_string(),
            started_at: Utc::now(),
            metadata: serde_json::Value::Null,
        }
    }
}

impl CallContext {
    pub fn new(caller: impl Into<String>) -> Self {
        Self {
            caller: caller.into(),
            ..Default::default()
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}
