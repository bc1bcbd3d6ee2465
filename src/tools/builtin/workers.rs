//! Worker tools: list, inspect, command and query workers through the hub.
//!
//! Each tool wraps one `WorkerAdapter` call. Parameters use the wire's
//! camelCase names so an agent can reuse ids it read from state records.

use std::time::Instant;

use async_trait::async_trait;

use crate::context::CallContext;
use crate::hub::WorkerAdapter;
use crate::tools::tool::{Tool, ToolError, ToolOutput, require_str};

/// Command names accepted by `send_command`.
pub const RECOGNIZED_COMMANDS: &[&str] = &[
    "move",
    "stop",
    "reset",
    "activate",
    "deactivate",
    "setTask",
    "terminate",
];

fn to_json<T: serde::Serialize>(value: &T) -> Result<serde_json::Value, ToolError> {
    serde_json::to_value(value).map_err(|e| ToolError::ExecutionFailed(e.to_string()))
}

/// Lists every known worker with its last-known state.
pub struct ListWorkersTool {
    adapter: WorkerAdapter,
}

impl ListWorkersTool {
    pub fn new(adapter: WorkerAdapter) -> Self {
        Self { adapter }
    }
}

#[async_trait]
impl Tool for ListWorkersTool {
    fn name(&self) -> &str {
        "list_workers"
    }

    fn description(&self) -> &str {
        "List every worker the hub has seen, with its last-known state \
         (status, position, battery, current task). Offline workers are included."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {}
        })
    }

    async fn execute(
        &self,
        _params: serde_json::Value,
        ctx: &CallContext,
    ) -> Result<ToolOutput, ToolError> {
        let start = Instant::now();
        let workers = self.adapter.list_workers().await;
        tracing::debug!(call_id = %ctx.call_id, count = workers.len(), "Listed workers");
        Ok(ToolOutput::success(
            serde_json::json!({ "workers": to_json(&workers)? }),
            start.elapsed(),
        ))
    }
}

/// Returns the last-known state of one worker.
pub struct GetWorkerStateTool {
    adapter: WorkerAdapter,
}

impl GetWorkerStateTool {
    pub fn new(adapter: WorkerAdapter) -> Self {
        Self { adapter }
    }
}

#[async_trait]
impl Tool for GetWorkerStateTool {
    fn name(&self) -> &str {
        "get_worker_state"
    }

    fn description(&self) -> &str {
        "Get the last-known state of a worker from the hub's store. Does not \
         contact the worker; use query_worker_status for a fresh reading."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "workerId": {
                    "type": "string",
                    "description": "Id of the worker"
                }
            },
            "required": ["workerId"]
        })
    }

    async fn execute(
        &self,
        params: serde_json::Value,
        _ctx: &CallContext,
    ) -> Result<ToolOutput, ToolError> {
        let start = Instant::now();
        let worker_id = require_str(&params, "workerId")?;
        let result = match self.adapter.get_worker_state(worker_id).await {
            Some(state) => to_json(&state)?,
            None => serde_json::json!({ "found": false, "workerId": worker_id }),
        };
        Ok(ToolOutput::success(result, start.elapsed()))
    }
}

/// Sends a named command to a connected worker.
pub struct SendCommandTool {
    adapter: WorkerAdapter,
}

impl SendCommandTool {
    pub fn new(adapter: WorkerAdapter) -> Self {
        Self { adapter }
    }
}

#[async_trait]
impl Tool for SendCommandTool {
    fn name(&self) -> &str {
        "send_command"
    }

    fn description(&self) -> &str {
        "Send a command to a connected worker. Returns sent=false when the \
         worker has no live connection. A terminate command also marks the \
         worker offline."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "workerId": {
                    "type": "string",
                    "description": "Id of the target worker"
                },
                "command": {
                    "type": "string",
                    "enum": RECOGNIZED_COMMANDS,
                    "description": "Command name"
                },
                "parameters": {
                    "type": "object",
                    "description": "Command-specific parameters, forwarded as-is"
                }
            },
            "required": ["workerId", "command"]
        })
    }

    async fn execute(
        &self,
        params: serde_json::Value,
        ctx: &CallContext,
    ) -> Result<ToolOutput, ToolError> {
        let start = Instant::now();
        let worker_id = require_str(&params, "workerId")?;
        let command = require_str(&params, "command")?;
        if !RECOGNIZED_COMMANDS.contains(&command) {
            return Err(ToolError::InvalidParameters(format!(
                "unknown command '{}'",
                command
            )));
        }
        let parameters = params.get("parameters").filter(|v| !v.is_null()).cloned();

        let sent = self
            .adapter
            .send_command(worker_id, command, parameters)
            .await;
        tracing::info!(
            call_id = %ctx.call_id,
            caller = %ctx.caller,
            worker_id,
            command,
            sent,
            "send_command tool executed"
        );
        Ok(ToolOutput::success(
            serde_json::json!({ "sent": sent }),
            start.elapsed(),
        ))
    }
}

/// Asks a worker for its current state and waits for the answer.
pub struct QueryWorkerStatusTool {
    adapter: WorkerAdapter,
}

impl QueryWorkerStatusTool {
    pub fn new(adapter: WorkerAdapter) -> Self {
        Self { adapter }
    }
}

#[async_trait]
impl Tool for QueryWorkerStatusTool {
    fn name(&self) -> &str {
        "query_worker_status"
    }

    fn description(&self) -> &str {
        "Ask a worker for a fresh status report. Waits for the worker's answer; \
         if the worker is not connected or does not answer in time, the result \
         is an offline record."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "workerId": {
                    "type": "string",
                    "description": "Id of the worker to query"
                }
            },
            "required": ["workerId"]
        })
    }

    async fn execute(
        &self,
        params: serde_json::Value,
        ctx: &CallContext,
    ) -> Result<ToolOutput, ToolError> {
        let start = Instant::now();
        let worker_id = require_str(&params, "workerId")?;
        let state = self.adapter.query_status(worker_id).await;
        tracing::debug!(
            call_id = %ctx.call_id,
            worker_id,
            status = %state.status,
            "Queried worker status"
        );
        Ok(ToolOutput::success(to_json(&state)?, start.elapsed()))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::config::HubConfig;
    use crate::hub::{ConnectionHandle, Hub};
    use crate::protocol::{Envelope, EnvelopeKind};
    use tokio::sync::mpsc;

    fn test_hub() -> Arc<Hub> {
        Hub::new(HubConfig {
            query_timeout: Duration::from_millis(100),
            ..HubConfig::default()
        })
    }

    async fn connect_worker(
        hub: &Hub,
        worker_id: &str,
    ) -> (Arc<ConnectionHandle>, mpsc::Receiver<Arc<String>>) {
        let (handle, mut rx) = hub.connect().await;
        let frame = format!(r#"{{"type":"connect","workerId":"{}"}}"#, worker_id);
        hub.dispatch(&handle, &frame).await;
        // Drain the connect ack.
        while let Ok(frame) = rx.try_recv() {
            let env = Envelope::parse(&frame).unwrap();
            if env.kind == EnvelopeKind::Ack {
                break;
            }
        }
        (handle, rx)
    }

    #[tokio::test]
    async fn get_worker_state_reports_not_found() {
        let tool = GetWorkerStateTool::new(WorkerAdapter::new(test_hub()));
        let out = tool
            .execute(serde_json::json!({"workerId": "ghost"}), &CallContext::default())
            .await
            .unwrap();
        assert_eq!(out.result["found"], false);
    }

    #[tokio::test]
    async fn get_worker_state_requires_worker_id() {
        let tool = GetWorkerStateTool::new(WorkerAdapter::new(test_hub()));
        let err = tool
            .execute(serde_json::json!({}), &CallContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidParameters(_)));
    }

    #[tokio::test]
    async fn list_workers_wraps_records() {
        let hub = test_hub();
        let (handle, _rx) = connect_worker(&hub, "w1").await;
        hub.dispatch(
            &handle,
            r#"{"type":"stateUpdate","workerId":"w1","payload":{"batteryLevel":80}}"#,
        )
        .await;
        let tool = ListWorkersTool::new(WorkerAdapter::new(hub));

        let out = tool
            .execute(serde_json::json!({}), &CallContext::default())
            .await
            .unwrap();
        let workers = out.result["workers"].as_array().unwrap();
        assert_eq!(workers.len(), 1);
        assert_eq!(workers[0]["id"], "w1");
    }

    #[tokio::test]
    async fn send_command_rejects_unknown_name() {
        let tool = SendCommandTool::new(WorkerAdapter::new(test_hub()));
        let err = tool
            .execute(
                serde_json::json!({"workerId": "w1", "command": "dance"}),
                &CallContext::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidParameters(_)));
    }

    #[tokio::test]
    async fn send_command_to_disconnected_worker_is_not_sent() {
        let tool = SendCommandTool::new(WorkerAdapter::new(test_hub()));
        let out = tool
            .execute(
                serde_json::json!({"workerId": "w1", "command": "stop"}),
                &CallContext::new("test"),
            )
            .await
            .unwrap();
        assert_eq!(out.result["sent"], false);
    }

    #[tokio::test]
    async fn send_command_reaches_connected_worker() {
        let hub = test_hub();
        let (_handle, mut rx) = connect_worker(&hub, "w1").await;
        let tool = SendCommandTool::new(WorkerAdapter::new(hub));

        let out = tool
            .execute(
                serde_json::json!({
                    "workerId": "w1",
                    "command": "move",
                    "parameters": {"x": 1, "y": 2, "z": 3}
                }),
                &CallContext::new("test"),
            )
            .await
            .unwrap();
        assert_eq!(out.result["sent"], true);

        let frame = rx.recv().await.unwrap();
        let env = Envelope::parse(&frame).unwrap();
        assert_eq!(env.kind, EnvelopeKind::Command);
        assert_eq!(env.payload["command"], "move");
        assert_eq!(env.payload["parameters"]["y"], 2);
    }

    #[tokio::test]
    async fn query_worker_status_times_out_offline() {
        let hub = test_hub();
        let (_handle, _rx) = connect_worker(&hub, "w1").await;
        let tool = QueryWorkerStatusTool::new(WorkerAdapter::new(hub));

        let out = tool
            .execute(serde_json::json!({"workerId": "w1"}), &CallContext::default())
            .await
            .unwrap();
        assert_eq!(out.result["id"], "w1");
        assert_eq!(out.result["status"], "offline");
        assert_eq!(out.result["active"], false);
    }
}
