//! Tool registry for managing available tools.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::hub::WorkerAdapter;
use crate::tools::builtin::workers::{
    GetWorkerStateTool, ListWorkersTool, QueryWorkerStatusTool, SendCommandTool,
};
use crate::tools::tool::{Tool, ToolDefinition};

/// Registry of available tools.
pub struct ToolRegistry {
    tools: RwLock<HashMap<String, Arc<dyn Tool>>>,
}

impl ToolRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            tools: RwLock::new(HashMap::new()),
        }
    }

    /// Registry preloaded with the worker tools.
    pub fn with_worker_tools(adapter: WorkerAdapter) -> Self {
        let registry = Self::new();
        registry.register_worker_tools(adapter);
        registry
    }

    /// Register a tool at startup. A tool with the same name is replaced.
    pub fn register_sync(&self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        if let Ok(mut tools) = self.tools.try_write() {
            tools.insert(name.clone(), tool);
            tracing::debug!("Registered tool: {}", name);
        }
    }

    /// Register the worker query/control tools backed by `adapter`.
    pub fn register_worker_tools(&self, adapter: WorkerAdapter) {
        self.register_sync(Arc::new(ListWorkersTool::new(adapter.clone())));
        self.register_sync(Arc::new(GetWorkerStateTool::new(adapter.clone())));
        self.register_sync(Arc::new(SendCommandTool::new(adapter.clone())));
        self.register_sync(Arc::new(QueryWorkerStatusTool::new(adapter)));
    }

    /// Get a tool by name.
    pub async fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.read().await.get(name).cloned()
    }

    /// Get the number of registered tools.
    pub fn count(&self) -> usize {
        self.tools.try_read().map(|t| t.len()).unwrap_or(0)
    }

    /// Get tool definitions, sorted by name.
    pub async fn tool_definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self
            .tools
            .read()
            .await
            .values()
            .map(|tool| ToolDefinition {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters: tool.parameters_schema(),
            })
            .collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HubConfig;
    use crate::context::CallContext;
    use crate::hub::Hub;
    use crate::tools::tool::{ToolError, ToolOutput};
    use async_trait::async_trait;
    use std::time::Duration;

    #[derive(Debug)]
    struct MockTool {
        name: String,
    }

    #[async_trait]
    impl Tool for MockTool {
        fn name(&self) -> &str {
            &self.name
        }
        fn description(&self) -> &str {
            "A mock tool for testing"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object", "properties": {}})
        }
        async fn execute(
            &self,
            _params: serde_json::Value,
            _ctx: &CallContext,
        ) -> Result<ToolOutput, ToolError> {
            Ok(ToolOutput::success(
                serde_json::json!("mock"),
                Duration::from_millis(1),
            ))
        }
    }

    fn worker_registry() -> ToolRegistry {
        let hub = Hub::new(HubConfig::default());
        ToolRegistry::with_worker_tools(WorkerAdapter::new(hub))
    }

    #[tokio::test]
    async fn test_register_and_get() {
        let registry = ToolRegistry::new();
        registry.register_sync(Arc::new(MockTool {
            name: "test_tool".to_string(),
        }));

        let retrieved = registry.get("test_tool").await;
        assert!(retrieved.is_some());
        assert_eq!(retrieved.unwrap().name(), "test_tool");
        assert!(registry.get("nonexistent").await.is_none());
    }

    #[tokio::test]
    async fn test_worker_tools_registered() {
        let registry = worker_registry();
        assert_eq!(registry.count(), 4);

        let names: Vec<String> = registry
            .tool_definitions()
            .await
            .into_iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(
            names,
            vec![
                "get_worker_state",
                "list_workers",
                "query_worker_status",
                "send_command"
            ]
        );
    }

    #[tokio::test]
    async fn test_same_name_replaces_tool() {
        let registry = worker_registry();
        registry.register_sync(Arc::new(MockTool {
            name: "send_command".to_string(),
        }));

        assert_eq!(registry.count(), 4);
        let tool = registry.get("send_command").await.unwrap();
        assert_eq!(tool.description(), "A mock tool for testing");
    }
}
