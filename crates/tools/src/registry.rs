//! Tool trait and the name → tool registry.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tracing::{debug, warn};
use zaibridge_core::dialogue::{ToolCallRequest, ToolOutput, ToolResult, ToolResultTurn};
use zaibridge_core::error::ToolError;
use zaibridge_core::tool::{ToolDefinition, ToolResolver};

/// One capability the model can invoke.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "get_time").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the LLM).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Execute the tool with the given arguments.
    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolOutput, ToolError>;

    /// Convert this tool into a ToolDefinition for sending to the LLM.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// A registry of available tools, ordered by name.
pub struct ToolRegistry {
    tools: BTreeMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: BTreeMap::new(),
        }
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        let name = tool.name().to_string();
        self.tools.insert(name, tool);
    }

    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    /// Get all tool definitions (for sending to the LLM).
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|t| t.to_definition()).collect()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Execute a single call.
    pub async fn execute(&self, call: &ToolCallRequest) -> Result<ToolOutput, ToolError> {
        let tool = self
            .tools
            .get(&call.name)
            .ok_or_else(|| ToolError::NotFound(call.name.clone()))?;
        tool.execute(call.args.clone()).await
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolResolver for ToolRegistry {
    /// Runs calls in order; failures become error results so the model can
    /// recover. Always answers every call.
    async fn resolve(&self, calls: &[ToolCallRequest]) -> Option<ToolResultTurn> {
        let mut results = Vec::with_capacity(calls.len());
        for call in calls {
            let result = match self.execute(call).await {
                Ok(output) => {
                    debug!(tool = %call.name, call_id = %call.id, "Tool executed");
                    ToolResult::success(&call.id, output)
                }
                Err(e) => {
                    warn!(tool = %call.name, error = %e, "Tool execution failed");
                    ToolResult::error(&call.id, format!("Error: {e}"))
                }
            };
            results.push(result);
        }
        Some(ToolResultTurn::new(results))
    }
}
