//! Tool catalog and the caller-side resolution seam.
//!
//! The core never runs tools. It advertises [`ToolDefinition`]s to the model,
//! and when the model asks for tools it hands the finalized calls to a
//! [`ToolResolver`] owned by the caller.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::dialogue::{ToolCallRequest, ToolResultTurn};

/// A tool definition sent to the LLM so it knows what tools it can call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The tool name
    pub name: String,

    /// Description of what the tool does
    pub description: String,

    /// JSON Schema describing the tool's parameters, passed through untouched
    pub parameters: serde_json::Value,
}

/// Supplies tool results between tool-loop iterations.
///
/// Returning `None` (or a turn that does not answer every call) ends the run.
#[async_trait]
pub trait ToolResolver: Send + Sync {
    async fn resolve(&self, calls: &[ToolCallRequest]) -> Option<ToolResultTurn>;
}

/// A resolver that never answers; runs stop after the first assistant turn.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTools;

#[async_trait]
impl ToolResolver for NoTools {
    async fn resolve(&self, _calls: &[ToolCallRequest]) -> Option<ToolResultTurn> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tool_definition_serialization() {
        let tool = ToolDefinition {
            name: "remember_note".into(),
            description: "Store a note for later".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "note": { "type": "string", "description": "The note text" }
                },
                "required": ["note"]
            }),
        };
        let json = serde_json::to_string(&tool).unwrap();
        assert!(json.contains("remember_note"));
        assert!(json.contains("required"));
    }

    #[tokio::test]
    async fn no_tools_never_resolves() {
        let calls = vec![ToolCallRequest {
            id: "t1".into(),
            name: "get_time".into(),
            args: json!({}),
        }];
        assert!(NoTools.resolve(&calls).await.is_none());
    }
}
