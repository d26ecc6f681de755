//! Tools for zaibridge.
//!
//! The conversation core never runs tools itself; it hands finalized calls
//! to a [`ToolResolver`](zaibridge_core::tool::ToolResolver). The
//! [`ToolRegistry`] here is that resolver for the CLI: it looks calls up by
//! name, runs them, and turns every outcome (including failures) into a
//! tool result the model can read.

pub mod memory_tools;
pub mod registry;
pub mod time;

use std::sync::Arc;

use zaibridge_memory::AssistantMemory;

pub use registry::{Tool, ToolRegistry};

/// A registry with every built-in tool.
///
/// The memory tools are only registered when a memory is supplied.
pub fn default_registry(memory: Option<Arc<AssistantMemory>>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(time::GetTimeTool));
    if let Some(memory) = memory {
        registry.register(Box::new(memory_tools::RememberPreferenceTool::new(
            memory.clone(),
        )));
        registry.register(Box::new(memory_tools::RememberNoteTool::new(memory.clone())));
        registry.register(Box::new(memory_tools::SetUserContextTool::new(
            memory.clone(),
        )));
        registry.register(Box::new(memory_tools::ForgetTool::new(memory)));
    }
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry_without_memory() {
        let registry = default_registry(None);
        assert_eq!(registry.names(), vec!["get_time"]);
    }

    #[tokio::test]
    async fn default_registry_with_memory() {
        let dir = tempfile::TempDir::new().unwrap();
        let memory = Arc::new(AssistantMemory::open(dir.path(), "tools").await);
        let registry = default_registry(Some(memory));
        assert_eq!(
            registry.names(),
            vec![
                "forget",
                "get_time",
                "remember_note",
                "remember_preference",
                "set_user_context"
            ]
        );
        assert_eq!(registry.definitions().len(), 5);
    }
}
