//! Memory tools: let the model write to its own assistant memory.
//!
//! Everything stored here shows up in later system preambles through
//! [`AssistantMemory`]'s preamble segment.

use std::sync::Arc;

use async_trait::async_trait;
use zaibridge_core::dialogue::ToolOutput;
use zaibridge_core::error::{MemoryError, ToolError};
use zaibridge_memory::AssistantMemory;

use crate::registry::Tool;

fn required_str<'a>(arguments: &'a serde_json::Value, key: &str) -> Result<&'a str, ToolError> {
    arguments[key]
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ToolError::InvalidArguments(format!("Missing '{key}' argument")))
}

fn storage_failure(tool_name: &str, e: MemoryError) -> ToolError {
    ToolError::ExecutionFailed {
        tool_name: tool_name.into(),
        reason: e.to_string(),
    }
}

pub struct RememberPreferenceTool {
    memory: Arc<AssistantMemory>,
}

impl RememberPreferenceTool {
    pub fn new(memory: Arc<AssistantMemory>) -> Self {
        Self { memory }
    }
}

#[async_trait]
impl Tool for RememberPreferenceTool {
    fn name(&self) -> &str {
        "remember_preference"
    }

    fn description(&self) -> &str {
        "Remember a lasting user preference, e.g. 'prefers warm lights in the evening'."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "preference": { "type": "string", "description": "The preference, in one sentence" },
                "category": { "type": "string", "description": "Optional category (default 'general')" }
            },
            "required": ["preference"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let preference = required_str(&arguments, "preference")?;
        let category = arguments["category"].as_str();
        let added = self
            .memory
            .add_preference(preference, category)
            .await
            .map_err(|e| storage_failure(self.name(), e))?;

        Ok(if added {
            format!("Remembered preference: {preference}").into()
        } else {
            "That preference is already remembered.".into()
        })
    }
}

pub struct RememberNoteTool {
    memory: Arc<AssistantMemory>,
}

impl RememberNoteTool {
    pub fn new(memory: Arc<AssistantMemory>) -> Self {
        Self { memory }
    }
}

#[async_trait]
impl Tool for RememberNoteTool {
    fn name(&self) -> &str {
        "remember_note"
    }

    fn description(&self) -> &str {
        "Store a note for later, e.g. 'the plumber comes tomorrow'."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "note": { "type": "string", "description": "The note text" },
                "tags": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Optional tags"
                }
            },
            "required": ["note"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let note = required_str(&arguments, "note")?;
        let tags: Vec<String> = arguments
            .get("tags")
            .and_then(|t| serde_json::from_value(t.clone()).ok())
            .unwrap_or_default();

        self.memory
            .add_note(note, tags)
            .await
            .map_err(|e| storage_failure(self.name(), e))?;
        Ok(format!("Noted: {note}").into())
    }
}

pub struct SetUserContextTool {
    memory: Arc<AssistantMemory>,
}

impl SetUserContextTool {
    pub fn new(memory: Arc<AssistantMemory>) -> Self {
        Self { memory }
    }
}

#[async_trait]
impl Tool for SetUserContextTool {
    fn name(&self) -> &str {
        "set_user_context"
    }

    fn description(&self) -> &str {
        "Record a fact about the user as a key/value pair, e.g. user_name = Ada."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "key": { "type": "string", "description": "snake_case key, e.g. 'wake_time'" },
                "value": { "description": "The value to store" }
            },
            "required": ["key", "value"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let key = required_str(&arguments, "key")?;
        let value = match arguments.get("value") {
            None | Some(serde_json::Value::Null) => {
                return Err(ToolError::InvalidArguments("Missing 'value' argument".into()));
            }
            Some(v) => v.clone(),
        };

        self.memory
            .set_context(key, value)
            .await
            .map_err(|e| storage_failure(self.name(), e))?;
        Ok(format!("Saved {key}.").into())
    }
}

pub struct ForgetTool {
    memory: Arc<AssistantMemory>,
}

impl ForgetTool {
    pub fn new(memory: Arc<AssistantMemory>) -> Self {
        Self { memory }
    }
}

#[async_trait]
impl Tool for ForgetTool {
    fn name(&self) -> &str {
        "forget"
    }

    fn description(&self) -> &str {
        "Forget remembered preferences or notes containing the given text."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "text": { "type": "string", "description": "Text to match (case-insensitive)" },
                "kind": {
                    "type": "string",
                    "enum": ["preference", "note", "any"],
                    "default": "any"
                }
            },
            "required": ["text"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let text = required_str(&arguments, "text")?;
        let kind = arguments["kind"].as_str().unwrap_or("any");

        let (preferences, notes) = match kind {
            "preference" => (true, false),
            "note" => (false, true),
            "any" => (true, true),
            other => {
                return Err(ToolError::InvalidArguments(format!(
                    "Unknown kind '{other}'"
                )));
            }
        };

        let mut removed = false;
        if preferences {
            removed |= self
                .memory
                .remove_preference(text)
                .await
                .map_err(|e| storage_failure(self.name(), e))?;
        }
        if notes {
            removed |= self
                .memory
                .remove_note(text)
                .await
                .map_err(|e| storage_failure(self.name(), e))?;
        }

        Ok(if removed {
            format!("Forgot everything matching '{text}'.").into()
        } else {
            format!("Nothing remembered matches '{text}'.").into()
        })
    }
}
