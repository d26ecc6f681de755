//! Caller-facing content increments.
//!
//! The decoder turns provider events into `ContentIncrement`s as they
//! arrive, so a UI can render text while the model is still writing and
//! show a tool call the moment its arguments are complete.

use serde::{Deserialize, Serialize};

/// One piece of assistant content, in stream order.
///
/// - `text`: a fragment of visible text, emitted per delta
/// - `tool_call`: a finalized tool call with parsed arguments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentIncrement {
    /// Partial text from the model.
    Text { text: String },

    /// A tool call whose arguments parsed as JSON.
    ToolCall {
        id: String,
        name: String,
        args: serde_json::Value,
    },
}

impl ContentIncrement {
    /// Event name for this increment.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Text { .. } => "text",
            Self::ToolCall { .. } => "tool_call",
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            Self::ToolCall { .. } => None,
        }
    }
}
