//! Dialogue domain types.
//!
//! A [`Dialogue`] is the ordered, append-only sequence of [`Turn`]s that the
//! tool loop encodes, sends, and extends. It lives for one orchestration call;
//! longer-term persistence belongs to the caller.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

/// Unique identifier for a dialogue, used to correlate log lines and events.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DialogueId(pub String);

impl DialogueId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Default for DialogueId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for DialogueId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A media or document payload attached to a user turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    /// MIME type, e.g. `image/png` or `application/pdf`
    pub mime_type: String,

    /// Raw payload bytes (base64-encoded only at the wire boundary)
    pub data: Vec<u8>,
}

impl Attachment {
    pub fn new(mime_type: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            mime_type: mime_type.into(),
            data: data.into(),
        }
    }
}

/// A structured request from the model to invoke a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Provider-assigned id, unique within its assistant turn
    pub id: String,

    /// Name of the tool to invoke
    pub name: String,

    /// Parsed JSON arguments
    pub args: serde_json::Value,
}

/// The payload of a tool result: plain text or a structured value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolOutput {
    Text(String),
    Structured(serde_json::Value),
}

impl ToolOutput {
    /// Render as the text the provider receives.
    pub fn to_wire_text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Structured(value) => value.to_string(),
        }
    }
}

impl From<String> for ToolOutput {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<&str> for ToolOutput {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<serde_json::Value> for ToolOutput {
    fn from(v: serde_json::Value) -> Self {
        Self::Structured(v)
    }
}

/// The outcome of one tool call, produced by the caller's tool executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// The `ToolCallRequest::id` this result answers
    pub call_id: String,

    pub result: ToolOutput,

    #[serde(default)]
    pub is_error: bool,
}

impl ToolResult {
    pub fn success(call_id: impl Into<String>, result: impl Into<ToolOutput>) -> Self {
        Self {
            call_id: call_id.into(),
            result: result.into(),
            is_error: false,
        }
    }

    pub fn error(call_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            result: ToolOutput::Text(message.into()),
            is_error: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserTurn {
    pub text: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssistantTurn {
    /// May be empty, e.g. for a turn that only requests tools
    pub text: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRequest>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolResultTurn {
    pub results: Vec<ToolResult>,
}

impl ToolResultTurn {
    pub fn new(results: Vec<ToolResult>) -> Self {
        Self { results }
    }

    /// True when every call in `calls` has a result in this turn.
    pub fn covers(&self, calls: &[ToolCallRequest]) -> bool {
        let answered: HashSet<&str> = self.results.iter().map(|r| r.call_id.as_str()).collect();
        calls.iter().all(|c| answered.contains(c.id.as_str()))
    }
}

/// One exchange unit in a dialogue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Turn {
    User(UserTurn),
    Assistant(AssistantTurn),
    ToolResults(ToolResultTurn),
}

impl Turn {
    /// A text-only user turn.
    pub fn user(text: impl Into<String>) -> Self {
        Self::User(UserTurn {
            text: text.into(),
            attachments: Vec::new(),
        })
    }

    /// A text-only assistant turn.
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::Assistant(AssistantTurn {
            text: text.into(),
            tool_calls: Vec::new(),
        })
    }
}

/// An ordered, append-only sequence of turns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dialogue {
    pub id: DialogueId,

    turns: Vec<Turn>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl Dialogue {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: DialogueId::new(),
            turns: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Start a dialogue from existing turns (e.g. restored by the caller).
    pub fn from_turns(turns: Vec<Turn>) -> Self {
        let mut dialogue = Self::new();
        dialogue.turns = turns;
        dialogue
    }

    /// Append a turn. History is never rewritten.
    pub fn push(&mut self, turn: Turn) {
        self.updated_at = Utc::now();
        self.turns.push(turn);
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// The most recent assistant turn, if any.
    pub fn last_assistant(&self) -> Option<&AssistantTurn> {
        self.turns.iter().rev().find_map(|t| match t {
            Turn::Assistant(a) => Some(a),
            _ => None,
        })
    }
}

impl Default for Dialogue {
    fn default() -> Self {
        Self::new()
    }
}
