//! Provider trait: the abstraction over streaming LLM backends.
//!
//! A Provider takes a [`WireRequest`] and returns the provider's event stream,
//! already normalized into [`StreamEvent`]s. Reassembling those events into
//! assistant content is the agent's job, not the provider's.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::ProviderError;
use crate::wire::WireRequest;

/// The kind of content block the provider is opening.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    Text,
    ToolUse,
}

/// A partial payload for the currently open block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "fragment", rename_all = "snake_case")]
pub enum Fragment {
    Text(String),
    Json(String),
}

/// One provider streaming event, in arrival order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    MessageStart {
        input_tokens: u32,
    },
    BlockStart {
        kind: BlockKind,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tool_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tool_name: Option<String>,
    },
    BlockDelta(Fragment),
    MessageDelta {
        output_tokens: u32,
    },
}

impl StreamEvent {
    pub fn text_block() -> Self {
        Self::BlockStart {
            kind: BlockKind::Text,
            tool_id: None,
            tool_name: None,
        }
    }

    pub fn tool_block(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self::BlockStart {
            kind: BlockKind::ToolUse,
            tool_id: Some(id.into()),
            tool_name: Some(name.into()),
        }
    }

    pub fn text(fragment: impl Into<String>) -> Self {
        Self::BlockDelta(Fragment::Text(fragment.into()))
    }

    pub fn json(fragment: impl Into<String>) -> Self {
        Self::BlockDelta(Fragment::Json(fragment.into()))
    }
}

/// Token usage information.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl TokenUsage {
    pub fn total(&self) -> u32 {
        self.input_tokens.saturating_add(self.output_tokens)
    }

    /// Accumulate another run's usage into this one.
    pub fn add(&mut self, other: TokenUsage) {
        self.input_tokens = self.input_tokens.saturating_add(other.input_tokens);
        self.output_tokens = self.output_tokens.saturating_add(other.output_tokens);
    }
}

/// The receiving half of a provider stream.
///
/// Dropping it closes the stream; the provider's reader task notices the
/// closed channel and releases the connection.
pub type EventStream = mpsc::Receiver<std::result::Result<StreamEvent, ProviderError>>;

/// The core Provider trait.
///
/// The tool loop calls `stream()` without knowing which backend is in use.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for this provider (e.g., "zai").
    fn name(&self) -> &str;

    /// Open a stream for `request`.
    ///
    /// Errors returned here (auth, connection, HTTP status) happen before any
    /// event is produced; errors inside the stream arrive as `Err` items.
    async fn stream(&self, request: WireRequest) -> std::result::Result<EventStream, ProviderError>;

    /// List available models for this provider.
    async fn list_models(&self) -> std::result::Result<Vec<String>, ProviderError> {
        Ok(Vec::new())
    }
}
