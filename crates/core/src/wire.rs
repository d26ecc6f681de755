//! Wire types for the Anthropic-compatible Messages API.
//!
//! These serialize directly into the request body sent to the provider.

use serde::{Deserialize, Serialize};

use crate::tool::ToolDefinition;

pub const DEFAULT_MAX_TOKENS: u32 = 3000;
pub const DEFAULT_TEMPERATURE: f32 = 1.0;

/// A streaming Messages API request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireRequest {
    pub model: String,

    pub messages: Vec<WireMessage>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub system: Vec<SystemBlock>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<WireTool>,

    pub max_tokens: u32,

    pub temperature: f32,

    pub stream: bool,
}

/// Model and sampling parameters applied on top of an encoded request.
#[derive(Debug, Clone, PartialEq)]
pub struct SamplingParams {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl WireRequest {
    /// An empty streaming request; the encoder fills messages and system blocks.
    pub fn new(messages: Vec<WireMessage>, system: Vec<SystemBlock>) -> Self {
        Self {
            model: String::new(),
            messages,
            system,
            tools: Vec::new(),
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
            stream: true,
        }
    }

    pub fn with_sampling(mut self, params: &SamplingParams) -> Self {
        self.model = params.model.clone();
        self.max_tokens = params.max_tokens;
        self.temperature = params.temperature;
        self
    }

    /// Attach the tool catalog, converted 1:1.
    pub fn with_tools(mut self, tools: &[ToolDefinition]) -> Self {
        self.tools = tools.iter().map(WireTool::from).collect();
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireMessage {
    pub role: WireRole,
    pub content: Vec<ContentPart>,
}

/// One content block inside a wire message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text {
        text: String,
    },
    Image {
        source: MediaSource,
    },
    Document {
        source: MediaSource,
    },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        is_error: bool,
    },
}

/// A base64 media payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaSource {
    #[serde(rename = "type")]
    pub kind: String,
    pub media_type: String,
    pub data: String,
}

impl MediaSource {
    pub fn base64(media_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            kind: "base64".into(),
            media_type: media_type.into(),
            data: data.into(),
        }
    }
}

/// A system prompt segment with a prompt-cache hint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemBlock {
    #[serde(rename = "type")]
    pub kind: String,
    pub text: String,
    pub cache_control: CacheControl,
}

impl SystemBlock {
    pub fn cached_text(text: impl Into<String>) -> Self {
        Self {
            kind: "text".into(),
            text: text.into(),
            cache_control: CacheControl::ephemeral(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheControl {
    #[serde(rename = "type")]
    pub kind: String,
}

impl CacheControl {
    pub fn ephemeral() -> Self {
        Self {
            kind: "ephemeral".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireTool {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

impl From<&ToolDefinition> for WireTool {
    fn from(t: &ToolDefinition) -> Self {
        Self {
            name: t.name.clone(),
            description: t.description.clone(),
            input_schema: t.parameters.clone(),
        }
    }
}
