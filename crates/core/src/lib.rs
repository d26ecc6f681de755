//! # zaibridge core
//!
//! Domain types, traits, and error definitions for the zaibridge
//! conversation bridge. Every other crate in the workspace depends inward on
//! this one.
//!
//! ## Layout
//!
//! - [`dialogue`]: the append-only conversation model (`Turn` and friends)
//! - [`wire`]: the provider's Messages API request shape
//! - [`provider`]: the streaming provider trait and its event vocabulary
//! - [`tool`]: tool catalog entries and the caller-side `ToolResolver` seam
//! - [`preamble`]: opaque system-prompt segment sources
//! - [`event`]: domain events for observability

pub mod error;
pub mod dialogue;
pub mod wire;
pub mod provider;
pub mod tool;
pub mod preamble;
pub mod event;

// Re-export key types at crate root for ergonomics
pub use error::{Error, FailureKind, ProviderError, Result};
pub use dialogue::{
    AssistantTurn, Attachment, Dialogue, DialogueId, ToolCallRequest, ToolOutput, ToolResult,
    ToolResultTurn, Turn, UserTurn,
};
pub use wire::{ContentPart, SamplingParams, WireMessage, WireRequest, WireRole};
pub use provider::{BlockKind, EventStream, Fragment, Provider, StreamEvent, TokenUsage};
pub use tool::{NoTools, ToolDefinition, ToolResolver};
pub use preamble::{PreambleSource, StaticPreamble};
pub use event::{DomainEvent, EventBus};
