//! Streaming LLM provider implementations for zaibridge.
//!
//! All providers implement the `zaibridge_core::Provider` trait and emit
//! normalized `StreamEvent`s; reassembly happens in the agent crate.

pub mod anthropic;

pub use anthropic::AnthropicProvider;
