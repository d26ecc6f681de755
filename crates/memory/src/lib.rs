//! Persistent assistant memory for zaibridge.
//!
//! One JSON document per configuration entry holds user preferences, notes,
//! context values and usage statistics. The memory renders itself into a
//! system preamble segment so the model sees what it was asked to remember.

pub mod assistant;
pub mod document;

pub use assistant::AssistantMemory;
pub use document::{ContextValue, MemoryDocument, Note, Preference, UsageStats};
