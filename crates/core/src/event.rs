//! Domain event system: observability without coupling.
//!
//! The tool loop publishes events when something interesting happens.
//! Subscribers (loggers, usage trackers, UIs) react without the loop knowing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// One provider round-trip finished decoding
    ResponseGenerated {
        dialogue_id: String,
        model: String,
        iteration: u32,
        input_tokens: u32,
        output_tokens: u32,
        tool_calls: usize,
        timestamp: DateTime<Utc>,
    },

    /// A tool call was dropped because its arguments were not valid JSON
    ToolCallDiscarded {
        dialogue_id: String,
        tool_id: String,
        tool_name: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// A tool loop run reached a terminal status
    ToolLoopFinished {
        dialogue_id: String,
        status: String,
        iterations: u32,
        timestamp: DateTime<Utc>,
    },

    /// An error aborted a run
    ErrorOccurred {
        context: String,
        error_message: String,
        timestamp: DateTime<Utc>,
    },
}

/// A broadcast-based event bus for domain events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: DomainEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
