//! Preamble sources: opaque system-prompt segments.
//!
//! Memory, device context, and user-configured prompts all reach the model
//! the same way: as text segments prepended to the system prompt. The core
//! does not look inside them.

use async_trait::async_trait;

#[async_trait]
pub trait PreambleSource: Send + Sync {
    /// Zero or more segments, in the order they should appear.
    async fn segments(&self) -> Vec<String>;
}

/// A fixed list of segments (configured prompt, context files).
#[derive(Debug, Clone, Default)]
pub struct StaticPreamble {
    segments: Vec<String>,
}

impl StaticPreamble {
    pub fn new(segments: Vec<String>) -> Self {
        Self { segments }
    }

    pub fn single(segment: impl Into<String>) -> Self {
        Self {
            segments: vec![segment.into()],
        }
    }
}

#[async_trait]
impl PreambleSource for StaticPreamble {
    async fn segments(&self) -> Vec<String> {
        self.segments
            .iter()
            .filter(|s| !s.trim().is_empty())
            .cloned()
            .collect()
    }
}

/// Collect segments from several sources in order.
pub async fn collect_segments(sources: &[&dyn PreambleSource]) -> Vec<String> {
    let mut out = Vec::new();
    for source in sources {
        out.extend(source.segments().await);
    }
    out
}
