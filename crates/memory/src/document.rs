//! The on-disk memory document.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DOCUMENT_VERSION: u32 = 1;

/// Commands tracked in [`UsageStats::frequent_commands`].
pub const MAX_FREQUENT_COMMANDS: usize = 20;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preference {
    pub text: String,
    #[serde(default = "default_category")]
    pub category: String,
    pub added: DateTime<Utc>,
}

fn default_category() -> String {
    "general".into()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub text: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub added: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextValue {
    pub value: serde_json::Value,
    pub updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageStats {
    #[serde(default)]
    pub total_interactions: u64,
    #[serde(default)]
    pub last_interaction: Option<DateTime<Utc>>,
    #[serde(default)]
    pub frequent_commands: BTreeMap<String, u64>,
}

impl UsageStats {
    /// Count one interaction, optionally attributing it to a command.
    pub fn record(&mut self, command: Option<&str>, at: DateTime<Utc>) {
        self.total_interactions += 1;
        self.last_interaction = Some(at);

        let Some(command) = command else {
            return;
        };
        *self
            .frequent_commands
            .entry(command.to_lowercase())
            .or_insert(0) += 1;

        if self.frequent_commands.len() > MAX_FREQUENT_COMMANDS {
            let mut ranked: Vec<_> = std::mem::take(&mut self.frequent_commands)
                .into_iter()
                .collect();
            // Stable sort keeps alphabetical order among equal counts
            ranked.sort_by(|a, b| b.1.cmp(&a.1));
            ranked.truncate(MAX_FREQUENT_COMMANDS);
            self.frequent_commands = ranked.into_iter().collect();
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryDocument {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub preferences: Vec<Preference>,
    #[serde(default)]
    pub notes: Vec<Note>,
    /// Kept for forward compatibility; nothing writes routines yet
    #[serde(default)]
    pub routines: Vec<serde_json::Value>,
    #[serde(default)]
    pub context: BTreeMap<String, ContextValue>,
    #[serde(default)]
    pub stats: UsageStats,
}

fn default_version() -> u32 {
    DOCUMENT_VERSION
}

impl Default for MemoryDocument {
    fn default() -> Self {
        Self {
            version: DOCUMENT_VERSION,
            preferences: Vec::new(),
            notes: Vec::new(),
            routines: Vec::new(),
            context: BTreeMap::new(),
            stats: UsageStats::default(),
        }
    }
}

impl MemoryDocument {
    pub fn is_empty(&self) -> bool {
        self.preferences.is_empty()
            && self.notes.is_empty()
            && self.context.is_empty()
            && self.stats.total_interactions == 0
    }
}
