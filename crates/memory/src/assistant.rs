//! File-backed assistant memory.
//!
//! Storage location: `<storage_dir>/zaibridge.<entry_id>.json`
//!
//! The document is loaded once and written back, pretty-printed, on every
//! mutation. A missing or unreadable file starts an empty memory.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use zaibridge_core::error::MemoryError;
use zaibridge_core::preamble::PreambleSource;

use crate::document::{ContextValue, MemoryDocument, Note, Preference, UsageStats};

const PREFERENCES_IN_PROMPT: usize = 10;
const NOTES_IN_PROMPT: usize = 5;

pub struct AssistantMemory {
    entry_id: String,
    path: PathBuf,
    doc: Arc<RwLock<MemoryDocument>>,
}

impl AssistantMemory {
    /// Open the memory for `entry_id`, loading it from `storage_dir`.
    pub async fn open(storage_dir: impl AsRef<Path>, entry_id: impl Into<String>) -> Self {
        let entry_id = entry_id.into();
        let path = Self::document_path(storage_dir.as_ref(), &entry_id);
        let doc = Self::load(&path).await;
        debug!(path = %path.display(), entry_id = %entry_id, "Assistant memory loaded");
        Self {
            entry_id,
            path,
            doc: Arc::new(RwLock::new(doc)),
        }
    }

    pub fn document_path(storage_dir: &Path, entry_id: &str) -> PathBuf {
        storage_dir.join(format!("zaibridge.{entry_id}.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn entry_id(&self) -> &str {
        &self.entry_id
    }

    async fn load(path: &Path) -> MemoryDocument {
        match Self::read_document(path).await {
            Ok(doc) => doc,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Memory file unusable, starting empty");
                MemoryDocument::default()
            }
        }
    }

    /// Read a stored document. A missing file is an empty document.
    pub async fn read_document(path: &Path) -> Result<MemoryDocument, MemoryError> {
        let raw = match tokio::fs::read_to_string(path).await {
            Ok(raw) => raw,
            // Not written yet
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(MemoryDocument::default()),
            Err(e) => {
                return Err(MemoryError::Storage(format!(
                    "Failed to read {}: {e}",
                    path.display()
                )));
            }
        };

        serde_json::from_str(&raw)
            .map_err(|e| MemoryError::Corrupt(format!("{}: {e}", path.display())))
    }

    /// Write the document to disk.
    pub async fn save(&self) -> Result<(), MemoryError> {
        let doc = self.doc.read().await;
        let content = serde_json::to_string_pretty(&*doc)
            .map_err(|e| MemoryError::Storage(format!("Failed to serialize memory: {e}")))?;
        drop(doc);

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                MemoryError::Storage(format!("Failed to create memory directory: {e}"))
            })?;
        }
        tokio::fs::write(&self.path, content)
            .await
            .map_err(|e| MemoryError::Storage(format!("Failed to write memory file: {e}")))?;

        debug!(entry_id = %self.entry_id, "Saved assistant memory");
        Ok(())
    }

    /// A copy of the whole document.
    pub async fn snapshot(&self) -> MemoryDocument {
        self.doc.read().await.clone()
    }

    // ── Preferences ──

    /// Add a preference unless one with the same text (ignoring case) exists.
    /// Returns whether it was added.
    pub async fn add_preference(
        &self,
        text: &str,
        category: Option<&str>,
    ) -> Result<bool, MemoryError> {
        let wanted = text.to_lowercase();
        {
            let mut doc = self.doc.write().await;
            if doc.preferences.iter().any(|p| p.text.to_lowercase() == wanted) {
                return Ok(false);
            }
            doc.preferences.push(Preference {
                text: text.to_string(),
                category: category.unwrap_or("general").to_string(),
                added: Utc::now(),
            });
        }
        self.save().await?;
        info!(preference = %text, "Added preference");
        Ok(true)
    }

    /// Remove every preference containing `fragment` (ignoring case).
    pub async fn remove_preference(&self, fragment: &str) -> Result<bool, MemoryError> {
        let needle = fragment.to_lowercase();
        let removed = {
            let mut doc = self.doc.write().await;
            let before = doc.preferences.len();
            doc.preferences
                .retain(|p| !p.text.to_lowercase().contains(&needle));
            doc.preferences.len() < before
        };
        if removed {
            self.save().await?;
        }
        Ok(removed)
    }

    pub async fn preferences(&self) -> Vec<Preference> {
        self.doc.read().await.preferences.clone()
    }

    // ── Notes ──

    pub async fn add_note(&self, text: &str, tags: Vec<String>) -> Result<(), MemoryError> {
        self.doc.write().await.notes.push(Note {
            text: text.to_string(),
            tags,
            added: Utc::now(),
        });
        self.save().await?;
        info!(note = %text, "Added note");
        Ok(())
    }

    /// Remove every note containing `fragment` (ignoring case).
    pub async fn remove_note(&self, fragment: &str) -> Result<bool, MemoryError> {
        let needle = fragment.to_lowercase();
        let removed = {
            let mut doc = self.doc.write().await;
            let before = doc.notes.len();
            doc.notes.retain(|n| !n.text.to_lowercase().contains(&needle));
            doc.notes.len() < before
        };
        if removed {
            self.save().await?;
        }
        Ok(removed)
    }

    pub async fn notes(&self) -> Vec<Note> {
        self.doc.read().await.notes.clone()
    }

    // ── Context ──

    pub async fn set_context(
        &self,
        key: &str,
        value: impl Into<serde_json::Value>,
    ) -> Result<(), MemoryError> {
        self.doc.write().await.context.insert(
            key.to_string(),
            ContextValue {
                value: value.into(),
                updated: Utc::now(),
            },
        );
        self.save().await
    }

    pub async fn context(&self, key: &str) -> Option<serde_json::Value> {
        self.doc
            .read()
            .await
            .context
            .get(key)
            .map(|c| c.value.clone())
    }

    pub async fn all_context(&self) -> Vec<(String, serde_json::Value)> {
        self.doc
            .read()
            .await
            .context
            .iter()
            .map(|(k, v)| (k.clone(), v.value.clone()))
            .collect()
    }

    // ── Stats ──

    pub async fn record_interaction(&self, command: Option<&str>) -> Result<(), MemoryError> {
        self.doc.write().await.stats.record(command, Utc::now());
        self.save().await
    }

    pub async fn stats(&self) -> UsageStats {
        self.doc.read().await.stats.clone()
    }

    /// Render the memory as a prompt section. Empty when nothing is stored.
    pub async fn build_memory_prompt(&self) -> String {
        render_prompt(&*self.doc.read().await)
    }

    // ── Cleanup ──

    pub async fn clear(&self) -> Result<(), MemoryError> {
        *self.doc.write().await = MemoryDocument::default();
        self.save().await?;
        info!(entry_id = %self.entry_id, "Cleared assistant memory");
        Ok(())
    }

    /// Delete the document file. The in-memory copy is left untouched.
    pub async fn delete_storage(&self) -> Result<(), MemoryError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                info!(entry_id = %self.entry_id, "Deleted assistant memory storage");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(MemoryError::Storage(format!(
                "Failed to delete memory file: {e}"
            ))),
        }
    }
}

#[async_trait]
impl PreambleSource for AssistantMemory {
    async fn segments(&self) -> Vec<String> {
        let prompt = self.build_memory_prompt().await;
        if prompt.is_empty() {
            Vec::new()
        } else {
            vec![prompt]
        }
    }
}

fn render_prompt(doc: &MemoryDocument) -> String {
    let mut sections = Vec::new();

    if !doc.context.is_empty() {
        let mut lines = vec!["### User Info".to_string()];
        for (key, entry) in &doc.context {
            lines.push(format!("- {}: {}", readable_key(key), display_value(&entry.value)));
        }
        sections.push(lines.join("\n"));
    }

    if !doc.preferences.is_empty() {
        let mut lines = vec!["### User Preferences".to_string()];
        let skip = doc.preferences.len().saturating_sub(PREFERENCES_IN_PROMPT);
        lines.extend(doc.preferences.iter().skip(skip).map(|p| format!("- {}", p.text)));
        sections.push(lines.join("\n"));
    }

    if !doc.notes.is_empty() {
        let mut lines = vec!["### Notes to Remember".to_string()];
        let skip = doc.notes.len().saturating_sub(NOTES_IN_PROMPT);
        lines.extend(doc.notes.iter().skip(skip).map(|n| format!("- {}", n.text)));
        sections.push(lines.join("\n"));
    }

    if doc.stats.total_interactions > 0 {
        let mut lines = vec![
            "### Statistics".to_string(),
            format!("- Total interactions: {}", doc.stats.total_interactions),
        ];
        if let Some(last) = doc.stats.last_interaction {
            lines.push(format!(
                "- Last interaction: {}",
                last.format("%d/%m/%Y %H:%M")
            ));
        }
        sections.push(lines.join("\n"));
    }

    sections.join("\n\n")
}

/// `wake_time` → `Wake Time`
fn readable_key(key: &str) -> String {
    key.split('_')
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

fn display_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
