//! Device inventory snapshots.
//!
//! A snapshot is a JSON document exported by the home automation system:
//!
//! ```json
//! {
//!   "areas": [{ "id": "kitchen", "name": "Kitchen" }],
//!   "devices": [{ "id": "hub1", "area_id": "kitchen" }],
//!   "entities": [
//!     { "entity_id": "light.kitchen", "state": "on", "area_id": "kitchen",
//!       "attributes": { "friendly_name": "Kitchen Light", "brightness": 128 } }
//!   ]
//! }
//! ```
//!
//! An entity without its own area inherits the area of its device.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Domains that say nothing useful about controllable devices.
pub const SKIP_DOMAINS: &[&str] = &[
    "persistent_notification",
    "update",
    "tts",
    "stt",
    "conversation",
    "zone",
    "sun",
    "calendar",
];

#[derive(Debug, Error)]
pub enum InventoryError {
    #[error("Failed to read device snapshot {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("Invalid device snapshot {path}: {reason}")]
    Parse { path: String, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Area {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub id: String,
    #[serde(default)]
    pub area_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// `<domain>.<object_id>`, e.g. `light.kitchen`
    pub entity_id: String,

    pub state: String,

    #[serde(default)]
    pub area_id: Option<String>,

    #[serde(default)]
    pub device_id: Option<String>,

    #[serde(default)]
    pub attributes: serde_json::Map<String, serde_json::Value>,
}

impl Entity {
    pub fn domain(&self) -> &str {
        self.entity_id
            .split_once('.')
            .map_or(self.entity_id.as_str(), |(domain, _)| domain)
    }

    /// `friendly_name`, falling back to the entity id.
    pub fn name(&self) -> &str {
        self.attributes
            .get("friendly_name")
            .and_then(|v| v.as_str())
            .unwrap_or(&self.entity_id)
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self.state.as_str(), "unavailable" | "unknown")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceInventory {
    #[serde(default)]
    pub areas: Vec<Area>,

    #[serde(default)]
    pub devices: Vec<Device>,

    #[serde(default)]
    pub entities: Vec<Entity>,
}

impl DeviceInventory {
    pub async fn load(path: &Path) -> Result<Self, InventoryError> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| InventoryError::Read {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
        Self::from_json(&raw).map_err(|e| match e {
            InventoryError::Parse { reason, .. } => InventoryError::Parse {
                path: path.display().to_string(),
                reason,
            },
            other => other,
        })
    }

    pub fn from_json(raw: &str) -> Result<Self, InventoryError> {
        serde_json::from_str(raw).map_err(|e| InventoryError::Parse {
            path: "<inline>".into(),
            reason: e.to_string(),
        })
    }

    /// Area id of an entity: its own, or its device's.
    pub fn area_of<'a>(&'a self, entity: &'a Entity) -> Option<&'a str> {
        if let Some(area) = entity.area_id.as_deref() {
            return Some(area);
        }
        let device_id = entity.device_id.as_deref()?;
        self.devices
            .iter()
            .find(|d| d.id == device_id)
            .and_then(|d| d.area_id.as_deref())
    }

    /// Area names keyed by id.
    pub fn area_names(&self) -> HashMap<&str, &str> {
        self.areas
            .iter()
            .map(|a| (a.id.as_str(), a.name.as_str()))
            .collect()
    }

    /// Domains in use, excluding the skipped ones.
    pub fn domains(&self) -> Vec<String> {
        self.entities
            .iter()
            .map(Entity::domain)
            .filter(|d| !SKIP_DOMAINS.contains(d))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .map(str::to_string)
            .collect()
    }
}
