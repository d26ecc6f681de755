//! Device context rendering.
//!
//! Entities are grouped by area (sorted by area name), then by domain, then
//! by friendly name. Entities without a known area go into a trailing
//! "Other (no area)" section. Only attributes that matter for the entity's
//! domain are kept, and states are spelled out for the model.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};
use zaibridge_core::preamble::PreambleSource;

use crate::inventory::{DeviceInventory, Entity, InventoryError, SKIP_DOMAINS};

const NO_AREA_HEADING: &str = "## Other (no area)";
const MAX_LIST_ITEMS: usize = 5;

/// Attributes worth showing, per domain. Unlisted domains show none.
fn relevant_attributes(domain: &str) -> &'static [&'static str] {
    match domain {
        "light" => &["brightness", "color_temp", "rgb_color", "color_mode", "effect"],
        "climate" => &[
            "temperature",
            "current_temperature",
            "target_temperature",
            "hvac_modes",
            "hvac_action",
            "preset_mode",
            "preset_modes",
            "humidity",
            "current_humidity",
            "fan_mode",
        ],
        "cover" => &["current_position", "current_tilt_position"],
        "fan" => &["percentage", "preset_mode", "direction", "oscillating"],
        "media_player" => &[
            "volume_level",
            "is_volume_muted",
            "media_content_type",
            "media_title",
            "media_artist",
            "source",
            "source_list",
        ],
        "vacuum" => &["battery_level", "fan_speed"],
        "sensor" => &["unit_of_measurement", "device_class", "state_class"],
        "binary_sensor" => &["device_class"],
        "weather" => &[
            "temperature",
            "humidity",
            "pressure",
            "wind_speed",
            "wind_bearing",
            "forecast",
        ],
        "person" => &["source"],
        "device_tracker" => &["source_type", "battery_level"],
        "alarm_control_panel" => &["code_arm_required", "changed_by"],
        "camera" => &["is_streaming", "is_recording"],
        "humidifier" => &["humidity", "mode", "available_modes"],
        "water_heater" => &["temperature", "current_temperature", "operation_mode"],
        "automation" => &["last_triggered"],
        "input_number" => &["min", "max", "step", "mode"],
        "input_select" | "select" => &["options"],
        "input_text" | "text" => &["min", "max", "pattern", "mode"],
        "timer" => &["duration", "remaining"],
        "number" => &["min", "max", "step", "mode", "unit_of_measurement"],
        _ => &[],
    }
}

/// Human-readable state for a domain.
pub fn translate_state(domain: &str, state: &str) -> String {
    let translated = match (domain, state) {
        ("climate", "heat") => "HEATING",
        ("climate", "cool") => "COOLING",
        ("climate", "heat_cool") => "AUTO",
        ("climate", "auto") => "AUTOMATIC",
        ("climate", "dry") => "DRYING",
        ("climate", "fan_only") => "FAN ONLY",
        ("binary_sensor", "on") => "ACTIVE",
        ("binary_sensor", "off") => "INACTIVE",
        ("person", "home") => "HOME",
        ("person", "not_home") => "AWAY",
        ("person", "unavailable") => "UNKNOWN",
        ("alarm_control_panel", "armed_home") => "ARMED HOME",
        ("alarm_control_panel", "armed_away") => "ARMED AWAY",
        ("alarm_control_panel", "armed_night") => "ARMED NIGHT",
        _ => return state.to_uppercase(),
    };
    translated.to_string()
}

/// Which entities to include.
#[derive(Debug, Clone, Default)]
pub struct DeviceFilter {
    /// Area ids to keep; empty keeps every area.
    pub areas: Vec<String>,

    /// Domains to keep; empty keeps every domain.
    pub domains: Vec<String>,

    /// Keep entities whose state is `unavailable` or `unknown`.
    pub include_unavailable: bool,
}

impl DeviceFilter {
    fn keeps_domain(&self, domain: &str) -> bool {
        !SKIP_DOMAINS.contains(&domain)
            && (self.domains.is_empty() || self.domains.iter().any(|d| d == domain))
    }

    fn keeps_area(&self, area_id: Option<&str>) -> bool {
        self.areas.is_empty() || area_id.is_some_and(|a| self.areas.iter().any(|f| f == a))
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn percent(value: &Value, scale: f64) -> Option<i64> {
    value.as_f64().map(|v| (v * scale).round() as i64)
}

fn format_attribute(domain: &str, key: &str, value: &Value, entity: &Entity) -> Option<String> {
    let formatted = match key {
        "brightness" => percent(value, 100.0 / 255.0).map(|p| format!("brightness: {p}%")),
        "color_temp" => Some(format!("color temperature: {}K", display_value(value))),
        "volume_level" => percent(value, 100.0).map(|p| format!("volume: {p}%")),
        "temperature" | "current_temperature" => {
            let unit = entity
                .attributes
                .get("unit_of_measurement")
                .and_then(Value::as_str)
                .unwrap_or("°C");
            Some(format!("temperature: {}{unit}", display_value(value)))
        }
        "humidity" | "current_humidity" => Some(format!("humidity: {}%", display_value(value))),
        "current_position" => Some(format!("position: {}%", display_value(value))),
        "battery_level" => Some(format!("battery: {}%", display_value(value))),
        "percentage" => Some(format!("speed: {}%", display_value(value))),
        // Sensor units are shown with the state
        "unit_of_measurement" if domain == "sensor" => return None,
        _ => None,
    };

    formatted.or_else(|| {
        Some(match value {
            Value::Array(items) => {
                let shown: Vec<String> = items.iter().take(MAX_LIST_ITEMS).map(display_value).collect();
                format!("{key}: {}", shown.join(", "))
            }
            Value::Bool(b) => format!("{key}: {}", if *b { "yes" } else { "no" }),
            other => format!("{key}: {}", display_value(other)),
        })
    })
}

fn format_attributes(entity: &Entity) -> String {
    let domain = entity.domain();
    relevant_attributes(domain)
        .iter()
        .filter_map(|key| {
            let value = entity.attributes.get(*key)?;
            if value.is_null() {
                return None;
            }
            format_attribute(domain, key, value, entity)
        })
        .collect::<Vec<_>>()
        .join(", ")
}

struct Line<'a> {
    domain: &'a str,
    name: &'a str,
    text: String,
}

fn describe(entity: &Entity) -> String {
    let domain = entity.domain();
    let state = match entity.attributes.get("unit_of_measurement").and_then(Value::as_str) {
        Some(unit) if domain == "sensor" => format!("{} {unit}", entity.state),
        _ => translate_state(domain, &entity.state),
    };

    let mut line = format!("- {} ({}): {state}", entity.name(), entity.entity_id);
    let attributes = format_attributes(entity);
    if !attributes.is_empty() {
        line.push_str(&format!(" [{attributes}]"));
    }
    line
}

/// Render the inventory as area sections. Empty when nothing passes the filter.
pub fn render(inventory: &DeviceInventory, filter: &DeviceFilter) -> String {
    let area_names = inventory.area_names();
    let mut by_area: BTreeMap<&str, Vec<Line<'_>>> = BTreeMap::new();
    let mut no_area: Vec<Line<'_>> = Vec::new();

    for entity in &inventory.entities {
        let domain = entity.domain();
        if !filter.keeps_domain(domain) {
            continue;
        }
        if !filter.include_unavailable && entity.is_unavailable() {
            continue;
        }
        let area_id = inventory.area_of(entity);
        if !filter.keeps_area(area_id) {
            continue;
        }

        let line = Line {
            domain,
            name: entity.name(),
            text: describe(entity),
        };
        match area_id.and_then(|id| area_names.get(id).copied()) {
            Some(area_name) => by_area.entry(area_name).or_default().push(line),
            None => no_area.push(line),
        }
    }

    let mut out: Vec<String> = Vec::new();
    for (area_name, mut lines) in by_area {
        lines.sort_by(|a, b| a.domain.cmp(b.domain).then_with(|| a.name.cmp(b.name)));
        out.push(format!("## {area_name}"));
        out.extend(lines.into_iter().map(|l| l.text));
    }
    if !no_area.is_empty() {
        no_area.sort_by(|a, b| a.name.cmp(b.name));
        out.push(NO_AREA_HEADING.to_string());
        out.extend(no_area.into_iter().map(|l| l.text));
    }

    debug!(lines = out.len(), "Rendered device context");
    out.join("\n")
}

/// A snapshot file rendered as a preamble segment.
///
/// The file is re-read for every request so the model always sees the
/// latest exported state.
pub struct DeviceContext {
    path: PathBuf,
    filter: DeviceFilter,
}

impl DeviceContext {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            filter: DeviceFilter::default(),
        }
    }

    pub fn with_filter(mut self, filter: DeviceFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn build(&self) -> Result<String, InventoryError> {
        let inventory = DeviceInventory::load(&self.path).await?;
        Ok(render(&inventory, &self.filter))
    }
}

#[async_trait]
impl PreambleSource for DeviceContext {
    async fn segments(&self) -> Vec<String> {
        match self.build().await {
            Ok(text) if text.is_empty() => Vec::new(),
            Ok(text) => vec![format!("# Home devices\n\n{text}")],
            Err(e) => {
                warn!(error = %e, "Device context unavailable");
                Vec::new()
            }
        }
    }
}
