//! Current date and time.

use async_trait::async_trait;
use chrono::{DateTime, Local, TimeZone, Utc};
use serde::Serialize;
use zaibridge_core::dialogue::ToolOutput;
use zaibridge_core::error::ToolError;

use crate::registry::Tool;

pub struct GetTimeTool;

#[derive(Debug, Serialize)]
struct TimeReport {
    iso: String,
    date: String,
    time: String,
    weekday: String,
    timezone: String,
}

impl TimeReport {
    fn at<Tz: TimeZone>(now: DateTime<Tz>, timezone: &str) -> Self
    where
        Tz::Offset: std::fmt::Display,
    {
        Self {
            iso: now.to_rfc3339(),
            date: now.format("%Y-%m-%d").to_string(),
            time: now.format("%H:%M").to_string(),
            weekday: now.format("%A").to_string(),
            timezone: timezone.to_string(),
        }
    }
}

#[async_trait]
impl Tool for GetTimeTool {
    fn name(&self) -> &str {
        "get_time"
    }

    fn description(&self) -> &str {
        "Get the current date, time and weekday. Local time unless `utc` is true."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "utc": {
                    "type": "boolean",
                    "description": "Report UTC instead of local time",
                    "default": false
                }
            }
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let utc = match arguments.get("utc") {
            None | Some(serde_json::Value::Null) => false,
            Some(v) => v
                .as_bool()
                .ok_or_else(|| ToolError::InvalidArguments("'utc' must be a boolean".into()))?,
        };

        let report = if utc {
            TimeReport::at(Utc::now(), "UTC")
        } else {
            let now = Local::now();
            let offset = now.offset().to_string();
            TimeReport::at(now, &offset)
        };

        serde_json::to_value(report)
            .map(ToolOutput::Structured)
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: "get_time".into(),
                reason: e.to_string(),
            })
    }
}
