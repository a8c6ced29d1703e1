//! Data types shared by the monitor, the evaluator and the daemon.
//! `SystemMetrics` is also serialized into webhook payloads, so keep field names stable.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::AgentError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemMetrics {
    // percentages are rounded to whole numbers (0..=100)
    pub memory_percent: u8,
    pub disk_percent: u8,
    pub cpu_percent: u8,
    pub process_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BreachKind {
    Memory,
    Disk,
    Cpu,
    // accepted in config, never produced by the evaluator yet
    Process,
}

impl BreachKind {
    pub fn as_str(self) -> &'static str {
        match self {
            BreachKind::Memory => "memory",
            BreachKind::Disk => "disk",
            BreachKind::Cpu => "cpu",
            BreachKind::Process => "process",
        }
    }
}

impl fmt::Display for BreachKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThresholdBreach {
    #[serde(rename = "type")]
    pub kind: BreachKind,
    pub current_value: u8,
    pub threshold_value: u8,
    pub timestamp: DateTime<Utc>,
}

/// One message from a diagnostic session.
///
/// The payload is opaque to the daemon: it is forwarded to the webhook as-is.
/// Only `type` (always present) and `session_id` (optional) are ever inspected.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct AgentMessage(Map<String, Value>);

impl AgentMessage {
    pub const RESULT: &'static str = "result";

    pub fn from_value(value: Value) -> Result<Self, AgentError> {
        match value {
            Value::Object(map) => match map.get("type") {
                Some(Value::String(_)) => Ok(AgentMessage(map)),
                _ => Err(AgentError::Malformed(
                    "message has no string \"type\" field".into(),
                )),
            },
            other => Err(AgentError::Malformed(format!(
                "expected a JSON object, got {other}"
            ))),
        }
    }

    pub fn from_line(line: &str) -> Result<Self, AgentError> {
        let value: Value =
            serde_json::from_str(line).map_err(|e| AgentError::Malformed(e.to_string()))?;
        Self::from_value(value)
    }

    pub fn kind(&self) -> &str {
        self.0.get("type").and_then(Value::as_str).unwrap_or_default()
    }

    pub fn session_id(&self) -> Option<&str> {
        self.0.get("session_id").and_then(Value::as_str)
    }

    pub fn is_result(&self) -> bool {
        self.kind() == Self::RESULT
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }
}
