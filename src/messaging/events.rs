/// Detection events
///
/// The unit of delivery to consumers. Events are immutable once constructed and
/// serialize to a stable wire schema:
///
/// ```json
/// {
///   "id": "9b2f...",
///   "type": "pot",
///   "severity": "info",
///   "message": "Pot changed to 125.50",
///   "data": { "pot": 125.5 },
///   "correlation_id": "41c0...",
///   "timestamp": "2024-05-01T12:00:00.123Z"
/// }
/// ```
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Pot,
    Card,
    Player,
    Action,
    Button,
    Blind,
    StateChange,
    HandStart,
    HandEnd,
    StreetChange,
    System,
    Error,
    Warning,
    Info,
    Performance,
}

impl EventType {
    /// Diffable types are only emitted when the underlying value changed
    pub fn is_diffable(&self) -> bool {
        !matches!(
            self,
            EventType::System
                | EventType::Error
                | EventType::Warning
                | EventType::Info
                | EventType::Performance
                | EventType::HandStart
                | EventType::HandEnd
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            EventType::Pot => "pot",
            EventType::Card => "card",
            EventType::Player => "player",
            EventType::Action => "action",
            EventType::Button => "button",
            EventType::Blind => "blind",
            EventType::StateChange => "state_change",
            EventType::HandStart => "hand_start",
            EventType::HandEnd => "hand_end",
            EventType::StreetChange => "street_change",
            EventType::System => "system",
            EventType::Error => "error",
            EventType::Warning => "warning",
            EventType::Info => "info",
            EventType::Performance => "performance",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Debug,
    Info,
    Success,
    Warning,
    Error,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub severity: Severity,
    pub message: String,
    #[serde(default)]
    pub data: Map<String, Value>,
    pub correlation_id: String,
    pub timestamp: DateTime<Utc>,
}

impl DetectionEvent {
    pub fn new(
        event_type: EventType,
        severity: Severity,
        message: impl Into<String>,
        correlation_id: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            event_type,
            severity,
            message: message.into(),
            data: Map::new(),
            correlation_id: correlation_id.into(),
            timestamp: Utc::now(),
        }
    }

    /// Attach a data field; values that fail to serialize become `null`
    pub fn with_data(mut self, key: &str, value: impl Serialize) -> Self {
        let value = serde_json::to_value(value).unwrap_or(Value::Null);
        self.data.insert(key.to_string(), value);
        self
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

impl fmt::Display for DetectionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.event_type, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_round_trip() {
        let event = DetectionEvent::new(EventType::Pot, Severity::Info, "Pot changed to 125.50", "corr-1")
            .with_data("pot", 125.5)
            .with_data("side_pots", vec![40.0, 12.5]);

        let json = event.to_json().unwrap();
        let back = DetectionEvent::from_json(&json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_wire_field_names() {
        let event = DetectionEvent::new(EventType::StreetChange, Severity::Warning, "msg", "corr")
            .with_data("street", "flop");
        let value = serde_json::to_value(&event).unwrap();

        assert_eq!(value["type"], json!("street_change"));
        assert_eq!(value["severity"], json!("warning"));
        assert_eq!(value["correlation_id"], json!("corr"));
        assert_eq!(value["data"]["street"], json!("flop"));
        assert!(value["timestamp"].is_string());
        assert!(value["id"].is_string());
        assert_eq!(value.as_object().map(|o| o.len()), Some(7));
    }

    #[test]
    fn test_diffable_types() {
        assert!(EventType::Pot.is_diffable());
        assert!(EventType::StreetChange.is_diffable());
        assert!(!EventType::System.is_diffable());
        assert!(!EventType::Error.is_diffable());
        assert!(!EventType::HandStart.is_diffable());
        assert!(!EventType::Performance.is_diffable());
    }

    #[test]
    fn test_severity_order() {
        assert!(Severity::Critical > Severity::Error);
        assert!(Severity::Debug < Severity::Info);
    }
}
