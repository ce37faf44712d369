use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

/// A monitored device on the portal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    pub id: String,
    pub label: String,
}

impl Device {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
        }
    }
}

/// Telemetry response of the portal's AJAX endpoint. `para`, `last` and
/// `unit` are parallel arrays, index i describing one parameter.
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryPayload {
    pub para: Vec<String>,
    pub last: Vec<Value>,
    pub unit: Vec<Value>,
    #[serde(default)]
    pub key: Option<Vec<Value>>,
}

impl TelemetryPayload {
    pub fn len(&self) -> usize {
        self.para.len()
    }

    /// Current value at `index` as text. Strings are taken verbatim, numbers
    /// keep their JSON rendering and null is empty.
    pub fn value_at(&self, index: usize) -> Option<String> {
        self.last.get(index).map(value_text)
    }

    pub fn unit_at(&self, index: usize) -> String {
        self.unit.get(index).map(value_text).unwrap_or_default()
    }
}

pub fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// One extracted reading for one device in one cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceReading {
    pub device: Device,
    pub parameter: String,
    pub value: String,
    pub unit: String,
    pub taken_at: DateTime<Utc>,
}

impl DeviceReading {
    /// Blank values count as absent; "0" is a real reading.
    pub fn is_present(&self) -> bool {
        !self.value.trim().is_empty()
    }
}

/// Outcome of one poll-both-devices-then-publish pass.
#[derive(Debug, Clone)]
pub struct CycleResult {
    pub success: bool,
    pub mill_1: Option<DeviceReading>,
    pub mill_2: Option<DeviceReading>,
    pub published: bool,
}

impl CycleResult {
    pub fn failed(mill_1: Option<DeviceReading>, mill_2: Option<DeviceReading>) -> Self {
        Self {
            success: false,
            mill_1,
            mill_2,
            published: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_parses_optional_key() {
        let payload: TelemetryPayload = serde_json::from_str(
            r#"{"para":["Temp","Hum"],"last":["23",55.5],"unit":["C",null]}"#,
        )
        .unwrap();

        assert_eq!(payload.len(), 2);
        assert!(payload.key.is_none());
        assert_eq!(payload.value_at(0).as_deref(), Some("23"));
        assert_eq!(payload.value_at(1).as_deref(), Some("55.5"));
        assert_eq!(payload.value_at(2), None);
        assert_eq!(payload.unit_at(1), "");
    }

    #[test]
    fn test_zero_reading_is_present() {
        let reading = DeviceReading {
            device: Device::new("1", "MILL_1"),
            parameter: "SPM".to_string(),
            value: "0".to_string(),
            unit: "ug/m3".to_string(),
            taken_at: Utc::now(),
        };
        assert!(reading.is_present());

        let blank = DeviceReading {
            value: "  ".to_string(),
            ..reading
        };
        assert!(!blank.is_present());
    }
}
