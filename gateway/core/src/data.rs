//! Device Data Records
//!
//! Telemetry and actuation records exchanged with field devices. These are
//! flat camelCase objects on the wire; unknown fields are ignored so that
//! devices can add fields without breaking the gateway. Identifying fields
//! (`typeId`, `locationId`, and the value or command) are required.

use std::fmt;

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};

/// Sensor type id for relative humidity readings
pub const HUMIDITY_SENSOR_TYPE: u32 = 1;
/// Sensor type id for speech recognition results
pub const SPEECH_SENSOR_TYPE: u32 = 10;
/// Actuator type id for the humidifier
pub const HUMIDIFIER_ACTUATOR_TYPE: u32 = 1;
/// Actuator type id for text-to-speech output
pub const TTS_ACTUATOR_TYPE: u32 = 10;

/// Name carried by humidifier commands
pub const HUMIDIFIER_ACTUATOR_NAME: &str = "HumidifierActuator";
/// Name carried by text-to-speech commands
pub const TTS_ACTUATOR_NAME: &str = "TextToSpeechActuator";
/// Name carried by system performance records
pub const SYSTEM_PERF_NAME: &str = "SystemPerfData";

/// Location id used when none is known
pub const NOT_SET: &str = "Not Set";

/// A sensor reading from a field device
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorData {
    /// Sensor name
    #[serde(default)]
    pub name: String,
    /// Sensor type id (see the `*_SENSOR_TYPE` constants)
    pub type_id: u32,
    /// Location the reading was taken at
    pub location_id: String,
    /// Measured value
    pub value: f32,
    /// Type-specific nested payload (e.g. a speech recognition result)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_data: Option<String>,
    /// RFC 3339 timestamp assigned by the device
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    /// Device-reported error flag
    #[serde(default)]
    pub error_flag: bool,
}

impl SensorData {
    /// Create a reading with the given type, location and value
    pub fn new(type_id: u32, location_id: impl Into<String>, value: f32) -> Self {
        Self {
            type_id,
            location_id: location_id.into(),
            value,
            ..Default::default()
        }
    }

    /// Set the sensor name
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the device timestamp
    #[must_use]
    pub fn with_timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = Some(timestamp.into());
        self
    }

    /// Set the nested state payload
    #[must_use]
    pub fn with_state_data(mut self, state_data: impl Into<String>) -> Self {
        self.state_data = Some(state_data.into());
        self
    }
}

/// Binary actuator command
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ActuatorCommand {
    /// Switch the actuator on
    On,
    /// Switch the actuator off
    #[default]
    Off,
}

impl ActuatorCommand {
    /// Wire label
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::On => "ON",
            Self::Off => "OFF",
        }
    }
}

impl fmt::Display for ActuatorCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ActuatorCommand {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

// Devices built against older firmware send the command as 1/0.
impl<'de> Deserialize<'de> for ActuatorCommand {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct CommandVisitor;

        impl Visitor<'_> for CommandVisitor {
            type Value = ActuatorCommand;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("\"ON\", \"OFF\", 1 or 0")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
                match v.trim().to_ascii_uppercase().as_str() {
                    "ON" | "1" => Ok(ActuatorCommand::On),
                    "OFF" | "0" => Ok(ActuatorCommand::Off),
                    other => Err(E::custom(format!("unknown actuator command: {other}"))),
                }
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
                match v {
                    1 => Ok(ActuatorCommand::On),
                    0 => Ok(ActuatorCommand::Off),
                    other => Err(E::custom(format!("unknown actuator command: {other}"))),
                }
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
                u64::try_from(v)
                    .map_err(|_| E::custom(format!("unknown actuator command: {v}")))
                    .and_then(|v| self.visit_u64(v))
            }
        }

        deserializer.deserialize_any(CommandVisitor)
    }
}

/// An actuation command or an actuator's response
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActuatorData {
    /// Actuator name
    #[serde(default)]
    pub name: String,
    /// Actuator type id (see the `*_ACTUATOR_TYPE` constants)
    pub type_id: u32,
    /// Location of the target actuator
    pub location_id: String,
    /// Command to apply
    pub command: ActuatorCommand,
    /// Target value (e.g. nominal humidity)
    #[serde(default)]
    pub value: f32,
    /// Free-form payload (e.g. text to speak)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_data: Option<String>,
    /// Device-reported error flag
    #[serde(default)]
    pub error_flag: bool,
}

impl ActuatorData {
    /// Humidifier command targeting the given nominal value
    pub fn humidifier(
        location_id: impl Into<String>,
        command: ActuatorCommand,
        nominal: f32,
    ) -> Self {
        Self {
            name: HUMIDIFIER_ACTUATOR_NAME.to_string(),
            type_id: HUMIDIFIER_ACTUATOR_TYPE,
            location_id: location_id.into(),
            command,
            value: nominal,
            ..Default::default()
        }
    }

    /// Text-to-speech command that speaks `text` at a location
    pub fn speak(location_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: TTS_ACTUATOR_NAME.to_string(),
            type_id: TTS_ACTUATOR_TYPE,
            location_id: location_id.into(),
            command: ActuatorCommand::On,
            state_data: Some(text.into()),
            ..Default::default()
        }
    }
}

/// Host utilisation telemetry
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemPerformanceData {
    /// Record name
    #[serde(default = "default_perf_name")]
    pub name: String,
    /// Location (host) the figures belong to
    #[serde(default = "default_location")]
    pub location_id: String,
    /// CPU utilisation in percent
    pub cpu_utilization: f32,
    /// Disk utilisation in percent
    pub disk_utilization: f32,
    /// Memory utilisation in percent
    pub mem_utilization: f32,
    /// RFC 3339 sampling time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

fn default_perf_name() -> String {
    SYSTEM_PERF_NAME.to_string()
}

fn default_location() -> String {
    NOT_SET.to_string()
}

impl Default for SystemPerformanceData {
    fn default() -> Self {
        Self {
            name: default_perf_name(),
            location_id: default_location(),
            cpu_utilization: 0.0,
            disk_utilization: 0.0,
            mem_utilization: 0.0,
            timestamp: None,
        }
    }
}

/// Speech recognition result nested in a speech sensor's `stateData`
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SpeechResult {
    /// Partial transcription so far
    pub partial: String,
    /// Best transcription
    pub result: String,
    /// Whether the recognizer considers the utterance finished
    pub is_complete: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_command_accepts_strings_and_numbers() {
        let on: ActuatorCommand = serde_json::from_str("\"on\"").unwrap();
        let off: ActuatorCommand = serde_json::from_str("0").unwrap();
        assert_eq!(on, ActuatorCommand::On);
        assert_eq!(off, ActuatorCommand::Off);
        assert!(serde_json::from_str::<ActuatorCommand>("7").is_err());
        assert!(serde_json::from_str::<ActuatorCommand>("\"TOGGLE\"").is_err());
    }

    #[test]
    fn test_command_serializes_as_label() {
        assert_eq!(serde_json::to_string(&ActuatorCommand::On).unwrap(), "\"ON\"");
    }

    #[test]
    fn test_sensor_data_ignores_unknown_fields() {
        let json = r#"{
            "name": "HumiditySensor",
            "typeId": 1,
            "locationId": "greenhouse",
            "value": 31.5,
            "firmware": "2.1.0",
            "timestamp": "2024-03-01T10:00:00Z"
        }"#;
        let data: SensorData = serde_json::from_str(json).unwrap();
        assert_eq!(data.type_id, HUMIDITY_SENSOR_TYPE);
        assert_eq!(data.location_id, "greenhouse");
        assert_eq!(data.timestamp.as_deref(), Some("2024-03-01T10:00:00Z"));
        assert!(!data.error_flag);
    }

    #[test]
    fn test_records_require_identifying_fields() {
        assert!(serde_json::from_str::<SensorData>("{}").is_err());
        assert!(serde_json::from_str::<SensorData>(r#"{"unrelated":true}"#).is_err());
        assert!(serde_json::from_str::<SensorData>(r#"{"typeId":1,"locationId":"g"}"#).is_err());
        assert!(serde_json::from_str::<ActuatorData>(r#"{"typeId":1,"locationId":"g"}"#).is_err());
        assert!(serde_json::from_str::<SystemPerformanceData>("{}").is_err());

        let cmd: ActuatorData =
            serde_json::from_str(r#"{"typeId":1,"locationId":"g","command":"ON"}"#).unwrap();
        assert_eq!(cmd.name, "");
        assert!((cmd.value - 0.0).abs() < f32::EPSILON);

        let perf: SystemPerformanceData = serde_json::from_str(
            r#"{"cpuUtilization":1.0,"diskUtilization":2.0,"memUtilization":3.0}"#,
        )
        .unwrap();
        assert_eq!(perf.name, SYSTEM_PERF_NAME);
        assert_eq!(perf.location_id, NOT_SET);
    }

    #[test]
    fn test_speak_command() {
        let cmd = ActuatorData::speak("kitchen", "hello");
        assert_eq!(cmd.type_id, TTS_ACTUATOR_TYPE);
        assert_eq!(cmd.command, ActuatorCommand::On);
        assert_eq!(cmd.state_data.as_deref(), Some("hello"));
    }

    #[test]
    fn test_speech_result_shape() {
        let json = r#"{"partial":"turn on","result":"turn on the fan","isComplete":true}"#;
        let speech: SpeechResult = serde_json::from_str(json).unwrap();
        assert!(speech.is_complete);
        assert_eq!(speech.result, "turn on the fan");
    }
}
