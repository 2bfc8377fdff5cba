//! Envelope Codec
//!
//! Converts raw payloads to typed records and back. Everything here is pure;
//! callers pick the decoder from the resource's [`PayloadKind`], never by
//! trying decoders until one succeeds.
//!
//! [`PayloadKind`]: crate::resource::PayloadKind

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::data::{ActuatorData, SensorData, SpeechResult, SystemPerformanceData};
use crate::messages::{ConversationMessage, ToolResultText};

/// Errors produced while decoding or encoding payloads
#[derive(Debug, Error)]
pub enum CodecError {
    /// Payload was not valid JSON for the expected type
    #[error("malformed payload: {0}")]
    Json(#[from] serde_json::Error),

    /// Envelope is missing a required field
    #[error("missing field `{0}`")]
    MissingField(&'static str),

    /// Field present but with the wrong shape
    #[error("unexpected shape for `{field}`: expected {expected}")]
    UnexpectedShape {
        /// Offending field
        field: &'static str,
        /// What was expected instead
        expected: &'static str,
    },
}

fn decode<T: DeserializeOwned>(payload: &[u8]) -> Result<T, CodecError> {
    Ok(serde_json::from_slice(payload)?)
}

/// Decode a sensor reading
///
/// # Errors
///
/// Returns [`CodecError::Json`] if the payload is not a sensor record.
pub fn decode_sensor(payload: &[u8]) -> Result<SensorData, CodecError> {
    decode(payload)
}

/// Decode an actuator command or response
///
/// # Errors
///
/// Returns [`CodecError::Json`] if the payload is not an actuator record.
pub fn decode_actuator(payload: &[u8]) -> Result<ActuatorData, CodecError> {
    decode(payload)
}

/// Decode a system performance record
///
/// # Errors
///
/// Returns [`CodecError::Json`] if the payload is not a performance record.
pub fn decode_system_performance(payload: &[u8]) -> Result<SystemPerformanceData, CodecError> {
    decode(payload)
}

/// Decode the speech recognition result nested in a speech sensor's state data
///
/// # Errors
///
/// Returns [`CodecError::Json`] if the state data is not a speech result.
pub fn decode_speech(state_data: &str) -> Result<SpeechResult, CodecError> {
    Ok(serde_json::from_str(state_data)?)
}

/// Encode any record as a JSON payload
///
/// # Errors
///
/// Returns [`CodecError::Json`] if the value cannot be serialized.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, CodecError> {
    Ok(serde_json::to_vec(value)?)
}

/// Reply envelope returned by the assistant backend
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BackendReply {
    /// Backend status string
    pub status: String,
    /// Reply body, always an object
    pub data: Map<String, Value>,
}

#[derive(Deserialize)]
struct RawReply {
    status: Option<Value>,
    data: Option<Value>,
}

/// Decode a `{status, data}` reply envelope
///
/// A primitive `data` is wrapped as `{"value": <primitive>}` so downstream
/// handlers only ever see an object.
///
/// # Errors
///
/// Returns an error if the payload is not JSON, if `data` is absent, or if
/// `data` is an array.
pub fn decode_reply(payload: &[u8]) -> Result<BackendReply, CodecError> {
    let raw: RawReply = decode(payload)?;

    let status = match raw.status {
        Some(Value::String(s)) => s,
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    };

    let data = match raw.data.ok_or(CodecError::MissingField("data"))? {
        Value::Object(map) => map,
        Value::Array(_) => {
            return Err(CodecError::UnexpectedShape {
                field: "data",
                expected: "object or primitive",
            })
        }
        primitive => {
            let mut map = Map::new();
            map.insert("value".to_string(), primitive);
            map
        }
    };

    Ok(BackendReply { status, data })
}

/// Tool result sub-blocks after filtering
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FilteredToolResult {
    /// Text sub-blocks, in arrival order
    pub blocks: Vec<ToolResultText>,
    /// Number of non-text sub-blocks that were dropped
    pub dropped: usize,
}

impl BackendReply {
    /// Interpret the reply body as a conversation message
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Json`] if the body is not a message.
    pub fn into_message(self) -> Result<ConversationMessage, CodecError> {
        Ok(serde_json::from_value(Value::Object(self.data))?)
    }

    /// Interpret the reply body as tool execution output
    ///
    /// Expects `data.value` to be a list of sub-blocks. Only `{"type": "text"}`
    /// sub-blocks survive.
    ///
    /// # Errors
    ///
    /// Returns an error if `data.value` is missing or not a list.
    pub fn into_tool_result(mut self) -> Result<FilteredToolResult, CodecError> {
        match self.data.remove("value") {
            Some(Value::Array(items)) => Ok(filter_tool_result_blocks(items)),
            Some(_) => Err(CodecError::UnexpectedShape {
                field: "data.value",
                expected: "list of content blocks",
            }),
            None => Err(CodecError::MissingField("data.value")),
        }
    }
}

/// Keep the text sub-blocks of a tool result, counting the rest
#[must_use]
pub fn filter_tool_result_blocks(items: Vec<Value>) -> FilteredToolResult {
    let mut filtered = FilteredToolResult::default();
    for item in items {
        let is_text = item.get("type").and_then(Value::as_str) == Some("text");
        let text = item.get("text").and_then(Value::as_str);
        match (is_text, text) {
            (true, Some(text)) => filtered.blocks.push(ToolResultText::new(text)),
            _ => filtered.dropped += 1,
        }
    }
    filtered
}
