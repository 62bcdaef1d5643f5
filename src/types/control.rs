//! Inbound JSON control messages
//!
//! The wire envelope is `{ "type": <kind>, ... }`. `status` carries its fields
//! at the top level; `camera_health` and `server_stats` nest their payload
//! under `data`. Every payload keeps fields it does not know about in an
//! `extra` map so newer servers do not break older clients.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Number, Value};

use crate::{ClientError, Result};

/// Wire kind for connectivity status reports.
pub const KIND_STATUS: &str = "status";
/// Wire kind for camera health telemetry.
pub const KIND_CAMERA_HEALTH: &str = "camera_health";
/// Wire kind for server statistics.
pub const KIND_SERVER_STATS: &str = "server_stats";

/// Connectivity report broadcast by the server.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub camera_connected: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_connected: Option<bool>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Health telemetry reported by the camera.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CameraHealth {
    /// Frames captured since boot
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub frames: Option<u64>,

    /// Free heap in bytes
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub heap: Option<u64>,

    /// Time since boot; firmware reports it preformatted
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub uptime: Option<Uptime>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,

    /// Latency in milliseconds
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub latency: Option<f64>,

    /// JPEG quality setting
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub quality: Option<u32>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Uptime as reported on the wire: seconds, or a preformatted string such
/// as `"01:02:05"` or `"1h 2m 5s"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Uptime {
    Seconds(f64),
    Formatted(String),
}

impl Uptime {
    /// Uptime in seconds, if the formatted form can be parsed
    pub fn as_seconds(&self) -> Option<f64> {
        match self {
            Uptime::Seconds(seconds) => Some(*seconds),
            Uptime::Formatted(text) => parse_uptime(text),
        }
    }

    /// `HH:MM:SS` rendering; unparseable text is shown as received
    pub fn display(&self) -> String {
        match (self.as_seconds(), self) {
            (Some(seconds), _) => format_uptime(seconds),
            (None, Uptime::Formatted(text)) if !text.trim().is_empty() => text.trim().to_string(),
            (None, _) => "--".to_string(),
        }
    }
}

/// Parse `H:M:S`, `M:S` or `1h 2m 5s`
fn parse_uptime(text: &str) -> Option<f64> {
    let text = text.trim();

    if text.contains(':') {
        let parts = text.split(':').map(|part| part.trim().parse::<u64>().ok()).collect::<Option<Vec<_>>>()?;
        let seconds = match parts.as_slice() {
            [hours, minutes, seconds] => hours * 3600 + minutes * 60 + seconds,
            [minutes, seconds] => minutes * 60 + seconds,
            _ => return None,
        };
        return Some(seconds as f64);
    }

    let mut total = 0u64;
    let mut seen = false;
    for token in text.split_whitespace() {
        let (digits, unit) = token.split_at(token.find(|c: char| !c.is_ascii_digit())?);
        let value: u64 = digits.parse().ok()?;
        total += match unit {
            "h" => value * 3600,
            "m" => value * 60,
            "s" => value,
            _ => return None,
        };
        seen = true;
    }
    seen.then_some(total as f64)
}

/// Accept a field in its declared type or as a numeric string.
///
/// Values of any other shape are dropped to `None` rather than failing the
/// whole payload.
fn lenient<'de, D, T>(deserializer: D) -> std::result::Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => return Ok(None),
        Some(value) => value,
    };

    if let Ok(parsed) = serde_json::from_value::<T>(value.clone()) {
        return Ok(Some(parsed));
    }

    let numeric = value.as_str().and_then(|text| text.trim().parse::<Number>().ok());
    Ok(numeric.and_then(|number| serde_json::from_value(Value::Number(number)).ok()))
}

/// Relay statistics reported by the server.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerStats {
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub frames_received: Option<u64>,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub total_bytes: Option<u64>,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub fps: Option<f64>,

    /// Connected browser clients
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub clients: Option<u64>,

    /// Latency in milliseconds
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub latency: Option<f64>,

    /// Uptime in seconds
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub uptime: Option<f64>,

    /// Memory usage percentage
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub memory: Option<f64>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A decoded control message.
///
/// Classification is exhaustive: kinds this client does not recognise decode
/// to [`ControlMessage::Unknown`] instead of failing.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlMessage {
    Status(StatusReport),
    CameraHealth(CameraHealth),
    ServerStats(ServerStats),
    Unknown { kind: String },
}

impl ControlMessage {
    /// Decode a text message into a control message.
    ///
    /// Fails only when the text is not a JSON object or a recognised kind
    /// carries a payload of the wrong shape. An envelope without a `type`
    /// field decodes as `Unknown` with an empty kind.
    pub fn decode(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)?;
        let Value::Object(mut envelope) = value else {
            return Err(ClientError::decode("control message", "envelope is not a JSON object"));
        };

        let kind = match envelope.remove("type") {
            Some(Value::String(kind)) => kind,
            Some(other) => {
                return Err(ClientError::decode(
                    "control message",
                    format!("'type' must be a string, got {other}"),
                ));
            }
            None => String::new(),
        };

        match kind.as_str() {
            KIND_STATUS => Ok(ControlMessage::Status(decode_payload(&kind, Value::Object(envelope))?)),
            KIND_CAMERA_HEALTH => {
                Ok(ControlMessage::CameraHealth(decode_payload(&kind, nested_data(&mut envelope))?))
            }
            KIND_SERVER_STATS => {
                Ok(ControlMessage::ServerStats(decode_payload(&kind, nested_data(&mut envelope))?))
            }
            _ => Ok(ControlMessage::Unknown { kind }),
        }
    }

    /// Wire kind of this message
    pub fn kind(&self) -> &str {
        match self {
            ControlMessage::Status(_) => KIND_STATUS,
            ControlMessage::CameraHealth(_) => KIND_CAMERA_HEALTH,
            ControlMessage::ServerStats(_) => KIND_SERVER_STATS,
            ControlMessage::Unknown { kind } => kind,
        }
    }
}

fn nested_data(envelope: &mut Map<String, Value>) -> Value {
    match envelope.remove("data") {
        None | Some(Value::Null) => Value::Object(Map::new()),
        Some(data) => data,
    }
}

fn decode_payload<T: serde::de::DeserializeOwned>(kind: &str, payload: Value) -> Result<T> {
    serde_json::from_value(payload)
        .map_err(|e| ClientError::decode(format!("'{kind}' payload"), e.to_string()))
}

/// Format an uptime in seconds as `HH:MM:SS`.
///
/// Zero (or a negative/NaN value) renders as `"--"`.
pub fn format_uptime(seconds: f64) -> String {
    if seconds.is_nan() || seconds <= 0.0 {
        return "--".to_string();
    }

    let total = seconds.floor() as u64;
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let secs = total % 60;

    format!("{hours:02}:{minutes:02}:{secs:02}")
}
