use crate::Result;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Envelope carried by every frame on the device event stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceEnvelope {
	#[serde(rename = "type")]
	pub kind: String,
	#[serde(default)]
	pub v: u32,
	#[serde(default)]
	pub seq: Option<u64>,
	#[serde(default)]
	pub device_id: Option<String>,
	/// Milliseconds since the Unix epoch, device clock
	#[serde(default)]
	pub ts: Option<i64>,
	#[serde(default)]
	pub payload: Value,
}

impl DeviceEnvelope {
	pub fn parse(text: &str) -> Result<Self> {
		Ok(serde_json::from_str(text)?)
	}
}

/// Device facts the mixer cares about. Everything else is `Unknown`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DeviceEvent {
	RecorderStarted { recording_id: Option<String> },
	RecorderStopped { recording_id: Option<String> },
	RecorderError { message: String },
	SignalChanged { input: String, has_signal: bool, resolution: Option<String> },
	Heartbeat,
	Unknown { kind: String },
}

impl DeviceEvent {
	fn from_envelope(kind: &str, payload: &Value) -> Self {
		let text = |keys: &[&str]| keys.iter().find_map(|k| payload.get(*k).and_then(Value::as_str)).map(String::from);

		match kind {
			"recorder.started" => Self::RecorderStarted {
				recording_id: text(&["recording_id", "id"]),
			},
			"recorder.stopped" => Self::RecorderStopped {
				recording_id: text(&["recording_id", "id"]),
			},
			"recorder.error" => Self::RecorderError {
				message: text(&["message", "error"]).unwrap_or_else(|| "recorder error".to_string()),
			},
			"input.signal_changed" => match text(&["input", "input_id"]) {
				Some(input) => Self::SignalChanged {
					input,
					has_signal: ["has_signal", "signal"].iter().find_map(|k| payload.get(*k).and_then(Value::as_bool)).unwrap_or(false),
					resolution: text(&["resolution"]),
				},
				None => Self::Unknown { kind: kind.to_string() },
			},
			"heartbeat" => Self::Heartbeat,
			other => Self::Unknown { kind: other.to_string() },
		}
	}
}

/// A decoded device event with its envelope metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequencedEvent {
	pub seq: Option<u64>,
	pub device_id: Option<String>,
	pub ts: Option<i64>,
	pub event: DeviceEvent,
}

impl From<DeviceEnvelope> for SequencedEvent {
	fn from(envelope: DeviceEnvelope) -> Self {
		let event = DeviceEvent::from_envelope(&envelope.kind, &envelope.payload);
		Self {
			seq: envelope.seq,
			device_id: envelope.device_id,
			ts: envelope.ts,
			event,
		}
	}
}

/// Resume request sent immediately after every successful connect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncRequest {
	pub last_seq: u64,
}

impl SyncRequest {
	#[must_use]
	pub const fn new(last_seq: u64) -> Self {
		Self { last_seq }
	}

	#[must_use]
	pub fn to_json(&self) -> String {
		json!({ "type": "sync_request", "last_seq": self.last_seq }).to_string()
	}
}

/// Client-originated notification
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutboundMessage {
	#[serde(rename = "type")]
	pub kind: String,
	pub payload: Value,
}
