//! Normalization of inbound compositor messages.
//!
//! The compositor posts many differently-shaped messages for the same fact.
//! Each message is reduced to `{kind, id, value, label}` by trying a fixed list
//! of field aliases, then mapped onto one [`BridgeEvent`] category. Anything
//! that does not match a category becomes [`BridgeEvent::Unknown`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

const KIND_KEYS: &[&str] = &["type", "action", "event"];
const STREAM_ID_KEYS: &[&str] = &["streamID", "streamId", "streamid"];
const UUID_KEYS: &[&str] = &["UUID", "uuid"];
const VALUE_KEYS: &[&str] = &["data", "value"];
const LABEL_KEYS: &[&str] = &["label", "name"];

const READY: &[&str] = &["ready", "loaded", "iframe-loaded", "api-ready", "director-ready", "compositor-ready"];
const JOINED: &[&str] = &["joined", "source-joined", "guest-connected", "new-guest", "connection-established", "new-push-connection"];
const LEFT: &[&str] = &["left", "source-left", "guest-disconnected", "connection-lost", "end-push-connection"];
const KICKED: &[&str] = &["kicked", "hangup", "guest-kicked"];
const STREAM_ID: &[&str] = &["stream-id-detected", "streamid-detected", "stream-id", "streamid"];
const AUDIO_LEVEL: &[&str] = &["audio-level", "audiolevel", "audio-levels", "loudness"];
const MUTE: &[&str] = &["mute-changed", "mute-state", "remote-mute", "muted"];
const SCENE: &[&str] = &["scene-changed", "scenechanged", "scene-update"];
const RECORDING_STARTED: &[&str] = &["recording-started", "record-started", "recording-start"];
const RECORDING_STOPPED: &[&str] = &["recording-stopped", "record-stopped", "recording-stop"];
const ERROR: &[&str] = &["error", "alert", "failed"];
/// Carry `value: true|false` for connect/disconnect
const CONNECTION_TOGGLES: &[&str] = &["push-connection", "view-connection"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BridgeEvent {
	Ready { forced: bool },
	Detached,
	SourceJoined { id: String, label: Option<String>, screen_share: bool, has_video: bool, has_audio: bool },
	SourceLeft { id: String, kicked: bool },
	StreamIdResolved { uuid: String, stream_id: String },
	AudioLevel { id: String, level: f64 },
	MuteChanged { id: String, muted: bool },
	SceneChanged { scene: Value },
	RecordingStarted,
	RecordingStopped,
	Error { message: String },
	Unknown { kind: String },
}

impl BridgeEvent {
	/// Source the event is about, if any
	#[must_use]
	pub fn source_id(&self) -> Option<&str> {
		match self {
			Self::SourceJoined { id, .. } | Self::SourceLeft { id, .. } | Self::AudioLevel { id, .. } | Self::MuteChanged { id, .. } => Some(id),
			Self::StreamIdResolved { uuid, .. } => Some(uuid),
			_ => None,
		}
	}

	#[must_use]
	pub const fn label(&self) -> &'static str {
		match self {
			Self::Ready { .. } => "ready",
			Self::Detached => "detached",
			Self::SourceJoined { .. } => "source-joined",
			Self::SourceLeft { .. } => "source-left",
			Self::StreamIdResolved { .. } => "stream-id-detected",
			Self::AudioLevel { .. } => "audio-level",
			Self::MuteChanged { .. } => "mute-changed",
			Self::SceneChanged { .. } => "scene-changed",
			Self::RecordingStarted => "recording-started",
			Self::RecordingStopped => "recording-stopped",
			Self::Error { .. } => "error",
			Self::Unknown { .. } => "unknown",
		}
	}
}

/// Reduced form of one inbound message
#[derive(Debug, Clone, Default)]
pub(crate) struct RawInbound {
	pub kind: Option<String>,
	pub stream_id: Option<String>,
	pub uuid: Option<String>,
	pub value: Option<Value>,
	pub label: Option<String>,
}

impl RawInbound {
	pub(crate) fn reduce(message: &Value) -> Self {
		let text = |keys: &[&str]| keys.iter().find_map(|k| message.get(*k)).and_then(value_as_text);

		Self {
			kind: text(KIND_KEYS),
			stream_id: text(STREAM_ID_KEYS),
			uuid: text(UUID_KEYS),
			value: VALUE_KEYS.iter().find_map(|k| message.get(*k)).cloned(),
			label: text(LABEL_KEYS),
		}
	}

	/// Preferred address: the stable stream id, falling back to the connection uuid
	pub(crate) fn id(&self) -> Option<String> {
		self.stream_id.clone().or_else(|| self.uuid.clone())
	}
}

fn value_as_text(value: &Value) -> Option<String> {
	match value {
		Value::String(s) if !s.is_empty() => Some(s.clone()),
		Value::Number(n) => Some(n.to_string()),
		_ => None,
	}
}

fn value_as_bool(value: Option<&Value>) -> Option<bool> {
	match value? {
		Value::Bool(b) => Some(*b),
		Value::Number(n) => n.as_f64().map(|f| f != 0.0),
		Value::String(s) => match s.as_str() {
			"true" | "on" | "1" => Some(true),
			"false" | "off" | "0" => Some(false),
			_ => None,
		},
		Value::Object(map) => value_as_bool(map.get("muted").or_else(|| map.get("value"))),
		_ => None,
	}
}

/// Lowercase and fold `_`, spaces and camelCase humps into `-`
fn normalize_kind(kind: &str) -> String {
	let mut out = String::with_capacity(kind.len() + 4);
	let mut prev_lower = false;
	for c in kind.trim().chars() {
		if c == '_' || c == ' ' {
			out.push('-');
			prev_lower = false;
		} else if c.is_ascii_uppercase() {
			if prev_lower {
				out.push('-');
			}
			out.push(c.to_ascii_lowercase());
			prev_lower = false;
		} else {
			out.push(c);
			prev_lower = c.is_ascii_lowercase() || c.is_ascii_digit();
		}
	}
	out
}

/// Decode one inbound message into zero or more normalized events
#[must_use]
pub fn decode_inbound(message: &Value) -> Vec<BridgeEvent> {
	let raw = RawInbound::reduce(message);
	decode_raw(&raw)
}

pub(crate) fn decode_raw(raw: &RawInbound) -> Vec<BridgeEvent> {
	let Some(kind) = raw.kind.as_deref() else {
		return vec![BridgeEvent::Unknown { kind: String::new() }];
	};
	let normalized = normalize_kind(kind);
	let is = |table: &[&str]| table.contains(&normalized.as_str());
	let unknown = || vec![BridgeEvent::Unknown { kind: kind.to_string() }];

	if is(READY) {
		return vec![BridgeEvent::Ready { forced: false }];
	}

	if is(CONNECTION_TOGGLES) {
		let Some(id) = raw.id() else { return unknown() };
		return match value_as_bool(raw.value.as_ref()) {
			Some(false) => vec![BridgeEvent::SourceLeft { id, kicked: false }],
			_ => vec![joined(raw, id)],
		};
	}

	if is(JOINED) {
		return raw.id().map_or_else(unknown, |id| vec![joined(raw, id)]);
	}

	if is(LEFT) || is(KICKED) {
		let kicked = is(KICKED);
		return raw.id().map_or_else(unknown, |id| vec![BridgeEvent::SourceLeft { id, kicked }]);
	}

	if is(STREAM_ID) {
		let stream_id = raw.value.as_ref().and_then(value_as_text).or_else(|| raw.stream_id.clone());
		return match (raw.uuid.clone(), stream_id) {
			(Some(uuid), Some(stream_id)) if uuid != stream_id => vec![BridgeEvent::StreamIdResolved { uuid, stream_id }],
			_ => unknown(),
		};
	}

	if is(AUDIO_LEVEL) {
		return decode_audio_levels(raw);
	}

	if is(MUTE) {
		return match (raw.id(), value_as_bool(raw.value.as_ref())) {
			(Some(id), Some(muted)) => vec![BridgeEvent::MuteChanged { id, muted }],
			_ => unknown(),
		};
	}

	if is(SCENE) {
		return vec![BridgeEvent::SceneChanged {
			scene: raw.value.clone().unwrap_or(Value::Null),
		}];
	}

	if is(RECORDING_STARTED) {
		return vec![BridgeEvent::RecordingStarted];
	}

	if is(RECORDING_STOPPED) {
		return vec![BridgeEvent::RecordingStopped];
	}

	if is(ERROR) {
		let message = raw
			.value
			.as_ref()
			.and_then(|v| value_as_text(v).or_else(|| v.get("message").and_then(value_as_text)))
			.unwrap_or_else(|| "compositor reported an error".to_string());
		return vec![BridgeEvent::Error { message }];
	}

	unknown()
}

fn joined(raw: &RawInbound, id: String) -> BridgeEvent {
	let details = raw.value.as_ref().filter(|v| v.is_object());
	let flag = |key: &str, default: bool| details.and_then(|d| d.get(key)).and_then(Value::as_bool).unwrap_or(default);
	let label = raw.label.clone().or_else(|| details.and_then(|d| d.get("label")).and_then(value_as_text));

	BridgeEvent::SourceJoined {
		id,
		label,
		screen_share: flag("screenShare", false) || flag("screenshare", false),
		has_video: flag("video", true),
		has_audio: flag("audio", true),
	}
}

/// Either `{id, value: level}` or `{value: {id: level, ...}}`
fn decode_audio_levels(raw: &RawInbound) -> Vec<BridgeEvent> {
	match (raw.id(), raw.value.as_ref()) {
		(Some(id), Some(value)) => value.as_f64().map_or_else(Vec::new, |level| vec![BridgeEvent::AudioLevel { id, level }]),
		(None, Some(Value::Object(levels))) => levels
			.iter()
			.filter_map(|(id, level)| level.as_f64().map(|level| BridgeEvent::AudioLevel { id: id.clone(), level }))
			.collect(),
		_ => Vec::new(),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn test_normalize_kind() {
		assert_eq!(normalize_kind("streamID-detected"), "stream-id-detected");
		assert_eq!(normalize_kind("guest_connected"), "guest-connected");
		assert_eq!(normalize_kind("sceneChanged"), "scene-changed");
		assert_eq!(normalize_kind("READY"), "ready");
	}

	#[test]
	fn test_ready_spellings_are_equivalent() {
		for message in [json!({ "type": "ready" }), json!({ "action": "loaded" }), json!({ "event": "API_READY" }), json!({ "type": "directorReady" })] {
			assert_eq!(decode_inbound(&message), vec![BridgeEvent::Ready { forced: false }], "{message}");
		}
	}

	#[test]
	fn test_joined_with_uuid_only() {
		let events = decode_inbound(&json!({ "action": "guest-connected", "UUID": "abc", "label": "Guest 1" }));
		assert_eq!(
			events,
			vec![BridgeEvent::SourceJoined {
				id: "abc".to_string(),
				label: Some("Guest 1".to_string()),
				screen_share: false,
				has_video: true,
				has_audio: true,
			}]
		);
	}

	#[test]
	fn test_push_connection_toggle() {
		let up = decode_inbound(&json!({ "action": "push-connection", "value": true, "streamID": "s1" }));
		assert!(matches!(&up[0], BridgeEvent::SourceJoined { id, .. } if id == "s1"));

		let down = decode_inbound(&json!({ "action": "push-connection", "value": false, "streamID": "s1" }));
		assert_eq!(
			down,
			vec![BridgeEvent::SourceLeft {
				id: "s1".to_string(),
				kicked: false
			}]
		);
	}

	#[test]
	fn test_stream_id_detected_from_value() {
		let events = decode_inbound(&json!({ "type": "stream-id-detected", "UUID": "abc", "value": "xyz123" }));
		assert_eq!(
			events,
			vec![BridgeEvent::StreamIdResolved {
				uuid: "abc".to_string(),
				stream_id: "xyz123".to_string()
			}]
		);
	}

	#[test]
	fn test_audio_levels_map_form() {
		let events = decode_inbound(&json!({ "action": "loudness", "value": { "s1": 12.5, "s2": 80, "bad": "x" } }));
		assert_eq!(events.len(), 2);
		assert!(events.contains(&BridgeEvent::AudioLevel { id: "s1".to_string(), level: 12.5 }));
		assert!(events.contains(&BridgeEvent::AudioLevel { id: "s2".to_string(), level: 80.0 }));
	}

	#[test]
	fn test_mute_and_error() {
		let mute = decode_inbound(&json!({ "type": "remote-mute", "streamId": "s1", "data": "true" }));
		assert_eq!(mute, vec![BridgeEvent::MuteChanged { id: "s1".to_string(), muted: true }]);

		let error = decode_inbound(&json!({ "type": "error", "data": { "message": "room full" } }));
		assert_eq!(error, vec![BridgeEvent::Error { message: "room full".to_string() }]);
	}

	#[test]
	fn test_unmatched_shapes_are_unknown() {
		assert_eq!(decode_inbound(&json!({ "type": "tally-light" })), vec![BridgeEvent::Unknown { kind: "tally-light".to_string() }]);
		assert_eq!(decode_inbound(&json!({ "foo": 1 })), vec![BridgeEvent::Unknown { kind: String::new() }]);
		assert_eq!(decode_inbound(&json!("bare string")), vec![BridgeEvent::Unknown { kind: String::new() }]);
		assert_eq!(decode_inbound(&json!({ "type": "joined" })), vec![BridgeEvent::Unknown { kind: "joined".to_string() }]);
	}
}
