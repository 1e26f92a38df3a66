use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Wire shape of every outbound command: `{action, target?, value?, value2?}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandEnvelope {
	pub action: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub target: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub value: Option<Value>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub value2: Option<Value>,
}

impl CommandEnvelope {
	fn new(action: &str) -> Self {
		Self {
			action: action.to_string(),
			target: None,
			value: None,
			value2: None,
		}
	}

	fn target(mut self, target: &str) -> Self {
		self.target = Some(target.to_string());
		self
	}

	fn value(mut self, value: impl Into<Value>) -> Self {
		self.value = Some(value.into());
		self
	}

	fn value2(mut self, value: impl Into<Value>) -> Self {
		self.value2 = Some(value.into());
		self
	}
}

/// One slot of an explicit layout, all fields in percent of the output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutSlot {
	pub x: f64,
	pub y: f64,
	pub w: f64,
	pub h: f64,
	pub slot: usize,
	pub z: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "layout", rename_all = "camelCase")]
pub enum LayoutSpec {
	Preset(u8),
	Slots(Vec<LayoutSlot>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum CompositorCommand {
	AddToScene { target: String, scene: u8 },
	RemoveFromScene { target: String, scene: u8 },
	SoloVideo { target: String, enabled: bool },
	Mute { target: String, muted: bool },
	/// Compositor scale, 0–200
	Volume { target: String, level: u16 },
	SoloAudio { target: String, enabled: bool },
	Layout { scene: u8, layout: LayoutSpec },
	Hangup { target: String },
	RequestScreenShare { target: String },
	DirectMessage { target: String, message: String },
	StartRecording { target: Option<String> },
	StopRecording { target: Option<String> },
	Camera { target: String, enabled: bool },
	PanTiltZoom { target: String, pan: f64, tilt: f64, zoom: f64 },
	Custom(CommandEnvelope),
}

impl CompositorCommand {
	/// Source the command addresses, if any
	#[must_use]
	pub fn target(&self) -> Option<&str> {
		match self {
			Self::AddToScene { target, .. }
			| Self::RemoveFromScene { target, .. }
			| Self::SoloVideo { target, .. }
			| Self::Mute { target, .. }
			| Self::Volume { target, .. }
			| Self::SoloAudio { target, .. }
			| Self::Hangup { target }
			| Self::RequestScreenShare { target }
			| Self::DirectMessage { target, .. }
			| Self::Camera { target, .. }
			| Self::PanTiltZoom { target, .. } => Some(target),
			Self::StartRecording { target } | Self::StopRecording { target } => target.as_deref(),
			Self::Custom(envelope) => envelope.target.as_deref(),
			Self::Layout { .. } => None,
		}
	}

	/// Same command addressed to a different source
	#[must_use]
	pub fn retarget(mut self, resolved: &str) -> Self {
		match &mut self {
			Self::AddToScene { target, .. }
			| Self::RemoveFromScene { target, .. }
			| Self::SoloVideo { target, .. }
			| Self::Mute { target, .. }
			| Self::Volume { target, .. }
			| Self::SoloAudio { target, .. }
			| Self::Hangup { target }
			| Self::RequestScreenShare { target }
			| Self::DirectMessage { target, .. }
			| Self::Camera { target, .. }
			| Self::PanTiltZoom { target, .. } => *target = resolved.to_string(),
			Self::StartRecording { target } | Self::StopRecording { target } => {
				if target.is_some() {
					*target = Some(resolved.to_string());
				}
			}
			Self::Custom(envelope) => {
				if envelope.target.is_some() {
					envelope.target = Some(resolved.to_string());
				}
			}
			Self::Layout { .. } => {}
		}
		self
	}

	#[must_use]
	pub fn to_envelope(&self) -> CommandEnvelope {
		match self {
			Self::AddToScene { target, scene } => CommandEnvelope::new("addScene").target(target).value(*scene),
			Self::RemoveFromScene { target, scene } => CommandEnvelope::new("removeScene").target(target).value(*scene),
			Self::SoloVideo { target, enabled } => CommandEnvelope::new("soloVideo").target(target).value(*enabled),
			Self::Mute { target, muted } => CommandEnvelope::new("mute").target(target).value(*muted),
			Self::Volume { target, level } => CommandEnvelope::new("volume").target(target).value(*level),
			Self::SoloAudio { target, enabled } => CommandEnvelope::new("soloAudio").target(target).value(*enabled),
			Self::Layout { scene, layout } => {
				let value = match layout {
					LayoutSpec::Preset(code) => json!(code),
					LayoutSpec::Slots(slots) => serde_json::to_value(slots).unwrap_or(Value::Null),
				};
				CommandEnvelope::new("layout").value(value).value2(*scene)
			}
			Self::Hangup { target } => CommandEnvelope::new("hangup").target(target),
			Self::RequestScreenShare { target } => CommandEnvelope::new("requestScreenShare").target(target),
			Self::DirectMessage { target, message } => CommandEnvelope::new("sendChat").target(target).value(message.as_str()),
			Self::StartRecording { target } => Self::record(target.as_deref(), true),
			Self::StopRecording { target } => Self::record(target.as_deref(), false),
			Self::Camera { target, enabled } => CommandEnvelope::new("camera").target(target).value(*enabled),
			Self::PanTiltZoom { target, pan, tilt, zoom } => CommandEnvelope::new("ptz").target(target).value(json!({ "pan": pan, "tilt": tilt })).value2(*zoom),
			Self::Custom(envelope) => envelope.clone(),
		}
	}

	fn record(target: Option<&str>, start: bool) -> CommandEnvelope {
		let envelope = CommandEnvelope::new("record").value(start);
		match target {
			Some(target) => envelope.target(target),
			None => envelope,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_scene_membership_envelope() {
		let envelope = CompositorCommand::AddToScene {
			target: "xyz123".to_string(),
			scene: 1,
		}
		.to_envelope();

		assert_eq!(
			serde_json::to_value(&envelope).unwrap(),
			json!({ "action": "addScene", "target": "xyz123", "value": 1 })
		);
	}

	#[test]
	fn test_optional_fields_are_omitted() {
		let envelope = CompositorCommand::StartRecording { target: None }.to_envelope();
		assert_eq!(serde_json::to_value(&envelope).unwrap(), json!({ "action": "record", "value": true }));
	}

	#[test]
	fn test_explicit_layout_carries_percent_slots() {
		let envelope = CompositorCommand::Layout {
			scene: 2,
			layout: LayoutSpec::Slots(vec![LayoutSlot {
				x: 0.0,
				y: 0.0,
				w: 50.0,
				h: 100.0,
				slot: 0,
				z: 0,
			}]),
		}
		.to_envelope();

		assert_eq!(envelope.action, "layout");
		assert_eq!(envelope.value2, Some(json!(2)));
		assert_eq!(envelope.value.unwrap()[0]["w"], json!(50.0));
	}

	#[test]
	fn test_retarget_keeps_payload() {
		let command = CompositorCommand::Volume {
			target: "uuid-1".to_string(),
			level: 120,
		}
		.retarget("stream-1");

		assert_eq!(command.target(), Some("stream-1"));
		assert_eq!(command.to_envelope().value, Some(json!(120)));
	}
}
