use crate::{MixerError, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
	Camera,
	Contributor,
	Screen,
	Media,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Source {
	pub id: String,
	pub label: String,
	pub kind: SourceKind,
	pub has_video: bool,
	pub has_audio: bool,
	pub muted: bool,
	/// Local scale, 0–100
	pub volume: u8,
	pub audio_level: f64,
	pub solo: bool,
	/// False while the source is gone from the compositor; bindings stay
	pub connected: bool,
}

impl Source {
	pub fn new(id: impl Into<String>, label: impl Into<String>, kind: SourceKind) -> Self {
		Self {
			id: id.into(),
			label: label.into(),
			kind,
			has_video: true,
			has_audio: true,
			muted: false,
			volume: 100,
			audio_level: 0.0,
			solo: false,
			connected: true,
		}
	}
}

/// Slot rectangle in percent of the output
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SlotPosition {
	pub x: f64,
	pub y: f64,
	pub w: f64,
	pub h: f64,
}

impl SlotPosition {
	pub const FULL: Self = Self { x: 0.0, y: 0.0, w: 100.0, h: 100.0 };

	pub fn validate(&self) -> Result<()> {
		let in_range = |v: f64| (0.0..=100.0).contains(&v);
		if ![self.x, self.y, self.w, self.h].into_iter().all(in_range) {
			return Err(MixerError::InvalidScene(format!("slot position {self:?} outside 0..=100")));
		}
		if self.w <= 0.0 || self.h <= 0.0 {
			return Err(MixerError::InvalidScene("slot width and height must be positive".to_string()));
		}
		if self.x + self.w > 100.0 || self.y + self.h > 100.0 {
			return Err(MixerError::InvalidScene(format!("slot position {self:?} overflows the output")));
		}
		Ok(())
	}

	#[must_use]
	pub fn area(&self) -> f64 {
		self.w * self.h
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Slot {
	pub id: String,
	pub source_id: Option<String>,
	pub position: SlotPosition,
	pub z_index: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LayoutPreset {
	Solo,
	Split,
	PictureInPicture,
	AutoGrid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scene {
	pub id: String,
	pub name: String,
	/// Compositor scene number this scene renders into
	pub target_output_index: u8,
	pub layout_preset: LayoutPreset,
	pub slots: Vec<Slot>,
}

impl Scene {
	/// Bound source ids in slot order, without duplicates
	#[must_use]
	pub fn members(&self) -> Vec<String> {
		let mut members: Vec<String> = Vec::with_capacity(self.slots.len());
		for id in self.slots.iter().filter_map(|slot| slot.source_id.as_ref()) {
			if !members.contains(id) {
				members.push(id.clone());
			}
		}
		members
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransitionKind {
	Cut,
	Fade,
	Slide,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transition {
	#[serde(rename = "type")]
	pub kind: TransitionKind,
	pub duration_ms: u64,
}

impl Default for Transition {
	fn default() -> Self {
		Self {
			kind: TransitionKind::Fade,
			duration_ms: 500,
		}
	}
}

impl Transition {
	/// Cuts and zero-length transitions complete without a timer
	#[must_use]
	pub const fn is_instant(&self) -> bool {
		matches!(self.kind, TransitionKind::Cut) || self.duration_ms == 0
	}
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MixerState {
	pub preview_scene_id: Option<String>,
	pub program_scene_id: Option<String>,
	pub is_live: bool,
	pub is_transitioning: bool,
	pub transition: Transition,
	pub compositor_connected: bool,
}

/// Everything a UI needs to render the mixer header
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MixerStatus {
	#[serde(flatten)]
	pub state: MixerState,
	pub device_connected: bool,
	pub is_recording: bool,
	pub compositor_ready: bool,
	pub compositor_recording: bool,
	pub last_error: Option<String>,
	pub notice: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MixerSnapshot {
	pub status: MixerStatus,
	pub scenes: Vec<Scene>,
	pub sources: Vec<Source>,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_position_bounds() {
		assert!(SlotPosition::FULL.validate().is_ok());
		assert!(SlotPosition { x: 50.0, y: 50.0, w: 50.0, h: 50.0 }.validate().is_ok());
		assert!(SlotPosition { x: 60.0, y: 0.0, w: 50.0, h: 10.0 }.validate().is_err());
		assert!(SlotPosition { x: 0.0, y: 0.0, w: 0.0, h: 10.0 }.validate().is_err());
		assert!(SlotPosition { x: -1.0, y: 0.0, w: 10.0, h: 10.0 }.validate().is_err());
		assert!(SlotPosition { x: f64::NAN, y: 0.0, w: 10.0, h: 10.0 }.validate().is_err());
	}

	#[test]
	fn test_members_dedupe_in_slot_order() {
		let slot = |id: &str, source: Option<&str>| Slot {
			id: id.to_string(),
			source_id: source.map(String::from),
			position: SlotPosition::FULL,
			z_index: 0,
		};
		let scene = Scene {
			id: "a".to_string(),
			name: "A".to_string(),
			target_output_index: 1,
			layout_preset: LayoutPreset::AutoGrid,
			slots: vec![slot("1", Some("cam")), slot("2", None), slot("3", Some("guest")), slot("4", Some("cam"))],
		};
		assert_eq!(scene.members(), ["cam", "guest"]);
	}

	#[test]
	fn test_status_serializes_flat() {
		let status = MixerStatus::default();
		let json = serde_json::to_value(&status).unwrap();
		assert_eq!(json["isTransitioning"], false);
		assert_eq!(json["transition"]["type"], "fade");
		assert_eq!(json["deviceConnected"], false);
	}
}
