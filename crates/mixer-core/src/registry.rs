//! Authoritative local model of scenes and sources.
//!
//! Scenes are kept in creation order. Sources are kept in discovery order and
//! may be re-keyed in place when the compositor resolves a stable stream id;
//! every slot binding follows the new key.

use crate::layout::derive_preset;
use crate::model::{Scene, Slot, SlotPosition, Source};
use crate::{MixerError, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

pub const DEFAULT_OUTPUT_INDEX: u8 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotDraft {
	#[serde(default)]
	pub source_id: Option<String>,
	pub position: SlotPosition,
	#[serde(default)]
	pub z_index: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneDraft {
	pub name: String,
	#[serde(default)]
	pub target_output_index: Option<u8>,
	pub slots: Vec<SlotDraft>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenePatch {
	pub name: Option<String>,
	pub target_output_index: Option<u8>,
	pub slots: Option<Vec<SlotDraft>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotPatch {
	/// `Some(None)` unbinds the slot
	#[serde(default, with = "double_option")]
	pub source_id: Option<Option<String>>,
	pub position: Option<SlotPosition>,
	pub z_index: Option<i32>,
}

/// Distinguishes an absent field from an explicit `null`
mod double_option {
	use serde::{Deserialize, Deserializer, Serialize, Serializer};

	#[allow(clippy::option_option)]
	pub fn serialize<S: Serializer>(value: &Option<Option<String>>, serializer: S) -> Result<S::Ok, S::Error> {
		value.as_ref().and_then(Option::as_ref).serialize(serializer)
	}

	#[allow(clippy::option_option)]
	pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Option<String>>, D::Error> {
		Option::<String>::deserialize(deserializer).map(Some)
	}
}

#[derive(Debug, Default, Clone)]
pub struct SceneRegistry {
	scenes: IndexMap<String, Scene>,
	sources: IndexMap<String, Source>,
}

impl SceneRegistry {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	pub fn create_scene(&mut self, draft: SceneDraft) -> Result<Scene> {
		let slots = self.build_slots(draft.slots)?;
		let scene = Scene {
			id: Uuid::new_v4().to_string(),
			name: draft.name,
			target_output_index: draft.target_output_index.unwrap_or(DEFAULT_OUTPUT_INDEX),
			layout_preset: derive_preset(&slots),
			slots,
		};

		info!(id = %scene.id, name = %scene.name, preset = ?scene.layout_preset, "scene created");
		self.scenes.insert(scene.id.clone(), scene.clone());
		Ok(scene)
	}

	pub fn update_scene(&mut self, id: &str, patch: ScenePatch) -> Result<Scene> {
		let slots = patch.slots.map(|drafts| self.build_slots(drafts)).transpose()?;
		let scene = self.scenes.get_mut(id).ok_or_else(|| MixerError::SceneNotFound(id.to_string()))?;

		if let Some(name) = patch.name {
			scene.name = name;
		}
		if let Some(index) = patch.target_output_index {
			scene.target_output_index = index;
		}
		if let Some(slots) = slots {
			scene.layout_preset = derive_preset(&slots);
			scene.slots = slots;
		}

		debug!(%id, "scene updated");
		Ok(scene.clone())
	}

	/// Refuses the live program scene and the last remaining scene
	pub fn delete_scene(&mut self, id: &str, program: Option<&str>) -> Result<Scene> {
		if !self.scenes.contains_key(id) {
			return Err(MixerError::SceneNotFound(id.to_string()));
		}
		if program == Some(id) {
			return Err(MixerError::ProgramSceneLocked(id.to_string()));
		}
		if self.scenes.len() == 1 {
			return Err(MixerError::LastScene);
		}

		let scene = self.scenes.shift_remove(id).ok_or_else(|| MixerError::SceneNotFound(id.to_string()))?;
		info!(%id, name = %scene.name, "scene deleted");
		Ok(scene)
	}

	pub fn update_slot(&mut self, scene_id: &str, slot_id: &str, patch: SlotPatch) -> Result<Scene> {
		if let Some(position) = &patch.position {
			position.validate()?;
		}
		if let Some(Some(source_id)) = &patch.source_id {
			self.require_source(source_id)?;
		}

		let scene = self.scenes.get_mut(scene_id).ok_or_else(|| MixerError::SceneNotFound(scene_id.to_string()))?;
		let slot = scene.slots.iter_mut().find(|slot| slot.id == slot_id).ok_or_else(|| MixerError::SlotNotFound {
			scene: scene_id.to_string(),
			slot: slot_id.to_string(),
		})?;

		if let Some(source_id) = patch.source_id {
			slot.source_id = source_id;
		}
		if let Some(position) = patch.position {
			slot.position = position;
		}
		if let Some(z_index) = patch.z_index {
			slot.z_index = z_index;
		}
		scene.layout_preset = derive_preset(&scene.slots);

		Ok(scene.clone())
	}

	/// Deep copy with fresh scene and slot ids, same source bindings
	pub fn duplicate_scene(&mut self, id: &str) -> Result<Scene> {
		let original = self.scene(id)?;
		let copy = Scene {
			id: Uuid::new_v4().to_string(),
			name: format!("{} (copy)", original.name),
			target_output_index: original.target_output_index,
			layout_preset: original.layout_preset,
			slots: original
				.slots
				.iter()
				.map(|slot| Slot {
					id: Uuid::new_v4().to_string(),
					..slot.clone()
				})
				.collect(),
		};

		info!(from = %id, id = %copy.id, "scene duplicated");
		self.scenes.insert(copy.id.clone(), copy.clone());
		Ok(copy)
	}

	pub fn scene(&self, id: &str) -> Result<&Scene> {
		self.scenes.get(id).ok_or_else(|| MixerError::SceneNotFound(id.to_string()))
	}

	pub fn scenes(&self) -> impl Iterator<Item = &Scene> {
		self.scenes.values()
	}

	#[must_use]
	pub fn scene_count(&self) -> usize {
		self.scenes.len()
	}

	/// Insert a source, or refresh the descriptive fields of a known one.
	/// Mixing state (mute, volume, solo, meter) of a known source is kept.
	pub fn upsert_source(&mut self, source: Source) -> &Source {
		let id = source.id.clone();
		let entry = self
			.sources
			.entry(id)
			.and_modify(|existing| {
				existing.label.clone_from(&source.label);
				existing.kind = source.kind;
				existing.has_video = source.has_video;
				existing.has_audio = source.has_audio;
				existing.connected = source.connected;
			})
			.or_insert(source);
		&*entry
	}

	/// Remove a source and unbind every slot that referenced it
	pub fn remove_source(&mut self, id: &str) -> Option<Source> {
		let removed = self.sources.shift_remove(id)?;
		let mut unbound = 0;
		for slot in self.scenes.values_mut().flat_map(|scene| scene.slots.iter_mut()) {
			if slot.source_id.as_deref() == Some(id) {
				slot.source_id = None;
				unbound += 1;
			}
		}
		debug!(%id, unbound, "source removed");
		Some(removed)
	}

	/// Source dropped out of the compositor. Mixing state and slot bindings
	/// are kept so the source comes back as it was when it rejoins.
	pub fn mark_disconnected(&mut self, id: &str) -> bool {
		let Some(source) = self.sources.get_mut(id) else {
			return false;
		};
		source.connected = false;
		source.audio_level = 0.0;
		debug!(%id, "source disconnected");
		true
	}

	/// Move a source to a new key in place; slot bindings follow.
	/// When `to` is already known (a rejoin after a reload) the known entry
	/// keeps its position and mixing state and takes the descriptive fields
	/// of `from`.
	pub fn rekey_source(&mut self, from: &str, to: &str) -> Result<()> {
		if from == to {
			return Ok(());
		}
		if !self.sources.contains_key(from) {
			return Err(MixerError::SourceNotFound(from.to_string()));
		}

		if self.sources.contains_key(to) {
			let fresh = self.sources.shift_remove(from).ok_or_else(|| MixerError::SourceNotFound(from.to_string()))?;
			let known = self.source_mut(to)?;
			known.label = fresh.label;
			known.kind = fresh.kind;
			known.has_video = fresh.has_video;
			known.has_audio = fresh.has_audio;
			known.connected = fresh.connected;
			known.audio_level = fresh.audio_level;
			info!(%from, %to, "source merged into known stream id");
		} else {
			let index = self.sources.get_index_of(from).ok_or_else(|| MixerError::SourceNotFound(from.to_string()))?;
			let (_, mut source) = self.sources.shift_remove_index(index).ok_or_else(|| MixerError::SourceNotFound(from.to_string()))?;
			source.id = to.to_string();
			self.sources.shift_insert(index, to.to_string(), source);
			info!(%from, %to, "source re-keyed");
		}

		for slot in self.scenes.values_mut().flat_map(|scene| scene.slots.iter_mut()) {
			if slot.source_id.as_deref() == Some(from) {
				slot.source_id = Some(to.to_string());
			}
		}
		Ok(())
	}

	pub fn set_mute(&mut self, id: &str, muted: bool) -> Result<()> {
		self.source_mut(id)?.muted = muted;
		Ok(())
	}

	/// Clamps to 0–100 and returns the stored value
	pub fn set_volume(&mut self, id: &str, volume: u8) -> Result<u8> {
		let source = self.source_mut(id)?;
		source.volume = volume.min(100);
		Ok(source.volume)
	}

	/// Solo is exclusive: enabling it on one source clears it everywhere else
	pub fn set_solo(&mut self, id: &str, solo: bool) -> Result<()> {
		self.require_source(id)?;
		for source in self.sources.values_mut() {
			if source.id == id {
				source.solo = solo;
			} else if solo {
				source.solo = false;
			}
		}
		Ok(())
	}

	/// Meter updates for unknown sources are ignored
	pub fn set_audio_level(&mut self, id: &str, level: f64) -> bool {
		self.sources.get_mut(id).map(|source| source.audio_level = level).is_some()
	}

	pub fn set_signal(&mut self, id: &str, has_signal: bool) -> Result<()> {
		self.source_mut(id)?.has_video = has_signal;
		Ok(())
	}

	pub fn set_label(&mut self, id: &str, label: &str) -> Result<()> {
		label.clone_into(&mut self.source_mut(id)?.label);
		Ok(())
	}

	pub fn source(&self, id: &str) -> Result<&Source> {
		self.sources.get(id).ok_or_else(|| MixerError::SourceNotFound(id.to_string()))
	}

	pub fn sources(&self) -> impl Iterator<Item = &Source> {
		self.sources.values()
	}

	fn source_mut(&mut self, id: &str) -> Result<&mut Source> {
		self.sources.get_mut(id).ok_or_else(|| MixerError::SourceNotFound(id.to_string()))
	}

	fn require_source(&self, id: &str) -> Result<()> {
		self.source(id).map(|_| ())
	}

	fn build_slots(&self, drafts: Vec<SlotDraft>) -> Result<Vec<Slot>> {
		if drafts.is_empty() {
			return Err(MixerError::InvalidScene("a scene needs at least one slot".to_string()));
		}

		drafts
			.into_iter()
			.enumerate()
			.map(|(index, draft)| -> Result<Slot> {
				draft.position.validate()?;
				if let Some(source_id) = &draft.source_id {
					self.require_source(source_id)?;
				}
				Ok(Slot {
					id: Uuid::new_v4().to_string(),
					source_id: draft.source_id,
					position: draft.position,
					z_index: draft.z_index.unwrap_or_else(|| i32::try_from(index).unwrap_or(i32::MAX)),
				})
			})
			.collect()
	}
}
