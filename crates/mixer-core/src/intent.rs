use crate::controller::{MixerController, TakePlan};
use crate::model::{Scene, Source, Transition};
use crate::registry::{SceneDraft, ScenePatch, SlotPatch};
use crate::Result;
use compositor_bridge::CommandSink;
use serde::{Deserialize, Serialize};

/// Operator requests, as accepted by the mixer actor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "intent", rename_all = "snake_case")]
pub enum MixerIntent {
	SetPreview { scene_id: String },
	Take,
	Cut,
	SwitchToScene { scene_id: String },
	SetTransition { transition: Transition },
	SetLive { live: bool },
	CreateScene { draft: SceneDraft },
	UpdateScene { scene_id: String, patch: ScenePatch },
	UpdateSlot { scene_id: String, slot_id: String, patch: SlotPatch },
	DuplicateScene { scene_id: String },
	DeleteScene { scene_id: String },
	SetMute { source_id: String, muted: bool },
	ToggleMute { source_id: String },
	SetVolume { source_id: String, volume: u8 },
	SetSoloAudio { source_id: String, enabled: bool },
	RemoveSource { source_id: String },
	RequestScreenShare { source_id: String },
	SendDirectMessage { source_id: String, message: String },
	StartRecording,
	StopRecording,
	SetCameraEnabled { source_id: String, enabled: bool },
	Ptz { source_id: String, pan: f64, tilt: f64, zoom: f64 },
	SetDisplayName { source_id: String, name: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reply", content = "value", rename_all = "snake_case")]
pub enum IntentReply {
	Done,
	Scene(Scene),
	Source(Source),
	Take(TakePlan),
	Muted(bool),
	Volume(u8),
}

impl MixerIntent {
	/// Run against a controller. The caller schedules any returned timed Take.
	pub fn apply<S: CommandSink>(self, controller: &mut MixerController<S>) -> Result<IntentReply> {
		let done = |()| IntentReply::Done;

		let result = match self {
			Self::SetPreview { scene_id } => controller.set_preview(&scene_id).map(done),
			Self::Take => controller.take_to_program().map(IntentReply::Take),
			Self::Cut => controller.cut_to_program().map(done),
			Self::SwitchToScene { scene_id } => controller.switch_to_scene(&scene_id).map(done),
			Self::SetTransition { transition } => {
				controller.set_transition(transition);
				Ok(IntentReply::Done)
			}
			Self::SetLive { live } => {
				controller.set_live(live);
				Ok(IntentReply::Done)
			}
			Self::CreateScene { draft } => controller.create_scene(draft).map(IntentReply::Scene),
			Self::UpdateScene { scene_id, patch } => controller.update_scene(&scene_id, patch).map(IntentReply::Scene),
			Self::UpdateSlot { scene_id, slot_id, patch } => controller.update_slot(&scene_id, &slot_id, patch).map(IntentReply::Scene),
			Self::DuplicateScene { scene_id } => controller.duplicate_scene(&scene_id).map(IntentReply::Scene),
			Self::DeleteScene { scene_id } => controller.delete_scene(&scene_id).map(IntentReply::Scene),
			Self::SetMute { source_id, muted } => controller.set_mute(&source_id, muted).map(|()| IntentReply::Muted(muted)),
			Self::ToggleMute { source_id } => controller.toggle_mute(&source_id).map(IntentReply::Muted),
			Self::SetVolume { source_id, volume } => controller.set_volume(&source_id, volume).map(IntentReply::Volume),
			Self::SetSoloAudio { source_id, enabled } => controller.set_solo_audio(&source_id, enabled).map(done),
			Self::RemoveSource { source_id } => controller.remove_source(&source_id).map(IntentReply::Source),
			Self::RequestScreenShare { source_id } => controller.request_screen_share(&source_id).map(done),
			Self::SendDirectMessage { source_id, message } => controller.send_direct_message(&source_id, &message).map(done),
			Self::StartRecording => {
				controller.start_recording();
				Ok(IntentReply::Done)
			}
			Self::StopRecording => {
				controller.stop_recording();
				Ok(IntentReply::Done)
			}
			Self::SetCameraEnabled { source_id, enabled } => controller.set_camera_enabled(&source_id, enabled).map(done),
			Self::Ptz { source_id, pan, tilt, zoom } => controller.ptz(&source_id, pan, tilt, zoom).map(done),
			Self::SetDisplayName { source_id, name } => controller.set_display_name(&source_id, &name).map(done),
		};

		if result.is_ok() {
			controller.clear_notice();
		}
		result
	}
}
