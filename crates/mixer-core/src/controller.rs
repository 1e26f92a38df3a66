//! Scene pointers, the Take/Cut protocol and command emission.
//!
//! The controller is synchronous. Anything that has to happen later, such as
//! completing a timed Take, is returned to the caller as a plan and comes back
//! in through [`MixerController::complete_take`].

use crate::layout::layout_spec;
use crate::model::{MixerSnapshot, MixerState, MixerStatus, Scene, Source, SourceKind, Transition};
use crate::registry::{SceneDraft, ScenePatch, SceneRegistry, SlotPatch};
use crate::{MixerError, Result};
use compositor_bridge::{BridgeEvent, CommandSink, CompositorCommand};
use event_link::{DeviceEvent, LinkSession, SequencedEvent};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, instrument, trace, warn};

/// What a Take needs from the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum TakePlan {
	Completed,
	/// Call `complete_take(transition_id)` once `duration_ms` has elapsed
	#[serde(rename_all = "camelCase")]
	Scheduled { transition_id: u64, duration_ms: u64 },
}

impl TakePlan {
	#[must_use]
	pub const fn delay(&self) -> Option<Duration> {
		match self {
			Self::Completed => None,
			Self::Scheduled { duration_ms, .. } => Some(Duration::from_millis(*duration_ms)),
		}
	}
}

#[derive(Debug, Clone)]
struct PendingTake {
	transition_id: u64,
	scene_id: String,
}

pub struct MixerController<S: CommandSink> {
	sink: S,
	registry: SceneRegistry,
	state: MixerState,
	device_connected: bool,
	is_recording: bool,
	compositor_ready: bool,
	compositor_recording: bool,
	last_error: Option<String>,
	notice: Option<String>,
	pending: Option<PendingTake>,
	next_transition_id: u64,
	/// Members last pushed per compositor scene number
	applied: HashMap<u8, Vec<String>>,
	display_names: HashMap<String, String>,
}

impl<S: CommandSink> MixerController<S> {
	pub fn new(sink: S, registry: SceneRegistry) -> Self {
		Self {
			sink,
			registry,
			state: MixerState::default(),
			device_connected: false,
			is_recording: false,
			compositor_ready: false,
			compositor_recording: false,
			last_error: None,
			notice: None,
			pending: None,
			next_transition_id: 0,
			applied: HashMap::new(),
			display_names: HashMap::new(),
		}
	}

	#[must_use]
	pub fn with_transition(mut self, transition: Transition) -> Self {
		self.state.transition = transition;
		self
	}

	/// Labels that replace whatever the source reports about itself
	#[must_use]
	pub fn with_display_names(mut self, names: HashMap<String, String>) -> Self {
		self.display_names = names;
		self
	}

	// Pointers and transitions

	#[must_use]
	pub fn can_take(&self) -> bool {
		self.take_blocker().is_none()
	}

	fn take_blocker(&self) -> Option<&'static str> {
		match (&self.state.preview_scene_id, &self.state.program_scene_id) {
			(None, _) => Some("no preview scene selected"),
			(Some(preview), Some(program)) if preview == program => Some("preview is already on program"),
			_ if self.state.is_transitioning => Some("a transition is already running"),
			_ => None,
		}
	}

	pub fn set_preview(&mut self, scene_id: &str) -> Result<()> {
		self.registry.scene(scene_id)?;
		debug!(%scene_id, "preview staged");
		self.state.preview_scene_id = Some(scene_id.to_string());
		Ok(())
	}

	/// Start a Take. Instant transitions complete before returning.
	#[instrument(skip(self))]
	pub fn take_to_program(&mut self) -> Result<TakePlan> {
		if let Some(reason) = self.take_blocker() {
			return Err(self.reject(MixerError::TakeNotAllowed(reason)));
		}
		let Some(scene_id) = self.state.preview_scene_id.clone() else {
			return Err(self.reject(MixerError::TakeNotAllowed("no preview scene selected")));
		};

		self.state.is_transitioning = true;
		if let Err(e) = self.apply_scene(&scene_id) {
			self.state.is_transitioning = false;
			return Err(e);
		}

		let transition = self.state.transition;
		if transition.is_instant() {
			self.commit_program(scene_id);
			return Ok(TakePlan::Completed);
		}

		self.next_transition_id += 1;
		let transition_id = self.next_transition_id;
		self.pending = Some(PendingTake { transition_id, scene_id });
		info!(transition_id, duration_ms = transition.duration_ms, kind = ?transition.kind, "take started");

		Ok(TakePlan::Scheduled {
			transition_id,
			duration_ms: transition.duration_ms,
		})
	}

	/// Finish a timed Take. Stale ids from superseded takes are ignored.
	pub fn complete_take(&mut self, transition_id: u64) -> bool {
		match self.pending.take() {
			Some(pending) if pending.transition_id == transition_id => {
				self.commit_program(pending.scene_id);
				true
			}
			other => {
				trace!(transition_id, "stale transition completion ignored");
				self.pending = other;
				false
			}
		}
	}

	/// Immediate switch that ignores and supersedes any running Take
	#[instrument(skip(self))]
	pub fn cut_to_program(&mut self) -> Result<()> {
		let Some(scene_id) = self.state.preview_scene_id.clone() else {
			return Err(self.reject(MixerError::TakeNotAllowed("no preview scene selected")));
		};

		if let Some(pending) = self.pending.take() {
			info!(transition_id = pending.transition_id, "running take superseded by cut");
		}
		self.apply_scene(&scene_id)?;
		self.commit_program(scene_id);
		Ok(())
	}

	fn commit_program(&mut self, scene_id: String) {
		info!(%scene_id, "program updated");
		self.state.program_scene_id = Some(scene_id);
		self.state.is_transitioning = false;
	}

	/// Push a scene to the compositor without touching the pointers
	pub fn switch_to_scene(&mut self, scene_id: &str) -> Result<()> {
		self.apply_scene(scene_id)
	}

	pub fn set_transition(&mut self, transition: Transition) {
		debug!(?transition, "transition configured");
		self.state.transition = transition;
	}

	pub fn set_live(&mut self, live: bool) {
		if self.state.is_live != live {
			info!(live, "live output toggled");
		}
		self.state.is_live = live;
	}

	/// Membership, layout, then per-member audio. Each command is best effort.
	fn apply_scene(&mut self, scene_id: &str) -> Result<()> {
		let scene = self.registry.scene(scene_id)?.clone();
		let output = scene.target_output_index;
		let members = scene.members();

		let stale: Vec<String> = self.applied.get(&output).map(|previous| previous.iter().filter(|id| !members.contains(id)).cloned().collect()).unwrap_or_default();
		for target in stale {
			self.dispatch(CompositorCommand::RemoveFromScene { target, scene: output });
		}

		for target in &members {
			self.dispatch(CompositorCommand::AddToScene {
				target: target.clone(),
				scene: output,
			});
		}

		self.dispatch(CompositorCommand::Layout {
			scene: output,
			layout: layout_spec(&scene),
		});

		for target in &members {
			let Ok(source) = self.registry.source(target) else {
				continue;
			};
			let (muted, volume) = (source.muted, source.volume);
			self.dispatch(CompositorCommand::Mute { target: target.clone(), muted });
			self.dispatch(CompositorCommand::Volume {
				target: target.clone(),
				level: bridge_volume(volume),
			});
		}

		debug!(scene = %scene.name, output, members = members.len(), "scene applied");
		self.applied.insert(output, members);
		Ok(())
	}

	fn dispatch(&self, command: CompositorCommand) {
		if let Err(e) = self.sink.dispatch(command) {
			warn!("compositor command failed: {}", e);
		}
	}

	fn reject(&mut self, error: MixerError) -> MixerError {
		warn!("rejected: {}", error);
		self.notice = Some(error.to_string());
		error
	}

	/// Drop the last rejection once an operator action succeeds
	pub fn clear_notice(&mut self) {
		self.notice = None;
	}

	// Scene CRUD

	pub fn create_scene(&mut self, draft: SceneDraft) -> Result<Scene> {
		self.registry.create_scene(draft).map_err(|e| self.reject_if_invalid(e))
	}

	pub fn update_scene(&mut self, scene_id: &str, patch: ScenePatch) -> Result<Scene> {
		let scene = self.registry.update_scene(scene_id, patch).map_err(|e| self.reject_if_invalid(e))?;
		self.reapply_if_program(scene_id)?;
		Ok(scene)
	}

	pub fn update_slot(&mut self, scene_id: &str, slot_id: &str, patch: SlotPatch) -> Result<Scene> {
		let scene = self.registry.update_slot(scene_id, slot_id, patch).map_err(|e| self.reject_if_invalid(e))?;
		self.reapply_if_program(scene_id)?;
		Ok(scene)
	}

	pub fn duplicate_scene(&mut self, scene_id: &str) -> Result<Scene> {
		self.registry.duplicate_scene(scene_id)
	}

	pub fn delete_scene(&mut self, scene_id: &str) -> Result<Scene> {
		if self.pending.as_ref().is_some_and(|pending| pending.scene_id == scene_id) {
			return Err(self.reject(MixerError::ProgramSceneLocked(scene_id.to_string())));
		}
		let program = self.state.program_scene_id.clone();
		let scene = self.registry.delete_scene(scene_id, program.as_deref()).map_err(|e| self.reject_if_invalid(e))?;
		if self.state.preview_scene_id.as_deref() == Some(scene_id) {
			self.state.preview_scene_id = None;
		}
		Ok(scene)
	}

	fn reapply_if_program(&mut self, scene_id: &str) -> Result<()> {
		if self.state.program_scene_id.as_deref() == Some(scene_id) {
			self.apply_scene(scene_id)?;
		}
		Ok(())
	}

	fn reject_if_invalid(&mut self, error: MixerError) -> MixerError {
		if error.is_rejection() {
			self.reject(error)
		} else {
			error
		}
	}

	// Audio

	pub fn set_mute(&mut self, source_id: &str, muted: bool) -> Result<()> {
		self.registry.set_mute(source_id, muted)?;
		self.dispatch(CompositorCommand::Mute {
			target: source_id.to_string(),
			muted,
		});
		Ok(())
	}

	/// Returns the new mute state
	pub fn toggle_mute(&mut self, source_id: &str) -> Result<bool> {
		let muted = !self.registry.source(source_id)?.muted;
		self.set_mute(source_id, muted)?;
		Ok(muted)
	}

	/// `volume` on the local 0–100 scale
	pub fn set_volume(&mut self, source_id: &str, volume: u8) -> Result<u8> {
		let stored = self.registry.set_volume(source_id, volume)?;
		self.dispatch(CompositorCommand::Volume {
			target: source_id.to_string(),
			level: bridge_volume(stored),
		});
		Ok(stored)
	}

	pub fn set_solo_audio(&mut self, source_id: &str, enabled: bool) -> Result<()> {
		self.registry.set_solo(source_id, enabled)?;
		self.dispatch(CompositorCommand::SoloAudio {
			target: source_id.to_string(),
			enabled,
		});
		Ok(())
	}

	// Guest lifecycle and device controls

	/// Kick a source from the compositor and forget it locally
	pub fn remove_source(&mut self, source_id: &str) -> Result<Source> {
		let source = self.registry.remove_source(source_id).ok_or_else(|| MixerError::SourceNotFound(source_id.to_string()))?;
		self.dispatch(CompositorCommand::Hangup { target: source_id.to_string() });
		for members in self.applied.values_mut() {
			members.retain(|id| id != source_id);
		}
		Ok(source)
	}

	pub fn request_screen_share(&mut self, source_id: &str) -> Result<()> {
		self.registry.source(source_id)?;
		self.dispatch(CompositorCommand::RequestScreenShare { target: source_id.to_string() });
		Ok(())
	}

	pub fn send_direct_message(&mut self, source_id: &str, message: &str) -> Result<()> {
		self.registry.source(source_id)?;
		self.dispatch(CompositorCommand::DirectMessage {
			target: source_id.to_string(),
			message: message.to_string(),
		});
		Ok(())
	}

	pub fn start_recording(&mut self) {
		self.dispatch(CompositorCommand::StartRecording { target: None });
	}

	pub fn stop_recording(&mut self) {
		self.dispatch(CompositorCommand::StopRecording { target: None });
	}

	pub fn set_camera_enabled(&mut self, source_id: &str, enabled: bool) -> Result<()> {
		self.registry.set_signal(source_id, enabled)?;
		self.dispatch(CompositorCommand::Camera {
			target: source_id.to_string(),
			enabled,
		});
		Ok(())
	}

	pub fn ptz(&mut self, source_id: &str, pan: f64, tilt: f64, zoom: f64) -> Result<()> {
		self.registry.source(source_id)?;
		self.dispatch(CompositorCommand::PanTiltZoom {
			target: source_id.to_string(),
			pan,
			tilt,
			zoom,
		});
		Ok(())
	}

	/// Override a source label now and whenever it rejoins
	pub fn set_display_name(&mut self, source_id: &str, name: &str) -> Result<()> {
		self.display_names.insert(source_id.to_string(), name.to_string());
		match self.registry.set_label(source_id, name) {
			Ok(()) | Err(MixerError::SourceNotFound(_)) => Ok(()),
			Err(e) => Err(e),
		}
	}

	// Inbound facts

	/// Apply one normalized compositor event
	#[instrument(skip(self, event), fields(kind = event.label()))]
	pub fn on_bridge_event(&mut self, event: BridgeEvent) {
		match &event {
			BridgeEvent::Error { .. } | BridgeEvent::Unknown { .. } => {}
			_ => self.last_error = None,
		}

		match event {
			BridgeEvent::Ready { forced } => {
				let was_ready = self.compositor_ready;
				self.compositor_ready = true;
				self.state.compositor_connected = true;
				if !was_ready {
					info!(forced, "compositor ready, reconciling program");
					self.reconcile();
				}
			}
			BridgeEvent::Detached => {
				warn!("compositor detached");
				self.compositor_ready = false;
				self.state.compositor_connected = false;
				self.applied.clear();
			}
			BridgeEvent::SourceJoined {
				id,
				label,
				screen_share,
				has_video,
				has_audio,
			} => {
				let kind = if screen_share { SourceKind::Screen } else { SourceKind::Contributor };
				let label = self.display_names.get(&id).cloned().or(label).unwrap_or_else(|| id.clone());
				let mut source = Source::new(id, label, kind);
				source.has_video = has_video;
				source.has_audio = has_audio;
				self.registry.upsert_source(source);
			}
			BridgeEvent::SourceLeft { id, kicked } => {
				// Bindings survive a drop; only the remove intent unbinds slots
				if !self.registry.mark_disconnected(&id) {
					trace!(%id, kicked, "left event for unknown source");
				}
			}
			BridgeEvent::StreamIdResolved { uuid, stream_id } => self.rekey(&uuid, &stream_id),
			BridgeEvent::AudioLevel { id, level } => {
				self.registry.set_audio_level(&id, level);
			}
			BridgeEvent::MuteChanged { id, muted } => {
				if self.registry.set_mute(&id, muted).is_err() {
					trace!(%id, "mute change for unknown source");
				}
			}
			BridgeEvent::SceneChanged { scene } => debug!(%scene, "compositor scene changed"),
			BridgeEvent::RecordingStarted => self.compositor_recording = true,
			BridgeEvent::RecordingStopped => self.compositor_recording = false,
			BridgeEvent::Error { message } => self.last_error = Some(message),
			BridgeEvent::Unknown { kind } => trace!(%kind, "unhandled compositor event"),
		}
	}

	fn rekey(&mut self, uuid: &str, stream_id: &str) {
		match self.registry.rekey_source(uuid, stream_id) {
			Ok(()) => {}
			Err(e) => {
				trace!(%uuid, "nothing to re-key: {}", e);
				return;
			}
		}

		if let Some(name) = self.display_names.get(stream_id).cloned() {
			let _ = self.registry.set_label(stream_id, &name);
		}
		for members in self.applied.values_mut() {
			if members.iter().any(|id| id == stream_id) {
				members.retain(|id| id != uuid);
			} else {
				for id in members.iter_mut().filter(|id| id.as_str() == uuid) {
					*id = stream_id.to_string();
				}
			}
		}
	}

	/// Re-assert the program scene after the compositor (re)loads
	fn reconcile(&mut self) {
		self.applied.clear();
		let Some(program) = self.state.program_scene_id.clone() else {
			return;
		};
		if let Err(e) = self.apply_scene(&program) {
			warn!(%program, "could not reconcile program scene: {}", e);
		}
	}

	pub fn on_device_event(&mut self, event: SequencedEvent) {
		match event.event {
			DeviceEvent::RecorderStarted { recording_id } => {
				info!(?recording_id, "device recording started");
				self.is_recording = true;
			}
			DeviceEvent::RecorderStopped { recording_id } => {
				info!(?recording_id, "device recording stopped");
				self.is_recording = false;
			}
			DeviceEvent::RecorderError { message } => {
				warn!(%message, "device recorder error");
				self.is_recording = false;
				self.notice = Some(format!("Recorder error: {message}"));
			}
			DeviceEvent::SignalChanged { input, has_signal, resolution } => {
				debug!(%input, has_signal, ?resolution, "input signal changed");
				if self.registry.source(&input).is_err() {
					let label = self.display_names.get(&input).cloned().unwrap_or_else(|| input.clone());
					self.registry.upsert_source(Source::new(input.clone(), label, SourceKind::Camera));
				}
				let _ = self.registry.set_signal(&input, has_signal);
			}
			DeviceEvent::Heartbeat => trace!(seq = ?event.seq, "device heartbeat"),
			DeviceEvent::Unknown { kind } => trace!(%kind, "unhandled device event"),
		}
	}

	pub fn on_link_session(&mut self, session: &LinkSession) {
		if self.device_connected != session.connected {
			info!(connected = session.connected, last_seq = session.last_seq, "device link changed");
		}
		self.device_connected = session.connected;
	}

	// Reads

	#[must_use]
	pub fn state(&self) -> &MixerState {
		&self.state
	}

	#[must_use]
	pub const fn registry(&self) -> &SceneRegistry {
		&self.registry
	}

	#[must_use]
	pub fn status(&self) -> MixerStatus {
		MixerStatus {
			state: self.state.clone(),
			device_connected: self.device_connected,
			is_recording: self.is_recording,
			compositor_ready: self.compositor_ready,
			compositor_recording: self.compositor_recording,
			last_error: self.last_error.clone(),
			notice: self.notice.clone(),
		}
	}

	#[must_use]
	pub fn snapshot(&self) -> MixerSnapshot {
		MixerSnapshot {
			status: self.status(),
			scenes: self.registry.scenes().cloned().collect(),
			sources: self.registry.sources().cloned().collect(),
		}
	}
}

/// Local 0–100 to the compositor's 0–200
#[must_use]
pub fn bridge_volume(volume: u8) -> u16 {
	u16::from(volume.min(100)) * 2
}
