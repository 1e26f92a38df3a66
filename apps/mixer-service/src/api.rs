//! HTTP intent surface for UI layers.

use crate::error::{Error, Result};
use crate::preferences::PreferenceStore;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use compositor_bridge::{BridgeHandle, BridgeStatus, EventStats, TraceEntry};
use event_link::{EventLinkHandle, LinkSession};
use mixer_core::{IntentReply, MixerHandle, MixerIntent, MixerStatus, Scene, SceneDraft, ScenePatch, SlotPatch, Source, TakePlan, Transition};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

const DEFAULT_HISTORY_LIMIT: usize = 50;

#[derive(Clone)]
pub struct AppState {
	pub mixer: MixerHandle,
	pub bridge: BridgeHandle,
	pub link: EventLinkHandle,
	pub preferences: Arc<dyn PreferenceStore>,
	/// Serializes read-modify-write of the preference file
	pub preferences_lock: Arc<Mutex<()>>,
}

impl AppState {
	pub fn new(mixer: MixerHandle, bridge: BridgeHandle, link: EventLinkHandle, preferences: Arc<dyn PreferenceStore>) -> Self {
		Self {
			mixer,
			bridge,
			link,
			preferences,
			preferences_lock: Arc::new(Mutex::new(())),
		}
	}
}

pub fn router(state: AppState) -> Router {
	let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

	Router::new()
		.route("/status", get(status))
		.route("/scenes", get(list_scenes).post(create_scene))
		.route("/scenes/:id", delete(delete_scene).patch(update_scene))
		.route("/scenes/:id/duplicate", post(duplicate_scene))
		.route("/scenes/:id/slots/:slot", axum::routing::patch(update_slot))
		.route("/preview/:id", post(set_preview))
		.route("/switch/:id", post(switch_to_scene))
		.route("/take", post(take))
		.route("/cut", post(cut))
		.route("/transition", post(set_transition))
		.route("/live", post(set_live))
		.route("/sources", get(list_sources))
		.route("/sources/:id", delete(remove_source))
		.route("/sources/:id/mute", post(mute))
		.route("/sources/:id/volume", post(volume))
		.route("/sources/:id/solo", post(solo))
		.route("/sources/:id/screen-share", post(request_screen_share))
		.route("/sources/:id/message", post(direct_message))
		.route("/sources/:id/camera", post(camera))
		.route("/sources/:id/ptz", post(ptz))
		.route("/sources/:id/name", post(rename))
		.route("/recording/start", post(start_recording))
		.route("/recording/stop", post(stop_recording))
		.route("/bridge/history", get(bridge_history))
		.route("/bridge/stats", get(bridge_stats))
		.route("/link/retry", post(link_retry))
		.layer(cors)
		.with_state(state)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
	#[serde(flatten)]
	pub mixer: MixerStatus,
	pub link: LinkSession,
	pub bridge: BridgeStatus,
}

#[derive(Debug, Deserialize)]
pub struct MuteRequest {
	/// Toggles when absent
	#[serde(default)]
	pub muted: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct VolumeRequest {
	pub volume: u8,
}

#[derive(Debug, Deserialize)]
pub struct EnabledRequest {
	pub enabled: bool,
}

#[derive(Debug, Deserialize)]
pub struct LiveRequest {
	pub live: bool,
}

#[derive(Debug, Deserialize)]
pub struct MessageRequest {
	pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct PtzRequest {
	pub pan: f64,
	pub tilt: f64,
	pub zoom: f64,
}

#[derive(Debug, Deserialize)]
pub struct RenameRequest {
	pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
	pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct MuteResponse {
	pub muted: bool,
}

#[derive(Debug, Serialize)]
pub struct VolumeResponse {
	pub volume: u8,
}

async fn dispatch(state: &AppState, intent: MixerIntent) -> Result<IntentReply> {
	Ok(state.mixer.dispatch(intent).await?)
}

async fn dispatch_scene(state: &AppState, intent: MixerIntent) -> Result<Scene> {
	match dispatch(state, intent).await? {
		IntentReply::Scene(scene) => Ok(scene),
		other => Err(Error::UnexpectedReply(format!("{other:?}"))),
	}
}

async fn acknowledge(state: &AppState, intent: MixerIntent) -> Result<Json<MixerStatus>> {
	dispatch(state, intent).await?;
	Ok(Json(state.mixer.status()))
}

async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
	Json(StatusResponse {
		mixer: state.mixer.status(),
		link: state.link.current_session(),
		bridge: state.bridge.status(),
	})
}

async fn list_scenes(State(state): State<AppState>) -> Result<Json<Vec<Scene>>> {
	Ok(Json(state.mixer.snapshot().await?.scenes))
}

async fn create_scene(State(state): State<AppState>, Json(draft): Json<SceneDraft>) -> Result<(StatusCode, Json<Scene>)> {
	let scene = dispatch_scene(&state, MixerIntent::CreateScene { draft }).await?;
	Ok((StatusCode::CREATED, Json(scene)))
}

async fn update_scene(State(state): State<AppState>, Path(scene_id): Path<String>, Json(patch): Json<ScenePatch>) -> Result<Json<Scene>> {
	Ok(Json(dispatch_scene(&state, MixerIntent::UpdateScene { scene_id, patch }).await?))
}

async fn update_slot(State(state): State<AppState>, Path((scene_id, slot_id)): Path<(String, String)>, Json(patch): Json<SlotPatch>) -> Result<Json<Scene>> {
	Ok(Json(dispatch_scene(&state, MixerIntent::UpdateSlot { scene_id, slot_id, patch }).await?))
}

async fn duplicate_scene(State(state): State<AppState>, Path(scene_id): Path<String>) -> Result<(StatusCode, Json<Scene>)> {
	let scene = dispatch_scene(&state, MixerIntent::DuplicateScene { scene_id }).await?;
	Ok((StatusCode::CREATED, Json(scene)))
}

async fn delete_scene(State(state): State<AppState>, Path(scene_id): Path<String>) -> Result<StatusCode> {
	dispatch(&state, MixerIntent::DeleteScene { scene_id }).await?;
	Ok(StatusCode::NO_CONTENT)
}

async fn set_preview(State(state): State<AppState>, Path(scene_id): Path<String>) -> Result<Json<MixerStatus>> {
	acknowledge(&state, MixerIntent::SetPreview { scene_id }).await
}

async fn switch_to_scene(State(state): State<AppState>, Path(scene_id): Path<String>) -> Result<Json<MixerStatus>> {
	acknowledge(&state, MixerIntent::SwitchToScene { scene_id }).await
}

async fn take(State(state): State<AppState>) -> Result<Json<TakePlan>> {
	match dispatch(&state, MixerIntent::Take).await? {
		IntentReply::Take(plan) => Ok(Json(plan)),
		other => Err(Error::UnexpectedReply(format!("{other:?}"))),
	}
}

async fn cut(State(state): State<AppState>) -> Result<Json<MixerStatus>> {
	acknowledge(&state, MixerIntent::Cut).await
}

async fn set_transition(State(state): State<AppState>, Json(transition): Json<Transition>) -> Result<Json<MixerStatus>> {
	acknowledge(&state, MixerIntent::SetTransition { transition }).await
}

async fn set_live(State(state): State<AppState>, Json(request): Json<LiveRequest>) -> Result<Json<MixerStatus>> {
	acknowledge(&state, MixerIntent::SetLive { live: request.live }).await
}

async fn list_sources(State(state): State<AppState>) -> Result<Json<Vec<Source>>> {
	Ok(Json(state.mixer.snapshot().await?.sources))
}

async fn remove_source(State(state): State<AppState>, Path(source_id): Path<String>) -> Result<StatusCode> {
	dispatch(&state, MixerIntent::RemoveSource { source_id }).await?;
	Ok(StatusCode::NO_CONTENT)
}

async fn mute(State(state): State<AppState>, Path(source_id): Path<String>, Json(request): Json<MuteRequest>) -> Result<Json<MuteResponse>> {
	let intent = match request.muted {
		Some(muted) => MixerIntent::SetMute { source_id, muted },
		None => MixerIntent::ToggleMute { source_id },
	};
	match dispatch(&state, intent).await? {
		IntentReply::Muted(muted) => Ok(Json(MuteResponse { muted })),
		other => Err(Error::UnexpectedReply(format!("{other:?}"))),
	}
}

async fn volume(State(state): State<AppState>, Path(source_id): Path<String>, Json(request): Json<VolumeRequest>) -> Result<Json<VolumeResponse>> {
	match dispatch(&state, MixerIntent::SetVolume { source_id, volume: request.volume }).await? {
		IntentReply::Volume(volume) => Ok(Json(VolumeResponse { volume })),
		other => Err(Error::UnexpectedReply(format!("{other:?}"))),
	}
}

async fn solo(State(state): State<AppState>, Path(source_id): Path<String>, Json(request): Json<EnabledRequest>) -> Result<StatusCode> {
	dispatch(&state, MixerIntent::SetSoloAudio { source_id, enabled: request.enabled }).await?;
	Ok(StatusCode::NO_CONTENT)
}

async fn request_screen_share(State(state): State<AppState>, Path(source_id): Path<String>) -> Result<StatusCode> {
	dispatch(&state, MixerIntent::RequestScreenShare { source_id }).await?;
	Ok(StatusCode::ACCEPTED)
}

async fn direct_message(State(state): State<AppState>, Path(source_id): Path<String>, Json(request): Json<MessageRequest>) -> Result<StatusCode> {
	dispatch(&state, MixerIntent::SendDirectMessage { source_id, message: request.message }).await?;
	Ok(StatusCode::ACCEPTED)
}

async fn camera(State(state): State<AppState>, Path(source_id): Path<String>, Json(request): Json<EnabledRequest>) -> Result<StatusCode> {
	dispatch(&state, MixerIntent::SetCameraEnabled { source_id, enabled: request.enabled }).await?;
	Ok(StatusCode::NO_CONTENT)
}

async fn ptz(State(state): State<AppState>, Path(source_id): Path<String>, Json(request): Json<PtzRequest>) -> Result<StatusCode> {
	let PtzRequest { pan, tilt, zoom } = request;
	dispatch(&state, MixerIntent::Ptz { source_id, pan, tilt, zoom }).await?;
	Ok(StatusCode::ACCEPTED)
}

/// Apply the override now and persist it for later sessions
async fn rename(State(state): State<AppState>, Path(source_id): Path<String>, Json(request): Json<RenameRequest>) -> Result<StatusCode> {
	dispatch(
		&state,
		MixerIntent::SetDisplayName {
			source_id: source_id.clone(),
			name: request.name.clone(),
		},
	)
	.await?;

	let _guard = state.preferences_lock.lock().await;
	let mut preferences = state.preferences.load().await?;
	preferences.display_names.insert(source_id, request.name);
	state.preferences.save(&preferences).await?;
	Ok(StatusCode::NO_CONTENT)
}

async fn start_recording(State(state): State<AppState>) -> Result<StatusCode> {
	dispatch(&state, MixerIntent::StartRecording).await?;
	Ok(StatusCode::ACCEPTED)
}

async fn stop_recording(State(state): State<AppState>) -> Result<StatusCode> {
	dispatch(&state, MixerIntent::StopRecording).await?;
	Ok(StatusCode::ACCEPTED)
}

async fn bridge_history(State(state): State<AppState>, Query(query): Query<HistoryQuery>) -> Result<Json<Vec<TraceEntry>>> {
	let limit = query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
	Ok(Json(state.bridge.event_history(limit).await?))
}

async fn bridge_stats(State(state): State<AppState>) -> Result<Json<EventStats>> {
	Ok(Json(state.bridge.event_stats().await?))
}

async fn link_retry(State(state): State<AppState>) -> StatusCode {
	info!("manual device link retry requested");
	state.link.reconnect_now();
	StatusCode::ACCEPTED
}
