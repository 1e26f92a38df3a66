use compositor_bridge::BridgeError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, MixerError>;

#[derive(Debug, Error)]
pub enum MixerError {
	#[error("Scene not found: {0}")]
	SceneNotFound(String),

	#[error("Source not found: {0}")]
	SourceNotFound(String),

	#[error("Slot {slot} not found in scene {scene}")]
	SlotNotFound { scene: String, slot: String },

	#[error("Invalid scene: {0}")]
	InvalidScene(String),

	#[error("Scene {0} is on program and cannot be deleted")]
	ProgramSceneLocked(String),

	#[error("The last remaining scene cannot be deleted")]
	LastScene,

	#[error("Take not allowed: {0}")]
	TakeNotAllowed(&'static str),

	#[error("Compositor bridge error: {0}")]
	Bridge(#[from] BridgeError),

	#[error("Mixer actor unavailable")]
	ActorUnavailable,
}

impl MixerError {
	/// Invariant rejections: the request was refused and nothing changed
	#[must_use]
	pub const fn is_rejection(&self) -> bool {
		matches!(self, Self::InvalidScene(_) | Self::ProgramSceneLocked(_) | Self::LastScene | Self::TakeNotAllowed(_))
	}

	#[must_use]
	pub const fn is_not_found(&self) -> bool {
		matches!(self, Self::SceneNotFound(_) | Self::SourceNotFound(_) | Self::SlotNotFound { .. })
	}
}
