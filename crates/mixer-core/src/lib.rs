// mixer-core
//
// Local model of scenes and sources plus the controller that keeps the
// compositor in step with it. Device facts and compositor events are applied
// by a single actor task; operator intents arrive through its handle.

mod actor;
mod controller;
mod error;
mod intent;
pub mod layout;
pub mod model;
pub mod registry;

pub use actor::{MixerActor, MixerHandle, MixerInputs};
pub use controller::{bridge_volume, MixerController, TakePlan};
pub use error::{MixerError, Result};
pub use intent::{IntentReply, MixerIntent};
pub use model::{LayoutPreset, MixerSnapshot, MixerState, MixerStatus, Scene, Slot, SlotPosition, Source, SourceKind, Transition, TransitionKind};
pub use registry::{SceneDraft, ScenePatch, SceneRegistry, SlotDraft, SlotPatch};
