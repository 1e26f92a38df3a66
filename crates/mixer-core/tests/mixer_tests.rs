use compositor_bridge::{BridgeError, BridgeEvent, CommandSink, CompositorCommand, LayoutSpec};
use event_link::{DeviceEvent, LinkSession, SequencedEvent};
use mixer_core::{IntentReply, MixerActor, MixerController, MixerError, MixerHandle, MixerInputs, MixerIntent, SceneDraft, SceneRegistry, SlotDraft, SlotPosition, TakePlan, Transition, TransitionKind};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Records every command; optionally refuses mutes
#[derive(Clone, Default)]
struct RecordingSink {
	commands: Arc<Mutex<Vec<CompositorCommand>>>,
	fail_mutes: bool,
}

impl RecordingSink {
	fn failing_mutes() -> Self {
		Self {
			fail_mutes: true,
			..Self::default()
		}
	}

	fn take(&self) -> Vec<CompositorCommand> {
		std::mem::take(&mut *self.commands.lock().unwrap())
	}
}

impl CommandSink for RecordingSink {
	fn dispatch(&self, command: CompositorCommand) -> compositor_bridge::Result<()> {
		if self.fail_mutes && matches!(command, CompositorCommand::Mute { .. }) {
			return Err(BridgeError::Target("mute refused".to_string()));
		}
		self.commands.lock().unwrap().push(command);
		Ok(())
	}
}

struct Harness {
	mixer: MixerHandle,
	sink: RecordingSink,
	bridge: async_broadcast::Sender<BridgeEvent>,
	device: async_broadcast::Sender<SequencedEvent>,
	session: watch::Sender<LinkSession>,
	_root: CancellationToken,
}

impl Harness {
	fn start(sink: RecordingSink, transition: Transition) -> Self {
		let root = CancellationToken::new();
		let (bridge, bridge_events) = async_broadcast::broadcast(64);
		let (device, device_events) = async_broadcast::broadcast(64);
		let (session, link_session) = watch::channel(LinkSession::default());

		let controller = MixerController::new(sink.clone(), SceneRegistry::new()).with_transition(transition);
		let inputs = MixerInputs {
			bridge_events,
			device_events,
			link_session,
		};
		let (actor, mixer) = MixerActor::new(controller, inputs, &root);
		actor.spawn();

		Self {
			mixer,
			sink,
			bridge,
			device,
			session,
			_root: root,
		}
	}

	async fn bridge_event(&self, event: BridgeEvent) {
		self.bridge.broadcast(event).await.unwrap();
		settle().await;
	}

	async fn join(&self, id: &str) {
		self.bridge_event(BridgeEvent::SourceJoined {
			id: id.to_string(),
			label: None,
			screen_share: false,
			has_video: true,
			has_audio: true,
		})
		.await;
	}

	async fn scene(&self, name: &str, sources: &[&str]) -> String {
		let slots = if sources.is_empty() {
			vec![slot(None, SlotPosition::FULL)]
		} else {
			let width = 100.0 / sources.len() as f64;
			sources
				.iter()
				.enumerate()
				.map(|(i, id)| {
					slot(
						Some(id),
						SlotPosition {
							x: width * i as f64,
							y: 0.0,
							w: width,
							h: 100.0,
						},
					)
				})
				.collect()
		};
		let draft = SceneDraft {
			name: name.to_string(),
			target_output_index: None,
			slots,
		};
		match self.mixer.dispatch(MixerIntent::CreateScene { draft }).await.unwrap() {
			IntentReply::Scene(scene) => scene.id,
			other => panic!("unexpected reply {other:?}"),
		}
	}

	async fn put_on_program(&self, scene_id: &str) {
		self.mixer.dispatch(MixerIntent::SetPreview { scene_id: scene_id.to_string() }).await.unwrap();
		self.mixer.dispatch(MixerIntent::Cut).await.unwrap();
	}
}

fn slot(source: Option<&str>, position: SlotPosition) -> SlotDraft {
	SlotDraft {
		source_id: source.map(String::from),
		position,
		z_index: None,
	}
}

fn fade(duration_ms: u64) -> Transition {
	Transition {
		kind: TransitionKind::Fade,
		duration_ms,
	}
}

/// Let the actor drain what was just published
async fn settle() {
	tokio::time::sleep(Duration::from_millis(1)).await;
}

#[tokio::test(start_paused = true)]
async fn test_timed_take_completes_after_duration() {
	let harness = Harness::start(RecordingSink::default(), fade(500));
	let a = harness.scene("A", &[]).await;
	harness.mixer.dispatch(MixerIntent::SetPreview { scene_id: a.clone() }).await.unwrap();

	let reply = harness.mixer.dispatch(MixerIntent::Take).await.unwrap();
	assert!(matches!(reply, IntentReply::Take(TakePlan::Scheduled { duration_ms: 500, .. })));
	assert!(harness.mixer.status().state.is_transitioning);

	let second = harness.mixer.dispatch(MixerIntent::Take).await;
	assert!(matches!(second, Err(MixerError::TakeNotAllowed(_))));

	tokio::time::sleep(Duration::from_millis(499)).await;
	assert!(harness.mixer.status().state.is_transitioning);

	tokio::time::sleep(Duration::from_millis(2)).await;
	let status = harness.mixer.status();
	assert!(!status.state.is_transitioning);
	assert_eq!(status.state.program_scene_id.as_deref(), Some(a.as_str()));
}

#[tokio::test(start_paused = true)]
async fn test_cut_during_take_wins() {
	let harness = Harness::start(RecordingSink::default(), fade(1_000));
	let a = harness.scene("A", &[]).await;
	let b = harness.scene("B", &[]).await;

	harness.mixer.dispatch(MixerIntent::SetPreview { scene_id: a }).await.unwrap();
	harness.mixer.dispatch(MixerIntent::Take).await.unwrap();
	harness.mixer.dispatch(MixerIntent::SetPreview { scene_id: b.clone() }).await.unwrap();
	harness.mixer.dispatch(MixerIntent::Cut).await.unwrap();

	tokio::time::sleep(Duration::from_secs(2)).await;
	let status = harness.mixer.status();
	assert_eq!(status.state.program_scene_id.as_deref(), Some(b.as_str()));
	assert!(!status.state.is_transitioning);
}

#[tokio::test(start_paused = true)]
async fn test_two_scene_delete_scenario() {
	let harness = Harness::start(RecordingSink::default(), fade(0));
	let a = harness.scene("A", &[]).await;
	let b = harness.scene("B", &[]).await;
	harness.put_on_program(&a).await;

	let rejected = harness.mixer.dispatch(MixerIntent::DeleteScene { scene_id: a.clone() }).await;
	assert!(matches!(rejected, Err(MixerError::ProgramSceneLocked(_))));
	assert!(harness.mixer.status().notice.is_some());

	harness.mixer.dispatch(MixerIntent::DeleteScene { scene_id: b }).await.unwrap();
	assert_eq!(harness.mixer.status().notice, None);
	let snapshot = harness.mixer.snapshot().await.unwrap();
	assert_eq!(snapshot.scenes.len(), 1);
	assert_eq!(snapshot.scenes[0].id, a);
}

#[tokio::test(start_paused = true)]
async fn test_ready_reconciles_program_scene() {
	let harness = Harness::start(RecordingSink::default(), fade(0));
	harness.join("cam").await;
	let a = harness.scene("A", &["cam"]).await;
	harness.put_on_program(&a).await;
	harness.sink.take();

	harness.bridge_event(BridgeEvent::Ready { forced: false }).await;
	let commands = harness.sink.take();
	assert!(commands.contains(&CompositorCommand::AddToScene {
		target: "cam".to_string(),
		scene: 1
	}));
	assert!(commands.iter().any(|c| matches!(c, CompositorCommand::Layout { scene: 1, .. })));
	assert!(harness.mixer.status().compositor_ready);

	harness.bridge_event(BridgeEvent::Ready { forced: true }).await;
	assert!(harness.sink.take().is_empty(), "already ready, nothing to reconcile");

	harness.bridge_event(BridgeEvent::Detached).await;
	assert!(!harness.mixer.status().state.compositor_connected);
	harness.bridge_event(BridgeEvent::Ready { forced: true }).await;
	assert!(!harness.sink.take().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_failed_mute_does_not_block_layout() {
	let harness = Harness::start(RecordingSink::failing_mutes(), fade(0));
	harness.join("a").await;
	harness.join("b").await;
	let split = harness.scene("Split", &["a", "b"]).await;

	harness.mixer.dispatch(MixerIntent::SwitchToScene { scene_id: split }).await.unwrap();

	let commands = harness.sink.take();
	let layout = commands.iter().find_map(|c| match c {
		CompositorCommand::Layout { layout, .. } => Some(layout.clone()),
		_ => None,
	});
	assert!(matches!(layout, Some(LayoutSpec::Slots(slots)) if slots.len() == 2));
	assert_eq!(commands.iter().filter(|c| matches!(c, CompositorCommand::Volume { .. })).count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_switching_scenes_removes_stale_members() {
	let harness = Harness::start(RecordingSink::default(), fade(0));
	harness.join("a").await;
	harness.join("b").await;
	let first = harness.scene("A", &["a"]).await;
	let second = harness.scene("B", &["b"]).await;

	harness.mixer.dispatch(MixerIntent::SwitchToScene { scene_id: first }).await.unwrap();
	harness.sink.take();
	harness.mixer.dispatch(MixerIntent::SwitchToScene { scene_id: second }).await.unwrap();

	let commands = harness.sink.take();
	assert_eq!(
		commands[0],
		CompositorCommand::RemoveFromScene {
			target: "a".to_string(),
			scene: 1
		}
	);
}

#[tokio::test(start_paused = true)]
async fn test_stream_id_resolution_keeps_one_source() {
	let harness = Harness::start(RecordingSink::default(), fade(0));
	harness.join("abc").await;
	harness.mixer.dispatch(MixerIntent::SetVolume { source_id: "abc".to_string(), volume: 30 }).await.unwrap();

	harness
		.bridge_event(BridgeEvent::StreamIdResolved {
			uuid: "abc".to_string(),
			stream_id: "xyz123".to_string(),
		})
		.await;

	let snapshot = harness.mixer.snapshot().await.unwrap();
	assert_eq!(snapshot.sources.len(), 1);
	assert_eq!(snapshot.sources[0].id, "xyz123");
	assert_eq!(snapshot.sources[0].volume, 30);
}

#[tokio::test(start_paused = true)]
async fn test_compositor_reload_keeps_operator_mixing_state() {
	let harness = Harness::start(RecordingSink::default(), fade(0));
	let resolve = |uuid: &str| BridgeEvent::StreamIdResolved {
		uuid: uuid.to_string(),
		stream_id: "xyz".to_string(),
	};

	harness.join("uuid-1").await;
	harness.bridge_event(resolve("uuid-1")).await;
	let a = harness.scene("A", &["xyz"]).await;
	harness.put_on_program(&a).await;
	harness.mixer.dispatch(MixerIntent::SetMute { source_id: "xyz".to_string(), muted: true }).await.unwrap();
	harness.mixer.dispatch(MixerIntent::SetVolume { source_id: "xyz".to_string(), volume: 30 }).await.unwrap();

	harness.bridge_event(BridgeEvent::Detached).await;
	harness.bridge_event(BridgeEvent::Ready { forced: false }).await;
	harness.join("uuid-2").await;
	harness.bridge_event(resolve("uuid-2")).await;

	let snapshot = harness.mixer.snapshot().await.unwrap();
	assert_eq!(snapshot.sources.len(), 1);
	let source = &snapshot.sources[0];
	assert_eq!(source.id, "xyz");
	assert!(source.muted);
	assert_eq!(source.volume, 30);
	assert!(source.connected);

	harness.sink.take();
	harness.mixer.dispatch(MixerIntent::SwitchToScene { scene_id: a }).await.unwrap();
	let commands = harness.sink.take();
	assert!(commands.contains(&CompositorCommand::Mute {
		target: "xyz".to_string(),
		muted: true
	}));
	assert!(commands.contains(&CompositorCommand::Volume {
		target: "xyz".to_string(),
		level: 60
	}));
}

#[tokio::test(start_paused = true)]
async fn test_guest_drop_keeps_scene_bindings() {
	let harness = Harness::start(RecordingSink::default(), fade(0));
	harness.join("guest").await;
	let a = harness.scene("A", &["guest"]).await;
	harness.put_on_program(&a).await;

	harness
		.bridge_event(BridgeEvent::SourceLeft {
			id: "guest".to_string(),
			kicked: false,
		})
		.await;
	let snapshot = harness.mixer.snapshot().await.unwrap();
	assert_eq!(snapshot.scenes[0].slots[0].source_id.as_deref(), Some("guest"));
	assert!(!snapshot.sources[0].connected);

	harness.join("guest").await;
	let snapshot = harness.mixer.snapshot().await.unwrap();
	assert_eq!(snapshot.scenes[0].slots[0].source_id.as_deref(), Some("guest"));
	assert!(snapshot.sources[0].connected);

	harness.mixer.dispatch(MixerIntent::RemoveSource { source_id: "guest".to_string() }).await.unwrap();
	let snapshot = harness.mixer.snapshot().await.unwrap();
	assert_eq!(snapshot.scenes[0].slots[0].source_id, None);
	assert!(snapshot.sources.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_device_facts_reach_status() {
	let harness = Harness::start(RecordingSink::default(), fade(0));

	harness.session.send_replace(LinkSession {
		connected: true,
		last_seq: 3,
		reconnect_attempts: 0,
	});
	harness
		.device
		.broadcast(SequencedEvent {
			seq: Some(4),
			device_id: Some("dev-1".to_string()),
			ts: None,
			event: DeviceEvent::RecorderStarted { recording_id: None },
		})
		.await
		.unwrap();
	settle().await;

	let status = harness.mixer.status();
	assert!(status.device_connected);
	assert!(status.is_recording);
}

#[tokio::test(start_paused = true)]
async fn test_volume_and_mute_intents_reach_sink() {
	let harness = Harness::start(RecordingSink::default(), fade(0));
	harness.join("s1").await;

	let reply = harness.mixer.dispatch(MixerIntent::SetVolume { source_id: "s1".to_string(), volume: 50 }).await.unwrap();
	assert_eq!(reply, IntentReply::Volume(50));
	let reply = harness.mixer.dispatch(MixerIntent::ToggleMute { source_id: "s1".to_string() }).await.unwrap();
	assert_eq!(reply, IntentReply::Muted(true));

	assert_eq!(
		harness.sink.take(),
		vec![
			CompositorCommand::Volume {
				target: "s1".to_string(),
				level: 100
			},
			CompositorCommand::Mute {
				target: "s1".to_string(),
				muted: true
			},
		]
	);

	let missing = harness.mixer.dispatch(MixerIntent::SetVolume { source_id: "nope".to_string(), volume: 10 }).await;
	assert!(matches!(missing, Err(MixerError::SourceNotFound(_))));
}

#[tokio::test]
async fn test_handle_fails_after_shutdown() {
	let harness = Harness::start(RecordingSink::default(), fade(0));
	harness.mixer.shutdown();
	tokio::task::yield_now().await;
	tokio::time::sleep(Duration::from_millis(10)).await;

	assert!(matches!(harness.mixer.snapshot().await, Err(MixerError::ActorUnavailable)));
}
