use crate::api::{router, AppState};
use crate::preferences::{JsonFilePreferences, PreferenceStore};
use crate::{Config, Error, Result};
use compositor_bridge::{run_relay, BridgeActor, CompositorBridge, OriginPolicy};
use event_link::{EventLink, RetryConfig, WebSocketConnector};
use mixer_core::{MixerActor, MixerController, MixerInputs, SceneDraft, SceneRegistry, SlotDraft, SlotPosition, Transition, TransitionKind};
use std::sync::Arc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

/// Wires the device link, compositor bridge, mixer and HTTP surface together
pub struct MixerService {
	config: Config,
	cancel_token: CancellationToken,
}

impl MixerService {
	#[must_use]
	pub fn new(config: Config) -> Self {
		Self {
			config,
			cancel_token: CancellationToken::new(),
		}
	}

	/// Token that stops the whole service when cancelled
	#[must_use]
	pub fn cancel_token(&self) -> CancellationToken {
		self.cancel_token.clone()
	}

	/// Run the service until shutdown
	pub async fn run(self) -> Result<()> {
		let config = self.config;
		let root = self.cancel_token;

		let preferences = Arc::new(JsonFilePreferences::new(&config.preferences_path));
		let stored = preferences.load().await?;
		tracing::info!(path = %preferences.path().display(), overrides = stored.display_names.len(), "📋 Preferences loaded");

		// Device link
		let (link, link_handle) = EventLink::new(WebSocketConnector::new(&config.device_events_url), RetryConfig::default(), &root);

		// Compositor bridge
		let origin = OriginPolicy::new(&config.compositor_origin)?;
		let (bridge, bridge_handle) = BridgeActor::new(CompositorBridge::new(origin, config.trace_capacity), config.ready_fallback, &root);

		// Mixer
		let transition = Transition {
			kind: TransitionKind::Fade,
			duration_ms: u64::try_from(config.transition_duration.as_millis()).unwrap_or(u64::MAX),
		};
		let mut controller = MixerController::new(bridge_handle.clone(), SceneRegistry::new())
			.with_transition(transition)
			.with_display_names(stored.display_names);
		let main = controller.create_scene(SceneDraft {
			name: "Main".to_string(),
			target_output_index: None,
			slots: vec![SlotDraft {
				source_id: None,
				position: SlotPosition::FULL,
				z_index: None,
			}],
		})?;
		controller.set_preview(&main.id)?;

		let inputs = MixerInputs {
			bridge_events: bridge_handle.subscribe(),
			device_events: link_handle.subscribe(),
			link_session: link_handle.watch_session(),
		};
		let (mixer, mixer_handle) = MixerActor::new(controller, inputs, &root);

		let link_task = link.spawn();
		let bridge_task = bridge.spawn();
		let mixer_task = mixer.spawn();
		let relay_task = tokio::spawn(run_relay(WebSocketConnector::new(&config.compositor_relay_url), bridge_handle.clone(), RetryConfig::default(), root.child_token()));
		tracing::info!(device = %config.device_events_url, relay = %config.compositor_relay_url, "🔌 Connecting to device and compositor");

		// HTTP
		let state = AppState::new(mixer_handle, bridge_handle, link_handle, preferences as Arc<dyn PreferenceStore>);
		let listener = tokio::net::TcpListener::bind(config.http_bind).await?;
		tracing::info!("📡 HTTP intent surface listening on {}", config.http_bind);
		let http_shutdown = root.clone();
		let http_task = tokio::spawn(async move {
			if let Err(e) = axum::serve(listener, router(state)).with_graceful_shutdown(http_shutdown.cancelled_owned()).await {
				tracing::error!("❌ HTTP server failed: {}", e);
			}
		});

		// Setup graceful shutdown handler
		let shutdown_token = root.clone();
		tokio::spawn(async move {
			match tokio::signal::ctrl_c().await {
				Ok(()) => {
					tracing::info!("🛑 Shutdown signal received");
					shutdown_token.cancel();
				}
				Err(e) => {
					tracing::error!("❌ Failed to listen for shutdown signal: {}", e);
				}
			}
		});

		root.cancelled().await;
		tracing::info!("🔄 Initiating graceful shutdown...");

		let joined = timeout(config.shutdown_timeout, async {
			let _ = tokio::join!(http_task, relay_task, mixer_task, bridge_task, link_task);
		})
		.await;
		if joined.is_err() {
			tracing::warn!("⚠️ Shutdown timed out after {:?}", config.shutdown_timeout);
			return Err(Error::Timeout(format!("shutdown exceeded {:?}", config.shutdown_timeout)));
		}

		tracing::info!("✅ Graceful shutdown complete");
		Ok(())
	}
}
