use crate::sources::DiscoveredSource;
use crate::trace::{EventStats, TraceEntry};
use crate::{BridgeError, BridgeEvent, CompositorBridge, CompositorCommand, CompositorTarget, Result};
use async_broadcast::{InactiveReceiver, Receiver, Sender, TrySendError};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const COMMAND_BUFFER: usize = 256;
const EVENT_BUFFER: usize = 256;

pub const DEFAULT_READY_FALLBACK: Duration = Duration::from_secs(5);

enum BridgeCommand {
	Send(CompositorCommand),
	Attach(Box<dyn CompositorTarget>),
	Detach,
	Inbound { origin: String, data: Value },
	History { limit: usize, reply: oneshot::Sender<Vec<TraceEntry>> },
	Stats(oneshot::Sender<EventStats>),
	Sources(oneshot::Sender<Vec<DiscoveredSource>>),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeStatus {
	pub attached: bool,
	pub ready: bool,
	pub last_error: Option<String>,
}

/// Owns a [`CompositorBridge`] and its readiness fallback timer
pub struct BridgeActor {
	bridge: CompositorBridge,
	ready_fallback: Duration,
	commands: mpsc::Receiver<BridgeCommand>,
	events: Sender<BridgeEvent>,
	status: watch::Sender<BridgeStatus>,
	cancel: CancellationToken,
}

impl BridgeActor {
	pub fn new(bridge: CompositorBridge, ready_fallback: Duration, parent: &CancellationToken) -> (Self, BridgeHandle) {
		let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
		let (mut event_tx, event_rx) = async_broadcast::broadcast(EVENT_BUFFER);
		event_tx.set_overflow(true);
		event_tx.set_await_active(false);

		let (status_tx, status_rx) = watch::channel(Self::status_of(&bridge));
		let cancel = parent.child_token();

		let handle = BridgeHandle {
			commands: command_tx,
			events: event_rx.deactivate(),
			status: status_rx,
			cancel: cancel.clone(),
		};

		let actor = Self {
			bridge,
			ready_fallback,
			commands: command_rx,
			events: event_tx,
			status: status_tx,
			cancel,
		};

		(actor, handle)
	}

	pub fn spawn(self) -> JoinHandle<()> {
		tokio::spawn(self.run())
	}

	pub async fn run(mut self) {
		info!(fallback_ms = self.ready_fallback.as_millis() as u64, "compositor bridge starting");

		let fallback = tokio::time::sleep(self.ready_fallback);
		tokio::pin!(fallback);
		let mut fallback_armed = self.bridge.is_attached();

		loop {
			tokio::select! {
				() = self.cancel.cancelled() => break,
				() = &mut fallback, if fallback_armed => {
					fallback_armed = false;
					if let Some(event) = self.bridge.force_ready() {
						self.publish(event);
					}
				}
				command = self.commands.recv() => {
					let Some(command) = command else { break };
					if self.handle_command(command) {
						fallback.as_mut().reset(Instant::now() + self.ready_fallback);
						fallback_armed = true;
					}
				}
			}

			if self.bridge.is_ready() || !self.bridge.is_attached() {
				fallback_armed = false;
			}
			self.publish_status();
		}

		info!("compositor bridge stopped");
	}

	/// Returns `true` when the readiness fallback must be re-armed
	fn handle_command(&mut self, command: BridgeCommand) -> bool {
		match command {
			BridgeCommand::Send(command) => {
				if let Err(e) = self.bridge.send(&command) {
					warn!("compositor command not delivered: {}", e);
				}
			}
			BridgeCommand::Attach(target) => {
				self.bridge.attach(target);
				return true;
			}
			BridgeCommand::Detach => {
				let event = self.bridge.detach();
				self.publish(event);
			}
			BridgeCommand::Inbound { origin, data } => match self.bridge.handle_inbound(&origin, &data) {
				Ok(events) => {
					for event in events {
						self.publish(event);
					}
				}
				Err(e) => debug!("inbound compositor message rejected: {}", e),
			},
			BridgeCommand::History { limit, reply } => {
				let _ = reply.send(self.bridge.event_history(limit));
			}
			BridgeCommand::Stats(reply) => {
				let _ = reply.send(self.bridge.event_stats());
			}
			BridgeCommand::Sources(reply) => {
				let _ = reply.send(self.bridge.sources().snapshot());
			}
		}
		false
	}

	fn publish(&self, event: BridgeEvent) {
		match self.events.try_broadcast(event) {
			Ok(Some(dropped)) => debug!(kind = dropped.label(), "bridge event buffer overflowed, oldest dropped"),
			Ok(None) | Err(TrySendError::Inactive(_)) => {}
			Err(e) => warn!("failed to publish bridge event: {}", e),
		}
	}

	fn publish_status(&self) {
		let next = Self::status_of(&self.bridge);
		self.status.send_if_modified(|current| {
			if *current == next {
				false
			} else {
				*current = next;
				true
			}
		});
	}

	fn status_of(bridge: &CompositorBridge) -> BridgeStatus {
		BridgeStatus {
			attached: bridge.is_attached(),
			ready: bridge.is_ready(),
			last_error: bridge.last_error().map(str::to_string),
		}
	}
}

/// Cloneable handle to a running [`BridgeActor`]
#[derive(Clone)]
pub struct BridgeHandle {
	commands: mpsc::Sender<BridgeCommand>,
	events: InactiveReceiver<BridgeEvent>,
	status: watch::Receiver<BridgeStatus>,
	cancel: CancellationToken,
}

impl BridgeHandle {
	/// Queue a command without waiting
	pub fn send_command(&self, command: CompositorCommand) -> Result<()> {
		self.commands.try_send(BridgeCommand::Send(command)).map_err(|e| match e {
			mpsc::error::TrySendError::Full(_) => BridgeError::QueueFull,
			mpsc::error::TrySendError::Closed(_) => BridgeError::ActorUnavailable,
		})
	}

	pub async fn attach(&self, target: impl CompositorTarget + 'static) -> Result<()> {
		self.request(BridgeCommand::Attach(Box::new(target))).await
	}

	pub async fn detach(&self) -> Result<()> {
		self.request(BridgeCommand::Detach).await
	}

	/// Hand one message posted by the compositor to the bridge
	pub async fn deliver_inbound(&self, origin: impl Into<String>, data: Value) -> Result<()> {
		self.request(BridgeCommand::Inbound { origin: origin.into(), data }).await
	}

	pub async fn event_history(&self, limit: usize) -> Result<Vec<TraceEntry>> {
		let (reply, rx) = oneshot::channel();
		self.request(BridgeCommand::History { limit, reply }).await?;
		rx.await.map_err(|_| BridgeError::ActorUnavailable)
	}

	pub async fn event_stats(&self) -> Result<EventStats> {
		let (reply, rx) = oneshot::channel();
		self.request(BridgeCommand::Stats(reply)).await?;
		rx.await.map_err(|_| BridgeError::ActorUnavailable)
	}

	pub async fn sources(&self) -> Result<Vec<DiscoveredSource>> {
		let (reply, rx) = oneshot::channel();
		self.request(BridgeCommand::Sources(reply)).await?;
		rx.await.map_err(|_| BridgeError::ActorUnavailable)
	}

	#[must_use]
	pub fn subscribe(&self) -> Receiver<BridgeEvent> {
		self.events.activate_cloned()
	}

	#[must_use]
	pub fn status(&self) -> BridgeStatus {
		self.status.borrow().clone()
	}

	#[must_use]
	pub fn watch_status(&self) -> watch::Receiver<BridgeStatus> {
		self.status.clone()
	}

	pub fn shutdown(&self) {
		self.cancel.cancel();
	}

	async fn request(&self, command: BridgeCommand) -> Result<()> {
		self.commands.send(command).await.map_err(|_| BridgeError::ActorUnavailable)
	}
}
