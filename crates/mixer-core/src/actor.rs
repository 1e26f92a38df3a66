use crate::controller::{MixerController, TakePlan};
use crate::intent::{IntentReply, MixerIntent};
use crate::model::{MixerSnapshot, MixerStatus};
use crate::{MixerError, Result};
use async_broadcast::{Receiver, RecvError};
use compositor_bridge::{BridgeEvent, CommandSink};
use event_link::{LinkSession, SequencedEvent};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const INBOX_BUFFER: usize = 64;

enum MixerMessage {
	Intent {
		intent: MixerIntent,
		reply: oneshot::Sender<Result<IntentReply>>,
	},
	Snapshot(oneshot::Sender<MixerSnapshot>),
}

/// Streams the mixer consumes besides operator intents
pub struct MixerInputs {
	pub bridge_events: Receiver<BridgeEvent>,
	pub device_events: Receiver<SequencedEvent>,
	pub link_session: watch::Receiver<LinkSession>,
}

/// Single owner of the controller. Intents, bridge events, device events and
/// transition timers are all applied from this task, in arrival order.
pub struct MixerActor<S: CommandSink + 'static> {
	controller: MixerController<S>,
	inbox: mpsc::Receiver<MixerMessage>,
	bridge_events: Option<Receiver<BridgeEvent>>,
	device_events: Option<Receiver<SequencedEvent>>,
	link_session: Option<watch::Receiver<LinkSession>>,
	timer_tx: mpsc::UnboundedSender<u64>,
	timer_rx: mpsc::UnboundedReceiver<u64>,
	status: watch::Sender<MixerStatus>,
	cancel: CancellationToken,
}

impl<S: CommandSink + 'static> MixerActor<S> {
	pub fn new(controller: MixerController<S>, inputs: MixerInputs, parent: &CancellationToken) -> (Self, MixerHandle) {
		let (inbox_tx, inbox_rx) = mpsc::channel(INBOX_BUFFER);
		let (timer_tx, timer_rx) = mpsc::unbounded_channel();
		let (status_tx, status_rx) = watch::channel(controller.status());
		let cancel = parent.child_token();

		let handle = MixerHandle {
			inbox: inbox_tx,
			status: status_rx,
			cancel: cancel.clone(),
		};

		let actor = Self {
			controller,
			inbox: inbox_rx,
			bridge_events: Some(inputs.bridge_events),
			device_events: Some(inputs.device_events),
			link_session: Some(inputs.link_session),
			timer_tx,
			timer_rx,
			status: status_tx,
			cancel,
		};

		(actor, handle)
	}

	pub fn spawn(self) -> JoinHandle<()> {
		tokio::spawn(self.run())
	}

	pub async fn run(mut self) {
		info!("mixer starting");
		if let Some(session) = &self.link_session {
			let session = session.borrow().clone();
			self.controller.on_link_session(&session);
		}
		self.publish_status();

		loop {
			tokio::select! {
				() = self.cancel.cancelled() => break,
				message = self.inbox.recv() => {
					let Some(message) = message else { break };
					self.handle_message(message);
				}
				Some(transition_id) = self.timer_rx.recv() => {
					if self.controller.complete_take(transition_id) {
						debug!(transition_id, "take completed");
					}
				}
				event = next_event(&mut self.bridge_events) => {
					if let Some(event) = event {
						self.controller.on_bridge_event(event);
					}
				}
				event = next_event(&mut self.device_events) => {
					if let Some(event) = event {
						self.controller.on_device_event(event);
					}
				}
				session = next_session(&mut self.link_session) => {
					if let Some(session) = session {
						self.controller.on_link_session(&session);
					}
				}
			}

			self.publish_status();
		}

		info!("mixer stopped");
	}

	fn handle_message(&mut self, message: MixerMessage) {
		match message {
			MixerMessage::Intent { intent, reply } => {
				let result = intent.apply(&mut self.controller);
				if let Ok(IntentReply::Take(plan)) = &result {
					self.schedule(*plan);
				}
				// Callers read the status watch right after the reply
				self.publish_status();
				let _ = reply.send(result);
			}
			MixerMessage::Snapshot(reply) => {
				let _ = reply.send(self.controller.snapshot());
			}
		}
	}

	/// Post the completion back into the inbox once the transition has run
	fn schedule(&self, plan: TakePlan) {
		let (TakePlan::Scheduled { transition_id, .. }, Some(delay)) = (plan, plan.delay()) else {
			return;
		};
		let timer_tx = self.timer_tx.clone();
		let cancel = self.cancel.clone();

		tokio::spawn(async move {
			tokio::select! {
				() = cancel.cancelled() => {}
				() = tokio::time::sleep(delay) => {
					let _ = timer_tx.send(transition_id);
				}
			}
		});
	}

	fn publish_status(&self) {
		let next = self.controller.status();
		self.status.send_if_modified(|current| {
			if *current == next {
				false
			} else {
				*current = next;
				true
			}
		});
	}
}

/// Next event from an optional subscription. Closed subscriptions are
/// dropped and never yield again.
async fn next_event<T: Clone>(slot: &mut Option<Receiver<T>>) -> Option<T> {
	let Some(receiver) = slot.as_mut() else {
		return std::future::pending().await;
	};

	let received = receiver.recv().await;
	match received {
		Ok(event) => Some(event),
		Err(RecvError::Overflowed(missed)) => {
			warn!(missed, "mixer fell behind, events dropped");
			None
		}
		Err(RecvError::Closed) => {
			debug!("event subscription closed");
			*slot = None;
			None
		}
	}
}

async fn next_session(slot: &mut Option<watch::Receiver<LinkSession>>) -> Option<LinkSession> {
	let Some(receiver) = slot.as_mut() else {
		return std::future::pending().await;
	};

	if receiver.changed().await.is_err() {
		debug!("link session channel closed");
		*slot = None;
		return None;
	}
	Some(receiver.borrow_and_update().clone())
}

/// Cloneable handle to a running [`MixerActor`]
#[derive(Clone)]
pub struct MixerHandle {
	inbox: mpsc::Sender<MixerMessage>,
	status: watch::Receiver<MixerStatus>,
	cancel: CancellationToken,
}

impl MixerHandle {
	pub async fn dispatch(&self, intent: MixerIntent) -> Result<IntentReply> {
		let (reply, rx) = oneshot::channel();
		self.inbox.send(MixerMessage::Intent { intent, reply }).await.map_err(|_| MixerError::ActorUnavailable)?;
		rx.await.map_err(|_| MixerError::ActorUnavailable)?
	}

	pub async fn snapshot(&self) -> Result<MixerSnapshot> {
		let (reply, rx) = oneshot::channel();
		self.inbox.send(MixerMessage::Snapshot(reply)).await.map_err(|_| MixerError::ActorUnavailable)?;
		rx.await.map_err(|_| MixerError::ActorUnavailable)
	}

	#[must_use]
	pub fn status(&self) -> MixerStatus {
		self.status.borrow().clone()
	}

	#[must_use]
	pub fn watch_status(&self) -> watch::Receiver<MixerStatus> {
		self.status.clone()
	}

	pub fn shutdown(&self) {
		self.cancel.cancel();
	}
}
