use crate::{Connector, DeviceEnvelope, DeviceEvent, LinkChannel, LinkError, LinkSession, OutboundMessage, Result, RetryConfig, SequencedEvent, SessionTracker};
use async_broadcast::{InactiveReceiver, Receiver, Sender, TrySendError};
use serde_json::Value;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, trace, warn};

const COMMAND_BUFFER: usize = 64;
const EVENT_BUFFER: usize = 256;

#[derive(Debug)]
enum LinkCommand {
	Send(OutboundMessage),
	ReconnectNow,
	GetSession(oneshot::Sender<LinkSession>),
}

/// The link actor. Owns the connection, the cursor and the reconnect timer.
pub struct EventLink<C: Connector> {
	connector: C,
	tracker: SessionTracker,
	commands: mpsc::Receiver<LinkCommand>,
	events: Sender<SequencedEvent>,
	session: watch::Sender<LinkSession>,
	cancel: CancellationToken,
}

impl<C: Connector> EventLink<C> {
	/// Create the actor and its handle. `parent` cancels the link on teardown.
	pub fn new(connector: C, retry: RetryConfig, parent: &CancellationToken) -> (Self, EventLinkHandle) {
		let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
		let (mut event_tx, event_rx) = async_broadcast::broadcast(EVENT_BUFFER);
		event_tx.set_overflow(true);
		event_tx.set_await_active(false);

		let tracker = SessionTracker::new(retry);
		let (session_tx, session_rx) = watch::channel(tracker.session().clone());
		let cancel = parent.child_token();

		let handle = EventLinkHandle {
			commands: command_tx,
			events: event_rx.deactivate(),
			session: session_rx,
			cancel: cancel.clone(),
		};

		let link = Self {
			connector,
			tracker,
			commands: command_rx,
			events: event_tx,
			session: session_tx,
			cancel,
		};

		(link, handle)
	}

	/// Spawn the actor on the current runtime
	pub fn spawn(self) -> JoinHandle<()> {
		tokio::spawn(self.run())
	}

	/// Connect, pump, back off, repeat until cancelled
	pub async fn run(mut self) {
		info!("event link starting");

		while !self.cancel.is_cancelled() {
			if let Some(channel) = self.establish().await {
				self.pump(channel).await;
			}

			if self.cancel.is_cancelled() {
				break;
			}

			let delay = self.tracker.connection_lost();
			self.publish_session();
			warn!(delay_ms = delay.as_millis() as u64, attempts = self.tracker.session().reconnect_attempts, "device link down, scheduling reconnect");

			if !self.wait_before_retry(delay).await {
				break;
			}
		}

		info!("event link stopped");
	}

	async fn establish(&mut self) -> Option<LinkChannel> {
		if let Err(e) = self.tracker.begin_connect() {
			warn!(error = %e, "unexpected link state before connecting");
		}

		let attempt = tokio::select! {
			() = self.cancel.cancelled() => return None,
			attempt = self.connector.connect() => attempt,
		};

		let channel = match attempt {
			Ok(channel) => channel,
			Err(e) => {
				error!("device link connection failed: {}", e);
				return None;
			}
		};

		let request = match self.tracker.connected() {
			Ok(request) => request,
			Err(e) => {
				error!(error = %e, "could not mark link connected");
				return None;
			}
		};
		self.publish_session();
		info!(last_seq = request.last_seq, "device link connected, requesting resume");

		if channel.outbound.send(request.to_json()).await.is_err() {
			warn!("connection closed before resume request could be sent");
			return None;
		}

		Some(channel)
	}

	async fn pump(&mut self, mut channel: LinkChannel) {
		loop {
			tokio::select! {
				() = self.cancel.cancelled() => break,
				frame = channel.inbound.recv() => {
					match frame {
						Some(text) => self.handle_frame(&text),
						None => {
							info!("device event stream closed");
							break;
						}
					}
				}
				Some(command) = self.commands.recv() => {
					self.handle_command(command, Some(&channel.outbound)).await;
				}
			}
		}
	}

	/// Sleep out the backoff. Returns `false` when cancelled.
	async fn wait_before_retry(&mut self, delay: Duration) -> bool {
		let sleep = tokio::time::sleep(delay);
		tokio::pin!(sleep);

		loop {
			tokio::select! {
				() = self.cancel.cancelled() => return false,
				() = &mut sleep => return true,
				Some(command) = self.commands.recv() => {
					if matches!(command, LinkCommand::ReconnectNow) {
						info!("manual reconnect requested, skipping backoff");
						return true;
					}
					self.handle_command(command, None).await;
				}
			}
		}
	}

	#[instrument(skip(self, text), fields(len = text.len()))]
	fn handle_frame(&mut self, text: &str) {
		let envelope = match DeviceEnvelope::parse(text) {
			Ok(envelope) => envelope,
			Err(e) => {
				warn!(error = %e, "dropping malformed device frame");
				trace!("frame content (first 200 chars): {}", text.chars().take(200).collect::<String>());
				return;
			}
		};

		if let Some(seq) = envelope.seq {
			if self.tracker.observe_seq(seq) {
				self.publish_session();
			} else {
				trace!(seq, last_seq = self.tracker.session().last_seq, "stale or duplicate sequence");
			}
		}

		let event = SequencedEvent::from(envelope);
		if let DeviceEvent::Unknown { kind } = &event.event {
			trace!(%kind, "no handler for device event type");
		}

		match self.events.try_broadcast(event) {
			Ok(Some(dropped)) => debug!(seq = ?dropped.seq, "event buffer overflowed, oldest dropped"),
			Ok(None) | Err(TrySendError::Inactive(_)) => {}
			Err(e) => warn!("failed to publish device event: {}", e),
		}
	}

	async fn handle_command(&mut self, command: LinkCommand, outbound: Option<&mpsc::Sender<String>>) {
		match command {
			LinkCommand::Send(message) => {
				let Some(outbound) = outbound else {
					debug!(kind = %message.kind, "device link disconnected, dropping outbound message");
					return;
				};
				match serde_json::to_string(&message) {
					Ok(text) => {
						if outbound.send(text).await.is_err() {
							debug!(kind = %message.kind, "connection closed while sending");
						}
					}
					Err(e) => warn!("failed to encode outbound message: {}", e),
				}
			}
			LinkCommand::ReconnectNow => {
				debug!("manual reconnect ignored, link is connected");
			}
			LinkCommand::GetSession(reply) => {
				let _ = reply.send(self.tracker.session().clone());
			}
		}
	}

	fn publish_session(&self) {
		self.session.send_replace(self.tracker.session().clone());
	}
}

/// Cloneable handle to a running [`EventLink`]
#[derive(Clone)]
pub struct EventLinkHandle {
	commands: mpsc::Sender<LinkCommand>,
	events: InactiveReceiver<SequencedEvent>,
	session: watch::Receiver<LinkSession>,
	cancel: CancellationToken,
}

impl EventLinkHandle {
	/// Queue an outbound notification. Dropped silently while disconnected.
	pub fn send(&self, kind: impl Into<String>, payload: Value) {
		let message = OutboundMessage { kind: kind.into(), payload };
		if let Err(e) = self.commands.try_send(LinkCommand::Send(message)) {
			debug!("event link command queue rejected message: {}", e);
		}
	}

	/// Skip the remaining backoff and reconnect immediately
	pub fn reconnect_now(&self) {
		if let Err(e) = self.commands.try_send(LinkCommand::ReconnectNow) {
			debug!("event link command queue rejected reconnect: {}", e);
		}
	}

	/// Session as seen by the actor, after all previously queued commands
	pub async fn session(&self) -> Result<LinkSession> {
		let (tx, rx) = oneshot::channel();
		self.commands.send(LinkCommand::GetSession(tx)).await.map_err(|_| LinkError::ActorUnavailable)?;
		rx.await.map_err(|_| LinkError::ActorUnavailable)
	}

	/// Latest published session snapshot
	#[must_use]
	pub fn current_session(&self) -> LinkSession {
		self.session.borrow().clone()
	}

	#[must_use]
	pub fn watch_session(&self) -> watch::Receiver<LinkSession> {
		self.session.clone()
	}

	#[must_use]
	pub fn subscribe(&self) -> Receiver<SequencedEvent> {
		self.events.activate_cloned()
	}

	/// Cancel the reconnect timer and close the connection
	pub fn shutdown(&self) {
		self.cancel.cancel();
	}
}
