use crate::event::{decode_raw, RawInbound};
use crate::sources::{DiscoveredSource, IdentityMap, SourceDirectory};
use crate::trace::{Direction, EventStats, TraceBuffer, TraceEntry};
use crate::{BridgeEvent, CommandEnvelope, CompositorCommand, OriginPolicy, Result};
use tracing::{debug, info, instrument, trace, warn};

/// Whatever carries commands into the compositor context
pub trait CompositorTarget: Send {
	fn post(&mut self, envelope: &CommandEnvelope) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
	Posted,
	/// No target attached, nothing was sent
	Skipped,
}

/// Synchronous bridge state. Owned by [`crate::BridgeActor`] in the service.
pub struct CompositorBridge {
	target: Option<Box<dyn CompositorTarget>>,
	origin: OriginPolicy,
	ready: bool,
	last_error: Option<String>,
	identities: IdentityMap,
	sources: SourceDirectory,
	trace: TraceBuffer,
}

impl CompositorBridge {
	#[must_use]
	pub fn new(origin: OriginPolicy, trace_capacity: usize) -> Self {
		Self {
			target: None,
			origin,
			ready: false,
			last_error: None,
			identities: IdentityMap::default(),
			sources: SourceDirectory::default(),
			trace: TraceBuffer::new(trace_capacity),
		}
	}

	/// Install a fresh target. Readiness must be signalled again.
	pub fn attach(&mut self, target: Box<dyn CompositorTarget>) {
		info!("compositor target attached");
		self.target = Some(target);
		self.ready = false;
	}

	/// Drop the target. Per-connection identities die with it.
	pub fn detach(&mut self) -> BridgeEvent {
		if self.target.take().is_some() {
			info!("compositor target detached");
		}
		self.ready = false;
		self.identities.clear();
		self.sources.clear();
		BridgeEvent::Detached
	}

	/// Fire-and-forget. UUID targets are translated to their stream id first.
	#[instrument(skip(self, command))]
	pub fn send(&mut self, command: &CompositorCommand) -> Result<Delivery> {
		let command = match command.target() {
			Some(target) if self.identities.resolve(target) != target => command.clone().retarget(self.identities.resolve(target)),
			_ => command.clone(),
		};
		let envelope = command.to_envelope();
		self.trace.record(Direction::Out, envelope.action.clone(), envelope.target.clone(), serde_json::to_value(&envelope)?);

		let Some(target) = self.target.as_mut() else {
			debug!(action = %envelope.action, "no compositor target, command dropped");
			return Ok(Delivery::Skipped);
		};

		target.post(&envelope).map_err(|e| {
			warn!(action = %envelope.action, "compositor command failed: {}", e);
			e
		})?;
		trace!(action = %envelope.action, target = ?envelope.target, "command posted");
		Ok(Delivery::Posted)
	}

	/// Declare readiness when the compositor never said so itself
	pub fn force_ready(&mut self) -> Option<BridgeEvent> {
		if self.ready || self.target.is_none() {
			return None;
		}
		warn!("no ready signal from compositor, assuming ready");
		self.ready = true;
		Some(BridgeEvent::Ready { forced: true })
	}

	/// Validate, trace and normalize one inbound message.
	/// Returned events carry stable ids wherever a mapping is known.
	#[instrument(skip(self, message))]
	pub fn handle_inbound(&mut self, origin: &str, message: &serde_json::Value) -> Result<Vec<BridgeEvent>> {
		if let Err(e) = self.origin.check(origin) {
			warn!(%origin, "dropping compositor message from unexpected origin");
			return Err(e);
		}

		let raw = RawInbound::reduce(message);
		self.trace.record(Direction::In, raw.kind.clone().unwrap_or_else(|| "unknown".to_string()), raw.id(), message.clone());

		let events = decode_raw(&raw).into_iter().filter_map(|event| self.apply(event)).collect();
		Ok(events)
	}

	fn apply(&mut self, event: BridgeEvent) -> Option<BridgeEvent> {
		match &event {
			BridgeEvent::Error { .. } | BridgeEvent::Unknown { .. } => {}
			_ => {
				if self.last_error.take().is_some() {
					debug!("compositor error cleared");
				}
			}
		}

		match event {
			BridgeEvent::Ready { .. } => {
				if self.ready {
					trace!("duplicate ready signal ignored");
					return None;
				}
				info!("compositor ready");
				self.ready = true;
				Some(event)
			}
			BridgeEvent::Error { message } => {
				warn!(%message, "compositor reported error");
				self.last_error = Some(message.clone());
				Some(BridgeEvent::Error { message })
			}
			BridgeEvent::StreamIdResolved { uuid, stream_id } => {
				if self.identities.learn(&uuid, &stream_id) {
					debug!(%uuid, %stream_id, "stream id resolved");
				}
				self.sources.rekey(&uuid, &stream_id);
				Some(BridgeEvent::StreamIdResolved { uuid, stream_id })
			}
			BridgeEvent::SourceJoined {
				id,
				label,
				screen_share,
				has_video,
				has_audio,
			} => {
				let id = self.identities.resolve(&id).to_string();
				let mut source = self.sources.remove(&id).unwrap_or_else(|| DiscoveredSource::new(id.clone(), None));
				source.label = label.clone().or(source.label);
				source.screen_share = screen_share;
				source.has_video = has_video;
				source.has_audio = has_audio;
				self.sources.upsert(source);
				info!(%id, "source joined");
				Some(BridgeEvent::SourceJoined {
					id,
					label,
					screen_share,
					has_video,
					has_audio,
				})
			}
			BridgeEvent::SourceLeft { id, kicked } => {
				let id = self.identities.resolve(&id).to_string();
				self.sources.remove(&id);
				info!(%id, kicked, "source left");
				Some(BridgeEvent::SourceLeft { id, kicked })
			}
			BridgeEvent::AudioLevel { id, level } => {
				let id = self.identities.resolve(&id).to_string();
				if let Some(source) = self.sources.get_mut(&id) {
					source.audio_level = level;
				}
				Some(BridgeEvent::AudioLevel { id, level })
			}
			BridgeEvent::MuteChanged { id, muted } => {
				let id = self.identities.resolve(&id).to_string();
				if let Some(source) = self.sources.get_mut(&id) {
					source.muted = muted;
				}
				Some(BridgeEvent::MuteChanged { id, muted })
			}
			other => Some(other),
		}
	}

	#[must_use]
	pub const fn is_ready(&self) -> bool {
		self.ready
	}

	#[must_use]
	pub const fn is_attached(&self) -> bool {
		self.target.is_some()
	}

	#[must_use]
	pub fn last_error(&self) -> Option<&str> {
		self.last_error.as_deref()
	}

	/// Stable id for a possibly ephemeral one
	#[must_use]
	pub fn resolve<'a>(&'a self, id: &'a str) -> &'a str {
		self.identities.resolve(id)
	}

	#[must_use]
	pub fn event_history(&self, limit: usize) -> Vec<TraceEntry> {
		self.trace.history(limit)
	}

	#[must_use]
	pub fn event_stats(&self) -> EventStats {
		self.trace.stats()
	}

	#[must_use]
	pub const fn sources(&self) -> &SourceDirectory {
		&self.sources
	}
}
