//! WebSocket relay to the page hosting the compositor.
//!
//! The relay forwards every command envelope into the compositor frame and
//! wraps every message the frame posts back as `{origin, data}`.

use crate::{BridgeError, BridgeHandle, CommandEnvelope, CompositorTarget, Result};
use event_link::{Connector, LinkChannel, RetryConfig, RetryPolicy};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayFrame {
	pub origin: String,
	pub data: Value,
}

/// Posts envelopes onto the relay connection
#[derive(Debug, Clone)]
pub struct RelayTarget {
	outbound: mpsc::Sender<String>,
}

impl RelayTarget {
	#[must_use]
	pub const fn new(outbound: mpsc::Sender<String>) -> Self {
		Self { outbound }
	}
}

impl CompositorTarget for RelayTarget {
	fn post(&mut self, envelope: &CommandEnvelope) -> Result<()> {
		let text = serde_json::to_string(envelope)?;
		self.outbound.try_send(text).map_err(|e| BridgeError::Target(e.to_string()))
	}
}

/// Keep the bridge attached to the relay, reconnecting with backoff until cancelled
pub async fn run_relay<C: Connector>(connector: C, bridge: BridgeHandle, retry: RetryConfig, cancel: CancellationToken) {
	let mut policy = RetryPolicy::new(retry);
	info!("compositor relay starting");

	while !cancel.is_cancelled() {
		let attempt = tokio::select! {
			() = cancel.cancelled() => break,
			attempt = connector.connect() => attempt,
		};

		match attempt {
			Ok(channel) => {
				policy.reset();
				if let Err(e) = pump(channel, &bridge, &cancel).await {
					error!("compositor relay aborted: {}", e);
					break;
				}
			}
			Err(e) => error!("compositor relay connection failed: {}", e),
		}

		if cancel.is_cancelled() {
			break;
		}

		let delay = policy.record_failure();
		warn!(delay_ms = delay.as_millis() as u64, attempts = policy.attempts(), "compositor relay down, scheduling reconnect");
		tokio::select! {
			() = cancel.cancelled() => break,
			() = tokio::time::sleep(delay) => {}
		}
	}

	info!("compositor relay stopped");
}

/// Attach, forward frames until the relay closes, detach.
/// Errors only when the bridge itself is gone.
async fn pump(channel: LinkChannel, bridge: &BridgeHandle, cancel: &CancellationToken) -> Result<()> {
	let LinkChannel { outbound, mut inbound } = channel;
	bridge.attach(RelayTarget::new(outbound)).await?;

	loop {
		let text = tokio::select! {
			() = cancel.cancelled() => break,
			text = inbound.recv() => text,
		};
		let Some(text) = text else {
			info!("compositor relay closed");
			break;
		};

		match serde_json::from_str::<RelayFrame>(&text) {
			Ok(frame) => {
				trace!(origin = %frame.origin, "relay frame received");
				bridge.deliver_inbound(frame.origin, frame.data).await?;
			}
			Err(e) => debug!(error = %e, "dropping malformed relay frame"),
		}
	}

	bridge.detach().await
}
