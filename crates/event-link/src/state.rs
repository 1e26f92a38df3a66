use crate::{LinkError, Result, RetryConfig, RetryPolicy, SyncRequest};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub enum LinkState {
	Disconnected,
	Connecting { started_at: Instant },
	Connected { connected_at: Instant },
}

impl LinkState {
	const fn name(&self) -> &'static str {
		match self {
			Self::Disconnected => "Disconnected",
			Self::Connecting { .. } => "Connecting",
			Self::Connected { .. } => "Connected",
		}
	}
}

#[derive(Debug, Clone)]
enum LinkTransition {
	StartConnecting,
	ConnectionEstablished,
	ConnectionLost,
}

impl LinkTransition {
	const fn target(&self) -> &'static str {
		match self {
			Self::StartConnecting => "Connecting",
			Self::ConnectionEstablished => "Connected",
			Self::ConnectionLost => "Disconnected",
		}
	}
}

/// Observable snapshot of the link
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkSession {
	pub connected: bool,
	pub last_seq: u64,
	pub reconnect_attempts: u32,
}

/// Owns the connection state machine, the sequence cursor and the backoff policy.
#[derive(Debug)]
pub struct SessionTracker {
	state: LinkState,
	session: LinkSession,
	retry: RetryPolicy,
}

impl SessionTracker {
	#[must_use]
	pub const fn new(retry: RetryConfig) -> Self {
		Self {
			state: LinkState::Disconnected,
			session: LinkSession {
				connected: false,
				last_seq: 0,
				reconnect_attempts: 0,
			},
			retry: RetryPolicy::new(retry),
		}
	}

	fn transition(&mut self, transition: &LinkTransition) -> Result<()> {
		use LinkState::{Connected, Connecting, Disconnected};
		use LinkTransition::{ConnectionEstablished, ConnectionLost, StartConnecting};

		let next = match (&self.state, transition) {
			(Disconnected, StartConnecting) => Connecting { started_at: Instant::now() },
			(Connecting { .. }, ConnectionEstablished) => Connected { connected_at: Instant::now() },
			(Connecting { .. } | Connected { .. }, ConnectionLost) => Disconnected,
			_ => {
				return Err(LinkError::InvalidTransition {
					from: self.state.name(),
					to: transition.target(),
				})
			}
		};

		self.state = next;
		Ok(())
	}

	/// `Disconnected -> Connecting`
	pub fn begin_connect(&mut self) -> Result<()> {
		self.transition(&LinkTransition::StartConnecting)
	}

	/// `Connecting -> Connected`. The only place the failure counter resets.
	pub fn connected(&mut self) -> Result<SyncRequest> {
		self.transition(&LinkTransition::ConnectionEstablished)?;
		self.retry.reset();
		self.session.connected = true;
		self.session.reconnect_attempts = 0;
		Ok(SyncRequest::new(self.session.last_seq))
	}

	/// Close, error, or failed attempt. Returns how long to wait before reconnecting.
	pub fn connection_lost(&mut self) -> Duration {
		if let Err(e) = self.transition(&LinkTransition::ConnectionLost) {
			tracing::debug!(error = %e, "connection lost while already disconnected");
		}
		self.session.connected = false;
		let delay = self.retry.record_failure();
		self.session.reconnect_attempts = self.retry.attempts();
		delay
	}

	/// Advance the cursor. Out-of-order and duplicate sequence numbers leave it untouched.
	pub fn observe_seq(&mut self, seq: u64) -> bool {
		if seq > self.session.last_seq {
			self.session.last_seq = seq;
			true
		} else {
			false
		}
	}

	#[must_use]
	pub const fn session(&self) -> &LinkSession {
		&self.session
	}

	#[must_use]
	pub const fn state(&self) -> &LinkState {
		&self.state
	}

	#[must_use]
	pub const fn is_connected(&self) -> bool {
		matches!(self.state, LinkState::Connected { .. })
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn tracker() -> SessionTracker {
		SessionTracker::new(RetryConfig::default())
	}

	#[test]
	fn test_cursor_is_max_of_any_order() {
		let orders: [&[u64]; 4] = [&[1, 2, 3, 9], &[9, 3, 2, 1], &[4, 9, 9, 1, 7], &[9]];

		for order in orders {
			let mut t = tracker();
			for seq in order {
				t.observe_seq(*seq);
			}
			assert_eq!(t.session().last_seq, 9, "order {order:?}");
		}
	}

	#[test]
	fn test_duplicate_seq_does_not_advance() {
		let mut t = tracker();
		assert!(t.observe_seq(5));
		assert!(!t.observe_seq(5));
		assert!(!t.observe_seq(4));
		assert_eq!(t.session().last_seq, 5);
	}

	#[test]
	fn test_valid_transitions() {
		let mut t = tracker();
		t.begin_connect().unwrap();
		assert!(matches!(t.state(), LinkState::Connecting { .. }));

		let request = t.connected().unwrap();
		assert_eq!(request.last_seq, 0);
		assert!(t.is_connected());
		assert!(t.session().connected);
	}

	#[test]
	fn test_invalid_transitions_are_rejected() {
		let mut t = tracker();
		assert!(matches!(t.connected(), Err(LinkError::InvalidTransition { .. })));

		t.begin_connect().unwrap();
		assert!(matches!(t.begin_connect(), Err(LinkError::InvalidTransition { .. })));
	}

	#[test]
	fn test_backoff_grows_and_resets_after_success() {
		let mut t = tracker();

		for expected in [1, 2, 4, 8, 16, 30, 30] {
			t.begin_connect().unwrap();
			assert_eq!(t.connection_lost(), Duration::from_secs(expected));
		}
		assert_eq!(t.session().reconnect_attempts, 7);

		t.begin_connect().unwrap();
		t.connected().unwrap();
		assert_eq!(t.session().reconnect_attempts, 0);

		assert_eq!(t.connection_lost(), Duration::from_secs(1));
		assert_eq!(t.session().reconnect_attempts, 1);
	}

	#[test]
	fn test_resume_request_carries_cursor() {
		let mut t = tracker();
		t.begin_connect().unwrap();
		assert_eq!(t.connected().unwrap().last_seq, 0);

		t.observe_seq(5);
		t.connection_lost();

		t.begin_connect().unwrap();
		assert_eq!(t.connected().unwrap().last_seq, 5);
	}
}
