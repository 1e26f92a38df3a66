use thiserror::Error;

pub type Result<T> = std::result::Result<T, LinkError>;

/// Errors for the event-link crate
#[derive(Debug, Error)]
pub enum LinkError {
	#[error("Failed to connect to WebSocket: {0}")]
	WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

	#[error("Malformed device frame: {0}")]
	Malformed(#[from] serde_json::Error),

	#[error("Invalid link state transition: {from} -> {to}")]
	InvalidTransition { from: &'static str, to: &'static str },

	#[error("Connection attempt failed: {0}")]
	Connect(String),

	#[error("Event link actor unavailable")]
	ActorUnavailable,
}
