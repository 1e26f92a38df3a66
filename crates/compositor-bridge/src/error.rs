use thiserror::Error;

pub type Result<T> = std::result::Result<T, BridgeError>;

#[derive(Debug, Error)]
pub enum BridgeError {
	#[error("Compositor target rejected command: {0}")]
	Target(String),

	#[error("Failed to encode command: {0}")]
	Encode(#[from] serde_json::Error),

	#[error("Inbound message from unexpected origin: {0}")]
	Origin(String),

	#[error("Invalid compositor origin configuration: {0}")]
	Config(#[from] url::ParseError),

	#[error("Bridge command queue full")]
	QueueFull,

	#[error("Bridge actor unavailable")]
	ActorUnavailable,
}
