use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use compositor_bridge::BridgeError;
use event_link::LinkError;
use mixer_core::MixerError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
	#[error("Device link error: {0}")]
	Link(#[from] LinkError),

	#[error("Compositor bridge error: {0}")]
	Bridge(#[from] BridgeError),

	#[error("{0}")]
	Mixer(#[from] MixerError),

	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),

	#[error("JSON parsing error: {0}")]
	JsonParse(#[from] serde_json::Error),

	#[error("Configuration error: {0}")]
	Config(String),

	#[error("Timeout: {0}")]
	Timeout(String),

	#[error("Unexpected reply from mixer: {0}")]
	UnexpectedReply(String),
}

impl Error {
	fn status_code(&self) -> StatusCode {
		match self {
			Self::Mixer(e) if e.is_rejection() => StatusCode::CONFLICT,
			Self::Mixer(e) if e.is_not_found() => StatusCode::NOT_FOUND,
			Self::Mixer(MixerError::ActorUnavailable) | Self::Bridge(BridgeError::ActorUnavailable | BridgeError::QueueFull) | Self::Link(LinkError::ActorUnavailable) => StatusCode::SERVICE_UNAVAILABLE,
			_ => StatusCode::INTERNAL_SERVER_ERROR,
		}
	}
}

impl IntoResponse for Error {
	fn into_response(self) -> Response {
		#[derive(serde::Serialize)]
		struct Body {
			error: String,
		}

		let status = self.status_code();
		if status == StatusCode::INTERNAL_SERVER_ERROR {
			tracing::error!("request failed: {}", self);
		}
		(status, Json(Body { error: self.to_string() })).into_response()
	}
}
