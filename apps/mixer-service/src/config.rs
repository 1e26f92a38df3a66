use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Complete configuration for the mixer service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
	/// Device event stream
	pub device_events_url: String,
	/// WebSocket relay into the compositor page
	pub compositor_relay_url: String,
	/// Origin the compositor posts from
	pub compositor_origin: String,
	pub http_bind: SocketAddr,
	pub preferences_path: PathBuf,
	/// Assume the compositor is ready after this long without a ready event
	pub ready_fallback: Duration,
	pub trace_capacity: usize,
	pub transition_duration: Duration,
	/// Graceful shutdown timeout
	pub shutdown_timeout: Duration,
}

impl Config {
	/// Load configuration from environment variables with sensible defaults
	pub fn from_env() -> Result<Self> {
		let defaults = Self::default();

		let http_bind = match std::env::var("HTTP_BIND") {
			Ok(bind) => bind.parse().map_err(|e| Error::Config(format!("HTTP_BIND={bind}: {e}")))?,
			Err(_) => defaults.http_bind,
		};

		Ok(Self {
			device_events_url: std::env::var("DEVICE_EVENTS_URL").unwrap_or(defaults.device_events_url),
			compositor_relay_url: std::env::var("COMPOSITOR_RELAY_URL").unwrap_or(defaults.compositor_relay_url),
			compositor_origin: std::env::var("COMPOSITOR_ORIGIN").unwrap_or(defaults.compositor_origin),
			http_bind,
			preferences_path: std::env::var("PREFERENCES_PATH").map_or(defaults.preferences_path, PathBuf::from),
			ready_fallback: Duration::from_millis(parsed("READY_FALLBACK_MS", 5_000)),
			trace_capacity: parsed("TRACE_CAPACITY", defaults.trace_capacity),
			transition_duration: Duration::from_millis(parsed("TRANSITION_DURATION_MS", 500)),
			shutdown_timeout: Duration::from_secs(parsed("SHUTDOWN_TIMEOUT_SECS", 10)),
		})
	}
}

fn parsed<T: FromStr>(key: &str, default: T) -> T {
	std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

impl Default for Config {
	fn default() -> Self {
		Self {
			device_events_url: "ws://127.0.0.1:8081/events".to_string(),
			compositor_relay_url: "ws://127.0.0.1:8082/relay".to_string(),
			compositor_origin: "https://vdo.ninja".to_string(),
			http_bind: SocketAddr::from(([127, 0, 0, 1], 8090)),
			preferences_path: PathBuf::from("./mixer-preferences.json"),
			ready_fallback: Duration::from_secs(5),
			trace_capacity: 500,
			transition_duration: Duration::from_millis(500),
			shutdown_timeout: Duration::from_secs(10),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_defaults() {
		let config = Config::default();
		assert_eq!(config.http_bind.port(), 8090);
		assert_eq!(config.ready_fallback, Duration::from_secs(5));
		assert_eq!(config.trace_capacity, 500);
	}

	#[test]
	fn test_parsed_defaults_when_unset() {
		assert_eq!(parsed("MIXER_SERVICE_TEST_UNSET_KEY", 42_u64), 42);
	}
}
