use crate::{BridgeError, Result};
use url::{Origin, Url};

/// Accepts inbound messages only from the configured compositor origin
/// (scheme, host and port)
#[derive(Debug, Clone)]
pub struct OriginPolicy {
	expected: Option<Origin>,
}

impl OriginPolicy {
	/// Build from the expected compositor origin, e.g. `https://vdo.ninja`
	pub fn new(expected: &str) -> Result<Self> {
		let origin = Url::parse(expected)?.origin();
		if !origin.is_tuple() {
			return Err(BridgeError::Origin(format!("{expected} has no host")));
		}
		Ok(Self { expected: Some(origin) })
	}

	/// Accept every origin. In-process targets only.
	#[must_use]
	pub const fn permissive() -> Self {
		Self { expected: None }
	}

	/// Serialized expected origin, `None` when permissive
	#[must_use]
	pub fn expected(&self) -> Option<String> {
		self.expected.as_ref().map(Origin::ascii_serialization)
	}

	/// Check an inbound origin against the expected one
	pub fn check(&self, origin: &str) -> Result<()> {
		let Some(expected) = &self.expected else {
			return Ok(());
		};

		match Url::parse(origin).map(|url| url.origin()) {
			Ok(actual) if actual.is_tuple() && actual == *expected => Ok(()),
			_ => Err(BridgeError::Origin(origin.to_string())),
		}
	}
}
