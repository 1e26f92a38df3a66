use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, trace};

/// Ephemeral connection UUID to stable stream id
#[derive(Debug, Default, Clone)]
pub struct IdentityMap {
	resolved: HashMap<String, String>,
}

impl IdentityMap {
	/// Record a mapping. Returns `false` if it was already known.
	pub fn learn(&mut self, uuid: &str, stream_id: &str) -> bool {
		self.resolved.insert(uuid.to_string(), stream_id.to_string()).as_deref() != Some(stream_id)
	}

	/// Stable id for `id`, or `id` itself when it is not a known UUID
	#[must_use]
	pub fn resolve<'a>(&'a self, id: &'a str) -> &'a str {
		self.resolved.get(id).map_or(id, String::as_str)
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.resolved.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.resolved.is_empty()
	}

	pub fn clear(&mut self) {
		self.resolved.clear();
	}
}

/// A source as the compositor reports it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveredSource {
	pub id: String,
	pub label: Option<String>,
	pub screen_share: bool,
	pub has_video: bool,
	pub has_audio: bool,
	pub muted: bool,
	pub audio_level: f64,
}

impl DiscoveredSource {
	#[must_use]
	pub const fn new(id: String, label: Option<String>) -> Self {
		Self {
			id,
			label,
			screen_share: false,
			has_video: true,
			has_audio: true,
			muted: false,
			audio_level: 0.0,
		}
	}
}

/// Sources currently connected to the compositor, in join order
#[derive(Debug, Default, Clone)]
pub struct SourceDirectory {
	sources: IndexMap<String, DiscoveredSource>,
}

impl SourceDirectory {
	pub fn upsert(&mut self, source: DiscoveredSource) {
		trace!(id = %source.id, "source directory upsert");
		self.sources.insert(source.id.clone(), source);
	}

	pub fn remove(&mut self, id: &str) -> Option<DiscoveredSource> {
		self.sources.shift_remove(id)
	}

	#[must_use]
	pub fn get(&self, id: &str) -> Option<&DiscoveredSource> {
		self.sources.get(id)
	}

	pub fn get_mut(&mut self, id: &str) -> Option<&mut DiscoveredSource> {
		self.sources.get_mut(id)
	}

	/// Move the entry at `from` to key `to`, keeping its position.
	/// A stale duplicate already stored under `to` is replaced.
	pub fn rekey(&mut self, from: &str, to: &str) -> bool {
		if from == to {
			return false;
		}
		let Some(index) = self.sources.get_index_of(from) else {
			return false;
		};

		self.sources.shift_remove(to);
		let index = self.sources.get_index_of(from).unwrap_or(index);
		let Some((_, mut source)) = self.sources.shift_remove_index(index) else {
			return false;
		};
		source.id = to.to_string();
		self.sources.shift_insert(index, to.to_string(), source);
		debug!(from, to, "source re-keyed");
		true
	}

	pub fn iter(&self) -> impl Iterator<Item = &DiscoveredSource> {
		self.sources.values()
	}

	#[must_use]
	pub fn snapshot(&self) -> Vec<DiscoveredSource> {
		self.sources.values().cloned().collect()
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.sources.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.sources.is_empty()
	}

	pub fn clear(&mut self) {
		self.sources.clear();
	}
}
