//! Local operator preferences: hotkeys, source display names, feature toggles.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Preferences {
	/// Key combination to intent name
	pub hotkeys: BTreeMap<String, String>,
	/// Source id to the label shown instead of the reported one
	pub display_names: HashMap<String, String>,
	pub features: BTreeMap<String, bool>,
}

impl Preferences {
	#[must_use]
	pub fn feature(&self, name: &str) -> bool {
		self.features.get(name).copied().unwrap_or(false)
	}
}

#[async_trait]
pub trait PreferenceStore: Send + Sync {
	async fn load(&self) -> Result<Preferences>;
	async fn save(&self, preferences: &Preferences) -> Result<()>;
}

/// Preferences in one pretty-printed JSON file
#[derive(Debug, Clone)]
pub struct JsonFilePreferences {
	path: PathBuf,
}

impl JsonFilePreferences {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}

	#[must_use]
	pub fn path(&self) -> &Path {
		&self.path
	}
}

#[async_trait]
impl PreferenceStore for JsonFilePreferences {
	/// A missing file is an empty preference set
	async fn load(&self) -> Result<Preferences> {
		match tokio::fs::read(&self.path).await {
			Ok(bytes) => {
				let preferences = serde_json::from_slice(&bytes)?;
				debug!(path = %self.path.display(), "preferences loaded");
				Ok(preferences)
			}
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
				info!(path = %self.path.display(), "no preferences file, using defaults");
				Ok(Preferences::default())
			}
			Err(e) => Err(e.into()),
		}
	}

	/// Written to a sibling temp file first so a crash never truncates the original
	async fn save(&self, preferences: &Preferences) -> Result<()> {
		let bytes = serde_json::to_vec_pretty(preferences)?;
		let staging = self.path.with_extension("json.tmp");
		tokio::fs::write(&staging, bytes).await?;
		tokio::fs::rename(&staging, &self.path).await?;
		debug!(path = %self.path.display(), "preferences saved");
		Ok(())
	}
}
