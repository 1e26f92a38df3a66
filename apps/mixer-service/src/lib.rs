pub mod api;
pub mod config;
pub mod error;
pub mod preferences;
pub mod service;

pub use config::Config;
pub use error::{Error, Result};
pub use preferences::{JsonFilePreferences, PreferenceStore, Preferences};
pub use service::MixerService;
