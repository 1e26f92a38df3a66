use mixer_service::{Config, MixerService};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	// Initialize tracing
	tracing_subscriber::registry()
		.with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "mixer_service=info,mixer_core=info,event_link=info,compositor_bridge=info".into()))
		.with(tracing_subscriber::fmt::layer())
		.init();

	tracing::info!("🚀 Starting mixer service");

	// Load configuration from environment or use defaults
	let config = Config::from_env()?;

	tracing::info!("📋 Configuration loaded - HTTP: {}, origin: {}", config.http_bind, config.compositor_origin);

	// Run until shutdown signal
	MixerService::new(config).run().await?;

	tracing::info!("👋 Mixer service shutdown complete");
	Ok(())
}
