use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default filter when `RUST_LOG` is not set
pub const DEFAULT_FILTER: &str = "crisp=info,crisp_processing=info,crisp_plugins=info";

/// Initialize tracing with an fmt layer, or a JSON layer when `json` is set.
///
/// Returns an error if a global subscriber is already installed.
pub fn init_telemetry(json: bool) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into());

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init()?;
    }

    tracing::debug!(json, "Telemetry initialized");
    Ok(())
}
