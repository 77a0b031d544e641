use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;

/// Initialize logging on stderr; stdout stays reserved for status lines.
///
/// `RUST_LOG` takes precedence over the configured level.
pub fn init_logging(config: &LoggingConfig) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| anyhow::anyhow!("Invalid log level '{}': {}", config.level, e))?;

    let registry = tracing_subscriber::registry().with(env_filter);

    match config.format.as_str() {
        "json" => {
            let layer = fmt::layer()
                .json()
                .with_current_span(true)
                .with_target(true)
                .with_writer(std::io::stderr);
            registry.with(layer).try_init()?;
        }
        "pretty" => {
            let layer = fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr);
            registry.with(layer).try_init()?;
        }
        other => anyhow::bail!("Invalid log format: {other}"),
    }

    Ok(())
}
