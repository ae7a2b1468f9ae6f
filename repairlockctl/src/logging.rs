use std::{fs::OpenOptions, sync::Arc};

use anyhow::{Context, Result};
use repairlock_config::LoggingConfig;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Installs the global subscriber. `RUST_LOG` wins over the configured
/// level; a log file gets plain, non-ANSI output instead of stderr.
pub fn init(logging: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(logging.level.as_filter()));

    let (file_layer, stderr_layer) = match &logging.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            let layer = fmt::layer().with_ansi(false).with_writer(Arc::new(file));
            (Some(layer), None)
        }
        None => (None, Some(fmt::layer().with_writer(std::io::stderr))),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stderr_layer)
        .try_init()
        .context("failed to install the tracing subscriber")
}
