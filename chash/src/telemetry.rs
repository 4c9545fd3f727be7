//! Diagnostic logging initialization.
//!
//! Diagnostics go to stderr; stdout is reserved for command results.

use anyhow::Result;
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Registry};

/// Initialize logging. `RUST_LOG` takes precedence over `level`.
pub fn init(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))?;

    let subscriber = Registry::default()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        );

    tracing::subscriber::set_global_default(subscriber)?;
    tracing::debug!("Console logging initialized");
    Ok(())
}
