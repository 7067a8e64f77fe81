//! Tracing setup for the stackrun binary.
//!
//! `RUST_LOG` wins when set; otherwise the level passed in applies. The
//! global subscriber can only be installed once, later calls are no-ops.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Log line format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    /// Newline-delimited JSON.
    Json,
}

/// Install the global subscriber, writing to stderr so command output on
/// stdout stays clean.
pub fn init_tracing(format: LogFormat, level: Level) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));
    let registry = tracing_subscriber::registry().with(filter);

    let installed = match format {
        LogFormat::Json => registry
            .with(fmt::layer().with_writer(std::io::stderr).json())
            .try_init(),
        LogFormat::Text => registry
            .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
            .try_init(),
    };
    installed.ok();
}
