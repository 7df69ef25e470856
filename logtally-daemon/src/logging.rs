//! Logging initialization for logtally-daemon.
//!
//! Builds the global `tracing-subscriber` from the `[general]` section.
//! `RUST_LOG` overrides the configured level.

use anyhow::Result;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use logtally_core::config::GeneralConfig;

/// Output format of the log stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per event.
    Json,
    /// Multi-line human-readable output.
    Pretty,
}

impl LogFormat {
    /// Parse the `general.log_format` value.
    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "json" => Ok(Self::Json),
            "pretty" => Ok(Self::Pretty),
            other => Err(anyhow::anyhow!(
                "unknown log format '{other}', expected 'json' or 'pretty'"
            )),
        }
    }

    fn layer(self) -> Box<dyn Layer<Registry> + Send + Sync> {
        let fmt = tracing_subscriber::fmt::layer().with_target(true);
        match self {
            Self::Json => fmt.json().with_current_span(false).boxed(),
            Self::Pretty => fmt.pretty().boxed(),
        }
    }
}

/// Build the level filter: `RUST_LOG` if set and valid, otherwise `level`.
pub fn build_filter(level: &str) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(level).map_err(|e| anyhow::anyhow!("invalid log level '{level}': {e}"))
}

/// Install the global tracing subscriber.
///
/// Call once at startup, before the first tracing macro fires.
pub fn init_tracing(config: &GeneralConfig) -> Result<()> {
    let format = LogFormat::parse(&config.log_format)?;
    let filter = build_filter(&config.log_level)?;

    tracing_subscriber::registry()
        .with(format.layer().with_filter(filter))
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install {format:?} tracing subscriber: {e}"))
}
