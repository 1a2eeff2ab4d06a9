//! Tracing subscriber setup for the binary.
//!
//! `RUST_LOG` selects the filter (default `info`). Setting
//! `SIGTRADER_LOG_FORMAT=json` switches to structured JSON lines. Logs go to
//! stderr so decisions printed on stdout stay machine-readable.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub const FORMAT_ENV: &str = "SIGTRADER_LOG_FORMAT";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Human,
    Json,
}

impl LogFormat {
    pub fn from_env() -> Self {
        Self::parse(std::env::var(FORMAT_ENV).ok().as_deref())
    }

    fn parse(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_ascii_lowercase()) {
            Some(v) if v == "json" => LogFormat::Json,
            _ => LogFormat::Human,
        }
    }
}

/// Install the global subscriber. Returns false, leaving the existing
/// subscriber in place, when one was already installed.
pub fn init_logging(format: LogFormat) -> bool {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let result = match format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_writer(std::io::stderr),
            )
            .try_init(),
        LogFormat::Human => tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_ansi(true)
                    .with_writer(std::io::stderr),
            )
            .try_init(),
    };
    match result {
        Ok(()) => true,
        // already initialised (tests, embedding callers)
        Err(_) => false,
    }
}
