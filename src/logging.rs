//! Structured Logging
//!
//! Installs the global `tracing` subscriber. The level comes from the
//! config file unless `--verbose` forces DEBUG; `RUST_LOG` directives are
//! layered on top. Output goes to stderr so command output on stdout stays
//! machine-readable.

use anyhow::{anyhow, Result};
use tracing::{Level, Subscriber};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// Output format for log lines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "compact" => Ok(LogFormat::Compact),
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(anyhow!("Unknown log format: {}", other)),
        }
    }
}

/// Resolve the effective level
pub fn effective_level(config: &LoggingConfig, verbose: bool) -> Result<Level> {
    if verbose {
        return Ok(Level::DEBUG);
    }
    config
        .level
        .to_lowercase()
        .parse()
        .map_err(|e| anyhow!("Failed to parse log level '{}': {}", config.level, e))
}

fn env_filter(level: Level) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy()
}

/// Build the subscriber described by `config`, writing to `writer`
///
/// # Errors
///
/// Fails on an unknown level or format.
pub fn build_subscriber<W>(
    config: &LoggingConfig,
    verbose: bool,
    writer: W,
) -> Result<Box<dyn Subscriber + Send + Sync>>
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let level = effective_level(config, verbose)?;
    let format: LogFormat = config.format.parse()?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter(level))
        .with_writer(writer);

    let subscriber: Box<dyn Subscriber + Send + Sync> = match format {
        LogFormat::Compact => Box::new(builder.compact().finish()),
        LogFormat::Pretty => Box::new(builder.pretty().finish()),
        LogFormat::Json => Box::new(builder.json().finish()),
    };
    Ok(subscriber)
}

/// Install the global subscriber, logging to stderr
///
/// # Errors
///
/// Fails on an unknown level or format, or if a global subscriber is
/// already installed.
pub fn init(config: &LoggingConfig, verbose: bool) -> Result<()> {
    let subscriber = build_subscriber(config, verbose, std::io::stderr)?;
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow!("Failed to install tracing subscriber: {}", e))
}
