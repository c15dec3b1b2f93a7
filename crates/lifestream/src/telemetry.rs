//! `tracing` subscriber setup.

use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{EnvFilter, Registry};

use crate::config::{LogFormat, LoggingConfig};

/// Overrides both the verbosity and the configured filter when set.
pub const ENV_LOG: &str = "LIFESTREAM_LOG";

#[derive(Clone, Debug)]
pub struct TelemetryConfig {
    pub verbosity: u8,
    pub logging: LoggingConfig,
}

impl TelemetryConfig {
    pub fn new(verbosity: u8, logging: LoggingConfig) -> Self {
        Self { verbosity, logging }
    }
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init(config: TelemetryConfig) -> Result<(), TryInitError> {
    let filter = build_filter(&config, std::env::var(ENV_LOG).ok());

    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();
    if config.logging.stdout {
        layers.push(build_stdout_layer(config.logging.stdout_format));
    }
    layers.push(Box::new(filter));

    Registry::default().with(layers).try_init()
}

fn build_filter(config: &TelemetryConfig, env: Option<String>) -> EnvFilter {
    let builder = EnvFilter::builder()
        .with_default_directive(level_from_verbosity(config.verbosity).into());
    match env.or_else(|| config.logging.filter.clone()) {
        Some(directives) if !directives.trim().is_empty() => builder.parse_lossy(directives),
        _ => builder.parse_lossy(""),
    }
}

fn build_stdout_layer(format: LogFormat) -> Box<dyn Layer<Registry> + Send + Sync> {
    match format {
        LogFormat::Pretty => Box::new(
            tracing_subscriber::fmt::layer()
                .pretty()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_names(true),
        ),
        LogFormat::Compact => Box::new(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_names(true),
        ),
        LogFormat::Json => Box::new(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_names(true)
                .with_current_span(true)
                .with_span_list(true),
        ),
    }
}

fn level_from_verbosity(verbosity: u8) -> tracing::metadata::LevelFilter {
    match verbosity {
        0 => tracing::metadata::LevelFilter::WARN,
        1 => tracing::metadata::LevelFilter::INFO,
        2 => tracing::metadata::LevelFilter::DEBUG,
        _ => tracing::metadata::LevelFilter::TRACE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_directives_win_over_config() {
        let mut logging = LoggingConfig::default();
        logging.filter = Some("lifestream=debug".to_string());
        let config = TelemetryConfig::new(0, logging);

        let from_config = build_filter(&config, None).to_string().to_lowercase();
        assert!(from_config.contains("lifestream=debug"), "{from_config}");

        let from_env = build_filter(&config, Some("lifestream_core=trace".to_string()))
            .to_string()
            .to_lowercase();
        assert!(from_env.contains("lifestream_core=trace"), "{from_env}");
        assert!(!from_env.contains("lifestream=debug"), "{from_env}");
    }

    #[test]
    fn verbosity_sets_the_default_level() {
        let config = TelemetryConfig::new(2, LoggingConfig::default());
        let filter = build_filter(&config, None).to_string().to_lowercase();
        assert!(filter.contains("debug"), "{filter}");
    }
}
