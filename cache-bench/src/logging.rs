//! Logging initialization.
//!
//! The RUST_LOG environment variable takes precedence over the `[logging]`
//! level from the configuration file.

use crate::config::{LogFormat, LoggingConfig};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

type BoxedLayer = Box<dyn tracing_subscriber::Layer<tracing_subscriber::Registry> + Send + Sync>;

/// Initialize the global tracing subscriber.
pub fn init(config: &LoggingConfig) {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::new(config.level.as_str())
    };

    tracing_subscriber::registry()
        .with(build_layer(config))
        .with(filter)
        .init();
}

fn build_layer(config: &LoggingConfig) -> BoxedLayer {
    let layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(config.target)
        .with_thread_names(config.thread_names);

    match (config.format, config.timestamps) {
        (LogFormat::Pretty, true) => layer.with_ansi(true).boxed(),
        (LogFormat::Pretty, false) => layer.with_ansi(true).without_time().boxed(),
        (LogFormat::Compact, true) => layer.compact().with_ansi(true).boxed(),
        (LogFormat::Compact, false) => layer.compact().with_ansi(true).without_time().boxed(),
        (LogFormat::Json, true) => layer.json().boxed(),
        (LogFormat::Json, false) => layer.json().without_time().boxed(),
    }
}
