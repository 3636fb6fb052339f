//! Process-wide tracing setup for the cleaning binary.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::LoggingConfig;

const LOG_FILE_PREFIX: &str = "basic_cleaning.log";

/// `RUST_LOG` takes precedence over the configured directives.
fn build_filter(configured: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(configured))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber: readable lines on stderr, and one JSON
/// object per event in a daily file under `config.dir`.
///
/// File output is buffered until the returned guard is dropped, so `main`
/// holds it for the whole run. Without a usable log directory only the
/// console layer is installed and `None` is returned.
pub fn init_logging(config: &LoggingConfig) -> Option<WorkerGuard> {
    let console = fmt::layer().with_target(true).with_writer(std::io::stderr);
    let registry = tracing_subscriber::registry()
        .with(build_filter(&config.filter))
        .with(console);

    if let Err(e) = std::fs::create_dir_all(&config.dir) {
        registry.init();
        tracing::warn!("Log directory {:?} unavailable, console only: {}", config.dir, e);
        return None;
    }

    let appender = tracing_appender::rolling::daily(&config.dir, LOG_FILE_PREFIX);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    registry.with(fmt::layer().json().with_writer(writer)).init();
    Some(guard)
}
