//!
//! src/logging.rs  Andrew Belles  Sept 13th, 2025
//!
//! Initializes logger so the collector gives informative,
//! structured output while it walks the liked-track catalog
//!
//!

use tracing_subscriber::{EnvFilter, fmt, prelude::*};
use tracing_error::ErrorLayer;
use tracing_appender::non_blocking;

use crate::config::{LogFormat, LoggingConfig};
use crate::errors::CollectorError;

/// Flushes buffered log lines on drop, hold until exit
pub struct LoggingGuard(tracing_appender::non_blocking::WorkerGuard);

pub fn init_logging(cfg: &LoggingConfig) -> Result<LoggingGuard, CollectorError> {
    let (writer, guard) = non_blocking(std::io::stderr());
    let filter = std::env::var("RUST_LOG")
        .ok()
        .map(EnvFilter::new)
        .unwrap_or_else(|| EnvFilter::new(cfg.filter_directives.clone()));

    let time = fmt::time::UtcTime::rfc_3339();
    let registry = tracing_subscriber::registry().with(filter);

    let installed = match cfg.format {
        LogFormat::Json => {
            let fmt_layer = fmt::layer()
                .with_writer(writer)
                .with_timer(time)
                .with_ansi(false)
                .with_target(cfg.include_target)
                .with_file(cfg.include_file_line)
                .with_line_number(cfg.include_file_line)
                .json()
                .flatten_event(true)
                .with_current_span(true)
                .with_span_list(true);
            registry.with(fmt_layer).with(ErrorLayer::default()).try_init()
        }
        LogFormat::Pretty => {
            let fmt_layer = fmt::layer()
                .with_writer(writer)
                .with_timer(time)
                .with_ansi(cfg.with_ansi)
                .with_target(cfg.include_target)
                .with_file(cfg.include_file_line)
                .with_line_number(cfg.include_file_line)
                .compact();
            registry.with(fmt_layer).with(ErrorLayer::default()).try_init()
        }
    };

    installed.map_err(|e| CollectorError::Config(format!("init logging: {e}")))?;
    Ok( LoggingGuard(guard) )
}
