//! Tracing initialization

use std::fs::OpenOptions;
use std::sync::Arc;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::{Config, ConsoleFormat};
use crate::error::Result;

/// Initialize tracing from the logging configuration.
///
/// Console output is JSON or human-readable per `LOG_CONSOLE_FORMAT`; when
/// `LOG_FILE_PATH` is set a JSON copy is appended there as well.
pub fn init_tracing(config: &Config) -> Result<()> {
    let filter = EnvFilter::try_new(&config.logging.level)
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let console_layer = match config.logging.console_format {
        ConsoleFormat::Json => fmt::layer().json().boxed(),
        ConsoleFormat::Human => fmt::layer().pretty().boxed(),
    };

    let file_layer = match &config.logging.file_path {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            Some(fmt::layer().json().with_ansi(false).with_writer(Arc::new(file)).boxed())
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    tracing::info!(
        service = %config.service.name,
        environment = %config.service.environment,
        "Tracing initialized"
    );

    Ok(())
}
