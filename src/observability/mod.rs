//! Logging: tracing setup, size-rotated file output, in-memory buffer.

mod buffer;
mod rotate;

use std::path::Path;

pub use buffer::{BufferLayer, LogBuffer};
pub use rotate::RotatingWriter;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Log file name under `data/temp/`.
pub const LOG_FILE: &str = "system.log";

/// Initialize global logging: stdout + `data/temp/system.log` (5 MiB single
/// rotation) + the admin log buffer. Level comes from `LOG_LEVEL`
/// (debug|info|warn|error, default info).
pub fn init(data_dir: &Path) -> anyhow::Result<LogBuffer> {
    let temp_dir = data_dir.join("temp");
    std::fs::create_dir_all(&temp_dir)?;

    let level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    let filter = EnvFilter::try_new(&level).unwrap_or_else(|_| EnvFilter::new("info"));

    let buffer = LogBuffer::new();
    let file_writer = RotatingWriter::open(temp_dir.join(LOG_FILE))?;

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .with(fmt::layer().with_ansi(false).with_writer(file_writer))
        .with(BufferLayer::new(buffer.clone()))
        .try_init()?;

    Ok(buffer)
}
