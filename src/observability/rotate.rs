//! Size-rotating log file writer.
//!
//! Keeps one `system.log` plus a single `system.log.old`: when the live
//! file crosses 5 MiB it is renamed over the old one and a fresh file is
//! started. Rotation by size is not something tracing-appender offers, so
//! the writer is local.

use std::{
    fs::{File, OpenOptions},
    io::{self, Write},
    path::PathBuf,
    sync::Arc,
};

use parking_lot::Mutex;
use tracing_subscriber::fmt::MakeWriter;

/// Rotation threshold: 5 MiB.
const MAX_LOG_BYTES: u64 = 5 * 1024 * 1024;

struct RotateState {
    path: PathBuf,
    file: File,
    written: u64,
}

impl RotateState {
    fn rotate(&mut self) -> io::Result<()> {
        self.file.flush()?;
        let old = self.path.with_extension("log.old");
        std::fs::rename(&self.path, &old)?;
        self.file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        self.written = 0;
        Ok(())
    }
}

#[derive(Clone)]
pub struct RotatingWriter {
    state: Arc<Mutex<RotateState>>,
}

impl RotatingWriter {
    pub fn open(path: PathBuf) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let written = file.metadata().map(|m| m.len()).unwrap_or(0);
        Ok(Self {
            state: Arc::new(Mutex::new(RotateState {
                path,
                file,
                written,
            })),
        })
    }
}

impl Write for RotatingWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.state.lock();
        if state.written + buf.len() as u64 > MAX_LOG_BYTES {
            state.rotate()?;
        }
        let n = state.file.write(buf)?;
        state.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.state.lock().file.flush()
    }
}

impl<'a> MakeWriter<'a> for RotatingWriter {
    type Writer = RotatingWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
