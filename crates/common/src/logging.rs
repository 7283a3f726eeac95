//! Logging setup and configuration
//!
//! Log output goes to stderr: stdout belongs to the device console. While the
//! terminal is in raw mode the output post-processing is off, so line feeds
//! are written as CRLF for as long as [`set_raw_terminal`] says so.

use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

static RAW_TERMINAL: AtomicBool = AtomicBool::new(false);

/// Setup tracing subscriber for the application
pub fn setup_logging(default_level: &str) -> crate::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| crate::Error::Config(format!("Invalid log filter: {}", e)))?;

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(|| LogWriter::new(io::stderr())))
        .try_init()
        .map_err(|e| crate::Error::Config(format!("Logging already initialized: {}", e)))?;

    Ok(())
}

/// Tell the log writer whether the terminal is currently in raw mode
pub fn set_raw_terminal(raw: bool) {
    RAW_TERMINAL.store(raw, Ordering::Relaxed);
}

/// Log sink that expands `\n` to `\r\n` while the terminal is raw
pub struct LogWriter<W> {
    inner: W,
    raw: bool,
}

impl<W: Write> LogWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            raw: RAW_TERMINAL.load(Ordering::Relaxed),
        }
    }

    /// Writer with an explicit line ending mode
    pub fn with_raw(inner: W, raw: bool) -> Self {
        Self { inner, raw }
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for LogWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if !self.raw {
            return self.inner.write(buf);
        }

        for chunk in buf.split_inclusive(|&b| b == b'\n') {
            match chunk.strip_suffix(b"\n") {
                Some(line) if !line.ends_with(b"\r") => {
                    self.inner.write_all(line)?;
                    self.inner.write_all(b"\r\n")?;
                }
                _ => self.inner.write_all(chunk)?,
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
