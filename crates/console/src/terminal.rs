//! Host terminal handling
//!
//! [`TerminalSession`] puts the terminal in raw mode for the lifetime of a
//! console session; [`StdinReader`] reads keystrokes without holding the
//! forwarding thread hostage when nothing is typed.

use common::{Error, Result};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use std::io::{self, IsTerminal, Read};
use tracing::{debug, warn};

/// Raw-mode terminal, restored on [`restore`](Self::restore) or drop.
///
/// Raw mode also turns off local echo; restoring brings back the attributes
/// the terminal had before the session.
#[derive(Debug)]
pub struct TerminalSession {
    raw_mode: bool,
}

impl TerminalSession {
    /// Enter raw mode if stdin is a terminal
    pub fn acquire() -> Result<Self> {
        if !io::stdin().is_terminal() {
            debug!("stdin is not a terminal, leaving terminal settings alone");
            return Ok(Self { raw_mode: false });
        }

        enable_raw_mode()
            .map_err(|e| Error::Terminal(format!("Failed to enable raw mode: {}", e)))?;
        common::set_raw_terminal(true);
        debug!("Terminal switched to raw mode");

        Ok(Self { raw_mode: true })
    }

    /// Whether this session changed the terminal settings
    pub fn is_raw(&self) -> bool {
        self.raw_mode
    }

    /// Put the terminal back the way it was. Safe to call more than once.
    pub fn restore(&mut self) -> Result<()> {
        if !self.raw_mode {
            return Ok(());
        }
        self.raw_mode = false;
        common::set_raw_terminal(false);

        disable_raw_mode()
            .map_err(|e| Error::Terminal(format!("Failed to restore terminal: {}", e)))?;
        debug!("Terminal restored");
        Ok(())
    }
}

impl Drop for TerminalSession {
    fn drop(&mut self) {
        if let Err(e) = self.restore() {
            warn!("{}", e);
        }
    }
}

/// Unbuffered stdin that reports `WouldBlock` after an idle poll interval
#[cfg(unix)]
pub struct StdinReader {
    file: std::fs::File,
}

#[cfg(unix)]
impl StdinReader {
    pub fn new() -> io::Result<Self> {
        use std::os::fd::AsFd;

        let fd = io::stdin().as_fd().try_clone_to_owned()?;
        Ok(Self {
            file: std::fs::File::from(fd),
        })
    }
}

#[cfg(unix)]
impl Read for StdinReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        use crate::usb::TRANSFER_TIMEOUT;
        use nix::poll::{PollFd, PollFlags, PollTimeout, poll};
        use std::os::fd::AsFd;

        let millis = u16::try_from(TRANSFER_TIMEOUT.as_millis()).unwrap_or(u16::MAX);
        let ready = {
            let mut fds = [PollFd::new(self.file.as_fd(), PollFlags::POLLIN)];
            poll(&mut fds, PollTimeout::from(millis)).map_err(io::Error::from)?
        };
        if ready == 0 {
            return Err(io::ErrorKind::WouldBlock.into());
        }

        self.file.read(buf)
    }
}

/// Blocking stdin; without `poll` the read only returns on input
#[cfg(not(unix))]
pub struct StdinReader {
    stdin: io::Stdin,
}

#[cfg(not(unix))]
impl StdinReader {
    pub fn new() -> io::Result<Self> {
        Ok(Self { stdin: io::stdin() })
    }
}

#[cfg(not(unix))]
impl Read for StdinReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stdin.read(buf)
    }
}
