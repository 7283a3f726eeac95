//! Shared run state of a bridge session

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

/// Why a session stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitReason {
    /// The exit byte (Ctrl-C, 0x03) was typed
    ExitByte = 1,
    /// `request_exit` was called
    Requested = 2,
    /// The process received an interrupt signal
    Interrupted = 3,
    /// An endpoint reported that the device is gone
    DeviceDisconnected = 4,
}

impl ExitReason {
    fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::ExitByte),
            2 => Some(Self::Requested),
            3 => Some(Self::Interrupted),
            4 => Some(Self::DeviceDisconnected),
            _ => None,
        }
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::ExitByte => "exit key pressed",
            Self::Requested => "exit requested",
            Self::Interrupted => "interrupted",
            Self::DeviceDisconnected => "device disconnected",
        };
        f.write_str(text)
    }
}

/// Running flag shared by both forwarding loops and the controller.
///
/// Starts running; the first [`stop`](Self::stop) wins and the state never
/// goes back to running.
#[derive(Debug)]
pub struct BridgeState {
    running: AtomicBool,
    reason: AtomicU8,
}

const NO_REASON: u8 = 0;

impl BridgeState {
    pub fn new() -> Self {
        Self {
            running: AtomicBool::new(true),
            reason: AtomicU8::new(NO_REASON),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Stop the session. Returns `true` if this call made the transition.
    pub fn stop(&self, reason: ExitReason) -> bool {
        let first = self
            .reason
            .compare_exchange(NO_REASON, reason as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        self.running.store(false, Ordering::Release);
        first
    }

    /// Reason recorded by the first `stop`, if any
    pub fn exit_reason(&self) -> Option<ExitReason> {
        ExitReason::from_u8(self.reason.load(Ordering::Acquire))
    }
}

impl Default for BridgeState {
    fn default() -> Self {
        Self::new()
    }
}
