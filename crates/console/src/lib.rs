//! usb-console
//!
//! Interactive terminal for embedded devices whose debug console is exposed
//! as a pair of vendor-specific USB bulk endpoints rather than a serial port.
//!
//! - [`usb`]: device discovery, interface claim and endpoint resolution
//! - [`bridge`]: the two forwarding loops and their shutdown protocol
//! - [`terminal`]: raw-mode terminal session and stdin access
//! - [`config`]: configuration file handling

pub mod bridge;
pub mod config;
pub mod terminal;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod usb;

pub use bridge::{DuplexBridge, ExitReason};
pub use usb::{DeviceIdentity, DeviceSelector};
