//! Common utilities for usb-console
//!
//! This crate provides the shared error type and logging setup used by the
//! console library and binary.

pub mod error;
pub mod logging;

pub use error::{Error, Result};
pub use logging::{set_raw_terminal, setup_logging};
