//! Console device identity

use common::{Error, Result};
use std::fmt;

/// Default vendor ID (Google)
pub const DEFAULT_VENDOR_ID: u16 = 0x18d1;

/// Default product ID
pub const DEFAULT_PRODUCT_ID: u16 = 0x501c;

/// Which device and interface to open
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub vendor_id: u16,
    pub product_id: u16,
    pub interface_number: u8,
    pub serial_number: Option<String>,
}

impl DeviceIdentity {
    pub fn new(vendor_id: u16, product_id: u16, interface_number: u8) -> Self {
        Self {
            vendor_id,
            product_id,
            interface_number,
            serial_number: None,
        }
    }

    /// Restrict the match to a serial number. An empty string means no filter.
    pub fn with_serial(mut self, serial: impl Into<String>) -> Self {
        let serial = serial.into();
        self.serial_number = if serial.is_empty() { None } else { Some(serial) };
        self
    }
}

impl Default for DeviceIdentity {
    fn default() -> Self {
        Self::new(DEFAULT_VENDOR_ID, DEFAULT_PRODUCT_ID, 0)
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04x}:{:04x} interface {}",
            self.vendor_id, self.product_id, self.interface_number
        )?;
        if let Some(serial) = &self.serial_number {
            write!(f, " serial {}", serial)?;
        }
        Ok(())
    }
}

/// Parse a `VID:PID` pair of hex numbers, e.g. `18d1:501c`.
///
/// A `0x` prefix on either half is accepted.
pub fn parse_vid_pid(value: &str) -> Result<(u16, u16)> {
    let (vid, pid) = value.split_once(':').ok_or_else(|| {
        Error::Config(format!(
            "Invalid device '{}', expected VID:PID (e.g., '18d1:501c')",
            value
        ))
    })?;

    Ok((parse_hex_id(vid, "VID")?, parse_hex_id(pid, "PID")?))
}

fn parse_hex_id(id: &str, name: &str) -> Result<u16> {
    let trimmed = id.trim();
    let hex_part = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);

    if hex_part.is_empty() || hex_part.len() > 4 {
        return Err(Error::Config(format!(
            "Invalid {} '{}', hex part must be 1-4 digits",
            name, id
        )));
    }

    u16::from_str_radix(hex_part, 16)
        .map_err(|_| Error::Config(format!("Invalid {} '{}', not a valid hex number", name, id)))
}
