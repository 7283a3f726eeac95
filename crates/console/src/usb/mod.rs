//! USB subsystem
//!
//! Discovery of the console device and access to its bulk endpoints.
//!
//! This module implements the USB side of the console, handling:
//! - Device enumeration and serial-number disambiguation
//! - Interface lookup, kernel driver detach and interface claim
//! - Bulk endpoint resolution from the interface number
//!
//! The selector only depends on the [`UsbHost`] and [`CandidateDevice`]
//! traits; [`host`] implements them on top of rusb.

use std::time::Duration;

pub mod endpoints;
pub mod host;
pub mod identity;
pub mod selector;

// Re-export public types
pub use endpoints::{BulkIn, BulkOut, ClaimGuard, ResolvedEndpoints};
pub use host::{DeviceSummary, RusbDevice, RusbHost};
pub use identity::DeviceIdentity;
pub use selector::DeviceSelector;

/// Timeout applied to every bulk transfer attempt
pub const TRANSFER_TIMEOUT: Duration = Duration::from_millis(100);

/// Largest read issued against the IN endpoint
pub const MAX_TRANSFER_SIZE: usize = 64;

/// IN endpoint address for interface 0; interface N uses `0x81 + N`
pub const READ_ENDPOINT_BASE: u8 = 0x81;

/// OUT endpoint address for interface 0; interface N uses `0x01 + N`
pub const WRITE_ENDPOINT_BASE: u8 = 0x01;

/// Endpoint addresses (read, write) for an interface number.
///
/// Returns `None` when the sum does not fit in an endpoint address.
pub fn endpoint_addresses(interface: u8) -> Option<(u8, u8)> {
    let read = interface.checked_add(READ_ENDPOINT_BASE)?;
    let write = interface.checked_add(WRITE_ENDPOINT_BASE)?;
    Some((read, write))
}

/// Strategy used to read a serial-number string descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SerialStrategy {
    /// UTF-16 read in the device's first advertised language
    Language,
    /// Plain ASCII read with the default language
    Ascii,
}

/// Endpoint as seen in an interface descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointInfo {
    pub address: u8,
    pub transfer_type: rusb::TransferType,
}

/// Interface descriptor (first alternate setting) of the active configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceInfo {
    pub number: u8,
    pub endpoints: Vec<EndpointInfo>,
}

impl InterfaceInfo {
    /// Find an endpoint by address
    pub fn endpoint(&self, address: u8) -> Option<&EndpointInfo> {
        self.endpoints.iter().find(|ep| ep.address == address)
    }
}

/// Enumeration capability of a USB stack
pub trait UsbHost {
    type Device: CandidateDevice;

    /// Devices whose descriptor matches `vendor_id:product_id`, in
    /// enumeration order.
    fn find_devices(&self, vendor_id: u16, product_id: u16) -> rusb::Result<Vec<Self::Device>>;
}

/// A device that matched the vendor/product filter
///
/// Methods that need an open handle open the device on first use.
pub trait CandidateDevice {
    type Reader: BulkIn + 'static;
    type Writer: BulkOut + 'static;

    /// Read the serial-number string descriptor.
    ///
    /// `Ok(None)` means the device does not advertise a serial number.
    fn read_serial(&mut self, strategy: SerialStrategy) -> rusb::Result<Option<String>>;

    /// Select the device's first configuration
    fn set_configuration(&mut self) -> rusb::Result<()>;

    /// Look up an interface in the active configuration
    fn interface(&mut self, number: u8) -> rusb::Result<Option<InterfaceInfo>>;

    fn kernel_driver_active(&mut self, interface: u8) -> rusb::Result<bool>;

    fn detach_kernel_driver(&mut self, interface: u8) -> rusb::Result<()>;

    /// Claim `interface` and hand out its two bulk endpoints.
    ///
    /// The claim is released when the returned endpoints' guard is dropped;
    /// a detached kernel driver is reattached at that point only when
    /// `reattach_kernel_driver` is set. A failed claim reattaches it right
    /// away under the same condition.
    fn claim(
        self,
        interface: u8,
        read_address: u8,
        write_address: u8,
        reattach_kernel_driver: bool,
    ) -> rusb::Result<ResolvedEndpoints<Self::Reader, Self::Writer>>;
}
