//! rusb-backed USB host
//!
//! Implements [`UsbHost`] and [`CandidateDevice`] on top of libusb, plus the
//! bulk endpoints handed to the bridge.

use crate::usb::{
    BulkIn, BulkOut, CandidateDevice, EndpointInfo, InterfaceInfo, ResolvedEndpoints,
    SerialStrategy, UsbHost,
};
use rusb::{Context, Device, DeviceDescriptor, DeviceHandle, UsbContext};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Timeout for string descriptor control reads
const STRING_TIMEOUT: Duration = Duration::from_secs(1);

/// USB host backed by a libusb context
pub struct RusbHost {
    context: Context,
}

impl RusbHost {
    pub fn new() -> common::Result<Self> {
        let context = Context::new()?;
        Ok(Self { context })
    }

    /// Describe every device on the bus
    pub fn list_devices(&self) -> common::Result<Vec<DeviceSummary>> {
        let mut summaries = Vec::new();

        for device in self.context.devices()?.iter() {
            match RusbDevice::new(device) {
                Ok(device) => summaries.push(device.summary()),
                Err(e) => warn!("Failed to read device descriptor: {}", e),
            }
        }

        Ok(summaries)
    }
}

impl UsbHost for RusbHost {
    type Device = RusbDevice;

    fn find_devices(&self, vendor_id: u16, product_id: u16) -> rusb::Result<Vec<RusbDevice>> {
        let mut matches = Vec::new();

        for device in self.context.devices()?.iter() {
            let device = match RusbDevice::new(device) {
                Ok(device) => device,
                Err(e) => {
                    debug!("Skipping device without readable descriptor: {}", e);
                    continue;
                }
            };

            if device.descriptor.vendor_id() == vendor_id
                && device.descriptor.product_id() == product_id
            {
                debug!(
                    "Candidate device: bus={}, addr={}",
                    device.device.bus_number(),
                    device.device.address()
                );
                matches.push(device);
            }
        }

        Ok(matches)
    }
}

/// USB device wrapper with cached descriptor
pub struct RusbDevice {
    /// Underlying rusb device
    device: Device<Context>,
    /// Cached device descriptor
    descriptor: DeviceDescriptor,
    /// Device handle (if opened)
    handle: Option<DeviceHandle<Context>>,
    /// Interfaces we detached a kernel driver from
    detached: Vec<u8>,
}

impl RusbDevice {
    /// Create a new device wrapper, reading and caching the device descriptor
    pub fn new(device: Device<Context>) -> rusb::Result<Self> {
        let descriptor = device.device_descriptor()?;

        Ok(Self {
            device,
            descriptor,
            handle: None,
            detached: Vec::new(),
        })
    }

    fn open_handle(&mut self) -> rusb::Result<&DeviceHandle<Context>> {
        if self.handle.is_none() {
            let handle = self.device.open()?;
            debug!(
                "Opened device bus={}, addr={}",
                self.device.bus_number(),
                self.device.address()
            );
            self.handle = Some(handle);
        }

        self.handle.as_ref().ok_or(rusb::Error::NoDevice)
    }

    /// Summarize the device, reading string descriptors if it can be opened
    pub fn summary(&self) -> DeviceSummary {
        let strings = self.device.open().ok().map(|handle| {
            let read = |index: Option<u8>| {
                index.and_then(|idx| handle.read_string_descriptor_ascii(idx).ok())
            };
            (
                read(self.descriptor.manufacturer_string_index()),
                read(self.descriptor.product_string_index()),
                read(self.descriptor.serial_number_string_index()),
            )
        });
        let (manufacturer, product, serial_number) = strings.unwrap_or((None, None, None));

        DeviceSummary {
            bus_number: self.device.bus_number(),
            device_address: self.device.address(),
            vendor_id: self.descriptor.vendor_id(),
            product_id: self.descriptor.product_id(),
            manufacturer,
            product,
            serial_number,
        }
    }
}

impl CandidateDevice for RusbDevice {
    type Reader = InEndpoint;
    type Writer = OutEndpoint;

    fn read_serial(&mut self, strategy: SerialStrategy) -> rusb::Result<Option<String>> {
        if self.descriptor.serial_number_string_index().is_none() {
            return Ok(None);
        }

        self.open_handle()?;
        let handle = self.handle.as_ref().ok_or(rusb::Error::NoDevice)?;

        let serial = match strategy {
            SerialStrategy::Language => {
                let languages = handle.read_languages(STRING_TIMEOUT)?;
                let language = *languages.first().ok_or(rusb::Error::NotFound)?;
                handle.read_serial_number_string(language, &self.descriptor, STRING_TIMEOUT)?
            }
            SerialStrategy::Ascii => handle.read_serial_number_string_ascii(&self.descriptor)?,
        };

        Ok(Some(serial))
    }

    fn set_configuration(&mut self) -> rusb::Result<()> {
        let number = self.device.config_descriptor(0)?.number();
        self.open_handle()?.set_active_configuration(number)
    }

    fn interface(&mut self, number: u8) -> rusb::Result<Option<InterfaceInfo>> {
        let config = self.device.active_config_descriptor()?;

        let info = config
            .interfaces()
            .find(|interface| interface.number() == number)
            .and_then(|interface| interface.descriptors().next())
            .map(|descriptor| InterfaceInfo {
                number: descriptor.interface_number(),
                endpoints: descriptor
                    .endpoint_descriptors()
                    .map(|ep| EndpointInfo {
                        address: ep.address(),
                        transfer_type: ep.transfer_type(),
                    })
                    .collect(),
            });

        Ok(info)
    }

    fn kernel_driver_active(&mut self, interface: u8) -> rusb::Result<bool> {
        self.open_handle()?.kernel_driver_active(interface)
    }

    fn detach_kernel_driver(&mut self, interface: u8) -> rusb::Result<()> {
        self.open_handle()?.detach_kernel_driver(interface)?;
        self.detached.push(interface);
        Ok(())
    }

    fn claim(
        mut self,
        interface: u8,
        read_address: u8,
        write_address: u8,
        reattach_kernel_driver: bool,
    ) -> rusb::Result<ResolvedEndpoints<InEndpoint, OutEndpoint>> {
        let reattach = reattach_kernel_driver && self.detached.contains(&interface);
        self.open_handle()?;
        let handle = self.handle.take().ok_or(rusb::Error::NoDevice)?;
        if let Err(e) = handle.claim_interface(interface) {
            if reattach {
                reattach_driver(&handle, interface);
            }
            return Err(e);
        }
        debug!("Claimed interface {}", interface);

        let handle = Arc::new(handle);
        let reader = InEndpoint {
            handle: Arc::clone(&handle),
            address: read_address,
        };
        let writer = OutEndpoint {
            handle: Arc::clone(&handle),
            address: write_address,
        };
        let claim = InterfaceClaim {
            handle,
            interface,
            reattach,
        };

        ResolvedEndpoints::new(interface, reader, writer)
            .map(|endpoints| endpoints.with_claim(Box::new(claim)))
            .ok_or(rusb::Error::InvalidParam)
    }
}

/// Bulk IN endpoint of a claimed interface
pub struct InEndpoint {
    handle: Arc<DeviceHandle<Context>>,
    address: u8,
}

impl BulkIn for InEndpoint {
    fn read_bulk(&mut self, buf: &mut [u8], timeout: Duration) -> rusb::Result<usize> {
        self.handle.read_bulk(self.address, buf, timeout)
    }
}

/// Bulk OUT endpoint of a claimed interface
pub struct OutEndpoint {
    handle: Arc<DeviceHandle<Context>>,
    address: u8,
}

impl BulkOut for OutEndpoint {
    fn write_bulk(&mut self, buf: &[u8], timeout: Duration) -> rusb::Result<usize> {
        self.handle.write_bulk(self.address, buf, timeout)
    }
}

/// Releases the interface (and optionally reattaches the kernel driver) on drop
struct InterfaceClaim {
    handle: Arc<DeviceHandle<Context>>,
    interface: u8,
    reattach: bool,
}

impl Drop for InterfaceClaim {
    fn drop(&mut self) {
        if let Err(e) = self.handle.release_interface(self.interface) {
            warn!("Failed to release interface {}: {}", self.interface, e);
        } else {
            debug!("Released interface {}", self.interface);
        }

        if self.reattach {
            reattach_driver(&self.handle, self.interface);
        }
    }
}

fn reattach_driver(handle: &DeviceHandle<Context>, interface: u8) {
    match handle.attach_kernel_driver(interface) {
        Ok(()) => debug!("Reattached kernel driver to interface {}", interface),
        Err(e) => warn!(
            "Could not reattach kernel driver to interface {}: {}",
            interface, e
        ),
    }
}

/// One line of `--list-devices` output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceSummary {
    pub bus_number: u8,
    pub device_address: u8,
    pub vendor_id: u16,
    pub product_id: u16,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
    pub serial_number: Option<String>,
}

impl fmt::Display for DeviceSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Bus {:03} Device {:03}: {:04x}:{:04x} {} {}",
            self.bus_number,
            self.device_address,
            self.vendor_id,
            self.product_id,
            self.manufacturer.as_deref().unwrap_or("Unknown Manufacturer"),
            self.product.as_deref().unwrap_or("Unknown Product"),
        )?;
        if let Some(serial) = &self.serial_number {
            write!(f, " (serial {})", serial)?;
        }
        Ok(())
    }
}
