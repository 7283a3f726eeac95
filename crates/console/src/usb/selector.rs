//! Console device discovery
//!
//! Finds the device by VID:PID (and optionally serial number), claims the
//! console interface and resolves its bulk endpoints.

use crate::usb::{
    CandidateDevice, DeviceIdentity, ResolvedEndpoints, SerialStrategy, UsbHost,
    endpoint_addresses,
};
use common::{Error, Result};
use tracing::{debug, info, warn};

/// Resolves a [`DeviceIdentity`] to claimed bulk endpoints
pub struct DeviceSelector<H> {
    host: H,
    reattach_kernel_driver: bool,
}

type Endpoints<H> = ResolvedEndpoints<
    <<H as UsbHost>::Device as CandidateDevice>::Reader,
    <<H as UsbHost>::Device as CandidateDevice>::Writer,
>;

impl<H: UsbHost> DeviceSelector<H> {
    pub fn new(host: H) -> Self {
        Self {
            host,
            reattach_kernel_driver: false,
        }
    }

    /// Hand the interface back to its kernel driver when the claim is released
    pub fn reattach_kernel_driver(mut self, reattach: bool) -> Self {
        self.reattach_kernel_driver = reattach;
        self
    }

    /// Find, configure and claim the console interface
    pub fn resolve(&self, identity: &DeviceIdentity) -> Result<Endpoints<H>> {
        let mut device = self.select_device(identity)?;

        // Fails when the platform already configured the device.
        if let Err(e) = device.set_configuration() {
            debug!("Set configuration failed (already configured?): {}", e);
        }

        let interface = identity.interface_number;
        let info = device
            .interface(interface)?
            .ok_or(Error::InterfaceNotFound { interface })?;

        let (read_address, write_address) =
            endpoint_addresses(interface).ok_or(Error::EndpointNotFound {
                interface,
                address: interface.wrapping_add(crate::usb::READ_ENDPOINT_BASE),
            })?;

        for address in [read_address, write_address] {
            match info.endpoint(address) {
                Some(ep) if ep.transfer_type != rusb::TransferType::Bulk => {
                    warn!(
                        "Endpoint {:#04x} is {:?}, not bulk; using it anyway",
                        address, ep.transfer_type
                    );
                }
                Some(_) => {}
                None => return Err(Error::EndpointNotFound { interface, address }),
            }
        }

        match device.kernel_driver_active(interface) {
            Ok(true) => {
                debug!("Detaching kernel driver from interface {}", interface);
                if let Err(e) = device.detach_kernel_driver(interface) {
                    warn!(
                        "Failed to detach kernel driver from interface {}: {}",
                        interface, e
                    );
                }
            }
            Ok(false) => {
                debug!("No kernel driver active on interface {}", interface);
            }
            Err(e) => {
                debug!(
                    "Could not check kernel driver status for interface {}: {}",
                    interface, e
                );
            }
        }

        let endpoints = device.claim(
            interface,
            read_address,
            write_address,
            self.reattach_kernel_driver,
        )?;

        info!(
            "Claimed interface {} (in {:#04x}, out {:#04x}) on {:04x}:{:04x}",
            interface, read_address, write_address, identity.vendor_id, identity.product_id
        );

        Ok(endpoints)
    }

    fn select_device(&self, identity: &DeviceIdentity) -> Result<H::Device> {
        let not_found = || Error::DeviceNotFound {
            vendor_id: identity.vendor_id,
            product_id: identity.product_id,
            serial: identity.serial_number.clone(),
        };

        let devices = self
            .host
            .find_devices(identity.vendor_id, identity.product_id)?;
        debug!(
            "Found {} device(s) matching {:04x}:{:04x}",
            devices.len(),
            identity.vendor_id,
            identity.product_id
        );

        let Some(wanted) = identity.serial_number.as_deref() else {
            return devices.into_iter().next().ok_or_else(not_found);
        };

        for mut device in devices {
            match read_serial(&mut device) {
                Some(serial) if serial == wanted => return Ok(device),
                Some(serial) => debug!("Skipping device with serial {}", serial),
                None => {}
            }
        }

        Err(not_found())
    }
}

/// Read a candidate's serial number, trying the language-aware read first.
///
/// A device without a serial and a device whose descriptor cannot be read
/// both yield `None`; the latter is logged.
fn read_serial<D: CandidateDevice>(device: &mut D) -> Option<String> {
    match device.read_serial(SerialStrategy::Language) {
        Ok(serial) => return serial,
        Err(e) => debug!("Serial read failed ({}), retrying as ASCII", e),
    }

    match device.read_serial(SerialStrategy::Ascii) {
        Ok(serial) => serial,
        Err(e) => {
            warn!("Could not read serial number descriptor: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{DeviceCall, MockDevice, MockHost};

    #[test]
    fn test_read_serial_prefers_language_strategy() {
        let mut device = MockDevice::console(0).with_serial("PRIMARY");
        assert_eq!(read_serial(&mut device).as_deref(), Some("PRIMARY"));
    }

    #[test]
    fn test_read_serial_falls_back_to_ascii() {
        let mut device = MockDevice::console(0)
            .with_serial_results(Err(rusb::Error::Pipe), Ok(Some("FALLBACK".to_string())));
        assert_eq!(read_serial(&mut device).as_deref(), Some("FALLBACK"));
    }

    #[test]
    fn test_read_serial_both_failing_is_none() {
        let mut device = MockDevice::console(0)
            .with_serial_results(Err(rusb::Error::Pipe), Err(rusb::Error::Io));
        assert_eq!(read_serial(&mut device), None);
    }

    #[test]
    fn test_set_configuration_failure_is_swallowed() {
        let device = MockDevice::console(0).with_configuration_error(rusb::Error::Busy);
        let calls = device.calls();
        let selector = DeviceSelector::new(MockHost::new(vec![device]));

        assert!(selector.resolve(&DeviceIdentity::default()).is_ok());
        assert!(calls.contains(&DeviceCall::SetConfiguration));
    }

    #[test]
    fn test_detach_only_when_kernel_driver_active() {
        let device = MockDevice::console(0);
        let calls = device.calls();
        let selector = DeviceSelector::new(MockHost::new(vec![device]));
        selector.resolve(&DeviceIdentity::default()).unwrap();
        assert!(!calls.contains(&DeviceCall::DetachKernelDriver(0)));
    }
}
