//! Test utilities for usb-console
//!
//! Mock USB host/devices and in-memory terminal streams, so the selector and
//! the bridge can be exercised without hardware. Available to unit tests and
//! behind the `test-utils` feature.
//!
//! # Example
//!
//! ```ignore
//! use usb_console::test_utils::{MockDevice, MockHost};
//! use usb_console::usb::{DeviceIdentity, DeviceSelector};
//!
//! let selector = DeviceSelector::new(MockHost::new(vec![MockDevice::console(0)]));
//! let endpoints = selector.resolve(&DeviceIdentity::default()).unwrap();
//! assert_eq!(endpoints.read_address(), 0x81);
//! ```

use crate::usb::identity::{DEFAULT_PRODUCT_ID, DEFAULT_VENDOR_ID};
use crate::usb::{
    BulkIn, BulkOut, CandidateDevice, EndpointInfo, InterfaceInfo, ResolvedEndpoints,
    SerialStrategy, UsbHost, endpoint_addresses,
};
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

/// Default test timeout (5 seconds)
pub const DEFAULT_TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// How long mocks pretend to wait when they have nothing to deliver
const IDLE_POLL: Duration = Duration::from_millis(5);

/// Poll `condition` until it holds or `timeout` elapses
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    condition()
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// IN endpoint that plays back a script, then times out forever
#[derive(Debug, Clone, Default)]
pub struct ScriptedBulkIn {
    script: VecDeque<rusb::Result<Vec<u8>>>,
}

impl ScriptedBulkIn {
    pub fn new(script: Vec<rusb::Result<Vec<u8>>>) -> Self {
        Self {
            script: script.into(),
        }
    }

    /// An endpoint that never has data
    pub fn idle() -> Self {
        Self::default()
    }
}

impl BulkIn for ScriptedBulkIn {
    fn read_bulk(&mut self, buf: &mut [u8], _timeout: Duration) -> rusb::Result<usize> {
        match self.script.pop_front() {
            Some(Ok(data)) => {
                let len = data.len().min(buf.len());
                buf[..len].copy_from_slice(&data[..len]);
                Ok(len)
            }
            Some(Err(e)) => {
                if e == rusb::Error::Timeout {
                    thread::sleep(IDLE_POLL);
                }
                Err(e)
            }
            None => {
                thread::sleep(IDLE_POLL);
                Err(rusb::Error::Timeout)
            }
        }
    }
}

/// Transfers accepted by a [`RecordingBulkOut`]
#[derive(Debug, Clone, Default)]
pub struct TransferLog {
    transfers: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl TransferLog {
    /// Every accepted transfer, in order
    pub fn transfers(&self) -> Vec<Vec<u8>> {
        lock(&self.transfers).clone()
    }

    /// All accepted bytes, concatenated
    pub fn bytes(&self) -> Vec<u8> {
        lock(&self.transfers).concat()
    }

    pub fn len(&self) -> usize {
        lock(&self.transfers).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// OUT endpoint that records every successful transfer
#[derive(Debug, Clone)]
pub struct RecordingBulkOut {
    log: TransferLog,
    failures: Arc<Mutex<(usize, rusb::Error)>>,
}

impl RecordingBulkOut {
    pub fn new() -> (Self, TransferLog) {
        let log = TransferLog::default();
        let writer = Self {
            log: log.clone(),
            failures: Arc::new(Mutex::new((0, rusb::Error::Io))),
        };
        (writer, log)
    }

    /// Fail the first `count` writes with `error` without recording them
    pub fn failing_first(self, count: usize, error: rusb::Error) -> Self {
        *lock(&self.failures) = (count, error);
        self
    }
}

impl BulkOut for RecordingBulkOut {
    fn write_bulk(&mut self, buf: &[u8], _timeout: Duration) -> rusb::Result<usize> {
        {
            let mut failures = lock(&self.failures);
            if failures.0 > 0 {
                failures.0 -= 1;
                return Err(failures.1);
            }
        }

        lock(&self.log.transfers).push(buf.to_vec());
        Ok(buf.len())
    }
}

/// Terminal output captured in memory
#[derive(Debug, Clone, Default)]
pub struct SharedOutput {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl SharedOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> Vec<u8> {
        lock(&self.buffer).clone()
    }
}

impl Write for SharedOutput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        lock(&self.buffer).extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Terminal input on which nobody ever types
#[derive(Debug, Clone, Copy, Default)]
pub struct IdleInput;

impl IdleInput {
    pub fn new() -> Self {
        Self
    }
}

impl Read for IdleInput {
    fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        thread::sleep(IDLE_POLL);
        Err(io::ErrorKind::WouldBlock.into())
    }
}

/// Side effects observed on a [`MockDevice`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceCall {
    ReadSerial(SerialStrategy),
    SetConfiguration,
    DetachKernelDriver(u8),
    Claim(u8),
    Release(u8),
    ReattachKernelDriver(u8),
}

/// Shared record of [`DeviceCall`]s
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    calls: Arc<Mutex<Vec<DeviceCall>>>,
}

impl CallLog {
    fn push(&self, call: DeviceCall) {
        lock(&self.calls).push(call);
    }

    pub fn calls(&self) -> Vec<DeviceCall> {
        lock(&self.calls).clone()
    }

    pub fn contains(&self, call: &DeviceCall) -> bool {
        lock(&self.calls).contains(call)
    }
}

/// Records the release of a mock interface claim
struct MockClaim {
    calls: CallLog,
    interface: u8,
    reattach: bool,
}

impl Drop for MockClaim {
    fn drop(&mut self) {
        self.calls.push(DeviceCall::Release(self.interface));
        if self.reattach {
            self.calls.push(DeviceCall::ReattachKernelDriver(self.interface));
        }
    }
}

/// Scriptable console device
#[derive(Debug, Clone)]
pub struct MockDevice {
    pub vendor_id: u16,
    pub product_id: u16,
    serial_language: rusb::Result<Option<String>>,
    serial_ascii: rusb::Result<Option<String>>,
    configuration: rusb::Result<()>,
    interfaces: Vec<InterfaceInfo>,
    kernel_driver: bool,
    detached: Vec<u8>,
    claim_error: Option<rusb::Error>,
    reader: ScriptedBulkIn,
    writer: RecordingBulkOut,
    transfers: TransferLog,
    calls: CallLog,
}

impl MockDevice {
    /// Default VID:PID device exposing the console endpoints of `interface`
    pub fn console(interface: u8) -> Self {
        let (writer, transfers) = RecordingBulkOut::new();
        let endpoints = endpoint_addresses(interface)
            .map(|(read, write)| vec![bulk(read), bulk(write)])
            .unwrap_or_default();

        Self {
            vendor_id: DEFAULT_VENDOR_ID,
            product_id: DEFAULT_PRODUCT_ID,
            serial_language: Ok(None),
            serial_ascii: Ok(None),
            configuration: Ok(()),
            interfaces: vec![InterfaceInfo {
                number: interface,
                endpoints,
            }],
            kernel_driver: false,
            detached: Vec::new(),
            claim_error: None,
            reader: ScriptedBulkIn::idle(),
            writer,
            transfers,
            calls: CallLog::default(),
        }
    }

    pub fn with_ids(mut self, vendor_id: u16, product_id: u16) -> Self {
        self.vendor_id = vendor_id;
        self.product_id = product_id;
        self
    }

    /// Serial number readable with either strategy
    pub fn with_serial(self, serial: &str) -> Self {
        self.with_serial_results(Ok(Some(serial.to_string())), Ok(Some(serial.to_string())))
    }

    pub fn with_serial_results(
        mut self,
        language: rusb::Result<Option<String>>,
        ascii: rusb::Result<Option<String>>,
    ) -> Self {
        self.serial_language = language;
        self.serial_ascii = ascii;
        self
    }

    pub fn with_configuration_error(mut self, error: rusb::Error) -> Self {
        self.configuration = Err(error);
        self
    }

    /// Replace the endpoint list of every interface
    pub fn with_endpoints(mut self, endpoints: &[EndpointInfo]) -> Self {
        for interface in &mut self.interfaces {
            interface.endpoints = endpoints.to_vec();
        }
        self
    }

    pub fn with_interface(mut self, interface: InterfaceInfo) -> Self {
        self.interfaces.push(interface);
        self
    }

    pub fn with_kernel_driver(mut self) -> Self {
        self.kernel_driver = true;
        self
    }

    pub fn with_claim_error(mut self, error: rusb::Error) -> Self {
        self.claim_error = Some(error);
        self
    }

    pub fn with_reader(mut self, reader: ScriptedBulkIn) -> Self {
        self.reader = reader;
        self
    }

    pub fn calls(&self) -> CallLog {
        self.calls.clone()
    }

    /// Transfers written to the OUT endpoint once claimed
    pub fn transfers(&self) -> TransferLog {
        self.transfers.clone()
    }
}

/// Bulk endpoint descriptor
pub fn bulk(address: u8) -> EndpointInfo {
    EndpointInfo {
        address,
        transfer_type: rusb::TransferType::Bulk,
    }
}

impl CandidateDevice for MockDevice {
    type Reader = ScriptedBulkIn;
    type Writer = RecordingBulkOut;

    fn read_serial(&mut self, strategy: SerialStrategy) -> rusb::Result<Option<String>> {
        self.calls.push(DeviceCall::ReadSerial(strategy));
        match strategy {
            SerialStrategy::Language => self.serial_language.clone(),
            SerialStrategy::Ascii => self.serial_ascii.clone(),
        }
    }

    fn set_configuration(&mut self) -> rusb::Result<()> {
        self.calls.push(DeviceCall::SetConfiguration);
        self.configuration
    }

    fn interface(&mut self, number: u8) -> rusb::Result<Option<InterfaceInfo>> {
        Ok(self.interfaces.iter().find(|i| i.number == number).cloned())
    }

    fn kernel_driver_active(&mut self, interface: u8) -> rusb::Result<bool> {
        Ok(self.kernel_driver && !self.detached.contains(&interface))
    }

    fn detach_kernel_driver(&mut self, interface: u8) -> rusb::Result<()> {
        self.calls.push(DeviceCall::DetachKernelDriver(interface));
        self.detached.push(interface);
        Ok(())
    }

    fn claim(
        self,
        interface: u8,
        _read_address: u8,
        _write_address: u8,
        reattach_kernel_driver: bool,
    ) -> rusb::Result<ResolvedEndpoints<ScriptedBulkIn, RecordingBulkOut>> {
        let reattach = reattach_kernel_driver && self.detached.contains(&interface);
        if let Some(error) = self.claim_error {
            if reattach {
                self.calls.push(DeviceCall::ReattachKernelDriver(interface));
            }
            return Err(error);
        }
        self.calls.push(DeviceCall::Claim(interface));

        let claim = MockClaim {
            calls: self.calls.clone(),
            interface,
            reattach,
        };

        ResolvedEndpoints::new(interface, self.reader, self.writer)
            .map(|endpoints| endpoints.with_claim(Box::new(claim)))
            .ok_or(rusb::Error::InvalidParam)
    }
}

/// Host with a fixed device list, in enumeration order
#[derive(Debug, Clone, Default)]
pub struct MockHost {
    devices: Vec<MockDevice>,
    enumeration_error: Option<rusb::Error>,
}

impl MockHost {
    pub fn new(devices: Vec<MockDevice>) -> Self {
        Self {
            devices,
            enumeration_error: None,
        }
    }

    /// Host whose enumeration fails
    pub fn failing(error: rusb::Error) -> Self {
        Self {
            devices: Vec::new(),
            enumeration_error: Some(error),
        }
    }
}

impl UsbHost for MockHost {
    type Device = MockDevice;

    fn find_devices(&self, vendor_id: u16, product_id: u16) -> rusb::Result<Vec<MockDevice>> {
        if let Some(error) = self.enumeration_error {
            return Err(error);
        }

        Ok(self
            .devices
            .iter()
            .filter(|d| d.vendor_id == vendor_id && d.product_id == product_id)
            .cloned()
            .collect())
    }
}
