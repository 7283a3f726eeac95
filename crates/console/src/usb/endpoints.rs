//! Bulk endpoint access
//!
//! The forwarding loops only see these traits, so each direction can run on
//! its own thread with its own endpoint.

use crate::usb::endpoint_addresses;
use std::time::Duration;

/// Device-to-host bulk endpoint
pub trait BulkIn: Send {
    /// Read up to `buf.len()` bytes, returning the number of bytes read
    fn read_bulk(&mut self, buf: &mut [u8], timeout: Duration) -> rusb::Result<usize>;
}

/// Host-to-device bulk endpoint
pub trait BulkOut: Send {
    /// Write `buf`, returning the number of bytes accepted by the device
    fn write_bulk(&mut self, buf: &[u8], timeout: Duration) -> rusb::Result<usize>;
}

/// Keeps an interface claimed for as long as it is alive
pub type ClaimGuard = Box<dyn Send>;

/// Both bulk endpoints of a claimed console interface
pub struct ResolvedEndpoints<I, O> {
    interface_number: u8,
    read_address: u8,
    write_address: u8,
    reader: I,
    writer: O,
    claim: Option<ClaimGuard>,
}

impl<I: BulkIn, O: BulkOut> ResolvedEndpoints<I, O> {
    /// Wrap endpoints of `interface_number`.
    ///
    /// Addresses follow the fixed console layout (`0x81 + N`, `0x01 + N`);
    /// returns `None` if they would overflow.
    pub fn new(interface_number: u8, reader: I, writer: O) -> Option<Self> {
        let (read_address, write_address) = endpoint_addresses(interface_number)?;
        Some(Self {
            interface_number,
            read_address,
            write_address,
            reader,
            writer,
            claim: None,
        })
    }

    /// Attach the guard that releases the interface claim on drop
    pub fn with_claim(mut self, claim: ClaimGuard) -> Self {
        self.claim = Some(claim);
        self
    }

    pub fn interface_number(&self) -> u8 {
        self.interface_number
    }

    pub fn read_address(&self) -> u8 {
        self.read_address
    }

    pub fn write_address(&self) -> u8 {
        self.write_address
    }

    /// Split into reader, writer and claim guard
    pub fn into_parts(self) -> (I, O, Option<ClaimGuard>) {
        (self.reader, self.writer, self.claim)
    }
}

impl<I, O> std::fmt::Debug for ResolvedEndpoints<I, O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedEndpoints")
            .field("interface_number", &self.interface_number)
            .field("read_address", &format_args!("{:#04x}", self.read_address))
            .field("write_address", &format_args!("{:#04x}", self.write_address))
            .field("claimed", &self.claim.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{RecordingBulkOut, ScriptedBulkIn};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct DropFlag(Arc<AtomicBool>);

    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_addresses_follow_interface_number() {
        let (writer, _log) = RecordingBulkOut::new();
        let endpoints = ResolvedEndpoints::new(2, ScriptedBulkIn::idle(), writer).unwrap();
        assert_eq!(endpoints.interface_number(), 2);
        assert_eq!(endpoints.read_address(), 0x83);
        assert_eq!(endpoints.write_address(), 0x03);
    }

    #[test]
    fn test_claim_guard_dropped_with_parts() {
        let released = Arc::new(AtomicBool::new(false));
        let (writer, _log) = RecordingBulkOut::new();
        let endpoints = ResolvedEndpoints::new(0, ScriptedBulkIn::idle(), writer)
            .unwrap()
            .with_claim(Box::new(DropFlag(released.clone())));

        let (_reader, _writer, claim) = endpoints.into_parts();
        assert!(!released.load(Ordering::SeqCst));
        drop(claim);
        assert!(released.load(Ordering::SeqCst));
    }
}
