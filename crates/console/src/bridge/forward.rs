//! Forwarding loops
//!
//! One loop per direction. Each owns its endpoint and its side of the
//! terminal; the only thing they share is the [`BridgeState`].

use crate::bridge::state::{BridgeState, ExitReason};
use crate::usb::{BulkIn, BulkOut, MAX_TRANSFER_SIZE, TRANSFER_TIMEOUT};
use std::io::{ErrorKind, Read, Write};
use std::thread;
use tracing::{debug, error, warn};

/// Byte that ends the session when read from the terminal (Ctrl-C)
pub const EXIT_BYTE: u8 = 0x03;

/// Device to terminal: poll the IN endpoint and copy whatever arrives.
pub fn device_to_terminal<I, W>(state: &BridgeState, mut endpoint: I, mut output: W)
where
    I: BulkIn,
    W: Write,
{
    let mut buf = [0u8; MAX_TRANSFER_SIZE];

    while state.is_running() {
        match endpoint.read_bulk(&mut buf, TRANSFER_TIMEOUT) {
            Ok(0) => {}
            Ok(len) => {
                // Lost characters on a closed pty are acceptable.
                if let Err(e) = output.write_all(&buf[..len]).and_then(|()| output.flush()) {
                    debug!("Dropped {} bytes of device output: {}", len, e);
                }
            }
            Err(rusb::Error::Timeout) => {}
            Err(rusb::Error::NoDevice) => {
                error!("Device disconnected");
                state.stop(ExitReason::DeviceDisconnected);
            }
            Err(e) => {
                warn!("rx: {}", e);
                thread::sleep(TRANSFER_TIMEOUT);
            }
        }
    }

    debug!("Device-to-terminal loop stopped");
}

/// Terminal to device: forward input one byte per transfer.
///
/// `input` may report `WouldBlock` or `TimedOut` when idle; that just gives
/// the loop a chance to notice a stop. End of input stops reading but not
/// the session.
pub fn terminal_to_device<R, O>(state: &BridgeState, mut input: R, mut endpoint: O)
where
    R: Read,
    O: BulkOut,
{
    let mut byte = [0u8; 1];
    let mut input_open = true;

    while state.is_running() {
        if !input_open {
            thread::sleep(TRANSFER_TIMEOUT);
            continue;
        }

        match input.read(&mut byte) {
            Ok(0) => {
                debug!("Terminal input closed");
                input_open = false;
            }
            Ok(_) => {
                if byte[0] == EXIT_BYTE {
                    state.stop(ExitReason::ExitByte);
                }

                match endpoint.write_bulk(&byte, TRANSFER_TIMEOUT) {
                    Ok(_) => {}
                    Err(rusb::Error::NoDevice) => {
                        error!("Device disconnected");
                        state.stop(ExitReason::DeviceDisconnected);
                    }
                    Err(e) => warn!("tx: {}", e),
                }
            }
            Err(e)
                if matches!(
                    e.kind(),
                    ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted
                ) => {}
            Err(e) => {
                warn!("tx: terminal read failed: {}", e);
                thread::sleep(TRANSFER_TIMEOUT);
            }
        }
    }

    debug!("Terminal-to-device loop stopped");
}
