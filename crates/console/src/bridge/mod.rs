//! Duplex bridge between the terminal and the console endpoints
//!
//! Two forwarding loops run on dedicated threads (blocking USB and terminal
//! I/O stays off the async runtime) until the shared [`BridgeState`] stops:
//! - `usb-rx`: IN endpoint → terminal output
//! - `usb-tx`: terminal input → OUT endpoint
//!
//! The controller stops the bridge with [`DuplexBridge::request_exit`] or
//! watches [`DuplexBridge::is_running`], then calls [`DuplexBridge::join`].
//! The interface claim is released only after both loops have exited.

pub mod forward;
pub mod state;

pub use forward::EXIT_BYTE;
pub use state::{BridgeState, ExitReason};

use crate::usb::{BulkIn, BulkOut, ClaimGuard, ResolvedEndpoints};
use common::{Error, Result};
use std::io::{Read, Write};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, info};

/// A running console session
pub struct DuplexBridge {
    state: Arc<BridgeState>,
    rx_thread: Option<JoinHandle<()>>,
    tx_thread: Option<JoinHandle<()>>,
    claim: Option<ClaimGuard>,
}

impl DuplexBridge {
    /// Start forwarding between `endpoints` and the terminal streams
    pub fn start<I, O, R, W>(endpoints: ResolvedEndpoints<I, O>, input: R, output: W) -> Result<Self>
    where
        I: BulkIn + 'static,
        O: BulkOut + 'static,
        R: Read + Send + 'static,
        W: Write + Send + 'static,
    {
        info!(
            "Starting console on interface {} (in {:#04x}, out {:#04x})",
            endpoints.interface_number(),
            endpoints.read_address(),
            endpoints.write_address()
        );

        let (reader, writer, claim) = endpoints.into_parts();
        let state = Arc::new(BridgeState::new());

        let rx_state = Arc::clone(&state);
        let rx_thread = thread::Builder::new()
            .name("usb-rx".to_string())
            .spawn(move || forward::device_to_terminal(&rx_state, reader, output))?;

        let tx_state = Arc::clone(&state);
        let tx_thread = match thread::Builder::new()
            .name("usb-tx".to_string())
            .spawn(move || forward::terminal_to_device(&tx_state, input, writer))
        {
            Ok(handle) => handle,
            Err(e) => {
                state.stop(ExitReason::Requested);
                let _ = rx_thread.join();
                return Err(Error::Io(e));
            }
        };

        Ok(Self {
            state,
            rx_thread: Some(rx_thread),
            tx_thread: Some(tx_thread),
            claim,
        })
    }

    /// Ask both loops to stop. Calling this more than once is harmless.
    pub fn request_exit(&self) {
        self.stop(ExitReason::Requested);
    }

    /// Stop with a specific reason; the first reason recorded wins
    pub fn stop(&self, reason: ExitReason) {
        if self.state.stop(reason) {
            debug!("Stopping bridge: {}", reason);
        }
    }

    pub fn is_running(&self) -> bool {
        self.state.is_running()
    }

    pub fn exit_reason(&self) -> Option<ExitReason> {
        self.state.exit_reason()
    }

    /// Shared state, for watchers that outlive a borrow of the bridge
    pub fn state(&self) -> Arc<BridgeState> {
        Arc::clone(&self.state)
    }

    /// Wait for both loops to finish and release the interface.
    ///
    /// Blocks until the bridge has been stopped; call it after
    /// `is_running()` turned false or after `request_exit`.
    pub fn join(mut self) -> Result<ExitReason> {
        self.join_threads()?;
        Ok(self.state.exit_reason().unwrap_or(ExitReason::Requested))
    }

    /// `request_exit` followed by `join`
    pub fn shutdown(self) -> Result<ExitReason> {
        self.request_exit();
        self.join()
    }

    fn join_threads(&mut self) -> Result<()> {
        let mut panicked = Vec::new();

        for (name, handle) in [("usb-rx", self.rx_thread.take()), ("usb-tx", self.tx_thread.take())] {
            if let Some(handle) = handle {
                if handle.join().is_err() {
                    panicked.push(name);
                }
            }
        }

        // Endpoints are gone with the threads; the claim can go now.
        self.claim.take();

        if panicked.is_empty() {
            debug!("Bridge threads joined");
            Ok(())
        } else {
            Err(Error::Bridge(format!(
                "forwarding thread(s) panicked: {}",
                panicked.join(", ")
            )))
        }
    }
}

impl Drop for DuplexBridge {
    fn drop(&mut self) {
        if self.rx_thread.is_some() || self.tx_thread.is_some() {
            self.state.stop(ExitReason::Requested);
            let _ = self.join_threads();
        }
    }
}
