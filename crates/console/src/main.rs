//! usb-console
//!
//! Opens an interactive terminal to a device console exposed over USB bulk
//! endpoints. Ctrl-C (sent to the terminal as byte 0x03) ends the session.

use anyhow::{Context, Result};
use clap::Parser;
use common::setup_logging;
use std::io;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info};
use usb_console::bridge::{DuplexBridge, ExitReason};
use usb_console::config::ConsoleConfig;
use usb_console::terminal::{StdinReader, TerminalSession};
use usb_console::usb::identity::parse_vid_pid;
use usb_console::usb::{BulkIn, BulkOut, DeviceIdentity, DeviceSelector, ResolvedEndpoints, RusbHost};

/// How often the controller checks whether the bridge is still running
const SUPERVISOR_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Parser, Debug)]
#[command(name = "usb-console")]
#[command(author, version, about = "Open a console to a USB device")]
#[command(long_about = "
Bridges this terminal to the bulk endpoints of a USB device console, for
embedded devices that expose a vendor-specific interface instead of a serial
port. Press Ctrl-C to exit.

EXAMPLES:
    # Default device (18d1:501c), interface 0
    usb-console

    # Pick one of several identical devices by serial number
    usb-console --device 18d1:501c --serialno 0123ABCD

    # Console on another interface
    usb-console --interface 2

    # List USB devices without opening a console
    usb-console --list-devices

CONFIGURATION:
    Defaults are read from the first file found:
    1. Path specified with --config
    2. ~/.config/usb-console/console.toml
    3. /etc/usb-console/console.toml
    Command-line options take precedence.
")]
struct Args {
    /// vid:pid of target device (hex)
    #[arg(short, long, value_name = "VID:PID")]
    device: Option<String>,

    /// Interface number of console
    #[arg(short, long, value_name = "N")]
    interface: Option<u8>,

    /// Serial number of device
    #[arg(short, long, value_name = "SERIAL")]
    serialno: Option<String>,

    /// Reattach the kernel driver when the session ends
    #[arg(long)]
    reattach_kernel_driver: bool,

    /// Path to configuration file
    #[arg(short, long, value_name = "PATH")]
    config: Option<std::path::PathBuf>,

    /// Save default configuration to default location and exit
    #[arg(long)]
    save_config: bool,

    /// List USB devices and exit
    #[arg(long)]
    list_devices: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Handle --save-config flag early (before loading config)
    if args.save_config {
        let config = ConsoleConfig::default();
        let path = ConsoleConfig::default_path();
        config.save(&path).context("Failed to save configuration")?;
        println!("Configuration saved to: {}", path.display());
        return Ok(());
    }

    let config = if let Some(ref path) = args.config {
        ConsoleConfig::load(Some(path.clone())).context("Failed to load configuration")?
    } else {
        ConsoleConfig::load_or_default()
    };

    let log_level = args
        .log_level
        .as_deref()
        .unwrap_or(&config.console.log_level);

    setup_logging(log_level).context("Failed to setup logging")?;

    info!("usb-console v{}", env!("CARGO_PKG_VERSION"));

    let host = RusbHost::new().context("Failed to initialize USB")?;

    if args.list_devices {
        return list_devices_mode(&host);
    }

    let identity = identity_from_args(&args, &config)?;
    let selector = DeviceSelector::new(host)
        .reattach_kernel_driver(args.reattach_kernel_driver || config.console.reattach_kernel_driver);

    let endpoints = selector
        .resolve(&identity)
        .with_context(|| format!("Failed to open console on {}", identity))?;

    eprintln!("Connected to {}. Press Ctrl-C to exit.", identity);

    let mut terminal = TerminalSession::acquire().context("Failed to prepare terminal")?;
    let result = run_session(endpoints).await;

    // Restore before anything else is printed
    if let Err(e) = terminal.restore() {
        error!("{}", e);
    }

    let reason = result?;
    info!("Session ended: {}", reason);
    Ok(())
}

/// Merge command-line options over the configured device
fn identity_from_args(args: &Args, config: &ConsoleConfig) -> Result<DeviceIdentity> {
    let device = args.device.as_deref().unwrap_or(&config.device.device);
    let (vendor_id, product_id) =
        parse_vid_pid(device).with_context(|| format!("Invalid --device '{}'", device))?;

    let interface = args.interface.unwrap_or(config.device.interface);
    let serial = args
        .serialno
        .clone()
        .unwrap_or_else(|| config.device.serialno.clone());

    Ok(DeviceIdentity::new(vendor_id, product_id, interface).with_serial(serial))
}

/// List USB devices and exit
fn list_devices_mode(host: &RusbHost) -> Result<()> {
    let devices = host.list_devices().context("Failed to enumerate USB devices")?;

    if devices.is_empty() {
        println!("No USB devices found.");
    } else {
        println!("Found {} USB device(s):\n", devices.len());
        for device in devices {
            println!("  {}", device);
        }
    }

    Ok(())
}

/// Run the bridge until it stops on its own or the process is interrupted
async fn run_session<I, O>(endpoints: ResolvedEndpoints<I, O>) -> Result<ExitReason>
where
    I: BulkIn + 'static,
    O: BulkOut + 'static,
{
    let input = StdinReader::new().context("Failed to open terminal input")?;
    let bridge =
        DuplexBridge::start(endpoints, input, io::stdout()).context("Failed to start console")?;

    let ctrl_c = signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut watch_signals = true;
    let mut ticker = tokio::time::interval(SUPERVISOR_INTERVAL);

    loop {
        tokio::select! {
            result = &mut ctrl_c, if watch_signals => match result {
                Ok(()) => {
                    info!("Received interrupt, shutting down");
                    bridge.stop(ExitReason::Interrupted);
                    break;
                }
                Err(e) => {
                    error!("Error waiting for Ctrl+C: {}", e);
                    watch_signals = false;
                }
            },
            _ = ticker.tick() => {
                if !bridge.is_running() {
                    break;
                }
            }
        }
    }

    let reason = tokio::task::spawn_blocking(move || bridge.join())
        .await
        .context("Bridge join task failed")??;

    Ok(reason)
}
