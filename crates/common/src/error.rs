//! Common error types

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("USB device {} not found", describe_device(.vendor_id, .product_id, .serial))]
    DeviceNotFound {
        vendor_id: u16,
        product_id: u16,
        serial: Option<String>,
    },

    #[error("Interface {interface} not found in active configuration")]
    InterfaceNotFound { interface: u8 },

    #[error("Endpoint {address:#04x} not found on interface {interface}")]
    EndpointNotFound { interface: u8, address: u8 },

    #[error("USB error: {0}")]
    Transport(#[from] rusb::Error),

    #[error("Terminal error: {0}")]
    Terminal(String),

    #[error("Bridge error: {0}")]
    Bridge(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

fn describe_device(vendor_id: &u16, product_id: &u16, serial: &Option<String>) -> String {
    match serial {
        Some(serial) => format!("{:04x}:{:04x} ({})", vendor_id, product_id, serial),
        None => format!("{:04x}:{:04x}", vendor_id, product_id),
    }
}
