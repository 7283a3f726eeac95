//! Integration tests for configuration parsing
//!
//! Tests console configuration files, including:
//! - Minimal and full files
//! - Defaults for missing sections
//! - Invalid values
//! - Save and reload

use std::io::Write;
use tempfile::NamedTempFile;
use usb_console::config::ConsoleConfig;
use usb_console::usb::DeviceIdentity;

const FULL_CONFIG: &str = r#"
[console]
log_level = "debug"
reattach_kernel_driver = true

[device]
device = "0483:5740"
interface = 2
serialno = "0123ABCD"
"#;

fn write_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("create temp file");
    file.write_all(content.as_bytes()).expect("write config");
    file
}

#[test]
fn test_full_config() {
    let file = write_config(FULL_CONFIG);
    let config = ConsoleConfig::load(Some(file.path().to_path_buf())).unwrap();

    assert_eq!(config.console.log_level, "debug");
    assert!(config.console.reattach_kernel_driver);
    assert_eq!(
        config.identity().unwrap(),
        DeviceIdentity::new(0x0483, 0x5740, 2).with_serial("0123ABCD")
    );
}

#[test]
fn test_empty_config_uses_defaults() {
    let file = write_config("");
    let config = ConsoleConfig::load(Some(file.path().to_path_buf())).unwrap();

    assert_eq!(config.console.log_level, "info");
    assert_eq!(config.identity().unwrap(), DeviceIdentity::default());
}

#[test]
fn test_partial_device_section() {
    let file = write_config("[device]\ninterface = 1\n");
    let config = ConsoleConfig::load(Some(file.path().to_path_buf())).unwrap();

    let identity = config.identity().unwrap();
    assert_eq!(identity.vendor_id, 0x18d1);
    assert_eq!(identity.product_id, 0x501c);
    assert_eq!(identity.interface_number, 1);
    assert_eq!(identity.serial_number, None);
}

#[test]
fn test_invalid_log_level_rejected() {
    let file = write_config("[console]\nlog_level = \"loud\"\n");
    assert!(ConsoleConfig::load(Some(file.path().to_path_buf())).is_err());
}

#[test]
fn test_invalid_device_rejected() {
    let file = write_config("[device]\ndevice = \"18d1\"\n");
    assert!(ConsoleConfig::load(Some(file.path().to_path_buf())).is_err());
}

#[test]
fn test_interface_out_of_range_rejected() {
    let file = write_config("[device]\ninterface = 300\n");
    assert!(ConsoleConfig::load(Some(file.path().to_path_buf())).is_err());
}

#[test]
fn test_missing_file_is_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("missing.toml");
    assert!(ConsoleConfig::load(Some(path)).is_err());
}

#[test]
fn test_save_and_reload() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("console.toml");

    let mut config = ConsoleConfig::default();
    config.device.serialno = "SAVED".to_string();
    config.save(&path).unwrap();

    let reloaded = ConsoleConfig::load(Some(path)).unwrap();
    assert_eq!(reloaded.device.serialno, "SAVED");
    assert_eq!(reloaded.device.device, "18d1:501c");
}
