//! Console configuration management

use crate::usb::identity::{DEFAULT_PRODUCT_ID, DEFAULT_VENDOR_ID, parse_vid_pid};
use crate::usb::DeviceIdentity;
use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConsoleConfig {
    #[serde(default)]
    pub console: ConsoleSettings,
    #[serde(default)]
    pub device: DeviceSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsoleSettings {
    #[serde(default = "ConsoleSettings::default_log_level")]
    pub log_level: String,
    /// Give the interface back to its kernel driver when the session ends
    #[serde(default)]
    pub reattach_kernel_driver: bool,
}

impl Default for ConsoleSettings {
    fn default() -> Self {
        Self {
            log_level: Self::default_log_level(),
            reattach_kernel_driver: false,
        }
    }
}

impl ConsoleSettings {
    fn default_log_level() -> String {
        "info".to_string()
    }
}

/// Device to connect to when not given on the command line
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceSettings {
    /// VID:PID in hex, e.g. "18d1:501c"
    #[serde(default = "DeviceSettings::default_device")]
    pub device: String,
    #[serde(default)]
    pub interface: u8,
    /// Serial number filter; empty matches any device
    #[serde(default)]
    pub serialno: String,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            device: Self::default_device(),
            interface: 0,
            serialno: String::new(),
        }
    }
}

impl DeviceSettings {
    fn default_device() -> String {
        format!("{:04x}:{:04x}", DEFAULT_VENDOR_ID, DEFAULT_PRODUCT_ID)
    }
}

impl ConsoleConfig {
    /// Load configuration from the specified path
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let config_path = if let Some(p) = path {
            expand_path(&p)
        } else {
            // Try standard locations in order
            let candidates = vec![
                Self::default_path(),
                PathBuf::from("/etc/usb-console/console.toml"),
            ];

            candidates
                .into_iter()
                .find(|p| p.exists())
                .ok_or_else(|| anyhow!("No configuration file found, using defaults"))?
        };

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config: ConsoleConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;

        config.validate()?;

        tracing::info!("Loaded configuration from: {}", config_path.display());
        Ok(config)
    }

    /// Load configuration or return defaults if not found
    pub fn load_or_default() -> Self {
        match Self::load(None) {
            Ok(config) => config,
            Err(e) => {
                tracing::debug!("Failed to load config: {}, using defaults", e);
                Self::default()
            }
        }
    }

    /// Save configuration to the specified path
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        // Create parent directories if they don't exist
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::info!("Saved configuration to: {}", path.display());
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            config_dir.join("usb-console").join("console.toml")
        } else {
            PathBuf::from(".config/usb-console/console.toml")
        }
    }

    /// Device identity described by the `[device]` section
    pub fn identity(&self) -> Result<DeviceIdentity> {
        let (vendor_id, product_id) = parse_vid_pid(&self.device.device)?;
        Ok(DeviceIdentity::new(vendor_id, product_id, self.device.interface)
            .with_serial(self.device.serialno.clone()))
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        Self::validate_log_level(&self.console.log_level)?;
        parse_vid_pid(&self.device.device)?;
        Ok(())
    }

    /// Validate a log level name
    pub fn validate_log_level(level: &str) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&level) {
            return Err(anyhow!(
                "Invalid log level '{}', must be one of: {}",
                level,
                valid_levels.join(", ")
            ));
        }
        Ok(())
    }
}

/// Expand a leading `~` in a user-supplied path
fn expand_path(path: &Path) -> PathBuf {
    match path.to_str() {
        Some(s) => PathBuf::from(shellexpand::tilde(s).as_ref()),
        None => path.to_path_buf(),
    }
}
