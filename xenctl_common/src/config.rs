//! Configuration loading traits and types.
//!
//! This module provides a standardized way to load TOML configuration files
//! for the control tools.
//!
//! # Usage
//!
//! ```rust,no_run
//! use xenctl_common::config::{ChannelConfig, ConfigLoader, ConfigError};
//! use std::path::Path;
//!
//! fn main() -> Result<(), ConfigError> {
//!     let config = ChannelConfig::load(Path::new("xenctl.toml"))?;
//!     config.validate()?;
//!     println!("Service: {}", config.shared.service_name);
//!     Ok(())
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::consts::{
    CONTROL_IF_OFFSET, DEFAULT_DOM0_INTERFACE_VERSION, DEFAULT_EVTCHN_DEVICE,
    DEFAULT_MEMORY_DEVICE, DEFAULT_PRIVCMD_DEVICE, PAGE_SIZE,
};
use crate::ctrl::consts::CONTROL_IF_SIZE;

/// Error type for configuration loading operations.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Configuration file not found at specified path.
    #[error("Configuration file not found")]
    FileNotFound,

    /// TOML parsing failed.
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Semantic validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

/// Log level for application logging.
///
/// Uses lowercase serde values for TOML compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Most verbose, detailed tracing information.
    Trace,
    /// Debug information useful during development.
    Debug,
    /// General information about application operation.
    #[default]
    Info,
    /// Warning messages for potentially problematic situations.
    Warn,
    /// Error messages for serious problems.
    Error,
}

impl LogLevel {
    /// Directive understood by `tracing_subscriber::EnvFilter`.
    pub const fn as_directive(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// Common configuration fields shared by every tool built on the channel.
///
/// # TOML Example
///
/// ```toml
/// [shared]
/// log_level = "debug"
/// service_name = "xenctl"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedConfig {
    /// Logging verbosity level.
    #[serde(default)]
    pub log_level: LogLevel,

    /// Application instance identifier.
    pub service_name: String,
}

impl SharedConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if `service_name` is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service_name.is_empty() {
            return Err(ConfigError::ValidationError(
                "service_name cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Device paths and layout parameters of the host platform.
///
/// Every field has a default matching a stock control domain.
///
/// # TOML Example
///
/// ```toml
/// [platform]
/// evtchn_device = "/dev/xen/evtchn"
/// privcmd_device = "/proc/xen/privcmd"
/// memory_device = "/dev/mem"
/// control_offset = 2048
/// dom0_interface_version = 0xAAAA1001
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformConfig {
    /// Event-channel notification device.
    pub evtchn_device: PathBuf,
    /// Hypervisor privileged-command device.
    pub privcmd_device: PathBuf,
    /// Machine memory device the control page is mapped from.
    pub memory_device: PathBuf,
    /// Byte offset of the control interface within the mapped page.
    pub control_offset: usize,
    /// Interface version stamped into dom0 operations.
    pub dom0_interface_version: u32,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            evtchn_device: PathBuf::from(DEFAULT_EVTCHN_DEVICE),
            privcmd_device: PathBuf::from(DEFAULT_PRIVCMD_DEVICE),
            memory_device: PathBuf::from(DEFAULT_MEMORY_DEVICE),
            control_offset: CONTROL_IF_OFFSET,
            dom0_interface_version: DEFAULT_DOM0_INTERFACE_VERSION,
        }
    }
}

impl PlatformConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if:
    /// - any device path is empty
    /// - `control_offset` is not 4-byte aligned
    /// - the control interface would not fit in one page at `control_offset`
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, path) in [
            ("evtchn_device", &self.evtchn_device),
            ("privcmd_device", &self.privcmd_device),
            ("memory_device", &self.memory_device),
        ] {
            if path.as_os_str().is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "{name} cannot be empty"
                )));
            }
        }

        if self.control_offset % 4 != 0 {
            return Err(ConfigError::ValidationError(format!(
                "control_offset {} is not 4-byte aligned",
                self.control_offset
            )));
        }

        if self.control_offset + CONTROL_IF_SIZE > PAGE_SIZE {
            return Err(ConfigError::ValidationError(format!(
                "control interface ({CONTROL_IF_SIZE} bytes) overruns the page at offset {}",
                self.control_offset
            )));
        }

        Ok(())
    }
}

/// Complete configuration file of a control-channel client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Common fields.
    pub shared: SharedConfig,
    /// Platform devices and layout.
    #[serde(default)]
    pub platform: PlatformConfig,
}

impl ChannelConfig {
    /// Validate every section.
    ///
    /// # Errors
    ///
    /// Propagates the first `ConfigError::ValidationError` found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.shared.validate()?;
        self.platform.validate()
    }
}

/// Trait for loading configuration from TOML files.
///
/// # Contract
///
/// - Returns `ConfigError::FileNotFound` if the file does not exist
/// - Returns `ConfigError::ParseError` if TOML syntax is invalid
pub trait ConfigLoader: Sized + serde::de::DeserializeOwned {
    /// Load configuration from a TOML file.
    fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound
            } else {
                ConfigError::ParseError(e.to_string())
            }
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

// Blanket implementation for all types that implement DeserializeOwned.
impl<T: serde::de::DeserializeOwned> ConfigLoader for T {}
