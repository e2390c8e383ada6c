//! Error types for control channel operations

use std::path::PathBuf;

use thiserror::Error;
use xenctl_common::config::ConfigError;
use xenctl_common::consts::DomainId;

/// Resource errors raised while acquiring or using channel resources.
///
/// Queue-empty and queue-full conditions are not errors of this kind; they
/// are reported through [`NotReady`](crate::port::NotReady).
#[derive(Error, Debug)]
pub enum ChannelError {
    /// The privileged memory device could not be opened
    #[error("Could not open memory device {path:?}: {source}")]
    MemoryDeviceOpen {
        /// Device path
        path: PathBuf,
        /// Source IO error
        source: std::io::Error,
    },

    /// The hypervisor control interface could not be opened
    #[error("Could not open hypervisor control interface: {source}")]
    ControlInterfaceOpen {
        /// Source IO error
        source: std::io::Error,
    },

    /// No event channel could be bound to the remote domain
    #[error("Could not open channel to domain {domain}: {source}")]
    EventChannelOpen {
        /// Remote domain
        domain: DomainId,
        /// Source IO error
        source: std::io::Error,
    },

    /// The domain status query failed
    #[error("Failed to obtain status of domain {domain}: {source}")]
    DomainLookup {
        /// Remote domain
        domain: DomainId,
        /// Source IO error
        source: std::io::Error,
    },

    /// The domain status query answered for a different domain
    #[error("Domain status mismatch: asked for {expected}, got {actual}")]
    DomainMismatch {
        /// Requested domain
        expected: DomainId,
        /// Domain the hypervisor reported
        actual: DomainId,
    },

    /// The control page of the domain could not be mapped
    #[error("Failed to map control interface of domain {domain} (frame {frame:#x}): {source}")]
    MapFailed {
        /// Remote domain
        domain: DomainId,
        /// Machine frame holding the control page
        frame: u64,
        /// Source IO error
        source: std::io::Error,
    },

    /// The event-channel device could not be opened
    #[error("Could not open event-channel device {path:?}: {source}")]
    NotifierOpen {
        /// Device path
        path: PathBuf,
        /// Source IO error
        source: std::io::Error,
    },

    /// Byte ring capacity is not a usable power of two
    #[error("Invalid ring capacity: {capacity} bytes (must be a power of two, 1B-2GB)")]
    InvalidCapacity {
        /// Requested capacity
        capacity: usize,
    },

    /// Configuration rejected
    #[error("Configuration error: {source}")]
    Config {
        /// Source configuration error
        #[from]
        source: ConfigError,
    },

    /// IO error
    #[error("IO error: {source}")]
    Io {
        /// Source IO error
        #[from]
        source: std::io::Error,
    },
}

impl ChannelError {
    /// Raw OS error code of the underlying failure, if any.
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            Self::MemoryDeviceOpen { source, .. }
            | Self::ControlInterfaceOpen { source }
            | Self::EventChannelOpen { source, .. }
            | Self::DomainLookup { source, .. }
            | Self::MapFailed { source, .. }
            | Self::NotifierOpen { source, .. }
            | Self::Io { source } => source.raw_os_error(),
            Self::DomainMismatch { .. } | Self::InvalidCapacity { .. } | Self::Config { .. } => {
                None
            }
        }
    }
}

/// Result type for control channel operations
pub type ChannelResult<T> = Result<T, ChannelError>;
