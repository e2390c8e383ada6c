//! Prelude module for common re-exports.
//!
//! ```rust
//! use xenctl_common::prelude::*;
//! ```

// ─── Logging ────────────────────────────────────────────────────────
pub use crate::config::LogLevel;

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{ChannelConfig, ConfigError, ConfigLoader, PlatformConfig, SharedConfig};

// ─── Control Interface ──────────────────────────────────────────────
pub use crate::ctrl::consts::{MAX_PAYLOAD, RING_SIZE};
pub use crate::ctrl::{Message, MessageHeader, PayloadTooLarge};

// ─── Event Channels ─────────────────────────────────────────────────
pub use crate::evtchn::{EventKind, Wakeup};

// ─── Platform ───────────────────────────────────────────────────────
pub use crate::consts::{DomainId, PAGE_SIZE};
