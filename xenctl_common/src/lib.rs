//! xenctl Common Library
//!
//! Definitions shared by both ends of the domain control channel. Nothing in
//! this crate touches the operating system: it describes the wire format and
//! loads configuration, so a peer implementation of the protocol can depend on
//! it without pulling in device access.
//!
//! # Module Structure
//!
//! - [`ctrl`] - Control interface layout and the [`ctrl::Message`] value type
//! - [`evtchn`] - Event-channel wake-up record decoding
//! - [`consts`] - Platform constants (page size, device paths, offsets)
//! - [`config`] - Configuration loading traits and types
//! - [`prelude`] - Common re-exports for convenience
//!
//! # Usage
//!
//! ```rust
//! use xenctl_common::ctrl::Message;
//! use xenctl_common::evtchn::{EventKind, Wakeup};
//!
//! let mut msg = Message::new(1, 2, 3);
//! msg.append_payload(b"ping").unwrap();
//! assert_eq!(msg.payload(), b"ping");
//!
//! let wakeup = Wakeup::decode(0x8007);
//! assert_eq!(wakeup.port, 7);
//! assert_eq!(wakeup.kind, EventKind::Disconnect);
//! ```

pub mod config;
pub mod consts;
pub mod ctrl;
pub mod evtchn;
pub mod prelude;
