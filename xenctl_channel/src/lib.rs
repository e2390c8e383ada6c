//! # xenctl Control Channel
//!
//! Controller-side plumbing for talking to guest domains over the legacy
//! control interface: an event-channel notifier, a control port per domain
//! and a fixed-capacity byte ring for buffering console-style streams.
//!
//! ## Components
//!
//! - [`EventNotifier`] - non-blocking handle on the event-channel device,
//!   yielding `(port, kind)` wake-ups
//! - [`ControlPort`] - maps a domain's control interface and runs the four
//!   logical queues carried by its two rings
//! - [`ByteRing`] - power-of-two byte FIFO with free-running cursors
//! - [`platform`] - hypervisor backend and an in-process loopback backend
//!
//! ## Architecture Overview
//!
//! ```text
//!  ┌───────────────┐  wake-ups   ┌─────────────────┐
//!  │ EventNotifier │◄────────────┤  event channel  │◄──── domain notify
//!  └──────┬────────┘             └─────────────────┘
//!         │ port
//!         ▼
//!  ┌───────────────┐   mapped    ┌──────────────────────────────┐
//!  │  ControlPort  ├────────────►│ tx_ring | rx_ring | indices  │◄── domain
//!  └──────┬────────┘             └──────────────────────────────┘
//!         │ notify
//!         └──────────────────────► event channel ───► domain
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use xenctl_channel::platform::LoopbackPlatform;
//! use xenctl_channel::{ControlPort, Message};
//! use xenctl_common::consts::CONTROL_IF_OFFSET;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let platform = LoopbackPlatform::new(CONTROL_IF_OFFSET)?;
//! platform.add_domain(7)?;
//!
//! let mut port = ControlPort::open_with(&platform, 7)?;
//! let mut domain = platform.attach_peer(7)?;
//!
//! let mut ping = Message::new(1, 2, 3);
//! ping.append_payload(b"ping")?;
//! domain.write_request(&ping)?;
//!
//! let request = port.read_request()?;
//! assert_eq!(request.payload(), b"ping");
//!
//! port.write_response(&Message::new(1, 2, 3))?;
//! port.notify();
//! assert_eq!(domain.read_response()?.header().id, 3);
//! # Ok(())
//! # }
//! ```
//!
//! ## Thread Safety
//!
//! - **ControlPort**: `Send`, not `Sync`; one owner drives all four queues
//! - **EventNotifier**: one per process, owned by the poll loop
//! - **ByteRing**: plain value, no internal synchronization

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod buffer;
pub mod error;
pub mod interface;
pub mod notifier;
pub mod peer;
pub mod platform;
pub mod port;

pub use buffer::ByteRing;
pub use error::{ChannelError, ChannelResult};
pub use interface::ControlInterface;
pub use notifier::EventNotifier;
pub use peer::PeerPort;
pub use port::{ControlPort, NotReady};
pub use xenctl_common::ctrl::{Message, MessageHeader, PayloadTooLarge};
pub use xenctl_common::evtchn::{EventKind, Wakeup};

use xenctl_common::config::LogLevel;

/// Install a global `fmt` subscriber.
///
/// `RUST_LOG` takes precedence; otherwise events at `level` and above are
/// shown. A second call leaves the first subscriber in place.
pub fn init_tracing(level: LogLevel) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_directive()));

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_tracing_twice() {
        init_tracing(LogLevel::Debug);
        init_tracing(LogLevel::Warn);
        tracing::debug!("subscriber installed");
    }
}
