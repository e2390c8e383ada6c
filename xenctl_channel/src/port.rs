//! Controller end of a domain's control interface.
//!
//! A [`ControlPort`] multiplexes four single-producer/single-consumer queues
//! onto the two physical rings of the shared page:
//!
//! ```text
//!              tx_ring                          rx_ring
//!   domain ──requests──► port         port ──requests──► domain
//!   domain ◄─responses── port         port ◄─responses── domain
//!
//!   tx_req_prod   shared, domain     rx_req_prod   local + shared, port
//!   tx_req_cons   local              rx_resp_prod  shared, domain
//!   tx_resp_prod  local + shared     rx_resp_cons  local
//! ```
//!
//! A response always occupies the slot of the request it answers, so the
//! guards differ per operation:
//!
//! | operation         | not ready when                                            |
//! |-------------------|-----------------------------------------------------------|
//! | `read_request`    | `tx_req_cons == tx_req_prod` or `tx_req_cons - tx_resp_prod == RING_SIZE` |
//! | `write_request`   | `rx_req_prod - rx_resp_cons == RING_SIZE`                 |
//! | `read_response`   | `rx_resp_cons == rx_resp_prod` or `rx_resp_cons == rx_req_prod` |
//! | `write_response`  | `tx_resp_prod == tx_req_cons`                             |
//!
//! None of the operations block. A queue that is empty or full is reported
//! as [`NotReady`], which callers handle by polling again later.

use std::fs::File;

use memmap2::MmapOptions;
use thiserror::Error;
use xenctl_common::config::PlatformConfig;
use xenctl_common::consts::{DomainId, PAGE_SIZE};
use xenctl_common::ctrl::Message;
use xenctl_common::ctrl::consts::{ProducerIndex, RING_SIZE, Ring};

use crate::error::{ChannelError, ChannelResult};
use crate::interface::ControlInterface;
use crate::platform::{ChannelPorts, DomainControl, Platform, XenControl, XenPlatform};

/// A queue has nothing to read or no room to write.
///
/// This is ordinary back-pressure, not a fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum NotReady {
    /// No request to read.
    #[error("no request to read")]
    NoRequest,
    /// No space to write a request.
    #[error("no space to write request")]
    NoRequestSpace,
    /// No response to read.
    #[error("no response to read")]
    NoResponse,
    /// No space to write a response.
    #[error("no space to write response")]
    NoResponseSpace,
}

/// Event channel bound to a remote domain; owns the control interface it was
/// bound through.
///
/// Dropping it closes the channel and then the control interface.
struct BoundChannel<C: DomainControl> {
    control: C,
    ports: ChannelPorts,
}

impl<C: DomainControl> BoundChannel<C> {
    fn bind(mut control: C, remote: DomainId) -> ChannelResult<Self> {
        let ports = control
            .bind_interdomain(remote)
            .map_err(|source| ChannelError::EventChannelOpen {
                domain: remote,
                source,
            })?;
        tracing::debug!(
            domain = remote,
            local = ports.local,
            remote = ports.remote,
            "event channel bound"
        );
        Ok(Self { control, ports })
    }
}

impl<C: DomainControl> Drop for BoundChannel<C> {
    fn drop(&mut self) {
        if let Err(e) = self.control.close_channel(self.ports.local) {
            tracing::warn!(port = self.ports.local, error = %e, "failed to close event channel");
        } else {
            tracing::debug!(port = self.ports.local, "event channel closed");
        }
    }
}

/// Controller end of one domain's control interface.
///
/// Resources are released in reverse acquisition order on drop: the page is
/// unmapped, the event channel closed, the control interface closed and the
/// memory device closed. Field order below encodes that order.
pub struct ControlPort<C: DomainControl = XenControl> {
    interface: ControlInterface,
    channel: BoundChannel<C>,
    _memory: File,
    remote_domain: DomainId,
    tx_req_cons: u32,
    tx_resp_prod: u32,
    rx_req_prod: u32,
    rx_resp_cons: u32,
}

impl ControlPort<XenControl> {
    /// Open a port to `remote_domain` using the default host devices.
    ///
    /// # Errors
    ///
    /// See [`ControlPort::open_with`].
    pub fn open(remote_domain: DomainId) -> ChannelResult<Self> {
        Self::open_with(&XenPlatform::new(PlatformConfig::default()), remote_domain)
    }
}

impl<C: DomainControl> ControlPort<C> {
    /// Open a port to `remote_domain` through `platform`.
    ///
    /// Steps, each undone in reverse if a later one fails: open the memory
    /// device, open the control interface, bind an event channel, look up
    /// the domain, map its control page.
    ///
    /// # Errors
    ///
    /// - [`ChannelError::MemoryDeviceOpen`]
    /// - [`ChannelError::ControlInterfaceOpen`]
    /// - [`ChannelError::EventChannelOpen`]
    /// - [`ChannelError::DomainLookup`] / [`ChannelError::DomainMismatch`]
    /// - [`ChannelError::MapFailed`]
    pub fn open_with<P>(platform: &P, remote_domain: DomainId) -> ChannelResult<Self>
    where
        P: Platform<Control = C>,
    {
        let memory = platform
            .open_memory()
            .map_err(|source| ChannelError::MemoryDeviceOpen {
                path: platform.memory_device(),
                source,
            })?;

        let control = platform
            .open_control()
            .map_err(|source| ChannelError::ControlInterfaceOpen { source })?;

        let channel = BoundChannel::bind(control, remote_domain)?;

        let info = channel
            .control
            .domain_info(remote_domain)
            .map_err(|source| ChannelError::DomainLookup {
                domain: remote_domain,
                source,
            })?;
        if info.domid != remote_domain {
            return Err(ChannelError::DomainMismatch {
                expected: remote_domain,
                actual: info.domid,
            });
        }

        let frame = info.shared_info_frame;
        let map_error = |source| ChannelError::MapFailed {
            domain: remote_domain,
            frame,
            source,
        };
        let offset = frame
            .checked_mul(PAGE_SIZE as u64)
            .ok_or_else(|| map_error(std::io::Error::from_raw_os_error(libc::EOVERFLOW)))?;
        // SAFETY: the page is shared with the remote domain and is only ever
        // accessed through ControlInterface, which treats it as racy memory.
        let map = unsafe {
            MmapOptions::new()
                .offset(offset)
                .len(PAGE_SIZE)
                .map_mut(&memory)
        }
        .map_err(map_error)?;
        let interface =
            ControlInterface::new(map, platform.control_offset()).map_err(map_error)?;

        tracing::debug!(domain = remote_domain, frame, "control interface mapped");

        Ok(Self {
            interface,
            channel,
            _memory: memory,
            remote_domain,
            tx_req_cons: 0,
            tx_resp_prod: 0,
            rx_req_prod: 0,
            rx_resp_cons: 0,
        })
    }

    /// Domain at the other end.
    #[inline]
    pub fn remote_domain(&self) -> DomainId {
        self.remote_domain
    }

    /// Event-channel port in this domain.
    #[inline]
    pub fn local_port(&self) -> u32 {
        self.channel.ports.local
    }

    /// Event-channel port in the remote domain.
    #[inline]
    pub fn remote_port(&self) -> u32 {
        self.channel.ports.remote
    }

    /// Raise the remote end of the event channel.
    ///
    /// A failed signal is a missed wake-up, which the peer tolerates; it is
    /// logged and otherwise ignored.
    pub fn notify(&self) {
        if let Err(e) = self.channel.control.notify(self.channel.ports.local) {
            tracing::warn!(
                domain = self.remote_domain,
                port = self.channel.ports.local,
                error = %e,
                "event channel notification failed"
            );
        }
    }

    /// Whether a request from the domain is waiting.
    pub fn request_to_read(&self) -> bool {
        let c = self.tx_req_cons;
        !(c == self.interface.load_producer(ProducerIndex::TxReq)
            || c.wrapping_sub(self.tx_resp_prod) == RING_SIZE)
    }

    /// Whether a request to the domain can be written.
    pub fn space_to_write_request(&self) -> bool {
        self.rx_req_prod.wrapping_sub(self.rx_resp_cons) != RING_SIZE
    }

    /// Whether a response from the domain is waiting.
    pub fn response_to_read(&self) -> bool {
        let c = self.rx_resp_cons;
        !(c == self.interface.load_producer(ProducerIndex::RxResp) || c == self.rx_req_prod)
    }

    /// Whether a response to the domain can be written.
    pub fn space_to_write_response(&self) -> bool {
        self.tx_resp_prod != self.tx_req_cons
    }

    /// Take the next request sent by the domain.
    ///
    /// # Errors
    ///
    /// [`NotReady::NoRequest`] if nothing is waiting, or if every slot of the
    /// ring holds a request that still awaits its response.
    pub fn read_request(&mut self) -> Result<Message, NotReady> {
        if !self.request_to_read() {
            return Err(NotReady::NoRequest);
        }
        let msg = self.interface.read_slot(Ring::Tx, self.tx_req_cons);
        self.tx_req_cons = self.tx_req_cons.wrapping_add(1);
        tracing::trace!(domain = self.remote_domain, cons = self.tx_req_cons, "request read");
        Ok(msg)
    }

    /// Send a request to the domain. The new producer index is published
    /// immediately; call [`Self::notify`] to wake the domain.
    ///
    /// # Errors
    ///
    /// [`NotReady::NoRequestSpace`] while `RING_SIZE` requests are
    /// outstanding.
    pub fn write_request(&mut self, msg: &Message) -> Result<(), NotReady> {
        if !self.space_to_write_request() {
            return Err(NotReady::NoRequestSpace);
        }
        self.interface.write_slot(Ring::Rx, self.rx_req_prod, msg);
        self.rx_req_prod = self.rx_req_prod.wrapping_add(1);
        self.interface
            .publish_producer(ProducerIndex::RxReq, self.rx_req_prod);
        tracing::trace!(domain = self.remote_domain, prod = self.rx_req_prod, "request written");
        Ok(())
    }

    /// Take the next response sent by the domain.
    ///
    /// # Errors
    ///
    /// [`NotReady::NoResponse`] if nothing is waiting or no request is
    /// outstanding.
    pub fn read_response(&mut self) -> Result<Message, NotReady> {
        if !self.response_to_read() {
            return Err(NotReady::NoResponse);
        }
        let msg = self.interface.read_slot(Ring::Rx, self.rx_resp_cons);
        self.rx_resp_cons = self.rx_resp_cons.wrapping_add(1);
        tracing::trace!(domain = self.remote_domain, cons = self.rx_resp_cons, "response read");
        Ok(msg)
    }

    /// Answer the oldest unanswered domain request. The new producer index
    /// is published immediately.
    ///
    /// # Errors
    ///
    /// [`NotReady::NoResponseSpace`] if every request read so far has already
    /// been answered.
    pub fn write_response(&mut self, msg: &Message) -> Result<(), NotReady> {
        if !self.space_to_write_response() {
            return Err(NotReady::NoResponseSpace);
        }
        self.interface.write_slot(Ring::Tx, self.tx_resp_prod, msg);
        self.tx_resp_prod = self.tx_resp_prod.wrapping_add(1);
        self.interface
            .publish_producer(ProducerIndex::TxResp, self.tx_resp_prod);
        tracing::trace!(domain = self.remote_domain, prod = self.tx_resp_prod, "response written");
        Ok(())
    }
}

impl<C: DomainControl> Drop for ControlPort<C> {
    fn drop(&mut self) {
        tracing::debug!(domain = self.remote_domain, "closing control port");
    }
}

impl<C: DomainControl> std::fmt::Debug for ControlPort<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlPort")
            .field("remote_domain", &self.remote_domain)
            .field("local_port", &self.channel.ports.local)
            .field("remote_port", &self.channel.ports.remote)
            .field("tx_req_cons", &self.tx_req_cons)
            .field("tx_resp_prod", &self.tx_resp_prod)
            .field("rx_req_prod", &self.rx_req_prod)
            .field("rx_resp_cons", &self.rx_resp_cons)
            .finish()
    }
}
