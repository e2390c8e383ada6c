//! Host platform seams.
//!
//! A [`ControlPort`](crate::ControlPort) is assembled from two privileged
//! handles: the machine memory device the control page is mapped from and a
//! hypervisor control interface that manages event channels and answers
//! domain queries. [`Platform`] opens both; [`DomainControl`] is the control
//! interface itself.
//!
//! - [`xen::XenPlatform`] talks to the real hypervisor devices.
//! - [`loopback::LoopbackPlatform`] keeps everything in-process so both ends
//!   of the protocol can run in one test.

use std::fs::File;
use std::io;
use std::path::PathBuf;

use xenctl_common::consts::DomainId;

pub mod loopback;
pub mod xen;

pub use loopback::LoopbackPlatform;
pub use xen::{XenControl, XenPlatform};

/// Port numbers of a bound inter-domain event channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelPorts {
    /// Port in the calling domain.
    pub local: u32,
    /// Port in the remote domain.
    pub remote: u32,
}

/// Status of a domain as reported by the hypervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DomainInfo {
    /// Domain the answer describes.
    pub domid: DomainId,
    /// Machine frame of the domain's shared info page.
    pub shared_info_frame: u64,
}

/// Hypervisor control interface.
///
/// Dropping the value closes the interface.
pub trait DomainControl {
    /// Bind a new event channel between the calling domain and `remote`.
    fn bind_interdomain(&mut self, remote: DomainId) -> io::Result<ChannelPorts>;

    /// Close a channel previously returned by [`Self::bind_interdomain`].
    fn close_channel(&mut self, local_port: u32) -> io::Result<()>;

    /// Raise the remote end of the channel bound at `local_port`.
    fn notify(&self, local_port: u32) -> io::Result<()>;

    /// Query the status of `domain`.
    fn domain_info(&self, domain: DomainId) -> io::Result<DomainInfo>;
}

/// Source of the privileged handles a control port is built from.
pub trait Platform {
    /// Control interface type produced by [`Self::open_control`].
    type Control: DomainControl;

    /// Path of the machine memory device, for diagnostics.
    fn memory_device(&self) -> PathBuf;

    /// Open the machine memory device read/write.
    fn open_memory(&self) -> io::Result<File>;

    /// Open the hypervisor control interface.
    fn open_control(&self) -> io::Result<Self::Control>;

    /// Byte offset of the control interface within the shared info page.
    fn control_offset(&self) -> usize;
}
