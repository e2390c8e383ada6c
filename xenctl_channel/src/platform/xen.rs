//! Hypervisor backend.
//!
//! Hypercalls are issued through the privileged-command device: the argument
//! block of the operation is passed by pointer in a `privcmd_hypercall`
//! record and the hypervisor writes results back into the same block.
//! Operation blocks are encoded with explicit offsets rather than overlaid
//! structs, matching how the control interface itself is handled.

use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

use static_assertions::const_assert_eq;
use xenctl_common::config::{ChannelConfig, ConfigLoader, PlatformConfig};
use xenctl_common::consts::{DOMID_SELF, DomainId};

use super::{ChannelPorts, DomainControl, DomainInfo, Platform};
use crate::error::ChannelResult;

const HYPERVISOR_DOM0_OP: u64 = 7;
const HYPERVISOR_EVENT_CHANNEL_OP: u64 = 16;

const DOM0_GETDOMAININFO: u32 = 12;

const EVTCHNOP_BIND_INTERDOMAIN: u32 = 0;
const EVTCHNOP_CLOSE: u32 = 3;
const EVTCHNOP_SEND: u32 = 4;

/// Argument block of `__HYPERVISOR_event_channel_op`: `cmd` then the union.
const EVTCHN_OP_SIZE: usize = 32;
/// Argument block of `__HYPERVISOR_dom0_op`: `cmd`, `interface_version`,
/// then a 128-byte union.
const DOM0_OP_SIZE: usize = 136;

// dom0_getdomaininfo_t, relative to the union.
const GDI_DOMAIN: usize = 0;
const GDI_SHARED_INFO_FRAME: usize = 32;

#[repr(C)]
struct PrivcmdHypercall {
    op: u64,
    arg: [u64; 5],
}

const_assert_eq!(std::mem::size_of::<PrivcmdHypercall>(), 48);

const IOCTL_PRIVCMD_HYPERCALL: nix::sys::ioctl::ioctl_num_type =
    ((std::mem::size_of::<PrivcmdHypercall>() << 16) | ((b'P' as usize) << 8))
        as nix::sys::ioctl::ioctl_num_type;

mod sys {
    use super::{IOCTL_PRIVCMD_HYPERCALL, PrivcmdHypercall};

    nix::ioctl_readwrite_bad!(privcmd_hypercall, IOCTL_PRIVCMD_HYPERCALL, PrivcmdHypercall);
}

/// Platform backed by the hypervisor device files.
#[derive(Debug, Clone, Default)]
pub struct XenPlatform {
    config: PlatformConfig,
}

impl XenPlatform {
    /// Backend using the device paths in `config`.
    pub fn new(config: PlatformConfig) -> Self {
        Self { config }
    }

    /// Backend configured from the `[platform]` section of a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Config`](crate::ChannelError::Config) if the
    /// file cannot be loaded or fails validation.
    pub fn from_config_file(path: &Path) -> ChannelResult<Self> {
        let config = ChannelConfig::load(path)?;
        config.validate()?;
        tracing::info!(
            service = %config.shared.service_name,
            memory = ?config.platform.memory_device,
            "platform configuration loaded"
        );
        Ok(Self::new(config.platform))
    }

    /// Configuration in use.
    pub fn config(&self) -> &PlatformConfig {
        &self.config
    }
}

impl Platform for XenPlatform {
    type Control = XenControl;

    fn memory_device(&self) -> PathBuf {
        self.config.memory_device.clone()
    }

    fn open_memory(&self) -> io::Result<File> {
        OpenOptions::new()
            .read(true)
            .write(true)
            .open(&self.config.memory_device)
    }

    fn open_control(&self) -> io::Result<XenControl> {
        let privcmd = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&self.config.privcmd_device)?;
        tracing::debug!(device = ?self.config.privcmd_device, "opened hypervisor control interface");
        Ok(XenControl {
            privcmd,
            interface_version: self.config.dom0_interface_version,
        })
    }

    fn control_offset(&self) -> usize {
        self.config.control_offset
    }
}

/// Open handle on the privileged-command device.
#[derive(Debug)]
pub struct XenControl {
    privcmd: File,
    interface_version: u32,
}

impl XenControl {
    fn hypercall(&self, op: u64, block: &mut [u8]) -> io::Result<i32> {
        let mut call = PrivcmdHypercall {
            op,
            arg: [block.as_mut_ptr() as u64, 0, 0, 0, 0],
        };
        // SAFETY: `block` outlives the call and is sized for the operation;
        // the hypervisor only writes within it.
        let ret = unsafe { sys::privcmd_hypercall(self.privcmd.as_raw_fd(), &mut call) }
            .map_err(io::Error::from)?;
        if ret < 0 {
            return Err(io::Error::from_raw_os_error(-ret));
        }
        Ok(ret)
    }

    fn event_channel_op(&self, cmd: u32, args: &[u8]) -> io::Result<[u8; EVTCHN_OP_SIZE]> {
        let mut block = [0u8; EVTCHN_OP_SIZE];
        block[0..4].copy_from_slice(&cmd.to_le_bytes());
        block[4..4 + args.len()].copy_from_slice(args);
        self.hypercall(HYPERVISOR_EVENT_CHANNEL_OP, &mut block)?;
        Ok(block)
    }
}

fn domid(domain: DomainId) -> io::Result<u16> {
    u16::try_from(domain)
        .ok()
        .filter(|&d| d < DOMID_SELF)
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("domain id {domain} out of range"),
            )
        })
}

fn u32_at(block: &[u8], offset: usize) -> u32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&block[offset..offset + 4]);
    u32::from_le_bytes(raw)
}

impl DomainControl for XenControl {
    fn bind_interdomain(&mut self, remote: DomainId) -> io::Result<ChannelPorts> {
        // dom1 u16, dom2 u16, port1 u32 (out), port2 u32 (out)
        let mut args = [0u8; 12];
        args[0..2].copy_from_slice(&DOMID_SELF.to_le_bytes());
        args[2..4].copy_from_slice(&domid(remote)?.to_le_bytes());

        let block = self.event_channel_op(EVTCHNOP_BIND_INTERDOMAIN, &args)?;
        Ok(ChannelPorts {
            local: u32_at(&block, 8),
            remote: u32_at(&block, 12),
        })
    }

    fn close_channel(&mut self, local_port: u32) -> io::Result<()> {
        // dom u16, pad u16, port u32
        let mut args = [0u8; 8];
        args[0..2].copy_from_slice(&DOMID_SELF.to_le_bytes());
        args[4..8].copy_from_slice(&local_port.to_le_bytes());
        self.event_channel_op(EVTCHNOP_CLOSE, &args).map(drop)
    }

    fn notify(&self, local_port: u32) -> io::Result<()> {
        self.event_channel_op(EVTCHNOP_SEND, &local_port.to_le_bytes())
            .map(drop)
    }

    fn domain_info(&self, domain: DomainId) -> io::Result<DomainInfo> {
        let mut block = [0u8; DOM0_OP_SIZE];
        block[0..4].copy_from_slice(&DOM0_GETDOMAININFO.to_le_bytes());
        block[4..8].copy_from_slice(&self.interface_version.to_le_bytes());

        let union = 8;
        block[union + GDI_DOMAIN..union + GDI_DOMAIN + 2]
            .copy_from_slice(&domid(domain)?.to_le_bytes());

        self.hypercall(HYPERVISOR_DOM0_OP, &mut block)?;

        let reported = u16::from_le_bytes([block[union + GDI_DOMAIN], block[union + GDI_DOMAIN + 1]]);
        let mut frame = [0u8; 8];
        frame.copy_from_slice(
            &block[union + GDI_SHARED_INFO_FRAME..union + GDI_SHARED_INFO_FRAME + 8],
        );

        Ok(DomainInfo {
            domid: DomainId::from(reported),
            shared_info_frame: u64::from_le_bytes(frame),
        })
    }
}

impl Drop for XenControl {
    fn drop(&mut self) {
        tracing::debug!("closing hypervisor control interface");
    }
}
