//! In-process platform.
//!
//! [`LoopbackPlatform`] stands in for the hypervisor. Machine memory is a
//! temporary file holding one page per registered domain, so a
//! [`ControlPort`](crate::ControlPort) maps it exactly as it would map the
//! real memory device, and [`LoopbackPlatform::attach_peer`] maps the same
//! page a second time to act as the domain's end of the protocol.
//!
//! The platform keeps a ledger of open control handles, bound channels and
//! sent notifications, and can be told to fail any single step of port
//! construction. Both make resource release observable in tests.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use memmap2::MmapOptions;
use parking_lot::Mutex;
use tempfile::NamedTempFile;
use xenctl_common::consts::{DomainId, PAGE_SIZE};

use super::{ChannelPorts, DomainControl, DomainInfo, Platform};
use crate::error::{ChannelError, ChannelResult};
use crate::interface::ControlInterface;
use crate::peer::PeerPort;

/// Step at which the next port construction should fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailPoint {
    /// Opening the memory device.
    OpenMemory,
    /// Opening the control interface.
    OpenControl,
    /// Binding the event channel.
    BindChannel,
    /// Querying the domain.
    DomainInfo,
    /// Answering the domain query for a different domain.
    DomainMismatch,
    /// Mapping the control page.
    MapPage,
    /// Sending notifications.
    Notify,
}

#[derive(Debug, Default)]
struct Ledger {
    domains: BTreeMap<DomainId, u64>,
    channels: BTreeMap<u32, (DomainId, u32)>,
    notifications: Vec<u32>,
    open_controls: usize,
    next_port: u32,
    fail: Option<FailPoint>,
}

#[derive(Debug)]
struct Shared {
    memory: NamedTempFile,
    control_offset: usize,
    ledger: Mutex<Ledger>,
}

/// Hypervisor stand-in backed by a temporary file.
#[derive(Debug, Clone)]
pub struct LoopbackPlatform {
    shared: Arc<Shared>,
}

impl LoopbackPlatform {
    /// Create a platform with no domains.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Io`] if the backing file cannot be created.
    pub fn new(control_offset: usize) -> ChannelResult<Self> {
        let memory = NamedTempFile::new()?;
        Ok(Self {
            shared: Arc::new(Shared {
                memory,
                control_offset,
                ledger: Mutex::new(Ledger {
                    next_port: 1,
                    ..Ledger::default()
                }),
            }),
        })
    }

    /// Register `domain` with a fresh, zeroed shared info page and return the
    /// page's frame number.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Io`] if the backing file cannot be grown.
    pub fn add_domain(&self, domain: DomainId) -> ChannelResult<u64> {
        let mut ledger = self.shared.ledger.lock();
        if let Some(&frame) = ledger.domains.get(&domain) {
            return Ok(frame);
        }
        let frame = ledger.domains.len() as u64;
        self.shared
            .memory
            .as_file()
            .set_len((frame + 1) * PAGE_SIZE as u64)?;
        ledger.domains.insert(domain, frame);
        tracing::debug!(domain, frame, "loopback domain registered");
        Ok(frame)
    }

    /// Map `domain`'s control page a second time and return the domain's end
    /// of the protocol.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::DomainLookup`] for an unknown domain or
    /// [`ChannelError::MapFailed`] if the page cannot be mapped.
    pub fn attach_peer(&self, domain: DomainId) -> ChannelResult<PeerPort> {
        let frame = self
            .shared
            .ledger
            .lock()
            .domains
            .get(&domain)
            .copied()
            .ok_or_else(|| ChannelError::DomainLookup {
                domain,
                source: io::Error::from_raw_os_error(libc::ESRCH),
            })?;

        // SAFETY: the backing file lives as long as the platform and is
        // only resized by add_domain, which never shrinks it.
        let map = unsafe {
            MmapOptions::new()
                .offset(frame * PAGE_SIZE as u64)
                .len(PAGE_SIZE)
                .map_mut(self.shared.memory.as_file())
        }
        .map_err(|source| ChannelError::MapFailed {
            domain,
            frame,
            source,
        })?;

        let interface = ControlInterface::new(map, self.shared.control_offset).map_err(
            |source| ChannelError::MapFailed {
                domain,
                frame,
                source,
            },
        )?;
        Ok(PeerPort::new(interface))
    }

    /// Make the next matching step fail. Cleared once it fires.
    pub fn fail_next(&self, point: FailPoint) {
        self.shared.ledger.lock().fail = Some(point);
    }

    /// Local ports notified so far, in order; clears the record.
    pub fn take_notifications(&self) -> Vec<u32> {
        std::mem::take(&mut self.shared.ledger.lock().notifications)
    }

    /// Number of control interfaces currently open.
    pub fn open_controls(&self) -> usize {
        self.shared.ledger.lock().open_controls
    }

    /// Number of event channels currently bound.
    pub fn bound_channels(&self) -> usize {
        self.shared.ledger.lock().channels.len()
    }

    fn take_fail(&self, point: FailPoint) -> bool {
        let mut ledger = self.shared.ledger.lock();
        if ledger.fail == Some(point) {
            ledger.fail = None;
            return true;
        }
        false
    }
}

fn injected(point: FailPoint) -> io::Error {
    io::Error::other(format!("injected failure: {point:?}"))
}

impl Platform for LoopbackPlatform {
    type Control = LoopbackControl;

    fn memory_device(&self) -> PathBuf {
        self.shared.memory.path().to_path_buf()
    }

    fn open_memory(&self) -> io::Result<File> {
        if self.take_fail(FailPoint::OpenMemory) {
            return Err(injected(FailPoint::OpenMemory));
        }
        // A read-only handle makes the later shared writable mapping fail.
        let writable = !self.take_fail(FailPoint::MapPage);
        OpenOptions::new()
            .read(true)
            .write(writable)
            .open(self.shared.memory.path())
    }

    fn open_control(&self) -> io::Result<LoopbackControl> {
        if self.take_fail(FailPoint::OpenControl) {
            return Err(injected(FailPoint::OpenControl));
        }
        self.shared.ledger.lock().open_controls += 1;
        Ok(LoopbackControl {
            platform: self.clone(),
        })
    }

    fn control_offset(&self) -> usize {
        self.shared.control_offset
    }
}

/// Control interface handed out by [`LoopbackPlatform`].
#[derive(Debug)]
pub struct LoopbackControl {
    platform: LoopbackPlatform,
}

impl DomainControl for LoopbackControl {
    fn bind_interdomain(&mut self, remote: DomainId) -> io::Result<ChannelPorts> {
        if self.platform.take_fail(FailPoint::BindChannel) {
            return Err(injected(FailPoint::BindChannel));
        }
        let mut ledger = self.platform.shared.ledger.lock();
        if !ledger.domains.contains_key(&remote) {
            return Err(io::Error::from_raw_os_error(libc::ESRCH));
        }
        let local = ledger.next_port;
        let remote_port = local + 1;
        ledger.next_port += 2;
        ledger.channels.insert(local, (remote, remote_port));
        Ok(ChannelPorts {
            local,
            remote: remote_port,
        })
    }

    fn close_channel(&mut self, local_port: u32) -> io::Result<()> {
        self.platform
            .shared
            .ledger
            .lock()
            .channels
            .remove(&local_port)
            .map(drop)
            .ok_or_else(|| io::Error::from_raw_os_error(libc::EINVAL))
    }

    fn notify(&self, local_port: u32) -> io::Result<()> {
        if self.platform.take_fail(FailPoint::Notify) {
            return Err(injected(FailPoint::Notify));
        }
        let mut ledger = self.platform.shared.ledger.lock();
        if !ledger.channels.contains_key(&local_port) {
            return Err(io::Error::from_raw_os_error(libc::EINVAL));
        }
        ledger.notifications.push(local_port);
        Ok(())
    }

    fn domain_info(&self, domain: DomainId) -> io::Result<DomainInfo> {
        if self.platform.take_fail(FailPoint::DomainInfo) {
            return Err(injected(FailPoint::DomainInfo));
        }
        let misreport = self.platform.take_fail(FailPoint::DomainMismatch);
        let ledger = self.platform.shared.ledger.lock();
        let frame = ledger
            .domains
            .get(&domain)
            .copied()
            .ok_or_else(|| io::Error::from_raw_os_error(libc::ESRCH))?;
        Ok(DomainInfo {
            domid: if misreport { domain.wrapping_add(1) } else { domain },
            shared_info_frame: frame,
        })
    }
}

impl Drop for LoopbackControl {
    fn drop(&mut self) {
        self.platform.shared.ledger.lock().open_controls -= 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xenctl_common::consts::CONTROL_IF_OFFSET;

    #[test]
    fn test_domains_get_distinct_frames() {
        let platform = LoopbackPlatform::new(CONTROL_IF_OFFSET).unwrap();
        assert_eq!(platform.add_domain(5).unwrap(), 0);
        assert_eq!(platform.add_domain(9).unwrap(), 1);
        assert_eq!(platform.add_domain(5).unwrap(), 0);
    }

    #[test]
    fn test_control_ledger() {
        let platform = LoopbackPlatform::new(CONTROL_IF_OFFSET).unwrap();
        platform.add_domain(1).unwrap();

        let mut control = platform.open_control().unwrap();
        assert_eq!(platform.open_controls(), 1);

        let ports = control.bind_interdomain(1).unwrap();
        assert_eq!(platform.bound_channels(), 1);
        control.notify(ports.local).unwrap();
        assert_eq!(platform.take_notifications(), vec![ports.local]);
        assert!(platform.take_notifications().is_empty());

        control.close_channel(ports.local).unwrap();
        assert_eq!(platform.bound_channels(), 0);
        assert!(control.notify(ports.local).is_err());

        drop(control);
        assert_eq!(platform.open_controls(), 0);
    }

    #[test]
    fn test_unknown_domain() {
        let platform = LoopbackPlatform::new(CONTROL_IF_OFFSET).unwrap();
        let mut control = platform.open_control().unwrap();
        assert_eq!(
            control.bind_interdomain(3).unwrap_err().raw_os_error(),
            Some(libc::ESRCH)
        );
        assert!(control.domain_info(3).is_err());
        assert!(matches!(
            platform.attach_peer(3),
            Err(ChannelError::DomainLookup { domain: 3, .. })
        ));
    }

    #[test]
    fn test_fail_point_fires_once() {
        let platform = LoopbackPlatform::new(CONTROL_IF_OFFSET).unwrap();
        platform.fail_next(FailPoint::OpenControl);
        assert!(platform.open_control().is_err());
        assert!(platform.open_control().is_ok());
    }
}
