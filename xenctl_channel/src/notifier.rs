//! Event-channel notification device.
//!
//! The device is opened non-blocking. Callers wait for readiness on
//! [`EventNotifier::as_raw_fd`] with their own poll loop and then drain
//! wake-ups with [`EventNotifier::read`] until it returns `Ok(None)`.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, RawFd};
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;

use xenctl_common::config::PlatformConfig;
use xenctl_common::evtchn::{EventKind, RECORD_SIZE, Wakeup};

use crate::error::{ChannelError, ChannelResult};

mod sys {
    nix::ioctl_none!(evtchn_reset, b'E', 1);
}

/// Non-blocking handle on the event-channel device.
#[derive(Debug)]
pub struct EventNotifier {
    device: File,
}

impl EventNotifier {
    /// Open the default event-channel device.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::NotifierOpen`] if the device cannot be opened.
    pub fn open() -> ChannelResult<Self> {
        Self::open_with(&PlatformConfig::default())
    }

    /// Open the event-channel device named in `config`.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::NotifierOpen`] if the device cannot be opened.
    pub fn open_with(config: &PlatformConfig) -> ChannelResult<Self> {
        Self::open_path(&config.evtchn_device)
    }

    /// Open the device at `path` read/write and non-blocking.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::NotifierOpen`] if the device cannot be opened.
    pub fn open_path(path: impl AsRef<Path>) -> ChannelResult<Self> {
        let path = path.as_ref();
        let device = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(path)
            .map_err(|source| ChannelError::NotifierOpen {
                path: path.to_path_buf(),
                source,
            })?;
        tracing::debug!(device = ?path, "event-channel device opened");
        Ok(Self { device })
    }

    /// Wrap an already open, non-blocking handle.
    pub fn from_file(device: File) -> Self {
        Self { device }
    }

    /// Take the next pending wake-up.
    ///
    /// Returns `Ok(None)` when nothing is pending. Interrupted reads are
    /// retried.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Io`] for any other device error.
    pub fn read(&mut self) -> ChannelResult<Option<Wakeup>> {
        let mut raw = [0u8; RECORD_SIZE];
        loop {
            match self.device.read(&mut raw) {
                Ok(RECORD_SIZE) => return Ok(Some(Wakeup::from_le_bytes(raw))),
                Ok(n) => {
                    tracing::trace!(bytes = n, "short read from event-channel device");
                    return Ok(None);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(None),
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Acknowledge a wake-up so the device re-arms the port.
    ///
    /// Failures are logged and otherwise ignored.
    pub fn acknowledge(&mut self, port: u16, kind: EventKind) {
        let record = Wakeup::new(port, kind).to_le_bytes();
        if let Err(e) = self.device.write_all(&record) {
            tracing::warn!(port, ?kind, error = %e, "failed to acknowledge wake-up");
        }
    }

    /// Clear pending notifications and error state on the device.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Io`] if the device rejects the request.
    pub fn reset(&self) -> ChannelResult<()> {
        // SAFETY: the request takes no argument.
        unsafe { sys::evtchn_reset(self.device.as_raw_fd()) }.map_err(io::Error::from)?;
        tracing::debug!("event-channel device reset");
        Ok(())
    }
}

impl AsRawFd for EventNotifier {
    fn as_raw_fd(&self) -> RawFd {
        self.device.as_raw_fd()
    }
}

impl AsFd for EventNotifier {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.device.as_fd()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::fd::OwnedFd;
    use std::os::unix::net::UnixDatagram;

    fn pair() -> (EventNotifier, UnixDatagram) {
        let (ours, theirs) = UnixDatagram::pair().unwrap();
        ours.set_nonblocking(true).unwrap();
        let file = File::from(OwnedFd::from(ours));
        (EventNotifier::from_file(file), theirs)
    }

    #[test]
    fn test_read_decodes_records() {
        let (mut notifier, device) = pair();
        device.send(&0x8007u16.to_le_bytes()).unwrap();
        device.send(&0x0003u16.to_le_bytes()).unwrap();

        assert_eq!(
            notifier.read().unwrap(),
            Some(Wakeup::new(7, EventKind::Disconnect))
        );
        assert_eq!(
            notifier.read().unwrap(),
            Some(Wakeup::new(3, EventKind::Normal))
        );
        assert_eq!(notifier.read().unwrap(), None);
    }

    #[test]
    fn test_short_read_is_nothing_pending() {
        let (mut notifier, device) = pair();
        device.send(&[0x07]).unwrap();
        assert_eq!(notifier.read().unwrap(), None);
    }

    #[test]
    fn test_acknowledge_writes_record() {
        let (mut notifier, device) = pair();
        notifier.acknowledge(5, EventKind::Disconnect);

        let mut buf = [0u8; 4];
        let n = device.recv(&mut buf).unwrap();
        assert_eq!(&buf[..n], &[0x05, 0x80]);
    }

    #[test]
    fn test_missing_device() {
        let err = EventNotifier::open_path("/nonexistent/evtchn").unwrap_err();
        assert!(matches!(err, ChannelError::NotifierOpen { .. }));
        assert_eq!(err.raw_os_error(), Some(libc::ENOENT));
    }

    #[test]
    fn test_device_error_carries_os_code() {
        let mut notifier = EventNotifier::from_file(File::open("/").unwrap());
        let err = notifier.read().unwrap_err();
        assert!(matches!(err, ChannelError::Io { .. }), "{err}");
        assert_eq!(err.raw_os_error(), Some(libc::EISDIR));
    }

    #[test]
    fn test_reset_rejected_by_non_device() {
        let (notifier, _device) = pair();
        assert!(notifier.reset().is_err());
    }
}
