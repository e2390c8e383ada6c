//! Resource release tests for control port construction and drop.

use xenctl_channel::platform::loopback::FailPoint;
use xenctl_channel::platform::{LoopbackPlatform, XenPlatform};
use xenctl_channel::{ChannelError, ControlPort};
use xenctl_common::config::PlatformConfig;
use xenctl_common::consts::CONTROL_IF_OFFSET;

fn platform_with(domain: u64) -> LoopbackPlatform {
    let platform = LoopbackPlatform::new(CONTROL_IF_OFFSET).unwrap();
    platform.add_domain(domain).unwrap();
    platform
}

fn assert_released(platform: &LoopbackPlatform) {
    assert_eq!(platform.open_controls(), 0, "control interface left open");
    assert_eq!(platform.bound_channels(), 0, "event channel left bound");
}

#[test]
fn drop_releases_everything() {
    let platform = platform_with(3);
    let port = ControlPort::open_with(&platform, 3).unwrap();
    assert_eq!(platform.open_controls(), 1);
    assert_eq!(platform.bound_channels(), 1);

    drop(port);
    assert_released(&platform);
}

#[test]
fn memory_device_failure() {
    let platform = platform_with(3);
    platform.fail_next(FailPoint::OpenMemory);

    let err = ControlPort::open_with(&platform, 3).unwrap_err();
    assert!(matches!(err, ChannelError::MemoryDeviceOpen { .. }), "{err}");
    assert_released(&platform);
}

#[test]
fn control_interface_failure() {
    let platform = platform_with(3);
    platform.fail_next(FailPoint::OpenControl);

    let err = ControlPort::open_with(&platform, 3).unwrap_err();
    assert!(matches!(err, ChannelError::ControlInterfaceOpen { .. }), "{err}");
    assert_released(&platform);
}

#[test]
fn bind_failure_closes_control_interface() {
    let platform = platform_with(3);
    platform.fail_next(FailPoint::BindChannel);

    let err = ControlPort::open_with(&platform, 3).unwrap_err();
    assert!(
        matches!(err, ChannelError::EventChannelOpen { domain: 3, .. }),
        "{err}"
    );
    assert_released(&platform);
}

#[test]
fn unknown_domain_cannot_bind() {
    let platform = platform_with(3);

    let err = ControlPort::open_with(&platform, 4).unwrap_err();
    assert!(matches!(err, ChannelError::EventChannelOpen { domain: 4, .. }));
    assert_eq!(err.raw_os_error(), Some(libc::ESRCH));
    assert_released(&platform);
}

#[test]
fn lookup_failure_closes_channel() {
    let platform = platform_with(3);
    platform.fail_next(FailPoint::DomainInfo);

    let err = ControlPort::open_with(&platform, 3).unwrap_err();
    assert!(
        matches!(err, ChannelError::DomainLookup { domain: 3, .. }),
        "{err}"
    );
    assert_released(&platform);
}

#[test]
fn mismatched_domain_closes_channel() {
    let platform = platform_with(3);
    platform.fail_next(FailPoint::DomainMismatch);

    let err = ControlPort::open_with(&platform, 3).unwrap_err();
    assert!(
        matches!(
            err,
            ChannelError::DomainMismatch {
                expected: 3,
                actual: 4
            }
        ),
        "{err}"
    );
    assert_released(&platform);
}

#[test]
fn map_failure_closes_channel() {
    let platform = platform_with(3);
    platform.fail_next(FailPoint::MapPage);

    let err = ControlPort::open_with(&platform, 3).unwrap_err();
    assert!(
        matches!(err, ChannelError::MapFailed { domain: 3, frame: 0, .. }),
        "{err}"
    );
    assert_released(&platform);
}

#[test]
fn control_offset_outside_page_is_a_map_failure() {
    for offset in [3500, usize::MAX - 1035] {
        let platform = LoopbackPlatform::new(offset).unwrap();
        platform.add_domain(3).unwrap();

        let err = ControlPort::open_with(&platform, 3).unwrap_err();
        assert!(
            matches!(err, ChannelError::MapFailed { domain: 3, frame: 0, .. }),
            "{err}"
        );
        assert!(matches!(
            platform.attach_peer(3),
            Err(ChannelError::MapFailed { domain: 3, .. })
        ));
        assert_released(&platform);
    }
}

#[test]
fn failed_open_can_be_retried() {
    let platform = platform_with(3);
    platform.fail_next(FailPoint::DomainInfo);
    assert!(ControlPort::open_with(&platform, 3).is_err());

    let port = ControlPort::open_with(&platform, 3).unwrap();
    assert_eq!(port.remote_domain(), 3);
    assert_eq!(platform.bound_channels(), 1);
}

#[test]
fn failed_notify_is_tolerated() {
    let platform = platform_with(3);
    let port = ControlPort::open_with(&platform, 3).unwrap();

    platform.fail_next(FailPoint::Notify);
    port.notify();
    assert!(platform.take_notifications().is_empty());

    port.notify();
    assert_eq!(platform.take_notifications(), vec![port.local_port()]);
}

#[test]
fn missing_memory_device_is_reported_with_path() {
    let platform = XenPlatform::new(PlatformConfig {
        memory_device: "/nonexistent/mem".into(),
        ..PlatformConfig::default()
    });

    match ControlPort::open_with(&platform, 1) {
        Err(ChannelError::MemoryDeviceOpen { path, source }) => {
            assert_eq!(path, std::path::Path::new("/nonexistent/mem"));
            assert_eq!(source.kind(), std::io::ErrorKind::NotFound);
        }
        other => panic!("unexpected result: {other:?}"),
    }
}
