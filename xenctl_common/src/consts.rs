//! Platform constants.
//!
//! Single source of truth for page geometry and the default device paths the
//! control tools open. Configuration may override the paths; the geometry is
//! fixed by the hypervisor.

/// Domain identifier as understood by the hypervisor.
pub type DomainId = u64;

/// Domain identifier that refers to the calling domain.
pub const DOMID_SELF: u16 = 0x7FF0;

/// Size of a machine page frame in bytes.
pub const PAGE_SIZE: usize = 4096;

/// Byte offset of the control interface inside the shared info page.
///
/// The first half of the page belongs to other fixed hypervisor structures.
pub const CONTROL_IF_OFFSET: usize = 2048;

/// Event-channel notification device.
pub const DEFAULT_EVTCHN_DEVICE: &str = "/dev/xen/evtchn";

/// Hypervisor privileged-command device.
pub const DEFAULT_PRIVCMD_DEVICE: &str = "/proc/xen/privcmd";

/// Machine memory device used to map foreign frames.
pub const DEFAULT_MEMORY_DEVICE: &str = "/dev/mem";

/// Interface version stamped into every dom0 operation.
pub const DEFAULT_DOM0_INTERFACE_VERSION: u32 = 0xAAAA_1001;
