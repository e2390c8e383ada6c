//! Accessor for a mapped control interface.
//!
//! [`ControlInterface`] owns the mapping of a domain's shared info page and
//! reads or writes the control interface inside it through explicit byte
//! offsets (see [`xenctl_common::ctrl::consts`]). Both ends of the protocol are
//! built on it.
//!
//! ## Memory ordering
//!
//! The page is written concurrently by the remote domain. A producer copies
//! the slot first and then publishes its index with release ordering; a
//! consumer loads the peer's index with acquire ordering before copying a
//! slot out. That pairing is what guarantees a consumer that observes an
//! advanced index also observes the complete slot.

use std::io;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU32, Ordering};

use memmap2::MmapMut;
use xenctl_common::ctrl::Message;
use xenctl_common::ctrl::consts::{CONTROL_IF_SIZE, ProducerIndex, Ring, SLOT_SIZE};

/// Mapped control interface of one domain.
pub struct ControlInterface {
    base: NonNull<u8>,
    // Keeps `base` valid; unmapped on drop.
    _map: MmapMut,
}

// SAFETY: `base` points into `map`, which moves with the value. The mapping
// itself is process-wide and not tied to the creating thread.
unsafe impl Send for ControlInterface {}

impl ControlInterface {
    /// Wrap a mapping whose control interface starts at `offset`.
    ///
    /// # Errors
    ///
    /// Returns an `InvalidInput` error if the interface does not fit in the
    /// mapping or `offset` is not 4-byte aligned.
    pub fn new(mut map: MmapMut, offset: usize) -> io::Result<Self> {
        let fits = offset
            .checked_add(CONTROL_IF_SIZE)
            .is_some_and(|end| end <= map.len());
        if offset % 4 != 0 || !fits {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "control interface at offset {offset} does not fit a {} byte mapping",
                    map.len()
                ),
            ));
        }

        // SAFETY: bounds checked above.
        let base = unsafe { map.as_mut_ptr().add(offset) };
        let base = NonNull::new(base)
            .ok_or_else(|| io::Error::other("null control interface mapping"))?;

        Ok(Self { base, _map: map })
    }

    #[inline]
    fn producer(&self, idx: ProducerIndex) -> &AtomicU32 {
        // SAFETY: the index lies inside the mapping, is 4-byte aligned (page
        // aligned mapping, aligned offset, aligned field) and only ever
        // accessed atomically.
        unsafe { &*(self.base.as_ptr().add(idx.offset()) as *const AtomicU32) }
    }

    /// Load a producer index published by the peer (acquire).
    #[inline]
    pub fn load_producer(&self, idx: ProducerIndex) -> u32 {
        u32::from_le(self.producer(idx).load(Ordering::Acquire))
    }

    /// Publish a producer index this side owns (release).
    #[inline]
    pub fn publish_producer(&self, idx: ProducerIndex, value: u32) {
        self.producer(idx).store(value.to_le(), Ordering::Release);
    }

    /// Copy the slot addressed by `cursor` out of `ring`.
    pub fn read_slot(&self, ring: Ring, cursor: u32) -> Message {
        let mut raw = [0u8; SLOT_SIZE];
        // SAFETY: slot offsets are bounded by CONTROL_IF_SIZE, checked in new().
        unsafe {
            std::ptr::copy_nonoverlapping(
                self.base.as_ptr().add(ring.slot_offset(cursor)),
                raw.as_mut_ptr(),
                SLOT_SIZE,
            );
        }
        Message::decode(&raw)
    }

    /// Copy `msg` into the slot addressed by `cursor` in `ring`.
    pub fn write_slot(&self, ring: Ring, cursor: u32, msg: &Message) {
        let mut raw = [0u8; SLOT_SIZE];
        msg.encode(&mut raw);
        // SAFETY: as in read_slot; the slot is owned by this side until the
        // matching producer index is published.
        unsafe {
            std::ptr::copy_nonoverlapping(
                raw.as_ptr(),
                self.base.as_ptr().add(ring.slot_offset(cursor)),
                SLOT_SIZE,
            );
        }
    }
}
