//! Event-channel wake-up records.
//!
//! The event-channel device delivers one little-endian `u16` per pending
//! notification. Bits 0..=14 carry the port index and bit 15 marks a
//! disconnect. Acknowledging a notification writes the same encoding back.

/// Mask that strips the event kind from a record, leaving the port index.
pub const PORTIDX_MASK: u16 = 0x7FFF;

/// Size of one wake-up record on the device.
pub const RECORD_SIZE: usize = 2;

/// Kind of notification carried by a wake-up record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum EventKind {
    /// A standard event notification.
    Normal = 0x0000,
    /// A port-disconnect notification.
    Disconnect = 0x8000,
}

impl EventKind {
    /// Raw bits of a normal notification.
    pub const NORMAL: u16 = Self::Normal as u16;
    /// Raw bits of a disconnect notification.
    pub const DISCONNECT: u16 = Self::Disconnect as u16;

    /// Extract the kind from a raw record.
    #[inline]
    pub const fn from_bits(value: u16) -> Self {
        if value & !PORTIDX_MASK == 0 {
            Self::Normal
        } else {
            Self::Disconnect
        }
    }

    /// Raw bits of this kind.
    #[inline]
    pub const fn bits(self) -> u16 {
        self as u16
    }
}

/// A decoded `(port, kind)` notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Wakeup {
    /// Local event-channel port index.
    pub port: u16,
    /// Notification kind.
    pub kind: EventKind,
}

impl Wakeup {
    /// Build a wake-up; the port is truncated to 15 bits.
    #[inline]
    pub const fn new(port: u16, kind: EventKind) -> Self {
        Self {
            port: port & PORTIDX_MASK,
            kind,
        }
    }

    /// Decode a raw record value.
    #[inline]
    pub const fn decode(value: u16) -> Self {
        Self {
            port: value & PORTIDX_MASK,
            kind: EventKind::from_bits(value),
        }
    }

    /// Raw record value.
    #[inline]
    pub const fn encode(self) -> u16 {
        (self.port & PORTIDX_MASK) | self.kind.bits()
    }

    /// Decode a record as read from the device.
    #[inline]
    pub const fn from_le_bytes(bytes: [u8; RECORD_SIZE]) -> Self {
        Self::decode(u16::from_le_bytes(bytes))
    }

    /// Encode a record for writing to the device.
    #[inline]
    pub const fn to_le_bytes(self) -> [u8; RECORD_SIZE] {
        self.encode().to_le_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_disconnect() {
        let w = Wakeup::decode(0x8007);
        assert_eq!(w.port, 7);
        assert_eq!(w.kind, EventKind::Disconnect);
    }

    #[test]
    fn test_decode_normal() {
        let w = Wakeup::decode(0x0007);
        assert_eq!(w.port, 7);
        assert_eq!(w.kind, EventKind::Normal);
    }

    #[test]
    fn test_kind_constants() {
        assert_eq!(EventKind::NORMAL, 0x0000);
        assert_eq!(EventKind::DISCONNECT, 0x8000);
    }

    #[test]
    fn test_encode_matches_device_format() {
        let w = Wakeup::new(0x1234, EventKind::Disconnect);
        assert_eq!(w.encode(), 0x9234);
        assert_eq!(w.to_le_bytes(), [0x34, 0x92]);
        assert_eq!(Wakeup::from_le_bytes([0x34, 0x92]), w);
    }

    #[test]
    fn test_port_truncated_to_fifteen_bits() {
        let w = Wakeup::new(0xFFFF, EventKind::Normal);
        assert_eq!(w.port, PORTIDX_MASK);
        assert_eq!(w.encode(), 0x7FFF);
    }
}
