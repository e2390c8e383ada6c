//! Control messages.
//!
//! A [`Message`] is a fixed-capacity value: a three byte header plus a
//! payload of at most [`MAX_PAYLOAD`] bytes. It is `Copy`, so handing one to a
//! ring writes an independent copy and later mutation of the original has no
//! effect on what the peer sees.

use std::fmt;

use thiserror::Error;

use super::consts::{
    MAX_PAYLOAD, SLOT_ID, SLOT_LENGTH, SLOT_PAYLOAD, SLOT_SIZE, SLOT_SUBTYPE, SLOT_TYPE,
};

/// Appending would take the payload past [`Message::MAX_PAYLOAD`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("out of space in control message: {current} + {requested} > {max} bytes", max = MAX_PAYLOAD)]
pub struct PayloadTooLarge {
    /// Payload length before the rejected append.
    pub current: usize,
    /// Length of the rejected append.
    pub requested: usize,
}

/// The three header fields of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MessageHeader {
    /// Message type, echoed in the response.
    pub ty: u8,
    /// Message subtype, echoed in the response.
    pub subtype: u8,
    /// Request identifier, echoed in the response.
    pub id: u8,
}

/// A control message as carried in one ring slot.
#[derive(Clone, Copy)]
pub struct Message {
    header: MessageHeader,
    length: u8,
    payload: [u8; MAX_PAYLOAD],
}

impl Message {
    /// Capacity of the payload area.
    pub const MAX_PAYLOAD: usize = MAX_PAYLOAD;

    /// Create a message with the given header and an empty payload.
    pub const fn new(ty: u8, subtype: u8, id: u8) -> Self {
        Self {
            header: MessageHeader { ty, subtype, id },
            length: 0,
            payload: [0u8; MAX_PAYLOAD],
        }
    }

    /// Overwrite any subset of the header fields.
    ///
    /// `None` leaves the corresponding field unchanged.
    pub fn set_header(&mut self, ty: Option<u8>, subtype: Option<u8>, id: Option<u8>) {
        if let Some(ty) = ty {
            self.header.ty = ty;
        }
        if let Some(subtype) = subtype {
            self.header.subtype = subtype;
        }
        if let Some(id) = id {
            self.header.id = id;
        }
    }

    /// Current header fields.
    #[inline]
    pub const fn header(&self) -> MessageHeader {
        self.header
    }

    /// Append `bytes` to the payload.
    ///
    /// # Errors
    ///
    /// Returns [`PayloadTooLarge`] if the result would exceed
    /// [`Self::MAX_PAYLOAD`]; the message is left unchanged.
    pub fn append_payload(&mut self, bytes: &[u8]) -> Result<(), PayloadTooLarge> {
        let current = self.len();
        if current + bytes.len() > MAX_PAYLOAD {
            return Err(PayloadTooLarge {
                current,
                requested: bytes.len(),
            });
        }
        self.payload[current..current + bytes.len()].copy_from_slice(bytes);
        self.length = (current + bytes.len()) as u8;
        Ok(())
    }

    /// Current payload bytes.
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload[..self.len()]
    }

    /// Current payload length.
    #[inline]
    pub const fn len(&self) -> usize {
        self.length as usize
    }

    /// Whether the payload is empty.
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Serialise into one ring slot.
    ///
    /// Bytes of the payload area beyond the current length are written as
    /// well, so the whole slot is overwritten.
    pub fn encode(&self, slot: &mut [u8; SLOT_SIZE]) {
        slot[SLOT_TYPE] = self.header.ty;
        slot[SLOT_SUBTYPE] = self.header.subtype;
        slot[SLOT_ID] = self.header.id;
        slot[SLOT_LENGTH] = self.length;
        slot[SLOT_PAYLOAD..].copy_from_slice(&self.payload);
    }

    /// Deserialise one ring slot.
    ///
    /// The peer is not trusted with the length byte: a value above
    /// [`Self::MAX_PAYLOAD`] is clamped to it rather than rejected.
    pub fn decode(slot: &[u8; SLOT_SIZE]) -> Self {
        let mut length = slot[SLOT_LENGTH];
        if length as usize > MAX_PAYLOAD {
            tracing::warn!(
                length,
                max = MAX_PAYLOAD,
                "clamping oversized control message length"
            );
            length = MAX_PAYLOAD as u8;
        }

        let mut payload = [0u8; MAX_PAYLOAD];
        payload.copy_from_slice(&slot[SLOT_PAYLOAD..]);

        Self {
            header: MessageHeader {
                ty: slot[SLOT_TYPE],
                subtype: slot[SLOT_SUBTYPE],
                id: slot[SLOT_ID],
            },
            length,
            payload,
        }
    }
}

impl Default for Message {
    fn default() -> Self {
        Self::new(0, 0, 0)
    }
}

impl PartialEq for Message {
    fn eq(&self, other: &Self) -> bool {
        self.header == other.header && self.payload() == other.payload()
    }
}

impl Eq for Message {}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("ty", &self.header.ty)
            .field("subtype", &self.header.subtype)
            .field("id", &self.header.id)
            .field("payload", &self.payload())
            .finish()
    }
}
