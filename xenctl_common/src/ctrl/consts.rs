//! Control interface layout.
//!
//! The control interface is a packed, little-endian structure placed at
//! [`CONTROL_IF_OFFSET`](crate::consts::CONTROL_IF_OFFSET) inside a domain's
//! shared info page:
//!
//! ```text
//! offset  size  field
//!      0   512  tx_ring[RING_SIZE]   domain -> controller requests,
//!                                    controller -> domain responses
//!    512   512  rx_ring[RING_SIZE]   controller -> domain requests,
//!                                    domain -> controller responses
//!   1024     4  tx_req_prod          written by the domain
//!   1028     4  tx_resp_prod         written by the controller
//!   1032     4  rx_req_prod          written by the controller
//!   1036     4  rx_resp_prod         written by the domain
//! ```
//!
//! Each slot is 64 bytes:
//!
//! ```text
//! offset  size  field
//!      0     1  type
//!      1     1  subtype
//!      2     1  id
//!      3     1  length
//!      4    60  payload
//! ```

use static_assertions::const_assert;
use static_assertions::const_assert_eq;

/// Slots per physical ring. Must be a power of two.
pub const RING_SIZE: u32 = 8;

/// Size of one ring slot in bytes.
pub const SLOT_SIZE: usize = 64;

/// Offset of the message type within a slot.
pub const SLOT_TYPE: usize = 0;
/// Offset of the message subtype within a slot.
pub const SLOT_SUBTYPE: usize = 1;
/// Offset of the message id within a slot.
pub const SLOT_ID: usize = 2;
/// Offset of the payload length within a slot.
pub const SLOT_LENGTH: usize = 3;
/// Offset of the payload area within a slot.
pub const SLOT_PAYLOAD: usize = 4;

/// Capacity of the payload area of one slot.
pub const MAX_PAYLOAD: usize = SLOT_SIZE - SLOT_PAYLOAD;

/// Size of one physical ring in bytes.
pub const RING_BYTES: usize = RING_SIZE as usize * SLOT_SIZE;

/// Offset of `tx_ring` within the control interface.
pub const TX_RING_OFFSET: usize = 0;
/// Offset of `rx_ring` within the control interface.
pub const RX_RING_OFFSET: usize = TX_RING_OFFSET + RING_BYTES;

/// Offset of `tx_req_prod` (domain-owned).
pub const TX_REQ_PROD_OFFSET: usize = RX_RING_OFFSET + RING_BYTES;
/// Offset of `tx_resp_prod` (controller-owned).
pub const TX_RESP_PROD_OFFSET: usize = TX_REQ_PROD_OFFSET + 4;
/// Offset of `rx_req_prod` (controller-owned).
pub const RX_REQ_PROD_OFFSET: usize = TX_RESP_PROD_OFFSET + 4;
/// Offset of `rx_resp_prod` (domain-owned).
pub const RX_RESP_PROD_OFFSET: usize = RX_REQ_PROD_OFFSET + 4;

/// Total size of the control interface.
pub const CONTROL_IF_SIZE: usize = RX_RESP_PROD_OFFSET + 4;

const_assert!(RING_SIZE.is_power_of_two());
const_assert_eq!(MAX_PAYLOAD, 60);
const_assert_eq!(RX_RING_OFFSET, 512);
const_assert_eq!(TX_REQ_PROD_OFFSET, 1024);
const_assert_eq!(CONTROL_IF_SIZE, 1040);
const_assert!(MAX_PAYLOAD <= u8::MAX as usize);

/// Which physical ring a slot belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ring {
    /// Requests from the domain, responses from the controller.
    Tx,
    /// Requests from the controller, responses from the domain.
    Rx,
}

impl Ring {
    /// Byte offset of this ring within the control interface.
    #[inline]
    pub const fn offset(self) -> usize {
        match self {
            Self::Tx => TX_RING_OFFSET,
            Self::Rx => RX_RING_OFFSET,
        }
    }

    /// Byte offset of the slot addressed by a free-running `cursor`.
    #[inline]
    pub const fn slot_offset(self, cursor: u32) -> usize {
        self.offset() + mask_idx(cursor) as usize * SLOT_SIZE
    }
}

/// One of the four shared producer indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProducerIndex {
    /// Requests on `tx_ring`; written by the domain.
    TxReq,
    /// Responses on `tx_ring`; written by the controller.
    TxResp,
    /// Requests on `rx_ring`; written by the controller.
    RxReq,
    /// Responses on `rx_ring`; written by the domain.
    RxResp,
}

impl ProducerIndex {
    /// Byte offset of this index within the control interface.
    #[inline]
    pub const fn offset(self) -> usize {
        match self {
            Self::TxReq => TX_REQ_PROD_OFFSET,
            Self::TxResp => TX_RESP_PROD_OFFSET,
            Self::RxReq => RX_REQ_PROD_OFFSET,
            Self::RxResp => RX_RESP_PROD_OFFSET,
        }
    }
}

/// Reduce a free-running cursor to a slot index.
#[inline]
pub const fn mask_idx(cursor: u32) -> u32 {
    cursor & (RING_SIZE - 1)
}
