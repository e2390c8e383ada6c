//! Domain control interface.
//!
//! This module contains:
//! - `consts`: Ring geometry and the byte offsets of every field in the
//!   shared control interface.
//! - `message`: The [`Message`] value type and its slot encoding.

pub mod consts;
pub mod message;

pub use message::{Message, MessageHeader, PayloadTooLarge};
