//! Property tests for the control message payload bound.

use proptest::prelude::*;
use xenctl_common::ctrl::consts::SLOT_SIZE;
use xenctl_common::ctrl::{Message, PayloadTooLarge};

proptest! {
    /// Appending chunks until the bound is reached always succeeds, and the
    /// next non-empty append fails without touching the payload.
    #[test]
    fn append_fills_to_exact_bound(chunks in prop::collection::vec(1usize..=16, 1..32)) {
        let mut msg = Message::new(1, 2, 3);
        let mut expected = Vec::new();

        for (i, size) in chunks.into_iter().enumerate() {
            let room = Message::MAX_PAYLOAD - msg.len();
            let take = size.min(room);
            let chunk = vec![i as u8; take];
            prop_assert!(msg.append_payload(&chunk).is_ok());
            expected.extend_from_slice(&chunk);
        }

        let room = Message::MAX_PAYLOAD - msg.len();
        if room > 0 {
            prop_assert!(msg.append_payload(&vec![0xEE; room]).is_ok());
            expected.extend(std::iter::repeat_n(0xEE, room));
        }
        prop_assert_eq!(msg.len(), Message::MAX_PAYLOAD);

        let err = msg.append_payload(b"!");
        prop_assert_eq!(err, Err(PayloadTooLarge { current: Message::MAX_PAYLOAD, requested: 1 }));
        prop_assert_eq!(msg.payload(), &expected[..]);
    }

    /// Any slot image decodes to a message within the payload bound.
    #[test]
    fn decode_never_exceeds_bound(bytes in prop::collection::vec(any::<u8>(), SLOT_SIZE)) {
        let mut slot = [0u8; SLOT_SIZE];
        slot.copy_from_slice(&bytes);
        let msg = Message::decode(&slot);
        prop_assert!(msg.len() <= Message::MAX_PAYLOAD);
        prop_assert_eq!(msg.header().ty, bytes[0]);
    }
}
