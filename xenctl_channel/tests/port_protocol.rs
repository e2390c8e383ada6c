//! Control port protocol tests.
//!
//! Both ends run in-process: the controller through a [`ControlPort`] on the
//! loopback platform, the domain through a [`PeerPort`] mapped onto the same
//! page of the loopback machine memory.

use std::fs::OpenOptions;
use std::os::unix::fs::FileExt;

use xenctl_channel::platform::loopback::LoopbackControl;
use xenctl_channel::platform::{LoopbackPlatform, Platform};
use xenctl_channel::{ControlPort, Message, NotReady, PeerPort};
use xenctl_common::consts::{CONTROL_IF_OFFSET, DomainId, PAGE_SIZE};
use xenctl_common::ctrl::consts::{MAX_PAYLOAD, ProducerIndex, RING_SIZE, Ring};

const DOMAIN: DomainId = 7;

struct Harness {
    platform: LoopbackPlatform,
    port: ControlPort<LoopbackControl>,
    domain: PeerPort,
    frame: u64,
}

fn harness() -> Harness {
    let platform = LoopbackPlatform::new(CONTROL_IF_OFFSET).unwrap();
    let frame = platform.add_domain(DOMAIN).unwrap();
    let port = ControlPort::open_with(&platform, DOMAIN).unwrap();
    let domain = platform.attach_peer(DOMAIN).unwrap();
    Harness {
        platform,
        port,
        domain,
        frame,
    }
}

fn message(ty: u8, subtype: u8, id: u8, payload: &[u8]) -> Message {
    let mut msg = Message::new(ty, subtype, id);
    msg.append_payload(payload).unwrap();
    msg
}

impl Harness {
    /// Write raw bytes into the control interface behind both ends' backs.
    fn poke(&self, offset: usize, bytes: &[u8]) {
        let memory = OpenOptions::new()
            .write(true)
            .open(self.platform.memory_device())
            .unwrap();
        let at = self.frame * PAGE_SIZE as u64 + (CONTROL_IF_OFFSET + offset) as u64;
        memory.write_all_at(bytes, at).unwrap();
    }
}

#[test]
fn ping_pong() {
    let mut h = harness();

    h.domain
        .write_request(&message(1, 2, 3, b"ping"))
        .unwrap();
    assert!(h.port.request_to_read());

    let request = h.port.read_request().unwrap();
    let header = request.header();
    assert_eq!((header.ty, header.subtype, header.id), (1, 2, 3));
    assert_eq!(request.payload(), b"ping");

    let mut reply = Message::default();
    reply.set_header(Some(header.ty), Some(header.subtype), Some(header.id));
    reply.append_payload(b"pong").unwrap();
    h.port.write_response(&reply).unwrap();
    h.port.notify();

    assert_eq!(h.platform.take_notifications(), vec![h.port.local_port()]);

    let response = h.domain.read_response().unwrap();
    assert_eq!(response, reply);
    assert_eq!(response.payload(), b"pong");
}

#[test]
fn controller_initiated_request() {
    let mut h = harness();

    h.port.write_request(&message(9, 0, 1, b"query")).unwrap();
    assert!(!h.port.response_to_read());

    let request = h.domain.read_request().unwrap();
    assert_eq!(request.payload(), b"query");
    h.domain
        .write_response(&message(9, 0, 1, b"answer"))
        .unwrap();

    assert!(h.port.response_to_read());
    assert_eq!(h.port.read_response().unwrap().payload(), b"answer");
    assert_eq!(h.port.read_response(), Err(NotReady::NoResponse));
}

#[test]
fn request_ring_back_pressure() {
    let mut h = harness();

    for id in 0..RING_SIZE as u8 {
        h.port.write_request(&message(2, 0, id, &[])).unwrap();
    }
    assert!(!h.port.space_to_write_request());
    assert_eq!(
        h.port.write_request(&message(2, 0, 99, &[])),
        Err(NotReady::NoRequestSpace)
    );

    // A slot frees only once its response has been consumed.
    assert_eq!(h.domain.read_request().unwrap().header().id, 0);
    h.domain.write_response(&message(2, 0, 0, &[])).unwrap();
    assert!(!h.port.space_to_write_request());

    h.port.read_response().unwrap();
    assert!(h.port.space_to_write_request());
    h.port.write_request(&message(2, 0, 8, &[])).unwrap();
    assert!(!h.port.space_to_write_request());
}

#[test]
fn responses_follow_requests() {
    let mut h = harness();

    assert_eq!(
        h.port.write_response(&Message::default()),
        Err(NotReady::NoResponseSpace)
    );

    for id in 0..3 {
        h.domain.write_request(&message(4, 0, id, &[])).unwrap();
    }
    h.port.read_request().unwrap();
    h.port.read_request().unwrap();

    h.port.write_response(&message(4, 0, 0, &[])).unwrap();
    h.port.write_response(&message(4, 0, 1, &[])).unwrap();
    assert_eq!(
        h.port.write_response(&message(4, 0, 2, &[])),
        Err(NotReady::NoResponseSpace)
    );

    assert_eq!(h.domain.read_response().unwrap().header().id, 0);
    assert_eq!(h.domain.read_response().unwrap().header().id, 1);
    assert_eq!(h.domain.read_response(), Err(NotReady::NoResponse));
}

#[test]
fn empty_read_request_is_not_ready() {
    let mut h = harness();
    assert!(!h.port.request_to_read());
    assert_eq!(h.port.read_request(), Err(NotReady::NoRequest));

    // Cursor unchanged: the next real request is still read from slot 0.
    h.domain.write_request(&message(5, 5, 5, b"first")).unwrap();
    assert_eq!(h.port.read_request().unwrap().payload(), b"first");
}

#[test]
fn unanswered_ring_blocks_further_requests() {
    let mut h = harness();

    for id in 0..RING_SIZE as u8 {
        h.domain.write_request(&message(6, 0, id, &[])).unwrap();
    }
    assert!(!h.domain.space_to_write_request());
    for _ in 0..RING_SIZE {
        h.port.read_request().unwrap();
    }

    // A misbehaving domain publishes one more request than the ring holds.
    h.poke(
        ProducerIndex::TxReq.offset(),
        &(RING_SIZE + 1).to_le_bytes(),
    );
    assert!(!h.port.request_to_read());
    assert_eq!(h.port.read_request(), Err(NotReady::NoRequest));

    h.port.write_response(&message(6, 0, 0, &[])).unwrap();
    assert!(h.port.request_to_read());
}

#[test]
fn indices_wrap_through_every_slot() {
    let mut h = harness();

    for round in 0..(RING_SIZE * 12) {
        let id = (round % 256) as u8;
        h.domain
            .write_request(&message(3, 1, id, &round.to_le_bytes()))
            .unwrap();
        let request = h.port.read_request().unwrap();
        assert_eq!(request.payload(), &round.to_le_bytes()[..]);
        h.port.write_response(&message(3, 2, id, &[])).unwrap();
        assert_eq!(h.domain.read_response().unwrap().header().id, id);

        h.port.write_request(&message(8, 1, id, &[])).unwrap();
        h.domain.read_request().unwrap();
        h.domain.write_response(&message(8, 2, id, &[])).unwrap();
        assert_eq!(h.port.read_response().unwrap().header().subtype, 2);
    }
}

#[test]
fn oversized_length_is_clamped() {
    let mut h = harness();

    let mut slot = vec![1u8, 2, 3, 200];
    slot.extend(std::iter::repeat_n(0xAB, MAX_PAYLOAD));
    h.poke(Ring::Tx.slot_offset(0), &slot);
    h.poke(ProducerIndex::TxReq.offset(), &1u32.to_le_bytes());

    let request = h.port.read_request().unwrap();
    assert_eq!(request.len(), MAX_PAYLOAD);
    assert!(request.payload().iter().all(|&b| b == 0xAB));
}

#[test]
fn port_identity() {
    let h = harness();
    assert_eq!(h.port.remote_domain(), DOMAIN);
    assert_ne!(h.port.local_port(), h.port.remote_port());
    assert_eq!(h.platform.bound_channels(), 1);
}

#[test]
fn ports_to_different_domains_are_independent() {
    let platform = LoopbackPlatform::new(CONTROL_IF_OFFSET).unwrap();
    platform.add_domain(1).unwrap();
    platform.add_domain(2).unwrap();

    let mut one = ControlPort::open_with(&platform, 1).unwrap();
    let mut two = ControlPort::open_with(&platform, 2).unwrap();
    let mut peer_one = platform.attach_peer(1).unwrap();

    peer_one.write_request(&message(1, 0, 0, b"one")).unwrap();
    assert_eq!(two.read_request(), Err(NotReady::NoRequest));
    assert_eq!(one.read_request().unwrap().payload(), b"one");

    one.notify();
    two.notify();
    assert_eq!(
        platform.take_notifications(),
        vec![one.local_port(), two.local_port()]
    );
}
