//! Domain end of the control interface.
//!
//! [`PeerPort`] drives the rings from the other side: it produces requests
//! and consumes responses on `tx_ring`, and consumes requests and produces
//! responses on `rx_ring`. It owns the `tx_req_prod` and `rx_resp_prod`
//! indices of the shared page. It exists so the controller side can be
//! exercised against a faithful counterpart, and as a reference for domain
//! implementations of the protocol.

use xenctl_common::ctrl::Message;
use xenctl_common::ctrl::consts::{ProducerIndex, RING_SIZE, Ring};

use crate::interface::ControlInterface;
use crate::port::NotReady;

/// Domain-side endpoint of a control interface.
pub struct PeerPort {
    interface: ControlInterface,
    tx_req_prod: u32,
    tx_resp_cons: u32,
    rx_req_cons: u32,
    rx_resp_prod: u32,
}

impl PeerPort {
    /// Drive `interface` from the domain side, starting from zeroed cursors.
    pub fn new(interface: ControlInterface) -> Self {
        Self {
            interface,
            tx_req_prod: 0,
            tx_resp_cons: 0,
            rx_req_cons: 0,
            rx_resp_prod: 0,
        }
    }

    /// Whether a request from the controller is waiting.
    pub fn request_to_read(&self) -> bool {
        let c = self.rx_req_cons;
        !(c == self.interface.load_producer(ProducerIndex::RxReq)
            || c.wrapping_sub(self.rx_resp_prod) == RING_SIZE)
    }

    /// Whether a request to the controller can be written.
    pub fn space_to_write_request(&self) -> bool {
        self.tx_req_prod.wrapping_sub(self.tx_resp_cons) != RING_SIZE
    }

    /// Whether a response from the controller is waiting.
    pub fn response_to_read(&self) -> bool {
        let c = self.tx_resp_cons;
        !(c == self.interface.load_producer(ProducerIndex::TxResp) || c == self.tx_req_prod)
    }

    /// Whether a response to the controller can be written.
    pub fn space_to_write_response(&self) -> bool {
        self.rx_resp_prod != self.rx_req_cons
    }

    /// Take the next request sent by the controller.
    pub fn read_request(&mut self) -> Result<Message, NotReady> {
        if !self.request_to_read() {
            return Err(NotReady::NoRequest);
        }
        let msg = self.interface.read_slot(Ring::Rx, self.rx_req_cons);
        self.rx_req_cons = self.rx_req_cons.wrapping_add(1);
        Ok(msg)
    }

    /// Send a request to the controller.
    pub fn write_request(&mut self, msg: &Message) -> Result<(), NotReady> {
        if !self.space_to_write_request() {
            return Err(NotReady::NoRequestSpace);
        }
        self.interface.write_slot(Ring::Tx, self.tx_req_prod, msg);
        self.tx_req_prod = self.tx_req_prod.wrapping_add(1);
        self.interface
            .publish_producer(ProducerIndex::TxReq, self.tx_req_prod);
        Ok(())
    }

    /// Take the next response sent by the controller.
    pub fn read_response(&mut self) -> Result<Message, NotReady> {
        if !self.response_to_read() {
            return Err(NotReady::NoResponse);
        }
        let msg = self.interface.read_slot(Ring::Tx, self.tx_resp_cons);
        self.tx_resp_cons = self.tx_resp_cons.wrapping_add(1);
        Ok(msg)
    }

    /// Answer the oldest unanswered controller request.
    pub fn write_response(&mut self, msg: &Message) -> Result<(), NotReady> {
        if !self.space_to_write_response() {
            return Err(NotReady::NoResponseSpace);
        }
        self.interface.write_slot(Ring::Rx, self.rx_resp_prod, msg);
        self.rx_resp_prod = self.rx_resp_prod.wrapping_add(1);
        self.interface
            .publish_producer(ProducerIndex::RxResp, self.rx_resp_prod);
        Ok(())
    }
}
