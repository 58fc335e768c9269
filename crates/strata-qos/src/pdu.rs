//! # PDU Contract
//!
//! PDUs are opaque, cost-bearing units. The scheduler only needs a PDU's
//! length, its QoS identifier, and a way to set the explicit-congestion flag
//! in its control header. Destroying a PDU is dropping it.

use bytes::Bytes;

/// QoS identifier carried in a PDU's control header.
pub type QosId = u16;

/// Control-header flag set by the congestion marker.
pub const FLAG_EXPLICIT_CONGESTION: u8 = 0x01;

/// What the scheduler consumes from the host's PDU type.
pub trait Pdu {
    /// Length in bytes, used to compute the queuing cost.
    fn length(&self) -> usize;

    /// Classifier key.
    fn qos_id(&self) -> QosId;

    /// Set the explicit-congestion flag. Never cleared by the scheduler.
    fn set_congestion_flag(&mut self);
}

impl<T: Pdu + ?Sized> Pdu for Box<T> {
    fn length(&self) -> usize {
        (**self).length()
    }

    fn qos_id(&self) -> QosId {
        (**self).qos_id()
    }

    fn set_congestion_flag(&mut self) {
        (**self).set_congestion_flag()
    }
}

// ─── Packet ──────────────────────────────────────────────────────────────────

/// A minimal PDU: control-header fields plus an opaque payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub qos_id: QosId,
    pub flags: u8,
    pub payload: Bytes,
}

impl Packet {
    pub fn new(qos_id: QosId, payload: Bytes) -> Self {
        Packet {
            qos_id,
            flags: 0,
            payload,
        }
    }

    /// A packet of `len` zero bytes, handy for synthetic traffic.
    pub fn zeroed(qos_id: QosId, len: usize) -> Self {
        Packet::new(qos_id, Bytes::from(vec![0u8; len]))
    }

    pub fn is_congestion_marked(&self) -> bool {
        self.flags & FLAG_EXPLICIT_CONGESTION != 0
    }
}

impl Pdu for Packet {
    fn length(&self) -> usize {
        self.payload.len()
    }

    fn qos_id(&self) -> QosId {
        self.qos_id
    }

    fn set_congestion_flag(&mut self) {
        self.flags |= FLAG_EXPLICIT_CONGESTION;
    }
}
