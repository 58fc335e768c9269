//! Explicit congestion marking.

use crate::pdu::Pdu;

/// Set the congestion flag when `occupancy` exceeds `threshold`.
///
/// `occupancy` is the length of the queue the PDU just joined, counting the
/// PDU itself. Returns whether the PDU was marked.
pub fn mark_if_congested<P: Pdu + ?Sized>(pdu: &mut P, occupancy: usize, threshold: u16) -> bool {
    if occupancy > usize::from(threshold) {
        pdu.set_congestion_flag();
        true
    } else {
        false
    }
}
