//! Per-port counters.

use crate::admission::DropReason;

/// Cumulative counters of one port instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PortStats {
    pub enqueued: u64,
    pub dequeued: u64,
    /// Drops from occupancy limits at enqueue.
    pub congestion_drops: u64,
    /// Drops because the entry pool was exhausted.
    pub pool_drops: u64,
    /// PDUs moved out of a policer/shaper.
    pub migrated: u64,
    /// PDUs dropped on their way out of a policer/shaper.
    pub migration_drops: u64,
    pub ecn_marked: u64,
}

impl PortStats {
    pub fn record_drop(&mut self, reason: &DropReason) {
        if reason.is_congestion() {
            self.congestion_drops += 1;
        } else {
            self.pool_drops += 1;
        }
    }

    pub fn total_drops(&self) -> u64 {
        self.congestion_drops + self.pool_drops + self.migration_drops
    }
}
