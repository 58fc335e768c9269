//! # Port Instances
//!
//! Per-port scheduling state and the registry that owns it.
//!
//! A [`PortInstance`] is sized from the configuration snapshot current at its
//! creation: one queue and one single-level credit ledger per policer/shaper
//! stage, one queue per mux class, and urgency/cherish ledgers for gated
//! selection. Structural parameters are frozen before the first instance is
//! built, so every instance of a scheduler has the same shape.
//!
//! The [`PortRegistry`] stores instances in a `Slab` and hands out
//! generational [`PortHandle`]s. A handle outliving its instance is stale and
//! rejected, even if the slab slot has since been reused.

use std::collections::{HashMap, VecDeque};
use std::fmt;

use quanta::Instant;
use slab::Slab;

use crate::config::{SchedConfig, Topology};
use crate::credit::{CreditLedger, Replenisher};
use crate::ecn::mark_if_congested;
use crate::pdu::{Pdu, QosId};
use crate::pool::QueueEntry;
use crate::qos::MuxClass;
use crate::stats::PortStats;

/// Host-side port identifier.
pub type PortId = u32;

/// Handle to a live port instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PortHandle {
    key: usize,
    generation: u64,
}

impl fmt::Display for PortHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.key, self.generation)
    }
}

// ─── PortInstance ────────────────────────────────────────────────────────────

#[derive(Debug)]
pub(crate) struct StageState<P> {
    pub(crate) queue: VecDeque<QueueEntry<P>>,
    pub(crate) credit: CreditLedger,
}

/// Scheduling state of one port.
#[derive(Debug)]
pub struct PortInstance<P> {
    port_id: PortId,
    topology: Topology,
    pub(crate) stages: Vec<StageState<P>>,
    pub(crate) mux: Vec<VecDeque<QueueEntry<P>>>,
    pub(crate) urgency: CreditLedger,
    pub(crate) cherish: CreditLedger,
    /// PDUs queued anywhere in the port.
    pub(crate) count: usize,
    /// PDUs queued in the mux.
    pub(crate) mux_count: usize,
    /// Queued bytes per QoS id; ids with nothing queued are absent.
    backlog: HashMap<QosId, u64>,
    pub(crate) replenisher: Replenisher,
    pub(crate) stats: PortStats,
}

impl<P> PortInstance<P> {
    /// Empty instance with zero credit, stamped at `now`.
    pub fn new(port_id: PortId, config: &SchedConfig, now: Instant) -> Self {
        let topology = config.topology;
        PortInstance {
            port_id,
            topology,
            stages: (0..topology.stages)
                .map(|_| StageState {
                    queue: VecDeque::new(),
                    credit: CreditLedger::new(1),
                })
                .collect(),
            mux: (0..topology.mux_classes()).map(|_| VecDeque::new()).collect(),
            urgency: CreditLedger::new(usize::from(topology.urgency_levels)),
            cherish: CreditLedger::new(usize::from(topology.cherish_levels)),
            count: 0,
            mux_count: 0,
            backlog: HashMap::new(),
            replenisher: Replenisher::new(now),
            stats: PortStats::default(),
        }
    }

    pub fn port_id(&self) -> PortId {
        self.port_id
    }

    pub fn topology(&self) -> Topology {
        self.topology
    }

    /// PDUs queued anywhere in the port.
    pub fn count(&self) -> usize {
        self.count
    }

    pub fn mux_count(&self) -> usize {
        self.mux_count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Queue length of stage `stage` (0-based); 0 if it does not exist.
    pub fn stage_len(&self, stage: usize) -> usize {
        self.stages.get(stage).map_or(0, |s| s.queue.len())
    }

    /// Bytes queued for `qos_id`.
    pub fn backlog(&self, qos_id: QosId) -> u64 {
        self.backlog.get(&qos_id).copied().unwrap_or(0)
    }

    pub fn mux_len(&self, urgency: u8, cherish: u8) -> usize {
        self.mux
            .get(self.topology.class_index(urgency, cherish))
            .map_or(0, VecDeque::len)
    }

    pub fn stage_credit(&self, stage: usize) -> i64 {
        self.stages.get(stage).map_or(0, |s| s.credit.balance(0))
    }

    pub fn urgency_credit(&self) -> &[i64] {
        self.urgency.balances()
    }

    pub fn cherish_credit(&self) -> &[i64] {
        self.cherish.balances()
    }

    pub fn last_replenish(&self) -> Instant {
        self.replenisher.last()
    }

    pub fn stats(&self) -> &PortStats {
        &self.stats
    }

    /// Counters agree with the queues they describe.
    pub fn check_invariants(&self) -> bool {
        let stage_total: usize = self.stages.iter().map(|s| s.queue.len()).sum();
        let mux_total: usize = self.mux.iter().map(VecDeque::len).sum();
        self.mux_count == mux_total && self.count == stage_total + mux_total
    }

    /// Queue an entry at the tail of `stage`.
    pub(crate) fn push_stage(&mut self, stage: usize, entry: QueueEntry<P>) {
        if let Some(s) = self.stages.get_mut(stage) {
            s.queue.push_back(entry);
        }
    }

    pub(crate) fn add_backlog(&mut self, qos_id: QosId, bytes: u64) {
        let queued = self.backlog.entry(qos_id).or_insert(0);
        *queued = queued.saturating_add(bytes);
    }

    pub(crate) fn release_backlog(&mut self, qos_id: QosId, bytes: u64) {
        if let Some(queued) = self.backlog.get_mut(&qos_id) {
            *queued = queued.saturating_sub(bytes);
            if *queued == 0 {
                self.backlog.remove(&qos_id);
            }
        }
    }

    /// Remove every queued entry, resetting the occupancy counters.
    pub(crate) fn drain(&mut self) -> Vec<QueueEntry<P>> {
        let mut entries = Vec::with_capacity(self.count);
        for stage in &mut self.stages {
            entries.extend(stage.queue.drain(..));
        }
        for queue in &mut self.mux {
            entries.extend(queue.drain(..));
        }
        self.count = 0;
        self.mux_count = 0;
        self.backlog.clear();
        entries
    }
}

impl<P: Pdu> PortInstance<P> {
    /// Queue an entry at the tail of its mux class, marking it when the class
    /// is congested. Returns whether it was marked.
    pub(crate) fn push_mux(&mut self, class: &MuxClass, mut entry: QueueEntry<P>) -> bool {
        let idx = self.topology.class_index(class.urgency, class.cherish);
        let Some(queue) = self.mux.get_mut(idx) else {
            return false;
        };
        let marked = entry
            .pdu_mut()
            .is_some_and(|pdu| mark_if_congested(pdu, queue.len() + 1, class.ecn_threshold));
        queue.push_back(entry);
        self.mux_count += 1;
        if marked {
            self.stats.ecn_marked += 1;
        }
        marked
    }
}

// ─── PortRegistry ────────────────────────────────────────────────────────────

struct Slot<P> {
    generation: u64,
    instance: PortInstance<P>,
}

/// Owner of every live port instance.
pub struct PortRegistry<P> {
    slots: Slab<Slot<P>>,
    by_id: HashMap<PortId, PortHandle>,
    next_generation: u64,
}

impl<P> PortRegistry<P> {
    pub fn new() -> Self {
        PortRegistry {
            slots: Slab::new(),
            by_id: HashMap::new(),
            next_generation: 0,
        }
    }

    /// Handle of the instance for `port_id`, building one with `make` if none
    /// exists. The flag is `true` when a new instance was created.
    pub fn get_or_create(
        &mut self,
        port_id: PortId,
        make: impl FnOnce() -> PortInstance<P>,
    ) -> (PortHandle, bool) {
        if let Some(&handle) = self.by_id.get(&port_id) {
            return (handle, false);
        }
        let generation = self.next_generation;
        self.next_generation += 1;
        let key = self.slots.insert(Slot {
            generation,
            instance: make(),
        });
        let handle = PortHandle { key, generation };
        self.by_id.insert(port_id, handle);
        (handle, true)
    }

    pub fn get(&self, handle: PortHandle) -> Option<&PortInstance<P>> {
        self.slots
            .get(handle.key)
            .filter(|slot| slot.generation == handle.generation)
            .map(|slot| &slot.instance)
    }

    pub fn get_mut(&mut self, handle: PortHandle) -> Option<&mut PortInstance<P>> {
        self.slots
            .get_mut(handle.key)
            .filter(|slot| slot.generation == handle.generation)
            .map(|slot| &mut slot.instance)
    }

    /// Detach and return the instance behind `handle`.
    pub fn remove(&mut self, handle: PortHandle) -> Option<PortInstance<P>> {
        self.get(handle)?;
        let slot = self.slots.try_remove(handle.key)?;
        self.by_id.remove(&slot.instance.port_id);
        Some(slot.instance)
    }

    pub fn handle_of(&self, port_id: PortId) -> Option<PortHandle> {
        self.by_id.get(&port_id).copied()
    }

    pub fn handles(&self) -> Vec<PortHandle> {
        self.by_id.values().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl<P> Default for PortRegistry<P> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Topology;
    use crate::pdu::Packet;
    use crate::pool::EntryPool;

    fn now() -> Instant {
        quanta::Clock::mock().0.now()
    }

    #[test]
    fn instance_is_sized_from_topology() {
        let mut cfg = SchedConfig::new(Topology::matrix(3, 2));
        cfg.topology.stages = 2;
        cfg.stages.resize(2, Default::default());
        let port: PortInstance<Packet> = PortInstance::new(7, &cfg, now());
        assert_eq!(port.mux.len(), 6);
        assert_eq!(port.stages.len(), 2);
        assert_eq!(port.urgency_credit(), &[0, 0, 0]);
        assert_eq!(port.cherish_credit(), &[0, 0]);
        assert!(port.is_empty());
        assert!(port.check_invariants());
    }

    #[test]
    fn push_mux_marks_over_threshold() {
        let cfg = SchedConfig::default();
        let pool = EntryPool::new();
        let mut port = PortInstance::new(1, &cfg, now());
        let class = MuxClass {
            urgency: 0,
            cherish: 0,
            threshold: 100,
            ecn_threshold: 1,
            abs_threshold: None,
            drop_prob: 0,
        };
        for _ in 0..2 {
            let mut e = pool.acquire().unwrap();
            e.load(Packet::zeroed(0, 10), 10);
            port.push_mux(&class, e);
            port.count += 1;
        }
        assert_eq!(port.mux_len(0, 0), 2);
        assert_eq!(port.stats().ecn_marked, 1);
        let marks: Vec<bool> = port.mux[0]
            .iter()
            .map(|e| e.pdu().unwrap().is_congestion_marked())
            .collect();
        assert_eq!(marks, vec![false, true]);
        assert!(port.check_invariants());

        assert_eq!(port.drain().len(), 2);
        assert!(port.is_empty());
        assert!(port.check_invariants());
    }

    #[test]
    fn backlog_tracks_bytes_per_qos_id() {
        let cfg = SchedConfig::default();
        let mut port: PortInstance<Packet> = PortInstance::new(1, &cfg, now());
        port.add_backlog(4, 1000);
        port.add_backlog(4, 500);
        port.add_backlog(5, 20);
        assert_eq!(port.backlog(4), 1500);

        port.release_backlog(4, 1000);
        assert_eq!(port.backlog(4), 500);
        port.release_backlog(4, 900);
        assert_eq!(port.backlog(4), 0);
        assert!(!port.backlog.contains_key(&4));

        port.drain();
        assert_eq!(port.backlog(5), 0);
    }

    #[test]
    fn registry_create_is_idempotent() {
        let cfg = SchedConfig::default();
        let mut reg: PortRegistry<Packet> = PortRegistry::new();
        let (a, created) = reg.get_or_create(3, || PortInstance::new(3, &cfg, now()));
        assert!(created);
        let (b, created) = reg.get_or_create(3, || unreachable!("already exists"));
        assert!(!created);
        assert_eq!(a, b);
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.handle_of(3), Some(a));
    }

    #[test]
    fn stale_handle_is_rejected_after_slot_reuse() {
        let cfg = SchedConfig::default();
        let mut reg: PortRegistry<Packet> = PortRegistry::new();
        let (old, _) = reg.get_or_create(1, || PortInstance::new(1, &cfg, now()));
        assert!(reg.remove(old).is_some());
        assert!(reg.remove(old).is_none());

        let (new, _) = reg.get_or_create(2, || PortInstance::new(2, &cfg, now()));
        assert_ne!(old, new);
        assert!(reg.get(old).is_none());
        assert_eq!(reg.get(new).map(PortInstance::port_id), Some(2));
        assert_eq!(reg.handle_of(1), None);
    }
}
