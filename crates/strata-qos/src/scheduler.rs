//! # QoS Scheduler
//!
//! The engine exposed to the host forwarding path. One [`QosScheduler`] owns
//! the scheduling state of every port it serves and shares one configuration
//! and one entry pool between them.
//!
//! ## Enqueue
//!
//! ```text
//! PDU ─► classify ─► admit ─► pool.acquire ─► stage queue
//!                                          └► mux class (+ ECN mark)
//! ```
//!
//! ## Dequeue
//!
//! 1. Replenish credit for the time elapsed since the last dequeue.
//! 2. For every stage in order, forward queued PDUs while the stage holds
//!    positive credit. A PDU moves one hop per cycle: only entries present at
//!    the start of the cycle are eligible, so a PDU forwarded into a later
//!    stage waits there for the next call.
//! 3. Scan the mux urgency-major, cherish-minor and release the first PDU.
//!    With credit gating, the scan starts at the strictest urgency and cherish
//!    levels that hold positive credit and yields nothing if either dimension
//!    has none; the released PDU's cost is then spent on both ledgers.
//!
//! Random early drop draws from a per-scheduler `StdRng` with a fixed seed,
//! so a given PDU sequence always produces the same verdicts. Hosts that
//! want different streams per scheduler call [`QosScheduler::reseed`].
//!
//! Enqueue and dequeue take `&mut self`: per-port state has a single owner.
//! The [`ConfigStore`] and [`EntryPool`] are shared through `Arc` and may be
//! used concurrently from other threads or other schedulers.

use std::slice;
use std::sync::Arc;

use quanta::Clock;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, error, info, warn};

use crate::admission::{self, DropReason};
use crate::config::{ConfigStore, Forward, SchedConfig};
use crate::error::SchedError;
use crate::param::Param;
use crate::pdu::Pdu;
use crate::pool::{EntryPool, QueueEntry};
use crate::port::{PortHandle, PortId, PortInstance, PortRegistry};
use crate::qos::{classify, stage_exit_class, ClassTarget};

/// Outcome of an enqueue that named a valid port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum Verdict {
    Scheduled,
    /// The PDU was destroyed.
    Dropped(DropReason),
}

impl Verdict {
    pub fn is_scheduled(&self) -> bool {
        matches!(self, Verdict::Scheduled)
    }
}

const EARLY_DROP_SEED: u64 = 0x0E57_D80F;

/// Per-port packet scheduler.
pub struct QosScheduler<P> {
    config: Arc<ConfigStore>,
    pool: Arc<EntryPool<P>>,
    ports: PortRegistry<P>,
    clock: Clock,
    rng: StdRng,
}

impl<P: Pdu> QosScheduler<P> {
    /// Build a scheduler with its own configuration store and pool.
    pub fn new(config: SchedConfig) -> Result<Self, SchedError> {
        let pool = EntryPool::with_capacity(config.pool.capacity);
        pool.prefill(config.pool.prealloc);
        let store = ConfigStore::new(config)?;
        Ok(Self::with_parts(Arc::new(store), Arc::new(pool), Clock::new()))
    }

    /// Build from ordered `name = value` pairs over the defaults.
    pub fn from_params<I, K, V>(pairs: I) -> Result<Self, SchedError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let store = ConfigStore::from_pairs(pairs)?;
        let settings = store.snapshot().pool;
        let pool = EntryPool::with_capacity(settings.capacity);
        pool.prefill(settings.prealloc);
        Ok(Self::with_parts(Arc::new(store), Arc::new(pool), Clock::new()))
    }

    /// Build around a shared store, a shared pool, and an explicit clock.
    pub fn with_parts(config: Arc<ConfigStore>, pool: Arc<EntryPool<P>>, clock: Clock) -> Self {
        QosScheduler {
            config,
            pool,
            ports: PortRegistry::new(),
            clock,
            rng: StdRng::seed_from_u64(EARLY_DROP_SEED),
        }
    }

    /// Restart the early-drop random stream from `seed`.
    pub fn reseed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }

    pub fn config(&self) -> &Arc<ConfigStore> {
        &self.config
    }

    pub fn pool(&self) -> &Arc<EntryPool<P>> {
        &self.pool
    }

    pub fn port(&self, handle: PortHandle) -> Option<&PortInstance<P>> {
        self.ports.get(handle)
    }

    pub fn port_handle(&self, port_id: PortId) -> Option<PortHandle> {
        self.ports.handle_of(port_id)
    }

    pub fn port_count(&self) -> usize {
        self.ports.len()
    }

    // ─── Port lifecycle ──────────────────────────────────────────────────

    /// Scheduling state for `port_id`, created on first call.
    ///
    /// Freezes structural configuration. A repeated call returns the existing
    /// handle.
    pub fn create_port_state(&mut self, port_id: PortId) -> Result<PortHandle, SchedError> {
        self.config.freeze();
        let config = self.config.snapshot();
        let now = self.clock.now();
        let (handle, created) = self
            .ports
            .get_or_create(port_id, || PortInstance::new(port_id, &config, now));
        if created {
            debug!(port = port_id, %handle, "port scheduling state created");
        } else {
            warn!(port = port_id, %handle, "port scheduling state already exists");
        }
        Ok(handle)
    }

    /// Tear down a port. Queued PDUs are destroyed and their entries returned
    /// to the pool. Returns how many PDUs were discarded.
    pub fn destroy_port_state(&mut self, handle: PortHandle) -> Result<usize, SchedError> {
        let Some(mut instance) = self.ports.remove(handle) else {
            error!(%handle, "destroy on unknown port");
            return Err(SchedError::UnknownPort(handle));
        };
        let entries = instance.drain();
        let discarded = entries.len();
        for entry in entries {
            self.pool.release(entry);
        }
        debug!(
            port = instance.port_id(),
            discarded, "port scheduling state destroyed"
        );
        Ok(discarded)
    }

    /// Destroy every port and empty the pool. Returns discarded PDUs.
    pub fn shutdown(&mut self) -> usize {
        let mut discarded = 0;
        for handle in self.ports.handles() {
            discarded += self.destroy_port_state(handle).unwrap_or(0);
        }
        let freed = self.pool.clear();
        info!(discarded, freed, "scheduler shut down");
        discarded
    }

    // ─── Configuration ───────────────────────────────────────────────────

    /// Apply a textual parameter. Pool settings take effect immediately.
    pub fn set_parameter(&self, name: &str, value: &str) -> Result<(), SchedError> {
        match self.config.set(name, value)? {
            Param::PoolCapacity(capacity) => self.pool.set_capacity(capacity),
            Param::PoolPrealloc(count) => {
                let added = self.pool.prefill(count);
                debug!(requested = count, added, "entry pool pre-allocated");
            }
            _ => {}
        }
        Ok(())
    }

    // ─── Data path ───────────────────────────────────────────────────────

    /// Classify, admit, and queue a PDU.
    ///
    /// `Err` only for an unknown port; the PDU is destroyed. Congestion and
    /// pool exhaustion are reported as [`Verdict::Dropped`].
    pub fn enqueue(&mut self, handle: PortHandle, pdu: P) -> Result<Verdict, SchedError> {
        let Some(port) = self.ports.get_mut(handle) else {
            error!(%handle, qos_id = pdu.qos_id(), "enqueue on unknown port");
            return Err(SchedError::UnknownPort(handle));
        };
        let config = self.config.snapshot();
        let qos_id = pdu.qos_id();
        let bytes = pdu.length() as u64;
        let target = classify(&config, qos_id);

        let admitted = admission::admit(port, qos_id, bytes, &target, &config, &mut self.rng);
        if let Err(reason) = admitted {
            port.stats.record_drop(&reason);
            info!(port = port.port_id(), qos_id, %reason, "drop");
            return Ok(Verdict::Dropped(reason));
        }

        let cost = config.cost_of(pdu.length());
        let mut entry = match self.pool.acquire() {
            Ok(entry) => entry,
            Err(err) => {
                let reason = DropReason::PoolExhausted;
                port.stats.record_drop(&reason);
                warn!(port = port.port_id(), qos_id, %err, "drop");
                return Ok(Verdict::Dropped(reason));
            }
        };

        match target {
            ClassTarget::Stage(stage) => {
                entry.load(pdu, cost);
                port.push_stage(stage, entry);
                debug!(port = port.port_id(), qos_id, stage = stage + 1, cost, "enqueued");
            }
            ClassTarget::Mux(class) => {
                entry.load(pdu, cost);
                let marked = port.push_mux(&class, entry);
                debug!(
                    port = port.port_id(),
                    qos_id,
                    urgency = class.urgency,
                    cherish = class.cherish,
                    cost,
                    marked,
                    "enqueued"
                );
            }
        }
        port.count += 1;
        port.add_backlog(qos_id, bytes);
        port.stats.enqueued += 1;
        Ok(Verdict::Scheduled)
    }

    /// Release the next PDU of a port, if any is eligible.
    pub fn dequeue(&mut self, handle: PortHandle) -> Option<P> {
        let Some(port) = self.ports.get_mut(handle) else {
            error!(%handle, "dequeue on unknown port");
            return None;
        };
        let config = self.config.snapshot();

        replenish(port, &config, &self.clock);
        if !port.stages.is_empty() {
            migrate_stages(port, &config, &self.pool, &mut self.rng);
        }

        let mut entry = select_mux(port, &config)?;
        port.count -= 1;
        port.mux_count -= 1;
        port.stats.dequeued += 1;
        let cost = entry.cost();
        let pdu = entry.take();
        if let Some(pdu) = &pdu {
            port.release_backlog(pdu.qos_id(), pdu.length() as u64);
        }
        self.pool.release(entry);
        debug!(port = port.port_id(), cost, "dequeued");
        pdu
    }
}

// ─── Dequeue stages ──────────────────────────────────────────────────────────

fn replenish<P>(port: &mut PortInstance<P>, config: &SchedConfig, clock: &Clock) {
    let elapsed = port.replenisher.elapsed_us(clock.now());
    if elapsed == 0 {
        return;
    }
    if config.topology.credit_gate {
        port.urgency.gain(elapsed, &config.urgency_credit);
        port.cherish.gain(elapsed, &config.cherish_credit);
    }
    for (stage, params) in port.stages.iter_mut().zip(&config.stages) {
        stage.credit.gain(elapsed, slice::from_ref(&params.credit));
    }
}

fn migrate_stages<P: Pdu>(
    port: &mut PortInstance<P>,
    config: &SchedConfig,
    pool: &EntryPool<P>,
    rng: &mut StdRng,
) {
    let budgets: Vec<usize> = port.stages.iter().map(|s| s.queue.len()).collect();

    for (idx, budget) in budgets.into_iter().enumerate() {
        let Some(params) = config.stage(idx) else {
            break;
        };
        let target = match params.next {
            Forward::Stage(to) => ClassTarget::Stage(usize::from(to)),
            Forward::Mux => match stage_exit_class(config, idx) {
                Some(class) => ClassTarget::Mux(class),
                None => break,
            },
        };
        for _ in 0..budget {
            let stage = &mut port.stages[idx];
            if stage.credit.balance(0) <= 0 {
                break;
            }
            let Some(entry) = stage.queue.pop_front() else {
                break;
            };
            stage
                .credit
                .spend(entry.cost(), 0, slice::from_ref(&params.credit));
            forward(port, idx, &target, entry, config, pool, rng);
        }
    }
}

/// Move one entry out of stage `from`. An entry its target cannot admit is
/// destroyed.
fn forward<P: Pdu>(
    port: &mut PortInstance<P>,
    from: usize,
    target: &ClassTarget,
    entry: QueueEntry<P>,
    config: &SchedConfig,
    pool: &EntryPool<P>,
    rng: &mut StdRng,
) {
    let admitted = match target {
        ClassTarget::Stage(to) => admission::admit_stage(port, *to, config),
        ClassTarget::Mux(class) => admission::admit_mux(port, class, config, rng),
    };
    match admitted {
        Ok(()) => {
            match target {
                ClassTarget::Stage(to) => port.push_stage(*to, entry),
                ClassTarget::Mux(class) => {
                    port.push_mux(class, entry);
                }
            }
            port.stats.migrated += 1;
        }
        Err(reason) => {
            port.count -= 1;
            if let Some(pdu) = entry.pdu() {
                port.release_backlog(pdu.qos_id(), pdu.length() as u64);
            }
            port.stats.migration_drops += 1;
            info!(port = port.port_id(), stage = from + 1, %reason, "drop on migration");
            pool.release(entry);
        }
    }
}

fn select_mux<P>(port: &mut PortInstance<P>, config: &SchedConfig) -> Option<QueueEntry<P>> {
    let topology = port.topology();
    let (start_u, start_c) = if topology.credit_gate {
        (port.urgency.first_positive()?, port.cherish.first_positive()?)
    } else {
        (0, 0)
    };

    let urgency_levels = usize::from(topology.urgency_levels);
    let cherish_levels = usize::from(topology.cherish_levels);
    for u in start_u..urgency_levels {
        for c in start_c..cherish_levels {
            let idx = u * cherish_levels + c;
            let Some(entry) = port.mux.get_mut(idx).and_then(|q| q.pop_front()) else {
                continue;
            };
            if topology.credit_gate {
                port.urgency.spend(entry.cost(), u, &config.urgency_credit);
                port.cherish.spend(entry.cost(), c, &config.cherish_credit);
            }
            return Some(entry);
        }
    }
    None
}
