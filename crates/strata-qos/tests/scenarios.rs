//! # Integration tests: host ↔ scheduler through the public API
//!
//! Every test drives a [`QosScheduler`] with a mocked clock so credit
//! replenishment is deterministic. Occupancy invariants are checked after each
//! call.

use std::sync::Arc;
use std::time::Duration;

use quanta::{Clock, Mock};
use strata_qos::admission::DropReason;
use strata_qos::pool::EntryPool;
use strata_qos::{
    ConfigError, ConfigStore, Packet, PortHandle, QosScheduler, SchedConfig, SchedError, Topology,
    Verdict,
};

// ─── Helpers ────────────────────────────────────────────────────────────────

fn scheduler(pairs: &[(&str, &str)]) -> (QosScheduler<Packet>, Arc<Mock>) {
    let store = ConfigStore::from_pairs(pairs.iter().copied()).unwrap();
    let (clock, mock) = Clock::mock();
    let sched = QosScheduler::with_parts(Arc::new(store), Arc::new(EntryPool::new()), clock);
    (sched, mock)
}

fn assert_consistent(sched: &QosScheduler<Packet>, port: PortHandle) {
    assert!(sched.port(port).unwrap().check_invariants());
}

fn enqueue(sched: &mut QosScheduler<Packet>, port: PortHandle, qos_id: u16, len: usize) -> Verdict {
    let verdict = sched.enqueue(port, Packet::zeroed(qos_id, len)).unwrap();
    assert_consistent(sched, port);
    verdict
}

// ─── Scenario A: bounded FIFO ───────────────────────────────────────────────

#[test]
fn fifo_drops_over_max_count_and_preserves_order() {
    let (mut sched, _mock) = scheduler(&[("max_count", "2")]);
    let port = sched.create_port_state(1).unwrap();

    assert_eq!(enqueue(&mut sched, port, 0, 1), Verdict::Scheduled);
    assert_eq!(enqueue(&mut sched, port, 0, 2), Verdict::Scheduled);
    assert_eq!(
        enqueue(&mut sched, port, 0, 3),
        Verdict::Dropped(DropReason::PortLimit { limit: 2 })
    );

    assert_eq!(sched.dequeue(port).map(|p| p.payload.len()), Some(1));
    assert_eq!(sched.dequeue(port).map(|p| p.payload.len()), Some(2));
    assert!(sched.dequeue(port).is_none());
    assert_consistent(&sched, port);

    let stats = sched.port(port).unwrap().stats();
    assert_eq!(stats.enqueued, 2);
    assert_eq!(stats.dequeued, 2);
    assert_eq!(stats.congestion_drops, 1);
}

// ─── Scenario B: ECN marking ────────────────────────────────────────────────

#[test]
fn second_pdu_in_class_is_congestion_marked() {
    let (mut sched, _mock) = scheduler(&[("ecn_th", "1")]);
    let port = sched.create_port_state(1).unwrap();

    assert!(enqueue(&mut sched, port, 0, 10).is_scheduled());
    assert!(enqueue(&mut sched, port, 0, 10).is_scheduled());

    let first = sched.dequeue(port).unwrap();
    let second = sched.dequeue(port).unwrap();
    assert!(!first.is_congestion_marked());
    assert!(second.is_congestion_marked());
    assert_eq!(sched.port(port).unwrap().stats().ecn_marked, 1);
}

// ─── Scenario C: credit borrowing ───────────────────────────────────────────

#[test]
fn laxer_level_repays_debt_of_stricter_level() {
    let (mut sched, mock) = scheduler(&[
        ("levels_urgency", "2"),
        ("credit_gate", "1"),
        ("qos_1.urgency", "0"),
    ]);
    let port = sched.create_port_state(1).unwrap();

    mock.increment(Duration::from_micros(100));
    assert!(enqueue(&mut sched, port, 1, 300).is_scheduled());

    // 100 µs of gain gives [100, 100]; the 300-cost PDU drains both and
    // leaves 100 of debt at level 0.
    assert!(sched.dequeue(port).is_some());
    assert_eq!(sched.port(port).unwrap().urgency_credit(), &[-100, 0]);

    mock.increment(Duration::from_micros(1000));
    assert!(sched.dequeue(port).is_none());
    // Level 1 gave 100 of its 1000 to level 0's debt.
    assert_eq!(sched.port(port).unwrap().urgency_credit(), &[1000, 900]);
}

#[test]
fn gated_mux_waits_for_credit() {
    let (mut sched, mock) = scheduler(&[("levels_urgency", "2"), ("credit_gate", "1")]);
    let port = sched.create_port_state(1).unwrap();

    assert!(enqueue(&mut sched, port, 0, 50).is_scheduled());
    // No time has passed: no level holds credit, nothing is released.
    assert!(sched.dequeue(port).is_none());
    assert_eq!(sched.port(port).unwrap().count(), 1);

    mock.increment(Duration::from_micros(10));
    assert!(sched.dequeue(port).is_some());
    assert_consistent(&sched, port);
}

#[test]
fn gated_scan_starts_at_strictest_credited_level() {
    let (mut sched, mock) = scheduler(&[
        ("levels_urgency", "2"),
        ("credit_gate", "1"),
        ("urgency_0.gain_us", "0"),
        ("qos_1.urgency", "0"),
    ]);
    let port = sched.create_port_state(1).unwrap();

    assert!(enqueue(&mut sched, port, 1, 10).is_scheduled());
    assert!(enqueue(&mut sched, port, 2, 20).is_scheduled());

    mock.increment(Duration::from_micros(100));
    // Level 0 never earns credit, so only the level-1 PDU is eligible.
    let pdu = sched.dequeue(port).unwrap();
    assert_eq!(pdu.qos_id, 2);
    assert_eq!(sched.port(port).unwrap().mux_len(0, 0), 1);
}

#[test]
fn saturated_costs_do_not_overflow_credit() {
    let (mut sched, mock) = scheduler(&[
        ("levels_urgency", "3"),
        ("levels_cherish", "2"),
        ("credit_gate", "1"),
        ("header_weight", "4294967295"),
        ("bytecost", "4294967295"),
        ("qos_1.urgency", "1"),
        ("qos_1.cherish", "1"),
    ]);
    let port = sched.create_port_state(1).unwrap();
    assert!(enqueue(&mut sched, port, 1, 10).is_scheduled());
    assert!(enqueue(&mut sched, port, 1, 10).is_scheduled());

    // Each release drives level 1 deeper into debt until it saturates; the
    // next replenishment has to repay a balance of i64::MIN.
    let mut released = 0;
    for _ in 0..4 {
        mock.increment(Duration::from_micros(10));
        if sched.dequeue(port).is_some() {
            released += 1;
        }
        assert_consistent(&sched, port);
    }
    assert_eq!(released, 2);

    let state = sched.port(port).unwrap();
    assert!(state.urgency_credit()[1] < 0);
    assert!(state.cherish_credit()[1] < 0);
    assert!(state.urgency_credit().iter().all(|&b| b <= 10_000));
}

// ─── Scenario D: multi-stage migration ──────────────────────────────────────

#[test]
fn stage_migration_moves_one_hop_per_cycle() {
    let (mut sched, mock) = scheduler(&[
        ("num_policers", "2"),
        ("ps_1.next", "2"),
        ("qos_1.next", "1"),
    ]);
    let port = sched.create_port_state(1).unwrap();

    assert!(enqueue(&mut sched, port, 1, 100).is_scheduled());
    assert_eq!(sched.port(port).unwrap().stage_len(0), 1);

    mock.increment(Duration::from_micros(10));
    assert!(sched.dequeue(port).is_none());
    let state = sched.port(port).unwrap();
    assert_eq!(state.stage_len(0), 0);
    assert_eq!(state.stage_len(1), 1);
    assert_eq!(state.mux_count(), 0);
    assert_eq!(state.stage_credit(0), 900);
    assert!(state.check_invariants());

    mock.increment(Duration::from_micros(10));
    assert!(sched.dequeue(port).is_some());
    let state = sched.port(port).unwrap();
    assert!(state.is_empty());
    assert_eq!(state.stats().migrated, 2);
}

#[test]
fn migration_into_full_stage_drops() {
    let (mut sched, mock) = scheduler(&[
        ("num_policers", "2"),
        ("ps_1.next", "2"),
        ("ps_2.max_count", "0"),
        ("qos_1.next", "1"),
    ]);
    let port = sched.create_port_state(1).unwrap();
    assert!(enqueue(&mut sched, port, 1, 100).is_scheduled());

    mock.increment(Duration::from_micros(10));
    assert!(sched.dequeue(port).is_none());
    let state = sched.port(port).unwrap();
    assert!(state.is_empty());
    assert_eq!(state.stats().migration_drops, 1);
    assert!(state.check_invariants());
    assert_eq!(state.backlog(1), 0);
    assert_eq!(sched.pool().outstanding(), 0);
}

#[test]
fn migration_into_mux_marks_congestion() {
    let (mut sched, mock) = scheduler(&[
        ("num_policers", "1"),
        ("ps_1.ecn_th", "1"),
        ("qos_1.next", "1"),
    ]);
    let port = sched.create_port_state(1).unwrap();
    assert!(enqueue(&mut sched, port, 1, 10).is_scheduled());
    assert!(enqueue(&mut sched, port, 1, 10).is_scheduled());
    // Stage queues never mark.
    assert_eq!(sched.port(port).unwrap().stats().ecn_marked, 0);

    mock.increment(Duration::from_micros(10));
    let first = sched.dequeue(port).unwrap();
    let second = sched.dequeue(port).unwrap();
    assert!(!first.is_congestion_marked());
    assert!(second.is_congestion_marked());

    let stats = sched.port(port).unwrap().stats();
    assert_eq!(stats.migrated, 2);
    assert_eq!(stats.ecn_marked, 1);
}

#[test]
fn stage_without_credit_holds_pdus() {
    let (mut sched, mock) = scheduler(&[
        ("num_policers", "1"),
        ("ps_1.gain_us", "1"),
        ("qos_1.next", "1"),
    ]);
    let port = sched.create_port_state(1).unwrap();
    for _ in 0..3 {
        assert!(enqueue(&mut sched, port, 1, 100).is_scheduled());
    }

    // 50 credit releases one 100-cost PDU and leaves the stage in debt.
    mock.increment(Duration::from_micros(50));
    assert!(sched.dequeue(port).is_some());
    let state = sched.port(port).unwrap();
    assert_eq!(state.stage_len(0), 2);
    assert_eq!(state.stage_credit(0), -50);

    mock.increment(Duration::from_micros(20));
    assert!(sched.dequeue(port).is_none());
    assert_eq!(sched.port(port).unwrap().stage_len(0), 2);
}

#[test]
fn stage_exit_respects_mux_threshold() {
    let (mut sched, mock) = scheduler(&[
        ("num_policers", "1"),
        ("ps_1.cherish_th", "1"),
        ("qos_1.next", "1"),
    ]);
    let port = sched.create_port_state(1).unwrap();
    assert!(enqueue(&mut sched, port, 1, 10).is_scheduled());
    assert!(enqueue(&mut sched, port, 1, 10).is_scheduled());

    // Both leave the stage in one cycle; the mux takes one, the second
    // finds the mux at its threshold.
    mock.increment(Duration::from_micros(10));
    assert!(sched.dequeue(port).is_some());
    let stats = *sched.port(port).unwrap().stats();
    assert_eq!(stats.migrated, 1);
    assert_eq!(stats.migration_drops, 1);
    assert!(sched.port(port).unwrap().is_empty());
}

// ─── Per-QoS early drop ─────────────────────────────────────────────────────

#[test]
fn backlog_limit_follows_queued_bytes() {
    let (mut sched, _mock) = scheduler(&[("qos_1.max_backlog", "1500")]);
    let port = sched.create_port_state(1).unwrap();

    assert!(enqueue(&mut sched, port, 1, 1000).is_scheduled());
    assert_eq!(
        enqueue(&mut sched, port, 1, 600),
        Verdict::Dropped(DropReason::BacklogLimit {
            qos_id: 1,
            limit: 1500
        })
    );
    assert!(enqueue(&mut sched, port, 1, 500).is_scheduled());
    assert!(enqueue(&mut sched, port, 2, 5000).is_scheduled());
    assert_eq!(sched.port(port).unwrap().backlog(1), 1500);

    assert_eq!(sched.dequeue(port).map(|p| p.payload.len()), Some(1000));
    assert_eq!(sched.port(port).unwrap().backlog(1), 500);
    assert!(enqueue(&mut sched, port, 1, 1000).is_scheduled());
    assert_eq!(sched.port(port).unwrap().stats().congestion_drops, 1);
}

#[test]
fn early_drop_between_class_and_absolute_threshold() {
    let (mut sched, _mock) = scheduler(&[
        ("qos_1.cherish_th", "1"),
        ("qos_1.abs_th", "3"),
        ("qos_1.drop_prob", "100"),
    ]);
    let port = sched.create_port_state(1).unwrap();

    assert!(enqueue(&mut sched, port, 1, 10).is_scheduled());
    assert_eq!(
        enqueue(&mut sched, port, 1, 10),
        Verdict::Dropped(DropReason::EarlyDrop {
            urgency: 0,
            cherish: 0,
            probability: 100
        })
    );

    sched.set_parameter("qos_1.drop_prob", "0").unwrap();
    assert!(enqueue(&mut sched, port, 1, 10).is_scheduled());
    assert!(enqueue(&mut sched, port, 1, 10).is_scheduled());
    assert_eq!(
        enqueue(&mut sched, port, 1, 10),
        Verdict::Dropped(DropReason::AbsoluteThreshold {
            urgency: 0,
            cherish: 0,
            limit: 3
        })
    );
    assert_eq!(sched.port(port).unwrap().stats().congestion_drops, 2);
}

#[test]
fn early_drop_is_reproducible_per_seed() {
    let run = |seed: u64| {
        let (mut sched, _mock) = scheduler(&[
            ("qos_1.cherish_th", "0"),
            ("qos_1.abs_th", "90"),
            ("qos_1.drop_prob", "50"),
        ]);
        sched.reseed(seed);
        let port = sched.create_port_state(1).unwrap();
        (0..40)
            .map(|_| enqueue(&mut sched, port, 1, 10).is_scheduled())
            .collect::<Vec<bool>>()
    };

    let a = run(42);
    assert_eq!(a, run(42));
    assert!(a.iter().any(|&admitted| admitted));
    assert!(a.iter().any(|&admitted| !admitted));
}

// ─── Port lifecycle ─────────────────────────────────────────────────────────

#[test]
fn create_is_idempotent() {
    let (mut sched, _mock) = scheduler(&[]);
    let a = sched.create_port_state(9).unwrap();
    assert!(enqueue(&mut sched, a, 0, 10).is_scheduled());
    let b = sched.create_port_state(9).unwrap();
    assert_eq!(a, b);
    assert_eq!(sched.port_count(), 1);
    assert_eq!(sched.port(b).unwrap().count(), 1);
    assert_eq!(sched.port_handle(9), Some(a));
}

#[test]
fn structural_parameters_freeze_after_first_port() {
    let (mut sched, _mock) = scheduler(&[]);
    sched.set_parameter("levels_urgency", "2").unwrap();
    sched.create_port_state(1).unwrap();
    assert!(matches!(
        sched.set_parameter("levels_urgency", "3"),
        Err(SchedError::Config(_))
    ));
    sched.set_parameter("max_count", "5").unwrap();
    assert_eq!(sched.config().snapshot().max_count, 5);
    assert_eq!(sched.config().snapshot().topology.urgency_levels, 2);
}

#[test]
fn teardown_destroys_queued_pdus_and_recycles_entries() {
    let (mut sched, _mock) = scheduler(&[("num_policers", "1"), ("qos_1.next", "1")]);
    let port = sched.create_port_state(1).unwrap();
    assert!(enqueue(&mut sched, port, 0, 10).is_scheduled());
    assert!(enqueue(&mut sched, port, 1, 10).is_scheduled());
    assert_eq!(sched.pool().outstanding(), 2);

    assert_eq!(sched.destroy_port_state(port), Ok(2));
    assert_eq!(sched.pool().outstanding(), 0);
    assert_eq!(sched.pool().free_len(), 2);
    assert_eq!(sched.destroy_port_state(port), Err(SchedError::UnknownPort(port)));
}

#[test]
fn stale_handle_is_invalid_input() {
    let (mut sched, _mock) = scheduler(&[]);
    let port = sched.create_port_state(1).unwrap();
    sched.destroy_port_state(port).unwrap();

    assert_eq!(
        sched.enqueue(port, Packet::zeroed(0, 1)),
        Err(SchedError::UnknownPort(port))
    );
    assert!(sched.dequeue(port).is_none());
    assert_eq!(sched.pool().outstanding(), 0);
}

#[test]
fn shutdown_clears_ports_and_pool() {
    let (mut sched, _mock) = scheduler(&[]);
    for id in 0..3 {
        let port = sched.create_port_state(id).unwrap();
        assert!(enqueue(&mut sched, port, 0, 10).is_scheduled());
    }
    assert_eq!(sched.shutdown(), 3);
    assert_eq!(sched.port_count(), 0);
    assert_eq!(sched.pool().free_len(), 0);
}

// ─── Entry pool ─────────────────────────────────────────────────────────────

#[test]
fn pool_exhaustion_drops_after_admission() {
    let (mut sched, _mock) = scheduler(&[]);
    sched.set_parameter("pool_capacity", "1").unwrap();
    let port = sched.create_port_state(1).unwrap();

    assert!(enqueue(&mut sched, port, 0, 10).is_scheduled());
    assert_eq!(
        enqueue(&mut sched, port, 0, 10),
        Verdict::Dropped(DropReason::PoolExhausted)
    );
    let stats = sched.port(port).unwrap().stats();
    assert_eq!(stats.pool_drops, 1);
    assert_eq!(stats.congestion_drops, 0);

    assert!(sched.dequeue(port).is_some());
    assert!(enqueue(&mut sched, port, 0, 10).is_scheduled());
}

#[test]
fn shared_pool_serves_every_port() {
    let (mut sched, _mock) = scheduler(&[]);
    sched.set_parameter("init_buffer", "4").unwrap();
    assert_eq!(sched.pool().free_len(), 4);

    let a = sched.create_port_state(1).unwrap();
    let b = sched.create_port_state(2).unwrap();
    assert!(enqueue(&mut sched, a, 0, 10).is_scheduled());
    assert!(enqueue(&mut sched, b, 0, 10).is_scheduled());
    assert_eq!(sched.pool().outstanding(), 2);
    assert_eq!(sched.pool().free_len(), 2);
}

#[test]
fn oversized_prealloc_is_rejected() {
    let (sched, _mock) = scheduler(&[("pool_capacity", "8")]);
    assert!(matches!(
        sched.set_parameter("init_buffer", "9"),
        Err(SchedError::Config(ConfigError::PreallocTooLarge {
            requested: 9,
            limit: 8
        }))
    ));
    assert!(matches!(
        sched.set_parameter("add_buffer", "1000000000000"),
        Err(SchedError::Config(ConfigError::PreallocTooLarge { .. }))
    ));
    assert_eq!(sched.pool().free_len(), 0);

    sched.set_parameter("init_buffer", "8").unwrap();
    assert_eq!(sched.pool().free_len(), 8);
}

// ─── Construction ───────────────────────────────────────────────────────────

#[test]
fn new_scheduler_prefills_pool_from_config() {
    let mut cfg = SchedConfig::new(Topology::shaper(1, 2));
    cfg.pool.prealloc = 6;
    cfg.pool.capacity = Some(6);
    let sched: QosScheduler<Packet> = QosScheduler::new(cfg.clone()).unwrap();
    assert_eq!(sched.pool().free_len(), 6);
    assert_eq!(sched.pool().capacity(), Some(6));

    cfg.pool.prealloc = 7;
    assert!(matches!(
        QosScheduler::<Packet>::new(cfg),
        Err(SchedError::Config(ConfigError::PreallocTooLarge { .. }))
    ));
}

#[test]
fn mis_sized_config_fails_construction() {
    let mut cfg = SchedConfig::new(Topology::matrix(3, 2));
    cfg.urgency_credit.truncate(2);
    assert!(matches!(
        QosScheduler::<Packet>::new(cfg),
        Err(SchedError::Config(ConfigError::ShapeMismatch {
            what: "urgency_credit",
            expected: 3,
            found: 2
        }))
    ));
}

#[test]
fn invalid_pairs_fail_construction() {
    let result: Result<QosScheduler<Packet>, _> =
        QosScheduler::from_params([("qos_1.next", "3")]);
    assert!(matches!(result, Err(SchedError::Config(_))));

    let result: Result<QosScheduler<Packet>, _> = QosScheduler::from_params([
        ("num_policers", "2"),
        ("ps_1.next", "2"),
        ("ps_2.next", "1"),
    ]);
    assert!(matches!(
        result,
        Err(SchedError::Config(ConfigError::ForwardCycle(1)))
    ));
}
