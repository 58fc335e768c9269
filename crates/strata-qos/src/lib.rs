//! # strata-qos
//!
//! Per-port QoS scheduling engine for the Strata relay data plane.
//!
//! For every outbound port the engine decides, per enqueued PDU, whether to
//! admit or drop it, which internal queue it occupies, and in what order queued
//! PDUs are released downstream. One engine covers three queue topologies:
//! a plain bounded FIFO, a policer/shaper chain feeding an urgency mux, and an
//! urgency × cherish matrix gated by waterfall credit borrowing.
//!
//! ## Crate structure
//!
//! - [`pdu`] — PDU contract consumed from the host, plus a concrete [`pdu::Packet`]
//! - [`pool`] — Shared queue-entry pool
//! - [`qos`] — QoS map and classifier
//! - [`admission`] — Occupancy ceilings, per-QoS backlog, early drop, drop reasons
//! - [`credit`] — Credit ledgers (gain / spend / overflow) and replenishment clock
//! - [`ecn`] — Explicit congestion marking
//! - [`port`] — Per-port scheduling state and the port registry
//! - [`scheduler`] — Enqueue, stage migration, mux selection
//! - [`config`] — Shared configuration store and TOML input
//! - [`param`] — Typed parameter schema for `name = value` pairs
//! - [`stats`] — Per-port decision counters

pub mod admission;
pub mod config;
pub mod credit;
pub mod ecn;
pub mod error;
pub mod param;
pub mod pdu;
pub mod pool;
pub mod port;
pub mod qos;
pub mod scheduler;
pub mod stats;

mod util;

pub use config::{ConfigStore, SchedConfig, Topology};
pub use error::{ConfigError, PoolError, SchedError};
pub use pdu::{Packet, Pdu, QosId};
pub use port::{PortHandle, PortId};
pub use scheduler::{QosScheduler, Verdict};
