//! Error taxonomy.
//!
//! Congestion drops are not errors: they surface as
//! [`Verdict::Dropped`](crate::scheduler::Verdict::Dropped) so hosts can treat
//! them as ordinary backpressure. The types here cover invalid input, resource
//! exhaustion inside the pool, and rejected configuration.

use thiserror::Error;

use crate::port::PortHandle;

// ── Configuration ───────────────────────────────────────────────────

/// A parameter was rejected. The prior configuration is left unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("unknown parameter \"{0}\"")]
    UnknownParameter(String),
    #[error("invalid value \"{value}\" for parameter {name}")]
    InvalidValue { name: String, value: String },
    #[error("{0} cannot be reconfigured after the first port instance exists")]
    ReconfigurationForbidden(&'static str),
    #[error("at least one {0} level is required")]
    ZeroLevels(&'static str),
    #[error("{dimension} level {level} out of range ({levels} levels configured)")]
    LevelOutOfRange {
        dimension: &'static str,
        level: u8,
        levels: u8,
    },
    #[error("policer/shaper {stage} out of range ({stages} configured)")]
    StageOutOfRange { stage: u8, stages: u8 },
    #[error("policer/shaper {0} cannot forward to itself")]
    SelfForward(u8),
    #[error("policer/shaper {0} forwards into a cycle")]
    ForwardCycle(u8),
    #[error("{what} holds {found} entries but the topology needs {expected}")]
    ShapeMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },
    #[error("cannot pre-allocate {requested} pool entries (limit {limit})")]
    PreallocTooLarge { requested: usize, limit: usize },
    #[error("drop probability {0}% out of range (0-100)")]
    DropProbability(u8),
    #[error("invalid config TOML: {0}")]
    Toml(String),
}

// ── Entry pool ──────────────────────────────────────────────────────

/// The pool had no free entry and a fresh one could not be allocated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PoolError {
    #[error("entry pool exhausted ({outstanding} entries in use, capacity {capacity})")]
    Exhausted { outstanding: usize, capacity: usize },
}

// ── Scheduler ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedError {
    /// The handle names no live port instance (never created, or destroyed).
    #[error("unknown or stale port handle {0}")]
    UnknownPort(PortHandle),
    #[error(transparent)]
    Config(#[from] ConfigError),
}
