//! Admission control.
//!
//! Checks run strictly before insertion, in a fixed order; the first failing
//! check decides the [`DropReason`]. A PDU that passes may still be dropped
//! if the entry pool cannot supply an entry: the cost has to be known before
//! insertion, so pool allocation comes after admission.
//!
//! Order for an arriving PDU: port occupancy, the QoS id's byte backlog, then
//! the stage queue or the mux checks. A mux class with an absolute threshold
//! drops randomly between its class threshold and the absolute one, and
//! always at or above the absolute one.

use std::fmt;

use rand::rngs::StdRng;
use rand::RngExt as _;

use crate::config::SchedConfig;
use crate::pdu::QosId;
use crate::port::PortInstance;
use crate::qos::{ClassTarget, MuxClass};

/// Why a PDU was not queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Port-wide occupancy reached `max_count`.
    PortLimit { limit: u16 },
    /// Mux-wide occupancy reached `max_mux_count`.
    MuxLimit { limit: u16 },
    /// Mux occupancy reached the class admission threshold.
    ClassThreshold { urgency: u8, cherish: u8, limit: u16 },
    /// Policer/shaper queue is full. `stage` is 1-based.
    StageLimit { stage: usize, limit: u16 },
    /// The QoS id already holds `limit` queued bytes in this port.
    BacklogLimit { qos_id: QosId, limit: u64 },
    /// Mux occupancy reached the class's absolute threshold.
    AbsoluteThreshold { urgency: u8, cherish: u8, limit: u16 },
    /// Random early drop above the class threshold.
    EarlyDrop { urgency: u8, cherish: u8, probability: u8 },
    /// No queue entry could be obtained.
    PoolExhausted,
}

impl DropReason {
    /// Occupancy drops, as opposed to resource exhaustion.
    pub fn is_congestion(&self) -> bool {
        !matches!(self, DropReason::PoolExhausted)
    }
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DropReason::PortLimit { limit } => write!(f, "exceeded max_count ({limit})"),
            DropReason::MuxLimit { limit } => write!(f, "exceeded max_mux_count ({limit})"),
            DropReason::ClassThreshold {
                urgency,
                cherish,
                limit,
            } => write!(
                f,
                "exceeded mux threshold of class u{urgency}/c{cherish} ({limit})"
            ),
            DropReason::StageLimit { stage, limit } => {
                write!(f, "exceeded ps_{stage} max_count ({limit})")
            }
            DropReason::BacklogLimit { qos_id, limit } => {
                write!(f, "exceeded max_backlog of qos {qos_id} ({limit} bytes)")
            }
            DropReason::AbsoluteThreshold {
                urgency,
                cherish,
                limit,
            } => write!(
                f,
                "exceeded absolute threshold of class u{urgency}/c{cherish} ({limit})"
            ),
            DropReason::EarlyDrop {
                urgency,
                cherish,
                probability,
            } => write!(
                f,
                "exceeded mux threshold of class u{urgency}/c{cherish}, early drop ({probability}%)"
            ),
            DropReason::PoolExhausted => f.write_str("exceeded entry pool capacity"),
        }
    }
}

/// Admission of a freshly arriving PDU of `bytes` bytes.
pub fn admit<P>(
    port: &PortInstance<P>,
    qos_id: QosId,
    bytes: u64,
    target: &ClassTarget,
    config: &SchedConfig,
    rng: &mut StdRng,
) -> Result<(), DropReason> {
    if port.count() >= usize::from(config.max_count) {
        return Err(DropReason::PortLimit {
            limit: config.max_count,
        });
    }
    let max_backlog = config.qos_map.lookup(qos_id).and_then(|r| r.max_backlog);
    if let Some(limit) = max_backlog {
        if port.backlog(qos_id).saturating_add(bytes) > limit {
            return Err(DropReason::BacklogLimit { qos_id, limit });
        }
    }
    match target {
        ClassTarget::Stage(stage) => admit_stage(port, *stage, config),
        ClassTarget::Mux(class) => admit_mux(port, class, config, rng),
    }
}

/// Admission into a policer/shaper queue (0-based `stage`).
pub fn admit_stage<P>(
    port: &PortInstance<P>,
    stage: usize,
    config: &SchedConfig,
) -> Result<(), DropReason> {
    let limit = config.stage(stage).map_or(0, |s| s.max_count);
    if port.stage_len(stage) >= usize::from(limit) {
        return Err(DropReason::StageLimit {
            stage: stage + 1,
            limit,
        });
    }
    Ok(())
}

/// Admission into the mux.
pub fn admit_mux<P>(
    port: &PortInstance<P>,
    class: &MuxClass,
    config: &SchedConfig,
    rng: &mut StdRng,
) -> Result<(), DropReason> {
    let occupancy = port.mux_count();
    if occupancy >= usize::from(config.mux_max_count) {
        return Err(DropReason::MuxLimit {
            limit: config.mux_max_count,
        });
    }
    let Some(abs) = class.abs_threshold else {
        if occupancy >= usize::from(class.threshold) {
            return Err(DropReason::ClassThreshold {
                urgency: class.urgency,
                cherish: class.cherish,
                limit: class.threshold,
            });
        }
        return Ok(());
    };
    if occupancy >= usize::from(abs) {
        return Err(DropReason::AbsoluteThreshold {
            urgency: class.urgency,
            cherish: class.cherish,
            limit: abs,
        });
    }
    if occupancy >= usize::from(class.threshold) && early_drop(rng, class.drop_prob) {
        return Err(DropReason::EarlyDrop {
            urgency: class.urgency,
            cherish: class.cherish,
            probability: class.drop_prob,
        });
    }
    Ok(())
}

fn early_drop(rng: &mut StdRng, percent: u8) -> bool {
    percent > 0 && rng.random::<f64>() * 100.0 < f64::from(percent)
}
