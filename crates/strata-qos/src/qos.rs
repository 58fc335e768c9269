//! QoS classification.
//!
//! Maps a PDU's QoS id to the place it enters the port: a policer/shaper
//! stage or a mux class. Ids without a rule take the best-effort default, the
//! last (laxest) urgency and cherish level, straight into the mux.

use crate::config::{Forward, SchedConfig};
use crate::pdu::QosId;

/// Per-QoS-id routing. Unset fields fall back to the global defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QosRule {
    pub qos_id: QosId,
    pub next: Forward,
    pub urgency: Option<u8>,
    pub cherish: Option<u8>,
    /// Overrides the cherish-level admission threshold.
    pub mux_threshold: Option<u16>,
    pub ecn_threshold: Option<u16>,
    /// Queued bytes this id may hold in one port.
    pub max_backlog: Option<u64>,
    /// Hard mux occupancy ceiling; enables early drop below it.
    pub abs_threshold: Option<u16>,
    /// Early-drop chance in percent.
    pub drop_prob: u8,
}

impl QosRule {
    pub fn new(qos_id: QosId) -> Self {
        QosRule {
            qos_id,
            ..QosRule::default()
        }
    }
}

/// Ordered list of [`QosRule`]s.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct QosMap {
    rules: Vec<QosRule>,
}

impl QosMap {
    /// Rule for `qos_id`. When several rules share an id the latest wins.
    pub fn lookup(&self, qos_id: QosId) -> Option<&QosRule> {
        self.rules.iter().rev().find(|r| r.qos_id == qos_id)
    }

    /// Rule for `qos_id`, created with defaults if absent.
    pub fn upsert(&mut self, qos_id: QosId) -> &mut QosRule {
        let idx = match self.rules.iter().rposition(|r| r.qos_id == qos_id) {
            Some(idx) => idx,
            None => {
                self.rules.push(QosRule::new(qos_id));
                self.rules.len() - 1
            }
        };
        &mut self.rules[idx]
    }

    /// Replace any rule with the same id.
    pub fn insert(&mut self, rule: QosRule) {
        *self.upsert(rule.qos_id) = rule;
    }

    pub fn rules(&self) -> &[QosRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// A mux queue plus the thresholds that govern entry into it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MuxClass {
    pub urgency: u8,
    pub cherish: u8,
    /// Mux occupancy at or above which the PDU is dropped.
    pub threshold: u16,
    /// Class queue length above which the PDU is ECN-marked.
    pub ecn_threshold: u16,
    /// With an absolute threshold, occupancy between `threshold` and it
    /// drops with `drop_prob` percent chance instead of always.
    pub abs_threshold: Option<u16>,
    pub drop_prob: u8,
}

/// Where an arriving PDU is queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassTarget {
    /// 0-based stage index.
    Stage(usize),
    Mux(MuxClass),
}

fn mux_class(
    config: &SchedConfig,
    urgency: Option<u8>,
    cherish: Option<u8>,
    threshold: Option<u16>,
    ecn_threshold: u16,
) -> MuxClass {
    let t = &config.topology;
    let urgency = urgency.unwrap_or(t.last_urgency()).min(t.last_urgency());
    let cherish = cherish.unwrap_or(t.last_cherish()).min(t.last_cherish());
    let threshold = threshold.unwrap_or_else(|| {
        config
            .cherish_threshold
            .get(usize::from(cherish))
            .copied()
            .unwrap_or(config.mux_max_count)
    });
    MuxClass {
        urgency,
        cherish,
        threshold,
        ecn_threshold,
        abs_threshold: None,
        drop_prob: 0,
    }
}

/// Classify an arriving PDU.
pub fn classify(config: &SchedConfig, qos_id: QosId) -> ClassTarget {
    let Some(rule) = config.qos_map.lookup(qos_id) else {
        return ClassTarget::Mux(mux_class(config, None, None, None, config.ecn_threshold));
    };
    match rule.next {
        Forward::Stage(s) if usize::from(s) < config.stages.len() => ClassTarget::Stage(usize::from(s)),
        _ => ClassTarget::Mux(MuxClass {
            abs_threshold: rule.abs_threshold,
            drop_prob: rule.drop_prob,
            ..mux_class(
                config,
                rule.urgency,
                rule.cherish,
                rule.mux_threshold,
                rule.ecn_threshold.unwrap_or(config.ecn_threshold),
            )
        }),
    }
}

/// Mux class for PDUs leaving `stage` toward the mux.
pub fn stage_exit_class(config: &SchedConfig, stage: usize) -> Option<MuxClass> {
    let params = config.stage(stage)?;
    Some(mux_class(
        config,
        params.urgency,
        params.cherish,
        Some(params.mux_threshold),
        params.ecn_threshold,
    ))
}
