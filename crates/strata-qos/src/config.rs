//! # Scheduler Configuration
//!
//! One [`SchedConfig`] is shared by every port of a scheduler. It lives in a
//! [`ConfigStore`], which publishes immutable snapshots through `arc-swap`:
//! the data path loads a snapshot per call and never holds a lock across the
//! credit computation, while writers serialise on a mutex, validate a copy,
//! and swap it in. A rejected change leaves the published snapshot untouched.
//!
//! Structural parameters (level counts, stage count, credit gating) size
//! per-port arrays and are frozen once the first port instance exists.
//! Thresholds and credit parameters stay mutable and take effect on the next
//! enqueue or dequeue; costs of already-queued PDUs are not recomputed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use arc_swap::ArcSwap;
use serde::Deserialize;
use tracing::info;

use crate::error::ConfigError;
use crate::param::{CherishField, LevelField, Param, QosField, StageField};
use crate::pdu::QosId;
use crate::pool::MAX_PREALLOC;
use crate::qos::{QosMap, QosRule};
use crate::util::lock_or_recover;

// ─── Topology ────────────────────────────────────────────────────────────────

/// Queue topology of every port instance.
///
/// The mux holds `urgency_levels × cherish_levels` queues, row-major by
/// urgency. `stages` policer/shapers sit in front of it. With `credit_gate`
/// the mux only serves levels that hold positive urgency and cherish credit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Topology {
    pub urgency_levels: u8,
    pub cherish_levels: u8,
    pub stages: u8,
    pub credit_gate: bool,
}

impl Topology {
    /// Single bounded FIFO.
    pub fn fifo() -> Self {
        Topology {
            urgency_levels: 1,
            cherish_levels: 1,
            stages: 0,
            credit_gate: false,
        }
    }

    /// Policer/shaper chain feeding a strict-priority urgency mux.
    pub fn shaper(stages: u8, urgency_levels: u8) -> Self {
        Topology {
            urgency_levels: urgency_levels.max(1),
            cherish_levels: 1,
            stages,
            credit_gate: false,
        }
    }

    /// Urgency × cherish matrix with credit-gated selection.
    pub fn matrix(urgency_levels: u8, cherish_levels: u8) -> Self {
        Topology {
            urgency_levels: urgency_levels.max(1),
            cherish_levels: cherish_levels.max(1),
            stages: 0,
            credit_gate: true,
        }
    }

    pub fn mux_classes(&self) -> usize {
        usize::from(self.urgency_levels) * usize::from(self.cherish_levels)
    }

    pub fn class_index(&self, urgency: u8, cherish: u8) -> usize {
        usize::from(urgency) * usize::from(self.cherish_levels) + usize::from(cherish)
    }

    pub fn last_urgency(&self) -> u8 {
        self.urgency_levels.saturating_sub(1)
    }

    pub fn last_cherish(&self) -> u8 {
        self.cherish_levels.saturating_sub(1)
    }
}

impl Default for Topology {
    fn default() -> Self {
        Self::fifo()
    }
}

// ─── Parameter blocks ────────────────────────────────────────────────────────

/// Credit gain per microsecond and accumulation ceiling of one level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelParams {
    pub gain_us: u64,
    pub max_credit: u64,
}

impl Default for LevelParams {
    fn default() -> Self {
        LevelParams {
            gain_us: 1,
            max_credit: 10_000,
        }
    }
}

impl LevelParams {
    fn set(&mut self, field: LevelField) {
        match field {
            LevelField::GainUs(v) => self.gain_us = v,
            LevelField::MaxCredit(v) => self.max_credit = v,
        }
    }
}

/// Where a PDU goes next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Forward {
    #[default]
    Mux,
    /// 0-based policer/shaper index.
    Stage(u8),
}

/// One policer/shaper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageParams {
    pub max_count: u16,
    pub credit: LevelParams,
    pub next: Forward,
    /// Mux class for PDUs leaving toward the mux; `None` = last level.
    pub urgency: Option<u8>,
    pub cherish: Option<u8>,
    /// Mux occupancy at which PDUs leaving this stage are dropped.
    pub mux_threshold: u16,
    pub ecn_threshold: u16,
}

impl Default for StageParams {
    fn default() -> Self {
        StageParams {
            max_count: 100,
            credit: LevelParams {
                gain_us: 100,
                max_credit: 100_000,
            },
            next: Forward::Mux,
            urgency: None,
            cherish: None,
            mux_threshold: 10,
            ecn_threshold: 5,
        }
    }
}

/// Entry pool sizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolSettings {
    /// `None` = unbounded.
    pub capacity: Option<usize>,
    /// Entries pre-allocated when a scheduler is built. Never above
    /// `capacity` or [`MAX_PREALLOC`].
    pub prealloc: usize,
}

// ─── SchedConfig ─────────────────────────────────────────────────────────────

/// Shared scheduler configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedConfig {
    pub topology: Topology,
    /// Port-wide occupancy ceiling.
    pub max_count: u16,
    /// Mux-wide occupancy ceiling.
    pub mux_max_count: u16,
    /// ECN threshold for PDUs entering the mux directly.
    pub ecn_threshold: u16,
    pub header_weight: u32,
    pub byte_cost: u32,
    pub urgency_credit: Vec<LevelParams>,
    pub cherish_credit: Vec<LevelParams>,
    /// Mux admission threshold per cherish level.
    pub cherish_threshold: Vec<u16>,
    pub stages: Vec<StageParams>,
    pub qos_map: QosMap,
    pub pool: PoolSettings,
}

impl Default for SchedConfig {
    fn default() -> Self {
        Self::new(Topology::fifo())
    }
}

impl SchedConfig {
    /// Defaults sized for `topology`.
    pub fn new(topology: Topology) -> Self {
        SchedConfig {
            topology,
            max_count: 100,
            mux_max_count: 100,
            ecn_threshold: 50,
            header_weight: 0,
            byte_cost: 1,
            urgency_credit: vec![LevelParams::default(); usize::from(topology.urgency_levels)],
            cherish_credit: vec![LevelParams::default(); usize::from(topology.cherish_levels)],
            cherish_threshold: vec![100; usize::from(topology.cherish_levels)],
            stages: vec![StageParams::default(); usize::from(topology.stages)],
            qos_map: QosMap::default(),
            pool: PoolSettings::default(),
        }
    }

    /// Queuing cost of a PDU of `len` bytes.
    pub fn cost_of(&self, len: usize) -> u64 {
        let len = u64::try_from(len).unwrap_or(u64::MAX);
        len.saturating_add(u64::from(self.header_weight))
            .saturating_mul(u64::from(self.byte_cost))
    }

    pub fn stage(&self, stage: usize) -> Option<&StageParams> {
        self.stages.get(stage)
    }

    /// Apply one parameter in place. `frozen` forbids structural changes.
    ///
    /// On error `self` may be partially modified; [`ConfigStore`] only ever
    /// applies to a private copy.
    pub fn apply(&mut self, param: Param, frozen: bool) -> Result<(), ConfigError> {
        if let Some(name) = param.structural_name() {
            if frozen {
                return Err(ConfigError::ReconfigurationForbidden(name));
            }
        }

        match param {
            Param::UrgencyLevels(n) => {
                if n == 0 {
                    return Err(ConfigError::ZeroLevels("urgency"));
                }
                self.topology.urgency_levels = n;
                self.urgency_credit
                    .resize(usize::from(n), LevelParams::default());
            }
            Param::CherishLevels(n) => {
                if n == 0 {
                    return Err(ConfigError::ZeroLevels("cherish"));
                }
                self.topology.cherish_levels = n;
                self.cherish_credit
                    .resize(usize::from(n), LevelParams::default());
                self.cherish_threshold.resize(usize::from(n), 100);
            }
            Param::Stages(n) => {
                self.topology.stages = n;
                self.stages.resize(usize::from(n), StageParams::default());
            }
            Param::CreditGate(on) => self.topology.credit_gate = on,
            Param::MaxCount(v) => self.max_count = v,
            Param::MuxMaxCount(v) => self.mux_max_count = v,
            Param::EcnThreshold(v) => self.ecn_threshold = v,
            Param::HeaderWeight(v) => self.header_weight = v,
            Param::ByteCost(v) => self.byte_cost = v,
            Param::PoolCapacity(cap) => {
                self.pool.capacity = cap;
                if let Some(cap) = cap {
                    self.pool.prealloc = self.pool.prealloc.min(cap);
                }
            }
            Param::PoolPrealloc(n) => self.pool.prealloc = self.pool.prealloc.saturating_add(n),
            Param::Urgency { level, field } => {
                let levels = self.topology.urgency_levels;
                self.urgency_credit
                    .get_mut(usize::from(level))
                    .ok_or(ConfigError::LevelOutOfRange {
                        dimension: "urgency",
                        level,
                        levels,
                    })?
                    .set(field);
            }
            Param::Cherish { level, field } => {
                let levels = self.topology.cherish_levels;
                let out_of_range = ConfigError::LevelOutOfRange {
                    dimension: "cherish",
                    level,
                    levels,
                };
                let idx = usize::from(level);
                match field {
                    CherishField::Credit(f) => self
                        .cherish_credit
                        .get_mut(idx)
                        .ok_or(out_of_range)?
                        .set(f),
                    CherishField::Threshold(th) => {
                        *self.cherish_threshold.get_mut(idx).ok_or(out_of_range)? = th
                    }
                }
            }
            Param::Stage { stage, field } => self.apply_stage(stage, field)?,
            Param::Qos { qos_id, field } => self.apply_qos(qos_id, field)?,
        }

        self.validate()
    }

    fn apply_stage(&mut self, stage: u8, field: StageField) -> Result<(), ConfigError> {
        let stages = self.topology.stages;
        if stage == 0 || stage > stages {
            return Err(ConfigError::StageOutOfRange { stage, stages });
        }
        let next = match field {
            StageField::Next(k) => Some(self.forward_target(k)?),
            _ => None,
        };
        self.check_class_field(field)?;

        let params = &mut self.stages[usize::from(stage - 1)];
        match field {
            StageField::MaxCount(v) => params.max_count = v,
            StageField::Credit(f) => params.credit.set(f),
            StageField::Next(_) => {
                if let Some(next) = next {
                    if next == Forward::Stage(stage - 1) {
                        return Err(ConfigError::SelfForward(stage));
                    }
                    params.next = next;
                }
            }
            StageField::Urgency(u) => params.urgency = Some(u),
            StageField::Cherish(c) => params.cherish = Some(c),
            StageField::MuxThreshold(v) => params.mux_threshold = v,
            StageField::EcnThreshold(v) => params.ecn_threshold = v,
        }
        Ok(())
    }

    fn check_class_field(&self, field: StageField) -> Result<(), ConfigError> {
        match field {
            StageField::Urgency(u) => self.check_level("urgency", u),
            StageField::Cherish(c) => self.check_level("cherish", c),
            _ => Ok(()),
        }
    }

    fn apply_qos(&mut self, qos_id: QosId, field: QosField) -> Result<(), ConfigError> {
        let next = match field {
            QosField::Next(k) => Some(self.forward_target(k)?),
            QosField::Urgency(u) => {
                self.check_level("urgency", u)?;
                None
            }
            QosField::Cherish(c) => {
                self.check_level("cherish", c)?;
                None
            }
            _ => None,
        };

        let rule = self.qos_map.upsert(qos_id);
        match field {
            QosField::Next(_) => rule.next = next.unwrap_or_default(),
            QosField::Urgency(u) => rule.urgency = Some(u),
            QosField::Cherish(c) => rule.cherish = Some(c),
            QosField::MuxThreshold(v) => rule.mux_threshold = Some(v),
            QosField::EcnThreshold(v) => rule.ecn_threshold = Some(v),
            QosField::MaxBacklog(v) => rule.max_backlog = (v > 0).then_some(v),
            QosField::AbsThreshold(v) => rule.abs_threshold = (v > 0).then_some(v),
            QosField::DropProb(p) => rule.drop_prob = p,
        }
        Ok(())
    }

    /// Translate a textual `next` (0 = mux, k = stage k) into a target.
    fn forward_target(&self, k: u8) -> Result<Forward, ConfigError> {
        match k {
            0 => Ok(Forward::Mux),
            k if k <= self.topology.stages => Ok(Forward::Stage(k - 1)),
            k => Err(ConfigError::StageOutOfRange {
                stage: k,
                stages: self.topology.stages,
            }),
        }
    }

    fn check_level(&self, dimension: &'static str, level: u8) -> Result<(), ConfigError> {
        let levels = match dimension {
            "urgency" => self.topology.urgency_levels,
            _ => self.topology.cherish_levels,
        };
        if level < levels {
            Ok(())
        } else {
            Err(ConfigError::LevelOutOfRange {
                dimension,
                level,
                levels,
            })
        }
    }

    fn check_forward(&self, next: Forward) -> Result<(), ConfigError> {
        match next {
            Forward::Mux => Ok(()),
            Forward::Stage(s) if s < self.topology.stages => Ok(()),
            Forward::Stage(s) => Err(ConfigError::StageOutOfRange {
                stage: s.saturating_add(1),
                stages: self.topology.stages,
            }),
        }
    }

    /// Stage `start` must reach the mux within `stages` hops.
    fn check_acyclic(&self) -> Result<(), ConfigError> {
        for start in 0..self.stages.len() {
            let mut at = start;
            let mut hops = 0;
            while let Some(Forward::Stage(next)) = self.stages.get(at).map(|s| s.next) {
                hops += 1;
                if hops > self.stages.len() {
                    return Err(ConfigError::ForwardCycle(start as u8 + 1));
                }
                at = usize::from(next);
            }
        }
        Ok(())
    }

    /// Check array lengths and every cross-reference against the topology.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let t = &self.topology;
        if t.urgency_levels == 0 {
            return Err(ConfigError::ZeroLevels("urgency"));
        }
        if t.cherish_levels == 0 {
            return Err(ConfigError::ZeroLevels("cherish"));
        }
        let shapes = [
            ("urgency_credit", t.urgency_levels, self.urgency_credit.len()),
            ("cherish_credit", t.cherish_levels, self.cherish_credit.len()),
            ("cherish_threshold", t.cherish_levels, self.cherish_threshold.len()),
            ("stages", t.stages, self.stages.len()),
        ];
        for (what, expected, found) in shapes {
            let expected = usize::from(expected);
            if found != expected {
                return Err(ConfigError::ShapeMismatch {
                    what,
                    expected,
                    found,
                });
            }
        }
        let limit = self
            .pool
            .capacity
            .map_or(MAX_PREALLOC, |cap| cap.min(MAX_PREALLOC));
        if self.pool.prealloc > limit {
            return Err(ConfigError::PreallocTooLarge {
                requested: self.pool.prealloc,
                limit,
            });
        }

        for (idx, stage) in self.stages.iter().enumerate() {
            self.check_forward(stage.next)?;
            if stage.next == Forward::Stage(idx as u8) {
                return Err(ConfigError::SelfForward(idx as u8 + 1));
            }
            if let Some(u) = stage.urgency {
                self.check_level("urgency", u)?;
            }
            if let Some(c) = stage.cherish {
                self.check_level("cherish", c)?;
            }
        }

        self.check_acyclic()?;

        for rule in self.qos_map.rules() {
            if rule.drop_prob > 100 {
                return Err(ConfigError::DropProbability(rule.drop_prob));
            }
            self.check_forward(rule.next)?;
            if let Some(u) = rule.urgency {
                self.check_level("urgency", u)?;
            }
            if let Some(c) = rule.cherish {
                self.check_level("cherish", c)?;
            }
        }
        Ok(())
    }

    /// Parse a TOML document into a validated configuration.
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        if input.trim().is_empty() {
            return Ok(SchedConfig::default());
        }
        let parsed: SchedConfigInput =
            toml::from_str(input).map_err(|e| ConfigError::Toml(e.to_string()))?;
        parsed.resolve()
    }
}

// ─── TOML input ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SchedConfigInput {
    pub urgency_levels: Option<u8>,
    pub cherish_levels: Option<u8>,
    pub credit_gate: bool,
    pub max_count: Option<u16>,
    pub max_mux_count: Option<u16>,
    pub ecn_th: Option<u16>,
    pub header_weight: Option<u32>,
    pub bytecost: Option<u32>,
    pub pool: PoolInput,
    pub urgency: Vec<LevelInput>,
    pub cherish: Vec<CherishInput>,
    pub stages: Vec<StageInput>,
    pub qos: Vec<QosInput>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PoolInput {
    /// 0 or absent = unbounded.
    pub capacity: Option<usize>,
    pub prealloc: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LevelInput {
    pub gain_us: Option<u64>,
    pub max_credit: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CherishInput {
    pub gain_us: Option<u64>,
    pub max_credit: Option<u64>,
    pub threshold: Option<u16>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StageInput {
    pub max_count: Option<u16>,
    pub gain_us: Option<u64>,
    pub max_credit: Option<u64>,
    /// 0 = mux, k = stage k (1-based).
    pub next: u8,
    pub urgency: Option<u8>,
    pub cherish: Option<u8>,
    pub cherish_th: Option<u16>,
    pub ecn_th: Option<u16>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct QosInput {
    pub id: QosId,
    pub next: u8,
    pub urgency: Option<u8>,
    pub cherish: Option<u8>,
    pub cherish_th: Option<u16>,
    pub ecn_th: Option<u16>,
    /// Bytes; 0 or absent = unlimited.
    pub max_backlog: Option<u64>,
    pub abs_th: Option<u16>,
    /// Percent.
    pub drop_prob: u8,
}

fn merge_level(target: &mut LevelParams, gain_us: Option<u64>, max_credit: Option<u64>) {
    if let Some(g) = gain_us {
        target.gain_us = g;
    }
    if let Some(m) = max_credit {
        target.max_credit = m;
    }
}

impl SchedConfigInput {
    pub fn resolve(self) -> Result<SchedConfig, ConfigError> {
        let urgency_levels = self
            .urgency_levels
            .unwrap_or_else(|| self.urgency.len().clamp(1, 255) as u8);
        let cherish_levels = self
            .cherish_levels
            .unwrap_or_else(|| self.cherish.len().clamp(1, 255) as u8);
        if urgency_levels == 0 {
            return Err(ConfigError::ZeroLevels("urgency"));
        }
        if cherish_levels == 0 {
            return Err(ConfigError::ZeroLevels("cherish"));
        }
        let stages = u8::try_from(self.stages.len()).map_err(|_| ConfigError::StageOutOfRange {
            stage: u8::MAX,
            stages: u8::MAX,
        })?;

        let mut cfg = SchedConfig::new(Topology {
            urgency_levels,
            cherish_levels,
            stages,
            credit_gate: self.credit_gate,
        });
        let defaults = SchedConfig::default();
        cfg.max_count = self.max_count.unwrap_or(defaults.max_count);
        cfg.mux_max_count = self.max_mux_count.unwrap_or(defaults.mux_max_count);
        cfg.ecn_threshold = self.ecn_th.unwrap_or(defaults.ecn_threshold);
        cfg.header_weight = self.header_weight.unwrap_or(defaults.header_weight);
        cfg.byte_cost = self.bytecost.unwrap_or(defaults.byte_cost);
        cfg.pool = PoolSettings {
            capacity: self.pool.capacity.filter(|&c| c > 0),
            prealloc: self.pool.prealloc.unwrap_or(0),
        };

        for (level, input) in self.urgency.iter().enumerate() {
            let Some(target) = cfg.urgency_credit.get_mut(level) else {
                return Err(ConfigError::LevelOutOfRange {
                    dimension: "urgency",
                    level: level.min(255) as u8,
                    levels: urgency_levels,
                });
            };
            merge_level(target, input.gain_us, input.max_credit);
        }

        for (level, input) in self.cherish.iter().enumerate() {
            let (Some(credit), Some(threshold)) = (
                cfg.cherish_credit.get_mut(level),
                cfg.cherish_threshold.get_mut(level),
            ) else {
                return Err(ConfigError::LevelOutOfRange {
                    dimension: "cherish",
                    level: level.min(255) as u8,
                    levels: cherish_levels,
                });
            };
            merge_level(credit, input.gain_us, input.max_credit);
            if let Some(th) = input.threshold {
                *threshold = th;
            }
        }

        for (idx, input) in self.stages.iter().enumerate() {
            let next = cfg.forward_target(input.next)?;
            let stage = &mut cfg.stages[idx];
            if let Some(v) = input.max_count {
                stage.max_count = v;
            }
            merge_level(&mut stage.credit, input.gain_us, input.max_credit);
            stage.next = next;
            stage.urgency = input.urgency;
            stage.cherish = input.cherish;
            if let Some(v) = input.cherish_th {
                stage.mux_threshold = v;
            }
            if let Some(v) = input.ecn_th {
                stage.ecn_threshold = v;
            }
        }

        for input in &self.qos {
            let next = cfg.forward_target(input.next)?;
            cfg.qos_map.insert(QosRule {
                qos_id: input.id,
                next,
                urgency: input.urgency,
                cherish: input.cherish,
                mux_threshold: input.cherish_th,
                ecn_threshold: input.ecn_th,
                max_backlog: input.max_backlog.filter(|&b| b > 0),
                abs_threshold: input.abs_th.filter(|&t| t > 0),
                drop_prob: input.drop_prob,
            });
        }

        cfg.validate()?;
        Ok(cfg)
    }
}

// ─── ConfigStore ─────────────────────────────────────────────────────────────

/// Shared, validated configuration with lock-free snapshots.
pub struct ConfigStore {
    current: ArcSwap<SchedConfig>,
    writer: Mutex<()>,
    frozen: AtomicBool,
}

impl ConfigStore {
    pub fn new(config: SchedConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(ConfigStore {
            current: ArcSwap::from_pointee(config),
            writer: Mutex::new(()),
            frozen: AtomicBool::new(false),
        })
    }

    /// Build from ordered `name = value` pairs applied over the defaults.
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut config = SchedConfig::default();
        for (name, value) in pairs {
            let param = Param::parse(name.as_ref(), value.as_ref())?;
            config.apply(param, false)?;
        }
        Self::new(config)
    }

    /// Current configuration. Cheap; never blocks on writers.
    pub fn snapshot(&self) -> Arc<SchedConfig> {
        self.current.load_full()
    }

    /// Parse and apply a textual parameter. Returns the typed parameter.
    pub fn set(&self, name: &str, value: &str) -> Result<Param, ConfigError> {
        let param = Param::parse(name, value)?;
        self.apply(param)?;
        info!(param = name, value, "scheduler parameter set");
        Ok(param)
    }

    /// Apply a typed parameter to a copy and publish it if valid.
    pub fn apply(&self, param: Param) -> Result<(), ConfigError> {
        let _guard = lock_or_recover(&self.writer);
        let mut next = SchedConfig::clone(&self.current.load());
        next.apply(param, self.frozen.load(Ordering::Acquire))?;
        self.current.store(Arc::new(next));
        Ok(())
    }

    /// Forbid further structural changes.
    pub fn freeze(&self) {
        let _guard = lock_or_recover(&self.writer);
        self.frozen.store(true, Ordering::Release);
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen.load(Ordering::Acquire)
    }
}

impl Default for ConfigStore {
    fn default() -> Self {
        ConfigStore {
            current: ArcSwap::from_pointee(SchedConfig::default()),
            writer: Mutex::new(()),
            frozen: AtomicBool::new(false),
        }
    }
}
