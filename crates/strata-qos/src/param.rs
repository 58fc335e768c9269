//! Typed parameter schema.
//!
//! Hosts configure the scheduler with textual `name = value` pairs. Every pair
//! is parsed once, at the boundary, into a [`Param`]; nothing downstream
//! dispatches on strings.
//!
//! Global keys have no dot (`max_count`, `levels_urgency`). Per-level and
//! per-stage keys carry a numeric sub-index before the dot:
//!
//! ```text
//! urgency_<level>.gain_us      cherish_<level>.threshold
//! ps_<stage>.next              qos_<qos id>.urgency
//! qos_<qos id>.max_backlog     qos_<qos id>.drop_prob
//! ```
//!
//! Policer/shaper indices are 1-based; `next = 0` means the mux.

use crate::error::ConfigError;
use crate::pdu::QosId;
use crate::pool::MAX_PREALLOC;

/// Credit parameters shared by urgency, cherish and stage levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelField {
    GainUs(u64),
    MaxCredit(u64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CherishField {
    Credit(LevelField),
    Threshold(u16),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageField {
    MaxCount(u16),
    Credit(LevelField),
    /// 0 = mux, k = policer/shaper k.
    Next(u8),
    Urgency(u8),
    Cherish(u8),
    MuxThreshold(u16),
    EcnThreshold(u16),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QosField {
    /// 0 = mux, k = policer/shaper k.
    Next(u8),
    Urgency(u8),
    Cherish(u8),
    MuxThreshold(u16),
    EcnThreshold(u16),
    /// Bytes this id may hold queued in one port; 0 removes the limit.
    MaxBacklog(u64),
    /// Mux occupancy at or above which the id is always dropped.
    AbsThreshold(u16),
    /// Percent chance of dropping between the class threshold and
    /// `AbsThreshold`.
    DropProb(u8),
}

/// One validated-at-parse-time configuration change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Param {
    UrgencyLevels(u8),
    CherishLevels(u8),
    Stages(u8),
    CreditGate(bool),
    MaxCount(u16),
    MuxMaxCount(u16),
    EcnThreshold(u16),
    HeaderWeight(u32),
    ByteCost(u32),
    /// `None` removes the bound.
    PoolCapacity(Option<usize>),
    /// Pre-allocate this many pool entries.
    PoolPrealloc(usize),
    Urgency { level: u8, field: LevelField },
    Cherish { level: u8, field: CherishField },
    /// `stage` is 1-based.
    Stage { stage: u8, field: StageField },
    Qos { qos_id: QosId, field: QosField },
}

impl Param {
    /// Parse a textual pair.
    pub fn parse(name: &str, value: &str) -> Result<Self, ConfigError> {
        let name = name.trim();
        let value = value.trim();

        let Some((head, field)) = name.split_once('.') else {
            return Self::parse_global(name, value);
        };
        let (prefix, index) = head
            .rsplit_once('_')
            .ok_or_else(|| ConfigError::UnknownParameter(name.to_string()))?;

        match prefix {
            "urgency" => Ok(Param::Urgency {
                level: number(name, index)?,
                field: level_field(name, field, value)?,
            }),
            "cherish" => {
                let level = number(name, index)?;
                let field = match field {
                    "threshold" | "th" => CherishField::Threshold(number(name, value)?),
                    _ => CherishField::Credit(level_field(name, field, value)?),
                };
                Ok(Param::Cherish { level, field })
            }
            "ps" => {
                let stage = number(name, index)?;
                let field = match field {
                    "max_count" => StageField::MaxCount(number(name, value)?),
                    "next" | "next_module" => StageField::Next(number(name, value)?),
                    "urgency" => StageField::Urgency(number(name, value)?),
                    "cherish" => StageField::Cherish(number(name, value)?),
                    "cherish_th" => StageField::MuxThreshold(number(name, value)?),
                    "ecn_th" => StageField::EcnThreshold(number(name, value)?),
                    _ => StageField::Credit(level_field(name, field, value)?),
                };
                Ok(Param::Stage { stage, field })
            }
            "qos" => {
                let qos_id = number(name, index)?;
                let field = match field {
                    "next" => QosField::Next(number(name, value)?),
                    "urgency" => QosField::Urgency(number(name, value)?),
                    "cherish" => QosField::Cherish(number(name, value)?),
                    "cherish_th" => QosField::MuxThreshold(number(name, value)?),
                    "ecn_th" => QosField::EcnThreshold(number(name, value)?),
                    "max_backlog" => QosField::MaxBacklog(number(name, value)?),
                    "abs_th" => QosField::AbsThreshold(number(name, value)?),
                    "drop_prob" | "drop-prob" => {
                        let p: u8 = number(name, value)?;
                        if p > 100 {
                            return Err(ConfigError::DropProbability(p));
                        }
                        QosField::DropProb(p)
                    }
                    _ => return Err(ConfigError::UnknownParameter(name.to_string())),
                };
                Ok(Param::Qos { qos_id, field })
            }
            _ => Err(ConfigError::UnknownParameter(name.to_string())),
        }
    }

    fn parse_global(name: &str, value: &str) -> Result<Self, ConfigError> {
        let param = match name {
            "levels_urgency" => Param::UrgencyLevels(number(name, value)?),
            "levels_cherish" => Param::CherishLevels(number(name, value)?),
            "num_policers" => Param::Stages(number(name, value)?),
            "credit_gate" => Param::CreditGate(boolean(name, value)?),
            "max_count" | "max_global_count" => Param::MaxCount(number(name, value)?),
            "max_mux_count" => Param::MuxMaxCount(number(name, value)?),
            "ecn_th" => Param::EcnThreshold(number(name, value)?),
            "header_weight" => Param::HeaderWeight(number(name, value)?),
            "bytecost" => Param::ByteCost(number(name, value)?),
            "pool_capacity" => {
                let cap: usize = number(name, value)?;
                Param::PoolCapacity((cap > 0).then_some(cap))
            }
            "init_buffer" | "add_buffer" => {
                let count: usize = number(name, value)?;
                if count > MAX_PREALLOC {
                    return Err(ConfigError::PreallocTooLarge {
                        requested: count,
                        limit: MAX_PREALLOC,
                    });
                }
                Param::PoolPrealloc(count)
            }
            _ => return Err(ConfigError::UnknownParameter(name.to_string())),
        };
        Ok(param)
    }

    /// Parameters that size per-port arrays; frozen once a port exists.
    pub fn structural_name(&self) -> Option<&'static str> {
        match self {
            Param::UrgencyLevels(_) => Some("levels_urgency"),
            Param::CherishLevels(_) => Some("levels_cherish"),
            Param::Stages(_) => Some("num_policers"),
            Param::CreditGate(_) => Some("credit_gate"),
            _ => None,
        }
    }
}

fn invalid(name: &str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        name: name.to_string(),
        value: value.to_string(),
    }
}

fn number<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| invalid(name, value))
}

fn boolean(name: &str, value: &str) -> Result<bool, ConfigError> {
    match value {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(invalid(name, value)),
    }
}

fn level_field(name: &str, field: &str, value: &str) -> Result<LevelField, ConfigError> {
    match field {
        "gain_us" => Ok(LevelField::GainUs(number(name, value)?)),
        "max_credit" | "max_credits" => Ok(LevelField::MaxCredit(number(name, value)?)),
        _ => Err(ConfigError::UnknownParameter(name.to_string())),
    }
}
