//! # Credit Engine
//!
//! Each port keeps one [`CreditLedger`] per independent credit dimension
//! (urgency levels, cherish levels, and one single-level ledger per
//! policer/shaper). Balances are signed: a level may run into debt when it
//! releases a PDU costing more than the credit it can reach.
//!
//! ## Waterfall
//!
//! ```text
//!   level 0 (strictest)   surplus over max ──┐        ▲ gain of laxer levels
//!   level 1                                  ▼ ...    │ repays stricter debt
//!   level L-1 (laxest)    surplus discarded           │ before crediting itself
//! ```
//!
//! - **gain**: levels are processed from last to first. A level's gain first
//!   repays debt held by stricter levels (strictest first); the remainder is
//!   credited to the level itself.
//! - **spend**: the cost is taken from the spend-origin level, then from each
//!   laxer level in turn. Whatever is still owed becomes debt at the origin.
//! - After either operation, balances are normalised from level 0 upward: any
//!   surplus over a level's maximum overflows into the next level, and surplus
//!   past the last level is discarded.
//!
//! Replenishment is lazy (dequeue-driven). Elapsed time is measured against the
//! port's last replenishment instant and clamped to [`MAX_REPLENISH_US`].

use quanta::Instant;

use crate::config::LevelParams;

/// Upper bound on a single replenishment interval (2 s).
pub const MAX_REPLENISH_US: u64 = 2_000_000;

fn clamp_i64(v: u64) -> i64 {
    i64::try_from(v).unwrap_or(i64::MAX)
}

// ─── CreditLedger ────────────────────────────────────────────────────────────

/// Ordered per-level credit balances for one dimension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreditLedger {
    balances: Vec<i64>,
}

impl CreditLedger {
    /// All levels start at zero.
    pub fn new(levels: usize) -> Self {
        CreditLedger {
            balances: vec![0; levels],
        }
    }

    /// Start from explicit balances.
    pub fn from_balances(balances: Vec<i64>) -> Self {
        CreditLedger { balances }
    }

    pub fn levels(&self) -> usize {
        self.balances.len()
    }

    pub fn balance(&self, level: usize) -> i64 {
        self.balances.get(level).copied().unwrap_or(0)
    }

    pub fn balances(&self) -> &[i64] {
        &self.balances
    }

    /// Strictest level holding positive credit.
    pub fn first_positive(&self) -> Option<usize> {
        self.balances.iter().position(|&b| b > 0)
    }

    /// Replenish for `elapsed_us` microseconds.
    pub fn gain(&mut self, elapsed_us: u64, params: &[LevelParams]) {
        for level in (0..self.balances.len()).rev() {
            let gain_us = params.get(level).map_or(0, |p| p.gain_us);
            let mut g = clamp_i64(gain_us.saturating_mul(elapsed_us));

            for stricter in 0..level {
                if g == 0 {
                    break;
                }
                let balance = self.balances[stricter];
                if balance < 0 {
                    let debt = balance.checked_neg().unwrap_or(i64::MAX);
                    let repay = g.min(debt);
                    self.balances[stricter] = balance.saturating_add(repay);
                    g -= repay;
                }
            }

            self.balances[level] = self.balances[level].saturating_add(g);
        }
        self.normalize(params);
    }

    /// Debit `cost`, starting at `from` and walking toward the laxest level.
    pub fn spend(&mut self, cost: u64, from: usize, params: &[LevelParams]) {
        if from >= self.balances.len() {
            return;
        }
        let mut owed = clamp_i64(cost);
        for balance in &mut self.balances[from..] {
            if owed == 0 {
                break;
            }
            let take = (*balance).max(0).min(owed);
            *balance -= take;
            owed -= take;
        }
        if owed > 0 {
            self.balances[from] = self.balances[from].saturating_sub(owed);
        }
        self.normalize(params);
    }

    /// Cap every level at its maximum, cascading surplus to the next level.
    fn normalize(&mut self, params: &[LevelParams]) {
        let mut carry = 0i64;
        for (level, balance) in self.balances.iter_mut().enumerate() {
            *balance = balance.saturating_add(carry);
            carry = 0;
            let max = params
                .get(level)
                .map_or(i64::MAX, |p| clamp_i64(p.max_credit));
            if *balance > max {
                carry = *balance - max;
                *balance = max;
            }
        }
    }
}

// ─── Replenisher ─────────────────────────────────────────────────────────────

/// Tracks the last replenishment instant of a port.
#[derive(Debug, Clone, Copy)]
pub struct Replenisher {
    last: Instant,
}

impl Replenisher {
    pub fn new(now: Instant) -> Self {
        Replenisher { last: now }
    }

    pub fn last(&self) -> Instant {
        self.last
    }

    /// Microseconds since the last replenishment, clamped to
    /// [`MAX_REPLENISH_US`]. Returns 0 and keeps the old instant when `now` is
    /// not strictly later or less than a microsecond has passed.
    pub fn elapsed_us(&mut self, now: Instant) -> u64 {
        if now <= self.last {
            return 0;
        }
        let Some(delta) = now.checked_duration_since(self.last) else {
            return 0;
        };
        let us = u64::try_from(delta.as_micros())
            .unwrap_or(u64::MAX)
            .min(MAX_REPLENISH_US);
        if us > 0 {
            self.last = now;
        }
        us
    }
}
