//! Cooperative preemption
//!
//! Compiled code carries two accounting instructions: `Charge(cost)`, which
//! debits the budget, and `Tick`, which suspends with
//! `SuspendReason::Preempted` once the budget has fallen to the low-water
//! mark. Costs are static per operation category, so the points at which a
//! program is preempted depend only on the program, its inputs and the cost
//! table, never on wall-clock time.

use crate::defaults::{
    DEFAULT_ARITH_COST, DEFAULT_BUDGET, DEFAULT_CALL_COST, DEFAULT_COMPARE_COST,
    DEFAULT_CONCAT_COST, DEFAULT_INDEX_COST, DEFAULT_JUMP_COST, DEFAULT_LOAD_COST,
    DEFAULT_LOW_WATER_MARK, DEFAULT_MOVE_COST, DEFAULT_RETURN_COST,
};
use serde::{Deserialize, Serialize};

/// Operation classes that carry a static cost
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpCategory {
    /// Constant and nil loads
    Load,
    /// Register moves
    Move,
    /// Arithmetic
    Arith,
    /// Comparisons
    Compare,
    /// String concatenation
    Concat,
    /// Branches
    Jump,
    /// Calls
    Call,
    /// Field lookups
    Index,
    /// Returns
    Return,
}

/// Static cost per operation category
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CostTable {
    /// Constant and nil loads
    pub load: u32,
    /// Register moves
    #[serde(rename = "move")]
    pub mov: u32,
    /// Arithmetic
    pub arith: u32,
    /// Comparisons
    pub compare: u32,
    /// String concatenation
    pub concat: u32,
    /// Branches
    pub jump: u32,
    /// Calls, excluding the callee's own work
    pub call: u32,
    /// Field lookups
    pub index: u32,
    /// Returns
    #[serde(rename = "return")]
    pub ret: u32,
}

impl Default for CostTable {
    fn default() -> Self {
        Self {
            load: DEFAULT_LOAD_COST,
            mov: DEFAULT_MOVE_COST,
            arith: DEFAULT_ARITH_COST,
            compare: DEFAULT_COMPARE_COST,
            concat: DEFAULT_CONCAT_COST,
            jump: DEFAULT_JUMP_COST,
            call: DEFAULT_CALL_COST,
            index: DEFAULT_INDEX_COST,
            ret: DEFAULT_RETURN_COST,
        }
    }
}

impl CostTable {
    /// A table charging the same cost for every category
    pub fn uniform(cost: u32) -> Self {
        Self {
            load: cost,
            mov: cost,
            arith: cost,
            compare: cost,
            concat: cost,
            jump: cost,
            call: cost,
            index: cost,
            ret: cost,
        }
    }

    /// Cost of one operation of `category`
    pub fn cost(&self, category: OpCategory) -> u32 {
        match category {
            OpCategory::Load => self.load,
            OpCategory::Move => self.mov,
            OpCategory::Arith => self.arith,
            OpCategory::Compare => self.compare,
            OpCategory::Concat => self.concat,
            OpCategory::Jump => self.jump,
            OpCategory::Call => self.call,
            OpCategory::Index => self.index,
            OpCategory::Return => self.ret,
        }
    }
}

/// Preemption policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreemptionConfig {
    /// Cost units granted to each drain; `None` disables preemption
    pub budget: Option<u64>,
    /// A check suspends once the remaining budget is at or below this value
    pub low_water_mark: i64,
    /// Per-category costs used when instrumenting code
    pub costs: CostTable,
}

impl Default for PreemptionConfig {
    fn default() -> Self {
        Self {
            budget: Some(DEFAULT_BUDGET),
            low_water_mark: DEFAULT_LOW_WATER_MARK,
            costs: CostTable::default(),
        }
    }
}

impl PreemptionConfig {
    /// Policy that never preempts
    pub fn disabled() -> Self {
        Self {
            budget: None,
            ..Self::default()
        }
    }
}

/// Running budget counter of one execution context
#[derive(Debug, Clone)]
pub struct Budget {
    remaining: i64,
    slice: Option<u64>,
    low_water_mark: i64,
    preemptions: u64,
}

impl Budget {
    /// Create a budget from a policy, already refilled
    pub fn new(config: &PreemptionConfig) -> Self {
        let mut budget = Self {
            remaining: 0,
            slice: config.budget,
            low_water_mark: config.low_water_mark,
            preemptions: 0,
        };
        budget.refill();
        budget
    }

    /// Grant a fresh slice (called at the start of every drain)
    pub fn refill(&mut self) {
        self.remaining = self
            .slice
            .map(|slice| i64::try_from(slice).unwrap_or(i64::MAX))
            .unwrap_or(i64::MAX);
    }

    /// Debit `cost` units
    #[inline]
    pub fn charge(&mut self, cost: u32) {
        if self.slice.is_some() {
            self.remaining = self.remaining.saturating_sub(i64::from(cost));
        }
    }

    /// Check if the next accounting check must suspend
    #[inline]
    pub fn is_exhausted(&self) -> bool {
        self.slice.is_some() && self.remaining <= self.low_water_mark
    }

    /// Count a preemption
    pub(crate) fn record_preemption(&mut self) {
        self.preemptions += 1;
    }

    /// Units left in the current slice
    pub fn remaining(&self) -> i64 {
        self.remaining
    }

    /// Number of preemptions so far
    pub fn preemptions(&self) -> u64 {
        self.preemptions
    }

    /// Check if preemption is enabled at all
    pub fn is_enabled(&self) -> bool {
        self.slice.is_some()
    }
}
