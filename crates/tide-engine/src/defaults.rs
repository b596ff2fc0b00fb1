//! Default constants for engine configuration.
//!
//! Centralizes the numbers used by `EngineConfig::default()` and the
//! default cost table.

/// Default register stack capacity (in slots).
pub const DEFAULT_STACK_CAPACITY: usize = 1024 * 64;

/// Default preemption budget granted to each drain, in cost units.
pub const DEFAULT_BUDGET: u64 = 10_000;

/// Default low-water mark: a check fires once the budget drops to this value.
pub const DEFAULT_LOW_WATER_MARK: i64 = 0;

/// Default cost of a constant or nil load.
pub const DEFAULT_LOAD_COST: u32 = 1;

/// Default cost of a register move.
pub const DEFAULT_MOVE_COST: u32 = 1;

/// Default cost of an arithmetic instruction.
pub const DEFAULT_ARITH_COST: u32 = 1;

/// Default cost of a comparison.
pub const DEFAULT_COMPARE_COST: u32 = 1;

/// Default cost of a string concatenation.
pub const DEFAULT_CONCAT_COST: u32 = 2;

/// Default cost of a branch.
pub const DEFAULT_JUMP_COST: u32 = 1;

/// Default cost of a call (excluding the callee's own work).
pub const DEFAULT_CALL_COST: u32 = 5;

/// Default cost of a field lookup.
pub const DEFAULT_INDEX_COST: u32 = 2;

/// Default cost of a return.
pub const DEFAULT_RETURN_COST: u32 = 1;
