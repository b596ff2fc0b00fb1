//! Accounting instruction insertion
//!
//! Splits code into basic blocks and prefixes every block with
//! `Charge(block cost)` followed by `Tick`. Block leaders are the entry,
//! every branch target, and the instruction after a branch, call or return.
//! Branches are relocated to the prefix of their target block, so a loop
//! pays for its body on every iteration and can be preempted at its header.

use super::Instr;
use crate::preempt::CostTable;

/// Return `code` with accounting instructions woven in.
///
/// Existing `Charge`/`Tick` instructions are discarded and recomputed, so
/// instrumenting twice gives the same result as instrumenting once.
pub fn instrument(code: &[Instr], costs: &CostTable) -> Vec<Instr> {
    let body = strip_accounting(code);
    let len = body.len();

    let mut leader = vec![false; len + 1];
    leader[0] = true;
    for (i, instr) in body.iter().enumerate() {
        if let Some(target) = instr.jump_target() {
            leader[target] = true;
            leader[i + 1] = true;
        }
        if matches!(instr, Instr::Call { .. } | Instr::Return { .. }) {
            leader[i + 1] = true;
        }
    }

    let mut out = Vec::with_capacity(len * 2);
    let mut relocated = vec![0usize; len + 1];
    let mut start = 0;
    while start < len {
        let mut end = start + 1;
        while end < len && !leader[end] {
            end += 1;
        }
        let cost = body[start..end]
            .iter()
            .filter_map(Instr::category)
            .map(|category| costs.cost(category))
            .fold(0u32, u32::saturating_add);

        relocated[start] = out.len();
        out.push(Instr::Charge { cost });
        out.push(Instr::Tick);
        for (i, instr) in body.iter().enumerate().take(end).skip(start) {
            if i != start {
                relocated[i] = out.len();
            }
            out.push(instr.clone());
        }
        start = end;
    }
    relocated[len] = out.len();

    for instr in &mut out {
        if let Some(target) = instr.jump_target() {
            instr.set_jump_target(relocated[target]);
        }
    }
    out
}

/// Drop accounting instructions, keeping branch targets pointed at the same code
fn strip_accounting(code: &[Instr]) -> Vec<Instr> {
    let mut remap = vec![0usize; code.len() + 1];
    let mut body = Vec::with_capacity(code.len());
    for (i, instr) in code.iter().enumerate() {
        remap[i] = body.len();
        if !instr.is_accounting() {
            body.push(instr.clone());
        }
    }
    remap[code.len()] = body.len();

    for instr in &mut body {
        if let Some(target) = instr.jump_target() {
            instr.set_jump_target(remap[target.min(code.len())]);
        }
    }
    body
}
