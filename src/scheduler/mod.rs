//! # Scheduler Module
//!
//! Per-head action planning under the token budget, cross-head
//! balancing, and plan execution.
//!
//! ## Cost model
//!
//! A READ's cost walks the decay ladder 64 → 52 → 42 → 34 → 28 → 23 →
//! 19 → 16 (`cost' = max(16, ⌈4·cost/5⌉)`), indexed by the head's chain
//! state. PASS costs one token and leaves the chain state alone; JUMP
//! costs the whole tick and clears it. The chain survives a tick
//! boundary only when the tick's final executed action was a READ; an
//! idle tick leaves it untouched. Planner and executor share this one
//! rule, which is what makes an emitted plan budget-safe by
//! construction.
//!
//! ## Planning
//!
//! Per head, a dynamic program walks forward over the circular buffer
//! with state (cells advanced, chain state). A cell with outstanding
//! requests *must* be read to be crossed; an idle cell may be passed or
//! read. The objective is the furthest reachable position that covers at
//! least one outstanding cell, with remaining budget as the tiebreak;
//! trailing PASSes are trimmed. A head that cannot reach any read is
//! flagged to JUMP instead, targeting the unblocked slice with the
//! highest gain.
//!
//! ## Balancing
//!
//! All `2·N` heads first plan tentatively against the untouched state;
//! heads with empty tentative plans are flagged for a force-jump. Heads
//! then recompute and execute sequentially in descending tentative READ
//! count, so a head scooped by an earlier one re-plans against reality,
//! and each emitted JUMP blocks its target slice for later heads.

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests;

// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use std::fmt;

use tracing::trace;

use crate::disk::{ActionKind, Disk, HEADS_PER_DISK};
use crate::gain::GainCurve;
use crate::lifecycle;
use crate::object::ObjectTable;

/// Cost of a READ starting a fresh chain.
pub const FIRST_READ_COST: u32 = 64;

/// Floor of the READ decay.
pub const MIN_READ_COST: u32 = 16;

/// The full decay ladder; successive READs walk it left to right.
pub const COST_LADDER: [u32; 8] = [64, 52, 42, 34, 28, 23, 19, 16];

/// Cost of the next READ given the chain state.
pub fn next_read_cost(chain: Option<u32>) -> u32 {
    match chain {
        None => FIRST_READ_COST,
        Some(cost) => ((cost * 4 + 4) / 5).max(MIN_READ_COST),
    }
}

/// Chain state as a ladder index: 0 = fresh, `i` = after ladder step
/// `i-1`.
fn ladder_state(chain: Option<u32>) -> usize {
    match chain {
        None => 0,
        Some(cost) => COST_LADDER
            .iter()
            .position(|&c| c == cost)
            .map_or(COST_LADDER.len(), |i| i + 1),
    }
}

fn state_chain(state: usize) -> Option<u32> {
    if state == 0 {
        None
    } else {
        Some(COST_LADDER[state - 1])
    }
}

// ------------------------------------------------------------------------------------------------
// Actions & plans
// ------------------------------------------------------------------------------------------------

/// One head action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Reposition to the target cell; always a plan of its own.
    Jump(u32),
    /// Read the cell under the head and advance.
    Read,
    /// Advance one cell.
    Pass,
}

/// The action sequence of one head for one tick.
///
/// Rendered in the wire grammar by `Display`: `j <target>` alone for a
/// jump, otherwise a `r`/`p` sequence terminated by `#` (an idle head is
/// just `#`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeadPlan {
    pub actions: Vec<Action>,
}

impl HeadPlan {
    pub fn jump(target: u32) -> Self {
        Self {
            actions: vec![Action::Jump(target)],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn read_count(&self) -> usize {
        self.actions.iter().filter(|a| matches!(a, Action::Read)).count()
    }
}

impl fmt::Display for HeadPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(Action::Jump(target)) = self.actions.first() {
            return write!(f, "j {target}");
        }
        for action in &self.actions {
            match action {
                Action::Read => write!(f, "r")?,
                Action::Pass => write!(f, "p")?,
                Action::Jump(_) => debug_assert!(false, "jump inside a move plan"),
            }
        }
        write!(f, "#")
    }
}

/// Total token cost of a plan under the decay rule, given the chain
/// state carried in and the cost charged for a JUMP.
pub fn plan_cost(plan: &HeadPlan, mut chain: Option<u32>, jump_cost: u32) -> u32 {
    let mut total = 0;
    for action in &plan.actions {
        match *action {
            Action::Jump(_) => total += jump_cost,
            Action::Pass => total += 1,
            Action::Read => {
                let cost = next_read_cost(chain);
                chain = Some(cost);
                total += cost;
            }
        }
    }
    total
}

// ------------------------------------------------------------------------------------------------
// Per-head planning
// ------------------------------------------------------------------------------------------------

/// Plans the best READ/PASS sequence for one head.
///
/// Returns an empty plan when no outstanding cell is reachable within
/// the budget.
fn plan_head(disk: &Disk, head_index: usize, budget: u32) -> HeadPlan {
    const UNREACHABLE: i64 = -1;
    let states = COST_LADDER.len() + 1;

    let head = &disk.heads[head_index];
    let max_steps = budget.min(disk.capacity()) as usize;
    if max_steps == 0 {
        return HeadPlan::default();
    }

    // remaining[j][s]: best remaining budget after advancing j cells in
    // chain state s; parent reconstructs the action taken to get there.
    let mut remaining = vec![[UNREACHABLE; 9]; max_steps + 1];
    let mut parent = vec![[(0usize, Action::Pass); 9]; max_steps + 1];
    remaining[0][ladder_state(head.read_chain)] = i64::from(budget);

    // outstanding_prefix[j]: any outstanding cell within the first j
    // advanced cells. A plan of length j reads one iff this is set,
    // because PASS over an outstanding cell is not permitted.
    let mut outstanding_prefix = vec![false; max_steps + 1];

    let mut position = head.position;
    for j in 0..max_steps {
        let outstanding = disk.cells[position as usize].pending > 0;
        outstanding_prefix[j + 1] = outstanding_prefix[j] || outstanding;

        for s in 0..states {
            let rem = remaining[j][s];
            if rem < 0 {
                continue;
            }
            let cost = i64::from(next_read_cost(state_chain(s)));
            if rem >= cost {
                let ns = ladder_state(Some(cost as u32));
                if rem - cost > remaining[j + 1][ns] {
                    remaining[j + 1][ns] = rem - cost;
                    parent[j + 1][ns] = (s, Action::Read);
                }
            }
            if !outstanding && rem >= 1 && rem - 1 > remaining[j + 1][s] {
                remaining[j + 1][s] = rem - 1;
                parent[j + 1][s] = (s, Action::Pass);
            }
        }
        position = disk.step(position);
    }

    // Feasible lengths are contiguous from zero; take the furthest one
    // that covers at least one outstanding cell.
    let mut length = max_steps;
    while length > 0 && remaining[length].iter().all(|&r| r < 0) {
        length -= 1;
    }
    if length == 0 || !outstanding_prefix[length] {
        return HeadPlan::default();
    }

    let mut state = (0..states)
        .max_by_key(|&s| remaining[length][s])
        .unwrap_or(0);
    let mut actions = Vec::with_capacity(length);
    for j in (1..=length).rev() {
        let (prev, action) = parent[j][state];
        actions.push(action);
        state = prev;
    }
    actions.reverse();
    while matches!(actions.last(), Some(Action::Pass)) {
        actions.pop();
    }
    HeadPlan { actions }
}

// ------------------------------------------------------------------------------------------------
// Cross-head balancing & execution
// ------------------------------------------------------------------------------------------------

/// Working per-slice view used for JUMP targeting within one tick.
struct SliceTarget {
    gain: f64,
    blocked: bool,
}

/// Plans and executes all heads for this tick.
///
/// Returns the emitted plan per head (disk-major) and the requests
/// completed by the executed reads, in execution order.
pub fn plan_tick(
    disks: &mut [Disk],
    objects: &mut ObjectTable,
    curve: &GainCurve,
    now: u32,
    budget: u32,
) -> (Vec<[HeadPlan; HEADS_PER_DISK]>, Vec<u32>) {
    let disk_count = disks.len();

    // Tentative pass against the untouched state: read counts for the
    // ordering, force-jump flags for heads with nothing to do.
    let mut tentative_reads = vec![[0usize; HEADS_PER_DISK]; disk_count];
    for d in 0..disk_count {
        for h in 0..HEADS_PER_DISK {
            if disks[d].heads[h].force_jump {
                continue;
            }
            let plan = plan_head(&disks[d], h, budget);
            if plan.is_empty() {
                disks[d].heads[h].force_jump = true;
            } else {
                tentative_reads[d][h] = plan.read_count();
            }
        }
    }

    // Jump-target view: a slice occupied by a head that will keep
    // working there is blocked; emitted jumps block their target too.
    let mut targets: Vec<Vec<SliceTarget>> = disks
        .iter()
        .map(|disk| {
            disk.slices
                .iter()
                .map(|slice| SliceTarget {
                    gain: slice.gain.value(now, curve),
                    blocked: disk
                        .heads
                        .iter()
                        .any(|head| !head.force_jump && slice.contains(head.position)),
                })
                .collect()
        })
        .collect();

    let mut order: Vec<(usize, usize)> = (0..disk_count)
        .flat_map(|d| (0..HEADS_PER_DISK).map(move |h| (d, h)))
        .collect();
    order.sort_by(|&(d1, h1), &(d2, h2)| {
        tentative_reads[d2][h2]
            .cmp(&tentative_reads[d1][h1])
            .then(d1.cmp(&d2))
            .then(h1.cmp(&h2))
    });

    let mut plans: Vec<[HeadPlan; HEADS_PER_DISK]> =
        vec![[HeadPlan::default(), HeadPlan::default()]; disk_count];
    let mut completed = Vec::new();

    for (d, h) in order {
        let plan = if disks[d].heads[h].force_jump {
            disks[d].heads[h].force_jump = false;
            force_jump_plan(&disks[d], &mut targets[d])
        } else {
            let plan = plan_head(&disks[d], h, budget);
            if plan.is_empty() {
                // Scooped by an earlier head; jump next tick.
                disks[d].heads[h].force_jump = true;
            }
            plan
        };
        execute_plan(disks, objects, d, h, &plan, budget, &mut completed);
        trace!(disk = d + 1, head = h, plan = %plan, "head plan");
        plans[d][h] = plan;
    }

    (plans, completed)
}

/// A single gain-directed JUMP: the best unblocked slice that still has
/// outstanding cells, targeting its first such cell.
fn force_jump_plan(disk: &Disk, targets: &mut [SliceTarget]) -> HeadPlan {
    let mut best: Option<(f64, usize, u32)> = None;
    for (s, target) in targets.iter().enumerate() {
        if target.blocked || disk.slices[s].pending == 0 {
            continue;
        }
        let Some(cell) = disk.first_pending_in_slice(s) else {
            continue;
        };
        if best.is_none_or(|(gain, _, _)| target.gain > gain) {
            best = Some((target.gain, s, cell));
        }
    }
    match best {
        Some((_, s, cell)) => {
            targets[s].blocked = true;
            HeadPlan::jump(cell)
        }
        None => HeadPlan::default(),
    }
}

/// Executes a plan, mutating the head, the cells, and the request
/// states; completed request ids are appended to `completed`.
fn execute_plan(
    disks: &mut [Disk],
    objects: &mut ObjectTable,
    d: usize,
    h: usize,
    plan: &HeadPlan,
    budget: u32,
    completed: &mut Vec<u32>,
) {
    for action in &plan.actions {
        match *action {
            Action::Jump(target) => {
                let head = &mut disks[d].heads[h];
                head.last_action = ActionKind::Jump;
                head.last_cost = budget;
                head.read_chain = None;
                head.position = target;
            }
            Action::Pass => {
                let next = disks[d].step(disks[d].heads[h].position);
                let head = &mut disks[d].heads[h];
                head.last_action = ActionKind::Pass;
                head.last_cost = 1;
                head.position = next;
            }
            Action::Read => {
                let position = disks[d].heads[h].position;
                let cost = next_read_cost(disks[d].heads[h].read_chain);
                {
                    let head = &mut disks[d].heads[h];
                    head.last_action = ActionKind::Read;
                    head.last_cost = cost;
                    head.read_chain = Some(cost);
                }
                // Reading an empty cell is a charged no-op.
                let cell = disks[d].cells[position as usize];
                if !cell.is_empty() {
                    let ids =
                        lifecycle::serve_block(disks, objects, cell.object_id, cell.block_index);
                    completed.extend(ids);
                }
                let next = disks[d].step(position);
                disks[d].heads[h].position = next;
            }
        }
    }
    // The chain only survives a tick whose final action was a READ.
    if let Some(last) = plan.actions.last() {
        if !matches!(last, Action::Read) {
            disks[d].heads[h].read_chain = None;
        }
    }
}
