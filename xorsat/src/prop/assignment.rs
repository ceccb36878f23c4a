//! Partial assignment and backtracking.
use partial_ref::{partial, PartialRef};

use xorsat_formula::{Lit, LitIdx, Var};

use crate::context::{parts::*, Context};
use crate::decision::make_available;

use super::Reason;

/// Current partial assignment.
pub struct Assignment {
    assignment: Vec<Option<bool>>,
    /// The last value assigned to each variable, used for phase saving.
    last_value: Vec<bool>,
    /// Exponential moving average of polarity flips on assignment.
    agility: f64,
    agility_decay: f64,
}

impl Default for Assignment {
    fn default() -> Assignment {
        Assignment {
            assignment: vec![],
            last_value: vec![],
            agility: 0.0,
            agility_decay: crate::config::SolverConfig::default().agility_decay,
        }
    }
}

/// This compares two `Option<bool>` values as bytes. Workaround for bad code generation.
pub fn fast_option_eq(a: Option<bool>, b: Option<bool>) -> bool {
    unsafe { std::mem::transmute::<_, u8>(a) == std::mem::transmute::<_, u8>(b) }
}

impl Assignment {
    /// Update structures for a new variable count.
    pub fn set_var_count(&mut self, count: usize) {
        self.assignment.resize(count, None);
        self.last_value.resize(count, false);
    }

    /// Current partial assignment as slice.
    pub fn assignment(&self) -> &[Option<bool>] {
        &self.assignment
    }

    /// Value assigned to a variable.
    pub fn var_value(&self, var: Var) -> Option<bool> {
        self.assignment[var.index()]
    }

    /// Value last assigned to a variable.
    ///
    /// If the variable is currently assigned this returns the current value. If the variable was
    /// never assigned this returns false.
    pub fn last_var_value(&self, var: Var) -> bool {
        self.last_value[var.index()]
    }

    /// Overwrite the saved phase of a variable.
    pub fn set_last_var_value(&mut self, var: Var, value: bool) {
        self.last_value[var.index()] = value;
    }

    /// Invert every saved phase.
    pub fn flip_phases(&mut self) {
        for value in self.last_value.iter_mut() {
            *value = !*value;
        }
    }

    /// Value assigned to a literal.
    pub fn lit_value(&self, lit: Lit) -> Option<bool> {
        self.assignment[lit.index()].map(|b| b ^ lit.is_negative())
    }

    pub fn lit_is_true(&self, lit: Lit) -> bool {
        fast_option_eq(self.assignment[lit.index()], Some(lit.is_positive()))
    }

    pub fn lit_is_false(&self, lit: Lit) -> bool {
        fast_option_eq(self.assignment[lit.index()], Some(lit.is_negative()))
    }

    pub fn lit_is_unk(&self, lit: Lit) -> bool {
        fast_option_eq(self.assignment[lit.index()], None)
    }

    /// Make a literal true, updating the saved phase and the agility average.
    pub fn assign_lit(&mut self, lit: Lit) {
        let value = lit.is_positive();
        let flipped = self.last_value[lit.index()] != value;

        self.assignment[lit.index()] = Some(value);
        self.last_value[lit.index()] = value;

        self.agility *= self.agility_decay;
        if flipped {
            self.agility += 1.0 - self.agility_decay;
        }
    }

    /// Clear the value of a variable.
    pub fn unassign_var(&mut self, var: Var) {
        self.assignment[var.index()] = None;
    }

    /// The polarity flip moving average, between 0 and 1.
    pub fn agility(&self) -> f64 {
        self.agility
    }

    /// Change the agility decay factor.
    pub fn set_agility_decay(&mut self, decay: f64) {
        assert!(decay < 1.0);
        assert!(decay > 0.0);
        self.agility_decay = decay;
    }
}

/// Decision and propagation history.
#[derive(Default)]
pub struct Trail {
    /// Stack of all propagated and all enqueued assignments.
    trail: Vec<Lit>,
    /// Next assignment in trail to propagate.
    queue_head_pos: usize,
    /// Decision levels as trail indices.
    decisions: Vec<LitIdx>,
    /// Number of unit clauses removed from the trail.
    units_removed: usize,
}

impl Trail {
    /// Return the next assigned literal to propagate and remove it from the queue.
    pub fn pop_queue(&mut self) -> Option<Lit> {
        let head = self.trail.get(self.queue_head_pos).cloned();
        if head.is_some() {
            self.queue_head_pos += 1;
        }
        head
    }

    /// Assigned literals in assignment order.
    pub fn trail(&self) -> &[Lit] {
        &self.trail
    }

    /// Clear the trail.
    ///
    /// This simply removes all entries without performing any backtracking. Can only be called
    /// with no active decisions.
    pub fn clear(&mut self) {
        assert!(self.decisions.is_empty());
        self.units_removed += self.trail.len();
        self.trail.clear();
        self.queue_head_pos = 0;
    }

    /// Start a new decision level.
    ///
    /// Does not enqueue the decision itself.
    pub fn new_decision_level(&mut self) {
        self.decisions.push(self.trail.len() as LitIdx)
    }

    /// Current decision level.
    pub fn current_level(&self) -> usize {
        self.decisions.len()
    }

    /// The number of assignments at level 0, including removed unit clauses.
    pub fn top_level_assignment_count(&self) -> usize {
        self.decisions
            .get(0)
            .map(|&len| len as usize)
            .unwrap_or(self.trail.len())
            + self.units_removed
    }

    /// Whether all assignments are processed.
    pub fn fully_propagated(&self) -> bool {
        self.queue_head_pos == self.trail.len()
    }
}

/// Enqueues the assignment of true to a literal.
///
/// This updates the assignment and trail, but does not perform any propagation. The literal has
/// to be unassigned when calling this.
pub fn enqueue_assignment(
    mut ctx: partial!(Context, mut AssignmentP, mut ImplGraphP, mut TrailP),
    lit: Lit,
    reason: Reason,
) {
    let assignment = ctx.part_mut(AssignmentP);
    debug_assert!(assignment.lit_value(lit) == None);

    assignment.assign_lit(lit);

    let (trail, mut ctx) = ctx.split_part_mut(TrailP);

    trail.trail.push(lit);

    let level = trail.decisions.len();

    let (impl_graph, _) = ctx.split_part_mut(ImplGraphP);

    let ancestor = if level == 1 {
        match reason {
            Reason::Unit => lit,
            Reason::Binary([other]) => {
                if impl_graph.level(other.var()) == 0 {
                    lit
                } else {
                    impl_graph.ancestor(other.var())
                }
            }
            _ => Lit::UNDEF,
        }
    } else {
        Lit::UNDEF
    };

    let node = &mut impl_graph.nodes[lit.index()];
    node.reason = reason;
    node.level = level as LitIdx;
    node.depth = trail.trail.len() as LitIdx;
    node.ancestor = ancestor;
}

/// Undo all assignments in decision levels deeper than the given level.
pub fn backtrack(
    mut ctx: partial!(
        Context,
        mut AssignmentP,
        mut TrailP,
        mut VsidsP,
        mut XorStateP,
    ),
    level: usize,
) {
    let (assignment, mut ctx) = ctx.split_part_mut(AssignmentP);
    let (trail, mut ctx) = ctx.split_part_mut(TrailP);

    if level == trail.decisions.len() {
        return;
    }

    ctx.part_mut(XorStateP).cancel_until(level);

    let new_trail_len = trail.decisions[level] as usize;

    trail.queue_head_pos = new_trail_len;
    trail.decisions.truncate(level);

    let trail_end = &trail.trail[new_trail_len..];
    for &lit in trail_end {
        make_available(ctx.borrow(), lit.var());
        assignment.unassign_var(lit.var());
    }
    trail.trail.truncate(new_trail_len);
}

/// Undo all decisions and assumptions.
pub fn full_restart(
    mut ctx: partial!(
        Context,
        mut AssignmentP,
        mut TrailP,
        mut VsidsP,
        mut XorStateP,
    ),
) {
    backtrack(ctx.borrow(), 0);
}

/// Undo all decisions, keeping enqueued assumptions.
pub fn restart(
    mut ctx: partial!(
        Context,
        mut AssignmentP,
        mut TrailP,
        mut VsidsP,
        mut XorStateP,
        AssumptionsP,
    ),
) {
    let assumption_levels = ctx.part(AssumptionsP).assumption_count();
    let level = assumption_levels.min(ctx.part(TrailP).current_level());
    backtrack(ctx.borrow(), level);
}
