//! Solving under assumptions.
//!
//! Assumptions are enqueued as pseudo decisions on the lowest decision levels, one level per
//! assumption. Restarts keep these levels; a conflict that falsifies an assumption makes the
//! formula unsatisfiable under the current assumptions without being unsatisfiable globally.
use partial_ref::{partial, PartialRef};

use xorsat_formula::Lit;

use crate::context::{parts::*, Context};
use crate::prop::{enqueue_assignment, Reason};
use crate::state::SatState;

/// Currently active assumptions.
#[derive(Default)]
pub struct Assumptions {
    assumptions: Vec<Lit>,
}

impl Assumptions {
    /// The active assumptions.
    pub fn assumptions(&self) -> &[Lit] {
        &self.assumptions
    }

    /// Number of active assumptions, which is also the number of reserved decision levels.
    pub fn assumption_count(&self) -> usize {
        self.assumptions.len()
    }
}

/// Replace the active assumptions.
///
/// The caller has to perform a full restart first.
pub fn set_assumptions(
    mut ctx: partial!(
        Context,
        mut AssumptionsP,
        mut SolverStateP,
        mut VariablesP,
        TrailP,
    ),
    assumptions: &[Lit],
) {
    debug_assert_eq!(ctx.part(TrailP).current_level(), 0);

    let state = ctx.part_mut(SolverStateP);
    state.sat_state = match state.sat_state {
        SatState::Unsat => SatState::Unsat,
        _ => SatState::Unknown,
    };

    let (assumption_data, mut ctx) = ctx.split_part_mut(AssumptionsP);

    assumption_data.assumptions.clear();
    assumption_data.assumptions.extend_from_slice(assumptions);

    // Assumption variables must survive inprocessing so later conflicts can reference them.
    for &lit in assumptions {
        ctx.part_mut(VariablesP).var_data_mut(lit.var()).frozen = true;
    }
}

/// Result of [`enqueue_assumption`].
pub enum EnqueueAssumption {
    Done,
    Enqueued,
    Conflict,
}

/// Enqueue the next pending assumption if any.
///
/// Every assumption owns one decision level, already satisfied assumptions keep an empty level so
/// the level arithmetic stays simple.
pub fn enqueue_assumption(
    mut ctx: partial!(
        Context,
        mut AssignmentP,
        mut ImplGraphP,
        mut SolverStateP,
        mut TrailP,
        AssumptionsP,
    ),
) -> EnqueueAssumption {
    while let Some(&assumption) = {
        let level = ctx.part(TrailP).current_level();
        ctx.part(AssumptionsP).assumptions().get(level)
    } {
        match ctx.part(AssignmentP).lit_value(assumption) {
            Some(false) => {
                ctx.part_mut(SolverStateP).sat_state = SatState::UnsatUnderAssumptions;
                return EnqueueAssumption::Conflict;
            }
            Some(true) => {
                ctx.part_mut(TrailP).new_decision_level();
            }
            None => {
                ctx.part_mut(TrailP).new_decision_level();
                enqueue_assignment(ctx.borrow(), assumption, Reason::Unit);
                return EnqueueAssumption::Enqueued;
            }
        }
    }

    EnqueueAssumption::Done
}
