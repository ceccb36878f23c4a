//! Conflict driven clause learning.
use partial_ref::{partial, split_borrow, PartialRef};

use crate::analyze::analyze_conflict;
use crate::assumptions::{enqueue_assumption, EnqueueAssumption};
use crate::clause::{
    assess_learned_clause, bump_clause_activity, db, decay_clause_activities, note_clause_use,
};
use crate::context::{parts::*, Context};
use crate::decision::make_decision;
use crate::glue::compute_glue;
use crate::proof;
use crate::prop::{backtrack, enqueue_assignment, propagate, Conflict, Reason};
use crate::simplify::{prove_units, simplify};
use crate::state::SatState;

/// Find a conflict, learn a clause and backtrack.
///
/// When no conflict is found the formula is satisfied by the current assignment and the state
/// changes to SAT instead.
pub fn conflict_step(
    mut ctx: partial!(
        Context,
        mut AnalyzeConflictP,
        mut AssignmentP,
        mut AssumptionsP,
        mut BinaryClausesP,
        mut CacheP,
        mut ClauseActivityP,
        mut ClauseAllocP,
        mut ClauseDbP,
        mut ImplGraphP,
        mut ProofP,
        mut ScheduleP,
        mut SolverStateP,
        mut TernaryClausesP,
        mut TmpDataP,
        mut TrailP,
        mut VariablesP,
        mut VsidsP,
        mut WatchlistsP,
        mut XorStateP,
        SolverConfigP,
    ),
) {
    let conflict = match find_conflict(ctx.borrow()) {
        Ok(()) => {
            ctx.part_mut(SolverStateP).sat_state = SatState::Sat;
            return;
        }
        Err(FoundConflict::Assumption) => {
            // enqueue_assumption already put the solver into the unsat-under-assumptions state.
            return;
        }
        Err(FoundConflict::Conflict(conflict)) => conflict,
    };

    // A matrix refreshed after backtracking can surface a conflict whose literals all sit below
    // the current decision level. First-UIP analysis needs the conflict at its natural level.
    let conflict_level = {
        split_borrow!(lit_ctx = &(ClauseAllocP, XorStateP) ctx);
        let impl_graph = ctx.part(ImplGraphP);
        conflict
            .lits(&lit_ctx)
            .iter()
            .map(|lit| impl_graph.level(lit.var()))
            .max()
            .unwrap_or(0)
    };

    if conflict_level == 0 {
        proof::add_clause(ctx.borrow(), &[]);
        ctx.part_mut(SolverStateP).sat_state = SatState::Unsat;
        return;
    }

    if conflict_level < ctx.part(TrailP).current_level() {
        backtrack(ctx.borrow(), conflict_level);
    }

    let backtrack_to = analyze_conflict(ctx.borrow(), conflict);

    let (analyze, mut ctx) = ctx.split_part(AnalyzeConflictP);

    for &cref in analyze.involved() {
        bump_clause_activity(ctx.borrow(), cref);
        note_clause_use(ctx.borrow(), cref);
    }

    decay_clause_activities(ctx.borrow());

    let clause = analyze.clause();

    let glue = compute_glue(ctx.borrow(), clause);

    {
        let trail_len = ctx.part(TrailP).trail().len();
        let agility = ctx.part(AssignmentP).agility();
        let agility_limit = ctx.part(SolverConfigP).agility_limit;
        ctx.part_mut(ScheduleP)
            .note_conflict(glue, trail_len, agility, agility_limit);
    }

    backtrack(ctx.borrow(), backtrack_to);

    proof::add_clause(ctx.borrow(), clause);

    let reason = match clause[..] {
        [] => {
            ctx.part_mut(SolverStateP).sat_state = SatState::Unsat;
            return;
        }
        [_] => Reason::Unit,
        [_, lit_1] => {
            ctx.part_mut(BinaryClausesP)
                .add_binary_clause([clause[0], lit_1], true);
            Reason::Binary([lit_1])
        }
        [_, lit_1, lit_2] => {
            ctx.part_mut(TernaryClausesP)
                .add_ternary_clause([clause[0], lit_1, lit_2], true);
            Reason::Ternary([lit_1, lit_2])
        }
        _ => {
            let header = assess_learned_clause(ctx.borrow(), &clause);
            let cref = db::add_clause(ctx.borrow(), header, &clause);
            if ctx.part(WatchlistsP).enabled() {
                ctx.part_mut(WatchlistsP)
                    .watch_clause(cref, [clause[0], clause[1]]);
            }
            Reason::Long(cref)
        }
    };

    enqueue_assignment(ctx.borrow(), clause[0], reason);
}

/// Return type of [`find_conflict`].
///
/// Specifies whether a conflict was found during propagation or while enqueuing assumptions.
enum FoundConflict {
    Conflict(Conflict),
    Assumption,
}

impl From<Conflict> for FoundConflict {
    fn from(conflict: Conflict) -> FoundConflict {
        FoundConflict::Conflict(conflict)
    }
}

/// Find a conflict.
///
/// Returns `Err` if a conflict was found and `Ok` if a satisfying assignment was found instead.
fn find_conflict(
    mut ctx: partial!(
        Context,
        mut AssignmentP,
        mut AssumptionsP,
        mut BinaryClausesP,
        mut ClauseAllocP,
        mut ClauseDbP,
        mut ImplGraphP,
        mut ProofP,
        mut SolverStateP,
        mut TernaryClausesP,
        mut TrailP,
        mut VsidsP,
        mut WatchlistsP,
        mut XorStateP,
        SolverConfigP,
        VariablesP,
    ),
) -> Result<(), FoundConflict> {
    loop {
        let propagation_result = propagate(ctx.borrow());

        let new_unit = prove_units(ctx.borrow());

        propagation_result?;

        if new_unit {
            simplify(ctx.borrow());
        }

        match enqueue_assumption(ctx.borrow()) {
            EnqueueAssumption::Enqueued => continue,
            EnqueueAssumption::Conflict => return Err(FoundConflict::Assumption),
            EnqueueAssumption::Done => (),
        }

        if !make_decision(ctx.borrow()) {
            return Ok(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;

    use partial_ref::IntoPartialRefMut;

    use xorsat_formula::{cnf_formula, test::*};

    use crate::context::set_var_count;
    use crate::load::load_clause;

    fn solve_to_completion(ctx: &mut Context) -> SatState {
        let mut ctx = ctx.into_partial_ref_mut();
        while ctx.part(SolverStateP).sat_state == SatState::Unknown {
            conflict_step(ctx.borrow());
        }
        ctx.part(SolverStateP).sat_state
    }

    #[test]
    fn level_0_unsat() {
        let mut ctx = Context::default();

        {
            let mut ctx = ctx.into_partial_ref_mut();

            let formula = cnf_formula![
                1, 2, 3;
                -1;
                1, -2;
                2, -3;
            ];

            set_var_count(ctx.borrow(), formula.var_count());

            for clause in formula.iter() {
                load_clause(ctx.borrow(), clause);
            }
        }

        assert_eq!(solve_to_completion(&mut ctx), SatState::Unsat);
    }

    proptest! {
        #[test]
        fn sgen_unsat(formula in sgen_unsat_formula(1..7usize)) {
            let mut ctx = Context::default();

            {
                let mut ctx = ctx.into_partial_ref_mut();
                set_var_count(ctx.borrow(), formula.var_count());

                for clause in formula.iter() {
                    load_clause(ctx.borrow(), clause);
                }
            }

            prop_assert_eq!(solve_to_completion(&mut ctx), SatState::Unsat);
        }

        #[test]
        fn sat(formula in sat_formula(4..20usize, 10..100usize, 0.05..0.2, 0.9..1.0)) {
            let mut ctx = Context::default();

            {
                let mut ctx = ctx.into_partial_ref_mut();
                set_var_count(ctx.borrow(), formula.var_count());

                for clause in formula.iter() {
                    load_clause(ctx.borrow(), clause);
                }
            }

            prop_assert_eq!(solve_to_completion(&mut ctx), SatState::Sat);

            let mut ctx = ctx.into_partial_ref_mut();
            for clause in formula.iter() {
                prop_assert!(clause.iter().any(|&lit| ctx.part(AssignmentP).lit_is_true(lit)));
            }
        }
    }
}
