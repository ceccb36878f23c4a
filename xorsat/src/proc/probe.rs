//! Failed literal probing.
//!
//! Probing pushes a single candidate literal at decision level 1 and propagates. A conflict
//! means the negated candidate is a unit clause. Otherwise every implied literal is recorded in
//! the implication cache, and literals implied by both polarities of the candidate are units as
//! well (both-prop). Lazy hyper-binary resolution is active during these propagations, so failed
//! literal probing also densifies the binary implication graph.
use partial_ref::{partial, PartialRef};

use ordered_float::OrderedFloat;

use xorsat_formula::{Lit, Var};

use crate::cache::CacheEntry;
use crate::context::{parts::*, Context};
use crate::proof;
use crate::prop::{backtrack, enqueue_assignment, propagate, Reason};
use crate::state::SatState;

/// Probe the most active free variables.
///
/// Returns `false` when the budget ran out first. Unsatisfiability is recorded in the solver
/// state.
pub fn probe(
    mut ctx: partial!(
        Context,
        mut AssignmentP,
        mut BinaryClausesP,
        mut CacheP,
        mut ClauseAllocP,
        mut ImplGraphP,
        mut ProofP,
        mut SolverStateP,
        mut TernaryClausesP,
        mut TmpDataP,
        mut TrailP,
        mut VsidsP,
        mut WatchlistsP,
        mut XorStateP,
        ClauseDbP,
        SolverConfigP,
        VariablesP,
    ),
    budget: u64,
) -> bool {
    debug_assert_eq!(ctx.part(TrailP).current_level(), 0);

    let budget_limit = ctx.part(SolverStateP).bogo_props.saturating_add(budget);

    let mut candidates: Vec<Var> = ctx
        .part(VariablesP)
        .live_var_iter()
        .filter(|&var| ctx.part(AssignmentP).var_value(var).is_none())
        .collect();

    {
        let vsids = ctx.part(VsidsP);
        candidates.sort_unstable_by_key(|&var| OrderedFloat(-vsids.activity(var)));
    }

    let mut implied_pos: Vec<Lit> = vec![];

    for var in candidates {
        if ctx.part(SolverStateP).bogo_props >= budget_limit {
            return false;
        }
        if ctx.part(SolverStateP).sat_state != SatState::Unknown {
            return true;
        }
        if ctx.part(AssignmentP).var_value(var).is_some() {
            continue;
        }

        let lit = var.positive();

        // Probe the positive literal.
        if probe_lit(ctx.borrow(), lit, &mut implied_pos) {
            if !assert_probe_unit(ctx.borrow(), !lit) {
                return true;
            }
            continue;
        }

        // Mark the implications of the positive probe for the both-prop check.
        {
            let tmp = ctx.part_mut(TmpDataP);
            for &implied in implied_pos.iter() {
                tmp.flags[implied.code()] = true;
            }
        }

        let mut implied_neg: Vec<Lit> = vec![];

        if probe_lit(ctx.borrow(), !lit, &mut implied_neg) {
            clear_flags(ctx.borrow(), &implied_pos);
            if !assert_probe_unit(ctx.borrow(), lit) {
                return true;
            }
            continue;
        }

        // Literals implied by both polarities hold unconditionally.
        let both: Vec<Lit> = implied_neg
            .iter()
            .cloned()
            .filter(|&implied| ctx.part(TmpDataP).flags[implied.code()])
            .collect();

        clear_flags(ctx.borrow(), &implied_pos);

        for unit in both {
            if !assert_probe_unit(ctx.borrow(), unit) {
                return true;
            }
        }
    }

    true
}

/// Propagate a single probe literal at decision level 1.
///
/// Returns whether the literal failed, i.e. propagation ran into a conflict. Otherwise the
/// implied literals are appended to `implied` and stored in the implication cache. The probe
/// level is cancelled again either way.
fn probe_lit(
    mut ctx: partial!(
        Context,
        mut AssignmentP,
        mut BinaryClausesP,
        mut CacheP,
        mut ClauseAllocP,
        mut ImplGraphP,
        mut ProofP,
        mut SolverStateP,
        mut TernaryClausesP,
        mut TrailP,
        mut VsidsP,
        mut WatchlistsP,
        mut XorStateP,
        ClauseDbP,
        SolverConfigP,
    ),
    lit: Lit,
    implied: &mut Vec<Lit>,
) -> bool {
    implied.clear();

    let level_start = ctx.part(TrailP).trail().len();

    ctx.part_mut(TrailP).new_decision_level();
    enqueue_assignment(ctx.borrow(), lit, Reason::Unit);

    let conflict = propagate(ctx.borrow()).is_err();

    if conflict {
        backtrack(ctx.borrow(), 0);
        return true;
    }

    let mut entries: Vec<CacheEntry> = vec![];

    {
        let (trail, mut ctx) = ctx.split_part(TrailP);
        let impl_graph = ctx.part(ImplGraphP);
        let binary_clauses = ctx.part(BinaryClausesP);

        for &implied_lit in &trail.trail()[level_start + 1..] {
            implied.push(implied_lit);

            // An implication is tagged irredundant when it is a direct irredundant binary edge;
            // longer chains are tagged conservatively.
            let irred = match impl_graph.reason(implied_lit.var()) {
                Reason::Binary([other]) if *other == !lit => binary_clauses
                    .implied(lit)
                    .iter()
                    .any(|watch| watch.implied == implied_lit && !watch.redundant),
                _ => false,
            };

            entries.push(CacheEntry {
                lit: implied_lit,
                irred,
            });
        }
    }

    ctx.part_mut(CacheP).set_implied(lit, entries);

    backtrack(ctx.borrow(), 0);

    false
}

/// Enqueue a unit found by probing and propagate it.
///
/// Returns `false` when this made the formula unsatisfiable.
fn assert_probe_unit(
    mut ctx: partial!(
        Context,
        mut AssignmentP,
        mut BinaryClausesP,
        mut ClauseAllocP,
        mut ImplGraphP,
        mut ProofP,
        mut SolverStateP,
        mut TernaryClausesP,
        mut TrailP,
        mut VsidsP,
        mut WatchlistsP,
        mut XorStateP,
        ClauseDbP,
        SolverConfigP,
    ),
    unit: Lit,
) -> bool {
    debug_assert_eq!(ctx.part(TrailP).current_level(), 0);

    match ctx.part(AssignmentP).lit_value(unit) {
        Some(true) => return true,
        Some(false) => {
            proof::add_clause(ctx.borrow(), &[unit]);
            proof::add_clause(ctx.borrow(), &[]);
            ctx.part_mut(SolverStateP).sat_state = SatState::Unsat;
            return false;
        }
        None => {}
    }

    proof::add_clause(ctx.borrow(), &[unit]);
    enqueue_assignment(ctx.borrow(), unit, Reason::Unit);

    if propagate(ctx.borrow()).is_err() {
        proof::add_clause(ctx.borrow(), &[]);
        ctx.part_mut(SolverStateP).sat_state = SatState::Unsat;
        return false;
    }

    true
}

/// Clear the both-prop marker flags.
fn clear_flags(mut ctx: partial!(Context, mut TmpDataP), lits: &[Lit]) {
    let tmp = ctx.part_mut(TmpDataP);
    for &lit in lits {
        tmp.flags[lit.code()] = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use partial_ref::IntoPartialRefMut;

    use xorsat_formula::{lit, lits};

    use crate::context::set_var_count;
    use crate::load::load_clause;

    #[test]
    fn failed_literal_becomes_unit() {
        let mut ctx = Context::default();
        let mut ctx = ctx.into_partial_ref_mut();

        set_var_count(ctx.borrow(), 3);

        // Probing 1 conflicts via 2 and -2, so -1 is a unit; under -1 the remaining clauses
        // conflict as well.
        load_clause(ctx.borrow(), &lits![-1, 2]);
        load_clause(ctx.borrow(), &lits![-1, -2]);
        load_clause(ctx.borrow(), &lits![1, 3]);
        load_clause(ctx.borrow(), &lits![1, -3]);

        probe(ctx.borrow(), 1_000_000);

        assert_eq!(ctx.part(SolverStateP).sat_state, SatState::Unsat);
    }

    #[test]
    fn both_prop_finds_shared_implications() {
        let mut ctx = Context::default();
        let mut ctx = ctx.into_partial_ref_mut();

        set_var_count(ctx.borrow(), 2);

        // Both 1 and -1 imply 2.
        load_clause(ctx.borrow(), &lits![-1, 2]);
        load_clause(ctx.borrow(), &lits![1, 2]);

        assert!(probe(ctx.borrow(), 1_000_000));

        assert!(ctx.part(AssignmentP).lit_is_true(lit!(2)));
        assert_eq!(ctx.part(SolverStateP).sat_state, SatState::Unknown);
    }
}
