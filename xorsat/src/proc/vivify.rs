//! Clause vivification.
//!
//! Vivification (asymmetric branching) shortens a long clause by assuming the negations of its
//! literals one by one at a fresh decision level. When propagation runs into a conflict or makes
//! a remaining literal true, the literals assumed so far (plus that satisfied literal) already
//! form an implied clause, which replaces the original. Literals falsified by propagation are
//! redundant and dropped as well. This is the main source of long clause shortening after
//! learning.
use partial_ref::{partial, PartialRef};

use xorsat_formula::Lit;

use crate::clause::{db, ClauseHeader, ClauseRef};
use crate::context::{parts::*, Context};
use crate::proof;
use crate::prop::{backtrack, enable_watchlists, enqueue_assignment, propagate, Reason};
use crate::state::SatState;

/// Vivify the irredundant long clauses until the budget runs out.
///
/// Returns `false` when the budget ran out first.
pub fn vivify(
    mut ctx: partial!(
        Context,
        mut AssignmentP,
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
    ),
    budget: u64,
) -> bool {
    debug_assert_eq!(ctx.part(TrailP).current_level(), 0);

    let budget_limit = ctx.part(SolverStateP).bogo_props.saturating_add(budget);

    enable_watchlists(ctx.borrow());

    let crefs: Vec<ClauseRef> = ctx.part(ClauseDbP).clauses().to_vec();

    for cref in crefs {
        if ctx.part(SolverStateP).bogo_props >= budget_limit {
            return false;
        }
        if ctx.part(SolverStateP).sat_state != SatState::Unknown {
            return true;
        }

        let header = ctx.part(ClauseAllocP).header(cref);
        if header.deleted() || header.redundant() {
            continue;
        }

        let lits: Vec<Lit> = ctx.part(ClauseAllocP).clause(cref).lits().to_vec();

        if lits
            .iter()
            .any(|&lit| ctx.part(AssignmentP).lit_is_true(lit))
        {
            // Satisfied at level 0; the next simplification pass removes it.
            continue;
        }

        // The clause must not propagate against its own assumptions.
        ctx.part_mut(WatchlistsP)
            .unwatch_clause(cref, [lits[0], lits[1]]);

        let mut kept: Vec<Lit> = vec![];
        let mut shortened = false;

        ctx.part_mut(TrailP).new_decision_level();

        for &lit in lits.iter() {
            match ctx.part(AssignmentP).lit_value(lit) {
                Some(true) => {
                    // The assumed prefix already implies this literal.
                    kept.push(lit);
                    shortened = true;
                    break;
                }
                Some(false) => {
                    // Implied false by the prefix, so it contributes nothing.
                    shortened = true;
                    continue;
                }
                None => {
                    kept.push(lit);
                    enqueue_assignment(ctx.borrow(), !lit, Reason::Unit);
                    if propagate(ctx.borrow()).is_err() {
                        // The prefix alone is contradictory, it forms a clause by itself.
                        shortened = kept.len() < lits.len();
                        break;
                    }
                }
            }
        }

        backtrack(ctx.borrow(), 0);

        if shortened && kept.len() < lits.len() {
            proof::migrate_clause(ctx.borrow(), &kept, &lits);
            db::delete_clause(ctx.borrow(), cref);
            store_vivified(ctx.borrow(), &kept);
        } else {
            ctx.part_mut(WatchlistsP)
                .watch_clause(cref, [lits[0], lits[1]]);
        }
    }

    true
}

/// Store the shortened clause in the store matching its new length.
fn store_vivified(
    mut ctx: partial!(
        Context,
        mut AssignmentP,
        mut BinaryClausesP,
        mut ClauseAllocP,
        mut ClauseDbP,
        mut ImplGraphP,
        mut SolverStateP,
        mut TernaryClausesP,
        mut TrailP,
        mut WatchlistsP,
    ),
    lits: &[Lit],
) {
    match lits[..] {
        [] => ctx.part_mut(SolverStateP).sat_state = SatState::Unsat,
        [lit] => {
            if ctx.part(AssignmentP).lit_is_false(lit) {
                ctx.part_mut(SolverStateP).sat_state = SatState::Unsat;
            } else if ctx.part(AssignmentP).lit_is_unk(lit) {
                enqueue_assignment(ctx.borrow(), lit, Reason::Unit);
            }
        }
        [lit_0, lit_1] => ctx
            .part_mut(BinaryClausesP)
            .add_binary_clause([lit_0, lit_1], false),
        [lit_0, lit_1, lit_2] => ctx
            .part_mut(TernaryClausesP)
            .add_ternary_clause([lit_0, lit_1, lit_2], false),
        _ => {
            let mut header = ClauseHeader::new();
            header.set_redundant(false);
            let new_cref = db::add_clause(ctx.borrow(), header, lits);
            if ctx.part(WatchlistsP).enabled() {
                ctx.part_mut(WatchlistsP)
                    .watch_clause(new_cref, [lits[0], lits[1]]);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use partial_ref::IntoPartialRefMut;

    use xorsat_formula::lits;

    use crate::context::set_var_count;
    use crate::load::load_clause;

    #[test]
    fn implied_literal_shortens_clause() {
        let mut ctx = Context::default();
        let mut ctx = ctx.into_partial_ref_mut();

        set_var_count(ctx.borrow(), 4);

        // Assuming -1 and -2 propagates 3 via the two binaries, so (1 2 3 4) loses 4.
        load_clause(ctx.borrow(), &lits![1, 2, 3, 4]);
        load_clause(ctx.borrow(), &lits![1, 3]);

        assert!(vivify(ctx.borrow(), 1_000_000));

        assert_eq!(ctx.part(ClauseDbP).count_irredundant(), 0);
        assert_eq!(ctx.part(TernaryClausesP).count(), 1);
    }
}
