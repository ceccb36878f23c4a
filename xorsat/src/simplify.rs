//! Simplification using unit clauses.
use partial_ref::{partial, PartialRef};

use xorsat_formula::Lit;

use crate::binary::simplify_binary;
use crate::clause::db::filter_clauses;
use crate::context::{parts::*, Context};
use crate::proof;
use crate::ternary::simplify_ternary;

/// Flush level 0 assignments from the trail.
///
/// The assignments stay in effect; turning them into implicit unit clauses keeps the trail small
/// and makes the level 0 state the baseline for all further reasoning. Returns whether any new
/// units were flushed.
pub fn prove_units(
    mut ctx: partial!(Context, mut ImplGraphP, mut TrailP),
) -> bool {
    let mut new_unit = false;

    if ctx.part(TrailP).current_level() == 0 {
        let (impl_graph, mut ctx) = ctx.split_part_mut(ImplGraphP);
        let (trail, _) = ctx.split_part_mut(TrailP);

        for &lit in trail.trail() {
            new_unit = true;
            impl_graph.update_removed_unit(lit.var());
        }

        trail.clear();
    }

    new_unit
}

/// Remove satisfied clauses and false literals.
///
/// Requires a fully propagated level 0 trail. Long clauses shrinking below length four move to
/// the inline ternary or binary stores, so the watchlists are rebuilt afterwards.
pub fn simplify(
    mut ctx: partial!(
        Context,
        mut BinaryClausesP,
        mut ClauseAllocP,
        mut ClauseDbP,
        mut ProofP,
        mut SolverStateP,
        mut TernaryClausesP,
        mut WatchlistsP,
        AssignmentP,
    ),
) {
    simplify_binary(ctx.borrow());
    simplify_ternary(ctx.borrow());

    let (assignment, mut ctx) = ctx.split_part(AssignmentP);

    let mut new_lits: Vec<Lit> = vec![];
    let mut migrated: Vec<(Vec<Lit>, Vec<Lit>)> = vec![];
    let mut satisfied: Vec<Vec<Lit>> = vec![];
    let mut short_clauses: Vec<(Vec<Lit>, bool)> = vec![];
    let mut changed = false;

    {
        filter_clauses(ctx.borrow(), |alloc, cref| {
            let clause = alloc.clause_mut(cref);
            let redundant = clause.header().redundant();
            new_lits.clear();
            for &lit in clause.lits() {
                match assignment.lit_value(lit) {
                    None => new_lits.push(lit),
                    Some(true) => {
                        satisfied.push(clause.lits().to_vec());
                        changed = true;
                        return false;
                    }
                    Some(false) => (),
                }
            }
            if new_lits.len() < clause.lits().len() {
                changed = true;
                migrated.push((new_lits.clone(), clause.lits().to_vec()));

                match new_lits[..] {
                    // Cannot have empty or unit clauses after full propagation. An empty clause
                    // would have been a conflict and a unit clause must be satisfied and thus
                    // would have been dropped above.
                    [] | [_] => unreachable!(),
                    ref lits if lits.len() <= 3 => {
                        short_clauses.push((lits.to_vec(), redundant));
                        false
                    }
                    ref lits => {
                        clause.lits_mut()[..lits.len()].copy_from_slice(lits);
                        clause.header_mut().set_len(lits.len());
                        true
                    }
                }
            } else {
                true
            }
        });
    }

    for lits in satisfied {
        proof::delete_clause(ctx.borrow(), &lits);
    }

    for (new, old) in migrated {
        proof::migrate_clause(ctx.borrow(), &new, &old);
    }

    for (lits, redundant) in short_clauses {
        match lits[..] {
            [lit_0, lit_1] => ctx
                .part_mut(BinaryClausesP)
                .add_binary_clause([lit_0, lit_1], redundant),
            [lit_0, lit_1, lit_2] => ctx
                .part_mut(TernaryClausesP)
                .add_ternary_clause([lit_0, lit_1, lit_2], redundant),
            _ => unreachable!(),
        }
    }

    if changed {
        ctx.part_mut(WatchlistsP).disable();
    }
}
