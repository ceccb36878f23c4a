//! Subsumption and self-subsuming resolution on the occurrence snapshot.
use partial_ref::{partial, PartialRef};

use xorsat_formula::Lit;

use crate::context::{parts::*, Context};
use crate::proof;

use super::occur::{subsumes, OccurIndex};

/// Run subsumption and strengthening to fixpoint or until the budget is exhausted.
///
/// Every clause passes through a work queue; clauses shortened by strengthening are requeued.
/// Returns `true` when the fixpoint was reached within the budget.
pub fn subsume_pass(
    mut ctx: partial!(Context, mut ProofP, mut SolverStateP),
    index: &mut OccurIndex,
    budget: u64,
) -> bool {
    let budget_limit = ctx.part(SolverStateP).bogo_props.saturating_add(budget);

    let mut queue: Vec<u32> = (0..index.clauses.len() as u32).collect();
    let mut queued: Vec<bool> = vec![true; index.clauses.len()];
    let mut head = 0;

    while head < queue.len() {
        if ctx.part(SolverStateP).bogo_props >= budget_limit {
            return false;
        }
        if index.unsat {
            return true;
        }

        let current = queue[head];
        head += 1;
        if (current as usize) < queued.len() {
            queued[current as usize] = false;
        }

        if index.clauses[current as usize].deleted {
            continue;
        }

        subsume_with(ctx.borrow(), index, current);
        strengthen_with(ctx.borrow(), index, current, &mut queue, &mut queued);
    }

    true
}

/// Delete every clause subsumed by the given clause.
///
/// Scans the occurrence list of the clause's least occurring literal; the abstraction bitmask
/// prunes most non-subsumed candidates before the literal walk.
fn subsume_with(
    mut ctx: partial!(Context, mut ProofP, mut SolverStateP),
    index: &mut OccurIndex,
    current: u32,
) {
    let scan_lit = match least_occurring_lit(index, current) {
        Some(lit) => lit,
        None => return,
    };

    let candidates: Vec<u32> = index.occ[scan_lit.code()].clone();

    for other in candidates {
        if other == current {
            continue;
        }
        ctx.part_mut(SolverStateP).bogo_props += 1;

        let (subsumed, promote) = {
            let clause = &index.clauses[current as usize];
            let other_clause = &index.clauses[other as usize];
            if other_clause.deleted
                || clause.deleted
                || clause.abst & !other_clause.abst != 0
                || !subsumes(&clause.lits, &other_clause.lits)
            {
                (false, false)
            } else {
                // A redundant clause may only stand in for an irredundant one by becoming
                // irredundant itself.
                (true, clause.redundant && !other_clause.redundant)
            }
        };

        if !subsumed {
            continue;
        }

        if promote {
            index.clauses[current as usize].redundant = false;
        }

        let lits: Vec<Lit> = index.clauses[other as usize].lits.to_vec();
        proof::delete_clause(ctx.borrow(), &lits);
        index.delete(other);
    }
}

/// Strengthen other clauses by self-subsuming resolution with the given clause.
///
/// For each literal `l` of the clause, any clause containing `¬l` and all remaining literals can
/// drop `¬l`. Shortened clauses are requeued.
fn strengthen_with(
    mut ctx: partial!(Context, mut ProofP, mut SolverStateP),
    index: &mut OccurIndex,
    current: u32,
    queue: &mut Vec<u32>,
    queued: &mut Vec<bool>,
) {
    let lit_count = index.clauses[current as usize].lits.len();

    for lit_index in 0..lit_count {
        let (lit, abst) = {
            let clause = &index.clauses[current as usize];
            if clause.deleted || lit_index >= clause.lits.len() {
                return;
            }
            (clause.lits[lit_index], clause.abst)
        };

        let candidates: Vec<u32> = index.occ[(!lit).code()].clone();

        for other in candidates {
            if other == current {
                continue;
            }
            ctx.part_mut(SolverStateP).bogo_props += 1;

            let strengthens = {
                let clause = &index.clauses[current as usize];
                let other_clause = &index.clauses[other as usize];
                if other_clause.deleted || !other_clause.lits.contains(&!lit) {
                    false
                } else if abst & !(other_clause.abst) != 0 {
                    false
                } else {
                    // The clause with l flipped must be a subset of the other clause.
                    let mut flipped: Vec<Lit> = clause.lits.to_vec();
                    flipped[lit_index] = !lit;
                    flipped.sort_unstable();
                    subsumes(&flipped, &other_clause.lits)
                }
            };

            if !strengthens {
                continue;
            }

            let old_lits: Vec<Lit> = index.clauses[other as usize].lits.to_vec();
            index.strengthen(other, !lit);
            let new_lits: Vec<Lit> = index.clauses[other as usize].lits.to_vec();

            proof::migrate_clause(ctx.borrow(), &new_lits, &old_lits);

            match new_lits.len() {
                0 => {
                    index.unsat = true;
                    return;
                }
                1 => {
                    index.units.push(new_lits[0]);
                    index.delete(other);
                }
                _ => {
                    if !queued[other as usize] {
                        queued[other as usize] = true;
                        queue.push(other);
                    }
                }
            }
        }
    }
}

/// The literal of the clause with the fewest occurrences.
fn least_occurring_lit(index: &OccurIndex, clause: u32) -> Option<Lit> {
    let clause = &index.clauses[clause as usize];
    clause
        .lits
        .iter()
        .cloned()
        .min_by_key(|&lit| index.occ[lit.code()].len())
}

#[cfg(test)]
mod tests {
    use super::*;

    use partial_ref::IntoPartialRefMut;

    use xorsat_formula::lits;

    use crate::context::set_var_count;
    use crate::load::load_clause;
    use crate::proc::occur::gather;

    #[test]
    fn subsumed_clause_is_deleted() {
        let mut ctx = Context::default();
        let mut ctx = ctx.into_partial_ref_mut();

        set_var_count(ctx.borrow(), 4);

        load_clause(ctx.borrow(), &lits![1, 2]);
        load_clause(ctx.borrow(), &lits![1, 2, 3, 4]);

        let mut index = gather(ctx.borrow());
        assert!(subsume_pass(ctx.borrow(), &mut index, 1_000_000));

        let live = index.clauses.iter().filter(|c| !c.deleted).count();
        assert_eq!(live, 1);
    }

    #[test]
    fn self_subsuming_resolution_strengthens() {
        let mut ctx = Context::default();
        let mut ctx = ctx.into_partial_ref_mut();

        set_var_count(ctx.borrow(), 3);

        // (1 2) and (-1 2 3): the second clause loses -1.
        load_clause(ctx.borrow(), &lits![1, 2]);
        load_clause(ctx.borrow(), &lits![-1, 2, 3]);

        let mut index = gather(ctx.borrow());
        assert!(subsume_pass(ctx.borrow(), &mut index, 1_000_000));

        let mut live: Vec<Vec<Lit>> = index
            .clauses
            .iter()
            .filter(|c| !c.deleted)
            .map(|c| c.lits.to_vec())
            .collect();
        live.sort();

        assert!(live.contains(&lits![2, 3].to_vec()));
        assert_eq!(live.len(), 2);
    }
}
