//! Bounded variable elimination and blocked clause elimination.
use std::cmp::Reverse;
use std::collections::BinaryHeap;

use partial_ref::{partial, PartialRef};

use xorsat_formula::{Lit, Var};

use crate::config::ElimStrategy;
use crate::context::{parts::*, Context};
use crate::proof;
use crate::variables::Removed;

use super::occur::{OccLits, OccurIndex};

/// Eliminate variables by resolution while that shrinks the formula.
///
/// Candidates are processed in order of a cheap score, the product of their occurrence counts.
/// A variable is eliminated when the number of non-tautological resolvents does not exceed the
/// number of replaced clauses (plus the configured slack). The replaced clauses go onto the
/// reconstruction stack as witnesses. Returns `true` when the queue ran dry within the budget.
pub fn eliminate_vars(
    mut ctx: partial!(
        Context,
        mut CacheP,
        mut ProofP,
        mut ReconstructP,
        mut SolverStateP,
        mut VariablesP,
        AssignmentP,
        SolverConfigP,
        XorStateP,
    ),
    index: &mut OccurIndex,
    budget: u64,
) -> bool {
    let budget_limit = ctx.part(SolverStateP).bogo_props.saturating_add(budget);

    let strategy = ctx.part(SolverConfigP).elim_strategy;
    let growth = ctx.part(SolverConfigP).elim_growth;
    let occ_limit = ctx.part(SolverConfigP).elim_occ_limit;

    let var_count = ctx.part(VariablesP).count();

    // Variables referenced by live parity constraints stay untouched; resolving them away would
    // leave dangling matrix columns.
    let mut in_xor = vec![false; var_count];
    for row in ctx.part(XorStateP).rows() {
        for &var in row.vars.iter() {
            in_xor[var.index()] = true;
        }
    }

    let mut heap: BinaryHeap<Reverse<(usize, usize)>> = BinaryHeap::new();

    for var_index in 0..var_count {
        let var = Var::from_index(var_index);
        if !eliminable(ctx.borrow(), &in_xor, index, var) {
            continue;
        }
        let pos = index.occ_count(var.positive());
        let neg = index.occ_count(var.negative());
        if pos + neg == 0 {
            continue;
        }
        heap.push(Reverse((pos * neg, var_index)));
    }

    while let Some(Reverse((stale_score, var_index))) = heap.pop() {
        if ctx.part(SolverStateP).bogo_props >= budget_limit {
            return false;
        }
        if index.unsat {
            return true;
        }

        let var = Var::from_index(var_index);
        if !eliminable(ctx.borrow(), &in_xor, index, var) {
            continue;
        }

        ctx.part_mut(SolverStateP).bogo_props += 1;

        let pos = index.occ_count(var.positive());
        let neg = index.occ_count(var.negative());

        // Scores go stale as neighbours are eliminated; reorder instead of eliminating against
        // an outdated score.
        if pos * neg > stale_score {
            heap.push(Reverse((pos * neg, var_index)));
            continue;
        }

        if pos * neg > occ_limit {
            continue;
        }

        try_eliminate(ctx.borrow(), index, var, strategy, growth);
    }

    true
}

/// Whether a variable is currently a legal elimination candidate.
fn eliminable(
    ctx: partial!(Context, AssignmentP, VariablesP, XorStateP),
    in_xor: &[bool],
    index: &OccurIndex,
    var: Var,
) -> bool {
    let data = ctx.part(VariablesP).var_data(var);
    data.removed == Removed::None
        && !data.frozen
        && !in_xor[var.index()]
        && !index.pinned[var.index()]
        && ctx.part(AssignmentP).var_value(var).is_none()
}

/// Attempt to eliminate a single variable.
fn try_eliminate(
    mut ctx: partial!(
        Context,
        mut CacheP,
        mut ProofP,
        mut ReconstructP,
        mut SolverStateP,
        mut VariablesP,
    ),
    index: &mut OccurIndex,
    var: Var,
    strategy: ElimStrategy,
    growth: usize,
) {
    let pos_clauses = live_clauses(index, var.positive());
    let neg_clauses = live_clauses(index, var.negative());

    let replaced = pos_clauses.len() + neg_clauses.len();

    // The heuristic strategy allows the configured growth slack, the exact strategy is strict.
    let limit = match strategy {
        ElimStrategy::Heuristic => replaced + growth,
        ElimStrategy::Calculate => replaced,
    };

    let mut resolvents: Vec<OccLits> = vec![];

    'outer: for &p in pos_clauses.iter() {
        for &n in neg_clauses.iter() {
            ctx.part_mut(SolverStateP).bogo_props += 1;

            if let Some(resolvent) = resolve(index, p, n, var) {
                resolvents.push(resolvent);
                if resolvents.len() > limit {
                    break 'outer;
                }
            }
        }
    }

    if resolvents.len() > limit {
        return;
    }

    // Additions must precede the deletions they justify.
    for resolvent in resolvents.iter() {
        proof::add_clause(ctx.borrow(), resolvent);
    }

    let mut witnesses: Vec<(u32, Lit)> = vec![];
    witnesses.extend(pos_clauses.iter().map(|&c| (c, var.positive())));
    witnesses.extend(neg_clauses.iter().map(|&c| (c, var.negative())));

    for (clause_index, blocked) in witnesses {
        let lits: Vec<Lit> = index.clauses[clause_index as usize].lits.to_vec();
        proof::delete_clause(ctx.borrow(), &lits);
        ctx.part_mut(ReconstructP).push_witness(blocked, lits);
        index.delete(clause_index);
    }

    // Redundant clauses mentioning the variable are implied; they just go.
    for &lit in [var.positive(), var.negative()].iter() {
        let entries: Vec<u32> = index.occ[lit.code()].clone();
        for clause_index in entries {
            let clause = &index.clauses[clause_index as usize];
            if !clause.deleted && clause.lits.contains(&lit) {
                debug_assert!(clause.redundant);
                let lits: Vec<Lit> = clause.lits.to_vec();
                proof::delete_clause(ctx.borrow(), &lits);
                index.delete(clause_index);
            }
        }
    }

    for resolvent in resolvents {
        match resolvent.len() {
            0 => {
                index.unsat = true;
                return;
            }
            1 => index.units.push(resolvent[0]),
            _ => {
                index.insert(resolvent, false, 0);
            }
        }
    }

    ctx.part_mut(VariablesP).var_data_mut(var).removed = Removed::Eliminated;
    ctx.part_mut(CacheP).clear_var(var);
}

/// The live irredundant clauses containing the literal.
fn live_clauses(index: &OccurIndex, lit: Lit) -> Vec<u32> {
    index.occ[lit.code()]
        .iter()
        .cloned()
        .filter(|&clause_index| {
            let clause = &index.clauses[clause_index as usize];
            !clause.deleted && !clause.redundant && clause.lits.contains(&lit)
        })
        .collect()
}

/// Resolve two clauses on `var`, returning `None` for tautological resolvents.
fn resolve(index: &OccurIndex, p: u32, n: u32, var: Var) -> Option<OccLits> {
    let pos = &index.clauses[p as usize].lits;
    let neg = &index.clauses[n as usize].lits;

    let mut resolvent: OccLits = OccLits::new();

    for &lit in pos.iter().chain(neg.iter()) {
        if lit.var() != var {
            resolvent.push(lit);
        }
    }

    resolvent.sort_unstable();
    resolvent.dedup();

    for pair in resolvent.windows(2) {
        if pair[0].var() == pair[1].var() {
            return None;
        }
    }

    Some(resolvent)
}

/// Delete clauses that are blocked on one of their literals.
///
/// A clause is blocked on `l` when every resolvent with a clause containing `¬l` is a tautology.
/// Blocked clauses can be removed; the witness on the reconstruction stack later fixes the
/// blocking variable's value. Variables in parity constraints are exempt, resolution against an
/// XOR row is not captured by the clause-level check.
pub fn eliminate_blocked_clauses(
    mut ctx: partial!(
        Context,
        mut ProofP,
        mut ReconstructP,
        mut SolverStateP,
        AssignmentP,
        SolverConfigP,
        VariablesP,
        XorStateP,
    ),
    index: &mut OccurIndex,
    budget: u64,
) -> bool {
    let budget_limit = ctx.part(SolverStateP).bogo_props.saturating_add(budget);

    let var_count = ctx.part(VariablesP).count();

    let mut in_xor = vec![false; var_count];
    for row in ctx.part(XorStateP).rows() {
        for &var in row.vars.iter() {
            in_xor[var.index()] = true;
        }
    }

    for var_index in 0..var_count {
        if ctx.part(SolverStateP).bogo_props >= budget_limit {
            return false;
        }

        let var = Var::from_index(var_index);
        if !eliminable(ctx.borrow(), &in_xor, index, var) {
            continue;
        }

        for &lit in [var.positive(), var.negative()].iter() {
            let candidates = live_clauses(index, lit);
            let against = live_clauses(index, !lit);

            for clause_index in candidates {
                ctx.part_mut(SolverStateP).bogo_props += against.len() as u64 + 1;

                let blocked = against.iter().all(|&other| {
                    resolve_is_tautology(index, clause_index, other, lit)
                });

                if blocked {
                    let lits: Vec<Lit> = index.clauses[clause_index as usize].lits.to_vec();
                    proof::delete_clause(ctx.borrow(), &lits);
                    ctx.part_mut(ReconstructP).push_witness(lit, lits);
                    index.delete(clause_index);
                }
            }
        }
    }

    true
}

/// Whether the resolvent of the two clauses on `lit` is a tautology.
fn resolve_is_tautology(index: &OccurIndex, c: u32, d: u32, lit: Lit) -> bool {
    let c_lits = &index.clauses[c as usize].lits;
    let d_lits = &index.clauses[d as usize].lits;

    for &c_lit in c_lits.iter() {
        if c_lit == lit {
            continue;
        }
        if d_lits.contains(&!c_lit) {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    use partial_ref::IntoPartialRefMut;

    use xorsat_formula::{lits, var};

    use crate::context::set_var_count;
    use crate::load::load_clause;
    use crate::proc::occur::gather;

    #[test]
    fn eliminates_a_gate_variable() {
        let mut ctx = Context::default();
        let mut ctx = ctx.into_partial_ref_mut();

        set_var_count(ctx.borrow(), 4);

        // 1 occurs once positively and twice negatively; elimination produces two resolvents.
        // The other variables are frozen so the pure literal rule cannot empty the formula.
        load_clause(ctx.borrow(), &lits![1, 2]);
        load_clause(ctx.borrow(), &lits![-1, 3]);
        load_clause(ctx.borrow(), &lits![-1, 4]);

        for index in 1..4 {
            ctx.part_mut(VariablesP)
                .var_data_mut(Var::from_index(index))
                .frozen = true;
        }

        let mut index = gather(ctx.borrow());
        assert!(eliminate_vars(ctx.borrow(), &mut index, 1_000_000));

        assert_eq!(
            ctx.part(VariablesP).var_data(var!(1)).removed,
            Removed::Eliminated
        );

        let mut live: Vec<Vec<Lit>> = index
            .clauses
            .iter()
            .filter(|c| !c.deleted)
            .map(|c| c.lits.to_vec())
            .collect();
        live.sort();

        assert_eq!(live, vec![lits![2, 3].to_vec(), lits![2, 4].to_vec()]);
        assert!(!ctx.part(ReconstructP).is_empty());
    }

    #[test]
    fn pure_literal_is_eliminated_without_resolvents() {
        let mut ctx = Context::default();
        let mut ctx = ctx.into_partial_ref_mut();

        set_var_count(ctx.borrow(), 3);

        load_clause(ctx.borrow(), &lits![1, 2]);
        load_clause(ctx.borrow(), &lits![1, 3]);

        let mut index = gather(ctx.borrow());
        assert!(eliminate_vars(ctx.borrow(), &mut index, 1_000_000));

        assert_eq!(
            ctx.part(VariablesP).var_data(var!(1)).removed,
            Removed::Eliminated
        );
        assert_eq!(index.clauses.iter().filter(|c| !c.deleted).count(), 0);
    }

    #[test]
    fn frozen_variables_survive() {
        let mut ctx = Context::default();
        let mut ctx = ctx.into_partial_ref_mut();

        set_var_count(ctx.borrow(), 2);

        load_clause(ctx.borrow(), &lits![1, 2]);
        ctx.part_mut(VariablesP).var_data_mut(var!(1)).frozen = true;

        let mut index = gather(ctx.borrow());
        assert!(eliminate_vars(ctx.borrow(), &mut index, 1_000_000));

        assert_eq!(
            ctx.part(VariablesP).var_data(var!(1)).removed,
            Removed::None
        );
    }

    #[test]
    fn blocked_clause_is_removed() {
        let mut ctx = Context::default();
        let mut ctx = ctx.into_partial_ref_mut();

        set_var_count(ctx.borrow(), 3);

        // (1 2 3) is blocked on 1: the only resolution partner produces a tautology on 2.
        load_clause(ctx.borrow(), &lits![1, 2, 3]);
        load_clause(ctx.borrow(), &lits![-1, -2]);

        let mut index = gather(ctx.borrow());
        assert!(eliminate_blocked_clauses(ctx.borrow(), &mut index, 1_000_000));

        let live = index.clauses.iter().filter(|c| !c.deleted).count();
        assert!(live < 2);
    }
}
