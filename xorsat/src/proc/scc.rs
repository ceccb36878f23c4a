//! Equivalent literal substitution.
//!
//! The binary clauses induce a directed implication graph on literals. Every strongly connected
//! component of that graph is a set of equivalent literals: all its members must take the same
//! value. A component containing a literal and its negation makes the formula unsatisfiable.
//! All other components of size two or more are collapsed onto a single representative, and every
//! clause, watch and XOR row is rewritten accordingly.
use partial_ref::{partial, PartialRef};

use xorsat_formula::{Lit, Var};

use crate::clause::{db, ClauseHeader, ClauseRef};
use crate::context::{parts::*, Context};
use crate::proof;
use crate::prop::{enqueue_assignment, Reason};
use crate::state::SatState;
use crate::variables::Removed;
use crate::xor::gauss::normalize_rows;

/// Find all strongly connected components and substitute their members.
///
/// Returns `false` when a contradiction was found. The caller has to run propagation afterwards
/// to process any unit clauses produced by the rewriting.
pub fn scc_replace(
    mut ctx: partial!(
        Context,
        mut AssignmentP,
        mut BinaryClausesP,
        mut CacheP,
        mut ClauseAllocP,
        mut ClauseDbP,
        mut ImplGraphP,
        mut ProofP,
        mut ReconstructP,
        mut SolverStateP,
        mut TernaryClausesP,
        mut TrailP,
        mut VariablesP,
        mut WatchlistsP,
        mut XorStateP,
    ),
) -> bool {
    debug_assert_eq!(ctx.part(TrailP).current_level(), 0);

    let replacements = match find_equivalences(ctx.borrow()) {
        Some(replacements) => replacements,
        None => {
            proof::add_clause(ctx.borrow(), &[]);
            ctx.part_mut(SolverStateP).sat_state = SatState::Unsat;
            return false;
        }
    };

    ctx.part_mut(BinaryClausesP).reset_added_since_scc();

    if replacements.is_empty() {
        return true;
    }

    for &(var, rep) in replacements.iter() {
        ctx.part_mut(VariablesP).set_replacement(var, rep);
        ctx.part_mut(ReconstructP).push_equiv(var, rep);
        ctx.part_mut(CacheP).clear_var(var);
    }

    apply_replacements(ctx.borrow());

    ctx.part(SolverStateP).sat_state != SatState::Unsat
}

/// Tarjan's algorithm on the literal graph.
///
/// Returns the substitutions `var -> representative literal`, or `None` on a contradictory
/// component. Assigned and removed variables do not take part.
fn find_equivalences(
    ctx: partial!(Context, AssignmentP, BinaryClausesP, VariablesP),
) -> Option<Vec<(Var, Lit)>> {
    let assignment = ctx.part(AssignmentP);
    let binary_clauses = ctx.part(BinaryClausesP);
    let variables = ctx.part(VariablesP);

    let node_count = variables.count() * 2;

    let eligible = |lit: Lit| {
        lit.index() < variables.count()
            && variables.is_live(lit.var())
            && assignment.lit_value(lit).is_none()
    };

    const UNSEEN: u32 = u32::max_value();

    let mut index: Vec<u32> = vec![UNSEEN; node_count];
    let mut lowlink: Vec<u32> = vec![0; node_count];
    let mut on_stack: Vec<bool> = vec![false; node_count];
    let mut scc_stack: Vec<u32> = vec![];
    let mut next_index: u32 = 0;

    let mut replacements: Vec<(Var, Lit)> = vec![];

    // Explicit DFS stack: node and the next edge to explore.
    let mut frames: Vec<(u32, usize)> = vec![];

    for root in 0..node_count {
        if index[root] != UNSEEN || !eligible(Lit::from_code(root)) {
            continue;
        }

        index[root] = next_index;
        lowlink[root] = next_index;
        next_index += 1;
        scc_stack.push(root as u32);
        on_stack[root] = true;
        frames.push((root as u32, 0));

        while let Some(&(node, edge_start)) = frames.last() {
            let watches = binary_clauses.implied(Lit::from_code(node as usize));

            let mut edge = edge_start;
            let mut child = None;
            while edge < watches.len() {
                let target = watches[edge].implied;
                edge += 1;

                if !eligible(target) {
                    continue;
                }

                let target_code = target.code();
                if index[target_code] == UNSEEN {
                    child = Some(target_code as u32);
                    break;
                } else if on_stack[target_code] {
                    lowlink[node as usize] = lowlink[node as usize].min(index[target_code]);
                }
            }

            frames.last_mut().unwrap().1 = edge;

            if let Some(child) = child {
                index[child as usize] = next_index;
                lowlink[child as usize] = next_index;
                next_index += 1;
                scc_stack.push(child);
                on_stack[child as usize] = true;
                frames.push((child, 0));
                continue;
            }

            // All edges explored: pop the frame, update the parent and emit a component.
            frames.pop();

            if let Some(&(parent, _)) = frames.last() {
                lowlink[parent as usize] =
                    lowlink[parent as usize].min(lowlink[node as usize]);
            }

            if lowlink[node as usize] == index[node as usize] {
                let start = scc_stack
                    .iter()
                    .rposition(|&member| member == node)
                    .unwrap();
                let members: Vec<u32> = scc_stack.drain(start..).collect();
                for &member in members.iter() {
                    on_stack[member as usize] = false;
                }

                if members.len() > 1 {
                    if !collect_component(&members, &mut replacements) {
                        return None;
                    }
                }
            }
        }
    }

    Some(replacements)
}

/// Turn one component into substitutions, detecting contradictory components.
fn collect_component(members: &[u32], replacements: &mut Vec<(Var, Lit)>) -> bool {
    let mut lits: Vec<Lit> = members
        .iter()
        .map(|&code| Lit::from_code(code as usize))
        .collect();
    lits.sort_unstable();

    for pair in lits.windows(2) {
        if pair[0].var() == pair[1].var() {
            return false;
        }
    }

    let rep = lits[0];
    for &lit in lits[1..].iter() {
        // lit is equivalent to rep; record the substitution for lit's positive literal.
        replacements.push((lit.var(), rep ^ lit.is_negative()));
    }

    true
}

/// Rewrite all clauses, watches and XOR rows through the replacement table.
fn apply_replacements(
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
        mut WatchlistsP,
        mut XorStateP,
        VariablesP,
    ),
) {
    let mut binaries = vec![];
    ctx.part(BinaryClausesP).collect_clauses(&mut binaries);
    ctx.part_mut(BinaryClausesP).clear();

    let mut ternaries = vec![];
    ctx.part(TernaryClausesP).collect_clauses(&mut ternaries);
    ctx.part_mut(TernaryClausesP).clear();

    ctx.part_mut(WatchlistsP).disable();

    for (lits, redundant) in binaries {
        rewrite_clause(ctx.borrow(), &lits, redundant, None);
    }

    for (lits, redundant) in ternaries {
        rewrite_clause(ctx.borrow(), &lits, redundant, None);
    }

    let crefs: Vec<ClauseRef> = ctx.part(ClauseDbP).clauses().to_vec();
    for cref in crefs {
        let header = ctx.part(ClauseAllocP).header(cref);
        if header.deleted() {
            continue;
        }
        let redundant = header.redundant();
        let lits: Vec<Lit> = ctx.part(ClauseAllocP).clause(cref).lits().to_vec();

        let changed = lits
            .iter()
            .any(|&lit| ctx.part(VariablesP).replacement(lit) != lit);
        if !changed {
            continue;
        }

        db::delete_clause(ctx.borrow(), cref);
        rewrite_clause(ctx.borrow(), &lits, redundant, Some(&lits));
    }

    normalize_rows(ctx.borrow());
}

/// Map a clause through the replacement table and store the result.
///
/// `old_lits` is given when the original still has to be deleted from the proof.
fn rewrite_clause(
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
        mut WatchlistsP,
        VariablesP,
    ),
    lits: &[Lit],
    redundant: bool,
    old_lits: Option<&[Lit]>,
) {
    let mut mapped: Vec<Lit> = lits
        .iter()
        .map(|&lit| ctx.part(VariablesP).replacement(lit))
        .collect();

    let changed = mapped[..] != *lits;

    mapped.sort_unstable();
    mapped.dedup();

    // Tautologies vanish.
    for pair in mapped.windows(2) {
        if pair[0].var() == pair[1].var() {
            if changed {
                proof::delete_clause(ctx.borrow(), old_lits.unwrap_or(lits));
            }
            return;
        }
    }

    // Drop false literals and satisfied clauses against the level 0 assignment.
    let mut simplified: Vec<Lit> = vec![];
    for &lit in mapped.iter() {
        match ctx.part(AssignmentP).lit_value(lit) {
            Some(true) => {
                if changed {
                    proof::delete_clause(ctx.borrow(), old_lits.unwrap_or(lits));
                }
                return;
            }
            Some(false) => (),
            None => simplified.push(lit),
        }
    }

    if changed {
        proof::migrate_clause(ctx.borrow(), &simplified, old_lits.unwrap_or(lits));
    }

    match simplified[..] {
        [] => ctx.part_mut(SolverStateP).sat_state = SatState::Unsat,
        [lit] => {
            if ctx.part(AssignmentP).lit_value(lit).is_none() {
                enqueue_assignment(ctx.borrow(), lit, Reason::Unit);
            }
        }
        [lit_0, lit_1] => ctx
            .part_mut(BinaryClausesP)
            .add_binary_clause([lit_0, lit_1], redundant),
        [lit_0, lit_1, lit_2] => ctx
            .part_mut(TernaryClausesP)
            .add_ternary_clause([lit_0, lit_1, lit_2], redundant),
        _ => {
            let mut header = ClauseHeader::new();
            header.set_redundant(redundant);
            db::add_clause(ctx.borrow(), header, &simplified);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use partial_ref::IntoPartialRefMut;

    use xorsat_formula::{lit, lits, var};

    use crate::context::set_var_count;
    use crate::load::load_clause;
    use crate::prop::propagate;
    use crate::simplify::prove_units;

    #[test]
    fn collapses_equivalent_literals() {
        let mut ctx = Context::default();
        let mut ctx = ctx.into_partial_ref_mut();

        set_var_count(ctx.borrow(), 3);

        // 1 <-> 2 and a clause referencing both.
        load_clause(ctx.borrow(), &lits![1, -2]);
        load_clause(ctx.borrow(), &lits![-1, 2]);
        load_clause(ctx.borrow(), &lits![2, 3]);

        assert!(scc_replace(ctx.borrow()));

        assert_eq!(
            ctx.part(VariablesP).var_data(var!(2)).removed,
            Removed::Replaced
        );
        assert_eq!(ctx.part(VariablesP).replacement(lit!(2)), lit!(1));

        // The mixed clause now connects 1 and 3.
        let mut binaries = vec![];
        ctx.part(BinaryClausesP).collect_clauses(&mut binaries);
        assert!(binaries.iter().any(|(lits, _)| *lits == lits![1, 3]));
    }

    #[test]
    fn contradictory_cycle_is_unsat() {
        let mut ctx = Context::default();
        let mut ctx = ctx.into_partial_ref_mut();

        set_var_count(ctx.borrow(), 2);

        // The cycle 1 -> 2 -> 1 together with 1 -> -2 -> 1 puts a variable and its negation
        // into one component.
        load_clause(ctx.borrow(), &lits![-1, 2]);
        load_clause(ctx.borrow(), &lits![-2, -1]);
        load_clause(ctx.borrow(), &lits![1, -2]);
        load_clause(ctx.borrow(), &lits![2, 1]);

        assert!(propagate(ctx.borrow()).is_ok());
        prove_units(ctx.borrow());

        assert!(!scc_replace(ctx.borrow()));
        assert_eq!(ctx.part(SolverStateP).sat_state, SatState::Unsat);
    }
}
