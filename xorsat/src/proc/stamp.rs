//! DFS stamps on the binary implication graph.
//!
//! A depth first search over the binary implications assigns every literal an enter and leave
//! timestamp. When the interval of a literal contains the interval of another, the second is a
//! DFS descendant and therefore implied. Two stamp sets are kept, one following only irredundant
//! edges and one following all edges; irredundant clauses are only simplified against the
//! irredundant set.
//!
//! The stamps underapproximate reachability (cross edges are not captured), which is fine for
//! the simplifications here: they may miss opportunities but never claim a wrong implication.
use partial_ref::{partial, PartialRef};

use xorsat_formula::Lit;

use crate::clause::{db, ClauseHeader, ClauseRef};
use crate::context::{parts::*, Context};
use crate::proof;
use crate::prop::{enqueue_assignment, Reason};
use crate::state::SatState;

/// Enter and leave timestamps per literal.
pub struct Stamps {
    enter: Vec<u64>,
    leave: Vec<u64>,
}

impl Stamps {
    /// Whether `descendant` was reached inside `ancestor`'s DFS subtree, i.e. the binary graph
    /// contains a path from `ancestor` to `descendant`.
    pub fn implies(&self, ancestor: Lit, descendant: Lit) -> bool {
        ancestor != descendant
            && self.enter[ancestor.code()] <= self.enter[descendant.code()]
            && self.leave[descendant.code()] <= self.leave[ancestor.code()]
    }
}

/// Compute DFS stamps over the binary implication graph.
pub fn compute_stamps(
    ctx: partial!(Context, AssignmentP, BinaryClausesP, VariablesP),
    include_redundant: bool,
) -> Stamps {
    let node_count = ctx.part(VariablesP).count() * 2;
    let binary_clauses = ctx.part(BinaryClausesP);
    let assignment = ctx.part(AssignmentP);

    let mut stamps = Stamps {
        enter: vec![0; node_count],
        leave: vec![0; node_count],
    };

    let mut clock: u64 = 0;
    let mut visited = vec![false; node_count];
    // Explicit DFS stack of (literal code, next edge index).
    let mut frames: Vec<(usize, usize)> = vec![];

    for root in 0..node_count {
        if visited[root] || assignment.lit_value(Lit::from_code(root)).is_some() {
            continue;
        }

        frames.push((root, 0));
        visited[root] = true;
        clock += 1;
        stamps.enter[root] = clock;

        while let Some(&(node, edge_start)) = frames.last() {
            let watches = binary_clauses.implied(Lit::from_code(node));

            let mut edge = edge_start;
            let mut next_child = None;
            while edge < watches.len() {
                let watch = watches[edge];
                edge += 1;

                if watch.redundant && !include_redundant {
                    continue;
                }
                let target = watch.implied.code();
                if visited[target] || assignment.lit_value(watch.implied).is_some() {
                    continue;
                }

                next_child = Some(target);
                break;
            }

            frames.last_mut().unwrap().1 = edge;

            match next_child {
                Some(target) => {
                    visited[target] = true;
                    clock += 1;
                    stamps.enter[target] = clock;
                    frames.push((target, 0));
                }
                None => {
                    let (done, _) = frames.pop().unwrap();
                    clock += 1;
                    stamps.leave[done] = clock;
                }
            }
        }
    }

    stamps
}

/// Remove clauses and literals justified by stamp reachability.
///
/// A clause containing `l` and `m` with `¬l` implying `m` is subsumed by the implied binary
/// `(l ∨ m)` and dropped. A clause containing `l` and `m` with `m` implying `l` can drop `m`.
/// Irredundant clauses only use irredundant implications.
pub fn stamp_simplify(
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
    budget: u64,
) -> bool {
    debug_assert_eq!(ctx.part(TrailP).current_level(), 0);

    let budget_limit = ctx.part(SolverStateP).bogo_props.saturating_add(budget);

    let irred_stamps = compute_stamps(ctx.borrow(), false);
    let full_stamps = compute_stamps(ctx.borrow(), true);

    ctx.part_mut(SolverStateP).bogo_props += ctx.part(VariablesP).count() as u64;

    let mut changed = false;

    // Ternary clauses.
    let mut ternaries = vec![];
    ctx.part(TernaryClausesP).collect_clauses(&mut ternaries);

    for (lits, redundant) in ternaries {
        if ctx.part(SolverStateP).bogo_props >= budget_limit {
            return false;
        }
        ctx.part_mut(SolverStateP).bogo_props += 1;

        let stamps = if redundant { &full_stamps } else { &irred_stamps };

        match simplify_lits(&lits, stamps) {
            StampOutcome::Keep => {}
            StampOutcome::Drop => {
                ctx.part_mut(TernaryClausesP).remove_ternary_clause(lits);
                proof::delete_clause(ctx.borrow(), &lits);
            }
            StampOutcome::Shrink(kept) => {
                ctx.part_mut(TernaryClausesP).remove_ternary_clause(lits);
                proof::migrate_clause(ctx.borrow(), &kept, &lits);
                store_shrunk(ctx.borrow(), &kept, redundant);
            }
        }
    }

    // Long clauses.
    let crefs: Vec<ClauseRef> = ctx.part(ClauseDbP).clauses().to_vec();
    for cref in crefs {
        if ctx.part(SolverStateP).bogo_props >= budget_limit {
            if changed {
                ctx.part_mut(WatchlistsP).disable();
            }
            return false;
        }

        let header = ctx.part(ClauseAllocP).header(cref);
        if header.deleted() {
            continue;
        }
        let redundant = header.redundant();
        let lits: Vec<Lit> = ctx.part(ClauseAllocP).clause(cref).lits().to_vec();

        ctx.part_mut(SolverStateP).bogo_props += lits.len() as u64;

        let stamps = if redundant { &full_stamps } else { &irred_stamps };

        match simplify_lits(&lits, stamps) {
            StampOutcome::Keep => {}
            StampOutcome::Drop => {
                proof::delete_clause(ctx.borrow(), &lits);
                db::delete_clause(ctx.borrow(), cref);
                changed = true;
            }
            StampOutcome::Shrink(kept) => {
                proof::migrate_clause(ctx.borrow(), &kept, &lits);
                db::delete_clause(ctx.borrow(), cref);
                store_shrunk(ctx.borrow(), &kept, redundant);
                changed = true;
            }
        }
    }

    if changed {
        ctx.part_mut(WatchlistsP).disable();
    }

    true
}

enum StampOutcome {
    Keep,
    Drop,
    Shrink(Vec<Lit>),
}

/// Check one clause against a stamp set.
fn simplify_lits(lits: &[Lit], stamps: &Stamps) -> StampOutcome {
    // Subsumption by an implied binary.
    for &l in lits {
        for &m in lits {
            if l != m && stamps.implies(!l, m) {
                return StampOutcome::Drop;
            }
        }
    }

    // Literal removal: m implying l makes m redundant next to l.
    let mut kept: Vec<Lit> = Vec::with_capacity(lits.len());
    'lits: for &m in lits {
        for &l in lits {
            if l != m && stamps.implies(m, l) && !stamps.implies(l, m) {
                continue 'lits;
            }
        }
        kept.push(m);
    }

    if kept.len() < lits.len() {
        StampOutcome::Shrink(kept)
    } else {
        StampOutcome::Keep
    }
}

/// Store a shrunken clause in the store matching its new length.
fn store_shrunk(
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
    ),
    lits: &[Lit],
    redundant: bool,
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
            .add_binary_clause([lit_0, lit_1], redundant),
        [lit_0, lit_1, lit_2] => ctx
            .part_mut(TernaryClausesP)
            .add_ternary_clause([lit_0, lit_1, lit_2], redundant),
        _ => {
            let mut header = ClauseHeader::new();
            header.set_redundant(redundant);
            db::add_clause(ctx.borrow(), header, lits);
        }
    }
}

/// Delete binary clauses implied by a longer path through the binary graph.
///
/// For every binary `(¬a ∨ b)` a bounded breadth first search looks for an alternative path from
/// `a` to `b`; when one exists the direct edge is redundant and removed.
pub fn transitive_reduce(
    mut ctx: partial!(
        Context,
        mut BinaryClausesP,
        mut ProofP,
        mut SolverStateP,
        AssignmentP,
        VariablesP,
    ),
    budget: u64,
) -> bool {
    let budget_limit = ctx.part(SolverStateP).bogo_props.saturating_add(budget);

    let node_count = ctx.part(VariablesP).count() * 2;

    let mut clauses = vec![];
    ctx.part(BinaryClausesP).collect_clauses(&mut clauses);

    let mut seen = vec![false; node_count];
    let mut queue: Vec<Lit> = vec![];

    for (lits, _) in clauses {
        if ctx.part(SolverStateP).bogo_props >= budget_limit {
            return false;
        }

        // The clause (lits[0] ∨ lits[1]) is the edge !lits[0] -> lits[1].
        let from = !lits[0];
        let to = lits[1];

        if ctx.part(AssignmentP).lit_value(from).is_some()
            || ctx.part(AssignmentP).lit_value(to).is_some()
        {
            continue;
        }

        let mut redundant = false;

        queue.clear();
        let mut touched: Vec<Lit> = vec![];
        let mut head = 0;

        seen[from.code()] = true;
        touched.push(from);
        queue.push(from);

        'search: while head < queue.len() {
            let node = queue[head];
            head += 1;

            ctx.part_mut(SolverStateP).bogo_props += 1;
            if ctx.part(SolverStateP).bogo_props >= budget_limit {
                break;
            }

            for watch in ctx.part(BinaryClausesP).implied(node) {
                // Skip the direct edge under test.
                if node == from && watch.implied == to {
                    continue;
                }
                if watch.implied == to {
                    redundant = true;
                    break 'search;
                }
                if !seen[watch.implied.code()] {
                    seen[watch.implied.code()] = true;
                    touched.push(watch.implied);
                    queue.push(watch.implied);
                }
            }
        }

        for lit in touched {
            seen[lit.code()] = false;
        }

        if redundant {
            ctx.part_mut(BinaryClausesP).remove_binary_clause(lits);
            proof::delete_clause(ctx.borrow(), &lits);
        }
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;

    use partial_ref::IntoPartialRefMut;

    use xorsat_formula::lits;

    use crate::context::set_var_count;
    use crate::load::load_clause;

    #[test]
    fn stamps_see_chain_reachability() {
        let mut ctx = Context::default();
        let mut ctx = ctx.into_partial_ref_mut();

        set_var_count(ctx.borrow(), 3);

        load_clause(ctx.borrow(), &lits![-1, 2]);
        load_clause(ctx.borrow(), &lits![-2, 3]);

        let stamps = compute_stamps(ctx.borrow(), false);

        let [a, b, c] = lits![1, 2, 3];
        assert!(stamps.implies(a, b));
        assert!(stamps.implies(a, c));
        assert!(!stamps.implies(b, a));
    }

    #[test]
    fn transitive_edge_is_removed() {
        let mut ctx = Context::default();
        let mut ctx = ctx.into_partial_ref_mut();

        set_var_count(ctx.borrow(), 3);

        load_clause(ctx.borrow(), &lits![-1, 2]);
        load_clause(ctx.borrow(), &lits![-2, 3]);
        load_clause(ctx.borrow(), &lits![-1, 3]);

        assert_eq!(ctx.part(BinaryClausesP).count(), 3);
        assert!(transitive_reduce(ctx.borrow(), 1_000_000));
        assert_eq!(ctx.part(BinaryClausesP).count(), 2);

        let mut remaining = vec![];
        ctx.part(BinaryClausesP).collect_clauses(&mut remaining);
        assert!(!remaining.iter().any(|(lits, _)| *lits == lits![-1, 3]));
    }

    #[test]
    fn stamp_subsumed_clause_is_dropped() {
        let mut ctx = Context::default();
        let mut ctx = ctx.into_partial_ref_mut();

        set_var_count(ctx.borrow(), 4);

        // -1 implies 2, so (1 2 4) is subsumed by the implied (1 2).
        load_clause(ctx.borrow(), &lits![1, 2]);
        load_clause(ctx.borrow(), &lits![1, 2, 4]);

        assert!(stamp_simplify(ctx.borrow(), 1_000_000));
        assert_eq!(ctx.part(TernaryClausesP).count(), 0);
    }
}
