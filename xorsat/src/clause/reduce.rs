//! Clause database cleaning.
//!
//! Cleaning ranks the redundant long clauses by a configurable usefulness metric and deletes the
//! lower ranked fraction. Clauses that are currently the reason of a trail literal are protected
//! via the header mark bit. Afterwards the watchlists are rebuilt from the surviving clauses.
use ordered_float::OrderedFloat;

use partial_ref::{partial, PartialRef};

use crate::config::CleanMetric;
use crate::context::{parts::*, Context};
use crate::proof;
use crate::prop::Reason;

use super::{db, gc::collect_garbage, ClauseHeader, ClauseRef};

/// Rank of a clause under the given cleaning metric; higher means more worth keeping.
fn rank(metric: CleanMetric, header: &ClauseHeader) -> f64 {
    match metric {
        CleanMetric::Glue => -(header.glue() as f64),
        CleanMetric::Size => -(header.len() as f64),
        CleanMetric::Activity => header.activity() as f64,
        CleanMetric::Uses => header.uses() as f64,
        CleanMetric::UsesPerDepth => {
            let uses = header.uses() as f64;
            let avg_depth = header.depth_sum() as f64 / uses.max(1.0);
            uses / (avg_depth + 1.0)
        }
    }
}

/// Delete the less useful part of the redundant long clauses.
pub fn reduce(
    mut ctx: partial!(
        Context,
        mut ClauseAllocP,
        mut ClauseDbP,
        mut ImplGraphP,
        mut ProofP,
        mut SolverStateP,
        mut WatchlistsP,
        SolverConfigP,
        TrailP,
    ),
) {
    mark_reason_clauses(ctx.borrow(), true);

    let mut candidates: Vec<ClauseRef> = vec![];

    for &cref in ctx.part(ClauseDbP).clauses().iter() {
        let header = ctx.part(ClauseAllocP).header(cref);
        if !header.deleted() && header.redundant() && !header.mark() {
            candidates.push(cref);
        }
    }

    let metric = ctx.part(SolverConfigP).clean_metric;
    let keep_ratio = ctx.part(SolverConfigP).clean_keep_ratio;

    {
        let alloc = ctx.part(ClauseAllocP);
        candidates
            .sort_unstable_by_key(|&cref| OrderedFloat(rank(metric, alloc.header(cref))));
    }

    let keep = (candidates.len() as f64 * keep_ratio) as usize;
    let delete_count = candidates.len() - keep.min(candidates.len());

    for &cref in candidates[..delete_count].iter() {
        let lits: Vec<_> = ctx.part(ClauseAllocP).clause(cref).lits().to_vec();
        proof::delete_clause(ctx.borrow(), &lits);
        db::delete_clause(ctx.borrow(), cref);
    }

    // Use counters only reflect the time since the previous cleaning.
    for &cref in candidates[delete_count..].iter() {
        ctx.part_mut(ClauseAllocP).header_mut(cref).reset_uses();
    }

    mark_reason_clauses(ctx.borrow(), false);

    ctx.part_mut(WatchlistsP).disable();

    collect_garbage(ctx.borrow());
}

/// Set or clear the mark bit of every clause that is a reason on the trail.
fn mark_reason_clauses(
    mut ctx: partial!(Context, mut ClauseAllocP, ImplGraphP, TrailP),
    mark: bool,
) {
    let (trail, mut ctx) = ctx.split_part(TrailP);
    let (alloc, ctx) = ctx.split_part_mut(ClauseAllocP);
    let impl_graph = ctx.part(ImplGraphP);

    for &lit in trail.trail().iter() {
        if let &Reason::Long(cref) = impl_graph.reason(lit.var()) {
            alloc.header_mut(cref).set_mark(mark);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use partial_ref::IntoPartialRefMut;

    use xorsat_formula::cnf_formula;

    use crate::clause::db;
    use crate::context::set_var_count;

    #[test]
    fn keeps_low_glue_clauses() {
        let mut ctx = Context::default();
        let mut ctx = ctx.into_partial_ref_mut();

        set_var_count(ctx.borrow(), 20);

        let formula = cnf_formula![
            1, 2, 3, 4;
            5, 6, 7, 8;
            9, 10, 11, 12;
            13, 14, 15, 16;
        ];

        let glues = [2usize, 9, 3, 8];

        let mut crefs = vec![];
        for (lits, &glue) in formula.iter().zip(glues.iter()) {
            let mut header = ClauseHeader::new();
            header.set_redundant(true);
            header.set_glue(glue);
            crefs.push(db::add_clause(ctx.borrow(), header, lits));
        }

        reduce(ctx.borrow());

        let deleted: Vec<bool> = crefs
            .iter()
            .map(|&cref| ctx.part(ClauseAllocP).header(cref).deleted())
            .collect();

        // Half of the clauses go, and the high glue ones go first.
        assert_eq!(deleted.iter().filter(|&&d| d).count(), 2);
        assert!(deleted[1]);
        assert!(deleted[3]);
        assert!(!ctx.part(WatchlistsP).enabled());
    }
}
