//! Recovering parity constraints from CNF clauses.
//!
//! A parity constraint over `k` variables encoded in CNF consists of the `2^(k-1)` clauses over
//! exactly those variables whose negation counts all have the same parity. Clauses are bucketed
//! by their variable set and the distinct sign patterns per bucket are counted; a full bucket is
//! replaced by a single XOR row.
use partial_ref::{partial, PartialRef};

use rustc_hash::FxHashMap;

use xorsat_formula::{Lit, Var};

use crate::clause::{db, ClauseRef};
use crate::context::{parts::*, Context};
use crate::proof;

#[derive(Copy, Clone)]
enum Source {
    Ternary([Lit; 3]),
    Long(ClauseRef),
}

#[derive(Default)]
struct Bucket {
    /// Bitsets of the sign patterns seen, one per negation parity.
    even_seen: u64,
    odd_seen: u64,
    sources: Vec<(u32, Source)>,
}

/// Extract parity constraints from the irredundant ternary and long clauses.
///
/// Only clauses up to the configured size take part; one bogo-prop is charged per inspected
/// clause and the pass stops when `budget` is exhausted. Returns the number of recovered
/// constraints.
pub fn extract_xors(
    mut ctx: partial!(
        Context,
        mut ClauseAllocP,
        mut ClauseDbP,
        mut ProofP,
        mut SolverStateP,
        mut TernaryClausesP,
        mut WatchlistsP,
        mut XorStateP,
        SolverConfigP,
    ),
    budget: u64,
) -> usize {
    let max_size = ctx.part(SolverConfigP).xor_extract_max_size.min(6);
    if max_size < 3 {
        return 0;
    }

    let budget_limit = ctx.part(SolverStateP).bogo_props.saturating_add(budget);

    let mut buckets: FxHashMap<Vec<Var>, Bucket> = FxHashMap::default();

    let mut ternaries = vec![];
    ctx.part(TernaryClausesP).collect_clauses(&mut ternaries);

    for (lits, redundant) in ternaries {
        if redundant {
            continue;
        }
        note_clause(ctx.borrow(), &mut buckets, &lits, Source::Ternary(lits));
        if ctx.part(SolverStateP).bogo_props >= budget_limit {
            return 0;
        }
    }

    let crefs: Vec<ClauseRef> = ctx.part(ClauseDbP).clauses().to_vec();
    for cref in crefs {
        let header = ctx.part(ClauseAllocP).header(cref);
        if header.deleted() || header.redundant() || header.len() > max_size {
            continue;
        }
        let mut lits: Vec<Lit> = ctx.part(ClauseAllocP).clause(cref).lits().to_vec();
        lits.sort_unstable();
        note_clause(ctx.borrow(), &mut buckets, &lits, Source::Long(cref));
        if ctx.part(SolverStateP).bogo_props >= budget_limit {
            return 0;
        }
    }

    let mut found = 0;
    let mut dropped_longs = false;

    for (vars, bucket) in buckets {
        let k = vars.len();
        let needed: u32 = 1 << (k - 1);

        // Negation counts of one parity must cover every pattern of that parity.
        let (rhs, parity) = if bucket.even_seen.count_ones() == needed {
            (true, 0)
        } else if bucket.odd_seen.count_ones() == needed {
            (false, 1)
        } else {
            continue;
        };

        ctx.part_mut(XorStateP).add_row(&vars, rhs);
        found += 1;

        for &(mask, source) in bucket.sources.iter() {
            if mask.count_ones() & 1 != parity {
                continue;
            }
            match source {
                Source::Ternary(lits) => {
                    if ctx.part_mut(TernaryClausesP).remove_ternary_clause(lits) {
                        proof::delete_clause(ctx.borrow(), &lits);
                    }
                }
                Source::Long(cref) => {
                    if !ctx.part(ClauseAllocP).header(cref).deleted() {
                        let lits: Vec<Lit> =
                            ctx.part(ClauseAllocP).clause(cref).lits().to_vec();
                        proof::delete_clause(ctx.borrow(), &lits);
                        db::delete_clause(ctx.borrow(), cref);
                        dropped_longs = true;
                    }
                }
            }
        }
    }

    if dropped_longs {
        ctx.part_mut(WatchlistsP).disable();
    }

    found
}

/// Sort a clause into its variable set bucket.
fn note_clause(
    mut ctx: partial!(Context, mut SolverStateP),
    buckets: &mut FxHashMap<Vec<Var>, Bucket>,
    sorted_lits: &[Lit],
    source: Source,
) {
    ctx.part_mut(SolverStateP).bogo_props += 1;

    let vars: Vec<Var> = sorted_lits.iter().map(|lit| lit.var()).collect();

    let mut mask = 0u32;
    for (index, lit) in sorted_lits.iter().enumerate() {
        if lit.is_negative() {
            mask |= 1 << index;
        }
    }

    let bucket = buckets.entry(vars).or_default();

    if mask.count_ones() & 1 == 0 {
        bucket.even_seen |= 1 << mask;
    } else {
        bucket.odd_seen |= 1 << mask;
    }
    bucket.sources.push((mask, source));
}

#[cfg(test)]
mod tests {
    use super::*;

    use partial_ref::IntoPartialRefMut;

    use xorsat_formula::lits;

    use crate::context::set_var_count;
    use crate::load::load_clause;

    #[test]
    fn recovers_ternary_parity() {
        let mut ctx = Context::default();
        let mut ctx = ctx.into_partial_ref_mut();

        set_var_count(ctx.borrow(), 3);

        // CNF encoding of x1 + x2 + x3 = 1.
        load_clause(ctx.borrow(), &lits![1, 2, 3]);
        load_clause(ctx.borrow(), &lits![1, -2, -3]);
        load_clause(ctx.borrow(), &lits![-1, 2, -3]);
        load_clause(ctx.borrow(), &lits![-1, -2, 3]);

        let found = extract_xors(ctx.borrow(), 1_000_000);

        assert_eq!(found, 1);
        assert_eq!(ctx.part(XorStateP).row_count(), 1);
        assert_eq!(ctx.part(XorStateP).rows()[0].rhs, true);
        assert_eq!(ctx.part(TernaryClausesP).count(), 0);
    }

    #[test]
    fn partial_encodings_are_kept() {
        let mut ctx = Context::default();
        let mut ctx = ctx.into_partial_ref_mut();

        set_var_count(ctx.borrow(), 3);

        load_clause(ctx.borrow(), &lits![1, 2, 3]);
        load_clause(ctx.borrow(), &lits![1, -2, -3]);
        load_clause(ctx.borrow(), &lits![-1, 2, -3]);

        let found = extract_xors(ctx.borrow(), 1_000_000);

        assert_eq!(found, 0);
        assert_eq!(ctx.part(XorStateP).row_count(), 0);
        assert_eq!(ctx.part(TernaryClausesP).count(), 3);
    }
}
