//! Propagation of long clauses.
use std::mem::take;

use partial_ref::{partial, PartialRef};

use xorsat_formula::Lit;

use crate::context::{parts::*, Context};
use crate::proof;

use super::enqueue_assignment;
use super::hyper::common_ancestor;
use super::{Conflict, Reason, Watch};

/// Propagate all literals implied by long clauses watched by the given literal.
///
/// On conflict returns the clause propagating the conflicting assignment.
///
/// See [`prop::watch`](crate::prop::watch) for the invariants that this has to uphold. Watches
/// that stay in this list keep their relative order; a processed watch is either kept in place or
/// moved to a different literal's list.
pub fn propagate_long(
    mut ctx: partial!(
        Context,
        mut AssignmentP,
        mut BinaryClausesP,
        mut ClauseAllocP,
        mut ImplGraphP,
        mut ProofP,
        mut SolverStateP,
        mut TrailP,
        mut WatchlistsP,
        SolverConfigP,
    ),
    lit: Lit,
) -> Result<(), Conflict> {
    let (watchlists, mut ctx) = ctx.split_part_mut(WatchlistsP);

    let mut watches = take(watchlists.watched_by_mut(lit));

    let false_lit = !lit;

    let mut write = 0;
    let mut result = Ok(());

    'watchers: for read in 0..watches.len() {
        let watch = watches[read];

        // If the blocking literal (which is part of the watched clause) is already true, the
        // watched clause is satisfied and we don't even have to look at it.
        if ctx.part(AssignmentP).lit_is_true(watch.blocking) {
            watches[write] = watch;
            write += 1;
            continue;
        }

        let cref = watch.cref;

        ctx.part_mut(SolverStateP).bogo_props += 1;

        // Make sure the literal we are propagating is in position 1. This prepares the literal
        // order for further propagations, as a propagating clause keeps the implied literal in
        // position 0. It also has to happen before we search for a replacement watch, so the
        // watched positions are intact when the search fails.
        let first = {
            let clause = ctx.part_mut(ClauseAllocP).clause_mut(cref);
            let lits = clause.lits_mut();
            if lits[0] == false_lit {
                lits.swap(0, 1);
            }
            lits[0]
        };

        let new_watch = Watch {
            cref,
            blocking: first,
        };

        // If the other watched literal (now the first) isn't the blocking literal, check whether
        // that one is true. If so nothing else needs to be done.
        if first != watch.blocking && ctx.part(AssignmentP).lit_is_true(first) {
            watches[write] = new_watch;
            write += 1;
            continue;
        }

        // Try to find a non-false unwatched literal to replace our current literal as the watched
        // literal.
        let mut replacement = None;
        {
            let assignment = ctx.part(AssignmentP);
            let clause = ctx.part(ClauseAllocP).clause(cref);
            let lits = clause.lits();
            for index in 2..lits.len() {
                if !assignment.lit_is_false(lits[index]) {
                    replacement = Some((index, lits[index]));
                    break;
                }
            }
        }

        if let Some((index, replacement_lit)) = replacement {
            // We found a non-false literal and make it a watched literal by reordering the
            // literals and adding the watch to the corresponding watchlist.
            let clause = ctx.part_mut(ClauseAllocP).clause_mut(cref);
            let lits = clause.lits_mut();
            lits[1] = replacement_lit;
            lits[index] = false_lit;

            debug_assert_ne!(!replacement_lit, lit);
            watchlists.add_watch(!replacement_lit, new_watch);
            continue 'watchers;
        }

        // We didn't find a non-false unwatched literal, so either we're propagating or we have a
        // conflict.
        watches[write] = new_watch;
        write += 1;

        if ctx.part(AssignmentP).lit_is_false(first) {
            // Move all unprocessed watches and stop.
            for rest in read + 1..watches.len() {
                watches[write] = watches[rest];
                write += 1;
            }
            result = Err(Conflict::Long(cref));
            break 'watchers;
        }

        // Otherwise we enqueue a new propagation.
        enqueue_long(ctx.borrow(), first, cref);
    }

    watches.truncate(write);
    *watchlists.watched_by_mut(lit) = watches;

    result
}

/// Enqueue a propagation from a long clause.
///
/// At decision level 1 this attaches a lazy hyper-binary resolvent when all false literals of the
/// clause share a dominator, and uses the new binary clause as the reason instead.
fn enqueue_long(
    mut ctx: partial!(
        Context,
        mut AssignmentP,
        mut BinaryClausesP,
        mut ImplGraphP,
        mut ProofP,
        mut SolverStateP,
        mut TrailP,
        ClauseAllocP,
        SolverConfigP,
    ),
    implied: Lit,
    cref: crate::clause::ClauseRef,
) {
    if ctx.part(TrailP).current_level() == 1 && ctx.part(SolverConfigP).lazy_hyper_binary {
        let reason_lits: Vec<Lit> = ctx.part(ClauseAllocP).clause(cref).lits()[1..].to_vec();
        if let Some(dominator) = common_ancestor(ctx.borrow(), &reason_lits) {
            let binary = [!dominator, implied];
            proof::add_clause(ctx.borrow(), &binary);
            ctx.part_mut(BinaryClausesP).add_binary_clause(binary, true);
            enqueue_assignment(ctx.borrow(), implied, Reason::Binary([!dominator]));
            return;
        }
    }

    enqueue_assignment(ctx.borrow(), implied, Reason::Long(cref));
}
