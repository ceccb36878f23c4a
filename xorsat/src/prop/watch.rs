//! Watchlists for long clauses.
//!
//! Each pooled clause has two watches pointing at it, kept in the lists of two different literals
//! of the clause. Whenever the watches move to different literals the clause's literals are
//! permuted so the watched literals sit at positions 0 and 1.
//!
//! When a clause is not unit under the current assignment, the watches point at two non-false
//! literals. When a clause is unit and thus propagating, the true literal is watched and in
//! position 0, the other watched literal is the one with the largest decision level and kept in
//! position 1. When a clause becomes satisfied before becoming unit the watches can be kept as
//! they were. There is no need to update watchlists on backtracking, as unassigning variables
//! cannot invalidate the invariant.
//!
//! Each watch also carries a blocking literal, some literal of the clause different from the
//! watched one. When the blocking literal is true the clause is satisfied and the watch can be
//! skipped without loading the clause. Blocking literals are a hint only: propagation falls back
//! to reading the clause and never relies on them for correctness.
//!
//! The lists can be disabled as a whole, which several passes use when they delete or relocate
//! clauses wholesale. The next propagation rebuilds them from the surviving clauses.
use partial_ref::{partial, PartialRef};

use xorsat_formula::Lit;

use crate::clause::ClauseRef;
use crate::context::{parts::*, Context};

/// A watch on a long clause.
#[derive(Copy, Clone)]
pub struct Watch {
    /// Clause which has the referring lit in position 0 or 1.
    pub cref: ClauseRef,
    /// A lit of the clause, different from the referring lit.
    pub blocking: Lit,
}

/// Watchlists to detect clauses that became unit.
pub struct Watchlists {
    /// Contains only valid data when `enabled` is set.
    watches: Vec<Vec<Watch>>,
    enabled: bool,
}

impl Default for Watchlists {
    fn default() -> Watchlists {
        Watchlists {
            watches: vec![],
            enabled: true,
        }
    }
}

impl Watchlists {
    /// Update structures for a new variable count.
    pub fn set_var_count(&mut self, count: usize) {
        self.watches.resize(count * 2, vec![]);
    }

    /// Start watching a clause.
    ///
    /// `lits` have to be the first two literals of the given clause.
    pub fn watch_clause(&mut self, cref: ClauseRef, lits: [Lit; 2]) {
        for i in 0..2 {
            let watch = Watch {
                cref,
                blocking: lits[i ^ 1],
            };
            self.watches[(!lits[i]).code()].push(watch);
        }
    }

    /// Return watches for a given literal.
    pub fn watched_by_mut(&mut self, lit: Lit) -> &mut Vec<Watch> {
        &mut self.watches[lit.code()]
    }

    /// Make a literal watch a clause.
    pub fn add_watch(&mut self, lit: Lit, watch: Watch) {
        self.watches[lit.code()].push(watch)
    }

    /// Remove both watches of a clause.
    ///
    /// `lits` have to be the first two literals of the given clause.
    pub fn unwatch_clause(&mut self, cref: ClauseRef, lits: [Lit; 2]) {
        for &lit in lits.iter() {
            let list = &mut self.watches[(!lit).code()];
            if let Some(pos) = list.iter().position(|watch| watch.cref == cref) {
                list.remove(pos);
            }
        }
    }

    /// Whether the lists are up to date.
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Drop all watches and mark the lists as out of date.
    pub fn disable(&mut self) {
        for list in self.watches.iter_mut() {
            list.clear();
        }
        self.enabled = false;
    }

    fn mark_enabled(&mut self) {
        self.enabled = true;
    }
}

/// Rebuild the watchlists from the clause database if they are disabled.
pub fn enable_watchlists(
    mut ctx: partial!(Context, mut WatchlistsP, ClauseAllocP, ClauseDbP),
) {
    if ctx.part(WatchlistsP).enabled() {
        return;
    }

    let (watchlists, mut ctx) = ctx.split_part_mut(WatchlistsP);
    let (db, ctx) = ctx.split_part(ClauseDbP);
    let alloc = ctx.part(ClauseAllocP);

    for &cref in db.clauses().iter() {
        let clause = alloc.clause(cref);
        if clause.header().deleted() {
            continue;
        }
        let lits = clause.lits();
        watchlists.watch_clause(cref, [lits[0], lits[1]]);
    }

    watchlists.mark_enabled();
}
