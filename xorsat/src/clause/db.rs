//! Database for pooled long clauses.
use partial_ref::{partial, PartialRef};

use xorsat_formula::Lit;

use super::{header::HEADER_LEN, ClauseHeader, ClauseRef};

use crate::context::{parts::*, Context};

/// Database for pooled long clauses.
///
/// Removal of clauses from the `clauses` field can be delayed, so the clause header's deleted
/// flag needs to be checked when iterating. The redundancy counts are always up to date.
#[derive(Default)]
pub struct ClauseDb {
    /// May contain deleted clauses, see above.
    clauses: Vec<ClauseRef>,
    count_irred: usize,
    count_red: usize,
    /// Size of deleted but not yet collected clauses.
    garbage_size: usize,
}

impl ClauseDb {
    /// All registered clauses, including not yet collected deleted ones.
    pub fn clauses(&self) -> &[ClauseRef] {
        &self.clauses
    }

    /// The number of live irredundant long clauses.
    pub fn count_irredundant(&self) -> usize {
        self.count_irred
    }

    /// The number of live redundant long clauses.
    pub fn count_redundant(&self) -> usize {
        self.count_red
    }

    /// Buffer space of deleted but not yet collected clauses.
    pub fn garbage_size(&self) -> usize {
        self.garbage_size
    }

    pub(super) fn set_after_gc(&mut self, clauses: Vec<ClauseRef>) {
        self.clauses = clauses;
        self.garbage_size = 0;
    }
}

/// Add a long clause to the database.
pub fn add_clause(
    mut ctx: partial!(Context, mut ClauseAllocP, mut ClauseDbP),
    header: ClauseHeader,
    lits: &[Lit],
) -> ClauseRef {
    let redundant = header.redundant();

    let cref = ctx.part_mut(ClauseAllocP).add_clause(header, lits);

    let db = ctx.part_mut(ClauseDbP);

    db.clauses.push(cref);
    if redundant {
        db.count_red += 1;
    } else {
        db.count_irred += 1;
    }

    cref
}

/// Delete a long clause from the database.
///
/// This only adjusts the clause database, the caller is responsible for emitting a proof step and
/// for the clause's watches (usually by disabling the watchlists).
pub fn delete_clause(mut ctx: partial!(Context, mut ClauseAllocP, mut ClauseDbP), cref: ClauseRef) {
    let (alloc, mut ctx) = ctx.split_part_mut(ClauseAllocP);
    let db = ctx.part_mut(ClauseDbP);

    let header = alloc.header_mut(cref);

    debug_assert!(!header.deleted(), "delete_clause for already deleted clause");

    header.set_deleted(true);

    if header.redundant() {
        db.count_red -= 1;
    } else {
        db.count_irred -= 1;
    }

    db.garbage_size += header.len() + HEADER_LEN;
}

/// Delete a long clause unless it is marked.
///
/// The mark bit protects clauses that are the reason of a literal on the trail. Returns whether
/// the clause was deleted.
pub fn try_delete_clause(
    mut ctx: partial!(Context, mut ClauseAllocP, mut ClauseDbP),
    cref: ClauseRef,
) -> bool {
    if ctx.part(ClauseAllocP).header(cref).mark() {
        false
    } else {
        delete_clause(ctx.borrow(), cref);
        true
    }
}

/// Retain only the long clauses for which the given predicate holds.
///
/// The predicate may mutate the clause. Dropped clauses are deleted from the database; the caller
/// handles proof steps and watches.
pub fn filter_clauses(
    mut ctx: partial!(Context, mut ClauseAllocP, mut ClauseDbP),
    mut predicate: impl FnMut(&mut super::ClauseAlloc, ClauseRef) -> bool,
) {
    let mut clauses = std::mem::replace(&mut ctx.part_mut(ClauseDbP).clauses, vec![]);

    clauses.retain(|&cref| {
        let deleted = ctx.part(ClauseAllocP).header(cref).deleted();
        if deleted {
            return false;
        }
        if predicate(ctx.part_mut(ClauseAllocP), cref) {
            true
        } else {
            delete_clause(ctx.borrow(), cref);
            // Keep the entry so a later garbage collection accounts for it.
            true
        }
    });

    ctx.part_mut(ClauseDbP).clauses = clauses;
}

#[cfg(test)]
mod tests {
    use super::*;

    use partial_ref::IntoPartialRefMut;

    use xorsat_formula::cnf_formula;

    #[test]
    fn adds_and_deletes() {
        let mut ctx = Context::default();
        let mut ctx = ctx.into_partial_ref_mut();

        let clauses = cnf_formula![
            1, 2, 3, 4;
            4, -5, 6, 2;
            -2, 3, -4, 5;
        ];

        let mut crefs = vec![];

        for (index, clause) in clauses.iter().enumerate() {
            let mut header = ClauseHeader::new();
            header.set_redundant(index == 2);
            crefs.push(add_clause(ctx.borrow(), header, clause));
        }

        assert_eq!(ctx.part(ClauseDbP).count_irredundant(), 2);
        assert_eq!(ctx.part(ClauseDbP).count_redundant(), 1);

        delete_clause(ctx.borrow(), crefs[0]);
        delete_clause(ctx.borrow(), crefs[2]);

        assert_eq!(ctx.part(ClauseDbP).count_irredundant(), 1);
        assert_eq!(ctx.part(ClauseDbP).count_redundant(), 0);
        assert!(ctx.part(ClauseDbP).garbage_size() > 0);
    }

    #[test]
    fn marked_clauses_survive_try_delete() {
        let mut ctx = Context::default();
        let mut ctx = ctx.into_partial_ref_mut();

        let clauses = cnf_formula![
            1, 2, 3, 4;
            4, -5, 6, 2;
        ];

        let mut crefs = vec![];
        for clause in clauses.iter() {
            crefs.push(add_clause(ctx.borrow(), ClauseHeader::new(), clause));
        }

        ctx.part_mut(ClauseAllocP).header_mut(crefs[0]).set_mark(true);

        assert!(!try_delete_clause(ctx.borrow(), crefs[0]));
        assert!(try_delete_clause(ctx.borrow(), crefs[1]));

        assert_eq!(ctx.part(ClauseDbP).count_irredundant(), 1);
    }
}
