//! Occurrence indexed clause snapshot for the subsumption and elimination passes.
//!
//! The occurrence index is built from scratch on entry and never maintained during search. All
//! irredundant clauses are lifted out of their stores into a uniform representation; redundant
//! clauses join up to a literal budget. On exit the surviving clauses are pushed back into the
//! binary, ternary and pool stores and the watchlists are rebuilt.
use partial_ref::{partial, PartialRef};

use smallvec::SmallVec;

use xorsat_formula::Lit;

use crate::clause::{db, gc::collect_garbage, ClauseHeader, ClauseRef};
use crate::context::{parts::*, Context};
use crate::proof;
use crate::prop::{enqueue_assignment, Reason};
use crate::state::SatState;

/// Literal budget for including redundant clauses in the snapshot.
const REDUNDANT_LIT_BUDGET: usize = 1_000_000;

pub type OccLits = SmallVec<[Lit; 6]>;

/// A clause lifted into the occurrence snapshot.
pub struct OccClause {
    /// Sorted literals.
    pub lits: OccLits,
    pub redundant: bool,
    pub deleted: bool,
    /// Glue carried over for redundant clauses so it survives the round trip.
    pub glue: usize,
    /// Bit per variable (mod 32), used to prune subsumption checks.
    pub abst: u32,
}

impl OccClause {
    fn new(lits: OccLits, redundant: bool, glue: usize) -> OccClause {
        let abst = calc_abstraction(&lits);
        OccClause {
            lits,
            redundant,
            deleted: false,
            glue,
            abst,
        }
    }
}

/// The abstraction bitmask of a clause.
pub fn calc_abstraction(lits: &[Lit]) -> u32 {
    let mut abst = 0;
    for &lit in lits {
        abst |= 1 << (lit.index() % 32);
    }
    abst
}

/// Occurrence indexed snapshot of the formula.
///
/// Lives only for the duration of one inprocessing phase.
#[derive(Default)]
pub struct OccurIndex {
    pub clauses: Vec<OccClause>,
    /// Clause indices per literal code. May contain entries of deleted clauses and of clauses
    /// that dropped the literal; consumers check.
    pub occ: Vec<Vec<u32>>,
    /// Units derived while operating on the snapshot.
    pub units: Vec<Lit>,
    /// Set when a pass derived the empty clause.
    pub unsat: bool,
    /// Variables of redundant clauses that stayed behind in the pool; they must not be
    /// eliminated.
    pub pinned: Vec<bool>,
}

impl OccurIndex {
    /// Number of live clauses containing the literal.
    pub fn occ_count(&self, lit: Lit) -> usize {
        self.occ[lit.code()]
            .iter()
            .filter(|&&index| {
                let clause = &self.clauses[index as usize];
                !clause.deleted && clause.lits.contains(&lit)
            })
            .count()
    }

    /// Add a new clause to the snapshot and index it.
    pub fn insert(&mut self, lits: OccLits, redundant: bool, glue: usize) -> u32 {
        let index = self.clauses.len() as u32;
        for &lit in lits.iter() {
            self.occ[lit.code()].push(index);
        }
        self.clauses.push(OccClause::new(lits, redundant, glue));
        index
    }

    /// Mark a clause as deleted. The occurrence lists are cleaned lazily.
    pub fn delete(&mut self, index: u32) {
        self.clauses[index as usize].deleted = true;
    }

    /// Remove one literal from a clause, updating the abstraction.
    pub fn strengthen(&mut self, index: u32, lit: Lit) {
        let clause = &mut self.clauses[index as usize];
        clause.lits.retain(|&mut l| l != lit);
        clause.abst = calc_abstraction(&clause.lits);
    }
}

/// Lift all clauses into an occurrence snapshot.
///
/// The long clauses are deleted from the pool and the binary and ternary stores are cleared; the
/// surviving snapshot is written back by [`rebuild`]. Requires a flushed level 0 trail.
pub fn gather(
    mut ctx: partial!(
        Context,
        mut BinaryClausesP,
        mut ClauseAllocP,
        mut ClauseDbP,
        mut TernaryClausesP,
        mut WatchlistsP,
        TrailP,
        VariablesP,
    ),
) -> OccurIndex {
    debug_assert_eq!(ctx.part(TrailP).current_level(), 0);
    debug_assert!(ctx.part(TrailP).trail().is_empty());

    let mut index = OccurIndex::default();
    index.occ.resize(ctx.part(VariablesP).count() * 2, vec![]);
    index.pinned.resize(ctx.part(VariablesP).count(), false);

    let mut redundant_lits = 0;

    let mut binaries = vec![];
    ctx.part(BinaryClausesP).collect_clauses(&mut binaries);
    ctx.part_mut(BinaryClausesP).clear();

    for (lits, redundant) in binaries {
        let mut lits: OccLits = lits.iter().cloned().collect();
        lits.sort_unstable();
        index.insert(lits, redundant, 0);
    }

    let mut ternaries = vec![];
    ctx.part(TernaryClausesP).collect_clauses(&mut ternaries);
    ctx.part_mut(TernaryClausesP).clear();

    for (lits, redundant) in ternaries {
        let mut lits: OccLits = lits.iter().cloned().collect();
        lits.sort_unstable();
        index.insert(lits, redundant, 0);
    }

    let crefs: Vec<ClauseRef> = ctx.part(ClauseDbP).clauses().to_vec();
    for cref in crefs {
        let header = ctx.part(ClauseAllocP).header(cref);
        if header.deleted() {
            continue;
        }
        let redundant = header.redundant();
        let glue = header.glue();

        if redundant {
            redundant_lits += header.len();
            if redundant_lits > REDUNDANT_LIT_BUDGET {
                for &lit in ctx.part(ClauseAllocP).clause(cref).lits() {
                    index.pinned[lit.index()] = true;
                }
                continue;
            }
        }

        let mut lits: OccLits = ctx.part(ClauseAllocP).clause(cref).lits().iter().cloned().collect();
        lits.sort_unstable();

        db::delete_clause(ctx.borrow(), cref);
        index.insert(lits, redundant, glue);
    }

    ctx.part_mut(WatchlistsP).disable();

    index
}

/// Write the surviving snapshot clauses back into the solver stores.
pub fn rebuild(
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
    ),
    index: OccurIndex,
) {
    if index.unsat {
        ctx.part_mut(SolverStateP).sat_state = SatState::Unsat;
        return;
    }

    for unit in index.units {
        if ctx.part(AssignmentP).lit_is_false(unit) {
            proof::add_clause(ctx.borrow(), &[]);
            ctx.part_mut(SolverStateP).sat_state = SatState::Unsat;
            return;
        }
        if ctx.part(AssignmentP).lit_is_unk(unit) {
            enqueue_assignment(ctx.borrow(), unit, Reason::Unit);
        }
    }

    for clause in index.clauses {
        if clause.deleted {
            continue;
        }
        match clause.lits[..] {
            [] => {
                ctx.part_mut(SolverStateP).sat_state = SatState::Unsat;
                return;
            }
            [lit] => {
                if ctx.part(AssignmentP).lit_is_false(lit) {
                    proof::add_clause(ctx.borrow(), &[]);
                    ctx.part_mut(SolverStateP).sat_state = SatState::Unsat;
                    return;
                }
                if ctx.part(AssignmentP).lit_is_unk(lit) {
                    enqueue_assignment(ctx.borrow(), lit, Reason::Unit);
                }
            }
            [lit_0, lit_1] => ctx
                .part_mut(BinaryClausesP)
                .add_binary_clause([lit_0, lit_1], clause.redundant),
            [lit_0, lit_1, lit_2] => ctx
                .part_mut(TernaryClausesP)
                .add_ternary_clause([lit_0, lit_1, lit_2], clause.redundant),
            _ => {
                let mut header = ClauseHeader::new();
                header.set_redundant(clause.redundant);
                header.set_glue(clause.glue);
                db::add_clause(ctx.borrow(), header, &clause.lits);
            }
        }
    }

    collect_garbage(ctx.borrow());
}

/// Whether clause `inner` subsumes clause `outer`, i.e. its literals are a subset.
///
/// Both literal slices have to be sorted.
pub fn subsumes(inner: &[Lit], outer: &[Lit]) -> bool {
    if inner.len() > outer.len() {
        return false;
    }
    let mut outer_iter = outer.iter();
    'inner: for &lit in inner {
        for &candidate in outer_iter.by_ref() {
            if candidate == lit {
                continue 'inner;
            }
            if candidate > lit {
                return false;
            }
        }
        return false;
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
    fn subset_check() {
        assert!(subsumes(&lits![1, 3], &lits![1, 2, 3]));
        assert!(!subsumes(&lits![1, -3], &lits![1, 2, 3]));
        assert!(!subsumes(&lits![1, 2, 3], &lits![1, 3]));
        assert!(subsumes(&[], &lits![1]));
    }

    #[test]
    fn gather_and_rebuild_roundtrip() {
        let mut ctx = Context::default();
        let mut ctx = ctx.into_partial_ref_mut();

        set_var_count(ctx.borrow(), 6);

        load_clause(ctx.borrow(), &lits![1, 2]);
        load_clause(ctx.borrow(), &lits![1, 2, 3]);
        load_clause(ctx.borrow(), &lits![3, 4, 5, 6]);

        let index = gather(ctx.borrow());
        assert_eq!(index.clauses.len(), 3);
        assert_eq!(ctx.part(BinaryClausesP).count(), 0);
        assert_eq!(ctx.part(ClauseDbP).count_irredundant(), 0);

        rebuild(ctx.borrow(), index);

        assert_eq!(ctx.part(BinaryClausesP).count(), 1);
        assert_eq!(ctx.part(TernaryClausesP).count(), 1);
        assert_eq!(ctx.part(ClauseDbP).count_irredundant(), 1);
    }
}
