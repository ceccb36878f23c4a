//! Ternary clauses.
//!
//! Like binary clauses, ternary clauses never enter the clause pool. Each clause puts one watch
//! entry under every one of its three literals, and every entry carries the two remaining
//! literals inline, so propagation never has to dereference a clause handle. The two inline
//! literals are kept sorted.
use partial_ref::{partial, PartialRef};

use xorsat_formula::Lit;

use crate::context::{parts::*, Context};
use crate::proof;

/// A ternary clause watch.
///
/// Stored in the list of a literal `lit`; represents the clause `(¬lit ∨ other[0] ∨ other[1])`
/// with `other[0] < other[1]`.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct TernaryWatch {
    pub other: [Lit; 2],
    pub redundant: bool,
}

/// Ternary clauses.
#[derive(Default)]
pub struct TernaryClauses {
    by_lit: Vec<Vec<TernaryWatch>>,
    count: usize,
    redundant_count: usize,
}

impl TernaryClauses {
    /// Update structures for a new variable count.
    pub fn set_var_count(&mut self, count: usize) {
        self.by_lit.resize(count * 2, vec![]);
    }

    /// Add a ternary clause.
    pub fn add_ternary_clause(&mut self, lits: [Lit; 3], redundant: bool) {
        debug_assert!(lits[0].var() != lits[1].var());
        debug_assert!(lits[0].var() != lits[2].var());
        debug_assert!(lits[1].var() != lits[2].var());

        for i in 0..3 {
            let mut other = [lits[(i + 1) % 3], lits[(i + 2) % 3]];
            if other[1] < other[0] {
                other.swap(0, 1);
            }
            self.by_lit[(!lits[i]).code()].push(TernaryWatch {
                other,
                redundant,
            });
        }
        self.count += 1;
        self.redundant_count += redundant as usize;
    }

    /// Watches triggered when the given literal becomes true.
    pub fn watched_by(&self, lit: Lit) -> &[TernaryWatch] {
        &self.by_lit[lit.code()]
    }

    /// Remove a ternary clause given by any permutation of its literals.
    ///
    /// Returns whether the clause was present.
    pub fn remove_ternary_clause(&mut self, lits: [Lit; 3]) -> bool {
        let mut removed = false;
        for i in 0..3 {
            let mut other = [lits[(i + 1) % 3], lits[(i + 2) % 3]];
            if other[1] < other[0] {
                other.swap(0, 1);
            }
            let list = &mut self.by_lit[(!lits[i]).code()];
            if let Some(pos) = list.iter().position(|watch| watch.other == other) {
                if i == 0 {
                    let redundant = list[pos].redundant;
                    self.count -= 1;
                    self.redundant_count -= redundant as usize;
                    removed = true;
                }
                list.remove(pos);
            }
        }
        removed
    }

    /// Number of ternary clauses.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Collect every ternary clause exactly once.
    ///
    /// The emitted literal triples are sorted.
    pub fn collect_clauses(&self, target: &mut Vec<([Lit; 3], bool)>) {
        for code in 0..self.by_lit.len() {
            let first = !Lit::from_code(code);
            for watch in self.by_lit[code].iter() {
                if first < watch.other[0] {
                    target.push(([first, watch.other[0], watch.other[1]], watch.redundant));
                }
            }
        }
    }

    /// Drop all ternary clauses.
    pub fn clear(&mut self) {
        for list in self.by_lit.iter_mut() {
            list.clear();
        }
        self.count = 0;
        self.redundant_count = 0;
    }
}

/// Remove ternary clauses satisfied at level 0 and shrink those with false literals.
///
/// Requires a fully propagated trail. A ternary clause with a false literal and no true literal
/// becomes a binary clause.
pub fn simplify_ternary(
    mut ctx: partial!(
        Context,
        mut BinaryClausesP,
        mut ProofP,
        mut SolverStateP,
        mut TernaryClausesP,
        AssignmentP,
    ),
) {
    let (ternary_clauses, mut ctx) = ctx.split_part_mut(TernaryClausesP);

    let mut deleted: Vec<([Lit; 3], bool)> = vec![];
    let mut shrunk: Vec<([Lit; 2], [Lit; 3], bool)> = vec![];

    {
        let assignment = ctx.part(AssignmentP);

        for code in 0..ternary_clauses.by_lit.len() {
            let first = !Lit::from_code(code);

            ternary_clauses.by_lit[code].retain(|watch| {
                let lits = [first, watch.other[0], watch.other[1]];
                let satisfied = lits.iter().any(|&lit| assignment.lit_is_true(lit));
                let false_count = lits.iter().filter(|&&lit| assignment.lit_is_false(lit)).count();

                if satisfied || false_count != 0 {
                    if first < watch.other[0] {
                        if satisfied {
                            deleted.push((lits, watch.redundant));
                        } else {
                            // After full propagation at most one literal can be false here.
                            let mut pair = [Lit::UNDEF; 2];
                            let mut at = 0;
                            for &lit in lits.iter() {
                                if !assignment.lit_is_false(lit) {
                                    pair[at] = lit;
                                    at += 1;
                                }
                            }
                            debug_assert_eq!(at, 2);
                            shrunk.push((pair, lits, watch.redundant));
                        }
                    }
                    false
                } else {
                    true
                }
            });
        }
    }

    for (lits, redundant) in deleted {
        ternary_clauses.count -= 1;
        ternary_clauses.redundant_count -= redundant as usize;
        proof::delete_clause(ctx.borrow(), &lits);
    }

    for (pair, lits, redundant) in shrunk {
        ternary_clauses.count -= 1;
        ternary_clauses.redundant_count -= redundant as usize;
        proof::add_clause(ctx.borrow(), &pair);
        proof::delete_clause(ctx.borrow(), &lits);
        ctx.part_mut(BinaryClausesP).add_binary_clause(pair, redundant);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use xorsat_formula::lits;

    #[test]
    fn watches_all_three_literals() {
        let mut ternary = TernaryClauses::default();
        ternary.set_var_count(4);

        let [a, b, c] = lits![1, -2, 3];
        ternary.add_ternary_clause([a, b, c], false);

        assert_eq!(ternary.watched_by(!a).len(), 1);
        assert_eq!(ternary.watched_by(!b).len(), 1);
        assert_eq!(ternary.watched_by(!c).len(), 1);
        assert_eq!(ternary.count(), 1);

        let watch = ternary.watched_by(!a)[0];
        assert!(watch.other[0] < watch.other[1]);
    }

    #[test]
    fn collect_lists_each_clause_once() {
        let mut ternary = TernaryClauses::default();
        ternary.set_var_count(5);

        ternary.add_ternary_clause(lits![1, 2, 3], false);
        ternary.add_ternary_clause(lits![-1, 4, -5], true);

        let mut collected = vec![];
        ternary.collect_clauses(&mut collected);

        assert_eq!(collected.len(), 2);
    }

    #[test]
    fn remove_by_permutation() {
        let mut ternary = TernaryClauses::default();
        ternary.set_var_count(4);

        ternary.add_ternary_clause(lits![1, 2, 3], false);
        assert!(ternary.remove_ternary_clause(lits![3, 1, 2]));
        assert_eq!(ternary.count(), 0);
        assert!(ternary.watched_by(lits![-1][0]).is_empty());
    }
}
