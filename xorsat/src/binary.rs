//! Binary clauses.
//!
//! Binary clauses are never stored in the clause pool. Each clause is represented by two watch
//! entries, one under each literal, holding the respective other literal inline. This halves the
//! memory per binary clause and lets propagation run without touching the pool. It also makes the
//! binary implication graph directly scannable, which the equivalence engine, probing and the
//! stamping passes rely on.
use partial_ref::{partial, PartialRef};

use xorsat_formula::Lit;

use crate::context::{parts::*, Context};
use crate::proof;

/// A binary clause watch.
///
/// Stored in the list of a literal `lit`; represents the clause `(¬lit ∨ implied)`, i.e. when
/// `lit` becomes true, `implied` is propagated.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct BinaryWatch {
    pub implied: Lit,
    pub redundant: bool,
}

/// Binary clauses.
#[derive(Default)]
pub struct BinaryClauses {
    by_lit: Vec<Vec<BinaryWatch>>,
    count: usize,
    redundant_count: usize,
    /// Binary clauses added since the last equivalent literal pass.
    added_since_scc: usize,
}

impl BinaryClauses {
    /// Update structures for a new variable count.
    pub fn set_var_count(&mut self, count: usize) {
        self.by_lit.resize(count * 2, vec![]);
    }

    /// Add a binary clause.
    pub fn add_binary_clause(&mut self, lits: [Lit; 2], redundant: bool) {
        debug_assert_ne!(lits[0].var(), lits[1].var());
        for i in 0..2 {
            self.by_lit[(!lits[i]).code()].push(BinaryWatch {
                implied: lits[i ^ 1],
                redundant,
            });
        }
        self.count += 1;
        self.redundant_count += redundant as usize;
        self.added_since_scc += 1;
    }

    /// Watches triggered when the given literal becomes true.
    pub fn implied(&self, lit: Lit) -> &[BinaryWatch] {
        &self.by_lit[lit.code()]
    }

    /// Remove the binary clause consisting of the two given literals.
    ///
    /// Returns whether the clause was present.
    pub fn remove_binary_clause(&mut self, lits: [Lit; 2]) -> bool {
        let mut removed = false;
        for i in 0..2 {
            let list = &mut self.by_lit[(!lits[i]).code()];
            if let Some(pos) = list.iter().position(|watch| watch.implied == lits[i ^ 1]) {
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

    /// Number of binary clauses.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Binary clauses added since the counter was last taken.
    pub fn added_since_scc(&self) -> usize {
        self.added_since_scc
    }

    /// Reset the new clause counter after an equivalent literal pass.
    pub fn reset_added_since_scc(&mut self) {
        self.added_since_scc = 0;
    }

    /// Collect every binary clause exactly once.
    pub fn collect_clauses(&self, target: &mut Vec<([Lit; 2], bool)>) {
        for code in 0..self.by_lit.len() {
            let trigger = Lit::from_code(code);
            let first = !trigger;
            for watch in self.by_lit[code].iter() {
                if first < watch.implied {
                    target.push(([first, watch.implied], watch.redundant));
                }
            }
        }
    }

    /// Drop all binary clauses.
    pub fn clear(&mut self) {
        for list in self.by_lit.iter_mut() {
            list.clear();
        }
        self.count = 0;
        self.redundant_count = 0;
    }
}

/// Remove binary clauses satisfied at level 0.
///
/// Requires a fully propagated trail. A binary clause with a false literal then has a true other
/// literal, so checking for satisfied clauses covers everything.
pub fn simplify_binary(
    mut ctx: partial!(
        Context,
        mut BinaryClausesP,
        mut ProofP,
        mut SolverStateP,
        AssignmentP,
    ),
) {
    let (binary_clauses, mut ctx) = ctx.split_part_mut(BinaryClausesP);

    let mut deleted: Vec<([Lit; 2], bool)> = vec![];

    {
        let assignment = ctx.part(AssignmentP);

        for code in 0..binary_clauses.by_lit.len() {
            let trigger = Lit::from_code(code);
            let first = !trigger;

            binary_clauses.by_lit[code].retain(|watch| {
                let satisfied =
                    assignment.lit_is_true(first) || assignment.lit_is_true(watch.implied);
                if satisfied && first < watch.implied {
                    deleted.push(([first, watch.implied], watch.redundant));
                }
                !satisfied
            });
        }
    }

    for (lits, redundant) in deleted {
        binary_clauses.count -= 1;
        binary_clauses.redundant_count -= redundant as usize;
        proof::delete_clause(ctx.borrow(), &lits);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use xorsat_formula::lits;

    #[test]
    fn watches_both_directions() {
        let mut binary = BinaryClauses::default();
        binary.set_var_count(4);

        let [a, b] = lits![1, -2];
        binary.add_binary_clause([a, b], false);

        assert_eq!(binary.implied(!a), &[BinaryWatch { implied: b, redundant: false }]);
        assert_eq!(binary.implied(!b), &[BinaryWatch { implied: a, redundant: false }]);
        assert_eq!(binary.count(), 1);
    }

    #[test]
    fn collect_lists_each_clause_once() {
        let mut binary = BinaryClauses::default();
        binary.set_var_count(4);

        binary.add_binary_clause(lits![1, 2], false);
        binary.add_binary_clause(lits![-2, 3], true);

        let mut collected = vec![];
        binary.collect_clauses(&mut collected);
        collected.sort();

        assert_eq!(collected.len(), 2);
        assert!(collected.contains(&(lits![1, 2], false)));
        assert!(collected.contains(&(lits![-2, 3], true)));
    }

    #[test]
    fn remove_binary_clause_updates_counts() {
        let mut binary = BinaryClauses::default();
        binary.set_var_count(3);

        binary.add_binary_clause(lits![1, 2], true);
        assert!(binary.remove_binary_clause(lits![1, 2]));
        assert!(!binary.remove_binary_clause(lits![1, 2]));
        assert_eq!(binary.count(), 0);
        assert!(binary.implied(lits![-1][0]).is_empty());
    }
}
