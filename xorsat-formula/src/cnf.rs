//! CNF formulas with optional parity constraints.
use std::cmp::max;
use std::fmt;
use std::iter::Extend;
use std::ops::Range;

use crate::lit::{Lit, Var};

/// A parity (XOR) constraint over a set of variables.
///
/// Represents the constraint `vars[0] ^ vars[1] ^ … ^ vars[n-1] = rhs`.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct XorClause {
    pub vars: Vec<Var>,
    pub rhs: bool,
}

impl XorClause {
    /// Builds a parity constraint from signed literals.
    ///
    /// The right hand side is the parity of the negative literal count, matching the `x` clause
    /// convention of the extended DIMACS format.
    pub fn from_lits(lits: &[Lit]) -> XorClause {
        let mut rhs = false;
        let vars = lits
            .iter()
            .map(|&lit| {
                rhs ^= lit.is_negative();
                lit.var()
            })
            .collect();
        XorClause { vars, rhs }
    }
}

/// Types that can receive variables, clauses and parity constraints.
///
/// Implemented by [`CnfFormula`] and by the solver itself, so code that produces constraints (like
/// the DIMACS parser) can target either.
pub trait ExtendFormula {
    /// Appends a clause.
    fn add_clause(&mut self, literals: &[Lit]);

    /// Appends a parity constraint.
    fn add_xor_clause(&mut self, xor: &XorClause);

    /// Adds a fresh variable and returns it.
    fn new_var(&mut self) -> Var;
}

/// A formula in conjunctive normal form, optionally extended with parity constraints.
///
/// Clause literals are kept in a single backing buffer, which is more compact than a
/// `Vec<Vec<Lit>>` and keeps iteration cache friendly.
#[derive(Default, Eq)]
pub struct CnfFormula {
    var_count: usize,
    literals: Vec<Lit>,
    clause_ranges: Vec<Range<usize>>,
    xor_clauses: Vec<XorClause>,
}

impl CnfFormula {
    /// Create an empty formula.
    pub fn new() -> CnfFormula {
        CnfFormula::default()
    }

    /// Number of variables in the formula.
    ///
    /// Gaps in the used variable indices are counted, i.e. this is one more than the largest
    /// variable index present (or a larger value explicitly set).
    pub fn var_count(&self) -> usize {
        self.var_count
    }

    /// Increase the number of variables in the formula.
    ///
    /// Does nothing if the formula already has at least `count` variables.
    pub fn set_var_count(&mut self, count: usize) {
        self.var_count = max(self.var_count, count)
    }

    /// Number of clauses in the formula, not counting parity constraints.
    pub fn len(&self) -> usize {
        self.clause_ranges.len()
    }

    /// Whether the formula contains neither clauses nor parity constraints.
    pub fn is_empty(&self) -> bool {
        self.clause_ranges.is_empty() && self.xor_clauses.is_empty()
    }

    /// Iterator over all clauses.
    pub fn iter(&self) -> impl Iterator<Item = &[Lit]> {
        let literals = &self.literals;
        self.clause_ranges
            .iter()
            .map(move |range| &literals[range.clone()])
    }

    /// The formula's parity constraints.
    pub fn xor_clauses(&self) -> &[XorClause] {
        &self.xor_clauses
    }
}

impl ExtendFormula for CnfFormula {
    fn add_clause(&mut self, literals: &[Lit]) {
        let begin = self.literals.len();
        self.literals.extend_from_slice(literals);
        let end = self.literals.len();

        for &lit in self.literals[begin..end].iter() {
            self.var_count = max(lit.index() + 1, self.var_count);
        }

        self.clause_ranges.push(begin..end);
    }

    fn add_xor_clause(&mut self, xor: &XorClause) {
        for &var in xor.vars.iter() {
            self.var_count = max(var.index() + 1, self.var_count);
        }
        self.xor_clauses.push(xor.clone());
    }

    fn new_var(&mut self) -> Var {
        let var = Var::from_index(self.var_count);
        self.var_count += 1;
        var
    }
}

/// Convert any iterable of [`Lit`] iterables into a CnfFormula.
impl<F, I, L> From<F> for CnfFormula
where
    F: IntoIterator<Item = I>,
    I: IntoIterator<Item = L>,
    Vec<Lit>: Extend<L>,
{
    fn from(formula: F) -> CnfFormula {
        let mut cnf_formula = CnfFormula::new();
        for clause in formula {
            let begin = cnf_formula.literals.len();
            cnf_formula.literals.extend(clause);
            let end = cnf_formula.literals.len();

            for &lit in cnf_formula.literals[begin..end].iter() {
                cnf_formula.var_count = max(lit.index() + 1, cnf_formula.var_count);
            }

            cnf_formula.clause_ranges.push(begin..end);
        }
        cnf_formula
    }
}

impl fmt::Debug for CnfFormula {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Debug::fmt(&self.var_count(), f)?;
        f.debug_list().entries(self.iter()).finish()?;
        if !self.xor_clauses.is_empty() {
            f.debug_list().entries(self.xor_clauses.iter()).finish()?;
        }
        Ok(())
    }
}

impl PartialEq for CnfFormula {
    fn eq(&self, other: &CnfFormula) -> bool {
        self.var_count() == other.var_count()
            && self.xor_clauses == other.xor_clauses
            && self.clause_ranges.len() == other.clause_ranges.len()
            && self
                .clause_ranges
                .iter()
                .zip(other.clause_ranges.iter())
                .all(|(range_a, range_b)| {
                    self.literals[range_a.clone()] == other.literals[range_b.clone()]
                })
    }
}

#[cfg(any(test, feature = "proptest-strategies"))]
#[doc(hidden)]
pub mod strategy {
    use super::*;

    use proptest::{collection::SizeRange, prelude::*, *};

    use crate::lit::strategy::lit;

    pub fn vec_formula(
        vars: impl Strategy<Value = usize>,
        clauses: impl Into<SizeRange>,
        clause_len: impl Into<SizeRange>,
    ) -> impl Strategy<Value = Vec<Vec<Lit>>> {
        let clauses = clauses.into();
        let clause_len = clause_len.into();

        // Not using ind_flat_map makes shrinking too expensive
        vars.prop_ind_flat_map(move |vars| {
            collection::vec(
                collection::vec(lit(0..vars), clause_len.clone()),
                clauses.clone(),
            )
        })
    }

    pub fn cnf_formula(
        vars: impl Strategy<Value = usize>,
        clauses: impl Into<SizeRange>,
        clause_len: impl Into<SizeRange>,
    ) -> impl Strategy<Value = CnfFormula> {
        vec_formula(vars, clauses, clause_len)
            .prop_map(|clauses| CnfFormula::from(clauses))
            .no_shrink() // Shrinking too expensive without this
    }
}

#[cfg(test)]
mod tests {
    use super::{strategy::*, *};

    use proptest::*;

    #[test]
    fn simple_roundtrip() {
        let input = cnf![
            1, 2, 3;
            -1, -2;
            7, 2;
            ;
            4, 5;
        ];

        let formula = CnfFormula::from(input.iter().cloned());

        for (clause, &ref_clause) in formula.iter().zip(input.iter()) {
            assert_eq!(clause, ref_clause);
        }

        assert_eq!(formula.var_count(), 7);
    }

    #[test]
    fn xor_from_lits_tracks_signs() {
        let xor = XorClause::from_lits(&crate::lits![1, 2, 3]);
        assert_eq!(xor.rhs, false);

        let xor = XorClause::from_lits(&crate::lits![-1, 2, 3]);
        assert_eq!(xor.rhs, true);

        let xor = XorClause::from_lits(&crate::lits![-1, -2, 3]);
        assert_eq!(xor.rhs, false);
    }

    #[test]
    fn extend_formula_with_xor() {
        let mut formula = CnfFormula::new();
        formula.add_clause(&crate::lits![1, 2]);
        formula.add_xor_clause(&XorClause {
            vars: vec![Var::from_dimacs(4), Var::from_dimacs(5)],
            rhs: false,
        });

        assert_eq!(formula.var_count(), 5);
        assert_eq!(formula.xor_clauses().len(), 1);
    }

    proptest! {
        #[test]
        fn roundtrip_from_vec(input in vec_formula(1..200usize, 0..1000, 0..10)) {
            let formula = CnfFormula::from(input.iter().map(|clause| clause.iter().cloned()));

            for (clause, ref_clause) in formula.iter().zip(input.iter()) {
                prop_assert_eq!(clause, &ref_clause[..]);
            }

            let var_count = input
                .iter()
                .flat_map(|clause| clause.iter().map(|lit| lit.index() + 1))
                .max()
                .unwrap_or(0);

            prop_assert_eq!(formula.var_count(), var_count);
        }
    }
}
