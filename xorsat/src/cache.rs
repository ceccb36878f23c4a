//! The implication cache.
//!
//! For each literal this stores a compact list of literals it implies through binary
//! propagation, tagged with whether the implication path consists of irredundant clauses only.
//! The cache is filled during failed literal probing and consulted by conflict clause
//! minimization. When a variable is eliminated or replaced its rows are freed.
use xorsat_formula::{Lit, Var};

/// A cached implication.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct CacheEntry {
    pub lit: Lit,
    /// Whether the implying path uses only irredundant clauses.
    pub irred: bool,
}

/// The implication cache.
#[derive(Default)]
pub struct ImplCache {
    implied: Vec<Vec<CacheEntry>>,
}

impl ImplCache {
    /// Update structures for a new variable count.
    pub fn set_var_count(&mut self, count: usize) {
        self.implied.resize(count * 2, vec![]);
    }

    /// The cached implications of a literal.
    pub fn implied(&self, lit: Lit) -> &[CacheEntry] {
        &self.implied[lit.code()]
    }

    /// Replace the cached implications of a literal.
    pub fn set_implied(&mut self, lit: Lit, entries: Vec<CacheEntry>) {
        self.implied[lit.code()] = entries;
    }

    /// Free the rows of a variable that left the formula.
    pub fn clear_var(&mut self, var: Var) {
        self.implied[var.positive().code()] = vec![];
        self.implied[var.negative().code()] = vec![];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use xorsat_formula::{lit, var};

    #[test]
    fn rows_are_per_polarity() {
        let mut cache = ImplCache::default();
        cache.set_var_count(3);

        cache.set_implied(
            lit!(1),
            vec![CacheEntry {
                lit: lit!(-2),
                irred: true,
            }],
        );

        assert_eq!(cache.implied(lit!(1)).len(), 1);
        assert!(cache.implied(lit!(-1)).is_empty());

        cache.clear_var(var!(1));
        assert!(cache.implied(lit!(1)).is_empty());
    }
}
