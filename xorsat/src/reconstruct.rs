//! Reconstruction data for removed variables.
//!
//! Inprocessing removes variables from the formula by substitution and by elimination. To later
//! extend a model of the reduced formula to the original variables, every removal pushes an entry
//! onto this stack. The entries are replayed in reverse by model reconstruction.
use xorsat_formula::{Lit, Var};

/// A single reconstruction step.
#[derive(Clone, Debug)]
pub enum ReconstructionEntry {
    /// `var` is equivalent to `rep`: its value is the value of `rep`'s variable, negated for a
    /// negative `rep`.
    Equiv { var: Var, rep: Lit },
    /// A clause removed while eliminating or blocking `blocked.var()`. If the clause is not
    /// satisfied by the partial model, the blocked variable is set so `blocked` is true.
    Witness { blocked: Lit, lits: Vec<Lit> },
    /// Entry cancelled by re-introducing its variable.
    Dead,
}

/// Stack of reconstruction steps, append only during solving.
#[derive(Default)]
pub struct ReconstructStack {
    entries: Vec<ReconstructionEntry>,
}

impl ReconstructStack {
    /// Record an equivalence introduced by literal substitution.
    pub fn push_equiv(&mut self, var: Var, rep: Lit) {
        self.entries.push(ReconstructionEntry::Equiv { var, rep });
    }

    /// Record a clause removed on behalf of a variable, with its satisfying literal.
    pub fn push_witness(&mut self, blocked: Lit, lits: Vec<Lit>) {
        debug_assert!(lits.contains(&blocked));
        self.entries.push(ReconstructionEntry::Witness { blocked, lits });
    }

    /// The recorded steps, oldest first.
    pub fn entries(&self) -> &[ReconstructionEntry] {
        &self.entries
    }

    /// Whether any reconstruction is needed.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove and return the witness clauses of a variable that re-enters the formula.
    ///
    /// The entries are tombstoned in place, keeping the positions of all other entries.
    pub fn take_witnesses_for(&mut self, var: Var) -> Vec<Vec<Lit>> {
        let mut clauses = vec![];
        for entry in self.entries.iter_mut() {
            let matches = match entry {
                ReconstructionEntry::Witness { blocked, .. } => blocked.var() == var,
                _ => false,
            };
            if matches {
                if let ReconstructionEntry::Witness { lits, .. } =
                    std::mem::replace(entry, ReconstructionEntry::Dead)
                {
                    clauses.push(lits);
                }
            }
        }
        clauses
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use xorsat_formula::{lit, lits, var};

    #[test]
    fn witnesses_can_be_taken_back() {
        let mut stack = ReconstructStack::default();

        stack.push_equiv(var!(1), lit!(2));
        stack.push_witness(lit!(3), lits![3, 4].to_vec());
        stack.push_witness(lit!(-3), lits![-3, 5].to_vec());
        stack.push_witness(lit!(4), lits![4, 6].to_vec());

        let taken = stack.take_witnesses_for(var!(3));
        assert_eq!(taken.len(), 2);

        let live_witnesses = stack
            .entries()
            .iter()
            .filter(|entry| matches!(entry, ReconstructionEntry::Witness { .. }))
            .count();
        assert_eq!(live_witnesses, 1);
        assert_eq!(stack.entries().len(), 4);
    }
}
