//! Variable metadata and renumbering maps.
use xorsat_formula::{Lit, Var};

/// Why a variable no longer takes part in the search.
///
/// Transitions away from `None` are monotone within a run; a removed variable is never touched
/// again by search or inprocessing.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum Removed {
    None,
    /// Removed by bounded variable elimination; witness clauses are on the reconstruction stack.
    Eliminated,
    /// Substituted by an equivalent literal.
    Replaced,
}

impl Default for Removed {
    fn default() -> Removed {
        Removed::None
    }
}

/// Metadata for a single variable.
#[derive(Copy, Clone, Default)]
pub struct VarData {
    pub removed: Removed,
    /// Frozen variables are excluded from elimination, e.g. because they appear in assumptions.
    pub frozen: bool,
}

impl VarData {
    /// Whether the variable may appear in clauses and the decision order.
    pub fn is_live(&self) -> bool {
        self.removed == Removed::None
    }
}

/// Variable metadata and renumbering maps.
///
/// The solver keeps two numberings: the outer numbering as used by callers and the inner
/// numbering used by the search data structures. Currently the two coincide, but every external
/// interface goes through the maps so an inner renumbering pass only has to update them.
#[derive(Default)]
pub struct Variables {
    var_data: Vec<VarData>,
    /// For replaced variables the literal that substitutes the positive literal.
    replacement: Vec<Lit>,
    outer_from_inner: Vec<Var>,
    inner_from_outer: Vec<Var>,
}

impl Variables {
    /// Number of allocated variables.
    pub fn count(&self) -> usize {
        self.var_data.len()
    }

    /// Allocate a fresh variable.
    pub fn new_var(&mut self) -> Var {
        let var = Var::from_index(self.var_data.len());
        self.var_data.push(VarData::default());
        self.replacement.push(var.positive());
        self.outer_from_inner.push(var);
        self.inner_from_outer.push(var);
        var
    }

    /// Grow the variable count to at least `count`.
    pub fn ensure_count(&mut self, count: usize) {
        while self.var_data.len() < count {
            self.new_var();
        }
    }

    pub fn var_data(&self, var: Var) -> &VarData {
        &self.var_data[var.index()]
    }

    pub fn var_data_mut(&mut self, var: Var) -> &mut VarData {
        &mut self.var_data[var.index()]
    }

    /// Whether a variable is neither eliminated nor replaced.
    pub fn is_live(&self, var: Var) -> bool {
        self.var_data[var.index()].is_live()
    }

    /// Record that `var` is substituted by `rep`.
    ///
    /// `rep`'s variable must not itself be replaced.
    pub fn set_replacement(&mut self, var: Var, rep: Lit) {
        debug_assert!(self.var_data[rep.index()].removed != Removed::Replaced);
        self.replacement[var.index()] = rep;
        self.var_data[var.index()].removed = Removed::Replaced;
    }

    /// Resolve a literal through the replacement table.
    ///
    /// Replacement chains can arise when a representative is replaced by a later pass, so this
    /// follows the table to a fixpoint.
    pub fn replacement(&self, mut lit: Lit) -> Lit {
        while self.var_data[lit.index()].removed == Removed::Replaced {
            let rep = self.replacement[lit.index()];
            lit = rep ^ lit.is_negative();
        }
        lit
    }

    /// Iterator over all live variables.
    pub fn live_var_iter<'a>(&'a self) -> impl Iterator<Item = Var> + 'a {
        let var_data = &self.var_data;
        (0..var_data.len())
            .map(Var::from_index)
            .filter(move |&var| var_data[var.index()].is_live())
    }

    /// Number of live variables.
    pub fn live_count(&self) -> usize {
        self.live_var_iter().count()
    }

    /// Map an inner variable to the outer numbering.
    pub fn outer_from_inner(&self, var: Var) -> Var {
        self.outer_from_inner[var.index()]
    }

    /// Map an outer variable to the inner numbering.
    pub fn inner_from_outer(&self, var: Var) -> Var {
        self.inner_from_outer[var.index()]
    }

    /// Map an inner literal to the outer numbering.
    pub fn outer_from_inner_lit(&self, lit: Lit) -> Lit {
        lit.map_var(self.outer_from_inner(lit.var()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use xorsat_formula::{lit, var};

    #[test]
    fn replacement_chains_resolve() {
        let mut variables = Variables::default();
        variables.ensure_count(4);

        variables.set_replacement(var!(1), lit!(2));
        variables.set_replacement(var!(2), lit!(-3));

        assert_eq!(variables.replacement(lit!(1)), lit!(-3));
        assert_eq!(variables.replacement(lit!(-1)), lit!(3));
        assert_eq!(variables.replacement(lit!(4)), lit!(4));
    }

    #[test]
    fn live_iteration_skips_removed() {
        let mut variables = Variables::default();
        variables.ensure_count(3);
        variables.var_data_mut(var!(2)).removed = Removed::Eliminated;

        let live: Vec<Var> = variables.live_var_iter().collect();
        assert_eq!(live, vec![var!(1), var!(3)]);
    }
}
