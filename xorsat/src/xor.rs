//! Native parity (XOR) constraints.
//!
//! Parity constraints are kept in two representations. The canonical row store holds every
//! constraint as a sorted variable list plus a right hand side; inprocessing passes rewrite these
//! rows directly. For search the rows are partitioned into connected components over shared
//! variables and each component becomes a dense bit matrix, echelonized once at level 0 and then
//! updated incrementally as variables are assigned (see [`gauss`]).
use xorsat_formula::{Lit, Var};

pub mod extract;
pub mod gauss;

pub use gauss::Matrix;

/// Reference to a row of a built matrix, used in reasons and conflicts.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct XorRef {
    pub matrix: u32,
    pub row: u32,
}

/// A canonical parity constraint: the variables xor to `rhs`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct XorRow {
    pub vars: Vec<Var>,
    pub rhs: bool,
}

/// All parity constraint state.
pub struct XorState {
    /// Canonical rows, authoritative between searches.
    rows: Vec<XorRow>,
    /// Matrices derived from the rows, only valid while `built` is set.
    matrices: Vec<Matrix>,
    /// Maps a variable to its matrix and column while built.
    col_map: Vec<Option<(u32, u32)>>,
    /// Literals of the most recent matrix conflict.
    conflict: Vec<Lit>,
    built: bool,
}

impl Default for XorState {
    fn default() -> XorState {
        XorState {
            rows: vec![],
            matrices: vec![],
            col_map: vec![],
            conflict: vec![],
            built: false,
        }
    }
}

impl XorState {
    /// Update structures for a new variable count.
    pub fn set_var_count(&mut self, count: usize) {
        self.col_map.resize(count, None);
    }

    /// Add a canonical row. The variables must be deduplicated and live.
    pub fn add_row(&mut self, vars: &[Var], rhs: bool) {
        let mut vars = vars.to_vec();
        vars.sort_unstable();
        self.rows.push(XorRow { vars, rhs });
        self.invalidate();
    }

    /// The canonical rows.
    pub fn rows(&self) -> &[XorRow] {
        &self.rows
    }

    /// Number of canonical rows.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Replace the canonical rows wholesale, e.g. after a rewriting pass.
    pub fn set_rows(&mut self, rows: Vec<XorRow>) {
        self.rows = rows;
        self.invalidate();
    }

    pub(crate) fn rows_mut(&mut self) -> &mut Vec<XorRow> {
        &mut self.rows
    }

    /// Whether the matrices reflect the current rows.
    pub fn is_built(&self) -> bool {
        self.built
    }

    /// Drop the built matrices, keeping the canonical rows.
    pub fn invalidate(&mut self) {
        self.matrices.clear();
        for entry in self.col_map.iter_mut() {
            *entry = None;
        }
        self.built = false;
    }

    /// Notification that all assignments above `level` were cancelled.
    ///
    /// Invalidates the cached elimination state of each matrix; it is restored lazily from the
    /// nearest surviving snapshot at the next propagation.
    pub fn cancel_until(&mut self, level: usize) {
        if !self.built {
            return;
        }
        for matrix in self.matrices.iter_mut() {
            matrix.cancel_until(level);
        }
    }

    /// The matrix and column of a variable, if any.
    pub fn col_of(&self, var: Var) -> Option<(u32, u32)> {
        self.col_map[var.index()]
    }

    pub(crate) fn set_col_of(&mut self, var: Var, entry: (u32, u32)) {
        self.col_map[var.index()] = Some(entry);
    }

    pub(crate) fn matrices_mut(&mut self) -> &mut Vec<Matrix> {
        &mut self.matrices
    }

    pub(crate) fn matrices(&self) -> &[Matrix] {
        &self.matrices
    }

    pub(crate) fn mark_built(&mut self) {
        self.built = true;
    }

    pub(crate) fn set_conflict(&mut self, lits: Vec<Lit>) {
        self.conflict = lits;
    }

    /// The literals of the most recent matrix conflict, all false.
    pub fn conflict_lits(&self) -> &[Lit] {
        &self.conflict
    }

    /// The reason literals of a matrix propagation, the propagated literal first.
    pub fn reason_lits(&self, xref: XorRef) -> &[Lit] {
        self.matrices[xref.matrix as usize].reason_lits(xref.row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use xorsat_formula::vars;

    #[test]
    fn rows_are_canonicalized() {
        let mut state = XorState::default();
        state.set_var_count(5);

        state.add_row(&vars![3, 1, 2], true);

        assert_eq!(state.rows()[0].vars, vars![1, 2, 3].to_vec());
        assert!(!state.is_built());
    }
}
