//! Gauss–Jordan elimination over GF(2), integrated with search.
//!
//! Each connected component of the parity constraints becomes one [`Matrix`] of packed bit rows.
//! The matrix is echelonized once at decision level 0. During search, assigning a variable of the
//! matrix eliminates its column: the bit is cleared in every row and the assigned value is folded
//! into the row's right hand side. A row with no remaining columns and an odd right hand side is
//! a conflict; a row with exactly one remaining column propagates that variable.
//!
//! Backtracking notifies the matrices, which invalidate their elimination state and restore it
//! lazily from the nearest surviving snapshot (or the level 0 state) at the next update.
use partial_ref::{partial, PartialRef};

use rustc_hash::FxHashMap;

use xorsat_formula::{Lit, Var};

use crate::context::{parts::*, Context};
use crate::proof;
use crate::prop::{enqueue_assignment, Conflict, Reason};
use crate::state::SatState;
use crate::variables::Removed;

use super::{XorRef, XorRow};

/// A packed row over the columns of a matrix, plus the right hand side.
#[derive(Clone, PartialEq, Eq)]
pub struct Row {
    bits: Vec<u64>,
    ones: u32,
    pub rhs: bool,
}

impl Row {
    fn zero(words: usize) -> Row {
        Row {
            bits: vec![0; words],
            ones: 0,
            rhs: false,
        }
    }

    fn set_bit(&mut self, col: usize) {
        let word = &mut self.bits[col / 64];
        let mask = 1u64 << (col % 64);
        if *word & mask == 0 {
            *word |= mask;
            self.ones += 1;
        }
    }

    fn clear_bit(&mut self, col: usize) {
        let word = &mut self.bits[col / 64];
        let mask = 1u64 << (col % 64);
        if *word & mask != 0 {
            *word &= !mask;
            self.ones -= 1;
        }
    }

    pub fn test_bit(&self, col: usize) -> bool {
        self.bits[col / 64] & (1u64 << (col % 64)) != 0
    }

    fn xor_assign(&mut self, other: &Row) {
        for (word, &other_word) in self.bits.iter_mut().zip(other.bits.iter()) {
            *word ^= other_word;
        }
        self.rhs ^= other.rhs;
        self.recount();
    }

    fn recount(&mut self) {
        self.ones = self.bits.iter().map(|word| word.count_ones()).sum();
    }

    /// Number of set columns.
    pub fn ones(&self) -> usize {
        self.ones as usize
    }

    /// Index of the first set column.
    fn first_set(&self) -> Option<usize> {
        for (index, &word) in self.bits.iter().enumerate() {
            if word != 0 {
                return Some(index * 64 + word.trailing_zeros() as usize);
            }
        }
        None
    }
}

struct Snapshot {
    level: usize,
    rows: Vec<Row>,
}

/// One connected component of parity constraints as a dense bit matrix.
pub struct Matrix {
    /// Column index to variable.
    cols: Vec<Var>,
    /// Echelonized rows as of level 0.
    orig: Vec<Row>,
    /// Variables of each level 0 row, used to build reasons and conflicts.
    row_vars: Vec<Vec<Var>>,
    /// Rows with the columns of assigned variables eliminated.
    cur: Vec<Row>,
    /// Reason clause of the last propagation of each row, propagated literal first.
    reasons: Vec<Vec<Lit>>,
    snapshots: Vec<Snapshot>,
    snapshot_interval: usize,
    snapshots_enabled: bool,
    /// Set when assignments were cancelled; the next update restores `cur` first.
    dirty: bool,
}

impl Matrix {
    /// The reason literals of a row's propagation.
    pub fn reason_lits(&self, row: u32) -> &[Lit] {
        &self.reasons[row as usize]
    }

    /// Invalidate the elimination state after cancelling assignments above `level`.
    pub fn cancel_until(&mut self, level: usize) {
        while let Some(snapshot) = self.snapshots.last() {
            if snapshot.level > level {
                self.snapshots.pop();
            } else {
                break;
            }
        }
        self.dirty = true;
    }

    fn eliminate(&mut self, col: usize, value: bool) {
        for row in self.cur.iter_mut() {
            if row.test_bit(col) {
                row.clear_bit(col);
                row.rhs ^= value;
            }
        }
    }

    fn col_is_live(&self, col: usize) -> bool {
        self.cur.iter().any(|row| row.test_bit(col))
    }
}

/// Fold level 0 assignments and variable substitutions into the canonical rows.
///
/// Rows that shrink to units or equivalences leave the row store and turn into assignments or
/// binary clauses. Returns `false` when a row reduces to an odd empty constraint, which makes the
/// formula unsatisfiable.
pub fn normalize_rows(
    mut ctx: partial!(
        Context,
        mut AssignmentP,
        mut BinaryClausesP,
        mut ImplGraphP,
        mut ProofP,
        mut SolverStateP,
        mut TrailP,
        mut XorStateP,
        VariablesP,
    ),
) -> bool {
    let rows = std::mem::replace(ctx.part_mut(XorStateP).rows_mut(), vec![]);
    let mut kept: Vec<XorRow> = vec![];

    for row in rows {
        let mut rhs = row.rhs;
        let mut vars: Vec<Var> = vec![];

        for &var in row.vars.iter() {
            let rep = ctx.part(VariablesP).replacement(var.positive());
            rhs ^= rep.is_negative();
            let var = rep.var();
            debug_assert!(
                ctx.part(VariablesP).var_data(var).removed != Removed::Eliminated,
                "parity constraint references an eliminated variable"
            );
            match ctx.part(AssignmentP).var_value(var) {
                Some(value) => rhs ^= value,
                None => vars.push(var),
            }
        }

        vars.sort_unstable();

        let mut deduped: Vec<Var> = vec![];
        for &var in vars.iter() {
            if deduped.last() == Some(&var) {
                deduped.pop();
            } else {
                deduped.push(var);
            }
        }

        match deduped[..] {
            [] => {
                if rhs {
                    proof::add_clause(ctx.borrow(), &[]);
                    ctx.part_mut(SolverStateP).sat_state = SatState::Unsat;
                    ctx.part_mut(XorStateP).set_rows(kept);
                    return false;
                }
            }
            [var] => {
                let lit = var.lit(rhs);
                proof::add_clause(ctx.borrow(), &[lit]);
                enqueue_assignment(ctx.borrow(), lit, Reason::Unit);
            }
            [a, b] => {
                // a xor b = 1 forbids equal values, a xor b = 0 forbids differing ones.
                let clause_1 = [a.positive(), b.lit(rhs)];
                let clause_2 = [a.negative(), b.lit(!rhs)];
                proof::add_clause(ctx.borrow(), &clause_1);
                proof::add_clause(ctx.borrow(), &clause_2);
                ctx.part_mut(BinaryClausesP).add_binary_clause(clause_1, false);
                ctx.part_mut(BinaryClausesP).add_binary_clause(clause_2, false);
            }
            _ => kept.push(XorRow { vars: deduped, rhs }),
        }
    }

    ctx.part_mut(XorStateP).set_rows(kept);
    true
}

/// Partition the canonical rows into component matrices and echelonize them at level 0.
///
/// Units discovered during echelonization are enqueued; the caller has to run propagation
/// afterwards. Returns `false` when the constraints are unsatisfiable on their own.
pub fn build_matrices(
    mut ctx: partial!(
        Context,
        mut AssignmentP,
        mut BinaryClausesP,
        mut ImplGraphP,
        mut ProofP,
        mut SolverStateP,
        mut TrailP,
        mut XorStateP,
        SolverConfigP,
        VariablesP,
    ),
) -> bool {
    debug_assert_eq!(ctx.part(TrailP).current_level(), 0);

    if ctx.part(XorStateP).is_built() {
        return true;
    }

    if !normalize_rows(ctx.borrow()) {
        return false;
    }

    let row_count = ctx.part(XorStateP).row_count();
    if row_count == 0 {
        ctx.part_mut(XorStateP).mark_built();
        return true;
    }

    // Union-find over row indices, merging rows that share a variable.
    let mut parent: Vec<usize> = (0..row_count).collect();

    fn find(parent: &mut Vec<usize>, mut index: usize) -> usize {
        while parent[index] != index {
            parent[index] = parent[parent[index]];
            index = parent[index];
        }
        index
    }

    {
        let mut owner: FxHashMap<Var, usize> = FxHashMap::default();
        for index in 0..row_count {
            for &var in ctx.part(XorStateP).rows()[index].vars.iter() {
                match owner.get(&var) {
                    Some(&other) => {
                        let root_a = find(&mut parent, index);
                        let root_b = find(&mut parent, other);
                        parent[root_a] = root_b;
                    }
                    None => {
                        owner.insert(var, index);
                    }
                }
            }
        }
    }

    let mut components: FxHashMap<usize, Vec<usize>> = FxHashMap::default();
    for index in 0..row_count {
        let root = find(&mut parent, index);
        components.entry(root).or_default().push(index);
    }

    let mut component_list: Vec<Vec<usize>> = components.into_iter().map(|(_, v)| v).collect();
    component_list.sort();

    let snapshot_interval = ctx.part(SolverConfigP).gauss_snapshot_interval.max(1);
    let max_snapshot_cols = ctx.part(SolverConfigP).gauss_max_cols;

    for row_indices in component_list {
        let mut cols: Vec<Var> = vec![];
        for &index in row_indices.iter() {
            cols.extend_from_slice(&ctx.part(XorStateP).rows()[index].vars);
        }
        cols.sort_unstable();
        cols.dedup();

        let mut col_of: FxHashMap<Var, usize> = FxHashMap::default();
        for (col, &var) in cols.iter().enumerate() {
            col_of.insert(var, col);
        }

        let words = (cols.len() + 63) / 64;

        let mut rows: Vec<Row> = row_indices
            .iter()
            .map(|&index| {
                let source = &ctx.part(XorStateP).rows()[index];
                let mut row = Row::zero(words);
                for &var in source.vars.iter() {
                    row.set_bit(col_of[&var]);
                }
                row.rhs = source.rhs;
                row
            })
            .collect();

        // Gauss-Jordan: reduce to reduced row echelon form.
        let mut pivot_row = 0;
        for col in 0..cols.len() {
            let mut found = None;
            for index in pivot_row..rows.len() {
                if rows[index].test_bit(col) {
                    found = Some(index);
                    break;
                }
            }
            let found = match found {
                Some(found) => found,
                None => continue,
            };
            rows.swap(pivot_row, found);

            let pivot = rows[pivot_row].clone();
            for (index, row) in rows.iter_mut().enumerate() {
                if index != pivot_row && row.test_bit(col) {
                    row.xor_assign(&pivot);
                }
            }
            pivot_row += 1;
        }

        let mut kept_rows: Vec<Row> = vec![];

        for row in rows {
            match row.ones() {
                0 => {
                    if row.rhs {
                        proof::add_clause(ctx.borrow(), &[]);
                        ctx.part_mut(SolverStateP).sat_state = SatState::Unsat;
                        return false;
                    }
                }
                1 => {
                    let var = cols[row.first_set().unwrap()];
                    let lit = var.lit(row.rhs);
                    proof::add_clause(ctx.borrow(), &[lit]);
                    match ctx.part(AssignmentP).lit_value(lit) {
                        Some(false) => {
                            proof::add_clause(ctx.borrow(), &[]);
                            ctx.part_mut(SolverStateP).sat_state = SatState::Unsat;
                            return false;
                        }
                        Some(true) => {}
                        None => enqueue_assignment(ctx.borrow(), lit, Reason::Unit),
                    }
                }
                _ => kept_rows.push(row),
            }
        }

        if kept_rows.is_empty() {
            continue;
        }

        let row_vars: Vec<Vec<Var>> = kept_rows
            .iter()
            .map(|row| {
                (0..cols.len())
                    .filter(|&col| row.test_bit(col))
                    .map(|col| cols[col])
                    .collect()
            })
            .collect();

        let reasons = vec![vec![]; kept_rows.len()];
        let snapshots_enabled = cols.len() <= max_snapshot_cols;

        let matrix = Matrix {
            cur: kept_rows.clone(),
            orig: kept_rows,
            row_vars,
            cols,
            reasons,
            snapshots: vec![],
            snapshot_interval,
            snapshots_enabled,
            dirty: false,
        };

        let matrix_index = ctx.part(XorStateP).matrices().len() as u32;

        let xor_state = ctx.part_mut(XorStateP);
        for (col, &var) in matrix.cols.iter().enumerate() {
            if matrix.col_is_live(col) {
                xor_state.set_col_of(var, (matrix_index, col as u32));
            }
        }

        xor_state.matrices_mut().push(matrix);
    }

    ctx.part_mut(XorStateP).mark_built();
    true
}

/// Update the matrices for a newly assigned literal.
///
/// Eliminates the literal's column from its matrix (restoring the matrix state first if
/// backtracking invalidated it), then scans the rows for conflicts and propagations.
pub fn update_matrices(
    mut ctx: partial!(
        Context,
        mut AssignmentP,
        mut ImplGraphP,
        mut SolverStateP,
        mut TrailP,
        mut XorStateP,
    ),
    lit: Lit,
) -> Result<(), Conflict> {
    if !ctx.part(XorStateP).is_built() {
        return Ok(());
    }

    let (matrix_index, col) = match ctx.part(XorStateP).col_of(lit.var()) {
        Some(entry) => entry,
        None => return Ok(()),
    };

    let level = ctx.part(TrailP).current_level();

    let (xor_state, mut ctx) = ctx.split_part_mut(XorStateP);

    let mut found_conflict: Option<(usize, Option<Lit>)> = None;

    {
        let matrix = &mut xor_state.matrices_mut()[matrix_index as usize];

        ctx.part_mut(SolverStateP).bogo_props += matrix.cur.len() as u64 + 1;

        if matrix.dirty {
            matrix.cur = match matrix.snapshots.last() {
                Some(snapshot) => snapshot.rows.clone(),
                None => matrix.orig.clone(),
            };
            matrix.dirty = false;

            for col in 0..matrix.cols.len() {
                let var = matrix.cols[col];
                if let Some(value) = ctx.part(AssignmentP).var_value(var) {
                    if matrix.col_is_live(col) {
                        matrix.eliminate(col, value);
                    }
                }
            }
        } else {
            let snapshot_due = matrix.snapshots_enabled
                && level > 0
                && matrix
                    .snapshots
                    .last()
                    .map(|snapshot| snapshot.level + matrix.snapshot_interval <= level)
                    .unwrap_or(matrix.snapshot_interval <= level);

            if snapshot_due {
                let rows = matrix.cur.clone();
                matrix.snapshots.push(Snapshot { level, rows });
            }

            let value = lit.is_positive();
            matrix.eliminate(col as usize, value);
        }

        // Scan for conflicting and propagating rows.
        for index in 0..matrix.cur.len() {
            let (ones, rhs) = {
                let row = &matrix.cur[index];
                (row.ones(), row.rhs)
            };

            if ones == 0 {
                if rhs {
                    found_conflict = Some((index, None));
                    break;
                }
            } else if ones == 1 {
                let col = matrix.cur[index].first_set().unwrap();
                let var = matrix.cols[col];
                let want = matrix.cur[index].rhs;
                let prop_lit = var.lit(want);

                match ctx.part(AssignmentP).var_value(var) {
                    None => {
                        let mut reason = Vec::with_capacity(matrix.row_vars[index].len());
                        reason.push(prop_lit);
                        for &other in matrix.row_vars[index].iter() {
                            if other != var {
                                let value = ctx
                                    .part(AssignmentP)
                                    .var_value(other)
                                    .expect("row variable must be assigned");
                                reason.push(other.lit(!value));
                            }
                        }
                        matrix.reasons[index] = reason;

                        enqueue_assignment(
                            ctx.borrow(),
                            prop_lit,
                            Reason::Xor(XorRef {
                                matrix: matrix_index,
                                row: index as u32,
                            }),
                        );
                    }
                    Some(value) if value != want => {
                        found_conflict = Some((index, Some(prop_lit)));
                        break;
                    }
                    Some(_) => {}
                }
            }
        }
    }

    if let Some((index, pending)) = found_conflict {
        let row_vars = &xor_state.matrices()[matrix_index as usize].row_vars[index];
        let lits = conflict_lits(ctx.borrow(), row_vars, pending);
        xor_state.set_conflict(lits);
        return Err(Conflict::Xor(XorRef {
            matrix: matrix_index,
            row: index as u32,
        }));
    }

    Ok(())
}

/// The false literals of a falsified row.
///
/// For a row with a pending (not yet eliminated) variable, its required literal is passed in and
/// used instead of the assigned value.
fn conflict_lits(
    ctx: partial!(Context, AssignmentP),
    row_vars: &[Var],
    pending: Option<Lit>,
) -> Vec<Lit> {
    let assignment = ctx.part(AssignmentP);
    row_vars
        .iter()
        .map(|&var| {
            if let Some(pending) = pending {
                if pending.var() == var {
                    return pending;
                }
            }
            let value = assignment
                .var_value(var)
                .expect("conflict row variable must be assigned");
            var.lit(!value)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    use partial_ref::IntoPartialRefMut;

    use xorsat_formula::{lit, vars};

    use crate::context::set_var_count;
    use crate::load::{load_clause, load_xor_clause};
    use crate::prop::propagate;

    #[test]
    fn echelonization_finds_units() {
        let mut ctx = Context::default();
        let mut ctx = ctx.into_partial_ref_mut();

        set_var_count(ctx.borrow(), 4);

        // The difference of the two rows is the unit x4 = 1.
        load_xor_clause(ctx.borrow(), &vars![1, 2, 3], false);
        load_xor_clause(ctx.borrow(), &vars![1, 2, 3, 4], true);

        assert!(build_matrices(ctx.borrow()));
        assert!(propagate(ctx.borrow()).is_ok());

        assert!(ctx.part(AssignmentP).lit_is_true(lit!(4)));
    }

    #[test]
    fn assignments_drive_matrix_propagation() {
        let mut ctx = Context::default();
        let mut ctx = ctx.into_partial_ref_mut();

        set_var_count(ctx.borrow(), 3);

        // x1 + x2 + x3 = 0 with x1 = 1 and x2 = 1 forces x3 = 0.
        load_xor_clause(ctx.borrow(), &vars![1, 2, 3], false);

        assert!(build_matrices(ctx.borrow()));

        load_clause(ctx.borrow(), &[lit!(1)]);
        load_clause(ctx.borrow(), &[lit!(2)]);

        assert!(propagate(ctx.borrow()).is_ok());
        assert!(ctx.part(AssignmentP).lit_is_true(lit!(-3)));
    }
}
