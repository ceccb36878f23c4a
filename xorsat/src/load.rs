//! Loading clauses and parity constraints into the solver.
use partial_ref::{partial, PartialRef};

use xorsat_formula::{Lit, Var};

use crate::clause::{db, ClauseHeader};
use crate::context::{parts::*, Context};
use crate::decision::make_available;
use crate::proof;
use crate::prop::{assignment, full_restart, Reason};
use crate::state::SatState;
use crate::variables::Removed;

/// Largest parity constraint expanded into CNF when a proof is traced.
const XOR_PROOF_EXPAND_LIMIT: usize = 8;

/// Adds a clause to the current formula.
///
/// Removes duplicated literals, ignores tautological clauses (eg. x v -x v y), handles empty
/// clauses and dispatches among unit, binary, ternary and long clauses. Literals of substituted
/// variables are rewritten to their representatives, and eliminated variables named by the clause
/// are re-introduced first.
///
/// Does not adjust the solver's variable count. If necessary that has to be done before calling
/// this.
pub fn load_clause(
    mut ctx: partial!(
        Context,
        mut AssignmentP,
        mut BinaryClausesP,
        mut ClauseAllocP,
        mut ClauseDbP,
        mut ImplGraphP,
        mut ProofP,
        mut ReconstructP,
        mut SolverStateP,
        mut TernaryClausesP,
        mut TmpDataP,
        mut TrailP,
        mut VariablesP,
        mut VsidsP,
        mut WatchlistsP,
        mut XorStateP,
    ),
    lits: &[Lit],
) {
    match ctx.part(SolverStateP).sat_state {
        SatState::Unsat => return,
        SatState::Sat | SatState::UnsatUnderAssumptions => {
            ctx.part_mut(SolverStateP).sat_state = SatState::Unknown;
        }
        SatState::Unknown => {}
    }

    // Restart the search when the user adds new clauses.
    full_restart(ctx.borrow());

    let mut mapped = Vec::with_capacity(lits.len());
    for &lit in lits {
        let lit = ctx.part(VariablesP).replacement(lit);
        if ctx.part(VariablesP).var_data(lit.var()).removed == Removed::Eliminated {
            uneliminate(ctx.borrow(), lit.var());
        }
        mapped.push(lit);
    }

    load_mapped_clause(ctx.borrow(), &mapped, false);
}

/// Load a clause whose literals are already in terms of live variables.
fn load_mapped_clause(
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
        mut TmpDataP,
        mut TrailP,
        mut VsidsP,
        mut WatchlistsP,
    ),
    lits: &[Lit],
    redundant: bool,
) {
    if ctx.part(SolverStateP).sat_state == SatState::Unsat {
        return;
    }

    let (tmp_data, mut ctx) = ctx.split_part_mut(TmpDataP);

    tmp_data.lits.clear();
    tmp_data.lits.extend_from_slice(lits);
    let lits = &mut tmp_data.lits;
    let simplified_lits = &mut tmp_data.lits_2;

    lits.sort_unstable();
    lits.dedup();

    // Detect tautological clauses
    let mut last = None;

    for &lit in lits.iter() {
        if last == Some(!lit) {
            return;
        }
        last = Some(lit);
    }

    // Remove false literals and satisfied clauses
    simplified_lits.clear();

    for &lit in lits.iter() {
        match ctx.part(AssignmentP).lit_value(lit) {
            Some(true) => {
                proof::delete_clause(ctx.borrow(), lits);
                return;
            }
            Some(false) => (),
            None => {
                simplified_lits.push(lit);
            }
        }
    }

    if simplified_lits.len() < lits.len() {
        proof::migrate_clause(ctx.borrow(), simplified_lits, lits);
    }

    match simplified_lits[..] {
        [] => ctx.part_mut(SolverStateP).sat_state = SatState::Unsat,
        [lit] => assignment::enqueue_assignment(ctx.borrow(), lit, Reason::Unit),
        [lit_0, lit_1] => {
            ctx.part_mut(BinaryClausesP)
                .add_binary_clause([lit_0, lit_1], redundant);
        }
        [lit_0, lit_1, lit_2] => {
            ctx.part_mut(TernaryClausesP)
                .add_ternary_clause([lit_0, lit_1, lit_2], redundant);
        }
        _ => {
            let mut header = ClauseHeader::new();
            header.set_redundant(redundant);

            let cref = db::add_clause(ctx.borrow(), header, simplified_lits);
            let lits = [simplified_lits[0], simplified_lits[1]];
            if ctx.part(WatchlistsP).enabled() {
                ctx.part_mut(WatchlistsP).watch_clause(cref, lits);
            }
        }
    }
}

/// Adds a parity constraint over the given variables to the current formula.
///
/// Substituted variables are rewritten (flipping the right hand side for negative
/// representatives), duplicate variables cancel and variables assigned at level 0 fold their
/// value into the right hand side. Small constraints turn into units or binary clauses; larger
/// ones become XOR rows handled by the Gauss engine, or are expanded into CNF while a proof is
/// being traced, as proof formats cannot express native parity reasoning.
pub fn load_xor_clause(
    mut ctx: partial!(
        Context,
        mut AssignmentP,
        mut BinaryClausesP,
        mut ClauseAllocP,
        mut ClauseDbP,
        mut ImplGraphP,
        mut ProofP,
        mut ReconstructP,
        mut SolverStateP,
        mut TernaryClausesP,
        mut TmpDataP,
        mut TrailP,
        mut VariablesP,
        mut VsidsP,
        mut WatchlistsP,
        mut XorStateP,
    ),
    vars: &[Var],
    rhs: bool,
) {
    match ctx.part(SolverStateP).sat_state {
        SatState::Unsat => return,
        SatState::Sat | SatState::UnsatUnderAssumptions => {
            ctx.part_mut(SolverStateP).sat_state = SatState::Unknown;
        }
        SatState::Unknown => {}
    }

    full_restart(ctx.borrow());

    let mut rhs = rhs;
    let mut mapped: Vec<Var> = Vec::with_capacity(vars.len());

    for &var in vars {
        let rep = ctx.part(VariablesP).replacement(var.positive());
        rhs ^= rep.is_negative();
        let var = rep.var();
        if ctx.part(VariablesP).var_data(var).removed == Removed::Eliminated {
            uneliminate(ctx.borrow(), var);
        }
        match ctx.part(AssignmentP).var_value(var) {
            Some(value) if ctx.part(ImplGraphP).level(var) == 0 => rhs ^= value,
            _ => mapped.push(var),
        }
    }

    mapped.sort_unstable();

    // Duplicate variables cancel in pairs.
    let mut deduped: Vec<Var> = vec![];
    for &var in mapped.iter() {
        if deduped.last() == Some(&var) {
            deduped.pop();
        } else {
            deduped.push(var);
        }
    }

    match deduped[..] {
        [] => {
            if rhs {
                ctx.part_mut(SolverStateP).sat_state = SatState::Unsat;
                proof::add_clause(ctx.borrow(), &[]);
            }
        }
        [var] => {
            let lit = var.lit(rhs);
            proof::add_clause(ctx.borrow(), &[lit]);
            assignment::enqueue_assignment(ctx.borrow(), lit, Reason::Unit);
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
        _ => {
            if ctx.part(ProofP).is_active() && deduped.len() <= XOR_PROOF_EXPAND_LIMIT {
                load_xor_as_cnf(ctx.borrow(), &deduped, rhs);
            } else {
                ctx.part_mut(XorStateP).add_row(&deduped, rhs);
            }
        }
    }
}

/// Expand a parity constraint into its CNF clauses.
fn load_xor_as_cnf(
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
        mut TmpDataP,
        mut TrailP,
        mut VsidsP,
        mut WatchlistsP,
    ),
    vars: &[Var],
    rhs: bool,
) {
    let mut clause = vec![Lit::UNDEF; vars.len()];

    for mask in 0u32..(1 << vars.len()) {
        // Negative literal sets have the wrong parity, so each expanded clause forbids exactly
        // one falsifying point.
        if (mask.count_ones() & 1 == 1) != rhs {
            continue;
        }
        for (index, &var) in vars.iter().enumerate() {
            clause[index] = var.lit(mask & (1 << index) == 0);
        }
        proof::add_clause(ctx.borrow(), &clause);
        load_mapped_clause(ctx.borrow(), &clause, false);
    }
}

/// Re-introduce an eliminated variable by restoring its witness clauses.
pub(crate) fn uneliminate(
    mut ctx: partial!(
        Context,
        mut AssignmentP,
        mut BinaryClausesP,
        mut ClauseAllocP,
        mut ClauseDbP,
        mut ImplGraphP,
        mut ProofP,
        mut ReconstructP,
        mut SolverStateP,
        mut TernaryClausesP,
        mut TmpDataP,
        mut TrailP,
        mut VariablesP,
        mut VsidsP,
        mut WatchlistsP,
    ),
    var: Var,
) {
    let witnesses = ctx.part_mut(ReconstructP).take_witnesses_for(var);

    ctx.part_mut(VariablesP).var_data_mut(var).removed = Removed::None;
    make_available(ctx.borrow(), var);

    for clause in witnesses {
        // Witness clauses may reference further eliminated variables.
        let mut mapped = Vec::with_capacity(clause.len());
        let mut pending = vec![];
        for &lit in clause.iter() {
            let lit = ctx.part(VariablesP).replacement(lit);
            if ctx.part(VariablesP).var_data(lit.var()).removed == Removed::Eliminated {
                pending.push(lit.var());
            }
            mapped.push(lit);
        }
        for other in pending {
            uneliminate(ctx.borrow(), other);
        }

        proof::add_clause(ctx.borrow(), &mapped);
        load_mapped_clause(ctx.borrow(), &mapped, false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use partial_ref::IntoPartialRefMut;

    use xorsat_formula::{lits, vars};

    use crate::context::set_var_count;

    #[test]
    fn unsat_on_empty_clause() {
        let mut ctx = Context::default();
        let mut ctx = ctx.into_partial_ref_mut();

        set_var_count(ctx.borrow(), 10);

        load_clause(ctx.borrow(), &[]);

        assert_eq!(ctx.part(SolverStateP).sat_state, SatState::Unsat);
    }

    #[test]
    fn unit_clauses() {
        let mut ctx = Context::default();
        let mut ctx = ctx.into_partial_ref_mut();

        set_var_count(ctx.borrow(), 10);

        load_clause(ctx.borrow(), &lits![1]);

        assert_eq!(ctx.part(TrailP).trail().len(), 1);

        load_clause(ctx.borrow(), &lits![3, -3]);

        assert_eq!(ctx.part(TrailP).trail().len(), 1);

        load_clause(ctx.borrow(), &lits![-2]);

        assert_eq!(ctx.part(TrailP).trail().len(), 2);

        load_clause(ctx.borrow(), &lits![1, 1]);

        assert_eq!(ctx.part(TrailP).trail().len(), 2);

        assert_eq!(ctx.part(SolverStateP).sat_state, SatState::Unknown);

        load_clause(ctx.borrow(), &lits![2]);

        assert_eq!(ctx.part(TrailP).trail().len(), 2);

        assert_eq!(ctx.part(SolverStateP).sat_state, SatState::Unsat);
    }

    #[test]
    fn short_clause_dispatch() {
        let mut ctx = Context::default();
        let mut ctx = ctx.into_partial_ref_mut();

        set_var_count(ctx.borrow(), 10);

        load_clause(ctx.borrow(), &lits![1, 2]);
        assert_eq!(ctx.part(BinaryClausesP).count(), 1);

        load_clause(ctx.borrow(), &lits![-1, 3, 3]);
        assert_eq!(ctx.part(BinaryClausesP).count(), 2);

        load_clause(ctx.borrow(), &lits![4, -4]);
        assert_eq!(ctx.part(BinaryClausesP).count(), 2);

        load_clause(ctx.borrow(), &lits![1, 2, 3]);
        assert_eq!(ctx.part(TernaryClausesP).count(), 1);

        load_clause(ctx.borrow(), &lits![1, 2, 3, 4]);
        assert_eq!(ctx.part(ClauseDbP).count_irredundant(), 1);

        assert_eq!(ctx.part(SolverStateP).sat_state, SatState::Unknown);
    }

    #[test]
    fn xor_clause_dispatch() {
        let mut ctx = Context::default();
        let mut ctx = ctx.into_partial_ref_mut();

        set_var_count(ctx.borrow(), 10);

        // Unit: x1 = 1
        load_xor_clause(ctx.borrow(), &vars![1], true);
        assert_eq!(ctx.part(TrailP).trail().len(), 1);

        // Equivalence: x2 xor x3 = 0
        load_xor_clause(ctx.borrow(), &vars![2, 3], false);
        assert_eq!(ctx.part(BinaryClausesP).count(), 2);

        // Duplicates cancel: x4 xor x4 xor x5 = 1 is the unit x5
        load_xor_clause(ctx.borrow(), &vars![4, 4, 5], true);
        assert_eq!(ctx.part(TrailP).trail().len(), 2);

        // A real row
        load_xor_clause(ctx.borrow(), &vars![6, 7, 8], true);
        assert_eq!(ctx.part(XorStateP).row_count(), 1);

        // Empty with odd parity is a contradiction
        load_xor_clause(ctx.borrow(), &vars![9, 9], true);
        assert_eq!(ctx.part(SolverStateP).sat_state, SatState::Unsat);
    }
}
