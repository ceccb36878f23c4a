//! Unit propagation.
use partial_ref::{partial, PartialRef};

use crate::context::{parts::*, Context};
use crate::xor;

pub mod assignment;
pub mod binary;
pub mod graph;
pub mod hyper;
pub mod long;
pub mod ternary;
pub mod watch;

pub use assignment::{backtrack, enqueue_assignment, full_restart, restart, Assignment, Trail};
pub use graph::{Conflict, ImplGraph, ImplNode, Reason};
pub use watch::{enable_watchlists, Watch, Watchlists};

/// Propagate all enqueued assignments to saturation.
///
/// For each dequeued literal the binary watchers are scanned strictly before the ternary and long
/// ones, and the XOR matrices are updated last. Returns the conflicting constraint if propagation
/// runs into one, otherwise the queue is fully processed.
pub fn propagate(
    mut ctx: partial!(
        Context,
        mut AssignmentP,
        mut BinaryClausesP,
        mut ClauseAllocP,
        mut ImplGraphP,
        mut ProofP,
        mut SolverStateP,
        mut TrailP,
        mut WatchlistsP,
        mut XorStateP,
        ClauseDbP,
        SolverConfigP,
        TernaryClausesP,
    ),
) -> Result<(), Conflict> {
    enable_watchlists(ctx.borrow());

    while let Some(lit) = ctx.part_mut(TrailP).pop_queue() {
        ctx.part_mut(SolverStateP).bogo_props += 1;

        binary::propagate_binary(ctx.borrow(), lit)?;
        ternary::propagate_ternary(ctx.borrow(), lit)?;
        long::propagate_long(ctx.borrow(), lit)?;
        xor::gauss::update_matrices(ctx.borrow(), lit)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use partial_ref::IntoPartialRefMut;

    use xorsat_formula::{cnf_formula, lit, lits};

    use crate::context::set_var_count;
    use crate::load::load_clause;
    use crate::state::SatState;

    #[test]
    fn chain_propagation() {
        let mut ctx = Context::default();
        let mut ctx = ctx.into_partial_ref_mut();

        let formula = cnf_formula![
            -1, 2;
            -2, 3;
            -3, 4;
            1;
        ];

        set_var_count(ctx.borrow(), formula.var_count());

        for clause in formula.iter() {
            load_clause(ctx.borrow(), clause);
        }

        assert!(propagate(ctx.borrow()).is_ok());

        for index in 0..4 {
            assert!(ctx
                .part(AssignmentP)
                .lit_is_true(lit!(index as isize + 1)));
        }
    }

    #[test]
    fn long_clause_propagation() {
        let mut ctx = Context::default();
        let mut ctx = ctx.into_partial_ref_mut();

        set_var_count(ctx.borrow(), 5);

        load_clause(ctx.borrow(), &lits![1, 2, 3, 4, 5]);
        load_clause(ctx.borrow(), &lits![-1]);
        load_clause(ctx.borrow(), &lits![-2]);
        load_clause(ctx.borrow(), &lits![-3]);
        load_clause(ctx.borrow(), &lits![-4]);

        assert!(propagate(ctx.borrow()).is_ok());
        assert!(ctx.part(AssignmentP).lit_is_true(lit!(5)));
    }

    #[test]
    fn ternary_conflict() {
        let mut ctx = Context::default();
        let mut ctx = ctx.into_partial_ref_mut();

        set_var_count(ctx.borrow(), 3);

        load_clause(ctx.borrow(), &lits![1, 2, 3]);
        load_clause(ctx.borrow(), &lits![-1]);
        load_clause(ctx.borrow(), &lits![-2]);
        load_clause(ctx.borrow(), &lits![-3]);

        assert_eq!(ctx.part(SolverStateP).sat_state, SatState::Unknown);
        assert!(propagate(ctx.borrow()).is_err());
    }
}
