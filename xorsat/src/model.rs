//! Model reconstruction.
//!
//! The search finds a total assignment over the variables still in the formula. Replaying the
//! reconstruction stack in reverse extends it to the substituted and eliminated variables:
//! equivalences copy the representative's value and witness clauses force the blocked variable
//! whenever the partial model leaves them unsatisfied.
use partial_ref::{partial, PartialRef};

use xorsat_formula::{Lit, Var};

use crate::context::{parts::*, Context};
use crate::reconstruct::ReconstructionEntry;

/// The reconstructed total model.
#[derive(Default)]
pub struct Model {
    /// Value per variable, total over all allocated variables.
    ///
    /// Only valid while the solver state is SAT.
    assignment: Vec<bool>,
}

impl Model {
    /// The value of a variable in the model.
    pub fn value(&self, var: Var) -> bool {
        self.assignment[var.index()]
    }

    /// Number of variables covered by the model.
    pub fn var_count(&self) -> usize {
        self.assignment.len()
    }
}

/// Extend the current search assignment to a total model over all variables.
pub fn reconstruct_model(
    mut ctx: partial!(Context, mut ModelP, AssignmentP, ReconstructP, VariablesP),
) {
    let (model, mut ctx) = ctx.split_part_mut(ModelP);
    let (reconstruct, ctx) = ctx.split_part(ReconstructP);

    let assignment = ctx.part(AssignmentP);
    let var_count = ctx.part(VariablesP).count();

    model.assignment.clear();
    model.assignment.extend((0..var_count).map(|index| {
        let var = Var::from_index(index);
        assignment
            .var_value(var)
            .unwrap_or_else(|| assignment.last_var_value(var))
    }));

    for entry in reconstruct.entries().iter().rev() {
        match entry {
            ReconstructionEntry::Equiv { var, rep } => {
                model.assignment[var.index()] =
                    model.assignment[rep.index()] ^ rep.is_negative();
            }
            ReconstructionEntry::Witness { blocked, lits } => {
                let satisfied = lits
                    .iter()
                    .any(|&lit| model.assignment[lit.index()] == lit.is_positive());
                if !satisfied {
                    model.assignment[blocked.index()] = blocked.is_positive();
                }
            }
            ReconstructionEntry::Dead => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use partial_ref::IntoPartialRefMut;

    use xorsat_formula::{lit, lits, var};

    use crate::context::set_var_count;
    use crate::prop::{enqueue_assignment, Reason};

    #[test]
    fn witness_fixes_unsatisfied_clause() {
        let mut ctx = Context::default();
        let mut ctx = ctx.into_partial_ref_mut();

        set_var_count(ctx.borrow(), 3);

        // Variable 1 was eliminated with witness (1 2); the search assigned 2 and 3 false.
        ctx.part_mut(ReconstructP)
            .push_witness(lit!(1), lits![1, 2].to_vec());

        enqueue_assignment(ctx.borrow(), lit!(-2), Reason::Unit);
        enqueue_assignment(ctx.borrow(), lit!(-3), Reason::Unit);

        reconstruct_model(ctx.borrow());

        let model = ctx.part(ModelP);
        assert!(model.value(var!(1)));
        assert!(!model.value(var!(2)));
    }

    #[test]
    fn equivalence_copies_representative() {
        let mut ctx = Context::default();
        let mut ctx = ctx.into_partial_ref_mut();

        set_var_count(ctx.borrow(), 2);

        // Variable 2 was replaced by -1; the search assigned 1 true.
        ctx.part_mut(ReconstructP).push_equiv(var!(2), lit!(-1));

        enqueue_assignment(ctx.borrow(), lit!(1), Reason::Unit);

        reconstruct_model(ctx.borrow());

        let model = ctx.part(ModelP);
        assert!(model.value(var!(1)));
        assert!(!model.value(var!(2)));
    }
}
