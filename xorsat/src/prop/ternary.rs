//! Propagation of ternary clauses.
use partial_ref::{partial, PartialRef};

use xorsat_formula::Lit;

use crate::context::{parts::*, Context};
use crate::proof;

use super::enqueue_assignment;
use super::hyper::common_ancestor;
use super::{Conflict, Reason};

/// Propagate all literals implied by the given literal via ternary clauses.
///
/// Every ternary watch carries the two remaining literals inline, so this never touches the
/// clause pool. On conflict returns the falsified ternary clause.
pub fn propagate_ternary(
    mut ctx: partial!(
        Context,
        mut AssignmentP,
        mut BinaryClausesP,
        mut ImplGraphP,
        mut ProofP,
        mut SolverStateP,
        mut TrailP,
        SolverConfigP,
        TernaryClausesP,
    ),
    lit: Lit,
) -> Result<(), Conflict> {
    let (ternary_clauses, mut ctx) = ctx.split_part(TernaryClausesP);

    let false_lit = !lit;

    for watch in ternary_clauses.watched_by(lit) {
        let [a, b] = watch.other;
        let assignment = ctx.part(AssignmentP);

        if assignment.lit_is_true(a) || assignment.lit_is_true(b) {
            continue;
        }

        let a_false = assignment.lit_is_false(a);
        let b_false = assignment.lit_is_false(b);

        match (a_false, b_false) {
            (true, true) => return Err(Conflict::Ternary([false_lit, a, b])),
            (true, false) => enqueue_ternary(ctx.borrow(), b, [false_lit, a]),
            (false, true) => enqueue_ternary(ctx.borrow(), a, [false_lit, b]),
            (false, false) => (),
        }
    }

    Ok(())
}

/// Enqueue a propagation from a ternary clause.
///
/// At decision level 1 this attaches a lazy hyper-binary resolvent when the two false literals
/// share a dominator, and uses the new binary clause as the reason instead.
fn enqueue_ternary(
    mut ctx: partial!(
        Context,
        mut AssignmentP,
        mut BinaryClausesP,
        mut ImplGraphP,
        mut ProofP,
        mut SolverStateP,
        mut TrailP,
        SolverConfigP,
    ),
    implied: Lit,
    reason_lits: [Lit; 2],
) {
    if ctx.part(TrailP).current_level() == 1 && ctx.part(SolverConfigP).lazy_hyper_binary {
        if let Some(dominator) = common_ancestor(ctx.borrow(), &reason_lits) {
            let binary = [!dominator, implied];
            proof::add_clause(ctx.borrow(), &binary);
            ctx.part_mut(BinaryClausesP).add_binary_clause(binary, true);
            enqueue_assignment(ctx.borrow(), implied, Reason::Binary([!dominator]));
            return;
        }
    }

    enqueue_assignment(ctx.borrow(), implied, Reason::Ternary(reason_lits));
}
