//! Initial assessment of learned clauses.
use partial_ref::{partial, PartialRef};

use xorsat_formula::Lit;

use crate::context::{parts::*, Context};
use crate::glue::compute_glue;

use super::ClauseHeader;

/// Prepare the header for a freshly learned clause.
///
/// Computes the clause's glue from the current decision levels of its literals.
pub fn assess_learned_clause(
    mut ctx: partial!(Context, mut TmpDataP, ImplGraphP),
    lits: &[Lit],
) -> ClauseHeader {
    let mut header = ClauseHeader::new();

    header.set_redundant(true);
    header.set_glue(compute_glue(ctx.borrow(), lits));

    header
}
