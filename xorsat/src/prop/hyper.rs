//! Lazy hyper-binary resolution.
//!
//! When propagation at decision level 1 derives a literal from a ternary or long clause whose
//! false literals are all dominated by one true level 1 literal `d`, the binary clause
//! `(¬d ∨ derived)` is implied by the formula. Attaching it immediately strengthens the binary
//! implication graph, which probing relies on for finding failed literals and transitive
//! reductions.
//!
//! Instead of a full dominator analysis every level 1 assignment tracks a single `ancestor`
//! literal in the implication graph: the decision tracks itself, binary propagations inherit the
//! ancestor of their implying literal, and everything else is only dominated when all its false
//! reason literals agree on one ancestor.
use partial_ref::{partial, PartialRef};

use xorsat_formula::Lit;

use crate::context::{parts::*, Context};

/// Find the unique level 1 dominator of the given false reason literals, if any.
///
/// Level 0 literals are globally false and skipped.
pub fn common_ancestor(
    ctx: partial!(Context, ImplGraphP),
    reason_lits: &[Lit],
) -> Option<Lit> {
    let impl_graph = ctx.part(ImplGraphP);

    let mut ancestor = Lit::UNDEF;

    for &lit in reason_lits {
        if impl_graph.level(lit.var()) == 0 {
            continue;
        }
        let lit_ancestor = impl_graph.ancestor(lit.var());
        if lit_ancestor == Lit::UNDEF {
            return None;
        }
        if ancestor == Lit::UNDEF {
            ancestor = lit_ancestor;
        } else if ancestor != lit_ancestor {
            return None;
        }
    }

    if ancestor == Lit::UNDEF {
        None
    } else {
        Some(ancestor)
    }
}
