//! The implication graph.
use partial_ref::{partial, PartialRef};

use xorsat_formula::{Lit, LitIdx, Var};

use crate::clause::ClauseRef;
use crate::context::{parts::*, Context};
use crate::xor::XorRef;

/// Assignments that caused a propagation.
///
/// Binary and ternary clauses are not pooled, so their reasons carry the remaining literals
/// inline. This keeps every reason reconstructable without a clause handle.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum Reason {
    Unit,
    Binary([Lit; 1]),
    Ternary([Lit; 2]),
    Long(ClauseRef),
    Xor(XorRef),
}

impl Reason {
    /// The literals that caused the propagation, excluding the propagated literal.
    pub fn lits<'out, 'a, 'b>(
        &'a self,
        ctx: &'b partial!('b Context, ClauseAllocP, XorStateP),
    ) -> &'out [Lit]
    where
        'a: 'out,
        'b: 'out,
    {
        match self {
            Reason::Unit => &[],
            Reason::Binary(lits) => lits,
            Reason::Ternary(lits) => lits,
            // The propagated literal is always kept at position 0
            Reason::Long(cref) => &ctx.part(ClauseAllocP).clause(*cref).lits()[1..],
            Reason::Xor(xref) => &ctx.part(XorStateP).reason_lits(*xref)[1..],
        }
    }

    /// Whether the assignment was a decision, an assumption or a unit clause.
    pub fn is_unit(&self) -> bool {
        matches!(self, Reason::Unit)
    }
}

/// Propagation that resulted in a conflict.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum Conflict {
    Binary([Lit; 2]),
    Ternary([Lit; 3]),
    Long(ClauseRef),
    Xor(XorRef),
}

impl Conflict {
    /// The literals of the conflicting constraint, all false under the current assignment.
    pub fn lits<'out, 'a, 'b>(
        &'a self,
        ctx: &'b partial!('b Context, ClauseAllocP, XorStateP),
    ) -> &'out [Lit]
    where
        'a: 'out,
        'b: 'out,
    {
        match self {
            Conflict::Binary(lits) => lits,
            Conflict::Ternary(lits) => lits,
            Conflict::Long(cref) => ctx.part(ClauseAllocP).clause(*cref).lits(),
            Conflict::Xor(_) => ctx.part(XorStateP).conflict_lits(),
        }
    }
}

/// Node and incoming edges of the implication graph.
#[derive(Copy, Clone)]
pub struct ImplNode {
    pub reason: Reason,
    pub level: LitIdx,
    /// Position on the trail, used to order clause minimization work.
    pub depth: LitIdx,
    /// During propagation at decision level 1: a single true literal this assignment is dominated
    /// by, or `Lit::UNDEF` when there is no unique dominator. Used for lazy hyper-binary
    /// resolution.
    pub ancestor: Lit,
}

/// The implication graph.
///
/// This is a DAG having all assigned variables as nodes. It has unit clauses, assumptions and
/// decisions as sources. For each propagated assignment it has incoming edges from the literals
/// whose assignment caused the propagation to happen.
pub struct ImplGraph {
    /// Contains only valid data for indices of assigned variables.
    pub nodes: Vec<ImplNode>,
}

impl Default for ImplGraph {
    fn default() -> ImplGraph {
        ImplGraph { nodes: vec![] }
    }
}

impl ImplGraph {
    /// Update structures for a new variable count.
    pub fn set_var_count(&mut self, count: usize) {
        self.nodes.resize(
            count,
            ImplNode {
                reason: Reason::Unit,
                level: 0,
                depth: 0,
                ancestor: Lit::UNDEF,
            },
        );
    }

    /// Get the reason for an assigned variable.
    ///
    /// Returns stale data if the variable isn't assigned.
    pub fn reason(&self, var: Var) -> &Reason {
        &self.nodes[var.index()].reason
    }

    /// Get the decision level of an assigned variable.
    ///
    /// Returns stale data if the variable isn't assigned.
    pub fn level(&self, var: Var) -> usize {
        self.nodes[var.index()].level as usize
    }

    /// The level 1 dominator of an assigned variable, see [`ImplNode::ancestor`].
    pub fn ancestor(&self, var: Var) -> Lit {
        self.nodes[var.index()].ancestor
    }

    /// Updates the reason for an assigned variable.
    ///
    /// Make sure the reason vars are in front of the assigned variable in the trail.
    pub fn update_reason(&mut self, var: Var, reason: Reason) {
        self.nodes[var.index()].reason = reason
    }

    /// Turns the reason for an assigned variable into a unit reason.
    ///
    /// Used when level 0 assignments are removed from the trail.
    pub fn update_removed_unit(&mut self, var: Var) {
        self.nodes[var.index()].reason = Reason::Unit;
        self.nodes[var.index()].level = 0;
    }
}
