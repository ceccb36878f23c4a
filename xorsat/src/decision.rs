//! Decision heuristics.
use partial_ref::{partial, PartialRef};

use xorsat_formula::{Lit, Var};

use crate::context::{parts::*, Context};
use crate::prop::{enqueue_assignment, Reason};

pub mod vsids;

pub use vsids::Vsids;

/// Make a decision and enqueue it.
///
/// Branches on the highest activity variable among the unassigned live variables, or occasionally
/// on a random variable among the most active ones. The polarity is the saved phase.
///
/// Returns `false` if no decision was made because all live variables are assigned.
pub fn make_decision(
    mut ctx: partial!(
        Context,
        mut AssignmentP,
        mut ImplGraphP,
        mut TrailP,
        mut VsidsP,
        SolverConfigP,
        VariablesP,
    ),
) -> bool {
    let decision_var = match next_decision_var(ctx.borrow()) {
        Some(var) => var,
        None => return false,
    };

    let decision = Lit::from_var(
        decision_var,
        ctx.part(AssignmentP).last_var_value(decision_var),
    );

    ctx.part_mut(TrailP).new_decision_level();

    enqueue_assignment(ctx.borrow(), decision, Reason::Unit);

    true
}

/// Find the variable to branch on.
fn next_decision_var(
    mut ctx: partial!(
        Context,
        mut VsidsP,
        AssignmentP,
        SolverConfigP,
        VariablesP,
    ),
) -> Option<Var> {
    let random_freq = ctx.part(SolverConfigP).random_decision_freq;
    let random_top = ctx.part(SolverConfigP).random_decision_top.max(1);

    let randomize = random_freq > 0.0 && {
        let sample = ctx.part_mut(VsidsP).next_random();
        (sample >> 11) as f64 / ((1u64 << 53) as f64) < random_freq
    };

    if randomize {
        random_decision_var(ctx.borrow(), random_top)
    } else {
        top_decision_var(ctx.borrow())
    }
}

/// Pop heap entries until an unassigned live variable surfaces.
fn top_decision_var(
    mut ctx: partial!(Context, mut VsidsP, AssignmentP, VariablesP),
) -> Option<Var> {
    while let Some(var) = ctx.part_mut(VsidsP).next() {
        if var_is_decidable(ctx.borrow(), var) {
            return Some(var);
        }
    }
    None
}

/// Pick uniformly among the top decidable heap entries.
fn random_decision_var(
    mut ctx: partial!(Context, mut VsidsP, AssignmentP, VariablesP),
    top: usize,
) -> Option<Var> {
    let mut pool = Vec::with_capacity(top);

    while pool.len() < top {
        match ctx.part_mut(VsidsP).next() {
            Some(var) if var_is_decidable(ctx.borrow(), var) => pool.push(var),
            Some(_) => (),
            None => break,
        }
    }

    if pool.is_empty() {
        return None;
    }

    let pick = (ctx.part_mut(VsidsP).next_random() % pool.len() as u64) as usize;

    for (index, &var) in pool.iter().enumerate() {
        if index != pick {
            ctx.part_mut(VsidsP).make_available(var);
        }
    }

    Some(pool[pick])
}

fn var_is_decidable(
    ctx: partial!(Context, AssignmentP, VariablesP),
    var: Var,
) -> bool {
    ctx.part(AssignmentP).var_value(var).is_none() && ctx.part(VariablesP).is_live(var)
}

/// Re-insert a variable into the decision order.
pub fn make_available(mut ctx: partial!(Context, mut VsidsP), var: Var) {
    ctx.part_mut(VsidsP).make_available(var);
}

/// Derive initial saved phases from the literal occurrence counts of the formula.
///
/// A variable that occurs more often positively than negatively starts with a positive phase.
pub fn init_phases_by_occurrence(
    mut ctx: partial!(
        Context,
        mut AssignmentP,
        BinaryClausesP,
        ClauseAllocP,
        ClauseDbP,
        TernaryClausesP,
        VariablesP,
    ),
) {
    let var_count = ctx.part(VariablesP).count();
    let mut balance = vec![0i64; var_count];

    let mut note = |lit: Lit| {
        if lit.is_positive() {
            balance[lit.index()] += 1;
        } else {
            balance[lit.index()] -= 1;
        }
    };

    let mut binaries = vec![];
    ctx.part(BinaryClausesP).collect_clauses(&mut binaries);
    for (lits, _) in binaries {
        for &lit in lits.iter() {
            note(lit);
        }
    }

    let mut ternaries = vec![];
    ctx.part(TernaryClausesP).collect_clauses(&mut ternaries);
    for (lits, _) in ternaries {
        for &lit in lits.iter() {
            note(lit);
        }
    }

    for &cref in ctx.part(ClauseDbP).clauses().iter() {
        let clause = ctx.part(ClauseAllocP).clause(cref);
        if clause.header().deleted() {
            continue;
        }
        for &lit in clause.lits() {
            note(lit);
        }
    }

    let assignment = ctx.part_mut(AssignmentP);
    for index in 0..var_count {
        assignment.set_last_var_value(Var::from_index(index), balance[index] > 0);
    }
}
