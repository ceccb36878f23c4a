//! Boolean satisfiability solver.
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use partial_ref::{partial, IntoPartialRef, IntoPartialRefMut, PartialRef};

use anyhow::Error;
use log::{info, warn};

use xorsat_formula::{CnfFormula, ExtendFormula, Lit, Var, XorClause};

use crate::assumptions::set_assumptions;
use crate::config::SolverConfigUpdate;
use crate::context::{config_changed, ensure_var_count, parts::*, Context};
use crate::dimacs::DimacsParser;
use crate::load::{load_clause, load_xor_clause, uneliminate};
use crate::model::reconstruct_model;
use crate::proof::{DrupSink, ProofFormat};
use crate::prop::full_restart;
use crate::schedule::schedule_step;
use crate::state::SatState;
use crate::variables::Removed;

/// Outcome of a solve call.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum SolveResult {
    Sat,
    Unsat,
    /// The search was interrupted or exhausted its budget before reaching a verdict.
    Unknown,
}

/// Handle for interrupting a running solver from another thread.
#[derive(Clone)]
pub struct InterruptHandle {
    interrupt: Arc<AtomicBool>,
}

impl InterruptHandle {
    /// Ask the solver to stop at its next checkpoint.
    pub fn interrupt_asap(&self) {
        self.interrupt.store(true, Ordering::Relaxed);
    }
}

/// A boolean satisfiability solver with native parity constraint reasoning.
#[derive(Default)]
pub struct Solver {
    ctx: Box<Context>,
}

impl Solver {
    /// Create a new solver.
    pub fn new() -> Solver {
        Solver::default()
    }

    /// Change configurable parameters.
    pub fn config(&mut self, update: &SolverConfigUpdate) {
        let mut ctx = self.ctx.into_partial_ref_mut();
        update.apply(ctx.part_mut(SolverConfigP));
        config_changed(ctx.borrow());
    }

    /// Add a new variable and return it.
    pub fn new_var(&mut self) -> Var {
        let mut ctx = self.ctx.into_partial_ref_mut();
        let var = ctx.part_mut(VariablesP).new_var();
        let count = ctx.part(VariablesP).count();
        ensure_var_count(ctx.borrow(), count);
        var
    }

    /// Add multiple new variables.
    pub fn new_vars(&mut self, count: usize) {
        for _ in 0..count {
            self.new_var();
        }
    }

    /// Number of allocated variables.
    pub fn var_count(&self) -> usize {
        let ctx = self.ctx.into_partial_ref();
        ctx.part(VariablesP).count()
    }

    /// Add a clause to the formula.
    ///
    /// Returns `false` when the formula became unsatisfiable by level 0 reasoning; further
    /// clauses are then ignored.
    pub fn add_clause(&mut self, lits: &[Lit]) -> bool {
        let mut ctx = self.ctx.into_partial_ref_mut();

        let var_count = lits
            .iter()
            .map(|lit| lit.index() + 1)
            .max()
            .unwrap_or(0)
            .max(ctx.part(VariablesP).count());
        ensure_var_count(ctx.borrow(), var_count);

        load_clause(ctx.borrow(), lits);

        ctx.part(SolverStateP).sat_state != SatState::Unsat
    }

    /// Add a parity constraint over the given variables to the formula.
    ///
    /// Returns `false` when the formula became unsatisfiable by level 0 reasoning.
    pub fn add_xor_clause(&mut self, vars: &[Var], rhs: bool) -> bool {
        let mut ctx = self.ctx.into_partial_ref_mut();

        let var_count = vars
            .iter()
            .map(|var| var.index() + 1)
            .max()
            .unwrap_or(0)
            .max(ctx.part(VariablesP).count());
        ensure_var_count(ctx.borrow(), var_count);

        load_xor_clause(ctx.borrow(), vars, rhs);

        ctx.part(SolverStateP).sat_state != SatState::Unsat
    }

    /// Add a whole formula, parity constraints included.
    pub fn add_formula(&mut self, formula: &CnfFormula) {
        {
            let mut ctx = self.ctx.into_partial_ref_mut();
            let count = formula.var_count().max(ctx.part(VariablesP).count());
            ensure_var_count(ctx.borrow(), count);
        }
        for clause in formula.iter() {
            self.add_clause(clause);
        }
        for xor in formula.xor_clauses() {
            self.add_xor_clause(&xor.vars, xor.rhs);
        }
    }

    /// Read and add a formula in DIMACS CNF format, `x` clause lines included.
    ///
    /// Using this avoids creating a temporary [`CnfFormula`].
    pub fn add_dimacs_cnf(&mut self, input: impl io::Read) -> Result<(), Error> {
        let parser = DimacsParser::parse_incremental(input, |parser| {
            self.add_formula(&parser.take_formula());
            Ok(())
        })?;

        info!(
            "Parsed formula with {} variables and {} clauses",
            parser.var_count(),
            parser.clause_count()
        );

        Ok(())
    }

    /// Check the satisfiability of the current formula.
    pub fn solve(&mut self) -> SolveResult {
        self.solve_with_assumptions(&[])
    }

    /// Check the satisfiability of the current formula under the given assumptions.
    ///
    /// The assumption variables are frozen against elimination for the rest of the solver's
    /// lifetime.
    pub fn solve_with_assumptions(&mut self, assumptions: &[Lit]) -> SolveResult {
        let mut ctx = self.ctx.into_partial_ref_mut();

        let var_count = assumptions
            .iter()
            .map(|lit| lit.index() + 1)
            .max()
            .unwrap_or(0)
            .max(ctx.part(VariablesP).count());
        ensure_var_count(ctx.borrow(), var_count);

        full_restart(ctx.borrow());

        // Assumptions are stated over user literals; translate them to the inner numbering, route
        // them through the replacement table and re-introduce eliminated variables they mention.
        let mut mapped = Vec::with_capacity(assumptions.len());
        for &lit in assumptions {
            let lit = lit.map_var(ctx.part(VariablesP).inner_from_outer(lit.var()));
            let lit = ctx.part(VariablesP).replacement(lit);
            if ctx.part(VariablesP).var_data(lit.var()).removed == Removed::Eliminated {
                uneliminate(ctx.borrow(), lit.var());
            }
            mapped.push(lit);
        }

        set_assumptions(ctx.borrow(), &mapped);

        if ctx.part(SolverStateP).sat_state == SatState::Unsat {
            return SolveResult::Unsat;
        }

        if !ctx.part(SolverStateP).phases_initialized {
            ctx.part_mut(SolverStateP).phases_initialized = true;
            if ctx.part(SolverConfigP).init_phases_by_occurrence {
                crate::decision::init_phases_by_occurrence(ctx.borrow());
            }
        }

        while schedule_step(ctx.borrow()) {}

        // A consumed interrupt request does not linger into the next call.
        if ctx.part(SolverStateP).interrupt_requested() {
            ctx.part(SolverStateP).clear_interrupt();
        }

        if ctx.part(SolverStateP).proof_failed {
            warn!("proof output failed, aborting the search");
            return SolveResult::Unknown;
        }

        match ctx.part(SolverStateP).sat_state {
            SatState::Unknown => SolveResult::Unknown,
            SatState::Sat => {
                #[cfg(debug_assertions)]
                check_current_assignment(ctx.borrow());

                reconstruct_model(ctx.borrow());
                SolveResult::Sat
            }
            SatState::Unsat | SatState::UnsatUnderAssumptions => SolveResult::Unsat,
        }
    }

    /// Set of literals that satisfy the formula.
    ///
    /// Total over all variables; only valid directly after a [`SolveResult::Sat`].
    pub fn model(&self) -> Option<Vec<Lit>> {
        let ctx = self.ctx.into_partial_ref();

        if ctx.part(SolverStateP).sat_state != SatState::Sat {
            return None;
        }

        let model = ctx.part(ModelP);
        let variables = ctx.part(VariablesP);

        Some(
            (0..model.var_count())
                .map(|index| {
                    let var = Var::from_index(index);
                    variables.outer_from_inner_lit(var.lit(model.value(var)))
                })
                .collect(),
        )
    }

    /// Request a cooperative interrupt from this thread.
    pub fn interrupt_asap(&self) {
        let ctx = self.ctx.into_partial_ref();
        ctx.part(SolverStateP)
            .interrupt
            .store(true, Ordering::Relaxed);
    }

    /// A cloneable handle that can interrupt this solver from other threads.
    pub fn interrupt_handle(&self) -> InterruptHandle {
        let ctx = self.ctx.into_partial_ref();
        InterruptHandle {
            interrupt: ctx.part(SolverStateP).interrupt.clone(),
        }
    }

    /// Limit the number of conflicts of the next solve call.
    ///
    /// An exhausted budget makes solve return [`SolveResult::Unknown`].
    pub fn set_conflict_budget(&mut self, budget: Option<u64>) {
        let mut ctx = self.ctx.into_partial_ref_mut();
        ctx.part_mut(ScheduleP).set_conflict_budget(budget);
    }

    /// Write a proof of all derived clauses to the given target.
    pub fn write_proof(&mut self, target: impl io::Write + 'static, format: ProofFormat) {
        let mut ctx = self.ctx.into_partial_ref_mut();
        ctx.part_mut(ProofP).write_proof(target, format);
    }

    /// Stop writing the proof and flush it.
    pub fn close_proof(&mut self) {
        let mut ctx = self.ctx.into_partial_ref_mut();
        ctx.part_mut(ProofP).close_proof();
    }

    /// Install an observer receiving every derived clause addition and every deletion.
    pub fn set_drup(&mut self, sink: Box<dyn DrupSink>) {
        let mut ctx = self.ctx.into_partial_ref_mut();
        ctx.part_mut(ProofP).set_observer(sink);
    }

    /// The first proof I/O failure, if any.
    pub fn take_proof_error(&mut self) -> Option<io::Error> {
        let mut ctx = self.ctx.into_partial_ref_mut();
        ctx.part_mut(ProofP).take_io_error()
    }

    /// Write the redundant clauses as DIMACS lines, sorted by glue, then by size.
    pub fn write_learnt_clauses(&self, target: &mut impl io::Write) -> io::Result<()> {
        let ctx = self.ctx.into_partial_ref();

        let mut clauses: Vec<(usize, Vec<Lit>)> = vec![];

        let mut binaries = vec![];
        ctx.part(BinaryClausesP).collect_clauses(&mut binaries);
        for (lits, redundant) in binaries {
            if redundant {
                clauses.push((2, lits.to_vec()));
            }
        }

        let mut ternaries = vec![];
        ctx.part(TernaryClausesP).collect_clauses(&mut ternaries);
        for (lits, redundant) in ternaries {
            if redundant {
                clauses.push((3, lits.to_vec()));
            }
        }

        for &cref in ctx.part(ClauseDbP).clauses().iter() {
            let clause = ctx.part(ClauseAllocP).clause(cref);
            let header = clause.header();
            if header.deleted() || !header.redundant() {
                continue;
            }
            clauses.push((header.glue(), clause.lits().to_vec()));
        }

        clauses.sort_by(|a, b| (a.0, a.1.len()).cmp(&(b.0, b.1.len())));

        let variables = ctx.part(VariablesP);
        for (_, lits) in clauses {
            let outer: Vec<Lit> = lits
                .iter()
                .map(|&lit| variables.outer_from_inner_lit(lit))
                .collect();
            crate::dimacs::write_clause(target, &outer)?;
        }

        Ok(())
    }

    /// Write the simplified irredundant formula in DIMACS format, `x` lines included.
    ///
    /// Uses the original (outer) variable numbering.
    pub fn write_simplified_cnf(&self, target: &mut impl io::Write) -> io::Result<()> {
        let ctx = self.ctx.into_partial_ref();

        let variables = ctx.part(VariablesP);
        let mut formula = CnfFormula::new();
        formula.set_var_count(variables.count());

        let map = |lits: &[Lit]| -> Vec<Lit> {
            lits.iter()
                .map(|&lit| variables.outer_from_inner_lit(lit))
                .collect()
        };

        // Facts forced at level 0. After a satisfying search the assignment also holds search
        // level values, which are not part of the formula.
        for index in 0..variables.count() {
            let var = Var::from_index(index);
            if !variables.is_live(var) {
                continue;
            }
            if let Some(value) = ctx.part(AssignmentP).var_value(var) {
                if ctx.part(ImplGraphP).level(var) == 0 {
                    formula.add_clause(&map(&[var.lit(value)]));
                }
            }
        }

        let mut binaries = vec![];
        ctx.part(BinaryClausesP).collect_clauses(&mut binaries);
        for (lits, redundant) in binaries {
            if !redundant {
                formula.add_clause(&map(&lits));
            }
        }

        let mut ternaries = vec![];
        ctx.part(TernaryClausesP).collect_clauses(&mut ternaries);
        for (lits, redundant) in ternaries {
            if !redundant {
                formula.add_clause(&map(&lits));
            }
        }

        for &cref in ctx.part(ClauseDbP).clauses().iter() {
            let clause = ctx.part(ClauseAllocP).clause(cref);
            let header = clause.header();
            if header.deleted() || header.redundant() {
                continue;
            }
            formula.add_clause(&map(clause.lits()));
        }

        for row in ctx.part(XorStateP).rows() {
            let vars: Vec<Var> = row
                .vars
                .iter()
                .map(|&var| variables.outer_from_inner(var))
                .collect();
            formula.add_xor_clause(&XorClause { vars, rhs: row.rhs });
        }

        crate::dimacs::write_dimacs(target, &formula)
    }
}

impl ExtendFormula for Solver {
    fn add_clause(&mut self, literals: &[Lit]) {
        Solver::add_clause(self, literals);
    }

    fn add_xor_clause(&mut self, xor: &XorClause) {
        Solver::add_xor_clause(self, &xor.vars, xor.rhs);
    }

    fn new_var(&mut self) -> Var {
        Solver::new_var(self)
    }
}

/// Debug check that the current assignment satisfies every stored constraint.
#[cfg(debug_assertions)]
fn check_current_assignment(
    ctx: partial!(
        Context,
        AssignmentP,
        BinaryClausesP,
        ClauseAllocP,
        ClauseDbP,
        TernaryClausesP,
        XorStateP,
    ),
) {
    let assignment = ctx.part(AssignmentP);

    let mut binaries = vec![];
    ctx.part(BinaryClausesP).collect_clauses(&mut binaries);
    for (lits, redundant) in binaries {
        if !redundant {
            debug_assert!(lits.iter().any(|&lit| assignment.lit_is_true(lit)));
        }
    }

    let mut ternaries = vec![];
    ctx.part(TernaryClausesP).collect_clauses(&mut ternaries);
    for (lits, redundant) in ternaries {
        if !redundant {
            debug_assert!(lits.iter().any(|&lit| assignment.lit_is_true(lit)));
        }
    }

    for &cref in ctx.part(ClauseDbP).clauses().iter() {
        let clause = ctx.part(ClauseAllocP).clause(cref);
        if clause.header().deleted() || clause.header().redundant() {
            continue;
        }
        debug_assert!(clause.lits().iter().any(|&lit| assignment.lit_is_true(lit)));
    }

    for row in ctx.part(XorStateP).rows() {
        let mut parity = false;
        for &var in row.vars.iter() {
            parity ^= assignment.var_value(var).unwrap_or(false);
        }
        debug_assert_eq!(parity, row.rhs);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;

    use xorsat_formula::{lits, test::*, vars};

    use crate::dimacs::write_dimacs;

    #[test]
    fn empty_formula_is_sat() {
        let mut solver = Solver::new();
        assert_eq!(solver.solve(), SolveResult::Sat);
        assert_eq!(solver.model().unwrap().len(), 0);
    }

    #[test]
    fn two_units_contradict() {
        let mut solver = Solver::new();
        assert!(solver.add_clause(&lits![1]));
        assert!(!solver.add_clause(&lits![-1]));
        assert_eq!(solver.solve(), SolveResult::Unsat);
    }

    #[test]
    fn chain_propagation_model() {
        let mut solver = Solver::new();
        solver.add_clause(&lits![-1, 2]);
        solver.add_clause(&lits![-2, 3]);
        solver.add_clause(&lits![-3, 4]);
        solver.add_clause(&lits![1]);

        assert_eq!(solver.solve(), SolveResult::Sat);

        let model = solver.model().unwrap();
        for number in 1..=4 {
            assert!(model.contains(&Lit::from_dimacs(number)));
        }
    }

    #[test]
    fn xor_parity_forces_value() {
        let mut solver = Solver::new();
        solver.add_xor_clause(&vars![1, 2, 3], false);
        solver.add_clause(&lits![1]);
        solver.add_clause(&lits![2]);

        assert_eq!(solver.solve(), SolveResult::Sat);

        let model = solver.model().unwrap();
        assert!(model.contains(&Lit::from_dimacs(-3)));
    }

    #[test]
    fn assumptions_restrict_and_release() {
        let mut solver = Solver::new();
        solver.add_clause(&lits![1, 2]);

        assert_eq!(
            solver.solve_with_assumptions(&lits![-1, -2]),
            SolveResult::Unsat
        );
        assert_eq!(solver.solve(), SolveResult::Sat);
    }

    #[test]
    fn conflict_budget_reports_unknown() {
        let mut solver = Solver::new();

        // A formula that needs at least a few conflicts.
        let formula = CnfFormula::from(
            vec![
                lits![1, 2, 3].to_vec(),
                lits![1, 2, -3].to_vec(),
                lits![1, -2, 3].to_vec(),
                lits![1, -2, -3].to_vec(),
                lits![-1, 2, 3].to_vec(),
                lits![-1, 2, -3].to_vec(),
                lits![-1, -2, 3].to_vec(),
                lits![-1, -2, -3].to_vec(),
            ],
        );
        solver.add_formula(&formula);

        solver.set_conflict_budget(Some(1));
        assert_eq!(solver.solve(), SolveResult::Unknown);

        solver.set_conflict_budget(None);
        assert_eq!(solver.solve(), SolveResult::Unsat);
    }

    proptest! {
        #[test]
        fn sgen_unsat(formula in sgen_unsat_formula(1..7usize)) {
            let mut solver = Solver::new();

            solver.add_formula(&formula);

            prop_assert_eq!(solver.solve(), SolveResult::Unsat);
        }

        #[test]
        fn sat(formula in sat_formula(4..20usize, 10..100usize, 0.05..0.2, 0.9..1.0)) {
            let mut solver = Solver::new();

            solver.add_formula(&formula);

            prop_assert_eq!(solver.solve(), SolveResult::Sat);

            let model = solver.model().unwrap();

            for clause in formula.iter() {
                prop_assert!(clause.iter().any(|lit| model.contains(lit)));
            }
        }

        #[test]
        fn sat_with_xor(formula in sat_xor_formula(4..15usize, 5..40usize, 1..4usize, 2..5usize)) {
            let mut solver = Solver::new();

            solver.add_formula(&formula);

            prop_assert_eq!(solver.solve(), SolveResult::Sat);

            let model = solver.model().unwrap();

            for clause in formula.iter() {
                prop_assert!(clause.iter().any(|lit| model.contains(lit)));
            }

            for xor in formula.xor_clauses() {
                let mut parity = false;
                for &var in xor.vars.iter() {
                    parity ^= model.contains(&var.positive());
                }
                prop_assert_eq!(parity, xor.rhs);
            }
        }

        #[test]
        fn sat_via_dimacs(formula in sat_formula(4..20usize, 10..100usize, 0.05..0.2, 0.9..1.0)) {
            let mut solver = Solver::new();

            let mut dimacs = vec![];

            write_dimacs(&mut dimacs, &formula).unwrap();

            solver.add_dimacs_cnf(&mut &dimacs[..]).unwrap();

            prop_assert_eq!(solver.solve(), SolveResult::Sat);

            let model = solver.model().unwrap();

            for clause in formula.iter() {
                prop_assert!(clause.iter().any(|lit| model.contains(lit)));
            }
        }

        #[test]
        fn sgen_unsat_incremental_clauses(formula in sgen_unsat_formula(1..7usize)) {
            let mut solver = Solver::new();

            let mut last_state = SolveResult::Sat;

            for clause in formula.iter() {
                solver.add_clause(clause);

                let state = solver.solve();
                if state != last_state {
                    prop_assert_eq!(state, SolveResult::Unsat);
                    prop_assert_eq!(last_state, SolveResult::Sat);
                    last_state = state;
                }
            }

            prop_assert_eq!(last_state, SolveResult::Unsat);
        }
    }
}
