//! Scheduling of search, restarts, database cleaning and inprocessing.
use log::{debug, info};

use partial_ref::{partial, PartialRef};

use crate::cdcl::conflict_step;
use crate::clause::reduce::reduce;
use crate::config::RestartPolicy;
use crate::context::{parts::*, Context};
use crate::proc::{elim, occur, probe, scc, stamp, subsume, vivify};
use crate::proof;
use crate::prop::{backtrack, propagate, restart};
use crate::simplify::{prove_units, simplify};
use crate::state::SatState;
use crate::xor::{extract, gauss};

/// A fixed length queue of recent samples with a running sum.
///
/// Used for the short term glue average and the trail length average of the restart heuristics.
pub struct BoundedQueue {
    samples: Vec<u64>,
    capacity: usize,
    head: usize,
    filled: bool,
    sum: u64,
}

impl BoundedQueue {
    pub fn new(capacity: usize) -> BoundedQueue {
        BoundedQueue {
            samples: Vec::with_capacity(capacity),
            capacity: capacity.max(1),
            head: 0,
            filled: false,
            sum: 0,
        }
    }

    pub fn push(&mut self, sample: u64) {
        if self.samples.len() < self.capacity {
            self.samples.push(sample);
            self.sum += sample;
            self.filled = self.samples.len() == self.capacity;
        } else {
            self.sum -= self.samples[self.head];
            self.sum += sample;
            self.samples[self.head] = sample;
            self.head = (self.head + 1) % self.capacity;
        }
    }

    /// Whether the queue has seen `capacity` samples since the last clear.
    pub fn is_filled(&self) -> bool {
        self.filled
    }

    pub fn clear(&mut self) {
        self.samples.clear();
        self.head = 0;
        self.filled = false;
        self.sum = 0;
    }

    pub fn avg(&self) -> f64 {
        if self.samples.is_empty() {
            0.0
        } else {
            self.sum as f64 / self.samples.len() as f64
        }
    }
}

/// Scheduling state for search, restarts, cleaning and inprocessing.
pub struct Schedule {
    conflicts: u64,
    conflicts_since_restart: u64,
    restarts: u64,
    /// Threshold of the geometric restart policy.
    geom_threshold: f64,
    /// Short term window of learnt clause glues.
    glue_window: BoundedQueue,
    /// Long term glue statistics.
    glue_sum: f64,
    glue_count: u64,
    /// Long term trail length window for restart blocking.
    trail_window: BoundedQueue,
    /// Consecutive conflicts with agility below the limit.
    low_agility_count: u32,
    next_reduce: u64,
    reduce_interval: f64,
    cleans_since_simplify: u32,
    /// Grows by the configured factor each inprocessing round.
    budget_multiplier: f64,
    inprocessing_rounds: u64,
    /// Conflict budget of the current solve call, if any.
    conflict_budget: Option<u64>,
    sized_for_config: bool,
}

impl Default for Schedule {
    fn default() -> Schedule {
        Schedule {
            conflicts: 0,
            conflicts_since_restart: 0,
            restarts: 0,
            geom_threshold: 0.0,
            glue_window: BoundedQueue::new(50),
            glue_sum: 0.0,
            glue_count: 0,
            trail_window: BoundedQueue::new(5000),
            low_agility_count: 0,
            next_reduce: 0,
            reduce_interval: 0.0,
            cleans_since_simplify: 0,
            budget_multiplier: 1.0,
            inprocessing_rounds: 0,
            conflict_budget: None,
            sized_for_config: false,
        }
    }
}

impl Schedule {
    /// Limit the number of conflicts of the next solve call.
    pub fn set_conflict_budget(&mut self, budget: Option<u64>) {
        self.conflict_budget = budget.map(|limit| self.conflicts.saturating_add(limit));
    }

    /// Whether the conflict budget of the current solve call is used up.
    pub fn budget_exhausted(&self) -> bool {
        match self.conflict_budget {
            Some(limit) => self.conflicts >= limit,
            None => false,
        }
    }

    /// Record a learnt clause and the search state at the conflict.
    pub fn note_conflict(&mut self, glue: usize, trail_len: usize, agility: f64, limit: f64) {
        self.conflicts += 1;
        self.conflicts_since_restart += 1;

        self.glue_window.push(glue as u64);
        self.glue_sum += glue as f64;
        self.glue_count += 1;

        self.trail_window.push(trail_len as u64);

        if agility < limit {
            self.low_agility_count = self.low_agility_count.saturating_add(1);
        } else {
            self.low_agility_count = 0;
        }
    }
}

/// Number of consecutive low agility conflicts that trigger an agility restart.
const LOW_AGILITY_RESTARTS: u32 = 32;

/// Perform one step of the schedule.
///
/// Returns `false` when the search is finished or stopped.
pub fn schedule_step(
    mut ctx: partial!(
        Context,
        mut AnalyzeConflictP,
        mut AssignmentP,
        mut AssumptionsP,
        mut BinaryClausesP,
        mut CacheP,
        mut ClauseActivityP,
        mut ClauseAllocP,
        mut ClauseDbP,
        mut ImplGraphP,
        mut ProofP,
        mut ReconstructP,
        mut ScheduleP,
        mut SolverConfigP,
        mut SolverStateP,
        mut TernaryClausesP,
        mut TmpDataP,
        mut TrailP,
        mut VariablesP,
        mut VsidsP,
        mut WatchlistsP,
        mut XorStateP,
    ),
) -> bool {
    if ctx.part(SolverStateP).sat_state != SatState::Unknown {
        return false;
    }
    if ctx.part(SolverStateP).interrupt_requested()
        || ctx.part(SolverStateP).proof_failed
        || ctx.part(ScheduleP).budget_exhausted()
    {
        return false;
    }

    prepare_schedule(ctx.borrow());

    // Matrices invalidated by inprocessing or new constraints get rebuilt at level 0.
    if !ctx.part(XorStateP).is_built() && ctx.part(TrailP).current_level() == 0 {
        if !gauss::build_matrices(ctx.borrow()) {
            return false;
        }
    }

    {
        let schedule = ctx.part(ScheduleP);
        if schedule.conflicts > 0 && schedule.conflicts % 10000 == 0 {
            let db = ctx.part(ClauseDbP);
            let units = ctx.part(TrailP).top_level_assignment_count();
            info!(
                "confl: {}k rest: {} vars: {} bin: {} tern: {} irred: {} red: {} xor: {}",
                schedule.conflicts / 1000,
                schedule.restarts,
                ctx.part(VariablesP).live_count() - units.min(ctx.part(VariablesP).live_count()),
                ctx.part(BinaryClausesP).count(),
                ctx.part(TernaryClausesP).count(),
                db.count_irredundant(),
                db.count_redundant(),
                ctx.part(XorStateP).row_count(),
            );
        }
    }

    if restart_due(ctx.borrow()) {
        do_restart(ctx.borrow());
    }

    if ctx.part(ScheduleP).conflicts >= ctx.part(ScheduleP).next_reduce {
        reduce(ctx.borrow());

        let increase = ctx.part(SolverConfigP).increase_clean;
        let schedule = ctx.part_mut(ScheduleP);
        schedule.reduce_interval *= increase;
        schedule.next_reduce = schedule.conflicts + schedule.reduce_interval as u64;
        schedule.cleans_since_simplify += 1;
    }

    if ctx.part(ScheduleP).cleans_since_simplify
        >= ctx.part(SolverConfigP).cleans_between_simplify
    {
        ctx.part_mut(ScheduleP).cleans_since_simplify = 0;
        if !inprocess(ctx.borrow()) {
            return false;
        }
        // Inprocessing may have rewritten the parity constraints; the search must not continue
        // without enforcing them.
        if !ctx.part(XorStateP).is_built() && !gauss::build_matrices(ctx.borrow()) {
            return false;
        }
    }

    conflict_step(ctx.borrow());

    true
}

/// Size the schedule windows and intervals from the configuration.
fn prepare_schedule(
    mut ctx: partial!(Context, mut ScheduleP, SolverConfigP),
) {
    if ctx.part(ScheduleP).sized_for_config {
        return;
    }

    let (config, mut ctx) = ctx.split_part(SolverConfigP);
    let schedule = ctx.part_mut(ScheduleP);

    schedule.glue_window = BoundedQueue::new(config.glue_window);
    schedule.trail_window = BoundedQueue::new(config.blocking_window);
    schedule.geom_threshold = config.restart_first as f64;
    schedule.reduce_interval = config.start_clean as f64;
    schedule.next_reduce = schedule.conflicts + config.start_clean;
    schedule.sized_for_config = true;
}

/// Whether the configured restart policy asks for a restart, modulo restart blocking.
fn restart_due(
    ctx: partial!(Context, AssignmentP, ScheduleP, SolverConfigP, TrailP),
) -> bool {
    let schedule = ctx.part(ScheduleP);
    let config = ctx.part(SolverConfigP);

    if schedule.conflicts_since_restart == 0 {
        return false;
    }

    let glue_triggered = || {
        schedule.glue_window.is_filled()
            && schedule.glue_count > 0
            && schedule.glue_window.avg() * config.glue_trigger_factor
                > schedule.glue_sum / schedule.glue_count as f64
    };

    let agility_triggered = || schedule.low_agility_count >= LOW_AGILITY_RESTARTS;

    let triggered = match config.restart_policy {
        RestartPolicy::Geometric => {
            schedule.conflicts_since_restart as f64 > schedule.geom_threshold
        }
        RestartPolicy::Glue => glue_triggered(),
        RestartPolicy::Agility => agility_triggered(),
        RestartPolicy::GlueAgility => glue_triggered() && agility_triggered(),
    };

    if !triggered {
        return false;
    }

    // Blocking: a much longer trail than usual suggests the search is about to complete an
    // assignment, so hold on to it.
    if config.blocking_restart && schedule.trail_window.is_filled() {
        let trail_len = ctx.part(TrailP).trail().len() as f64;
        if trail_len > schedule.trail_window.avg() * config.blocking_factor {
            return false;
        }
    }

    true
}

/// Restart the search, with periodic phase flipping.
fn do_restart(
    mut ctx: partial!(
        Context,
        mut AssignmentP,
        mut ScheduleP,
        mut TrailP,
        mut VsidsP,
        mut XorStateP,
        AssumptionsP,
        SolverConfigP,
    ),
) {
    restart(ctx.borrow());

    let flip_interval = ctx.part(SolverConfigP).phase_flip_interval;
    let restart_inc = ctx.part(SolverConfigP).restart_inc;

    let schedule = ctx.part_mut(ScheduleP);
    schedule.restarts += 1;
    schedule.conflicts_since_restart = 0;
    schedule.geom_threshold *= restart_inc;
    schedule.glue_window.clear();
    schedule.low_agility_count = 0;

    if flip_interval != 0 && schedule.restarts % flip_interval == 0 {
        ctx.part_mut(AssignmentP).flip_phases();
    }
}

/// Propagate at level 0 and flush the trail, turning a conflict into an unsat state.
fn level_0_settle(
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
        mut TrailP,
        mut VsidsP,
        mut WatchlistsP,
        mut XorStateP,
        SolverConfigP,
    ),
) -> bool {
    debug_assert_eq!(ctx.part(TrailP).current_level(), 0);

    if propagate(ctx.borrow()).is_err() {
        proof::add_clause(ctx.borrow(), &[]);
        ctx.part_mut(SolverStateP).sat_state = SatState::Unsat;
        return false;
    }

    if prove_units(ctx.borrow()) {
        simplify(ctx.borrow());
    }

    true
}

/// Run one inprocessing phase.
///
/// The steps run in a fixed order, each bounded by a bogo-props budget scaled by a global
/// multiplier that grows every round. Every step checks the solver state and the interrupt flag;
/// a step that runs out of budget just ends, the next phase finishes its work.
pub fn inprocess(
    mut ctx: partial!(
        Context,
        mut AnalyzeConflictP,
        mut AssignmentP,
        mut AssumptionsP,
        mut BinaryClausesP,
        mut CacheP,
        mut ClauseActivityP,
        mut ClauseAllocP,
        mut ClauseDbP,
        mut ImplGraphP,
        mut ProofP,
        mut ReconstructP,
        mut ScheduleP,
        mut SolverConfigP,
        mut SolverStateP,
        mut TernaryClausesP,
        mut TmpDataP,
        mut TrailP,
        mut VariablesP,
        mut VsidsP,
        mut WatchlistsP,
        mut XorStateP,
    ),
) -> bool {
    backtrack(ctx.borrow(), 0);

    if !level_0_settle(ctx.borrow()) {
        return false;
    }

    let budget = {
        let base = ctx.part(SolverConfigP).inprocess_budget as f64;
        let growth = ctx.part(SolverConfigP).inprocess_growth;
        let schedule = ctx.part_mut(ScheduleP);
        schedule.inprocessing_rounds += 1;
        let budget = (base * schedule.budget_multiplier) as u64;
        schedule.budget_multiplier *= growth;
        budget
    };

    let mut ok = true;

    // Equivalent literal substitution, when enough new binary implications accumulated.
    let scc_due = {
        let new_edges = ctx.part(BinaryClausesP).added_since_scc();
        let live = ctx.part(VariablesP).live_count().max(1);
        new_edges * 100 >= (live as f64 * ctx.part(SolverConfigP).scc_find_percent) as usize
    };
    if ok && scc_due {
        ok = scc::scc_replace(ctx.borrow()) && level_0_settle(ctx.borrow());
    }

    if ok && ctx.part(SolverConfigP).probing && !interrupted(ctx.borrow()) {
        probe::probe(ctx.borrow(), budget);
        ok = ctx.part(SolverStateP).sat_state == SatState::Unknown
            && level_0_settle(ctx.borrow());
    }

    if ok && !interrupted(ctx.borrow()) {
        stamp::transitive_reduce(ctx.borrow(), budget / 4);
        stamp::stamp_simplify(ctx.borrow(), budget / 4);
        ok = ctx.part(SolverStateP).sat_state == SatState::Unknown
            && level_0_settle(ctx.borrow());
    }

    if ok && ctx.part(SolverConfigP).subsume && !interrupted(ctx.borrow()) {
        let mut index = occur::gather(ctx.borrow());
        subsume::subsume_pass(ctx.borrow(), &mut index, budget);
        occur::rebuild(ctx.borrow(), index);
        ok = ctx.part(SolverStateP).sat_state == SatState::Unknown
            && level_0_settle(ctx.borrow());
    }

    if ok && ctx.part(SolverConfigP).vivify && !interrupted(ctx.borrow()) {
        vivify::vivify(ctx.borrow(), budget / 2);
        ok = ctx.part(SolverStateP).sat_state == SatState::Unknown
            && level_0_settle(ctx.borrow());
    }

    if ok && ctx.part(SolverConfigP).xor_extract && !interrupted(ctx.borrow()) {
        let found = extract::extract_xors(ctx.borrow(), budget / 4);
        if found > 0 {
            debug!("extracted {} parity constraints", found);
        }
        ok = level_0_settle(ctx.borrow());
    }

    if ok
        && (ctx.part(SolverConfigP).var_elim || ctx.part(SolverConfigP).blocked_clause_elim)
        && !interrupted(ctx.borrow())
    {
        let mut index = occur::gather(ctx.borrow());
        if ctx.part(SolverConfigP).var_elim {
            elim::eliminate_vars(ctx.borrow(), &mut index, budget);
        }
        if ctx.part(SolverConfigP).blocked_clause_elim {
            elim::eliminate_blocked_clauses(ctx.borrow(), &mut index, budget / 4);
        }
        occur::rebuild(ctx.borrow(), index);
        ok = ctx.part(SolverStateP).sat_state == SatState::Unknown
            && level_0_settle(ctx.borrow());
    }

    debug!(
        "inprocessing round {} done, ok: {}",
        ctx.part(ScheduleP).inprocessing_rounds,
        ok
    );

    ok
}

fn interrupted(ctx: partial!(Context, SolverStateP)) -> bool {
    ctx.part(SolverStateP).interrupt_requested()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounded_queue_rolls_over() {
        let mut queue = BoundedQueue::new(3);

        queue.push(3);
        assert!(!queue.is_filled());
        assert_eq!(queue.avg(), 3.0);

        queue.push(5);
        queue.push(7);
        assert!(queue.is_filled());
        assert_eq!(queue.avg(), 5.0);

        queue.push(11);
        assert_eq!(queue.avg(), (5 + 7 + 11) as f64 / 3.0);

        queue.clear();
        assert!(!queue.is_filled());
        assert_eq!(queue.avg(), 0.0);
    }
}
