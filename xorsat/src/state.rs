//! Miscellaneous solver state.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Satisfiability state.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum SatState {
    Unknown,
    Sat,
    Unsat,
    UnsatUnderAssumptions,
}

impl Default for SatState {
    fn default() -> SatState {
        SatState::Unknown
    }
}

/// Miscellaneous solver state.
///
/// Anything larger or any larger group of related state variables should be moved into a separate
/// part of [`Context`](crate::context::Context).
pub struct SolverState {
    pub sat_state: SatState,
    /// Abstract work counter ticked by the propagator and the simplifier.
    ///
    /// Used for deterministic budgeting of inprocessing steps, independent of wall time.
    pub bogo_props: u64,
    /// Cooperative cancellation flag, shared with [`InterruptHandle`](crate::solver::InterruptHandle)s.
    pub interrupt: Arc<AtomicBool>,
    /// Set when writing to the proof target or observer failed.
    pub proof_failed: bool,
    /// Whether the initial phases were computed, done once on the first solve call.
    pub phases_initialized: bool,
}

impl Default for SolverState {
    fn default() -> SolverState {
        SolverState {
            sat_state: SatState::Unknown,
            bogo_props: 0,
            interrupt: Arc::new(AtomicBool::new(false)),
            proof_failed: false,
            phases_initialized: false,
        }
    }
}

impl SolverState {
    /// Whether a cooperative interrupt was requested.
    ///
    /// Long running routines poll this at natural checkpoints and unwind without corrupting any
    /// invariants.
    pub fn interrupt_requested(&self) -> bool {
        self.interrupt.load(Ordering::Relaxed)
    }

    /// Clear a pending interrupt request.
    pub fn clear_interrupt(&self) {
        self.interrupt.store(false, Ordering::Relaxed);
    }
}
