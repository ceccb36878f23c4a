//! A CDCL based SAT solver with native XOR (parity) constraint reasoning.
//!
//! The solver accepts formulas in conjunctive normal form extended with parity constraints,
//! decides satisfiability and produces total models. Between search episodes an inprocessing
//! scheduler interleaves equivalent literal substitution, failed literal probing, transitive
//! reduction, subsumption, self-subsuming resolution, clause vivification, XOR extraction and
//! bounded variable elimination. Parity constraints are handled natively by Gauss–Jordan
//! elimination integrated with unit propagation.
pub mod config;
pub mod solver;

/// DIMACS CNF parsing and writing, re-exported from `xorsat-dimacs`.
pub mod dimacs {
    pub use xorsat_dimacs::*;
}

pub use solver::{InterruptHandle, SolveResult, Solver};

pub use proof::{DrupSink, ProofFormat};

pub use xorsat_formula::{CnfFormula, ExtendFormula, Lit, Var, XorClause};

mod analyze;
mod assumptions;
mod binary;
mod cache;
mod cdcl;
mod clause;
mod context;
mod decision;
mod glue;
mod load;
mod model;
mod proc;
mod proof;
mod prop;
mod reconstruct;
mod schedule;
mod simplify;
mod state;
mod ternary;
mod tmp;
mod variables;
mod xor;
