//! Proof tracing.
//!
//! The solver can trace every derived clause addition and every clause deletion, either into a
//! DRUP file (text or binary) or to an installed observer. Additions are always emitted before
//! the deletions they enable, and unit clauses found at level 0 are emitted as one literal
//! clauses. Failures while writing are treated as fatal: the proof is flushed, the failure is
//! recorded in the solver state and solving aborts with an unknown result.
use std::io::{sink, BufWriter, Write};

use partial_ref::{partial, PartialRef};

use xorsat_formula::Lit;

use crate::context::{parts::*, Context};

/// Proof formats that can be generated during solving.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum ProofFormat {
    Drup,
    BinaryDrup,
}

/// Observer receiving clause addition and deletion events.
///
/// Additions precede the deletions they enable. An error return is treated like an I/O failure of
/// a proof file.
pub trait DrupSink {
    fn add_clause(&mut self, lits: &[Lit]) -> std::io::Result<()>;
    fn delete_clause(&mut self, lits: &[Lit]) -> std::io::Result<()>;
}

/// Proof tracing.
pub struct Proof {
    format: Option<ProofFormat>,
    target: BufWriter<Box<dyn Write>>,
    observer: Option<Box<dyn DrupSink>>,
    io_error: Option<std::io::Error>,
}

impl Default for Proof {
    fn default() -> Proof {
        Proof {
            format: None,
            target: BufWriter::new(Box::new(sink())),
            observer: None,
            io_error: None,
        }
    }
}

impl Proof {
    /// Start writing proof steps to the given target with the given format.
    pub fn write_proof(&mut self, target: impl Write + 'static, format: ProofFormat) {
        self.format = Some(format);
        self.target = BufWriter::new(Box::new(target))
    }

    /// Stop writing proof steps.
    pub fn close_proof(&mut self) {
        // We need to explicitly flush to handle IO errors.
        let result = self.target.flush();
        self.handle_io_errors(result);
        self.format = None;
        self.target = BufWriter::new(Box::new(sink()));
    }

    /// Install an observer receiving clause addition and deletion events.
    pub fn set_observer(&mut self, observer: Box<dyn DrupSink>) {
        self.observer = Some(observer);
    }

    /// Whether any proof consumer is attached.
    pub fn is_active(&self) -> bool {
        self.format.is_some() || self.observer.is_some()
    }

    /// The first I/O failure, if any.
    pub fn take_io_error(&mut self) -> Option<std::io::Error> {
        self.io_error.take()
    }

    fn emit(&mut self, add: bool, lits: &[Lit]) -> std::io::Result<()> {
        match self.format {
            None => (),
            Some(ProofFormat::Drup) => {
                if !add {
                    self.target.write_all(b"d ")?;
                }
                for &lit in lits {
                    itoa::write(&mut self.target, lit.to_dimacs())?;
                    self.target.write_all(b" ")?;
                }
                self.target.write_all(b"0\n")?;
            }
            Some(ProofFormat::BinaryDrup) => {
                self.target.write_all(if add { b"a" } else { b"d" })?;
                for &lit in lits {
                    let code = lit.code() as u64 + 2;
                    leb128::write::unsigned(&mut self.target, code)?;
                }
                self.target.write_all(&[0])?;
            }
        }

        if let Some(observer) = &mut self.observer {
            if add {
                observer.add_clause(lits)?;
            } else {
                observer.delete_clause(lits)?;
            }
        }

        Ok(())
    }

    /// Flush buffered proof steps.
    pub fn flush(&mut self) {
        let result = self.target.flush();
        self.handle_io_errors(result);
    }

    fn handle_io_errors(&mut self, result: std::io::Result<()>) -> bool {
        match result {
            Ok(()) => false,
            Err(err) => {
                if self.io_error.is_none() {
                    self.io_error = Some(err);
                }
                true
            }
        }
    }
}

/// Emit the addition of a derived clause.
///
/// Ignored when no proof consumer is attached.
pub fn add_clause(mut ctx: partial!(Context, mut ProofP, mut SolverStateP), lits: &[Lit]) {
    let proof = ctx.part_mut(ProofP);
    if !proof.is_active() {
        return;
    }
    let result = proof.emit(true, lits);
    if proof.handle_io_errors(result) {
        proof.flush();
        ctx.part_mut(SolverStateP).proof_failed = true;
    }
}

/// Emit the deletion of a clause.
///
/// Ignored when no proof consumer is attached.
pub fn delete_clause(mut ctx: partial!(Context, mut ProofP, mut SolverStateP), lits: &[Lit]) {
    let proof = ctx.part_mut(ProofP);
    if !proof.is_active() {
        return;
    }
    let result = proof.emit(false, lits);
    if proof.handle_io_errors(result) {
        proof.flush();
        ctx.part_mut(SolverStateP).proof_failed = true;
    }
}

/// Emit a clause replacement, the addition first.
pub fn migrate_clause(
    mut ctx: partial!(Context, mut ProofP, mut SolverStateP),
    new_lits: &[Lit],
    old_lits: &[Lit],
) {
    add_clause(ctx.borrow(), new_lits);
    delete_clause(ctx.borrow(), old_lits);
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Recorder {
        events: Arc<Mutex<Vec<(bool, Vec<Lit>)>>>,
    }

    impl DrupSink for Recorder {
        fn add_clause(&mut self, lits: &[Lit]) -> std::io::Result<()> {
            self.events.lock().unwrap().push((true, lits.to_vec()));
            Ok(())
        }

        fn delete_clause(&mut self, lits: &[Lit]) -> std::io::Result<()> {
            self.events.lock().unwrap().push((false, lits.to_vec()));
            Ok(())
        }
    }

    #[test]
    fn observer_sees_events_in_order() {
        use partial_ref::IntoPartialRefMut;
        use xorsat_formula::lits;

        let events = Arc::new(Mutex::new(vec![]));
        let recorder = Recorder {
            events: events.clone(),
        };

        let mut ctx = Context::default();
        let mut ctx = ctx.into_partial_ref_mut();

        ctx.part_mut(ProofP).set_observer(Box::new(recorder));

        migrate_clause(ctx.borrow(), &lits![1, 2], &lits![1, 2, 3]);

        let events = events.lock().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], (true, lits![1, 2].to_vec()));
        assert_eq!(events[1], (false, lits![1, 2, 3].to_vec()));
    }
}
