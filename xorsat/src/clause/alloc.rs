//! Clause allocator.
use std::mem::transmute;
use std::slice;

use xorsat_formula::{Lit, LitIdx};

use super::{header::HEADER_LEN, Clause, ClauseHeader};

/// Integer type used to store offsets into [`ClauseAlloc`]'s memory.
type ClauseOffset = u32;

/// Bump allocator for clause storage.
///
/// Clauses are allocated from a single continuous buffer. Clauses cannot be freed individually.
/// To reclaim the space of deleted clauses, a new `ClauseAlloc` is created and the surviving
/// clauses are copied over (see [`gc`](super::gc)).
///
/// When the buffer is full it is reallocated with the growing strategy of [`Vec`]. External
/// references ([`ClauseRef`]) store an offset into the buffer and stay valid when the buffer
/// grows. Only a compaction pass invalidates them, and it rewrites every held reference.
///
/// **Safety**: Using the safe methods is always memory safe, even if invariants of the clause
/// storage are violated, e.g. by using a `ClauseRef` of a different `ClauseAlloc`. Code in this
/// crate may rely on such invariants for correctness, but never for memory safety.
#[derive(Default)]
pub struct ClauseAlloc {
    buffer: Vec<LitIdx>,
}

impl ClauseAlloc {
    /// Create an empty clause allocator.
    pub fn new() -> ClauseAlloc {
        ClauseAlloc::default()
    }

    /// Create a clause allocator with preallocated capacity.
    pub fn with_capacity(capacity: usize) -> ClauseAlloc {
        ClauseAlloc {
            buffer: Vec::with_capacity(capacity),
        }
    }

    /// Allocate space for and add a new clause.
    ///
    /// Only clauses of length 4 and up are pooled; unit, binary and ternary clauses are stored
    /// inline elsewhere. This is enforced here so the watched positions of a pooled clause always
    /// exist.
    ///
    /// The length of the header is set to the length of the given slice. The returned
    /// [`ClauseRef`] can be used to access the new clause.
    pub fn add_clause(&mut self, mut header: ClauseHeader, lits: &[Lit]) -> ClauseRef {
        let offset = self.buffer.len();

        assert!(
            lits.len() >= 4,
            "ClauseAlloc only stores clauses of length 4 and up"
        );

        assert!(
            offset <= (ClauseOffset::max_value() as usize),
            "Exceeded ClauseAlloc's maximal buffer size"
        );

        header.set_len(lits.len());

        self.buffer.extend_from_slice(&header.data);

        let lit_idx_slice = unsafe {
            // This is safe as Lit and LitIdx have the same representation
            slice::from_raw_parts(lits.as_ptr() as *const LitIdx, lits.len())
        };

        self.buffer.extend_from_slice(lit_idx_slice);

        ClauseRef {
            offset: offset as ClauseOffset,
        }
    }

    /// Access the header of a clause.
    pub fn header(&self, cref: ClauseRef) -> &ClauseHeader {
        let offset = cref.offset as usize;
        assert!(
            offset + HEADER_LEN <= self.buffer.len(),
            "ClauseRef out of bounds"
        );
        unsafe {
            let header_pointer = self.buffer.as_ptr().add(offset) as *const ClauseHeader;
            &*header_pointer
        }
    }

    /// Mutate the header of a clause.
    pub fn header_mut(&mut self, cref: ClauseRef) -> &mut ClauseHeader {
        let offset = cref.offset as usize;
        assert!(
            offset + HEADER_LEN <= self.buffer.len(),
            "ClauseRef out of bounds"
        );
        unsafe {
            let header_pointer = self.buffer.as_mut_ptr().add(offset) as *mut ClauseHeader;
            &mut *header_pointer
        }
    }

    /// Access a clause.
    pub fn clause(&self, cref: ClauseRef) -> &Clause {
        let len = self.header(cref).len();

        let offset = cref.offset as usize;
        let end = offset + HEADER_LEN + len;
        assert!(end <= self.buffer.len(), "ClauseRef out of bounds");
        unsafe {
            transmute::<&[LitIdx], &Clause>(slice::from_raw_parts(
                self.buffer.as_ptr().add(offset),
                len + HEADER_LEN,
            ))
        }
    }

    /// Mutate a clause.
    pub fn clause_mut(&mut self, cref: ClauseRef) -> &mut Clause {
        let len = self.header(cref).len();

        let offset = cref.offset as usize;
        let end = offset + HEADER_LEN + len;
        assert!(end <= self.buffer.len(), "ClauseRef out of bounds");
        unsafe {
            transmute::<&mut [LitIdx], &mut Clause>(slice::from_raw_parts_mut(
                self.buffer.as_mut_ptr().add(offset),
                len + HEADER_LEN,
            ))
        }
    }

    /// Current buffer size in multiples of [`LitIdx`].
    pub fn buffer_size(&self) -> usize {
        self.buffer.len()
    }
}

/// Compact reference to a pooled clause.
///
/// Only valid for the [`ClauseAlloc`] that produced it, and only until the next compaction pass,
/// which rewrites all held references.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug)]
pub struct ClauseRef {
    offset: ClauseOffset,
}

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::*;

    use xorsat_formula::cnf::strategy::*;

    proptest! {
        #[test]
        fn roundtrip_from_cnf_formula(input in cnf_formula(1..100usize, 0..500, 4..30)) {

            let mut clause_alloc = ClauseAlloc::new();
            let mut clause_refs = vec![];

            for clause_lits in input.iter() {
                let header = ClauseHeader::new();
                clause_refs.push(clause_alloc.add_clause(header, clause_lits));
            }

            for (cref, lits) in clause_refs.iter().zip(input.iter()) {
                let clause = clause_alloc.clause(*cref);
                prop_assert_eq!(clause.header().len(), clause.lits().len());
                prop_assert_eq!(clause.lits(), lits);
            }
        }

        #[test]
        fn clause_mutation(input in cnf_formula(1..100usize, 0..500, 4..30)) {

            let mut clause_alloc = ClauseAlloc::new();
            let mut clause_refs = vec![];

            for clause_lits in input.iter() {
                let header = ClauseHeader::new();
                clause_refs.push(clause_alloc.add_clause(header, clause_lits));
            }

            for &cref in clause_refs.iter() {
                let clause = clause_alloc.clause_mut(cref);
                clause.lits_mut().reverse();
            }

            for &cref in clause_refs.iter() {
                let clause_len = clause_alloc.clause(cref).lits().len();
                if clause_len > 4 {
                    clause_alloc.header_mut(cref).set_len(clause_len - 1);
                }
            }

            for (&cref, lits) in clause_refs.iter().zip(input.iter()) {
                let expected = if lits.len() > 4 {
                    lits[1..].iter().rev()
                } else {
                    lits.iter().rev()
                };
                prop_assert!(clause_alloc.clause(cref).lits().iter().eq(expected));
            }
        }
    }
}
