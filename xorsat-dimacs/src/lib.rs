//! DIMACS CNF parser and writer for the xorsat SAT solver.
//!
//! Beyond plain DIMACS CNF this understands the common XOR extension: a clause line starting with
//! `x` is read as a parity constraint over the listed literals, with the right hand side given by
//! the parity of the negative literal count. Comment lines of the form `c Solver::solve()` and
//! `c Solver::new_var()` are surfaced as [`Directive`] values for library-debugging drivers; all
//! other comments are skipped.

use std::{io, mem::replace};

use xorsat_formula::{CnfFormula, ExtendFormula, Lit, Var, XorClause};

use anyhow::Error;
use thiserror::Error;

/// Possible errors while parsing a DIMACS CNF formula.
#[derive(Debug, Error)]
pub enum ParserError {
    #[error(
        "line {}: Unexpected character in DIMACS CNF input: '{}'",
        line,
        unexpected
    )]
    UnexpectedInput { line: usize, unexpected: char },
    #[error(
        "line {}: Literal index is too large: {}{}...",
        line,
        index,
        final_digit
    )]
    LiteralTooLarge {
        line: usize,
        index: usize,
        final_digit: usize,
    },
    #[error("line {}: Invalid header syntax: {}", line, header)]
    InvalidHeader { line: usize, header: String },
    #[error("line {}: Unterminated clause", line)]
    UnterminatedClause { line: usize },
    #[error(
        "Formula has {} variables while the header specifies {} variables",
        var_count,
        header_var_count
    )]
    VarCount {
        var_count: usize,
        header_var_count: usize,
    },
    #[error("Parser invoked after a previous error")]
    PreviousError,
}

/// Variable and clause count of a DIMACS CNF header.
///
/// The counts are advisory: a formula with more clauses than announced is still accepted.
#[derive(Copy, Clone, Debug)]
pub struct DimacsHeader {
    pub var_count: usize,
    pub clause_count: usize,
}

/// A special comment recognized while parsing.
///
/// The position records how many clauses (including parity constraints) preceded the directive,
/// so a driver can replay the input and act at the right point.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum DirectiveKind {
    Solve,
    NewVar,
}

/// A [`DirectiveKind`] together with its position in the clause stream.
#[derive(Copy, Clone, Debug)]
pub struct Directive {
    pub kind: DirectiveKind,
    pub clause_offset: usize,
}

const SOLVE_DIRECTIVE: &[u8] = b"c Solver::solve()";
const NEW_VAR_DIRECTIVE: &[u8] = b"c Solver::new_var()";

/// Longest comment prefix we need to keep around for directive matching.
const COMMENT_KEEP: usize = 24;

/// Parser for DIMACS CNF files with XOR extensions.
///
/// The parser can consume its input in chunks while producing the parsed formula in chunks.
#[derive(Default)]
pub struct DimacsParser {
    formula: CnfFormula,
    partial_clause: Vec<Lit>,
    header: Option<DimacsHeader>,
    directives: Vec<Directive>,

    line_number: usize,
    clause_count: usize,
    partial_lit: usize,
    negate_next_lit: bool,
    clause_is_xor: bool,

    in_lit: bool,
    in_comment_or_header: bool,
    in_header: bool,
    start_of_line: bool,
    error: bool,

    comment_line: Vec<u8>,
    header_line: Vec<u8>,
}

impl DimacsParser {
    /// Create a new DIMACS CNF parser.
    pub fn new() -> DimacsParser {
        DimacsParser {
            line_number: 1,
            start_of_line: true,
            ..DimacsParser::default()
        }
    }

    /// Parse the given input and check the header if present.
    ///
    /// This parses the whole input into a single [`CnfFormula`]. Incremental parsing is possible
    /// using [`parse_incremental`](DimacsParser::parse_incremental) or the
    /// [`parse_chunk`](DimacsParser::parse_chunk) method.
    pub fn parse(input: impl io::Read) -> Result<CnfFormula, Error> {
        Ok(Self::parse_incremental(input, |_| Ok(()))?.take_formula())
    }

    /// Parse the given input incrementally and check the header if present.
    ///
    /// The callback is invoked after every chunk with a reference to the parser. It can process
    /// the formula incrementally by calling [`take_formula`](DimacsParser::take_formula) on the
    /// passed argument.
    pub fn parse_incremental(
        input: impl io::Read,
        mut callback: impl FnMut(&mut DimacsParser) -> Result<(), Error>,
    ) -> Result<DimacsParser, Error> {
        use io::BufRead;

        let mut buffer = io::BufReader::new(input);
        let mut parser = Self::new();

        loop {
            let data = buffer.fill_buf()?;
            if data.is_empty() {
                break;
            }
            parser.parse_chunk(data)?;
            let len = data.len();
            buffer.consume(len);

            callback(&mut parser)?;
        }
        parser.eof()?;
        callback(&mut parser)?;
        parser.check_header()?;

        Ok(parser)
    }

    /// Parse a chunk of input.
    ///
    /// After parsing the last chunk call the [`eof`](DimacsParser::eof) method.
    ///
    /// If this method returns an error, the parser is in an invalid state and cannot parse further
    /// chunks.
    pub fn parse_chunk(&mut self, chunk: &[u8]) -> Result<(), ParserError> {
        if self.error {
            return Err(ParserError::PreviousError);
        }
        for &byte in chunk.iter() {
            if byte == b'\n' {
                self.line_number += 1;
            }
            match byte {
                b'\n' | b'\r' if self.in_comment_or_header => {
                    if self.in_header {
                        self.in_header = false;
                        self.parse_header_line()?;
                    } else {
                        self.finish_comment_line();
                    }
                    self.in_comment_or_header = false;
                    self.start_of_line = true
                }
                _ if self.in_comment_or_header => {
                    if self.in_header {
                        self.header_line.push(byte);
                    } else if self.comment_line.len() < COMMENT_KEEP {
                        self.comment_line.push(byte);
                    }
                }
                b'0'..=b'9' => {
                    self.in_lit = true;
                    let digit = (byte - b'0') as usize;

                    const CAN_OVERFLOW: usize = Var::max_count() / 10;
                    const OVERFLOW_DIGIT: usize = Var::max_count() % 10;

                    // Overflow check that is fast but still works if LitIdx has the same size as
                    // usize
                    if CAN_OVERFLOW <= self.partial_lit {
                        let carry = (digit <= OVERFLOW_DIGIT) as usize;

                        if CAN_OVERFLOW + carry <= self.partial_lit {
                            self.error = true;
                            return Err(ParserError::LiteralTooLarge {
                                line: self.line_number,
                                index: self.partial_lit,
                                final_digit: digit,
                            });
                        }
                    }

                    self.partial_lit = self.partial_lit * 10 + digit;

                    self.start_of_line = false
                }
                b'-' if !self.negate_next_lit && !self.in_lit => {
                    self.negate_next_lit = true;
                    self.start_of_line = false
                }
                b' ' | b'\t' | b'\n' | b'\r' if !self.negate_next_lit || self.in_lit => {
                    self.finish_literal();
                    self.negate_next_lit = false;
                    self.in_lit = false;
                    self.partial_lit = 0;
                    self.start_of_line = byte == b'\n' || byte == b'\r';
                }
                b'x' if self.start_of_line && self.partial_clause.is_empty() => {
                    self.clause_is_xor = true;
                    self.start_of_line = false;
                }
                b'c' if self.start_of_line => {
                    self.in_comment_or_header = true;
                    self.comment_line.clear();
                    self.comment_line.push(b'c');
                }
                b'p' if self.start_of_line && self.header.is_none() => {
                    self.in_comment_or_header = true;
                    self.in_header = true;
                    self.header_line.push(b'p');
                }
                _ => {
                    self.error = true;
                    return Err(ParserError::UnexpectedInput {
                        line: self.line_number,
                        unexpected: byte as char,
                    });
                }
            }
        }

        Ok(())
    }

    /// Finish parsing the input.
    ///
    /// This does not check whether the header information was correct, call
    /// [`check_header`](DimacsParser::check_header) for this.
    pub fn eof(&mut self) -> Result<(), ParserError> {
        if self.in_header {
            self.parse_header_line()?;
        } else if self.in_comment_or_header {
            self.finish_comment_line();
        }

        self.finish_literal();

        if !self.partial_clause.is_empty() || self.clause_is_xor {
            return Err(ParserError::UnterminatedClause {
                line: self.line_number,
            });
        }

        Ok(())
    }

    /// Verify the header information when present.
    ///
    /// The clause count is advisory and not checked, the variable count is an upper bound the
    /// formula must respect.
    pub fn check_header(&self) -> Result<(), ParserError> {
        if let Some(header) = self.header {
            if self.formula.var_count() > header.var_count {
                return Err(ParserError::VarCount {
                    var_count: self.formula.var_count(),
                    header_var_count: header.var_count,
                });
            }
        }
        Ok(())
    }

    /// Take the formula parsed so far.
    ///
    /// Resets the parser's formula buffer, keeping the parse state, so parsing can continue.
    pub fn take_formula(&mut self) -> CnfFormula {
        let mut formula = replace(&mut self.formula, CnfFormula::new());
        if let Some(header) = self.header {
            formula.set_var_count(header.var_count);
        }
        formula
    }

    /// Take the directives recognized so far.
    pub fn take_directives(&mut self) -> Vec<Directive> {
        replace(&mut self.directives, vec![])
    }

    /// The header of the parsed input, if present.
    pub fn header(&self) -> Option<DimacsHeader> {
        self.header
    }

    /// Number of clauses parsed so far, parity constraints included.
    pub fn clause_count(&self) -> usize {
        self.clause_count
    }

    /// Number of variables seen so far, including the header's announcement.
    pub fn var_count(&self) -> usize {
        let header_count = self.header.map(|header| header.var_count).unwrap_or(0);
        self.formula.var_count().max(header_count)
    }

    fn finish_literal(&mut self) {
        if self.in_lit {
            if self.partial_lit == 0 {
                self.finish_clause();
            } else {
                let mut number = self.partial_lit as isize;
                if self.negate_next_lit {
                    number = -number;
                }
                self.partial_clause.push(Lit::from_dimacs(number));
            }
        }
    }

    fn finish_clause(&mut self) {
        if self.clause_is_xor {
            let xor = XorClause::from_lits(&self.partial_clause);
            self.formula.add_xor_clause(&xor);
        } else {
            self.formula.add_clause(&self.partial_clause);
        }
        self.partial_clause.clear();
        self.clause_is_xor = false;
        self.clause_count += 1;
    }

    fn finish_comment_line(&mut self) {
        let kind = if self.comment_line == SOLVE_DIRECTIVE {
            Some(DirectiveKind::Solve)
        } else if self.comment_line == NEW_VAR_DIRECTIVE {
            Some(DirectiveKind::NewVar)
        } else {
            None
        };
        if let Some(kind) = kind {
            self.directives.push(Directive {
                kind,
                clause_offset: self.clause_count,
            });
        }
        self.comment_line.clear();
    }

    fn parse_header_line(&mut self) -> Result<(), ParserError> {
        let header = replace(&mut self.header_line, vec![]);
        let mut fields = header.split(|&byte| byte == b' ' || byte == b'\t');

        let malformed = || ParserError::InvalidHeader {
            line: self.line_number,
            header: String::from_utf8_lossy(&header).into_owned(),
        };

        let mut next_field = || fields.find(|field| !field.is_empty());

        if next_field() != Some(b"p") || next_field() != Some(b"cnf") {
            return Err(malformed());
        }

        let parse_count = |field: Option<&[u8]>| -> Option<usize> {
            let field = field?;
            let text = std::str::from_utf8(field).ok()?;
            text.parse().ok()
        };

        let var_count = parse_count(next_field()).ok_or_else(malformed)?;
        let clause_count = parse_count(next_field()).ok_or_else(malformed)?;

        if next_field().is_some() {
            return Err(malformed());
        }

        self.header = Some(DimacsHeader {
            var_count,
            clause_count,
        });

        Ok(())
    }
}

/// Write a formula in DIMACS CNF format, parity constraints as `x` lines.
pub fn write_dimacs(target: &mut impl io::Write, formula: &CnfFormula) -> io::Result<()> {
    target.write_all(b"p cnf ")?;
    itoa::write(&mut *target, formula.var_count())?;
    target.write_all(b" ")?;
    itoa::write(&mut *target, formula.len() + formula.xor_clauses().len())?;
    target.write_all(b"\n")?;

    for clause in formula.iter() {
        write_clause(target, clause)?;
    }

    for xor in formula.xor_clauses() {
        write_xor_clause(target, xor)?;
    }

    Ok(())
}

/// Write a single clause in DIMACS CNF format.
pub fn write_clause(target: &mut impl io::Write, clause: &[Lit]) -> io::Result<()> {
    for &lit in clause {
        itoa::write(&mut *target, lit.to_dimacs())?;
        target.write_all(b" ")?;
    }
    target.write_all(b"0\n")
}

/// Write a parity constraint as an `x` clause line.
///
/// The right hand side is encoded in the sign of the first literal, matching the convention used
/// by the parser.
pub fn write_xor_clause(target: &mut impl io::Write, xor: &XorClause) -> io::Result<()> {
    target.write_all(b"x")?;
    for (index, &var) in xor.vars.iter().enumerate() {
        target.write_all(b" ")?;
        let mut number = var.to_dimacs();
        if index == 0 && xor.rhs {
            number = -number;
        }
        itoa::write(&mut *target, number)?;
    }
    target.write_all(b" 0\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;

    use xorsat_formula::{cnf_formula, lits, test::sat_xor_formula, vars};

    #[test]
    fn simple_parse() {
        let input = b"c comment\np cnf 4 3\n1 2 3 0\n-1 -2 0\n4 0\n";

        let formula = DimacsParser::parse(&input[..]).unwrap();

        let expected = cnf_formula![
            1, 2, 3;
            -1, -2;
            4;
        ];

        assert_eq!(formula, expected);
    }

    #[test]
    fn parse_xor_lines() {
        let input = b"p cnf 3 2\nx 1 2 3 0\nx -1 2 0\n";

        let formula = DimacsParser::parse(&input[..]).unwrap();

        assert_eq!(formula.xor_clauses().len(), 2);

        let xor = &formula.xor_clauses()[0];
        assert_eq!(&xor.vars[..], &vars![1, 2, 3][..]);
        assert_eq!(xor.rhs, false);

        let xor = &formula.xor_clauses()[1];
        assert_eq!(&xor.vars[..], &vars![1, 2][..]);
        assert_eq!(xor.rhs, true);
    }

    #[test]
    fn extra_clauses_past_header_count() {
        let input = b"p cnf 2 1\n1 0\n2 0\n-1 -2 0\n";

        let formula = DimacsParser::parse(&input[..]).unwrap();
        assert_eq!(formula.len(), 3);
    }

    #[test]
    fn directives_are_positioned() {
        let input = b"p cnf 2 2\n1 0\nc Solver::solve()\n2 0\nc Solver::new_var()\n";

        let mut parser = DimacsParser::parse_incremental(&input[..], |_| Ok(())).unwrap();
        let directives = parser.take_directives();

        assert_eq!(directives.len(), 2);
        assert_eq!(directives[0].kind, DirectiveKind::Solve);
        assert_eq!(directives[0].clause_offset, 1);
        assert_eq!(directives[1].kind, DirectiveKind::NewVar);
        assert_eq!(directives[1].clause_offset, 2);
    }

    #[test]
    fn rejects_unterminated_clause() {
        let input = b"p cnf 2 1\n1 2\n";
        assert!(DimacsParser::parse(&input[..]).is_err());
    }

    #[test]
    fn rejects_bad_header() {
        let input = b"p dnf 2 1\n1 0\n";
        assert!(DimacsParser::parse(&input[..]).is_err());
    }

    #[test]
    fn rejects_excess_vars() {
        let input = b"p cnf 2 1\n1 2 3 0\n";
        let result = DimacsParser::parse(&input[..]);
        match result {
            Err(_) => (),
            Ok(_) => panic!("expected var count error"),
        }
    }

    proptest! {
        #[test]
        fn roundtrip(formula in sat_xor_formula(1..20usize, 0..40usize, 0..4usize, 1..5usize)) {
            let mut written = vec![];
            write_dimacs(&mut written, &formula).unwrap();

            let parsed = DimacsParser::parse(&written[..]).unwrap();

            prop_assert_eq!(parsed, formula);
        }
    }
}
