//! End to end solver scenarios.
use std::sync::{Arc, Mutex};

use xorsat::{DrupSink, Lit, SolveResult, Solver, Var};

use xorsat_formula::{lits, vars};

fn lit(number: isize) -> Lit {
    Lit::from_dimacs(number)
}

fn model_contains(solver: &Solver, number: isize) -> bool {
    solver.model().unwrap().contains(&lit(number))
}

#[test]
fn two_unit_contradiction_with_drup_trace() {
    #[derive(Default)]
    struct Recorder {
        adds: Arc<Mutex<Vec<Vec<Lit>>>>,
        deletes: Arc<Mutex<Vec<Vec<Lit>>>>,
    }

    impl DrupSink for Recorder {
        fn add_clause(&mut self, lits: &[Lit]) -> std::io::Result<()> {
            self.adds.lock().unwrap().push(lits.to_vec());
            Ok(())
        }

        fn delete_clause(&mut self, lits: &[Lit]) -> std::io::Result<()> {
            self.deletes.lock().unwrap().push(lits.to_vec());
            Ok(())
        }
    }

    let adds = Arc::new(Mutex::new(vec![]));
    let deletes = Arc::new(Mutex::new(vec![]));

    let mut solver = Solver::new();
    solver.set_drup(Box::new(Recorder {
        adds: adds.clone(),
        deletes: deletes.clone(),
    }));

    solver.add_dimacs_cnf(&b"p cnf 1 2\n1 0\n-1 0\n"[..]).unwrap();

    assert_eq!(solver.solve(), SolveResult::Unsat);

    assert!(adds.lock().unwrap().iter().any(|clause| clause.is_empty()));
    assert!(!deletes.lock().unwrap().is_empty());
}

#[test]
fn chain_propagation() {
    let mut solver = Solver::new();
    solver
        .add_dimacs_cnf(&b"p cnf 4 4\n-1 2 0\n-2 3 0\n-3 4 0\n1 0\n"[..])
        .unwrap();

    assert_eq!(solver.solve(), SolveResult::Sat);

    for number in 1..=4 {
        assert!(model_contains(&solver, number));
    }
}

#[test]
fn equivalence_collapse() {
    let mut solver = Solver::new();
    solver.add_clause(&lits![1, -2]);
    solver.add_clause(&lits![-1, 2]);
    solver.add_clause(&lits![2, 3]);
    solver.add_clause(&lits![-3]);

    assert_eq!(solver.solve(), SolveResult::Sat);

    assert!(model_contains(&solver, 1));
    assert!(model_contains(&solver, 2));
    assert!(model_contains(&solver, -3));
}

#[test]
fn xor_parity() {
    let mut solver = Solver::new();
    solver
        .add_dimacs_cnf(&b"p cnf 3 3\nx 1 2 3 0\n1 0\n2 0\n"[..])
        .unwrap();

    assert_eq!(solver.solve(), SolveResult::Sat);
    assert!(model_contains(&solver, -3));
}

#[test]
fn vivification_scenario() {
    let mut solver = Solver::new();
    solver.add_clause(&lits![1, 2, 3]);
    solver.add_clause(&lits![-1, 2]);
    solver.add_clause(&lits![-1, 3]);

    assert_eq!(solver.solve(), SolveResult::Sat);

    let model = solver.model().unwrap();
    assert!(lits![1, 2, 3].iter().any(|l| model.contains(l)));
    assert!(model.contains(&lit(1)) <= model.contains(&lit(2)));
    assert!(model.contains(&lit(1)) <= model.contains(&lit(3)));
}

#[test]
fn probe_derived_units_make_unsat() {
    let mut solver = Solver::new();
    solver.add_clause(&lits![1, 2]);
    solver.add_clause(&lits![1, -2]);
    solver.add_clause(&lits![-1, 3]);
    solver.add_clause(&lits![-1, -3]);

    assert_eq!(solver.solve(), SolveResult::Unsat);
}

#[test]
fn single_variable_tautology_is_dropped() {
    let mut solver = Solver::new();
    solver.add_clause(&lits![1, -1]);

    assert_eq!(solver.solve(), SolveResult::Sat);
}

#[test]
fn duplicate_literals_are_deduplicated() {
    let mut solver = Solver::new();
    solver.add_clause(&lits![2, 2, 2]);

    assert_eq!(solver.solve(), SolveResult::Sat);
    assert!(model_contains(&solver, 2));
}

#[test]
fn adding_a_clause_twice_changes_nothing() {
    let mut solver_once = Solver::new();
    solver_once.add_clause(&lits![1, 2, 3, 4]);
    solver_once.add_clause(&lits![-1, -2]);

    let mut solver_twice = Solver::new();
    solver_twice.add_clause(&lits![1, 2, 3, 4]);
    solver_twice.add_clause(&lits![1, 2, 3, 4]);
    solver_twice.add_clause(&lits![-1, -2]);

    assert_eq!(solver_once.solve(), solver_twice.solve());
}

#[test]
fn xor_matches_its_cnf_encoding() {
    // x1 + x2 + x3 = 1 natively...
    let mut with_xor = Solver::new();
    with_xor.add_xor_clause(&vars![1, 2, 3], true);
    with_xor.add_clause(&lits![-1]);
    with_xor.add_clause(&lits![2]);

    // ...and as its four CNF clauses.
    let mut with_cnf = Solver::new();
    with_cnf.add_clause(&lits![1, 2, 3]);
    with_cnf.add_clause(&lits![1, -2, -3]);
    with_cnf.add_clause(&lits![-1, 2, -3]);
    with_cnf.add_clause(&lits![-1, -2, 3]);
    with_cnf.add_clause(&lits![-1]);
    with_cnf.add_clause(&lits![2]);

    assert_eq!(with_xor.solve(), SolveResult::Sat);
    assert_eq!(with_cnf.solve(), SolveResult::Sat);

    // 0 + 1 + x3 = 1 forces x3 = 0.
    assert!(model_contains(&with_xor, -3));
    assert!(model_contains(&with_cnf, -3));
}

#[test]
fn unsat_xor_system() {
    let mut solver = Solver::new();
    solver.add_xor_clause(&vars![1, 2], true);
    solver.add_xor_clause(&vars![2, 3], true);
    solver.add_xor_clause(&vars![1, 3], true);

    assert_eq!(solver.solve(), SolveResult::Unsat);
}

#[test]
fn interrupt_returns_unknown() {
    let mut solver = Solver::new();
    solver.add_clause(&lits![1, 2]);

    solver.interrupt_asap();
    assert_eq!(solver.solve(), SolveResult::Unknown);

    // The next call starts with a cleared flag.
    assert_eq!(solver.solve(), SolveResult::Sat);
}

#[test]
fn learnt_clause_dump_is_sorted() {
    let mut solver = Solver::new();
    for a in [-1isize, 1].iter() {
        for b in [-2isize, 2].iter() {
            for c in [-3isize, 3].iter() {
                solver.add_clause(&[lit(*a), lit(*b), lit(*c), lit(4)]);
            }
        }
    }
    solver.add_clause(&lits![-4, 5]);
    solver.add_clause(&lits![-4, -5]);

    assert_eq!(solver.solve(), SolveResult::Unsat);

    let mut dump = vec![];
    solver.write_learnt_clauses(&mut dump).unwrap();
    // Every line is a zero terminated DIMACS clause.
    for line in std::str::from_utf8(&dump).unwrap().lines() {
        assert!(line.ends_with(" 0") || line == "0");
    }
}

#[test]
fn simplified_dump_roundtrips() {
    let mut solver = Solver::new();
    solver.add_clause(&lits![1, 2, 3, 4]);
    solver.add_clause(&lits![-1, 2]);
    solver.add_xor_clause(&vars![2, 3, 5], false);

    assert_eq!(solver.solve(), SolveResult::Sat);

    let mut dump = vec![];
    solver.write_simplified_cnf(&mut dump).unwrap();

    let parsed = xorsat::dimacs::DimacsParser::parse(&dump[..]).unwrap();

    let mut check = Solver::new();
    check.add_formula(&parsed);
    assert_eq!(check.solve(), SolveResult::Sat);
}

#[test]
fn drup_proof_file_ends_with_empty_clause() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("proof.drup");

    let mut solver = Solver::new();
    solver.write_proof(
        std::fs::File::create(&path).unwrap(),
        xorsat::ProofFormat::Drup,
    );

    solver.add_clause(&lits![1, 2]);
    solver.add_clause(&lits![1, -2]);
    solver.add_clause(&lits![-1, 2]);
    solver.add_clause(&lits![-1, -2]);

    assert_eq!(solver.solve(), SolveResult::Unsat);
    solver.close_proof();
    assert!(solver.take_proof_error().is_none());

    let proof = std::fs::read_to_string(&path).unwrap();
    assert!(proof.lines().any(|line| line.trim() == "0"));
}

#[test]
fn model_is_total_over_input_vars() {
    let mut solver = Solver::new();
    solver.new_vars(6);
    solver.add_clause(&lits![1, 2]);

    assert_eq!(solver.solve(), SolveResult::Sat);

    let model = solver.model().unwrap();
    assert_eq!(model.len(), 6);
    for index in 0..6 {
        let var = Var::from_index(index);
        assert!(model.contains(&var.positive()) ^ model.contains(&var.negative()));
    }
}

#[test]
fn solve_is_repeatable_after_sat() {
    let mut solver = Solver::new();
    solver.add_clause(&lits![1, 2]);

    assert_eq!(solver.solve(), SolveResult::Sat);
    assert_eq!(solver.solve(), SolveResult::Sat);

    solver.add_clause(&lits![-1]);
    solver.add_clause(&lits![-2]);
    assert_eq!(solver.solve(), SolveResult::Unsat);

    // A terminal unsat state is sticky.
    assert_eq!(solver.solve(), SolveResult::Unsat);
    assert_eq!(solver.model(), None);
}
