//! Random formula generators for tests.
use proptest::{prelude::*, *};

use rand::distributions::Bernoulli;
use rand::seq::SliceRandom;
use rand::Rng;

use crate::cnf::{CnfFormula, ExtendFormula, XorClause};
use crate::lit::{Lit, Var};

/// Generate small hard unsat instances.
///
/// Implementation of http://www.cs.qub.ac.uk/~i.spence/sgen/ but with random partitions
pub fn sgen_unsat_formula(
    blocks: impl Strategy<Value = usize>,
) -> impl Strategy<Value = CnfFormula> {
    blocks.prop_flat_map(|blocks| {
        collection::vec(bool::ANY, blocks * 4 + 1).prop_perturb(|negate, mut rng| {
            let mut clauses: Vec<Vec<Lit>> = vec![];
            let mut lits = negate
                .into_iter()
                .enumerate()
                .map(|(index, negate)| Lit::from_var(Var::from_index(index), negate))
                .collect::<Vec<_>>();

            for &invert in [false, true].iter() {
                lits.shuffle(&mut rng);
                for block in lits.chunks_exact(4) {
                    for a in 0..4 {
                        for b in 0..a {
                            for c in 0..b {
                                let mut clause =
                                    vec![block[a] ^ invert, block[b] ^ invert, block[c] ^ invert];
                                clause.shuffle(&mut rng);
                                clauses.push(clause);
                            }
                        }
                    }
                }
                let &lit_a = lits.last().unwrap();
                for b in 0..4 {
                    for c in 0..b {
                        let mut clause = vec![lit_a ^ invert, lits[b] ^ invert, lits[c] ^ invert];
                        clause.shuffle(&mut rng);
                        clauses.push(clause);
                    }
                }
            }

            clauses.shuffle(&mut rng);
            CnfFormula::from(clauses)
        })
    })
}

/// Generate a sat instance.
///
/// This generates a random full assignment and then only generates clauses compatible with that
/// assignment.
pub fn sat_formula(
    vars: impl Strategy<Value = usize>,
    clause_count: impl Strategy<Value = usize>,
    density: impl Strategy<Value = f64>,
    polarity_dist: impl Strategy<Value = f64>,
) -> impl Strategy<Value = CnfFormula> {
    (vars, clause_count, density, polarity_dist).prop_flat_map(
        |(vars, clause_count, density, polarity_dist)| {
            let density = Bernoulli::new(density).unwrap();
            let polarity_dist = Bernoulli::new(polarity_dist).unwrap();

            collection::vec(bool::ANY, vars).prop_perturb(move |negate, mut rng| {
                let mut clauses: Vec<Vec<Lit>> = vec![];
                let lits = negate
                    .into_iter()
                    .enumerate()
                    .map(|(index, negate)| Lit::from_var(Var::from_index(index), negate))
                    .collect::<Vec<_>>();

                for _ in 0..clause_count {
                    let &fixed_lit = lits.choose(&mut rng).unwrap();
                    let mut clause = vec![fixed_lit];
                    for &lit in lits.iter() {
                        if lit != fixed_lit && rng.sample(density) {
                            clause.push(lit ^ rng.sample(polarity_dist));
                        }
                    }
                    clause.shuffle(&mut rng);
                    clauses.push(clause);
                }

                clauses.shuffle(&mut rng);
                CnfFormula::from(clauses)
            })
        },
    )
}

/// Generate a sat instance that mixes clauses and parity constraints.
///
/// Like [`sat_formula`] this fixes a random full assignment up front and only emits constraints
/// that assignment satisfies, so the result is satisfiable by construction.
pub fn sat_xor_formula(
    vars: impl Strategy<Value = usize>,
    clause_count: impl Strategy<Value = usize>,
    xor_count: impl Strategy<Value = usize>,
    xor_len: impl Strategy<Value = usize>,
) -> impl Strategy<Value = CnfFormula> {
    (vars, clause_count, xor_count, xor_len).prop_flat_map(
        |(vars, clause_count, xor_count, xor_len)| {
            let vars = vars.max(xor_len).max(1);
            let xor_len = xor_len.max(1);

            collection::vec(bool::ANY, vars).prop_perturb(move |values, mut rng| {
                let mut formula = CnfFormula::new();
                formula.set_var_count(vars);

                let density = Bernoulli::new(0.3).unwrap();
                let satisfied: Vec<Lit> = values
                    .iter()
                    .enumerate()
                    .map(|(index, &value)| Lit::from_index(index, value))
                    .collect();

                for _ in 0..clause_count {
                    let &fixed_lit = satisfied.choose(&mut rng).unwrap();
                    let mut clause = vec![fixed_lit];
                    for &lit in satisfied.iter() {
                        if lit != fixed_lit && rng.sample(density) {
                            clause.push(lit ^ rng.gen::<bool>());
                        }
                    }
                    clause.shuffle(&mut rng);
                    formula.add_clause(&clause);
                }

                let mut pool: Vec<Var> = (0..vars).map(Var::from_index).collect();

                for _ in 0..xor_count {
                    pool.shuffle(&mut rng);
                    let picked = &pool[..xor_len.min(pool.len())];
                    let mut rhs = false;
                    for &var in picked {
                        rhs ^= values[var.index()];
                    }
                    formula.add_xor_clause(&XorClause {
                        vars: picked.to_vec(),
                        rhs,
                    });
                }

                formula
            })
        },
    )
}
