use std::env;
use std::fs;
use std::io::{self, Read, Write};

use anyhow::Error;
use clap::{values_t, App, AppSettings, Arg};
use env_logger::{fmt, Builder, Target};
use log::{error, info};
use log::{Level, LevelFilter, Record};

use xorsat::config::SolverConfigUpdate;
use xorsat::dimacs::{DimacsParser, Directive, DirectiveKind};
use xorsat::{ProofFormat, SolveResult, Solver};

/// Exit codes following the SAT competition convention.
const EXIT_SAT: i32 = 10;
const EXIT_UNSAT: i32 = 20;
const EXIT_UNKNOWN: i32 = 15;

fn main() {
    let exit_code = match main_with_err() {
        Err(err) => {
            error!("{}", err);
            1
        }
        Ok(exit_code) => exit_code,
    };
    std::process::exit(exit_code);
}

fn init_logging() {
    let format = |buf: &mut fmt::Formatter, record: &Record| {
        if record.level() == Level::Info {
            writeln!(buf, "c {}", record.args())
        } else {
            writeln!(buf, "c {}: {}", record.level(), record.args())
        }
    };

    let mut builder = Builder::new();
    builder
        .target(Target::Stdout)
        .format(format)
        .filter(None, LevelFilter::Info);

    if let Ok(ref env_var) = env::var("XORSAT_LOG") {
        builder.parse_filters(env_var);
    }

    builder.init();
}

fn banner() {
    info!("This is xorsat {}", env!("CARGO_PKG_VERSION"));
}

fn main_with_err() -> Result<i32, Error> {
    let matches = App::new("xorsat")
        .version(env!("CARGO_PKG_VERSION"))
        .setting(AppSettings::DisableHelpSubcommand)
        .arg_from_usage("[INPUT] 'The input file to use (stdin if omitted)'")
        .arg_from_usage("[config-file] --config=[FILE] 'Read parameters from configuration file'")
        .arg(
            Arg::from_usage("[config-option] -C --config-option")
                .value_name("OPTION>=<VALUE")
                .help("Specify a single config option as TOML.")
                .multiple(true)
                .number_of_values(1),
        )
        .arg_from_usage("[proof-file] --proof=[FILE] 'Write a DRUP proof to the specified file'")
        .arg(
            Arg::from_usage(
                "[proof-format] --proof-format=[FORMAT] 'Specify the proof format to use.'",
            )
            .possible_values(&["drup", "binary-drup"])
            .default_value("drup")
            .case_insensitive(true),
        )
        .arg_from_usage(
            "[learnt-file] --dump-learnts=[FILE] 'Write the learnt clauses to the specified file'",
        )
        .arg_from_usage(
            "[simplified-file] --dump-simplified=[FILE] \
             'Write the simplified formula to the specified file'",
        )
        .arg_from_usage(
            "--debug-lib 'Act on c Solver::solve() comments and checkpoint partial outputs'",
        )
        .arg_from_usage("--no-model 'Do not print the satisfying assignment'")
        .get_matches();

    init_logging();
    banner();

    let mut config_update = SolverConfigUpdate::new();

    if let Some(config_path) = matches.value_of("config-file") {
        let mut config_contents = String::new();
        fs::File::open(config_path)?.read_to_string(&mut config_contents)?;

        config_update.merge(toml::from_str(&config_contents)?);
    }

    for config_option in values_t!(matches, "config-option", String).unwrap_or(vec![]) {
        config_update.merge(toml::from_str(&config_option)?);
    }

    let mut solver = Solver::new();
    solver.config(&config_update);

    if let Some(path) = matches.value_of("proof-file") {
        let format = match matches
            .value_of("proof-format")
            .unwrap_or("drup")
            .to_lowercase()
            .as_str()
        {
            "binary-drup" => ProofFormat::BinaryDrup,
            _ => ProofFormat::Drup,
        };
        let file = fs::File::create(path)?;
        solver.write_proof(io::BufWriter::new(file), format);
        info!("Writing {:?} proof to {}", format, path);
    }

    let stdin = io::stdin();

    let result = if let Some(path) = matches.value_of("INPUT") {
        info!("Reading file '{}'", path);
        let file = fs::File::open(path)?;
        load_and_solve(&mut solver, file, matches.is_present("debug-lib"))?
    } else {
        info!("Reading from stdin");
        load_and_solve(&mut solver, stdin.lock(), matches.is_present("debug-lib"))?
    };

    solver.close_proof();

    if let Some(err) = solver.take_proof_error() {
        return Err(err.into());
    }

    if let Some(path) = matches.value_of("learnt-file") {
        let mut file = io::BufWriter::new(fs::File::create(path)?);
        solver.write_learnt_clauses(&mut file)?;
    }

    if let Some(path) = matches.value_of("simplified-file") {
        let mut file = io::BufWriter::new(fs::File::create(path)?);
        solver.write_simplified_cnf(&mut file)?;
    }

    let stdout = io::stdout();
    let mut stdout_lock = stdout.lock();

    let exit_code = match result {
        SolveResult::Sat => {
            writeln!(stdout_lock, "s SATISFIABLE")?;
            if !matches.is_present("no-model") {
                write_model(&mut stdout_lock, &solver)?;
            }
            EXIT_SAT
        }
        SolveResult::Unsat => {
            writeln!(stdout_lock, "s UNSATISFIABLE")?;
            EXIT_UNSAT
        }
        SolveResult::Unknown => {
            writeln!(stdout_lock, "s UNKNOWN")?;
            EXIT_UNKNOWN
        }
    };

    Ok(exit_code)
}

/// Load the input and solve, honoring debug library directives when asked to.
fn load_and_solve(
    solver: &mut Solver,
    input: impl io::Read,
    debug_lib: bool,
) -> Result<SolveResult, Error> {
    if !debug_lib {
        solver.add_dimacs_cnf(input)?;
        return Ok(solver.solve());
    }

    // Library debugging mode: replay the input, invoking the solver at every
    // `c Solver::solve()` comment and checkpointing the result.
    let mut parser = DimacsParser::parse_incremental(input, |_| Ok(()))?;
    let formula = parser.take_formula();
    let directives: Vec<Directive> = parser.take_directives();

    let mut checkpoint = 0usize;
    let mut directive_iter = directives.iter().peekable();

    for (offset, clause) in formula.iter().enumerate() {
        while let Some(directive) = directive_iter.peek() {
            if directive.clause_offset > offset {
                break;
            }
            run_directive(solver, directive.kind, &mut checkpoint)?;
            directive_iter.next();
        }
        solver.add_clause(clause);
    }

    for xor in formula.xor_clauses() {
        solver.add_xor_clause(&xor.vars, xor.rhs);
    }

    for directive in directive_iter {
        run_directive(solver, directive.kind, &mut checkpoint)?;
    }

    Ok(solver.solve())
}

/// Execute one debug library directive.
fn run_directive(
    solver: &mut Solver,
    kind: DirectiveKind,
    checkpoint: &mut usize,
) -> Result<(), Error> {
    match kind {
        DirectiveKind::NewVar => {
            solver.new_var();
        }
        DirectiveKind::Solve => {
            *checkpoint += 1;
            let result = solver.solve();
            let path = format!("debugLibPart{}.output", checkpoint);
            info!("Solver::solve() checkpoint to {}", path);

            let mut file = io::BufWriter::new(fs::File::create(&path)?);
            match result {
                SolveResult::Sat => {
                    writeln!(file, "SAT")?;
                    write_model(&mut file, solver)?;
                }
                SolveResult::Unsat => writeln!(file, "UNSAT")?,
                SolveResult::Unknown => writeln!(file, "INDET")?,
            }
        }
    }
    Ok(())
}

/// Print the model as `v` lines.
fn write_model(target: &mut impl Write, solver: &Solver) -> io::Result<()> {
    let model = solver.model().expect("model of a sat solver");

    let mut line_len = 0;
    for lit in model {
        if line_len == 0 {
            write!(target, "v")?;
            line_len = 1;
        }
        write!(target, " {}", lit)?;
        line_len += 1;
        if line_len >= 16 {
            writeln!(target)?;
            line_len = 0;
        }
    }
    if line_len != 0 {
        writeln!(target)?;
    }
    writeln!(target, "v 0")
}
