//! Stack virtual machine runner.
//!
//! Assembles a program and executes it, dumping the registers and the stack
//! after every instruction.
//!
//! # Usage
//! ```text
//! stackvm [program.asm] [OPTIONS]
//! ```
//!
//! # Arguments
//! - `program.asm`: Assembly source file (defaults to the built-in demo)
//!
//! # Options
//! - `-s, --step`: Wait for Enter after every instruction
//! - `-q, --quiet`: Do not print the register/stack dump
//! - `-m, --max-steps <n>`: Abort after `n` instructions
//! - `-p, --profile`: Print per-instruction execution counts
//! - `--no-timestamp`: Omit timestamps from log lines
//!
//! The step limit defaults to `STACKVM_MAX_STEPS` when set.

use stackvm::utils::log::SHOW_TIMESTAMP;
use stackvm::virtual_machine::assembler::{assemble_file, assemble_source};
use stackvm::virtual_machine::errors::VMError;
use stackvm::virtual_machine::program::Program;
use stackvm::virtual_machine::trace::{DumpTracer, NoopTracer, Paced};
use stackvm::virtual_machine::vm::{ExecutionProfile, Outcome, VM};
use stackvm::{error, info};
use std::env;
use std::io;
use std::process;
use std::sync::atomic::Ordering;
use termcolor::{ColorChoice, StandardStream};

const MAX_STEPS_ENV: &str = "STACKVM_MAX_STEPS";

const DEMO_SOURCE: &str = include_str!("../demos/accumulate.asm");

/// Parsed command line.
#[derive(Debug, Default, PartialEq, Eq)]
struct Options {
    path: Option<String>,
    step: bool,
    quiet: bool,
    max_steps: Option<u64>,
    profile: bool,
    no_timestamp: bool,
}

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Help,
    Run(Options),
}

fn parse_steps(flag: &str, value: &str) -> Result<u64, String> {
    value
        .parse::<u64>()
        .map_err(|_| format!("Invalid value for {flag}: '{value}' is not a valid step count"))
}

fn parse_args(args: &[String], env_max_steps: Option<&str>) -> Result<Command, String> {
    let mut opts = Options::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => return Ok(Command::Help),
            "--step" | "-s" => opts.step = true,
            "--quiet" | "-q" => opts.quiet = true,
            "--profile" | "-p" => opts.profile = true,
            "--no-timestamp" => opts.no_timestamp = true,
            k @ ("--max-steps" | "-m") => {
                i += 1;
                let value = args.get(i).ok_or_else(|| format!("{k} requires an argument"))?;
                opts.max_steps = Some(parse_steps(k, value)?);
            }
            other if other.starts_with('-') => {
                return Err(format!("Unexpected argument: {other}"));
            }
            path => {
                if opts.path.is_some() {
                    return Err(format!("Unexpected argument: {path}"));
                }
                opts.path = Some(path.to_string());
            }
        }
        i += 1;
    }

    if opts.max_steps.is_none()
        && let Some(value) = env_max_steps
    {
        opts.max_steps = Some(parse_steps(MAX_STEPS_ENV, value)?);
    }

    Ok(Command::Run(opts))
}

fn main() {
    let args: Vec<String> = env::args().collect();
    let program_name = args.first().map(String::as_str).unwrap_or("stackvm");
    let env_max_steps = env::var(MAX_STEPS_ENV).ok();

    let opts = match parse_args(&args, env_max_steps.as_deref()) {
        Ok(Command::Run(opts)) => opts,
        Ok(Command::Help) => {
            print_usage(program_name);
            return;
        }
        Err(e) => {
            error!("{e}\n");
            print_usage(program_name);
            process::exit(1);
        }
    };

    if opts.no_timestamp {
        SHOW_TIMESTAMP.store(false, Ordering::Relaxed);
    }

    let program = load_program(opts.path.as_deref()).unwrap_or_else(|e| {
        error!("Assembly failed: {e}");
        process::exit(e.exit_code());
    });

    info!(
        "Loaded {} ({} instructions)",
        opts.path.as_deref().unwrap_or("built-in demo"),
        program.len()
    );

    let mut vm = match opts.max_steps {
        Some(limit) => VM::with_step_limit(&program, limit),
        None => VM::new(&program),
    };

    let result = match (opts.quiet, opts.step) {
        (false, false) => vm.run_with(&mut DumpTracer::new(stdout())),
        (false, true) => vm.run_with(&mut Paced::new(DumpTracer::new(stdout()), io::stdin().lock())),
        (true, false) => vm.run(),
        (true, true) => vm.run_with(&mut Paced::new(NoopTracer, io::stdin().lock())),
    };

    if opts.profile {
        print_profile(vm.profile());
    }

    match result {
        Ok(outcome) => report(&outcome),
        Err(e) => {
            error!("Execution aborted after {} steps: {e}", vm.steps());
            process::exit(e.exit_code());
        }
    }
}

fn stdout() -> StandardStream {
    StandardStream::stdout(ColorChoice::Auto)
}

fn load_program(path: Option<&str>) -> Result<Program, VMError> {
    match path {
        Some(path) => assemble_file(path),
        None => assemble_source(DEMO_SOURCE),
    }
}

fn report(outcome: &Outcome) {
    let snap = &outcome.snapshot;
    info!(
        "Halted by {:?} after {} steps (sp={} ip={} acc={} cmp={})",
        outcome.reason, outcome.steps, snap.sp, snap.ip, snap.acc, snap.cmp
    );
}

fn print_profile(profile: &ExecutionProfile) {
    let total_u = profile.total();
    let total = total_u as f64;

    let name_w = 2 + profile
        .iter()
        .map(|(entry, _)| entry.as_str().chars().count())
        .max()
        .unwrap_or(0)
        .max("total".chars().count());

    let count_w = profile
        .iter()
        .map(|(_, count)| format_with_commas(count).chars().count())
        .max()
        .unwrap_or(0)
        .max(format_with_commas(total_u).chars().count());

    let dash_w = name_w + 1 + count_w + 2 + "( 100.0%)".len();

    println!("Execution Profile:");
    println!("{}", "-".repeat(dash_w));

    for (entry, count) in profile.iter() {
        if count == 0 {
            continue;
        }

        let percent = if total > 0.0 {
            (count as f64 / total) * 100.0
        } else {
            0.0
        };

        println!(
            "{:<name_w$} {:>count_w$} ({:>5.1}%)",
            entry.as_str(),
            format_with_commas(count),
            percent,
        );
    }

    println!("{}", "-".repeat(dash_w));
    println!(
        "{:<name_w$} {:>count_w$} ({:>5.1}%)",
        "total",
        format_with_commas(total_u),
        100.0,
    );
}

fn format_with_commas(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + s.len() / 3);
    for (i, c) in s.chars().enumerate() {
        if i > 0 && (s.len() - i).is_multiple_of(3) {
            result.push(',');
        }
        result.push(c);
    }
    result
}

const USAGE: &str = "\
Stack Virtual Machine

USAGE:
    {program} [program.asm] [OPTIONS]

ARGS:
    [program.asm]    Assembly source file (defaults to the built-in demo)

OPTIONS:
    -s, --step              Wait for Enter after every instruction
    -q, --quiet             Do not print the register/stack dump
    -m, --max-steps <n>     Abort after n instructions (default: unlimited)
    -p, --profile           Print per-instruction execution counts
        --no-timestamp      Omit timestamps from log lines
    -h, --help              Print this help message

ENVIRONMENT:
    STACKVM_MAX_STEPS       Step limit used when --max-steps is absent

EXAMPLES:
    # Run the built-in demo one instruction at a time
    {program} --step

    # Run a program without the dump and show the profile
    {program} demos/accumulate.asm -q -p
";

fn print_usage(program: &str) {
    info!("{}", USAGE.replace("{program}", program));
}
