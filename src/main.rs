//! Sable CLI: run a script file.

use std::fs;
use std::path::PathBuf;
use std::process;

use clap::{ArgAction, Parser};
use colored::Colorize;

use sable::error::SableError;
use sable::vm::{Machine, MachineConfig};

#[derive(Parser, Debug)]
#[command(name = "sable", version, about = "Run Sable scripts (.sb)")]
struct Cli {
    /// Script to run
    file: PathBuf,

    /// Print the bytecode listing before running
    #[arg(short = 'b', long)]
    show_bytecode: bool,

    /// More logging (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let source = match fs::read_to_string(&cli.file) {
        Ok(source) => source,
        Err(e) => {
            eprintln!(
                "{} cannot read '{}': {}",
                "error:".red().bold(),
                cli.file.display(),
                e
            );
            process::exit(1);
        }
    };

    if let Err(e) = run(&cli, &source) {
        report(&cli, &source, &e);
        process::exit(1);
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .try_init();
}

fn run(cli: &Cli, source: &str) -> Result<(), SableError> {
    let bytecode = sable::compile(source)?;
    if cli.show_bytecode {
        print!("{}", sable::bytecode::disassemble(&bytecode));
        println!();
    }

    let mut machine = Machine::new(bytecode, MachineConfig::default());
    machine.run()?;
    Ok(())
}

/// Print the error with the offending source line and a marker under it.
fn report(cli: &Cli, source: &str, error: &SableError) {
    eprintln!("{} {}", "error:".red().bold(), error);

    let Some(span) = error.span() else {
        return;
    };
    let Some(line) = source.lines().nth(span.line.saturating_sub(1)) else {
        return;
    };

    let indent = span.column.saturating_sub(1);
    let width = span.len().min(line.len().saturating_sub(indent)).max(1);
    let gutter = span.line.to_string();
    eprintln!(
        "{} {}:{}:{}",
        "-->".blue(),
        cli.file.display(),
        span.line,
        span.column
    );
    eprintln!("{} |", " ".repeat(gutter.len()));
    eprintln!("{} | {}", gutter.blue(), line);
    eprintln!(
        "{} | {}{}",
        " ".repeat(gutter.len()),
        " ".repeat(indent),
        "~".repeat(width).red().bold()
    );
}
