//! Sable: a small dynamically typed scripting language.
//!
//! Source is scanned into tokens, parsed into an AST, lowered to a flat
//! bytecode, and executed by a stack VM with a reference-counted heap.
//!
//! ```text
//! source -> lexer -> parser -> compiler -> Bytecode -> vm::Machine
//! ```

// Allow some clippy lints that are stylistic and not critical
#![allow(clippy::module_inception)]
#![allow(clippy::result_large_err)]
#![allow(clippy::new_without_default)]
#![allow(clippy::collapsible_if)]
#![allow(clippy::collapsible_else_if)]
#![allow(clippy::unnecessary_cast)]
#![allow(clippy::len_zero)]
#![allow(clippy::manual_range_contains)]

pub mod ast;
pub mod bytecode;
pub mod compiler;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod span;
pub mod vm;

use std::path::Path;

use ast::Program;
use bytecode::Bytecode;
use error::SableError;
use lexer::{Scanner, StringPool, Token};
use parser::Parser;
use vm::{Machine, MachineConfig};

/// Scan source into tokens and the string pool.
pub fn tokenize(source: &str) -> Result<(Vec<Token>, StringPool), SableError> {
    Ok(Scanner::new(source).scan_tokens()?)
}

/// Parse source into a program, returning the pool its symbols refer to.
pub fn parse(source: &str) -> Result<(Program, StringPool), SableError> {
    let (tokens, pool) = tokenize(source)?;
    let program = Parser::new(tokens, &pool).parse()?;
    Ok((program, pool))
}

/// Compile source to bytecode.
pub fn compile(source: &str) -> Result<Bytecode, SableError> {
    let (program, pool) = parse(source)?;
    Ok(compiler::compile(&program, pool)?)
}

/// Compile and run source, returning the halted machine.
pub fn run(source: &str, config: MachineConfig) -> Result<Machine, SableError> {
    let bytecode = compile(source)?;
    let mut machine = Machine::new(bytecode, config);
    machine.run()?;
    Ok(machine)
}

/// Run a source file.
pub fn run_file(path: &Path, config: MachineConfig) -> Result<Machine, SableError> {
    let source = std::fs::read_to_string(path)?;
    run(&source, config)
}

/// Human-readable listing of the bytecode for `source`.
pub fn disassemble(source: &str) -> Result<String, SableError> {
    Ok(bytecode::disassemble(&compile(source)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiet() -> MachineConfig {
        MachineConfig {
            echo: false,
            ..MachineConfig::default()
        }
    }

    #[test]
    fn test_run_reports_output() {
        let machine = run("let a = 1; let b = 2; print(a + b);", quiet()).unwrap();
        assert_eq!(machine.output, vec!["3"]);
    }

    #[test]
    fn test_errors_carry_phase_and_span() {
        let err = run("let a = $;", quiet()).unwrap_err();
        assert!(matches!(err, SableError::Lexer(_)));
        assert_eq!(err.span().map(|s| (s.line, s.column)), Some((1, 9)));

        let err = run("let = 1;", quiet()).unwrap_err();
        assert!(matches!(err, SableError::Parser(_)));

        let err = run("break;", quiet()).unwrap_err();
        assert!(matches!(err, SableError::Compile(_)));

        let err = run("let a = [];\nprint(a[0]);", quiet()).unwrap_err();
        assert!(matches!(err, SableError::Runtime(_)));
        assert_eq!(err.span().map(|s| s.line), Some(2));
    }

    #[test]
    fn test_missing_file() {
        let err = run_file(Path::new("/nonexistent/script.sb"), quiet()).unwrap_err();
        assert!(matches!(err, SableError::Io(_)));
    }

    #[test]
    fn test_disassemble_lists_opcodes() {
        let listing = disassemble("let a = 3;").unwrap();
        assert!(listing.contains("PUSH_INT"));
        assert!(listing.contains("SET_LOCAL"));
    }
}
