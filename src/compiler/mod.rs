//! Lowers the AST to bytecode.
//!
//! - `fragment`: relocatable byte sequences and the two-pass jump patching
//! - `scope`: block contexts, local slots, function/structure prototypes
//! - `statements` / `expressions`: one lowering rule per node kind
//!
//! Layout of the emitted program: the main body, `End`, then each function
//! body in declaration order.

mod expressions;
pub mod fragment;
pub mod scope;
mod statements;

use crate::ast::{Program, Stmt, StmtKind};
use crate::bytecode::{Bytecode, Instruction};
use crate::error::CompileError;
use crate::lexer::{StringPool, Symbol};
use crate::span::Span;

pub use fragment::{BranchFragment, CodeGenValue, Fragment, JumpTarget, Relocation};
pub use scope::{BlockKind, BlockContext, ScopeBuilder};

pub type CompileResult<T> = Result<T, CompileError>;

/// Compile a parsed program into bytecode.
pub fn compile(program: &Program, strings: StringPool) -> CompileResult<Bytecode> {
    Compiler::new(strings).compile(program)
}

pub struct Compiler {
    pub(crate) strings: StringPool,
    pub(crate) scope: ScopeBuilder,
}

impl Compiler {
    pub fn new(strings: StringPool) -> Self {
        Self {
            strings,
            scope: ScopeBuilder::new(),
        }
    }

    pub fn compile(mut self, program: &Program) -> CompileResult<Bytecode> {
        for decl in program.types() {
            if self.scope.register_struct(decl).is_none() {
                return Err(CompileError::DuplicateType(
                    self.name(decl.name).to_string(),
                    decl.span,
                ));
            }
        }
        for decl in program.functions() {
            if self.scope.register_function(decl).is_none() {
                return Err(CompileError::DuplicateFunction(
                    self.name(decl.name).to_string(),
                    decl.span,
                ));
            }
        }

        let mut code = Vec::new();
        let mut positions = Vec::new();

        self.scope.begin_function();
        let mut main = Fragment::new();
        for stmt in &program.statements {
            if matches!(stmt.kind, StmtKind::Function(_) | StmtKind::Type(_)) {
                continue;
            }
            let fragment = self.statement(stmt)?;
            main.append(fragment);
        }
        main.emit(Instruction::End);
        self.link(main, &mut code, &mut positions)?;

        for decl in program.functions() {
            let Some((id, _)) = self.scope.function(decl.name) else {
                continue;
            };
            self.scope.set_function_offset(id, code.len());

            self.scope.begin_function();
            for param in &decl.params {
                self.declare(param.name, param.span)?;
            }
            let mut body = self.statements(&decl.body)?;
            if !ends_with_return(&decl.body) {
                body.emit(Instruction::Return);
            }
            self.link(body, &mut code, &mut positions)?;
        }

        let (functions, structs) = std::mem::take(&mut self.scope).into_tables();
        log::debug!(
            "compiled {} bytes, {} functions, {} structures",
            code.len(),
            functions.len(),
            structs.len()
        );

        Ok(Bytecode {
            strings: self.strings,
            code,
            functions,
            structs,
            positions,
        })
    }

    /// Resolve `fragment` at the end of `code` and append it.
    fn link(
        &self,
        fragment: Fragment,
        code: &mut Vec<u8>,
        positions: &mut Vec<(usize, Span)>,
    ) -> CompileResult<()> {
        let resolved = fragment.resolve(code.len()).map_err(|relocation| {
            CompileError::new(
                format!(
                    "unbound jump at byte {} ({:?})",
                    relocation.site, relocation.target
                ),
                Span::default(),
            )
        })?;
        code.extend(resolved.code);
        positions.extend(resolved.positions);
        Ok(())
    }

    pub(crate) fn name(&self, symbol: Symbol) -> &str {
        self.strings.name(symbol)
    }
}

fn ends_with_return(body: &[Stmt]) -> bool {
    matches!(body.last(), Some(Stmt { kind: StmtKind::Return(_), .. }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::OpCode;
    use crate::lexer::Scanner;
    use crate::parser::Parser;
    use pretty_assertions::assert_eq;

    fn compile_source(source: &str) -> Bytecode {
        try_compile(source).unwrap()
    }

    fn try_compile(source: &str) -> CompileResult<Bytecode> {
        let (tokens, pool) = Scanner::new(source).scan_tokens().unwrap();
        let program = Parser::new(tokens, &pool).parse().unwrap();
        compile(&program, pool)
    }

    fn ops(bytecode: &Bytecode) -> Vec<Instruction> {
        bytecode
            .instructions()
            .into_iter()
            .map(|(_, instruction)| instruction)
            .collect()
    }

    #[test]
    fn test_let_compiles_to_push_and_store() {
        let bytecode = compile_source("let a = 3;");
        assert_eq!(
            ops(&bytecode),
            vec![
                Instruction::PushInt(3),
                Instruction::SetLocal(0),
                Instruction::End
            ]
        );
    }

    #[test]
    fn test_decode_encode_round_trip() {
        let bytecode = compile_source(
            "let a = 3; let s = \"hi\"; func f(x) { return x * 2.5; } \
             while (a > 0) { a -= 1; if (a == 1) { break; } } print(f(a), s, 'c', 7u);",
        );
        let mut reencoded = Vec::new();
        for (_, instruction) in bytecode.instructions() {
            instruction.encode(&mut reencoded);
        }
        assert_eq!(reencoded, bytecode.code);
    }

    #[test]
    fn test_if_else_jump_targets() {
        let bytecode = compile_source("if (1 < 2) { print(1); } else { print(2); }");
        let listing = bytecode.instructions();

        let (_, jump_if_false) = listing[3];
        let else_start = listing
            .iter()
            .position(|(_, i)| matches!(i, Instruction::Jump(_)))
            .map(|i| listing[i + 1].0)
            .unwrap();
        let (end_offset, end) = *listing.last().unwrap();

        assert_eq!(jump_if_false, Instruction::JumpIfFalse(else_start as u32));
        assert_eq!(else_start, 35);
        assert_eq!(end, Instruction::End);
        assert!(listing
            .iter()
            .any(|(_, i)| *i == Instruction::Jump(end_offset as u32)));
        assert_eq!(end_offset, 49);
    }

    #[test]
    fn test_elif_chain_jumps_past_whole_chain() {
        let bytecode = compile_source(
            "let x = 2; if (x == 1) { x = 10; } elif (x == 2) { x = 20; } elif (x == 3) { x = 30; }",
        );
        let listing = bytecode.instructions();
        let (end_offset, _) = *listing.last().unwrap();

        let exits: Vec<u32> = listing
            .iter()
            .filter_map(|(_, i)| match i {
                Instruction::Jump(target) => Some(*target),
                _ => None,
            })
            .collect();
        // Every arm but the last skips the rest of the chain.
        assert_eq!(exits, vec![end_offset as u32; 2]);

        // Each conditional jump lands on the next arm's condition, or past the chain.
        let conditionals: Vec<u32> = listing
            .iter()
            .filter_map(|(_, i)| match i {
                Instruction::JumpIfFalse(target) => Some(*target),
                _ => None,
            })
            .collect();
        let jump_sites: Vec<usize> = listing
            .iter()
            .filter(|(_, i)| matches!(i, Instruction::Jump(_)))
            .map(|(offset, _)| offset + 5)
            .collect();
        assert_eq!(
            conditionals,
            vec![jump_sites[0] as u32, jump_sites[1] as u32, end_offset as u32]
        );
    }

    #[test]
    fn test_while_jumps() {
        let bytecode =
            compile_source("let i = 0; while (i < 3) { if (i == 1) { break; } continue; }");
        let listing = bytecode.instructions();
        let condition_start = 7; // after PUSH_INT + SET_LOCAL
        let (end_offset, _) = *listing.last().unwrap();

        let jumps: Vec<(usize, Instruction)> = listing
            .iter()
            .copied()
            .filter(|(_, i)| matches!(i, Instruction::Jump(_) | Instruction::JumpIfFalse(_)))
            .collect();
        let jump_targets: Vec<u32> = jumps
            .iter()
            .map(|(_, i)| match i {
                Instruction::Jump(t) | Instruction::JumpIfFalse(t) => *t,
                _ => unreachable!(),
            })
            .collect();

        // loop exit, if-skip, break, continue, back edge
        assert_eq!(jump_targets[0], end_offset as u32);
        assert_eq!(jump_targets[2], end_offset as u32);
        assert_eq!(jump_targets[3], condition_start);
        assert_eq!(jump_targets[4], condition_start);
        assert_eq!(jumps[4].0 + 5, end_offset);
    }

    #[test]
    fn test_break_releases_nested_block_locals() {
        let bytecode = compile_source(
            "while (true) { let a = 1; { let b = 2; if (b) { let c = 3; break; } } }",
        );
        let listing = ops(&bytecode);
        let break_at = listing
            .iter()
            .position(|i| *i == Instruction::ShrinkLocal(3))
            .unwrap();
        assert!(matches!(listing[break_at + 1], Instruction::Jump(_)));
    }

    #[test]
    fn test_sibling_blocks_reuse_slots() {
        let bytecode = compile_source("let a = 1; { let b = 2; } { let c = 3; let d = 4; }");
        assert_eq!(
            ops(&bytecode),
            vec![
                Instruction::PushInt(1),
                Instruction::SetLocal(0),
                Instruction::PushInt(2),
                Instruction::SetLocal(1),
                Instruction::ShrinkLocal(1),
                Instruction::PushInt(3),
                Instruction::SetLocal(1),
                Instruction::PushInt(4),
                Instruction::SetLocal(2),
                Instruction::ShrinkLocal(2),
                Instruction::End,
            ]
        );
    }

    #[test]
    fn test_unresolved_names_use_globals() {
        let bytecode = compile_source("counter = 1; print(counter);");
        let counter = bytecode.strings.lookup("counter").unwrap();
        let print = bytecode.strings.lookup("print").unwrap();
        assert_eq!(
            ops(&bytecode),
            vec![
                Instruction::PushInt(1),
                Instruction::PushString(counter),
                Instruction::SetGlobal,
                Instruction::PushString(counter),
                Instruction::GetGlobal,
                Instruction::PushString(print),
                Instruction::GetGlobal,
                Instruction::Call(1),
                Instruction::Pop,
                Instruction::End,
            ]
        );
    }

    #[test]
    fn test_functions_follow_main_body() {
        let bytecode = compile_source("func two() { return 2; } func one() { } print(two());");
        let end = bytecode
            .instructions()
            .into_iter()
            .find(|(_, i)| *i == Instruction::End)
            .map(|(offset, _)| offset)
            .unwrap();

        let two = &bytecode.functions[0];
        let one = &bytecode.functions[1];
        assert_eq!(two.offset, end + 1);
        assert_eq!(bytecode.opcode_at(two.offset), Some(OpCode::PushInt));
        // `one` gets an implicit return.
        assert_eq!(bytecode.opcode_at(one.offset), Some(OpCode::Return));
        assert_eq!(one.offset + 1, bytecode.len());

        assert!(bytecode
            .instructions()
            .iter()
            .any(|(_, i)| *i == Instruction::CallLocalFunction(0)));
    }

    #[test]
    fn test_parameters_occupy_first_slots() {
        let bytecode = compile_source("func f(a, b) { let c = a + b; return c; }");
        let body: Vec<_> = bytecode
            .instructions()
            .into_iter()
            .filter(|(offset, _)| *offset >= bytecode.functions[0].offset)
            .map(|(_, i)| i)
            .collect();
        assert_eq!(
            body,
            vec![
                Instruction::GetLocal(0),
                Instruction::GetLocal(1),
                Instruction::Add,
                Instruction::SetLocal(2),
                Instruction::GetLocal(2),
                Instruction::ReturnValue,
            ]
        );
    }

    #[test]
    fn test_compound_assignment_on_index() {
        let bytecode = compile_source("let a = [1, 2]; a[1] += 5;");
        assert_eq!(
            ops(&bytecode)[4..],
            [
                Instruction::GetLocal(0),
                Instruction::PushInt(1),
                Instruction::GetArray,
                Instruction::PushInt(5),
                Instruction::Add,
                Instruction::GetLocal(0),
                Instruction::PushInt(1),
                Instruction::SetArray,
                Instruction::End,
            ]
        );
    }

    #[test]
    fn test_structures_and_construction() {
        let bytecode = compile_source("type P { x: int, y } let p = P(1); p.y = 2;");
        assert_eq!(bytecode.structs.len(), 1);
        let y = bytecode.strings.lookup("y").unwrap();
        assert!(ops(&bytecode).contains(&Instruction::New {
            type_id: 0,
            arg_count: 1
        }));
        assert!(ops(&bytecode).contains(&Instruction::SetField(y)));
    }

    #[test]
    fn test_compile_errors() {
        assert!(matches!(
            try_compile("func f() { } func f() { }"),
            Err(CompileError::DuplicateFunction(ref name, _)) if name == "f"
        ));
        assert!(matches!(
            try_compile("type T { } type T { }"),
            Err(CompileError::DuplicateType(..))
        ));
        assert!(matches!(
            try_compile("let a = 1; let a = 2;"),
            Err(CompileError::DuplicateVariable(..))
        ));
        assert!(matches!(
            try_compile("break;"),
            Err(CompileError::BreakOutsideLoop(_))
        ));
        assert!(matches!(
            try_compile("func f() { continue; } while (true) { f(); }"),
            Err(CompileError::ContinueOutsideLoop(_))
        ));
        assert!(matches!(
            try_compile("func f(a) { } f(1, 2);"),
            Err(CompileError::WrongArity { expected: 1, got: 2, .. })
        ));
        assert!(matches!(
            try_compile("type P { x } let p = P(1, 2);"),
            Err(CompileError::WrongArity { .. })
        ));
    }

    #[test]
    fn test_positions_point_at_source() {
        let bytecode = compile_source("let a = [1];\nprint(a[4]);");
        let get_array = bytecode
            .instructions()
            .into_iter()
            .find(|(_, i)| *i == Instruction::GetArray)
            .map(|(offset, _)| offset)
            .unwrap();
        let span = bytecode.span_at(get_array).unwrap();
        assert_eq!((span.line, span.column), (2, 7));
    }
}
