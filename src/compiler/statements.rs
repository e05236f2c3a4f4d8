//! Statement lowering: declarations, assignment, blocks, branches, loops.

use crate::ast::*;
use crate::bytecode::{Instruction, OpCode};
use crate::error::CompileError;
use crate::lexer::Symbol;
use crate::span::Span;

use super::fragment::{BranchFragment, Fragment, JumpTarget};
use super::scope::{BlockKind, DeclareError};
use super::{CompileResult, Compiler};

impl Compiler {
    /// Lower statements in the current block.
    pub(crate) fn statements(&mut self, stmts: &[Stmt]) -> CompileResult<Fragment> {
        let mut out = Fragment::new();
        for stmt in stmts {
            let fragment = self.statement(stmt)?;
            out.append(fragment);
        }
        Ok(out)
    }

    /// Lower statements in a new block, releasing its locals on exit.
    pub(crate) fn block(&mut self, stmts: &[Stmt], kind: BlockKind) -> CompileResult<Fragment> {
        self.scope.open(kind);
        let lowered = self.statements(stmts);
        let released = self.scope.close();

        let mut out = lowered?;
        emit_shrink(&mut out, released);
        Ok(out)
    }

    pub(crate) fn declare(&mut self, name: Symbol, span: Span) -> CompileResult<u8> {
        self.scope.declare(name).map_err(|err| match err {
            DeclareError::Duplicate => {
                CompileError::DuplicateVariable(self.name(name).to_string(), span)
            }
            DeclareError::Exhausted => CompileError::TooManyLocals(span),
        })
    }

    pub(crate) fn statement(&mut self, stmt: &Stmt) -> CompileResult<Fragment> {
        let mut out = Fragment::new();
        out.mark(stmt.span);

        match &stmt.kind {
            StmtKind::Expression(expr) => {
                out.append(self.expression(expr)?);
                out.emit(Instruction::Pop);
            }

            StmtKind::Let { name, initializer } => {
                // The initializer cannot see the name it initializes.
                out.append(self.expression(initializer)?);
                let slot = self.declare(*name, stmt.span)?;
                out.emit(Instruction::SetLocal(slot));
            }

            StmtKind::Assign {
                target,
                operator,
                value,
            } => {
                let place = self.place(target)?;
                let Some(store) = place.store else {
                    return Err(CompileError::new("invalid assignment target", target.span));
                };
                if let Some(operator) = operator {
                    out.append(place.load);
                    out.append(self.expression(value)?);
                    out.emit_at(binary_instruction(*operator), stmt.span);
                } else {
                    out.append(self.expression(value)?);
                }
                out.append(store);
            }

            StmtKind::Block(stmts) => out.append(self.block(stmts, BlockKind::Plain)?),

            StmtKind::If(chain) => out.append(self.branch_chain(chain)?),

            StmtKind::While { condition, body } => out.append(self.while_loop(condition, body)?),

            StmtKind::Break => {
                let released = self
                    .scope
                    .slots_to_loop_exit()
                    .ok_or(CompileError::BreakOutsideLoop(stmt.span))?;
                emit_shrink(&mut out, released);
                out.emit_jump(OpCode::Jump, JumpTarget::Break);
            }

            StmtKind::Continue => {
                let released = self
                    .scope
                    .slots_to_loop_exit()
                    .ok_or(CompileError::ContinueOutsideLoop(stmt.span))?;
                emit_shrink(&mut out, released);
                out.emit_jump(OpCode::Jump, JumpTarget::Continue);
            }

            StmtKind::Return(None) => out.emit(Instruction::Return),

            StmtKind::Return(Some(value)) => {
                out.append(self.expression(value)?);
                out.emit(Instruction::ReturnValue);
            }

            StmtKind::Function(_) | StmtKind::Type(_) => {
                return Err(CompileError::new(
                    "declarations are only allowed at the top level",
                    stmt.span,
                ));
            }
        }

        Ok(out)
    }

    /// Lay out `if`/`elif`/`else`.
    ///
    /// Every arm is lowered first so the chain's total size is known; each
    /// failed condition then jumps to the next arm and each executed body
    /// jumps past the whole chain.
    fn branch_chain(&mut self, chain: &BranchChain) -> CompileResult<Fragment> {
        let mut arms = Vec::new();
        for branch in chain.branches() {
            let condition = self.expression(&branch.condition)?;
            let body = self.block(&branch.body, BlockKind::Plain)?;
            arms.push(BranchFragment { condition, body });
        }
        let else_body = match &chain.else_block {
            Some(stmts) => Some(self.block(stmts, BlockKind::Plain)?),
            None => None,
        };

        let count = arms.len();
        let has_else = else_body.is_some();
        let exits_chain = |index: usize| index + 1 < count || has_else;
        let end = arms
            .iter()
            .enumerate()
            .map(|(i, arm)| arm.laid_out_len(exits_chain(i)))
            .sum::<usize>()
            + else_body.as_ref().map_or(0, Fragment::len);

        let mut out = Fragment::new();
        for (i, arm) in arms.into_iter().enumerate() {
            let next = out.len() + arm.laid_out_len(exits_chain(i));
            out.append(arm.condition);
            out.emit_jump(OpCode::JumpIfFalse, JumpTarget::Offset(next));
            out.append(arm.body);
            if exits_chain(i) {
                out.emit_jump(OpCode::Jump, JumpTarget::Offset(end));
            }
        }
        if let Some(else_body) = else_body {
            out.append(else_body);
        }

        debug_assert_eq!(out.len(), end);
        Ok(out)
    }

    /// Condition, exit jump, body, back edge. `break` lands after the back
    /// edge, `continue` on the condition.
    fn while_loop(&mut self, condition: &Expr, body: &[Stmt]) -> CompileResult<Fragment> {
        let arm = BranchFragment {
            condition: self.expression(condition)?,
            body: self.block(body, BlockKind::Loop)?,
        };
        let end = arm.laid_out_len(true);

        let mut out = Fragment::new();
        out.append(arm.condition);
        out.emit_jump(OpCode::JumpIfFalse, JumpTarget::Offset(end));
        out.append(arm.body);
        out.emit_jump(OpCode::Jump, JumpTarget::Offset(0));
        out.bind_loop_exits(0, end);
        Ok(out)
    }
}

fn emit_shrink(out: &mut Fragment, mut count: usize) {
    while count > 0 {
        let step = count.min(u8::MAX as usize);
        out.emit(Instruction::ShrinkLocal(step as u8));
        count -= step;
    }
}

pub(crate) fn binary_instruction(op: BinaryOp) -> Instruction {
    match op {
        BinaryOp::Add => Instruction::Add,
        BinaryOp::Subtract => Instruction::Sub,
        BinaryOp::Multiply => Instruction::Mul,
        BinaryOp::Divide => Instruction::Div,
        BinaryOp::Modulo => Instruction::Mod,
        BinaryOp::BitAnd => Instruction::BitAnd,
        BinaryOp::BitOr => Instruction::BitOr,
        BinaryOp::BitXor => Instruction::BitXor,
        BinaryOp::ShiftLeft => Instruction::Shl,
        BinaryOp::ShiftRight => Instruction::Shr,
        BinaryOp::And => Instruction::And,
        BinaryOp::Or => Instruction::Or,
        BinaryOp::Equal => Instruction::Eq,
        BinaryOp::NotEqual => Instruction::Ne,
        BinaryOp::Less => Instruction::Lt,
        BinaryOp::Greater => Instruction::Gt,
        BinaryOp::LessEqual => Instruction::Le,
        BinaryOp::GreaterEqual => Instruction::Ge,
    }
}
