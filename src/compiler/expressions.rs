//! Expression lowering. Every expression leaves exactly one value on the stack.

use crate::ast::*;
use crate::bytecode::Instruction;
use crate::error::CompileError;
use crate::lexer::Symbol;
use crate::span::Span;

use super::fragment::{CodeGenValue, Fragment};
use super::statements::binary_instruction;
use super::{CompileResult, Compiler};

impl Compiler {
    pub(crate) fn expression(&mut self, expr: &Expr) -> CompileResult<Fragment> {
        let mut out = Fragment::new();

        match &expr.kind {
            ExprKind::IntLiteral(n) => out.emit(Instruction::PushInt(*n)),
            ExprKind::UIntLiteral(n) => out.emit(Instruction::PushUInt(*n)),
            ExprKind::FloatLiteral(n) => out.emit(Instruction::PushFloat(*n)),
            ExprKind::CharLiteral(c) => out.emit(Instruction::PushChar(*c)),
            ExprKind::StringLiteral(symbol) => out.emit(Instruction::PushString(*symbol)),
            ExprKind::BoolLiteral(true) => out.emit(Instruction::PushTrue),
            ExprKind::BoolLiteral(false) => out.emit(Instruction::PushFalse),
            ExprKind::Null => out.emit(Instruction::PushNull),

            ExprKind::Variable(name) => {
                if let Some(slot) = self.scope.resolve(*name) {
                    out.emit(Instruction::GetLocal(slot));
                } else if let Some((id, _)) = self.scope.function(*name) {
                    out.emit(Instruction::PushFunction(id));
                } else {
                    out.emit(Instruction::PushString(*name));
                    out.emit_at(Instruction::GetGlobal, expr.span);
                }
            }

            ExprKind::Binary {
                left,
                operator,
                right,
            } => {
                out.append(self.expression(left)?);
                out.append(self.expression(right)?);
                out.emit_at(binary_instruction(*operator), expr.span);
            }

            ExprKind::Unary { operator, operand } => match (operator, &operand.kind) {
                (UnaryOp::Negate, ExprKind::IntLiteral(n)) => {
                    out.emit(Instruction::PushInt(n.wrapping_neg()))
                }
                (UnaryOp::Negate, ExprKind::FloatLiteral(n)) => out.emit(Instruction::PushFloat(-n)),
                _ => {
                    out.append(self.expression(operand)?);
                    let instruction = match operator {
                        UnaryOp::Negate => Instruction::Negate,
                        UnaryOp::Not => Instruction::Not,
                        UnaryOp::BitNot => Instruction::BitNot,
                    };
                    out.emit_at(instruction, expr.span);
                }
            },

            ExprKind::Array(elements) => {
                for element in elements {
                    out.append(self.expression(element)?);
                }
                out.emit(Instruction::CreateArray(elements.len() as u32));
            }

            ExprKind::Index { object, index } => {
                out.append(self.expression(object)?);
                out.append(self.expression(index)?);
                out.emit_at(Instruction::GetArray, expr.span);
            }

            ExprKind::Field { object, name } => {
                out.append(self.expression(object)?);
                out.emit_at(Instruction::GetField(*name), expr.span);
            }

            ExprKind::Call { callee, arguments } => {
                out.append(self.call(callee, arguments, expr.span)?);
            }

            ExprKind::MethodCall {
                object,
                name,
                arguments,
            } => {
                out.append(self.expression(object)?);
                out.append(self.arguments(arguments, expr.span)?);
                out.emit_at(
                    Instruction::MethodCall {
                        name: *name,
                        arg_count: arguments.len() as u8,
                    },
                    expr.span,
                );
            }

            ExprKind::Construct {
                type_name,
                arguments,
            } => {
                let (type_id, field_count) = match self.scope.structure(*type_name) {
                    Some((id, descriptor)) => (id, descriptor.fields.len()),
                    None => {
                        return Err(CompileError::UnknownType(
                            self.name(*type_name).to_string(),
                            expr.span,
                        ))
                    }
                };
                if arguments.len() > field_count {
                    return Err(CompileError::wrong_arity(
                        self.name(*type_name),
                        field_count,
                        arguments.len(),
                        expr.span,
                    ));
                }
                out.append(self.arguments(arguments, expr.span)?);
                out.emit_at(
                    Instruction::New {
                        type_id,
                        arg_count: arguments.len() as u8,
                    },
                    expr.span,
                );
            }
        }

        Ok(out)
    }

    /// Lower an assignable expression into its load and store sequences.
    ///
    /// Sub-expressions (the array and index, or the object) are evaluated
    /// again by the store, so `a[f()] += 1` calls `f` twice.
    pub(crate) fn place(&mut self, target: &Expr) -> CompileResult<CodeGenValue> {
        let mut load = Fragment::new();
        let mut store = Fragment::new();

        match &target.kind {
            ExprKind::Variable(name) => {
                if let Some(slot) = self.scope.resolve(*name) {
                    load.emit(Instruction::GetLocal(slot));
                    store.emit(Instruction::SetLocal(slot));
                } else {
                    load.emit(Instruction::PushString(*name));
                    load.emit_at(Instruction::GetGlobal, target.span);
                    store.emit(Instruction::PushString(*name));
                    store.emit(Instruction::SetGlobal);
                }
            }

            ExprKind::Index { object, index } => {
                let object = self.expression(object)?;
                let index = self.expression(index)?;
                load.append(object.clone());
                load.append(index.clone());
                load.emit_at(Instruction::GetArray, target.span);
                store.append(object);
                store.append(index);
                store.emit_at(Instruction::SetArray, target.span);
            }

            ExprKind::Field { object, name } => {
                let object = self.expression(object)?;
                load.append(object.clone());
                load.emit_at(Instruction::GetField(*name), target.span);
                store.append(object);
                store.emit_at(Instruction::SetField(*name), target.span);
            }

            _ => {
                return Ok(CodeGenValue {
                    load: self.expression(target)?,
                    store: None,
                })
            }
        }

        Ok(CodeGenValue {
            load,
            store: Some(store),
        })
    }

    /// Arguments, then the callee, then `Call`; a direct call to a declared
    /// function that no local shadows uses its table id instead.
    fn call(&mut self, callee: &Expr, arguments: &[Expr], span: Span) -> CompileResult<Fragment> {
        let mut out = Fragment::new();

        if let Some((name, id, arity)) = self.direct_callee(callee) {
            if arity != arguments.len() {
                return Err(CompileError::wrong_arity(
                    self.name(name),
                    arity,
                    arguments.len(),
                    span,
                ));
            }
            out.append(self.arguments(arguments, span)?);
            out.emit_at(Instruction::CallLocalFunction(id), span);
            return Ok(out);
        }

        out.append(self.arguments(arguments, span)?);
        out.append(self.expression(callee)?);
        out.emit_at(Instruction::Call(arguments.len() as u8), span);
        Ok(out)
    }

    fn direct_callee(&self, callee: &Expr) -> Option<(Symbol, u32, usize)> {
        let ExprKind::Variable(name) = callee.kind else {
            return None;
        };
        if self.scope.resolve(name).is_some() {
            return None;
        }
        self.scope
            .function(name)
            .map(|(id, descriptor)| (name, id, descriptor.arity()))
    }

    fn arguments(&mut self, arguments: &[Expr], span: Span) -> CompileResult<Fragment> {
        if arguments.len() > u8::MAX as usize {
            return Err(CompileError::new("too many arguments", span));
        }
        let mut out = Fragment::new();
        for argument in arguments {
            out.append(self.expression(argument)?);
        }
        Ok(out)
    }
}
