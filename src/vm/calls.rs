//! Calling convention.
//!
//! A call pushes a fresh operand stack and local frame and records the
//! return address. Arguments become the callee's first locals and hold a
//! count for the duration of the call. Every call yields exactly one value
//! to the caller.

use crate::error::FaultKind;

use super::heap::{FunctionTarget, Object};
use super::machine::{FaultResult, Frame, Machine};
use super::value::{NativeFunction, Value};

impl Machine {
    /// Call `callee` with the top `argc` operands as arguments.
    pub(super) fn call_value(&mut self, callee: Value, argc: usize) -> FaultResult<()> {
        match callee {
            Value::Native(native) => self.call_native(native, argc),
            Value::Object(handle) => {
                let function = match self.heap.get(handle)? {
                    Object::Function(function) => *function,
                    other => return Err(FaultKind::NotCallable(other.type_name())),
                };

                let mut argc = argc;
                if let Some(receiver) = function.receiver {
                    let at = self
                        .operand_count()
                        .checked_sub(argc)
                        .ok_or(FaultKind::StackUnderflow)?;
                    self.frame_mut()?
                        .operands
                        .insert(at, Value::Object(receiver));
                    argc += 1;
                }

                match function.target {
                    FunctionTarget::Local(id) => self.call_function(id, argc),
                    FunctionTarget::Native(native) => self.call_native(native, argc),
                }
            }
            other => Err(FaultKind::NotCallable(other.type_name())),
        }
    }

    /// `CallLocalFunction`: the argument count is the function's arity,
    /// checked when the call was compiled.
    pub(super) fn call_local(&mut self, id: u32) -> FaultResult<()> {
        let arity = self
            .bytecode
            .function(id)
            .map(|descriptor| descriptor.arity())
            .ok_or(FaultKind::NotCallable("unknown function"))?;
        self.call_function(id, arity)
    }

    pub(super) fn call_function(&mut self, id: u32, argc: usize) -> FaultResult<()> {
        let (arity, offset) = self
            .bytecode
            .function(id)
            .map(|descriptor| (descriptor.arity(), descriptor.offset))
            .ok_or(FaultKind::NotCallable("unknown function"))?;
        if argc != arity {
            return Err(FaultKind::WrongArity {
                expected: arity,
                got: argc,
            });
        }
        if self.call_stack.len() >= self.config.max_call_depth {
            return Err(FaultKind::CallDepthExceeded(self.config.max_call_depth));
        }

        let arguments = self.pop_n(argc)?;
        for argument in &arguments {
            self.heap.retain(argument)?;
        }
        self.frames.push(Frame {
            operands: Vec::new(),
            locals: arguments,
        });
        self.call_stack.push(self.pc);
        self.pc = offset;
        Ok(())
    }

    /// Run a native in place. A native that pushes nothing yields `null`.
    pub(super) fn call_native(&mut self, native: NativeFunction, argc: usize) -> FaultResult<()> {
        let base = self
            .operand_count()
            .checked_sub(argc)
            .ok_or(FaultKind::StackUnderflow)?;
        log::trace!("native {}({} args)", native.name, argc);

        (native.func)(self, argc)?;

        if self.operand_count() == base {
            self.push(Value::Null)?;
        }
        Ok(())
    }

    /// `MethodCall`: the receiver sits below the arguments.
    ///
    /// Native structures dispatch to their registered methods with the
    /// receiver as first argument. A user structure whose field holds a
    /// callable calls it without the receiver.
    pub(super) fn call_method(&mut self, name: u32, argc: usize) -> FaultResult<()> {
        let at = self
            .operand_count()
            .checked_sub(argc + 1)
            .ok_or(FaultKind::StackUnderflow)?;
        let receiver = self.frame()?.operands[at];

        if let Some(method) = self.native_method(receiver, self.bytecode.string(name)) {
            return self.call_native(method, argc + 1);
        }

        let field = match receiver.as_handle().map(|h| self.heap.get(h)) {
            Some(Ok(Object::Structure { type_id, fields })) => self
                .bytecode
                .structure(*type_id)
                .and_then(|descriptor| descriptor.field_index(name))
                .and_then(|index| fields.get(index).copied()),
            _ => None,
        };
        match field {
            Some(callee) if self.is_callable(callee) => {
                self.frame_mut()?.operands.remove(at);
                self.call_value(callee, argc)
            }
            _ => Err(FaultKind::InvalidMethod(
                self.bytecode.string(name).to_string(),
            )),
        }
    }

    fn is_callable(&self, value: Value) -> bool {
        match value {
            Value::Native(_) => true,
            Value::Object(handle) => matches!(self.heap.get(handle), Ok(Object::Function(_))),
            _ => false,
        }
    }

    /// Leave the current call, handing `value` to the caller. A return
    /// from the main body halts the machine.
    pub(super) fn return_from(&mut self, value: Value) -> FaultResult<()> {
        let Some(return_to) = self.call_stack.pop() else {
            self.halt();
            return Ok(());
        };
        let frame = self.frames.pop().ok_or(FaultKind::StackUnderflow)?;
        for local in &frame.locals {
            self.heap.release(local)?;
        }
        self.pc = return_to;
        self.push(value)
    }
}
