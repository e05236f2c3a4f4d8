//! The stack machine: state, dispatch loop, and collection.

use std::collections::HashSet;
use std::fmt;

use ahash::AHashMap;
use indexmap::IndexMap;

use crate::ast::TypeAnnotation;
use crate::bytecode::{Bytecode, Instruction};
use crate::error::{FaultKind, RuntimeFault};
use crate::lexer::Symbol;

use super::heap::{FunctionRef, FunctionTarget, Handle, Heap, Object};
use super::natives::NativeStructureDef;
use super::value::{NativeFn, NativeFunction, Value};

pub type FaultResult<T> = Result<T, FaultKind>;

/// Tunables for a [`Machine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MachineConfig {
    /// Allocations between automatic collection passes.
    pub gc_threshold: usize,
    /// Maximum nesting of calls.
    pub max_call_depth: usize,
    /// Write `print` output to stdout as well as recording it.
    pub echo: bool,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            gc_threshold: 1024,
            max_call_depth: 1024,
            echo: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepState {
    Ready,
    Halted,
}

/// Operand stack and local slots of one call.
#[derive(Debug, Default)]
pub struct Frame {
    pub operands: Vec<Value>,
    pub locals: Vec<Value>,
}

pub struct Machine {
    pub(super) bytecode: Bytecode,
    pub(super) config: MachineConfig,
    pub(super) pc: usize,
    /// Offset of the instruction being executed, for fault reports.
    current: usize,
    state: StepState,
    pub(super) frames: Vec<Frame>,
    /// Return addresses; one per active call.
    pub(super) call_stack: Vec<usize>,
    pub(super) globals: IndexMap<String, Value, ahash::RandomState>,
    pub(super) heap: Heap,
    /// Interned string constants, each holding one count.
    constants: AHashMap<Symbol, Handle>,
    pub(super) native_structures: IndexMap<String, NativeStructureDef, ahash::RandomState>,
    pub output: Vec<String>,
}

impl fmt::Debug for Machine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Machine")
            .field("pc", &self.pc)
            .field("state", &self.state)
            .field("call_depth", &self.call_depth())
            .field("globals", &self.globals.len())
            .field("live_objects", &self.heap.len())
            .finish_non_exhaustive()
    }
}

impl Machine {
    /// A machine with the native prelude installed.
    pub fn new(bytecode: Bytecode, config: MachineConfig) -> Self {
        let mut machine = Self::bare(bytecode, config);
        super::natives::install(&mut machine);
        machine
    }

    /// A machine with no natives bound.
    pub fn bare(bytecode: Bytecode, config: MachineConfig) -> Self {
        Self {
            bytecode,
            config,
            pc: 0,
            current: 0,
            state: StepState::Ready,
            frames: vec![Frame::default()],
            call_stack: Vec::new(),
            globals: IndexMap::default(),
            heap: Heap::new(),
            constants: AHashMap::new(),
            native_structures: IndexMap::default(),
            output: Vec::new(),
        }
    }

    // ===== Inspection =====

    pub fn bytecode(&self) -> &Bytecode {
        &self.bytecode
    }

    pub fn pc(&self) -> usize {
        self.pc
    }

    pub fn state(&self) -> StepState {
        self.state
    }

    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    pub fn global(&self, name: &str) -> Option<Value> {
        self.globals.get(name).copied()
    }

    /// Local slot of the innermost call.
    pub fn local(&self, slot: usize) -> Option<Value> {
        self.frames.last()?.locals.get(slot).copied()
    }

    pub fn call_depth(&self) -> usize {
        self.call_stack.len()
    }

    // ===== Registration =====

    pub fn register_native(&mut self, name: &'static str, func: NativeFn) {
        self.globals
            .insert(name.to_string(), Value::Native(NativeFunction::new(name, func)));
    }

    /// Bind a global, moving a count onto the new value.
    pub fn set_global(&mut self, name: &str, value: Value) -> FaultResult<()> {
        self.heap.retain(&value)?;
        if let Some(old) = self.globals.insert(name.to_string(), value) {
            self.heap.release(&old)?;
        }
        Ok(())
    }

    // ===== Execution =====

    /// Run until `End`, a top-level return, or the end of the code.
    pub fn run(&mut self) -> Result<(), RuntimeFault> {
        while self.step()? == StepState::Ready {}
        log::debug!(
            "halted at {:04}; {} live objects, {} swept in total",
            self.pc,
            self.heap.len(),
            self.heap.stats().swept
        );
        Ok(())
    }

    /// Execute one instruction.
    pub fn step(&mut self) -> Result<StepState, RuntimeFault> {
        if self.state == StepState::Halted {
            return Ok(StepState::Halted);
        }
        if self.pc >= self.bytecode.len() {
            self.state = StepState::Halted;
            return Ok(StepState::Halted);
        }
        if self.heap.allocations_since_sweep() >= self.config.gc_threshold {
            self.collect_garbage();
        }

        self.current = self.pc;
        let instruction = match Instruction::decode(&self.bytecode.code, self.pc) {
            Ok(Some(instruction)) => instruction,
            Ok(None) => return Err(self.fault(FaultKind::TruncatedInstruction)),
            Err(byte) => return Err(self.fault(FaultKind::InvalidOpcode(byte))),
        };
        log::trace!("{:04} {:?}", self.pc, instruction);
        self.pc += instruction.width();

        match self.execute(instruction) {
            Ok(()) => Ok(self.state),
            Err(kind) => Err(self.fault(kind)),
        }
    }

    fn fault(&mut self, kind: FaultKind) -> RuntimeFault {
        self.state = StepState::Halted;
        RuntimeFault::new(kind, self.current, self.bytecode.span_at(self.current))
    }

    pub(super) fn halt(&mut self) {
        self.state = StepState::Halted;
    }

    fn execute(&mut self, instruction: Instruction) -> FaultResult<()> {
        match instruction {
            Instruction::PushNull => self.push(Value::Null),
            Instruction::PushTrue => self.push(Value::Bool(true)),
            Instruction::PushFalse => self.push(Value::Bool(false)),
            Instruction::PushInt(n) => self.push(Value::Int(n)),
            Instruction::PushUInt(n) => self.push(Value::UInt(n)),
            Instruction::PushFloat(n) => self.push(Value::Float(n)),
            Instruction::PushChar(c) => self.push(Value::Char(c)),
            Instruction::PushString(symbol) => {
                let handle = self.constant(symbol)?;
                self.push(Value::Object(handle))
            }
            Instruction::PushFunction(id) => {
                let handle = self.heap.allocate(Object::Function(FunctionRef {
                    target: FunctionTarget::Local(id),
                    receiver: None,
                }));
                self.push(Value::Object(handle))
            }

            Instruction::Add
            | Instruction::Sub
            | Instruction::Mul
            | Instruction::Div
            | Instruction::Mod
            | Instruction::BitAnd
            | Instruction::BitOr
            | Instruction::BitXor
            | Instruction::Shl
            | Instruction::Shr
            | Instruction::Eq
            | Instruction::Ne
            | Instruction::Lt
            | Instruction::Gt
            | Instruction::Le
            | Instruction::Ge
            | Instruction::And
            | Instruction::Or => self.binary(instruction.opcode()),
            Instruction::Negate | Instruction::BitNot | Instruction::Not => {
                self.unary(instruction.opcode())
            }

            Instruction::GetLocal(slot) => {
                let value = self
                    .frame()?
                    .locals
                    .get(slot as usize)
                    .copied()
                    .ok_or(FaultKind::InvalidLocal(slot))?;
                self.push(value)
            }
            Instruction::SetLocal(slot) => {
                let value = self.pop()?;
                self.set_local(slot, value)
            }
            Instruction::ShrinkLocal(count) => {
                for _ in 0..count {
                    let value = self
                        .frame_mut()?
                        .locals
                        .pop()
                        .ok_or(FaultKind::StackUnderflow)?;
                    self.heap.release(&value)?;
                }
                Ok(())
            }

            Instruction::GetGlobal => {
                let name = self.pop_string()?;
                let value = self
                    .globals
                    .get(&name)
                    .copied()
                    .ok_or(FaultKind::UndefinedGlobal(name))?;
                self.push(value)
            }
            Instruction::SetGlobal => {
                let name = self.pop_string()?;
                let value = self.pop()?;
                self.set_global(&name, value)
            }

            Instruction::GetArray => {
                let index = self.pop()?;
                let target = self.pop()?;
                let value = self.get_index(target, index)?;
                self.push(value)
            }
            Instruction::SetArray => {
                let index = self.pop()?;
                let target = self.pop()?;
                let value = self.pop()?;
                self.set_index(target, index, value)
            }
            Instruction::GetField(name) => {
                let target = self.pop()?;
                let value = self.get_field(target, name)?;
                self.push(value)
            }
            Instruction::SetField(name) => {
                let target = self.pop()?;
                let value = self.pop()?;
                self.set_field(target, name, value)
            }

            Instruction::CreateArray(count) => {
                let elements = self.pop_n(count as usize)?;
                for element in &elements {
                    self.heap.retain(element)?;
                }
                let handle = self.heap.allocate(Object::Array(elements));
                self.push(Value::Object(handle))
            }
            Instruction::New { type_id, arg_count } => self.construct(type_id, arg_count as usize),

            Instruction::Call(argc) => {
                let callee = self.pop()?;
                self.call_value(callee, argc as usize)
            }
            Instruction::CallLocalFunction(id) => self.call_local(id),
            Instruction::MethodCall { name, arg_count } => {
                self.call_method(name, arg_count as usize)
            }
            Instruction::Return => self.return_from(Value::Null),
            Instruction::ReturnValue => {
                let value = self.pop()?;
                self.return_from(value)
            }

            Instruction::Jump(target) => {
                self.pc = target as usize;
                Ok(())
            }
            Instruction::JumpIfFalse(target) => {
                if !self.pop()?.is_truthy() {
                    self.pc = target as usize;
                }
                Ok(())
            }

            Instruction::Pop => self.pop().map(drop),
            Instruction::End => {
                self.halt();
                Ok(())
            }
        }
    }

    // ===== Operand stack =====

    pub(super) fn frame(&self) -> FaultResult<&Frame> {
        self.frames.last().ok_or(FaultKind::StackUnderflow)
    }

    pub(super) fn frame_mut(&mut self) -> FaultResult<&mut Frame> {
        self.frames.last_mut().ok_or(FaultKind::StackUnderflow)
    }

    pub fn push(&mut self, value: Value) -> FaultResult<()> {
        self.frame_mut()?.operands.push(value);
        Ok(())
    }

    pub fn pop(&mut self) -> FaultResult<Value> {
        self.frame_mut()?
            .operands
            .pop()
            .ok_or(FaultKind::StackUnderflow)
    }

    /// Pop `count` operands, returned in push order.
    pub fn pop_n(&mut self, count: usize) -> FaultResult<Vec<Value>> {
        let operands = &mut self.frame_mut()?.operands;
        if operands.len() < count {
            return Err(FaultKind::StackUnderflow);
        }
        let at = operands.len() - count;
        Ok(operands.split_off(at))
    }

    pub(super) fn operand_count(&self) -> usize {
        self.frames.last().map_or(0, |frame| frame.operands.len())
    }

    fn set_local(&mut self, slot: u8, value: Value) -> FaultResult<()> {
        let slot = slot as usize;
        let Some(frame) = self.frames.last_mut() else {
            return Err(FaultKind::StackUnderflow);
        };
        if slot < frame.locals.len() {
            return self.heap.replace(&mut frame.locals[slot], value);
        }
        frame.locals.resize(slot, Value::Null);
        frame.locals.push(value);
        self.heap.retain(&value)
    }

    // ===== Heap access =====

    /// Handle of the string constant `symbol`, allocated on first use.
    fn constant(&mut self, symbol: Symbol) -> FaultResult<Handle> {
        if let Some(handle) = self.constants.get(&symbol) {
            return Ok(*handle);
        }
        let text = self.bytecode.string(symbol).to_string();
        let handle = self.heap.allocate(Object::String(text));
        self.heap.retain(&Value::Object(handle))?;
        self.constants.insert(symbol, handle);
        Ok(handle)
    }

    pub fn alloc_string(&mut self, text: String) -> Value {
        Value::Object(self.heap.allocate(Object::String(text)))
    }

    /// Contents of a string value.
    pub fn string_value(&self, value: Value) -> Option<&str> {
        match self.heap.get(value.as_handle()?) {
            Ok(Object::String(s)) => Some(s),
            _ => None,
        }
    }

    fn pop_string(&mut self) -> FaultResult<String> {
        let value = self.pop()?;
        self.string_value(value)
            .map(str::to_string)
            .ok_or(FaultKind::TypeMismatch {
                op: "global",
                left: "string",
                right: value.type_name(),
            })
    }

    /// Name of the value's kind, looking through heap references.
    pub fn kind_name(&self, value: Value) -> &'static str {
        match value {
            Value::Object(handle) => self
                .heap
                .get(handle)
                .map_or("collected object", Object::type_name),
            other => other.type_name(),
        }
    }

    fn get_index(&self, target: Value, index: Value) -> FaultResult<Value> {
        let handle = target.as_handle();
        let object = match handle {
            Some(handle) => self.heap.get(handle)?,
            None => return Err(self.index_mismatch("[]", target, index)),
        };
        let Some(position) = index.as_index() else {
            return Err(self.index_mismatch("[]", target, index));
        };

        let length = match object {
            Object::Array(values) => values.len(),
            Object::String(s) => s.len(),
            _ => return Err(self.index_mismatch("[]", target, index)),
        };
        if position < 0 || position as usize >= length {
            return Err(FaultKind::IndexOutOfBounds {
                index: position,
                length,
            });
        }
        Ok(match object {
            Object::Array(values) => values[position as usize],
            Object::String(s) => Value::Char(s.as_bytes()[position as usize]),
            _ => Value::Null,
        })
    }

    fn set_index(&mut self, target: Value, index: Value, value: Value) -> FaultResult<()> {
        let (Some(handle), Some(position)) = (target.as_handle(), index.as_index()) else {
            return Err(self.index_mismatch("[]=", target, index));
        };
        let length = match self.heap.get(handle)? {
            Object::Array(values) => values.len(),
            _ => return Err(self.index_mismatch("[]=", target, index)),
        };
        if position < 0 || position as usize >= length {
            return Err(FaultKind::IndexOutOfBounds {
                index: position,
                length,
            });
        }
        self.heap.set_element(handle, position as usize, value)
    }

    fn index_mismatch(&self, op: &'static str, target: Value, index: Value) -> FaultKind {
        FaultKind::TypeMismatch {
            op,
            left: self.kind_name(target),
            right: self.kind_name(index),
        }
    }

    /// Field slot of `name` in a user structure instance.
    fn field_slot(&self, target: Value, name: Symbol) -> FaultResult<(Handle, usize)> {
        let invalid = || FaultKind::InvalidField(self.bytecode.string(name).to_string());
        let handle = target.as_handle().ok_or_else(invalid)?;
        let Object::Structure { type_id, .. } = self.heap.get(handle)? else {
            return Err(invalid());
        };
        let index = self
            .bytecode
            .structure(*type_id)
            .and_then(|descriptor| descriptor.field_index(name))
            .ok_or_else(invalid)?;
        Ok((handle, index))
    }

    fn get_field(&mut self, target: Value, name: Symbol) -> FaultResult<Value> {
        if let Some(method) = self.native_method(target, self.bytecode.string(name)) {
            // Reading a native method yields a reference bound to its receiver.
            let receiver = target.as_handle();
            self.heap.retain(&target)?;
            let handle = self.heap.allocate(Object::Function(FunctionRef {
                target: FunctionTarget::Native(method),
                receiver,
            }));
            return Ok(Value::Object(handle));
        }

        let (handle, index) = self.field_slot(target, name)?;
        match self.heap.get(handle)? {
            Object::Structure { fields, .. } => fields
                .get(index)
                .copied()
                .ok_or_else(|| FaultKind::InvalidField(self.bytecode.string(name).to_string())),
            _ => Err(FaultKind::InvalidField(self.bytecode.string(name).to_string())),
        }
    }

    fn set_field(&mut self, target: Value, name: Symbol, value: Value) -> FaultResult<()> {
        let (handle, index) = self.field_slot(target, name)?;
        self.heap.set_element(handle, index, value)
    }

    /// Method `name` of a native structure instance, if `target` is one.
    pub(super) fn native_method(&self, target: Value, name: &str) -> Option<NativeFunction> {
        let Ok(Object::NativeStructure { kind, .. }) = self.heap.get(target.as_handle()?) else {
            return None;
        };
        let (_, definition) = self.native_structures.get_index(*kind)?;
        definition.methods.get(name).copied()
    }

    fn construct(&mut self, type_id: u32, arg_count: usize) -> FaultResult<()> {
        let mut fields: Vec<Value> = match self.bytecode.structure(type_id) {
            Some(descriptor) => descriptor
                .fields
                .iter()
                .map(|(_, kind)| default_value(*kind))
                .collect(),
            None => return Err(FaultKind::NotCallable("unknown structure")),
        };
        if arg_count > fields.len() {
            return Err(FaultKind::WrongArity {
                expected: fields.len(),
                got: arg_count,
            });
        }

        let arguments = self.pop_n(arg_count)?;
        for (field, argument) in fields.iter_mut().zip(arguments) {
            self.heap.retain(&argument)?;
            *field = argument;
        }
        let handle = self.heap.allocate(Object::Structure { type_id, fields });
        self.push(Value::Object(handle))
    }

    // ===== Collection =====

    /// Free unreachable objects. Anything on an operand stack is pinned.
    /// Returns the number of objects freed.
    pub fn collect_garbage(&mut self) -> usize {
        let pinned: HashSet<Handle> = self
            .frames
            .iter()
            .flat_map(|frame| frame.operands.iter())
            .filter_map(Value::as_handle)
            .collect();
        let freed = self.heap.sweep(&pinned);
        log::debug!(
            "gc: freed {} objects, {} live, {} pinned",
            freed,
            self.heap.len(),
            pinned.len()
        );
        freed
    }
}

/// Initial value of a structure field of the given kind.
fn default_value(kind: TypeAnnotation) -> Value {
    match kind {
        TypeAnnotation::Int => Value::Int(0),
        TypeAnnotation::UInt => Value::UInt(0),
        TypeAnnotation::Float => Value::Float(0.0),
        TypeAnnotation::Char => Value::Char(0),
        TypeAnnotation::Bool => Value::Bool(false),
        _ => Value::Null,
    }
}
