//! The compiled program: code, string pool, and descriptor tables.

use crate::ast::TypeAnnotation;
use crate::bytecode::instruction::{Instruction, OpCode};
use crate::lexer::{StringPool, Symbol};
use crate::span::Span;

/// A compiled function's entry in the function table.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDescriptor {
    pub name: Symbol,
    pub params: Vec<(Symbol, TypeAnnotation)>,
    /// Byte offset of the first instruction of the body.
    pub offset: usize,
}

impl FunctionDescriptor {
    pub fn arity(&self) -> usize {
        self.params.len()
    }
}

/// A user structure's entry in the structure table.
#[derive(Debug, Clone, PartialEq)]
pub struct StructDescriptor {
    pub name: Symbol,
    pub fields: Vec<(Symbol, TypeAnnotation)>,
}

impl StructDescriptor {
    /// Slot of the field called `name`.
    pub fn field_index(&self, name: Symbol) -> Option<usize> {
        self.fields.iter().position(|(field, _)| *field == name)
    }
}

/// A complete compiled program, produced and consumed in-process.
#[derive(Debug, Clone, Default)]
pub struct Bytecode {
    pub strings: StringPool,
    pub code: Vec<u8>,
    pub functions: Vec<FunctionDescriptor>,
    pub structs: Vec<StructDescriptor>,
    /// `(offset, span)` pairs, ascending by offset.
    pub positions: Vec<(usize, Span)>,
}

impl Bytecode {
    pub fn new(strings: StringPool) -> Self {
        Self {
            strings,
            ..Self::default()
        }
    }

    pub fn len(&self) -> usize {
        self.code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    pub fn read_u8(&self, offset: usize) -> Option<u8> {
        self.code.get(offset).copied()
    }

    pub fn read_u32(&self, offset: usize) -> Option<u32> {
        let bytes = self.code.get(offset..offset + 4)?;
        Some(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn read_i32(&self, offset: usize) -> Option<i32> {
        self.read_u32(offset).map(|n| n as i32)
    }

    pub fn read_f32(&self, offset: usize) -> Option<f32> {
        self.read_u32(offset).map(f32::from_bits)
    }

    pub fn opcode_at(&self, offset: usize) -> Option<OpCode> {
        self.read_u8(offset).and_then(OpCode::from_u8)
    }

    /// Decode every instruction in order.
    pub fn instructions(&self) -> Vec<(usize, Instruction)> {
        Instruction::decode_all(&self.code)
    }

    /// Source span of the statement or expression that emitted `offset`.
    pub fn span_at(&self, offset: usize) -> Option<Span> {
        let index = self.positions.partition_point(|(at, _)| *at <= offset);
        index.checked_sub(1).map(|i| self.positions[i].1)
    }

    pub fn string(&self, symbol: Symbol) -> &str {
        self.strings.name(symbol)
    }

    pub fn function(&self, id: u32) -> Option<&FunctionDescriptor> {
        self.functions.get(id as usize)
    }

    /// The function whose body contains `offset`, if any.
    pub fn function_at(&self, offset: usize) -> Option<&FunctionDescriptor> {
        self.functions
            .iter()
            .filter(|f| f.offset <= offset)
            .max_by_key(|f| f.offset)
    }

    pub fn structure(&self, id: u32) -> Option<&StructDescriptor> {
        self.structs.get(id as usize)
    }
}
