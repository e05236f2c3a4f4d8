//! Bytecode instruction definitions for the Sable VM.
//!
//! Every instruction is one opcode byte followed by fixed-width operands.
//! Multi-byte operands are big-endian; jump operands are absolute byte
//! offsets into the program's code.

use std::fmt;

/// Opcodes for the bytecode virtual machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OpCode {
    // ============ Constants ============
    /// Push null
    PushNull = 0,
    /// Push true
    PushTrue,
    /// Push false
    PushFalse,
    /// PUSH_INT <value:i32>
    PushInt,
    /// PUSH_UINT <value:u32>
    PushUInt,
    /// PUSH_FLOAT <value:f32>
    PushFloat,
    /// PUSH_CHAR <value:u8>
    PushChar,
    /// PUSH_STRING <pool_index:u32>
    PushString,
    /// PUSH_FUNCTION <function_id:u32>
    PushFunction,

    // ============ Arithmetic ============
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Negate,

    // ============ Bitwise ============
    BitAnd,
    BitOr,
    BitXor,
    BitNot,
    Shl,
    Shr,

    // ============ Comparison ============
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,

    // ============ Logic ============
    And,
    Or,
    Not,

    // ============ Variables ============
    /// GET_LOCAL <slot:u8>
    GetLocal,
    /// SET_LOCAL <slot:u8>
    SetLocal,
    /// Pops a name string, pushes the global bound to it
    GetGlobal,
    /// Pops a name string, then the value to bind
    SetGlobal,

    // ============ Collections & Structures ============
    /// Pops index and array, pushes the element
    GetArray,
    /// Pops index, array, then value
    SetArray,
    /// GET_FIELD <name:u32>
    GetField,
    /// SET_FIELD <name:u32>; pops object, then value
    SetField,
    /// CREATE_ARRAY <count:u32>
    CreateArray,
    /// NEW <type_id:u32> <arg_count:u8>
    New,

    // ============ Calls ============
    /// METHOD_CALL <name:u32> <arg_count:u8>
    MethodCall,
    /// CALL <arg_count:u8>; the callee is on top of its arguments
    Call,
    /// CALL_LOCAL_FUNCTION <function_id:u32>
    CallLocalFunction,
    Return,
    ReturnValue,

    // ============ Control Flow ============
    /// JUMP <address:u32>
    Jump,
    /// JUMP_IF_FALSE <address:u32>; pops the condition
    JumpIfFalse,
    /// SHRINK_LOCAL <count:u8>
    ShrinkLocal,
    Pop,
    End,
}

const OPCODES: [OpCode; 50] = [
    OpCode::PushNull,
    OpCode::PushTrue,
    OpCode::PushFalse,
    OpCode::PushInt,
    OpCode::PushUInt,
    OpCode::PushFloat,
    OpCode::PushChar,
    OpCode::PushString,
    OpCode::PushFunction,
    OpCode::Add,
    OpCode::Sub,
    OpCode::Mul,
    OpCode::Div,
    OpCode::Mod,
    OpCode::Negate,
    OpCode::BitAnd,
    OpCode::BitOr,
    OpCode::BitXor,
    OpCode::BitNot,
    OpCode::Shl,
    OpCode::Shr,
    OpCode::Eq,
    OpCode::Ne,
    OpCode::Lt,
    OpCode::Gt,
    OpCode::Le,
    OpCode::Ge,
    OpCode::And,
    OpCode::Or,
    OpCode::Not,
    OpCode::GetLocal,
    OpCode::SetLocal,
    OpCode::GetGlobal,
    OpCode::SetGlobal,
    OpCode::GetArray,
    OpCode::SetArray,
    OpCode::GetField,
    OpCode::SetField,
    OpCode::CreateArray,
    OpCode::New,
    OpCode::MethodCall,
    OpCode::Call,
    OpCode::CallLocalFunction,
    OpCode::Return,
    OpCode::ReturnValue,
    OpCode::Jump,
    OpCode::JumpIfFalse,
    OpCode::ShrinkLocal,
    OpCode::Pop,
    OpCode::End,
];

impl OpCode {
    pub fn from_u8(byte: u8) -> Option<Self> {
        OPCODES.get(byte as usize).copied()
    }

    /// Number of operand bytes following the opcode.
    pub fn operand_size(self) -> usize {
        match self {
            OpCode::PushChar
            | OpCode::GetLocal
            | OpCode::SetLocal
            | OpCode::Call
            | OpCode::ShrinkLocal => 1,
            OpCode::PushInt
            | OpCode::PushUInt
            | OpCode::PushFloat
            | OpCode::PushString
            | OpCode::PushFunction
            | OpCode::GetField
            | OpCode::SetField
            | OpCode::CreateArray
            | OpCode::CallLocalFunction
            | OpCode::Jump
            | OpCode::JumpIfFalse => 4,
            OpCode::New | OpCode::MethodCall => 5,
            _ => 0,
        }
    }

    /// Total encoded width.
    pub fn width(self) -> usize {
        1 + self.operand_size()
    }

    pub fn name(self) -> &'static str {
        match self {
            OpCode::PushNull => "PUSH_NULL",
            OpCode::PushTrue => "PUSH_TRUE",
            OpCode::PushFalse => "PUSH_FALSE",
            OpCode::PushInt => "PUSH_INT",
            OpCode::PushUInt => "PUSH_UINT",
            OpCode::PushFloat => "PUSH_FLOAT",
            OpCode::PushChar => "PUSH_CHAR",
            OpCode::PushString => "PUSH_STRING",
            OpCode::PushFunction => "PUSH_FUNCTION",
            OpCode::Add => "ADD",
            OpCode::Sub => "SUB",
            OpCode::Mul => "MUL",
            OpCode::Div => "DIV",
            OpCode::Mod => "MOD",
            OpCode::Negate => "NEGATE",
            OpCode::BitAnd => "BIT_AND",
            OpCode::BitOr => "BIT_OR",
            OpCode::BitXor => "BIT_XOR",
            OpCode::BitNot => "BIT_NOT",
            OpCode::Shl => "SHL",
            OpCode::Shr => "SHR",
            OpCode::Eq => "EQ",
            OpCode::Ne => "NE",
            OpCode::Lt => "LT",
            OpCode::Gt => "GT",
            OpCode::Le => "LE",
            OpCode::Ge => "GE",
            OpCode::And => "AND",
            OpCode::Or => "OR",
            OpCode::Not => "NOT",
            OpCode::GetLocal => "GET_LOCAL",
            OpCode::SetLocal => "SET_LOCAL",
            OpCode::GetGlobal => "GET_GLOBAL",
            OpCode::SetGlobal => "SET_GLOBAL",
            OpCode::GetArray => "GET_ARRAY",
            OpCode::SetArray => "SET_ARRAY",
            OpCode::GetField => "GET_FIELD",
            OpCode::SetField => "SET_FIELD",
            OpCode::CreateArray => "CREATE_ARRAY",
            OpCode::New => "NEW",
            OpCode::MethodCall => "METHOD_CALL",
            OpCode::Call => "CALL",
            OpCode::CallLocalFunction => "CALL_LOCAL_FUNCTION",
            OpCode::Return => "RETURN",
            OpCode::ReturnValue => "RETURN_VALUE",
            OpCode::Jump => "JUMP",
            OpCode::JumpIfFalse => "JUMP_IF_FALSE",
            OpCode::ShrinkLocal => "SHRINK_LOCAL",
            OpCode::Pop => "POP",
            OpCode::End => "END",
        }
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A decoded instruction with its operands.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Instruction {
    PushNull,
    PushTrue,
    PushFalse,
    PushInt(i32),
    PushUInt(u32),
    PushFloat(f32),
    PushChar(u8),
    PushString(u32),
    PushFunction(u32),
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Negate,
    BitAnd,
    BitOr,
    BitXor,
    BitNot,
    Shl,
    Shr,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    And,
    Or,
    Not,
    GetLocal(u8),
    SetLocal(u8),
    GetGlobal,
    SetGlobal,
    GetArray,
    SetArray,
    GetField(u32),
    SetField(u32),
    CreateArray(u32),
    New { type_id: u32, arg_count: u8 },
    MethodCall { name: u32, arg_count: u8 },
    Call(u8),
    CallLocalFunction(u32),
    Return,
    ReturnValue,
    Jump(u32),
    JumpIfFalse(u32),
    ShrinkLocal(u8),
    Pop,
    End,
}

impl Instruction {
    pub fn opcode(&self) -> OpCode {
        match self {
            Instruction::PushNull => OpCode::PushNull,
            Instruction::PushTrue => OpCode::PushTrue,
            Instruction::PushFalse => OpCode::PushFalse,
            Instruction::PushInt(_) => OpCode::PushInt,
            Instruction::PushUInt(_) => OpCode::PushUInt,
            Instruction::PushFloat(_) => OpCode::PushFloat,
            Instruction::PushChar(_) => OpCode::PushChar,
            Instruction::PushString(_) => OpCode::PushString,
            Instruction::PushFunction(_) => OpCode::PushFunction,
            Instruction::Add => OpCode::Add,
            Instruction::Sub => OpCode::Sub,
            Instruction::Mul => OpCode::Mul,
            Instruction::Div => OpCode::Div,
            Instruction::Mod => OpCode::Mod,
            Instruction::Negate => OpCode::Negate,
            Instruction::BitAnd => OpCode::BitAnd,
            Instruction::BitOr => OpCode::BitOr,
            Instruction::BitXor => OpCode::BitXor,
            Instruction::BitNot => OpCode::BitNot,
            Instruction::Shl => OpCode::Shl,
            Instruction::Shr => OpCode::Shr,
            Instruction::Eq => OpCode::Eq,
            Instruction::Ne => OpCode::Ne,
            Instruction::Lt => OpCode::Lt,
            Instruction::Gt => OpCode::Gt,
            Instruction::Le => OpCode::Le,
            Instruction::Ge => OpCode::Ge,
            Instruction::And => OpCode::And,
            Instruction::Or => OpCode::Or,
            Instruction::Not => OpCode::Not,
            Instruction::GetLocal(_) => OpCode::GetLocal,
            Instruction::SetLocal(_) => OpCode::SetLocal,
            Instruction::GetGlobal => OpCode::GetGlobal,
            Instruction::SetGlobal => OpCode::SetGlobal,
            Instruction::GetArray => OpCode::GetArray,
            Instruction::SetArray => OpCode::SetArray,
            Instruction::GetField(_) => OpCode::GetField,
            Instruction::SetField(_) => OpCode::SetField,
            Instruction::CreateArray(_) => OpCode::CreateArray,
            Instruction::New { .. } => OpCode::New,
            Instruction::MethodCall { .. } => OpCode::MethodCall,
            Instruction::Call(_) => OpCode::Call,
            Instruction::CallLocalFunction(_) => OpCode::CallLocalFunction,
            Instruction::Return => OpCode::Return,
            Instruction::ReturnValue => OpCode::ReturnValue,
            Instruction::Jump(_) => OpCode::Jump,
            Instruction::JumpIfFalse(_) => OpCode::JumpIfFalse,
            Instruction::ShrinkLocal(_) => OpCode::ShrinkLocal,
            Instruction::Pop => OpCode::Pop,
            Instruction::End => OpCode::End,
        }
    }

    pub fn width(&self) -> usize {
        self.opcode().width()
    }

    /// Append the encoded bytes to `out`.
    pub fn encode(&self, out: &mut Vec<u8>) {
        out.push(self.opcode() as u8);
        match *self {
            Instruction::PushInt(n) => out.extend_from_slice(&n.to_be_bytes()),
            Instruction::PushFloat(n) => out.extend_from_slice(&n.to_be_bytes()),
            Instruction::PushChar(n)
            | Instruction::GetLocal(n)
            | Instruction::SetLocal(n)
            | Instruction::Call(n)
            | Instruction::ShrinkLocal(n) => out.push(n),
            Instruction::PushUInt(n)
            | Instruction::PushString(n)
            | Instruction::PushFunction(n)
            | Instruction::GetField(n)
            | Instruction::SetField(n)
            | Instruction::CreateArray(n)
            | Instruction::CallLocalFunction(n)
            | Instruction::Jump(n)
            | Instruction::JumpIfFalse(n) => out.extend_from_slice(&n.to_be_bytes()),
            Instruction::New {
                type_id: id,
                arg_count,
            }
            | Instruction::MethodCall {
                name: id,
                arg_count,
            } => {
                out.extend_from_slice(&id.to_be_bytes());
                out.push(arg_count);
            }
            _ => {}
        }
    }

    /// Decode the instruction at `offset`. `Err` carries the offending byte
    /// for an unknown opcode; `Ok(None)` means the operands run past the end.
    pub fn decode(code: &[u8], offset: usize) -> Result<Option<Instruction>, u8> {
        let Some(&byte) = code.get(offset) else {
            return Ok(None);
        };
        let op = OpCode::from_u8(byte).ok_or(byte)?;
        let Some(operands) = code.get(offset + 1..offset + op.width()) else {
            return Ok(None);
        };

        let u8_at = |i: usize| operands[i];
        let u32_at = |i: usize| {
            u32::from_be_bytes([operands[i], operands[i + 1], operands[i + 2], operands[i + 3]])
        };

        let instruction = match op {
            OpCode::PushNull => Instruction::PushNull,
            OpCode::PushTrue => Instruction::PushTrue,
            OpCode::PushFalse => Instruction::PushFalse,
            OpCode::PushInt => Instruction::PushInt(u32_at(0) as i32),
            OpCode::PushUInt => Instruction::PushUInt(u32_at(0)),
            OpCode::PushFloat => Instruction::PushFloat(f32::from_bits(u32_at(0))),
            OpCode::PushChar => Instruction::PushChar(u8_at(0)),
            OpCode::PushString => Instruction::PushString(u32_at(0)),
            OpCode::PushFunction => Instruction::PushFunction(u32_at(0)),
            OpCode::Add => Instruction::Add,
            OpCode::Sub => Instruction::Sub,
            OpCode::Mul => Instruction::Mul,
            OpCode::Div => Instruction::Div,
            OpCode::Mod => Instruction::Mod,
            OpCode::Negate => Instruction::Negate,
            OpCode::BitAnd => Instruction::BitAnd,
            OpCode::BitOr => Instruction::BitOr,
            OpCode::BitXor => Instruction::BitXor,
            OpCode::BitNot => Instruction::BitNot,
            OpCode::Shl => Instruction::Shl,
            OpCode::Shr => Instruction::Shr,
            OpCode::Eq => Instruction::Eq,
            OpCode::Ne => Instruction::Ne,
            OpCode::Lt => Instruction::Lt,
            OpCode::Gt => Instruction::Gt,
            OpCode::Le => Instruction::Le,
            OpCode::Ge => Instruction::Ge,
            OpCode::And => Instruction::And,
            OpCode::Or => Instruction::Or,
            OpCode::Not => Instruction::Not,
            OpCode::GetLocal => Instruction::GetLocal(u8_at(0)),
            OpCode::SetLocal => Instruction::SetLocal(u8_at(0)),
            OpCode::GetGlobal => Instruction::GetGlobal,
            OpCode::SetGlobal => Instruction::SetGlobal,
            OpCode::GetArray => Instruction::GetArray,
            OpCode::SetArray => Instruction::SetArray,
            OpCode::GetField => Instruction::GetField(u32_at(0)),
            OpCode::SetField => Instruction::SetField(u32_at(0)),
            OpCode::CreateArray => Instruction::CreateArray(u32_at(0)),
            OpCode::New => Instruction::New {
                type_id: u32_at(0),
                arg_count: u8_at(4),
            },
            OpCode::MethodCall => Instruction::MethodCall {
                name: u32_at(0),
                arg_count: u8_at(4),
            },
            OpCode::Call => Instruction::Call(u8_at(0)),
            OpCode::CallLocalFunction => Instruction::CallLocalFunction(u32_at(0)),
            OpCode::Return => Instruction::Return,
            OpCode::ReturnValue => Instruction::ReturnValue,
            OpCode::Jump => Instruction::Jump(u32_at(0)),
            OpCode::JumpIfFalse => Instruction::JumpIfFalse(u32_at(0)),
            OpCode::ShrinkLocal => Instruction::ShrinkLocal(u8_at(0)),
            OpCode::Pop => Instruction::Pop,
            OpCode::End => Instruction::End,
        };
        Ok(Some(instruction))
    }

    /// Decode a whole byte stream into `(offset, instruction)` pairs.
    /// Stops at the first byte that does not start a complete instruction.
    pub fn decode_all(code: &[u8]) -> Vec<(usize, Instruction)> {
        let mut out = Vec::new();
        let mut offset = 0;
        while let Ok(Some(instruction)) = Instruction::decode(code, offset) {
            out.push((offset, instruction));
            offset += instruction.width();
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_table_matches_discriminants() {
        for (i, op) in OPCODES.iter().enumerate() {
            assert_eq!(*op as u8 as usize, i, "{} is out of place", op);
        }
        assert_eq!(OpCode::from_u8(OPCODES.len() as u8), None);
    }

    #[test]
    fn test_operands_are_big_endian() {
        let mut out = Vec::new();
        Instruction::PushInt(0x0102_0304).encode(&mut out);
        Instruction::MethodCall {
            name: 7,
            arg_count: 2,
        }
        .encode(&mut out);
        assert_eq!(
            out,
            vec![
                OpCode::PushInt as u8,
                1,
                2,
                3,
                4,
                OpCode::MethodCall as u8,
                0,
                0,
                0,
                7,
                2
            ]
        );
    }

    #[test]
    fn test_encoded_width_matches_operand_size() {
        let samples = [
            Instruction::PushNull,
            Instruction::PushFloat(1.5),
            Instruction::PushChar(b'x'),
            Instruction::GetLocal(3),
            Instruction::New {
                type_id: 1,
                arg_count: 2,
            },
            Instruction::JumpIfFalse(99),
        ];
        for instruction in samples {
            let mut out = Vec::new();
            instruction.encode(&mut out);
            assert_eq!(out.len(), instruction.width());
            assert_eq!(Instruction::decode(&out, 0), Ok(Some(instruction)));
        }
    }

    #[test]
    fn test_decode_rejects_unknown_and_truncated() {
        assert_eq!(Instruction::decode(&[0xEE], 0), Err(0xEE));
        assert_eq!(
            Instruction::decode(&[OpCode::Jump as u8, 0, 0], 0),
            Ok(None)
        );
    }
}
