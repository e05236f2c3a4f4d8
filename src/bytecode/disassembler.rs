//! Bytecode disassembler for debugging.

use std::fmt::{self, Write};

use crate::bytecode::chunk::Bytecode;
use crate::bytecode::instruction::Instruction;

/// Human-readable listing of a whole program.
pub struct Disassembly<'a>(pub &'a Bytecode);

/// Disassemble a program into human-readable output.
pub fn disassemble(bytecode: &Bytecode) -> String {
    Disassembly(bytecode).to_string()
}

impl fmt::Display for Disassembly<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bytecode = self.0;
        writeln!(f, "== main ==")?;

        let mut offset = 0;
        while offset < bytecode.code.len() {
            if let Some((id, function)) = bytecode
                .functions
                .iter()
                .enumerate()
                .find(|(_, function)| function.offset == offset)
            {
                let params: Vec<_> = function
                    .params
                    .iter()
                    .map(|(name, kind)| format!("{}: {}", bytecode.string(*name), kind))
                    .collect();
                writeln!(
                    f,
                    "== #{} {}({}) ==",
                    id,
                    bytecode.string(function.name),
                    params.join(", ")
                )?;
            }
            offset = disassemble_instruction(bytecode, offset, f)?;
        }

        if !bytecode.structs.is_empty() {
            writeln!(f, "== structures ==")?;
            for (id, structure) in bytecode.structs.iter().enumerate() {
                let fields: Vec<_> = structure
                    .fields
                    .iter()
                    .map(|(name, kind)| format!("{}: {}", bytecode.string(*name), kind))
                    .collect();
                writeln!(
                    f,
                    "#{} {} {{ {} }}",
                    id,
                    bytecode.string(structure.name),
                    fields.join(", ")
                )?;
            }
        }

        Ok(())
    }
}

/// Disassemble a single instruction; returns the offset of the next one.
pub fn disassemble_instruction(
    bytecode: &Bytecode,
    offset: usize,
    out: &mut impl Write,
) -> Result<usize, fmt::Error> {
    write!(out, "{:04} ", offset)?;

    let instruction = match Instruction::decode(&bytecode.code, offset) {
        Ok(Some(instruction)) => instruction,
        Ok(None) => {
            writeln!(out, "<truncated>")?;
            return Ok(bytecode.code.len());
        }
        Err(byte) => {
            writeln!(out, "Unknown opcode {}", byte)?;
            return Ok(offset + 1);
        }
    };

    let name = instruction.opcode().name();
    let function_name = |id: u32| {
        bytecode
            .function(id)
            .map(|function| bytecode.string(function.name))
            .unwrap_or("?")
    };

    match instruction {
        Instruction::PushInt(n) => writeln!(out, "{:<20} {}", name, n)?,
        Instruction::PushUInt(n) => writeln!(out, "{:<20} {}u", name, n)?,
        Instruction::PushFloat(n) => writeln!(out, "{:<20} {:?}", name, n)?,
        Instruction::PushChar(c) => writeln!(out, "{:<20} {:?}", name, c as char)?,
        Instruction::PushString(id) => {
            writeln!(out, "{:<20} {:4} {:?}", name, id, bytecode.string(id))?
        }
        Instruction::GetField(id) | Instruction::SetField(id) => {
            writeln!(out, "{:<20} {:4} '{}'", name, id, bytecode.string(id))?
        }
        Instruction::PushFunction(id) | Instruction::CallLocalFunction(id) => {
            writeln!(out, "{:<20} {:4} ({})", name, id, function_name(id))?
        }
        Instruction::GetLocal(n)
        | Instruction::SetLocal(n)
        | Instruction::Call(n)
        | Instruction::ShrinkLocal(n) => writeln!(out, "{:<20} {:4}", name, n)?,
        Instruction::CreateArray(n) => writeln!(out, "{:<20} {:4}", name, n)?,
        Instruction::Jump(target) | Instruction::JumpIfFalse(target) => {
            writeln!(out, "{:<20} -> {:04}", name, target)?
        }
        Instruction::New {
            type_id,
            arg_count,
        } => {
            let type_name = bytecode
                .structure(type_id)
                .map(|s| bytecode.string(s.name))
                .unwrap_or("?");
            writeln!(out, "{:<20} {:4} ({}) args={}", name, type_id, type_name, arg_count)?
        }
        Instruction::MethodCall {
            name: method,
            arg_count,
        } => writeln!(
            out,
            "{:<20} {:4} '{}' args={}",
            name,
            method,
            bytecode.string(method),
            arg_count
        )?,
        _ => writeln!(out, "{}", name)?,
    }

    Ok(offset + instruction.width())
}
