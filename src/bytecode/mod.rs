//! Bytecode module for the Sable VM.
//!
//! - `instruction`: opcode set and the decoded [`Instruction`] form
//! - `chunk`: the [`Bytecode`] container with its function and structure tables
//! - `disassembler`: debug output for bytecode inspection

pub mod chunk;
pub mod disassembler;
pub mod instruction;

pub use chunk::{Bytecode, FunctionDescriptor, StructDescriptor};
pub use disassembler::{disassemble, disassemble_instruction, Disassembly};
pub use instruction::{Instruction, OpCode};
