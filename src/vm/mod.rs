//! Stack VM executing compiled bytecode over a reference-counted heap.

pub mod calls;
pub mod heap;
pub mod machine;
pub mod natives;
pub mod ops;
pub mod value;

#[cfg(test)]
mod tests;

pub use heap::{FunctionRef, FunctionTarget, Handle, Heap, HeapStats, Object};
pub use machine::{FaultResult, Frame, Machine, MachineConfig, StepState};
pub use natives::NativeStructureDef;
pub use value::{NativeFn, NativeFunction, Value};
