//! Runtime values.

use std::fmt;

use crate::error::FaultKind;

use super::heap::Handle;
use super::machine::Machine;

/// Host routine callable from bytecode.
///
/// Receives the argument count; the arguments are the top `argc` operands
/// of the current frame, last argument on top. A native pops all of them
/// and pushes at most one result.
pub type NativeFn = fn(&mut Machine, usize) -> Result<(), FaultKind>;

#[derive(Clone, Copy)]
pub struct NativeFunction {
    pub name: &'static str,
    pub func: NativeFn,
}

impl NativeFunction {
    pub fn new(name: &'static str, func: NativeFn) -> Self {
        Self { name, func }
    }
}

impl PartialEq for NativeFunction {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<native {}>", self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i32),
    UInt(u32),
    Float(f32),
    Char(u8),
    Object(Handle),
    Native(NativeFunction),
}

impl Value {
    /// `null`, `false` and numeric zero are falsy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::UInt(n) => *n != 0,
            Value::Float(n) => *n != 0.0,
            Value::Char(c) => *c != 0,
            Value::Object(_) | Value::Native(_) => true,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::UInt(_) => "uint",
            Value::Float(_) => "float",
            Value::Char(_) => "char",
            Value::Object(_) => "object",
            Value::Native(_) => "native function",
        }
    }

    pub fn as_handle(&self) -> Option<Handle> {
        match self {
            Value::Object(handle) => Some(*handle),
            _ => None,
        }
    }

    /// Integer view of an index-like value.
    pub fn as_index(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n as i64),
            Value::UInt(n) => Some(*n as i64),
            Value::Char(c) => Some(*c as i64),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truthiness() {
        assert!(!Value::Null.is_truthy());
        assert!(!Value::Int(0).is_truthy());
        assert!(!Value::Float(0.0).is_truthy());
        assert!(!Value::Char(0).is_truthy());
        assert!(Value::UInt(3).is_truthy());
        assert!(Value::Bool(true).is_truthy());
    }

    #[test]
    fn test_index_view() {
        assert_eq!(Value::Int(-1).as_index(), Some(-1));
        assert_eq!(Value::Char(b'a').as_index(), Some(97));
        assert_eq!(Value::Float(1.0).as_index(), None);
    }
}
