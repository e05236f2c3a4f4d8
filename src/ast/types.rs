//! Type annotation AST nodes.
//!
//! Annotations are informational: the VM is dynamically typed and only
//! structure fields use their declared kind, to pick a default value.

use std::fmt;

use crate::lexer::Symbol;

/// A declared parameter, return, or field kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TypeAnnotation {
    Int,
    UInt,
    Float,
    Char,
    Bool,
    String,
    Array,
    #[default]
    Any,
    /// A user-declared structure type.
    Named(Symbol),
}

impl TypeAnnotation {
    /// Map a builtin type name; anything else is a structure name.
    pub fn from_name(name: &str, symbol: Symbol) -> Self {
        match name {
            "int" => TypeAnnotation::Int,
            "uint" => TypeAnnotation::UInt,
            "float" => TypeAnnotation::Float,
            "char" => TypeAnnotation::Char,
            "bool" => TypeAnnotation::Bool,
            "string" => TypeAnnotation::String,
            "array" => TypeAnnotation::Array,
            "any" => TypeAnnotation::Any,
            _ => TypeAnnotation::Named(symbol),
        }
    }
}

impl fmt::Display for TypeAnnotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeAnnotation::Int => write!(f, "int"),
            TypeAnnotation::UInt => write!(f, "uint"),
            TypeAnnotation::Float => write!(f, "float"),
            TypeAnnotation::Char => write!(f, "char"),
            TypeAnnotation::Bool => write!(f, "bool"),
            TypeAnnotation::String => write!(f, "string"),
            TypeAnnotation::Array => write!(f, "array"),
            TypeAnnotation::Any => write!(f, "any"),
            TypeAnnotation::Named(symbol) => write!(f, "type#{}", symbol),
        }
    }
}
