//! Expression AST nodes.

use std::fmt;

use crate::lexer::Symbol;
use crate::span::Span;

/// An expression in the AST.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

impl Expr {
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Self { kind, span }
    }

    /// Whether this expression names a storage location.
    pub fn is_assignable(&self) -> bool {
        matches!(
            self.kind,
            ExprKind::Variable(_) | ExprKind::Index { .. } | ExprKind::Field { .. }
        )
    }
}

/// All expression variants.
#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    /// Integer literal: 42, 0x2A
    IntLiteral(i32),
    /// Unsigned literal: 42u
    UIntLiteral(u32),
    /// Float literal: 3.14, 2f
    FloatLiteral(f32),
    /// Char literal: 'a'
    CharLiteral(u8),
    /// String literal, interned
    StringLiteral(Symbol),
    /// true / false
    BoolLiteral(bool),
    /// null
    Null,

    /// Variable reference
    Variable(Symbol),

    /// Binary operation: a + b
    Binary {
        left: Box<Expr>,
        operator: BinaryOp,
        right: Box<Expr>,
    },

    /// Unary operation: -a, !a, ~a
    Unary {
        operator: UnaryOp,
        operand: Box<Expr>,
    },

    /// Array literal: [1, 2, 3]
    Array(Vec<Expr>),

    /// Element access: a[i]
    Index { object: Box<Expr>, index: Box<Expr> },

    /// Field access: p.x
    Field { object: Box<Expr>, name: Symbol },

    /// Function call: f(a, b)
    Call {
        callee: Box<Expr>,
        arguments: Vec<Expr>,
    },

    /// Method call: list.push(x)
    MethodCall {
        object: Box<Expr>,
        name: Symbol,
        arguments: Vec<Expr>,
    },

    /// Structure construction: Point(1, 2)
    Construct {
        type_name: Symbol,
        arguments: Vec<Expr>,
    },
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    BitAnd,
    BitOr,
    BitXor,
    ShiftLeft,
    ShiftRight,
    And,
    Or,
    Equal,
    NotEqual,
    Less,
    Greater,
    LessEqual,
    GreaterEqual,
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BinaryOp::Add => "+",
            BinaryOp::Subtract => "-",
            BinaryOp::Multiply => "*",
            BinaryOp::Divide => "/",
            BinaryOp::Modulo => "%",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
            BinaryOp::ShiftLeft => "<<",
            BinaryOp::ShiftRight => ">>",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
            BinaryOp::Equal => "==",
            BinaryOp::NotEqual => "!=",
            BinaryOp::Less => "<",
            BinaryOp::Greater => ">",
            BinaryOp::LessEqual => "<=",
            BinaryOp::GreaterEqual => ">=",
        };
        write!(f, "{}", s)
    }
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Negate,
    Not,
    BitNot,
}
