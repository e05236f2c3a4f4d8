//! Operator priorities for precedence climbing.

use crate::ast::BinaryOp;
use crate::lexer::TokenKind;

/// Binary operator priority (higher = tighter binding).
///
/// Comparisons bind loosest, so `a < b || c` reads as `a < (b || c)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
    None = 0,
    Comparison = 1, // == != < > <= >=
    Or = 2,         // ||
    And = 3,        // &&
    BitOr = 4,      // |
    BitXor = 5,     // ^
    BitAnd = 6,     // &
    Shift = 7,      // << >>
    Term = 8,       // + -
    Factor = 9,     // * / %
    Unary = 10,     // operands of * / %
}

impl Precedence {
    pub fn next(self) -> Precedence {
        match self {
            Precedence::None => Precedence::Comparison,
            Precedence::Comparison => Precedence::Or,
            Precedence::Or => Precedence::And,
            Precedence::And => Precedence::BitOr,
            Precedence::BitOr => Precedence::BitXor,
            Precedence::BitXor => Precedence::BitAnd,
            Precedence::BitAnd => Precedence::Shift,
            Precedence::Shift => Precedence::Term,
            Precedence::Term => Precedence::Factor,
            Precedence::Factor => Precedence::Unary,
            Precedence::Unary => Precedence::Unary,
        }
    }
}

/// The binary operator spelled by `kind`, with its priority.
pub fn binary_operator(kind: &TokenKind) -> Option<(BinaryOp, Precedence)> {
    let entry = match kind {
        TokenKind::EqualEqual => (BinaryOp::Equal, Precedence::Comparison),
        TokenKind::BangEqual => (BinaryOp::NotEqual, Precedence::Comparison),
        TokenKind::Less => (BinaryOp::Less, Precedence::Comparison),
        TokenKind::Greater => (BinaryOp::Greater, Precedence::Comparison),
        TokenKind::LessEqual => (BinaryOp::LessEqual, Precedence::Comparison),
        TokenKind::GreaterEqual => (BinaryOp::GreaterEqual, Precedence::Comparison),
        TokenKind::OrOr => (BinaryOp::Or, Precedence::Or),
        TokenKind::AndAnd => (BinaryOp::And, Precedence::And),
        TokenKind::Pipe => (BinaryOp::BitOr, Precedence::BitOr),
        TokenKind::Caret => (BinaryOp::BitXor, Precedence::BitXor),
        TokenKind::Ampersand => (BinaryOp::BitAnd, Precedence::BitAnd),
        TokenKind::ShiftLeft => (BinaryOp::ShiftLeft, Precedence::Shift),
        TokenKind::ShiftRight => (BinaryOp::ShiftRight, Precedence::Shift),
        TokenKind::Plus => (BinaryOp::Add, Precedence::Term),
        TokenKind::Minus => (BinaryOp::Subtract, Precedence::Term),
        TokenKind::Star => (BinaryOp::Multiply, Precedence::Factor),
        TokenKind::Slash => (BinaryOp::Divide, Precedence::Factor),
        TokenKind::Percent => (BinaryOp::Modulo, Precedence::Factor),
        _ => return None,
    };
    Some(entry)
}

/// For an assignment token, the operator it folds in (`None` for plain `=`).
pub fn assignment_operator(kind: &TokenKind) -> Option<Option<BinaryOp>> {
    let op = match kind {
        TokenKind::Equal => None,
        TokenKind::PlusEqual => Some(BinaryOp::Add),
        TokenKind::MinusEqual => Some(BinaryOp::Subtract),
        TokenKind::StarEqual => Some(BinaryOp::Multiply),
        TokenKind::SlashEqual => Some(BinaryOp::Divide),
        TokenKind::PercentEqual => Some(BinaryOp::Modulo),
        TokenKind::AmpersandEqual => Some(BinaryOp::BitAnd),
        TokenKind::PipeEqual => Some(BinaryOp::BitOr),
        TokenKind::CaretEqual => Some(BinaryOp::BitXor),
        TokenKind::ShiftLeftEqual => Some(BinaryOp::ShiftLeft),
        TokenKind::ShiftRightEqual => Some(BinaryOp::ShiftRight),
        _ => return None,
    };
    Some(op)
}
