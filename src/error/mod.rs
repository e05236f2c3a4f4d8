//! Error types for all compilation phases and for the virtual machine.

use crate::span::Span;
use thiserror::Error;

/// Lexer errors.
#[derive(Debug, Error)]
pub enum LexerError {
    #[error("Unexpected character '{0}' at {1}")]
    UnexpectedChar(char, Span),

    #[error("Unterminated string at {0}")]
    UnterminatedString(Span),

    #[error("Malformed character literal at {0}")]
    InvalidChar(Span),

    #[error("Invalid escape sequence '\\{0}' at {1}")]
    InvalidEscape(char, Span),

    #[error("Number '{0}' is out of range at {1}")]
    NumberOutOfRange(String, Span),
}

impl LexerError {
    pub fn unexpected_char(c: char, span: Span) -> Self {
        Self::UnexpectedChar(c, span)
    }

    pub fn unterminated_string(span: Span) -> Self {
        Self::UnterminatedString(span)
    }

    pub fn invalid_char(span: Span) -> Self {
        Self::InvalidChar(span)
    }

    pub fn invalid_escape(c: char, span: Span) -> Self {
        Self::InvalidEscape(c, span)
    }

    pub fn number_out_of_range(s: impl Into<String>, span: Span) -> Self {
        Self::NumberOutOfRange(s.into(), span)
    }

    pub fn span(&self) -> Span {
        match self {
            Self::UnexpectedChar(_, span) => *span,
            Self::UnterminatedString(span) => *span,
            Self::InvalidChar(span) => *span,
            Self::InvalidEscape(_, span) => *span,
            Self::NumberOutOfRange(_, span) => *span,
        }
    }
}

/// Parser errors.
#[derive(Debug, Error)]
pub enum ParserError {
    #[error("Unexpected token '{found}', expected {expected} at {span}")]
    UnexpectedToken {
        expected: String,
        found: String,
        span: Span,
    },

    #[error("Unexpected end of file at {0}")]
    UnexpectedEof(Span),

    #[error("Invalid assignment target at {0}")]
    InvalidAssignmentTarget(Span),

    #[error("{message} at {span}")]
    General { message: String, span: Span },
}

impl ParserError {
    pub fn unexpected_token(
        expected: impl Into<String>,
        found: impl Into<String>,
        span: Span,
    ) -> Self {
        Self::UnexpectedToken {
            expected: expected.into(),
            found: found.into(),
            span,
        }
    }

    pub fn unexpected_eof(span: Span) -> Self {
        Self::UnexpectedEof(span)
    }

    pub fn invalid_assignment_target(span: Span) -> Self {
        Self::InvalidAssignmentTarget(span)
    }

    pub fn general(message: impl Into<String>, span: Span) -> Self {
        Self::General {
            message: message.into(),
            span,
        }
    }

    pub fn span(&self) -> Span {
        match self {
            Self::UnexpectedToken { span, .. } => *span,
            Self::UnexpectedEof(span) => *span,
            Self::InvalidAssignmentTarget(span) => *span,
            Self::General { span, .. } => *span,
        }
    }
}

/// Bytecode compilation errors.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("Function '{0}' is already defined at {1}")]
    DuplicateFunction(String, Span),

    #[error("Type '{0}' is already defined at {1}")]
    DuplicateType(String, Span),

    #[error("Unknown type '{0}' at {1}")]
    UnknownType(String, Span),

    #[error("Variable '{0}' is already declared in this block at {1}")]
    DuplicateVariable(String, Span),

    #[error("'break' outside of a loop at {0}")]
    BreakOutsideLoop(Span),

    #[error("'continue' outside of a loop at {0}")]
    ContinueOutsideLoop(Span),

    #[error("Too many local variables in one function at {0}")]
    TooManyLocals(Span),

    #[error("Wrong number of arguments to '{name}': expected {expected}, got {got} at {span}")]
    WrongArity {
        name: String,
        expected: usize,
        got: usize,
        span: Span,
    },

    #[error("{message} at {span}")]
    General { message: String, span: Span },
}

impl CompileError {
    pub fn new(message: impl Into<String>, span: Span) -> Self {
        Self::General {
            message: message.into(),
            span,
        }
    }

    pub fn wrong_arity(name: impl Into<String>, expected: usize, got: usize, span: Span) -> Self {
        Self::WrongArity {
            name: name.into(),
            expected,
            got,
            span,
        }
    }

    pub fn span(&self) -> Span {
        match self {
            Self::DuplicateFunction(_, span) => *span,
            Self::DuplicateType(_, span) => *span,
            Self::UnknownType(_, span) => *span,
            Self::DuplicateVariable(_, span) => *span,
            Self::BreakOutsideLoop(span) => *span,
            Self::ContinueOutsideLoop(span) => *span,
            Self::TooManyLocals(span) => *span,
            Self::WrongArity { span, .. } => *span,
            Self::General { span, .. } => *span,
        }
    }
}

/// The reason a running program stopped.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FaultKind {
    #[error("no field '{0}' on this value")]
    InvalidField(String),

    #[error("no method '{0}' on this value")]
    InvalidMethod(String),

    #[error("index {index} out of bounds (length {length})")]
    IndexOutOfBounds { index: i64, length: usize },

    #[error("stack underflow")]
    StackUnderflow,

    #[error("local slot {0} is not live")]
    InvalidLocal(u8),

    #[error("native '{native}' expected {expected}, got {found}")]
    NativeArgument {
        native: &'static str,
        expected: &'static str,
        found: &'static str,
    },

    #[error("unknown native structure '{0}'")]
    UnknownNativeStructure(String),

    #[error("undefined global '{0}'")]
    UndefinedGlobal(String),

    #[error("cannot apply '{op}' to {left} and {right}")]
    TypeMismatch {
        op: &'static str,
        left: &'static str,
        right: &'static str,
    },

    #[error("division by zero")]
    DivisionByZero,

    #[error("{0} is not callable")]
    NotCallable(&'static str),

    #[error("wrong number of arguments: expected {expected}, got {got}")]
    WrongArity { expected: usize, got: usize },

    #[error("invalid opcode {0:#04x}")]
    InvalidOpcode(u8),

    #[error("truncated instruction")]
    TruncatedInstruction,

    #[error("reference to a collected object")]
    StaleHandle,

    #[error("call depth exceeded {0}")]
    CallDepthExceeded(usize),
}

/// A fault raised while executing bytecode, tagged with where it happened.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{kind} at offset {pc:04}")]
pub struct RuntimeFault {
    pub kind: FaultKind,
    pub pc: usize,
    pub span: Option<Span>,
}

impl RuntimeFault {
    pub fn new(kind: FaultKind, pc: usize, span: Option<Span>) -> Self {
        Self { kind, pc, span }
    }

    pub fn span(&self) -> Option<Span> {
        self.span
    }
}

/// A unified error type for all phases.
#[derive(Debug, Error)]
pub enum SableError {
    #[error("Lexer error: {0}")]
    Lexer(#[from] LexerError),

    #[error("Parser error: {0}")]
    Parser(#[from] ParserError),

    #[error("Compile error: {0}")]
    Compile(#[from] CompileError),

    #[error("Runtime error: {0}")]
    Runtime(#[from] RuntimeFault),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SableError {
    /// Source position of the error, when one is known.
    pub fn span(&self) -> Option<Span> {
        match self {
            Self::Lexer(e) => Some(e.span()),
            Self::Parser(e) => Some(e.span()),
            Self::Compile(e) => Some(e.span()),
            Self::Runtime(e) => e.span(),
            Self::Io(_) => None,
        }
    }
}
