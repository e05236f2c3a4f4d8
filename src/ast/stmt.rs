//! Statement AST nodes.

use crate::ast::expr::{BinaryOp, Expr};
use crate::ast::types::TypeAnnotation;
use crate::lexer::Symbol;
use crate::span::Span;

/// A statement in the AST.
#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

impl Stmt {
    pub fn new(kind: StmtKind, span: Span) -> Self {
        Self { kind, span }
    }
}

/// Statement variants.
#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    /// Expression statement: expr;
    Expression(Expr),

    /// Variable declaration: let x = expr;
    Let { name: Symbol, initializer: Expr },

    /// Assignment: target = value; target op= value;
    Assign {
        target: Expr,
        operator: Option<BinaryOp>,
        value: Expr,
    },

    /// Block: { statements }
    Block(Vec<Stmt>),

    /// if / elif* / else?
    If(BranchChain),

    /// While loop: while (cond) { ... }
    While { condition: Expr, body: Vec<Stmt> },

    Break,
    Continue,

    /// Return statement: return expr;
    Return(Option<Expr>),

    /// Function declaration (top level only)
    Function(FunctionDecl),

    /// Structure declaration (top level only)
    Type(TypeDecl),
}

/// One guarded body of an `if` chain.
#[derive(Debug, Clone, PartialEq)]
pub struct Branch {
    pub condition: Expr,
    pub body: Vec<Stmt>,
    pub span: Span,
}

/// `if` branch, its `elif` branches, and an optional `else` block.
#[derive(Debug, Clone, PartialEq)]
pub struct BranchChain {
    pub primary: Branch,
    pub elifs: Vec<Branch>,
    pub else_block: Option<Vec<Stmt>>,
}

impl BranchChain {
    /// The primary branch followed by every `elif`, in source order.
    pub fn branches(&self) -> impl Iterator<Item = &Branch> {
        std::iter::once(&self.primary).chain(self.elifs.iter())
    }
}

/// A function parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: Symbol,
    pub type_annotation: TypeAnnotation,
    pub span: Span,
}

/// Function declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDecl {
    pub name: Symbol,
    pub params: Vec<Parameter>,
    pub return_type: Option<TypeAnnotation>,
    pub body: Vec<Stmt>,
    pub span: Span,
}

/// A structure field declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDecl {
    pub name: Symbol,
    pub kind: TypeAnnotation,
    pub span: Span,
}

/// Structure declaration: type Name { field: kind, ... }
#[derive(Debug, Clone, PartialEq)]
pub struct TypeDecl {
    pub name: Symbol,
    pub fields: Vec<FieldDecl>,
    pub span: Span,
}

/// A complete program.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub statements: Vec<Stmt>,
}

impl Program {
    pub fn new(statements: Vec<Stmt>) -> Self {
        Self { statements }
    }

    pub fn functions(&self) -> impl Iterator<Item = &FunctionDecl> {
        self.statements.iter().filter_map(|stmt| match &stmt.kind {
            StmtKind::Function(decl) => Some(decl),
            _ => None,
        })
    }

    pub fn types(&self) -> impl Iterator<Item = &TypeDecl> {
        self.statements.iter().filter_map(|stmt| match &stmt.kind {
            StmtKind::Type(decl) => Some(decl),
            _ => None,
        })
    }
}
