//! Abstract Syntax Tree for Sable.

pub mod expr;
pub mod stmt;
pub mod types;

pub use expr::{BinaryOp, Expr, ExprKind, UnaryOp};
pub use stmt::{
    Branch, BranchChain, FieldDecl, FunctionDecl, Parameter, Program, Stmt, StmtKind, TypeDecl,
};
pub use types::TypeAnnotation;
