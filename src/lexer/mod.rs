//! Lexer module for Sable.

pub mod pool;
pub mod scanner;
pub mod token;

pub use pool::{StringPool, Symbol};
pub use scanner::Scanner;
pub use token::{Token, TokenKind};
