//! Parser module for Sable.

mod core;
mod declarations;
mod expressions;
mod precedence;
mod statements;

#[cfg(test)]
mod tests;

pub use self::core::{ParseResult, Parser};
