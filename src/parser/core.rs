//! Core parser struct and helper methods.

use std::collections::HashSet;

use crate::ast::*;
use crate::error::ParserError;
use crate::lexer::{StringPool, Symbol, Token, TokenKind};
use crate::span::Span;

pub type ParseResult<T> = Result<T, ParserError>;

/// The parser for Sable.
pub struct Parser<'a> {
    pub(crate) tokens: Vec<Token>,
    pub(crate) current: usize,
    pub(crate) pool: &'a StringPool,
    /// Structure names declared so far; `Name(...)` on one of these is a construction.
    pub(crate) declared_types: HashSet<Symbol>,
}

impl<'a> Parser<'a> {
    pub fn new(tokens: Vec<Token>, pool: &'a StringPool) -> Self {
        Self {
            tokens,
            current: 0,
            pool,
            declared_types: HashSet::new(),
        }
    }

    /// Parse a complete program.
    ///
    /// Function and type declarations are only accepted here, never inside
    /// a block.
    pub fn parse(&mut self) -> ParseResult<Program> {
        let mut statements = Vec::new();

        while !self.is_at_end() {
            let stmt = if self.check(&TokenKind::Func) {
                self.function_declaration()?
            } else if self.check(&TokenKind::Type) {
                self.type_declaration()?
            } else {
                self.statement()?
            };
            statements.push(stmt);
        }

        log::debug!("parsed {} top-level statements", statements.len());
        Ok(Program::new(statements))
    }

    // ===== Token manipulation =====

    pub(crate) fn advance(&mut self) -> Token {
        if !self.is_at_end() {
            self.current += 1;
        }
        self.tokens[self.current.saturating_sub(1)]
    }

    pub(crate) fn peek(&self) -> &Token {
        &self.tokens[self.current]
    }

    pub(crate) fn previous(&self) -> &Token {
        &self.tokens[self.current.saturating_sub(1)]
    }

    pub(crate) fn is_at_end(&self) -> bool {
        self.peek().kind == TokenKind::Eof
    }

    pub(crate) fn check(&self, kind: &TokenKind) -> bool {
        if self.is_at_end() {
            false
        } else {
            std::mem::discriminant(&self.peek().kind) == std::mem::discriminant(kind)
        }
    }

    pub(crate) fn match_token(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    pub(crate) fn expect(&mut self, kind: &TokenKind) -> ParseResult<Token> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(self.error_expected(format!("'{}'", kind)))
        }
    }

    pub(crate) fn expect_identifier(&mut self) -> ParseResult<Symbol> {
        match self.peek().kind {
            TokenKind::Identifier(symbol) => {
                self.advance();
                Ok(symbol)
            }
            _ => Err(self.error_expected("identifier")),
        }
    }

    /// Error for the current token not being `expected`.
    pub(crate) fn error_expected(&self, expected: impl Into<String>) -> ParserError {
        if self.is_at_end() {
            ParserError::unexpected_eof(self.current_span())
        } else {
            let found = match self.peek().kind {
                TokenKind::Identifier(symbol) => self.pool.name(symbol).to_string(),
                kind => kind.to_string(),
            };
            ParserError::unexpected_token(expected, found, self.current_span())
        }
    }

    pub(crate) fn current_span(&self) -> Span {
        self.peek().span
    }

    pub(crate) fn previous_span(&self) -> Span {
        self.previous().span
    }
}
