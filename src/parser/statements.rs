//! Statement parsing: let, if/elif/else, while, return, blocks, assignment.

use crate::ast::*;
use crate::error::ParserError;
use crate::lexer::TokenKind;
use crate::span::Span;

use super::core::{ParseResult, Parser};
use super::precedence::assignment_operator;

impl Parser<'_> {
    pub(crate) fn statement(&mut self) -> ParseResult<Stmt> {
        match self.peek().kind {
            TokenKind::Let => self.let_declaration(),
            TokenKind::If => self.if_statement(),
            TokenKind::While => self.while_statement(),
            TokenKind::Break => self.loop_exit(StmtKind::Break),
            TokenKind::Continue => self.loop_exit(StmtKind::Continue),
            TokenKind::Return => self.return_statement(),
            TokenKind::LeftBrace => {
                let start_span = self.current_span();
                let body = self.block()?;
                Ok(Stmt::new(
                    StmtKind::Block(body),
                    start_span.merge(&self.previous_span()),
                ))
            }
            TokenKind::Func | TokenKind::Type => Err(ParserError::general(
                format!(
                    "'{}' declarations are only allowed at the top level",
                    self.peek().kind
                ),
                self.current_span(),
            )),
            _ => self.expression_statement(),
        }
    }

    /// `{ statement* }`
    pub(crate) fn block(&mut self) -> ParseResult<Vec<Stmt>> {
        self.expect(&TokenKind::LeftBrace)?;
        let mut statements = Vec::new();

        while !self.check(&TokenKind::RightBrace) && !self.is_at_end() {
            statements.push(self.statement()?);
        }

        self.expect(&TokenKind::RightBrace)?;
        Ok(statements)
    }

    fn let_declaration(&mut self) -> ParseResult<Stmt> {
        let start_span = self.current_span();
        self.expect(&TokenKind::Let)?;
        let name = self.expect_identifier()?;
        self.expect(&TokenKind::Equal)?;
        let initializer = self.expression()?;
        self.expect(&TokenKind::Semicolon)?;

        Ok(Stmt::new(
            StmtKind::Let { name, initializer },
            start_span.merge(&self.previous_span()),
        ))
    }

    fn if_statement(&mut self) -> ParseResult<Stmt> {
        let start_span = self.current_span();
        self.expect(&TokenKind::If)?;
        let primary = self.branch(start_span)?;

        let mut elifs = Vec::new();
        while self.check(&TokenKind::Elif) {
            let elif_span = self.current_span();
            self.advance();
            elifs.push(self.branch(elif_span)?);
        }

        let else_block = if self.match_token(&TokenKind::Else) {
            Some(self.block()?)
        } else {
            None
        };

        Ok(Stmt::new(
            StmtKind::If(BranchChain {
                primary,
                elifs,
                else_block,
            }),
            start_span.merge(&self.previous_span()),
        ))
    }

    /// Condition and body of one `if`/`elif` arm; the keyword is already consumed.
    fn branch(&mut self, start_span: Span) -> ParseResult<Branch> {
        let condition = self.expression()?;
        let body = self.block()?;
        Ok(Branch {
            condition,
            body,
            span: start_span.merge(&self.previous_span()),
        })
    }

    fn while_statement(&mut self) -> ParseResult<Stmt> {
        let start_span = self.current_span();
        self.expect(&TokenKind::While)?;
        let condition = self.expression()?;
        let body = self.block()?;

        Ok(Stmt::new(
            StmtKind::While { condition, body },
            start_span.merge(&self.previous_span()),
        ))
    }

    fn loop_exit(&mut self, kind: StmtKind) -> ParseResult<Stmt> {
        let span = self.advance().span;
        self.expect(&TokenKind::Semicolon)?;
        Ok(Stmt::new(kind, span))
    }

    fn return_statement(&mut self) -> ParseResult<Stmt> {
        let start_span = self.current_span();
        self.expect(&TokenKind::Return)?;

        let value = if self.check(&TokenKind::Semicolon) {
            None
        } else {
            Some(self.expression()?)
        };
        self.expect(&TokenKind::Semicolon)?;

        Ok(Stmt::new(
            StmtKind::Return(value),
            start_span.merge(&self.previous_span()),
        ))
    }

    /// An expression statement, or an assignment when an assignment
    /// operator follows the first expression.
    fn expression_statement(&mut self) -> ParseResult<Stmt> {
        let start_span = self.current_span();
        let expr = self.expression()?;

        if let Some(operator) = assignment_operator(&self.peek().kind) {
            if !expr.is_assignable() {
                return Err(ParserError::invalid_assignment_target(expr.span));
            }
            self.advance();
            let value = self.expression()?;
            self.expect(&TokenKind::Semicolon)?;
            return Ok(Stmt::new(
                StmtKind::Assign {
                    target: expr,
                    operator,
                    value,
                },
                start_span.merge(&self.previous_span()),
            ));
        }

        self.expect(&TokenKind::Semicolon)?;
        Ok(Stmt::new(
            StmtKind::Expression(expr),
            start_span.merge(&self.previous_span()),
        ))
    }
}
