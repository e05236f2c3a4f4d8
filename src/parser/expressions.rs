//! Expression parsing: precedence climbing, unary, postfix chains, primaries.

use crate::ast::*;
use crate::lexer::TokenKind;

use super::core::{ParseResult, Parser};
use super::precedence::{binary_operator, Precedence};

impl Parser<'_> {
    pub(crate) fn expression(&mut self) -> ParseResult<Expr> {
        self.parse_precedence(Precedence::Comparison)
    }

    /// Consume binary operators binding at least as tight as `min`; the
    /// right operand is parsed one level tighter, which makes every
    /// operator left-associative.
    fn parse_precedence(&mut self, min: Precedence) -> ParseResult<Expr> {
        let mut left = self.unary()?;

        while let Some((operator, precedence)) = binary_operator(&self.peek().kind) {
            if precedence < min {
                break;
            }
            self.advance();
            let right = self.parse_precedence(precedence.next())?;
            let span = left.span.merge(&right.span);
            left = Expr::new(
                ExprKind::Binary {
                    left: Box::new(left),
                    operator,
                    right: Box::new(right),
                },
                span,
            );
        }

        Ok(left)
    }

    fn unary(&mut self) -> ParseResult<Expr> {
        let operator = match self.peek().kind {
            TokenKind::Minus => UnaryOp::Negate,
            TokenKind::Bang => UnaryOp::Not,
            TokenKind::Tilde => UnaryOp::BitNot,
            _ => return self.postfix(),
        };

        let start_span = self.advance().span;
        let operand = self.unary()?;
        let span = start_span.merge(&operand.span);
        Ok(Expr::new(
            ExprKind::Unary {
                operator,
                operand: Box::new(operand),
            },
            span,
        ))
    }

    /// A primary followed by any chain of `(args)`, `[index]`, `.field`,
    /// and `.method(args)` suffixes, applied left to right.
    fn postfix(&mut self) -> ParseResult<Expr> {
        let mut expr = self.primary()?;

        loop {
            if self.match_token(&TokenKind::LeftParen) {
                let arguments = self.arguments()?;
                let span = expr.span.merge(&self.previous_span());
                expr = Expr::new(
                    ExprKind::Call {
                        callee: Box::new(expr),
                        arguments,
                    },
                    span,
                );
            } else if self.match_token(&TokenKind::LeftBracket) {
                let index = self.expression()?;
                self.expect(&TokenKind::RightBracket)?;
                let span = expr.span.merge(&self.previous_span());
                expr = Expr::new(
                    ExprKind::Index {
                        object: Box::new(expr),
                        index: Box::new(index),
                    },
                    span,
                );
            } else if self.match_token(&TokenKind::Dot) {
                let name = self.expect_identifier()?;
                if self.match_token(&TokenKind::LeftParen) {
                    let arguments = self.arguments()?;
                    let span = expr.span.merge(&self.previous_span());
                    expr = Expr::new(
                        ExprKind::MethodCall {
                            object: Box::new(expr),
                            name,
                            arguments,
                        },
                        span,
                    );
                } else {
                    let span = expr.span.merge(&self.previous_span());
                    expr = Expr::new(
                        ExprKind::Field {
                            object: Box::new(expr),
                            name,
                        },
                        span,
                    );
                }
            } else {
                break;
            }
        }

        Ok(expr)
    }

    /// Comma-separated arguments; the opening `(` is already consumed.
    fn arguments(&mut self) -> ParseResult<Vec<Expr>> {
        let mut arguments = Vec::new();

        if !self.check(&TokenKind::RightParen) {
            loop {
                arguments.push(self.expression()?);
                if !self.match_token(&TokenKind::Comma) {
                    break;
                }
            }
        }

        self.expect(&TokenKind::RightParen)?;
        Ok(arguments)
    }

    fn primary(&mut self) -> ParseResult<Expr> {
        let token = *self.peek();
        let span = token.span;

        let kind = match token.kind {
            TokenKind::IntLiteral(n) => ExprKind::IntLiteral(n),
            TokenKind::UIntLiteral(n) => ExprKind::UIntLiteral(n),
            TokenKind::FloatLiteral(n) => ExprKind::FloatLiteral(n),
            TokenKind::CharLiteral(c) => ExprKind::CharLiteral(c),
            TokenKind::StringLiteral(symbol) => ExprKind::StringLiteral(symbol),
            TokenKind::BoolLiteral(b) => ExprKind::BoolLiteral(b),
            TokenKind::Null => ExprKind::Null,
            TokenKind::Identifier(symbol) => {
                self.advance();
                if self.declared_types.contains(&symbol) && self.check(&TokenKind::LeftParen) {
                    self.advance();
                    let arguments = self.arguments()?;
                    return Ok(Expr::new(
                        ExprKind::Construct {
                            type_name: symbol,
                            arguments,
                        },
                        span.merge(&self.previous_span()),
                    ));
                }
                return Ok(Expr::new(ExprKind::Variable(symbol), span));
            }
            TokenKind::LeftParen => {
                self.advance();
                let expr = self.expression()?;
                self.expect(&TokenKind::RightParen)?;
                return Ok(Expr::new(expr.kind, span.merge(&self.previous_span())));
            }
            TokenKind::LeftBracket => {
                self.advance();
                let elements = self.array_elements()?;
                return Ok(Expr::new(
                    ExprKind::Array(elements),
                    span.merge(&self.previous_span()),
                ));
            }
            _ => return Err(self.error_expected("expression")),
        };

        self.advance();
        Ok(Expr::new(kind, span))
    }

    /// Elements of an array literal; the opening `[` is already consumed.
    fn array_elements(&mut self) -> ParseResult<Vec<Expr>> {
        let mut elements = Vec::new();

        while !self.check(&TokenKind::RightBracket) {
            elements.push(self.expression()?);
            if !self.match_token(&TokenKind::Comma) {
                break;
            }
        }

        self.expect(&TokenKind::RightBracket)?;
        Ok(elements)
    }
}
