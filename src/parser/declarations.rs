//! Declaration parsing: functions and structure types.

use crate::ast::*;
use crate::lexer::TokenKind;

use super::core::{ParseResult, Parser};

impl Parser<'_> {
    /// `func name(a: int, b) -> int { ... }`
    pub(crate) fn function_declaration(&mut self) -> ParseResult<Stmt> {
        let start_span = self.current_span();
        self.expect(&TokenKind::Func)?;
        let name = self.expect_identifier()?;

        self.expect(&TokenKind::LeftParen)?;
        let mut params = Vec::new();
        if !self.check(&TokenKind::RightParen) {
            loop {
                let param_span = self.current_span();
                let param_name = self.expect_identifier()?;
                let type_annotation = self.optional_annotation()?.unwrap_or_default();
                params.push(Parameter {
                    name: param_name,
                    type_annotation,
                    span: param_span,
                });
                if !self.match_token(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(&TokenKind::RightParen)?;

        let return_type = if self.match_token(&TokenKind::Arrow) {
            Some(self.type_annotation()?)
        } else {
            None
        };

        let body = self.block()?;
        let span = start_span.merge(&self.previous_span());

        Ok(Stmt::new(
            StmtKind::Function(FunctionDecl {
                name,
                params,
                return_type,
                body,
                span,
            }),
            span,
        ))
    }

    /// `type Name { field: kind, other; ... }`
    pub(crate) fn type_declaration(&mut self) -> ParseResult<Stmt> {
        let start_span = self.current_span();
        self.expect(&TokenKind::Type)?;
        let name = self.expect_identifier()?;
        self.declared_types.insert(name);

        self.expect(&TokenKind::LeftBrace)?;
        let mut fields = Vec::new();
        while !self.check(&TokenKind::RightBrace) && !self.is_at_end() {
            let field_span = self.current_span();
            let field_name = self.expect_identifier()?;
            let kind = self.optional_annotation()?.unwrap_or_default();
            fields.push(FieldDecl {
                name: field_name,
                kind,
                span: field_span,
            });
            if !self.match_token(&TokenKind::Comma) && !self.match_token(&TokenKind::Semicolon) {
                break;
            }
        }
        self.expect(&TokenKind::RightBrace)?;

        let span = start_span.merge(&self.previous_span());
        Ok(Stmt::new(StmtKind::Type(TypeDecl { name, fields, span }), span))
    }

    /// `: kind`, if present.
    fn optional_annotation(&mut self) -> ParseResult<Option<TypeAnnotation>> {
        if self.match_token(&TokenKind::Colon) {
            Ok(Some(self.type_annotation()?))
        } else {
            Ok(None)
        }
    }

    fn type_annotation(&mut self) -> ParseResult<TypeAnnotation> {
        let symbol = self.expect_identifier()?;
        Ok(TypeAnnotation::from_name(self.pool.name(symbol), symbol))
    }
}
