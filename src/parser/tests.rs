//! Parser tests.

use pretty_assertions::assert_eq;

use crate::ast::*;
use crate::error::ParserError;
use crate::lexer::{Scanner, StringPool};
use crate::parser::Parser;

fn parse(source: &str) -> (Program, StringPool) {
    let (tokens, pool) = Scanner::new(source).scan_tokens().unwrap();
    let program = Parser::new(tokens, &pool).parse().unwrap();
    (program, pool)
}

fn parse_err(source: &str) -> ParserError {
    let (tokens, pool) = Scanner::new(source).scan_tokens().unwrap();
    Parser::new(tokens, &pool).parse().unwrap_err()
}

fn parse_expr(source: &str) -> Expr {
    let (program, _) = parse(source);
    match program.statements.into_iter().next().unwrap().kind {
        StmtKind::Expression(expr) => expr,
        other => panic!("Expected expression statement, got {:?}", other),
    }
}

/// Render an expression as a fully parenthesized string.
fn shape(expr: &Expr, pool: &StringPool) -> String {
    match &expr.kind {
        ExprKind::IntLiteral(n) => n.to_string(),
        ExprKind::Variable(sym) => pool.name(*sym).to_string(),
        ExprKind::Binary {
            left,
            operator,
            right,
        } => format!("({} {} {})", shape(left, pool), operator, shape(right, pool)),
        ExprKind::Unary { operand, .. } => format!("(neg {})", shape(operand, pool)),
        ExprKind::Call { callee, arguments } => format!(
            "{}({})",
            shape(callee, pool),
            arguments
                .iter()
                .map(|a| shape(a, pool))
                .collect::<Vec<_>>()
                .join(", ")
        ),
        ExprKind::Index { object, index } => {
            format!("{}[{}]", shape(object, pool), shape(index, pool))
        }
        ExprKind::Field { object, name } => format!("{}.{}", shape(object, pool), pool.name(*name)),
        other => format!("{:?}", other),
    }
}

fn shape_of(source: &str) -> String {
    let (program, pool) = parse(source);
    match &program.statements[0].kind {
        StmtKind::Expression(expr) => shape(expr, &pool),
        other => panic!("Expected expression statement, got {:?}", other),
    }
}

#[test]
fn test_binary_expr() {
    let expr = parse_expr("1 + 2;");
    match expr.kind {
        ExprKind::Binary { operator, .. } => assert_eq!(operator, BinaryOp::Add),
        _ => panic!("Expected binary expression"),
    }
}

#[test]
fn test_precedence() {
    assert_eq!(shape_of("1 + 2 * 3;"), "(1 + (2 * 3))");
    assert_eq!(shape_of("a & b | c ^ d;"), "((a & b) | (c ^ d))");
    assert_eq!(shape_of("1 << 2 + 3;"), "(1 << (2 + 3))");
}

#[test]
fn test_left_associativity() {
    assert_eq!(shape_of("a - b - c;"), "((a - b) - c)");
    assert_eq!(shape_of("a / b * c;"), "((a / b) * c)");
    assert_eq!(shape_of("a / b / c;"), "((a / b) / c)");
    assert_eq!(shape_of("a % b * c;"), "((a % b) * c)");
}

#[test]
fn test_comparisons_bind_loosest() {
    assert_eq!(shape_of("a < b || c;"), "(a < (b || c))");
    assert_eq!(shape_of("a == b && c;"), "(a == (b && c))");
    assert_eq!(shape_of("(a < b) || c;"), "((a < b) || c)");
}

#[test]
fn test_unary_binds_tighter_than_binary() {
    assert_eq!(shape_of("-a * b;"), "((neg a) * b)");
}

#[test]
fn test_postfix_chain() {
    assert_eq!(shape_of("a[0](x)[1];"), "a[0](x)[1]");
    assert_eq!(shape_of("p.pos.x + 1;"), "(p.pos.x + 1)");
}

#[test]
fn test_method_call() {
    let (program, pool) = parse("list.push(1, 2);");
    match &program.statements[0].kind {
        StmtKind::Expression(Expr {
            kind:
                ExprKind::MethodCall {
                    name, arguments, ..
                },
            ..
        }) => {
            assert_eq!(pool.name(*name), "push");
            assert_eq!(arguments.len(), 2);
        }
        other => panic!("Expected method call, got {:?}", other),
    }
}

#[test]
fn test_array_literal() {
    let expr = parse_expr("[1, 2, 3];");
    match expr.kind {
        ExprKind::Array(elements) => assert_eq!(elements.len(), 3),
        _ => panic!("Expected array literal"),
    }
    assert!(matches!(parse_expr("[];").kind, ExprKind::Array(ref e) if e.is_empty()));
}

#[test]
fn test_let_and_assignment() {
    let (program, _) = parse("let a = 3; a += 2; a = a * 2;");
    assert!(matches!(program.statements[0].kind, StmtKind::Let { .. }));
    assert!(matches!(
        program.statements[1].kind,
        StmtKind::Assign {
            operator: Some(BinaryOp::Add),
            ..
        }
    ));
    assert!(matches!(
        program.statements[2].kind,
        StmtKind::Assign { operator: None, .. }
    ));
}

#[test]
fn test_assignment_to_index_and_field() {
    let (program, _) = parse("a[1] = 2; p.x <<= 1;");
    assert!(program
        .statements
        .iter()
        .all(|s| matches!(s.kind, StmtKind::Assign { .. })));
}

#[test]
fn test_invalid_assignment_target() {
    assert!(matches!(
        parse_err("1 + 2 = 3;"),
        ParserError::InvalidAssignmentTarget(_)
    ));
    assert!(matches!(
        parse_err("f() = 3;"),
        ParserError::InvalidAssignmentTarget(_)
    ));
}

#[test]
fn test_if_elif_else_chain() {
    let (program, _) =
        parse("if (a < 1) { x(); } elif (a < 2) { y(); } elif (a < 3) { } else { z(); }");
    match &program.statements[0].kind {
        StmtKind::If(chain) => {
            assert_eq!(chain.elifs.len(), 2);
            assert_eq!(chain.branches().count(), 3);
            assert_eq!(chain.else_block.as_ref().map(Vec::len), Some(1));
        }
        other => panic!("Expected if chain, got {:?}", other),
    }
}

#[test]
fn test_while_with_break_and_continue() {
    let (program, _) = parse("while (true) { if (x) { break; } continue; }");
    match &program.statements[0].kind {
        StmtKind::While { body, .. } => {
            assert_eq!(body.len(), 2);
            assert!(matches!(body[1].kind, StmtKind::Continue));
        }
        other => panic!("Expected while, got {:?}", other),
    }
}

#[test]
fn test_function_declaration() {
    let (program, pool) = parse("func add(a: int, b) -> float { return a + b; }");
    let func = program.functions().next().unwrap();
    assert_eq!(pool.name(func.name), "add");
    assert_eq!(func.params.len(), 2);
    assert_eq!(func.params[0].type_annotation, TypeAnnotation::Int);
    assert_eq!(func.params[1].type_annotation, TypeAnnotation::Any);
    assert_eq!(func.return_type, Some(TypeAnnotation::Float));
    assert!(matches!(func.body[0].kind, StmtKind::Return(Some(_))));
}

#[test]
fn test_type_declaration_and_construction() {
    let (program, pool) = parse("type Point { x: int, y: float; tag }\nlet p = Point(1, 2.0);");
    let decl = program.types().next().unwrap();
    assert_eq!(pool.name(decl.name), "Point");
    let kinds: Vec<_> = decl.fields.iter().map(|f| f.kind).collect();
    assert_eq!(
        kinds,
        vec![
            TypeAnnotation::Int,
            TypeAnnotation::Float,
            TypeAnnotation::Any
        ]
    );

    match &program.statements[1].kind {
        StmtKind::Let {
            initializer:
                Expr {
                    kind: ExprKind::Construct { arguments, .. },
                    ..
                },
            ..
        } => assert_eq!(arguments.len(), 2),
        other => panic!("Expected construction, got {:?}", other),
    }
}

#[test]
fn test_undeclared_type_is_a_call() {
    let expr = parse_expr("Point(1, 2);");
    assert!(matches!(expr.kind, ExprKind::Call { .. }));
}

#[test]
fn test_nested_function_rejected() {
    let err = parse_err("func outer() { func inner() { } }");
    assert!(matches!(err, ParserError::General { .. }));
    assert!(err.to_string().contains("top level"));
}

#[test]
fn test_missing_semicolon_position() {
    match parse_err("let a = 1\nlet b = 2;") {
        ParserError::UnexpectedToken {
            expected,
            found,
            span,
        } => {
            assert_eq!(expected, "';'");
            assert_eq!(found, "let");
            assert_eq!((span.line, span.column), (2, 1));
        }
        other => panic!("Expected unexpected token, got {:?}", other),
    }
}

#[test]
fn test_unexpected_eof() {
    assert!(matches!(
        parse_err("print(1"),
        ParserError::UnexpectedEof(_)
    ));
}
