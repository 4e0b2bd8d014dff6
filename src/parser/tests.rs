use super::parse;
use crate::arena::Arena;
use crate::ast::{BinaryOp, Expr, ExprKind, Literal, UnaryOp};
use crate::error::ParseErrorKind;

fn parse_ok<'a>(arena: &'a Arena, source: &str) -> &'a Expr<'a> {
    match parse(arena, source) {
        Ok(expr) => expr,
        Err(errors) => panic!("parse of {source:?} failed: {errors}"),
    }
}

fn parse_err(source: &str) -> Vec<ParseErrorKind> {
    let arena = Arena::new();
    match parse(&arena, source) {
        Ok(_) => panic!("parse of {source:?} unexpectedly succeeded"),
        Err(errors) => errors.errors.into_iter().map(|e| e.kind).collect(),
    }
}

#[test]
fn parses_int_literal() {
    let arena = Arena::new();
    let expr = parse_ok(&arena, "42");
    assert!(matches!(expr.kind, ExprKind::Literal(Literal::Int(42))));
}

#[test]
fn parses_uint_and_hex_literals() {
    let arena = Arena::new();
    assert!(matches!(
        parse_ok(&arena, "42u").kind,
        ExprKind::Literal(Literal::Uint(42))
    ));
    assert!(matches!(
        parse_ok(&arena, "0xff").kind,
        ExprKind::Literal(Literal::Int(255))
    ));
    assert!(matches!(
        parse_ok(&arena, "0xffu").kind,
        ExprKind::Literal(Literal::Uint(255))
    ));
}

#[test]
fn multiplication_binds_tighter_than_addition() {
    let arena = Arena::new();
    let expr = parse_ok(&arena, "2 + 2 * 2");
    let ExprKind::Binary { op: BinaryOp::Add, left, right } = &expr.kind else {
        panic!("expected top-level addition, got {:?}", expr.kind);
    };
    assert!(matches!(left.kind, ExprKind::Literal(Literal::Int(2))));
    assert!(matches!(right.kind, ExprKind::Binary { op: BinaryOp::Mul, .. }));
}

#[test]
fn parens_override_precedence() {
    let arena = Arena::new();
    let expr = parse_ok(&arena, "(2 + 2) * 2");
    let ExprKind::Binary { op: BinaryOp::Mul, left, .. } = &expr.kind else {
        panic!("expected top-level multiplication, got {:?}", expr.kind);
    };
    assert!(matches!(left.kind, ExprKind::Binary { op: BinaryOp::Add, .. }));
}

#[test]
fn subtraction_is_left_associative() {
    let arena = Arena::new();
    let expr = parse_ok(&arena, "10 - 3 - 2");
    let ExprKind::Binary { op: BinaryOp::Sub, left, right } = &expr.kind else {
        panic!("expected subtraction, got {:?}", expr.kind);
    };
    assert!(matches!(left.kind, ExprKind::Binary { op: BinaryOp::Sub, .. }));
    assert!(matches!(right.kind, ExprKind::Literal(Literal::Int(2))));
}

#[test]
fn ternary_is_right_associative() {
    let arena = Arena::new();
    let expr = parse_ok(&arena, "a ? b : c ? d : e");
    let ExprKind::Ternary { otherwise, .. } = &expr.kind else {
        panic!("expected ternary, got {:?}", expr.kind);
    };
    assert!(matches!(otherwise.kind, ExprKind::Ternary { .. }));
}

#[test]
fn relation_is_non_associative() {
    let kinds = parse_err("1 < 2 < 3");
    assert!(kinds
        .iter()
        .any(|k| matches!(k, ParseErrorKind::TrailingInput { .. })));
}

#[test]
fn unary_stacks_are_counted() {
    let arena = Arena::new();
    let expr = parse_ok(&arena, "!!x");
    assert!(matches!(
        expr.kind,
        ExprKind::Unary { op: UnaryOp::Not, count: 2, .. }
    ));
}

#[test]
fn minus_folds_into_numeric_literal() {
    let arena = Arena::new();
    assert!(matches!(
        parse_ok(&arena, "-5").kind,
        ExprKind::Literal(Literal::Int(-5))
    ));
    let ExprKind::Literal(Literal::Double(d)) = parse_ok(&arena, "-1.5").kind else {
        panic!("expected double literal");
    };
    assert_eq!(d, -1.5);
}

#[test]
fn min_int_literal_parses() {
    let arena = Arena::new();
    assert!(matches!(
        parse_ok(&arena, "-9223372036854775808").kind,
        ExprKind::Literal(Literal::Int(i64::MIN))
    ));
}

#[test]
fn int_literal_above_max_is_rejected() {
    let kinds = parse_err("9223372036854775808");
    assert!(matches!(kinds[0], ParseErrorKind::NumberOutOfRange { .. }));
}

#[test]
fn double_minus_before_literal_keeps_one_unary() {
    let arena = Arena::new();
    let expr = parse_ok(&arena, "--5");
    let ExprKind::Unary { op: UnaryOp::Neg, count: 1, operand } = expr.kind else {
        panic!("expected one remaining negation, got {:?}", expr.kind);
    };
    assert!(matches!(operand.kind, ExprKind::Literal(Literal::Int(-5))));
}

#[test]
fn list_literal_with_trailing_comma() {
    let arena = Arena::new();
    let expr = parse_ok(&arena, "[1, 2, 3,]");
    let ExprKind::List(elements) = expr.kind else {
        panic!("expected list, got {:?}", expr.kind);
    };
    assert_eq!(elements.len(), 3);
}

#[test]
fn map_literal_preserves_entry_order() {
    let arena = Arena::new();
    let expr = parse_ok(&arena, "{\"a\": 1, \"b\": 2,}");
    let ExprKind::Map(entries) = expr.kind else {
        panic!("expected map, got {:?}", expr.kind);
    };
    assert_eq!(entries.len(), 2);
    assert!(matches!(
        entries[0].0.kind,
        ExprKind::Literal(Literal::String("a"))
    ));
}

#[test]
fn index_postfix_applies_to_list_literal() {
    let arena = Arena::new();
    let expr = parse_ok(&arena, "[1,2,3][0]");
    let ExprKind::Index { object, .. } = &expr.kind else {
        panic!("expected index, got {:?}", expr.kind);
    };
    assert!(matches!(object.kind, ExprKind::List(_)));
}

#[test]
fn dotted_chain_builds_nested_members() {
    let arena = Arena::new();
    let expr = parse_ok(&arena, "a.b.c");
    let ExprKind::Member { object, field: "c" } = &expr.kind else {
        panic!("expected member, got {:?}", expr.kind);
    };
    assert!(matches!(object.kind, ExprKind::Member { field: "b", .. }));
}

#[test]
fn identifier_before_paren_is_a_call() {
    let arena = Arena::new();
    let expr = parse_ok(&arena, "size([1, 2])");
    let ExprKind::Call { name: "size", args } = expr.kind else {
        panic!("expected call, got {:?}", expr.kind);
    };
    assert_eq!(args.len(), 1);
}

#[test]
fn dotted_call_is_receiver_style() {
    let arena = Arena::new();
    let expr = parse_ok(&arena, "[1,2,3].filter(v, v > 1)");
    let ExprKind::Method { name: "filter", args, .. } = expr.kind else {
        panic!("expected method, got {:?}", expr.kind);
    };
    assert_eq!(args.len(), 2);
}

#[test]
fn empty_source_is_an_error() {
    let kinds = parse_err("");
    assert!(matches!(kinds[0], ParseErrorKind::UnexpectedEof { .. }));
}

#[test]
fn trailing_tokens_are_an_error() {
    let kinds = parse_err("1 2");
    assert!(matches!(kinds[0], ParseErrorKind::TrailingInput { .. }));
}

#[test]
fn multiple_errors_are_accumulated() {
    let kinds = parse_err("[1 +, 2 *, @]");
    assert!(kinds.len() >= 2, "expected several errors, got {kinds:?}");
}

#[test]
fn deep_nesting_is_rejected_not_overflowed() {
    let mut source = String::new();
    for _ in 0..500 {
        source.push('(');
    }
    source.push('1');
    for _ in 0..500 {
        source.push(')');
    }
    let kinds = parse_err(&source);
    assert!(kinds
        .iter()
        .any(|k| matches!(k, ParseErrorKind::NestingTooDeep)));
}

#[test]
fn spans_cover_whole_subexpressions() {
    let arena = Arena::new();
    let expr = parse_ok(&arena, "1 + 23");
    assert_eq!(expr.span.start, 0);
    assert_eq!(expr.span.end, 6);
}

#[test]
fn reserved_words_parse_as_identifiers() {
    // Rejection of reserved identifiers happens at evaluation, so they
    // can still be used as field names in a dotted chain.
    let arena = Arena::new();
    let expr = parse_ok(&arena, "msg.return");
    assert!(matches!(expr.kind, ExprKind::Member { field: "return", .. }));
}
