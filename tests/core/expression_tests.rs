//! Tests for the restricted expression evaluator
//!
//! Tests cover:
//! - Element-wise arithmetic and functions
//! - Aggregate and series functions
//! - Error handling for unknown names and functions

use splot::expression::{evaluate, validate, Evaluated, ExpressionError, Namespace};

fn series(result: Result<Evaluated, ExpressionError>) -> Vec<f64> {
    match result.unwrap() {
        Evaluated::Series(values) => values,
        Evaluated::Scalar(v) => panic!("expected a series, got scalar {}", v),
    }
}

fn scalar(result: Result<Evaluated, ExpressionError>) -> f64 {
    match result.unwrap() {
        Evaluated::Scalar(v) => v,
        Evaluated::Series(values) => panic!("expected a scalar, got {:?}", values),
    }
}

// ============================================
// Element-wise Tests
// ============================================

#[test]
fn test_operator_precedence() {
    let a = [1.0, 2.0, 3.0];
    let mut ns = Namespace::new();
    ns.bind("a", &a);

    assert_eq!(series(evaluate("2 + a * 3 ^ 2", &ns)), vec![11.0, 20.0, 29.0]);
    assert_eq!(series(evaluate("-a % 2", &ns)), vec![-1.0, 0.0, -1.0]);
}

#[test]
fn test_whitelisted_functions() {
    let x = [100.0, 10.0];
    let mut ns = Namespace::new();
    ns.bind("x", &x);

    assert_eq!(series(evaluate("log10(x)", &ns)), vec![2.0, 1.0]);
    assert_eq!(series(evaluate("clip(x, 0, 50)", &ns)), vec![50.0, 10.0]);
    assert_eq!(series(evaluate("max(x, 50)", &ns)), vec![100.0, 50.0]);
}

#[test]
fn test_nan_results_kept() {
    let x = [4.0, -4.0];
    let mut ns = Namespace::new();
    ns.bind("x", &x);

    let out = series(evaluate("sqrt(x)", &ns));
    assert_eq!(out[0], 2.0);
    assert!(out[1].is_nan());
}

#[test]
fn test_constant_expression_is_scalar() {
    let ns = Namespace::new();
    assert_eq!(scalar(evaluate("3 * (2 + 1)", &ns)), 9.0);
}

// ============================================
// Aggregate and Series Function Tests
// ============================================

#[test]
fn test_aggregates_broadcast_into_series() {
    let v = [2.0, 4.0, 6.0];
    let mut ns = Namespace::new();
    ns.bind("v", &v);

    assert_eq!(series(evaluate("v - mean(v)", &ns)), vec![-2.0, 0.0, 2.0]);
    assert_eq!(scalar(evaluate("sum(v)", &ns)), 12.0);
    assert_eq!(scalar(evaluate("last(v) - first(v)", &ns)), 4.0);
    assert_eq!(scalar(evaluate("median( v )", &ns)), 4.0);
}

#[test]
fn test_population_std() {
    let v = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
    let mut ns = Namespace::new();
    ns.bind("v", &v);
    assert_eq!(scalar(evaluate("std(v)", &ns)), 2.0);
}

#[test]
fn test_series_functions() {
    let v = [1.0, 3.0, 6.0];
    let mut ns = Namespace::new();
    ns.bind("v", &v);

    assert_eq!(series(evaluate("cumsum(v)", &ns)), vec![1.0, 4.0, 10.0]);
    assert_eq!(series(evaluate("diff(v)", &ns)), vec![0.0, 2.0, 3.0]);
}

#[test]
fn test_aggregate_needs_single_variable() {
    let a = [1.0];
    let b = [2.0];
    let mut ns = Namespace::new();
    ns.bind("a", &a);
    ns.bind("b", &b);

    assert_eq!(
        evaluate("mean(a + b)", &ns),
        Err(ExpressionError::WholeVariableArgument("mean".to_string()))
    );
}

// ============================================
// Error Tests
// ============================================

#[test]
fn test_unknown_variable() {
    let ns = Namespace::new();
    assert_eq!(
        evaluate("ghost * 2", &ns),
        Err(ExpressionError::UnknownVariable("ghost".to_string()))
    );
}

#[test]
fn test_disallowed_function() {
    let a = [1.0];
    let mut ns = Namespace::new();
    ns.bind("a", &a);
    assert_eq!(
        evaluate("exec(a)", &ns),
        Err(ExpressionError::DisallowedFunction("exec".to_string()))
    );
}

#[test]
fn test_length_mismatch() {
    let a = [1.0, 2.0];
    let b = [1.0, 2.0, 3.0];
    let mut ns = Namespace::new();
    ns.bind("a", &a);
    ns.bind("b", &b);
    assert!(matches!(
        evaluate("a + b", &ns),
        Err(ExpressionError::LengthMismatch { first_len: 2, second_len: 3, .. })
    ));
}

#[test]
fn test_empty_expression() {
    assert_eq!(validate("   ", &[]), Err(ExpressionError::Empty));
}

#[test]
fn test_validate() {
    assert!(validate("a * 2 + sin(b)", &["a", "b"]).is_ok());
    assert!(matches!(validate("a * (2", &["a"]), Err(ExpressionError::Parse(_))));
    assert!(matches!(validate("a * c", &["a"]), Err(ExpressionError::UnknownVariable(_))));
}
