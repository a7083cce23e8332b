//! Tests for operator semantics
//!
//! Arithmetic, comparison, boolean, membership and indexing behavior

use serde_json::json;

use super::helpers::{compile, eval_error, eval_source, fixture_context, to_map};
use crate::expression::{EvalError, ExpressionError};

/* ===================== Arithmetic ===================== */

#[test]
fn test_precedence() {
    assert_eq!(eval_source("{{ 1 + 2 * 3 }}"), json!(7));
    assert_eq!(eval_source("{{ (1 + 2) * 3 }}"), json!(9));
    assert_eq!(eval_source("{{ 10 - 4 - 3 }}"), json!(3));
    assert_eq!(eval_source("{{ 2 * 3 % 4 }}"), json!(2));
    assert_eq!(eval_source("{{ not 1 == 2 }}"), json!(true));
    assert_eq!(eval_source("{{ 1 < 2 and 3 > 4 or 'x' }}"), json!("x"));
}

#[test]
fn test_true_division_always_float() {
    assert_eq!(eval_source("{{ 7 / 2 }}"), json!(3.5));
    assert_eq!(eval_source("{{ 4 / 2 }}"), json!(2.0));
}

#[test]
fn test_floor_division_and_modulo_signs() {
    assert_eq!(eval_source("{{ -5 // 3 }}"), json!(-2));
    assert_eq!(eval_source("{{ 5 // -3 }}"), json!(-2));
    assert_eq!(eval_source("{{ -5 % 3 }}"), json!(1));
    assert_eq!(eval_source("{{ 5 % -3 }}"), json!(-1));
    assert_eq!(eval_source("{{ 7.5 // 2 }}"), json!(3.0));
    assert_eq!(eval_source("{{ -7.5 % 2 }}"), json!(0.5));
}

#[test]
fn test_mixed_numeric_promotes_to_float() {
    assert_eq!(eval_source("{{ 1 + 0.5 }}"), json!(1.5));
    assert_eq!(eval_source("{{ 2 * 1.5 }}"), json!(3.0));
    assert_eq!(eval_source("{{ True + 1 }}"), json!(2));
}

#[test]
fn test_sequence_concat_and_repeat() {
    assert_eq!(eval_source("{{ 'ab' + 'cd' }}"), json!("abcd"));
    assert_eq!(eval_source("{{ 'ab' * 3 }}"), json!("ababab"));
    assert_eq!(eval_source("{{ 2 * 'x' }}"), json!("xx"));
    assert_eq!(eval_source("{{ [1, 2] + [3] }}"), json!([1, 2, 3]));
    assert_eq!(eval_source("{{ [0] * 3 }}"), json!([0, 0, 0]));
    assert_eq!(eval_source("{{ [0] * -1 }}"), json!([]));
    assert_eq!(eval_source("{{ '' * 3 }}"), json!(""));
    assert_eq!(eval_source("{{ 'ab' * 0 }}"), json!(""));
}

#[test]
fn test_oversized_repeat_is_an_error() {
    for source in [
        "{{ 'ab' * 9223372036854775807 }}",
        "{{ [1] * 9223372036854775807 }}",
        "{{ 9223372036854775807 * [1, 2] }}",
        "{{ 'x' * 16777217 }}",
    ] {
        assert!(
            matches!(compile(source).unwrap_err(), ExpressionError::Eval(EvalError::Overflow)),
            "source: {}",
            source
        );
    }
}

#[test]
fn test_repeat_count_from_scope() {
    let ctx = fixture_context();
    let huge = to_map(json!({"n": i64::MAX}));

    let expr = compile("{{ 'ab' * n }}").unwrap();
    assert!(matches!(expr.fetch_with(&ctx, &huge).unwrap_err(), EvalError::Overflow));

    let expr = compile("{{ [1] * n }}").unwrap();
    assert!(matches!(expr.fetch_with(&ctx, &huge).unwrap_err(), EvalError::Overflow));

    // Empty sequences short-circuit whatever the count
    let expr = compile("{{ [] * n }}").unwrap();
    assert_eq!(expr.fetch_with(&ctx, &huge).unwrap(), json!([]));
    let expr = compile("{{ '' * n }}").unwrap();
    assert_eq!(expr.fetch_with(&ctx, &huge).unwrap(), json!(""));
}

#[test]
fn test_arithmetic_errors() {
    assert!(matches!(
        compile("{{ 1 // 0 }}").unwrap_err(),
        ExpressionError::Eval(EvalError::ZeroDivision)
    ));
    assert!(matches!(
        compile("{{ 1 % 0 }}").unwrap_err(),
        ExpressionError::Eval(EvalError::ZeroDivision)
    ));
    assert!(matches!(
        compile("{{ 9223372036854775807 + 1 }}").unwrap_err(),
        ExpressionError::Eval(EvalError::Overflow)
    ));
    assert!(matches!(
        compile("{{ -'a' }}").unwrap_err(),
        ExpressionError::Eval(EvalError::BadOperand { .. })
    ));
    assert!(matches!(
        eval_error("{{ fd.fd1 - 1 }}"),
        EvalError::UnsupportedOperands { op: "-", left: "str", right: "int" }
    ));
}

/* ===================== Comparison ===================== */

#[test]
fn test_equality_is_numeric_aware() {
    assert_eq!(eval_source("{{ 1 == 1.0 }}"), json!(true));
    assert_eq!(eval_source("{{ True == 1 }}"), json!(true));
    assert_eq!(eval_source("{{ '1' == 1 }}"), json!(false));
    assert_eq!(eval_source("{{ [1, 2] == [1.0, 2] }}"), json!(true));
    assert_eq!(eval_source("{{ None != 0 }}"), json!(true));
}

#[test]
fn test_ordering() {
    assert_eq!(eval_source("{{ 'abc' < 'abd' }}"), json!(true));
    assert_eq!(eval_source("{{ [1, 2] < [1, 3] }}"), json!(true));
    assert_eq!(eval_source("{{ [1, 2] <= [1, 2] }}"), json!(true));
    assert_eq!(eval_source("{{ 2.5 >= 2 }}"), json!(true));
    assert!(matches!(
        compile("{{ 'a' < 1 }}").unwrap_err(),
        ExpressionError::Eval(EvalError::UnsupportedOperands { op: "<", .. })
    ));
}

#[test]
fn test_identity() {
    assert_eq!(eval_source("{{ None is None }}"), json!(true));
    assert_eq!(eval_source("{{ 1 is 1 }}"), json!(true));
    assert_eq!(eval_source("{{ 1 is 1.0 }}"), json!(false));
    assert_eq!(eval_source("{{ [1, 2] is [1, 2] }}"), json!(false));
    assert_eq!(eval_source("{{ bb.dict is not None }}"), json!(true));
}

#[test]
fn test_membership() {
    assert_eq!(eval_source("{{ 'oo' in bb.bb1 }}"), json!(true));
    assert_eq!(eval_source("{{ 2 in [1, 2, 3] }}"), json!(true));
    assert_eq!(eval_source("{{ 2.0 in [1, 2, 3] }}"), json!(true));
    assert_eq!(eval_source("{{ 'foo' in bb.dict }}"), json!(true));
    assert_eq!(eval_source("{{ 'bar' in bb.dict }}"), json!(false));
    assert_eq!(eval_source("{{ not 'a' in 'abc' }}"), json!(false));
    assert!(matches!(
        compile("{{ 1 in 5 }}").unwrap_err(),
        ExpressionError::Eval(EvalError::NotIterable("int"))
    ));
    assert!(matches!(
        compile("{{ 1 in 'abc' }}").unwrap_err(),
        ExpressionError::Eval(EvalError::TypeError(_))
    ));
}

/* ===================== Boolean Operators ===================== */

#[test]
fn test_and_or_return_deciding_operand() {
    assert_eq!(eval_source("{{ True and 'x' }}"), json!("x"));
    assert_eq!(eval_source("{{ 0 and 'x' }}"), json!(0));
    assert_eq!(eval_source("{{ 0 or 'default' }}"), json!("default"));
    assert_eq!(eval_source("{{ 'first' or 'second' }}"), json!("first"));
    assert_eq!(eval_source("{{ [] or {} }}"), json!({}));
}

#[test]
fn test_truthiness() {
    assert_eq!(eval_source("{{ not '' }}"), json!(true));
    assert_eq!(eval_source("{{ not [] }}"), json!(true));
    assert_eq!(eval_source("{{ not 0.0 }}"), json!(true));
    assert_eq!(eval_source("{{ not bb.dict }}"), json!(false));
    assert_eq!(eval_source("{{ not None }}"), json!(true));
}

/* ===================== Indexing ===================== */

#[test]
fn test_indexing() {
    assert_eq!(eval_source("{{ [1, 2, 3][0] }}"), json!(1));
    assert_eq!(eval_source("{{ [1, 2, 3][-1] }}"), json!(3));
    assert_eq!(eval_source("{{ 'hello'[-1] }}"), json!("o"));
    assert_eq!(eval_source("{{ fd.fd1[0] }}"), json!("b"));
    assert_eq!(eval_source("{{ bb['dict']['foo'] }}"), json!("bar"));
    assert_eq!(eval_source("{{ {'1': 'one'}[1] }}"), json!("one"));
}

#[test]
fn test_index_errors() {
    assert!(matches!(
        compile("{{ [1, 2][5] }}").unwrap_err(),
        ExpressionError::Eval(EvalError::IndexOutOfRange(5))
    ));
    assert!(matches!(
        compile("{{ [1, 2]['a'] }}").unwrap_err(),
        ExpressionError::Eval(EvalError::InvalidIndex("list", "str"))
    ));
    assert!(matches!(
        compile("{{ 5[0] }}").unwrap_err(),
        ExpressionError::Eval(EvalError::NotSubscriptable("int"))
    ));
}

#[test]
fn test_slicing() {
    assert_eq!(eval_source("{{ [1, 2, 3, 4][1:3] }}"), json!([2, 3]));
    assert_eq!(eval_source("{{ [1, 2, 3][:-1] }}"), json!([1, 2]));
    assert_eq!(eval_source("{{ [1, 2, 3][5:] }}"), json!([]));
    assert_eq!(eval_source("{{ [1, 2, 3][:] }}"), json!([1, 2, 3]));
    assert_eq!(eval_source("{{ 'abcdef'[1:] }}"), json!("bcdef"));
    assert_eq!(eval_source("{{ 'abcdef'[-3:-1] }}"), json!("de"));
    assert_eq!(eval_source("{{ [1, 2, 3][2:1] }}"), json!([]));
}

/* ===================== Rendering ===================== */

#[test]
fn test_float_rendering_in_text() {
    assert_eq!(eval_source("{{ 2.0 }}!"), json!("2.0!"));
    assert_eq!(eval_source("{{ 1e16 }}!"), json!("1e+16!"));
    assert_eq!(eval_source("{{ 0.000015 }}!"), json!("1.5e-05!"));
    assert_eq!(eval_source("{{ 0.25 }}!"), json!("0.25!"));
}

#[test]
fn test_string_repr_in_containers() {
    assert_eq!(eval_source("{{ [\"it's\"] }}!"), json!("[\"it's\"]!"));
    assert_eq!(eval_source("{{ ['a\\nb'] }}!"), json!("['a\\nb']!"));
}
