//! Tests for `for_list` and `for_dict`

use serde_json::{json, Value};
use tokio_test::{assert_err, assert_ok};

use super::helpers::{create, ctx, test_registry};
use crate::error::FlowError;
use crate::nodes::itemloop::loop_levels;

async fn run_loop(key: &str, params: Value) -> Option<Value> {
    let registry = test_registry();
    let node = create(&registry, key, "result", params);
    let mut ctx = ctx();
    assert_ok!(node.run(&mut ctx).await);
    ctx.flowdata.get("result").cloned()
}

#[tokio::test]
async fn test_for_list_table() {
    let cases = vec![
        (
            json!([[1, 2], [3, 4]]),
            "item0*item1",
            json!("item0*item1>7"),
            json!([3, 4, 6]),
        ),
        (
            json!([["head1", "head2"], {"name1": "val1", "name2": "val2"}]),
            "item0+':'+item1_val",
            Value::Null,
            json!(["head1:val1", "head1:val2", "head2:val1", "head2:val2"]),
        ),
        (
            json!([1, 2, 3, 4]),
            "item0*2",
            json!("item0*2>7"),
            json!([2, 4, 6]),
        ),
        (
            json!({"key1": 1, "key2": 2}),
            "item0_key + '-' + item0_val | str",
            Value::Null,
            json!(["key1-1", "key2-2"]),
        ),
        (
            json!([[{"first": "hello, ", "second": "world"}, {"first": "foo", "second": "bar"}]]),
            "item0.first + item0.second",
            Value::Null,
            json!(["hello, world", "foobar"]),
        ),
    ];

    for (lists, expression, filter, expected) in cases {
        let result = run_loop(
            "for_list",
            json!({"lists": lists, "expression": expression, "filter": filter}),
        )
        .await;
        assert_eq!(result, Some(expected), "expression: {}", expression);
    }
}

#[tokio::test]
async fn test_for_dict_table() {
    let cases = vec![
        (
            json!([["head1", "head2"], {"name1": "val1", "name2": "val2"}]),
            "item0 + ':' + item1_key",
            "item1_val",
            Value::Null,
            json!({
                "head1:name1": "val1",
                "head1:name2": "val2",
                "head2:name1": "val1",
                "head2:name2": "val2"
            }),
        ),
        (
            json!([1, 2, 3, 4]),
            "'key' + item0 |str",
            "item0*2",
            json!("item0*2>7"),
            json!({"key1": 2, "key2": 4, "key3": 6}),
        ),
        (
            json!({"key1": 1, "key2": 2}),
            "item0_key + '-' + item0_val | str",
            "item0_val",
            Value::Null,
            json!({"key1-1": 1, "key2-2": 2}),
        ),
    ];

    for (lists, key, val, filter, expected) in cases {
        let result = run_loop(
            "for_dict",
            json!({"lists": lists, "key": key, "val": val, "filter": filter}),
        )
        .await;
        assert_eq!(result, Some(expected), "key: {}", key);
    }
}

#[tokio::test]
async fn test_for_dict_stringifies_keys() {
    let result = run_loop(
        "for_dict",
        json!({"lists": [1, 2], "key": "item0", "val": "item0 * 10"}),
    )
    .await;
    assert_eq!(result, Some(json!({"1": 10, "2": 20})));
}

#[tokio::test]
async fn test_loop_reads_scopes_and_template_lists() {
    let registry = test_registry();
    let node = create(
        &registry,
        "for_list",
        "scaled",
        json!({"lists": "{{ bb.values }}", "expression": "item0 * macro.factor", "out_bb": true}),
    );

    let mut ctx = super::helpers::ctx_with_macros(json!({"factor": 3}));
    ctx.blackboard.insert("values", json!([1, 2]));
    assert_ok!(node.run(&mut ctx).await);
    assert_eq!(ctx.blackboard.get("scaled"), Some(json!([3, 6])));
}

#[tokio::test]
async fn test_empty_lists_produce_no_output() {
    assert_eq!(run_loop("for_list", json!({"lists": [], "expression": "item0"})).await, None);
    assert_eq!(
        run_loop("for_dict", json!({"lists": [], "key": "item0", "val": "item0"})).await,
        None
    );
}

#[tokio::test]
async fn test_invalid_lists() {
    let registry = test_registry();

    let node = create(&registry, "for_list", "bad", json!({"lists": "scalar", "expression": "item0"}));
    let err = assert_err!(node.run(&mut ctx()).await);
    assert!(matches!(err, FlowError::InvalidValue { .. }));

    // A nested level that is neither a list nor a dict
    let node = create(&registry, "for_list", "bad", json!({"lists": [[1], [2], 3], "expression": "item0"}));
    let err = assert_err!(node.run(&mut ctx()).await);
    assert!(matches!(err, FlowError::InvalidValue { ref message, .. } if message.contains("level 2")));

    let node = create(&registry, "for_list", "bad", json!({"lists": [1], "expression": "item0 +"}));
    let err = assert_err!(node.run(&mut ctx()).await);
    assert!(matches!(err, FlowError::Expression { .. }));

    let node = create(&registry, "for_list", "bad", json!({"lists": [1], "expression": "item9"}));
    let err = assert_err!(node.run(&mut ctx()).await);
    assert!(matches!(err, FlowError::Eval { ref param, .. } if param == "expression"));
}

#[test]
fn test_loop_levels() {
    assert_eq!(loop_levels("n", &json!([])).unwrap().len(), 0);
    assert_eq!(loop_levels("n", &json!([1, 2])).unwrap(), &[json!([1, 2])]);
    assert_eq!(loop_levels("n", &json!([[1], {"a": 1}])).unwrap().len(), 2);
    assert_eq!(loop_levels("n", &json!({"a": 1})).unwrap(), &[json!({"a": 1})]);
    assert!(loop_levels("n", &json!(1)).is_err());
}
