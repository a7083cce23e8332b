//! Tests for flow file loading

use std::io::Write;

use serde_json::json;
use tokio_test::assert_ok;

use super::*;
use crate::nodes::tests::helpers::test_registry;

const SEQUENTIAL_YML: &str = r#"
macros:
  init_val: 10
sequential:
  flows:
    - name: first
      flow:
        - test.addnode:
            name: add1
            a: "{{ macro.init_val }}"
            b: 1
            out_bb: true
    - name: second
      flow:
        - test.addnode:
            name: add2
            a: "{{ bb.add1 }}"
            b: 1
"#;

const CONCURRENT_YML: &str = r#"
macros:
  init_val: 10
concurrent:
  flows:
    - flow:
        - test.addnode:
            name: add1
            a: "{{ macro.init_val }}"
            b: 1
            out_bb: true
    - flow:
        - test.addnode:
            name: add2
            a: "{{ macro.init_val }}"
            b: 1
            out_bb: true
"#;

const COMPOSITE_YML: &str = r#"
sequential:
  flows:
    - concurrent:
        flows:
          - flow:
              - test.addnode:
                  name: add1
                  a: 1
                  b: 1
                  out_bb: true
          - flow:
              - test.addnode:
                  name: add3
                  a: 1
                  b: 2
                  out_bb: true
    - flow:
        - test.addnode:
            name: add2
            a: "{{ bb.add1 }}"
            b: 1
            out_bb: true
        - test.addnode:
            name: add4
            a: "{{ bb.add3 }}"
            b: 0
            parent: add2
            out_bb: true
    - bogus:
        flows: []
"#;

const FLOW_ONLY_YML: &str = r#"
name: single
flow:
  - message:
      msg: hello
  - if:
      condition: "fd.message == 'hello'"
  - message:
      name: greeted
      parent: if.child_if
      msg: "{{ fd.message }} world"
  - message:
      name: after
      parent: if
      msg: done
"#;

#[tokio::test]
async fn test_sequential_file() {
    let file = parse_flow_file(SEQUENTIAL_YML, &test_registry()).unwrap();
    assert_eq!(file.flows.kind(), FlowsKind::Sequential);
    assert_eq!(file.flows.len(), 2);

    let mut ctx = file.context();
    assert_ok!(file.flows.run(&mut ctx).await);
    assert_eq!(ctx.blackboard.get("add1"), Some(json!(11)));
    assert_eq!(ctx.flowdata.get("add2"), Some(&json!(12)));
}

#[tokio::test]
async fn test_macro_override_changes_results() {
    let file = parse_flow_file(SEQUENTIAL_YML, &test_registry()).unwrap();

    let mut ctx = file.context();
    ctx.macros = file.macros.with_overrides([("init_val", json!(100))]);
    assert_ok!(file.flows.run(&mut ctx).await);
    assert_eq!(ctx.blackboard.get("add1"), Some(json!(101)));
    assert_eq!(ctx.flowdata.get("add2"), Some(&json!(102)));
}

#[tokio::test]
async fn test_concurrent_file() {
    let file = parse_flow_file(CONCURRENT_YML, &test_registry()).unwrap();
    assert_eq!(file.flows.kind(), FlowsKind::Concurrent);

    let mut ctx = file.context();
    assert_ok!(file.flows.run(&mut ctx).await);
    assert_eq!(ctx.blackboard.get("add1"), Some(json!(11)));
    assert_eq!(ctx.blackboard.get("add2"), Some(json!(11)));
}

#[tokio::test]
async fn test_composite_file() {
    let file = parse_flow_file(COMPOSITE_YML, &test_registry()).unwrap();
    // The unrecognised member is skipped
    assert_eq!(file.flows.len(), 2);

    let mut ctx = file.context();
    assert_ok!(file.flows.run(&mut ctx).await);
    assert_eq!(ctx.blackboard.get("add2"), Some(json!(3)));
    assert_eq!(ctx.blackboard.get("add4"), Some(json!(3)));
}

#[tokio::test]
async fn test_flow_only_file() {
    let file = parse_flow_file(FLOW_ONLY_YML, &test_registry()).unwrap();
    assert_eq!(file.flows.len(), 1);
    let crate::flow::FlowsMember::Flow(flow) = &file.flows.members()[0] else {
        unreachable!("Expected a single flow");
    };
    assert_eq!(flow.name(), Some("single"));
    assert!(flow.node("greeted").is_some());

    let mut ctx = file.context();
    assert_ok!(file.flows.run(&mut ctx).await);
    assert_eq!(ctx.flowdata.get("greeted"), Some(&json!("hello world")));
    assert_eq!(ctx.flowdata.get("after"), Some(&json!("done")));
}

#[test]
fn test_ambiguous_top_level() {
    let yaml = "flow: []\nsequential:\n  flows: []\n";
    let err = parse_flow_file(yaml, &test_registry()).unwrap_err();
    assert!(matches!(err, FlowError::Load(ref msg) if msg.contains("flow, sequential")));
}

#[test]
fn test_no_flow_defined() {
    let err = parse_flow_file("macros:\n  a: 1\n", &test_registry()).unwrap_err();
    assert!(matches!(err, FlowError::Load(_)));

    let err = parse_flow_file("- just\n- a list\n", &test_registry()).unwrap_err();
    assert!(matches!(err, FlowError::Load(_)));
}

#[test]
fn test_malformed_files() {
    let registry = test_registry();

    let err = parse_flow_file("flow: [\n", &registry).unwrap_err();
    assert!(matches!(err, FlowError::Yaml(_)));

    let err = parse_flow_file("sequential:\n  members: []\n", &registry).unwrap_err();
    assert!(matches!(err, FlowError::Load(_)));

    // Two node types in one entry
    let yaml = "flow:\n  - message:\n      msg: a\n    stdout:\n";
    let err = parse_flow_file(yaml, &registry).unwrap_err();
    assert!(matches!(err, FlowError::Load(_)));

    let err = parse_flow_file("flow:\n  - message: 1\n", &registry).unwrap_err();
    assert!(matches!(err, FlowError::Load(_)));

    let err = parse_flow_file("macros: [1]\nflow: []\n", &registry).unwrap_err();
    assert!(matches!(err, FlowError::Load(_)));
}

#[test]
fn test_node_errors_propagate() {
    let registry = test_registry();

    let err = parse_flow_file("flow:\n  - nosuch:\n", &registry).unwrap_err();
    assert!(matches!(err, FlowError::UnknownNodeType(ref key) if key == "nosuch"));

    let err = parse_flow_file("flow:\n  - message:\n", &registry).unwrap_err();
    assert!(matches!(err, FlowError::MissingParameter { .. }));

    let yaml = "flow:\n  - message:\n      msg: a\n      parent: ghost\n";
    let err = parse_flow_file(yaml, &registry).unwrap_err();
    assert!(matches!(err, FlowError::UnknownParent { .. }));
}

#[test]
fn test_empty_params_and_default_names() {
    let file = parse_flow_file("flow:\n  - stdout:\n  - stdout:\n      name: second\n", &test_registry()).unwrap();
    let crate::flow::FlowsMember::Flow(flow) = &file.flows.members()[0] else {
        unreachable!("Expected a single flow");
    };
    assert!(flow.node("stdout").is_some());
    assert!(flow.node("second").is_some());
    assert_eq!(flow.name(), None);
}

#[tokio::test]
async fn test_load_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(CONCURRENT_YML.as_bytes()).unwrap();

    let loaded = load_flow_file(file.path(), &test_registry()).unwrap();
    let mut ctx = loaded.context();
    assert_ok!(loaded.flows.run(&mut ctx).await);
    assert_eq!(ctx.blackboard.get("add1"), Some(json!(11)));
}

#[test]
fn test_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let err = load_flow_file(dir.path().join("missing.yml"), &test_registry()).unwrap_err();
    assert!(matches!(err, FlowError::Io(_)));
}
