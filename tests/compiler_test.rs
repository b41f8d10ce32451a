mod common;

use common::*;
use graft::compiler::core::Compiler;
use graft::dsl::builder::ProcessBuilder;
use graft::dsl::Edge;
use graft::error::GraphError;
use graft::runtime::graph::NodeKind;

#[test]
fn test_compile_linear_process() {
    let mut compiler = Compiler::new();
    let graph = compiler.compile(one_task_process()).expect("Compilation failed");

    assert_eq!(graph.id, "oneTask");
    assert_eq!(graph.name, "One task process");
    assert_eq!(graph.nodes().len(), 3);
    assert_eq!(graph.flows().len(), 2);
    assert_eq!(graph.start_of(None).unwrap().id, "start");
    assert_eq!(graph.successors("theTask"), vec!["end"]);
    assert!(graph.has_flow("flow_start_theTask"));
    assert_eq!(
        graph.node("theTask").unwrap().kind,
        NodeKind::UserTask { name: "The Task".to_string(), assignee: None }
    );
}

#[test]
fn test_compile_flattens_sub_process() {
    let graph = Compiler::new().compile(diamond_process()).expect("Compilation failed");

    assert_eq!(graph.node("subProcess").unwrap().kind, NodeKind::SubProcess);
    assert_eq!(graph.node("subProcess").unwrap().scope, None);
    assert_eq!(graph.node("taskB").unwrap().scope.as_deref(), Some("subProcess"));
    assert_eq!(graph.start_of(Some("subProcess")).unwrap().id, "subStart");
    assert_eq!(graph.user_tasks().count(), 6);

    // Pairing is recorded on both gateways.
    assert_eq!(graph.node("fork").unwrap().kind, NodeKind::Fork { join: Some("join".to_string()) });
    assert_eq!(graph.node("join").unwrap().kind, NodeKind::Join { fork: Some("fork".to_string()) });
}

#[test]
fn test_compile_keeps_explicit_flow_ids() {
    let mut process = one_task_process();
    process.edges[0] = Edge {
        id: Some("toTask".to_string()),
        ..Edge::new("start", "theTask")
    };
    let graph = Compiler::new().compile(process).unwrap();
    assert!(graph.has_flow("toTask"));
}

#[test]
fn test_compile_rejects_duplicate_ids() {
    let process = ProcessBuilder::new("dup")
        .start("start")
        .user_task("a", "A").build()
        .user_task("a", "Again").build()
        .end("end")
        .connect("start", "a")
        .connect("a", "end")
        .build();
    assert!(matches!(Compiler::new().compile(process), Err(GraphError::Invalid { .. })));
}

#[test]
fn test_compile_rejects_flow_across_scopes() {
    let process = ProcessBuilder::new("leaky")
        .start("start")
        .sub_process("sp", |sp| sp.start("inner").user_task("t", "T").build().connect("inner", "t"))
        .end("end")
        .connect("start", "sp")
        .connect("sp", "end")
        .connect("t", "end")
        .build();
    let err = Compiler::new().compile(process).unwrap_err();
    assert!(err.to_string().contains("crosses a sub-process boundary"));
}

#[test]
fn test_compile_rejects_unpaired_join_branch() {
    // Branch `b` leaves the fork but never reaches its join.
    let process = ProcessBuilder::new("unpaired")
        .start("start")
        .fork_joined("fork", "join")
        .user_task("a", "A").build()
        .user_task("b", "B").build()
        .user_task("c", "C").build()
        .join("join")
        .end("end")
        .end("bEnd")
        .connect("start", "fork")
        .connect("fork", "a")
        .connect("fork", "b")
        .connect("fork", "c")
        .connect("a", "join")
        .connect("c", "join")
        .connect("b", "bEnd")
        .connect("join", "end")
        .build();
    let err = Compiler::new().compile(process).unwrap_err();
    assert!(err.to_string().contains("never reaches join"));
}

#[test]
fn test_compile_rejects_second_start() {
    let process = ProcessBuilder::new("twoStarts")
        .start("s1")
        .start("s2")
        .end("end")
        .connect("s1", "end")
        .connect("s2", "end")
        .build();
    assert!(Compiler::new().compile(process).is_err());
}
