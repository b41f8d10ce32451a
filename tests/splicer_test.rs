mod common;

use std::collections::HashMap;
use std::sync::Arc;
use common::*;
use graft::compiler::core::Compiler;
use graft::compiler::splicer::{splice, Insertion, SpliceMode};
use graft::dsl::builder::ProcessBuilder;
use graft::error::Error;
use graft::injection::{SubProcessSpec, UserTaskSpec};
use graft::runtime::definition::DefinitionId;
use graft::runtime::graph::{Graph, NodeKind};

fn compile(process: graft::dsl::Process) -> Graph {
    Compiler::new().compile(process).expect("Compilation failed")
}

fn task(id: &str, name: &str) -> Insertion {
    Insertion::UserTask(UserTaskSpec::new(id, name).unwrap())
}

fn no_graphs() -> HashMap<DefinitionId, Arc<Graph>> {
    HashMap::new()
}

#[test]
fn test_sequential_splice_preserves_original_graph() {
    let graph = compile(one_task_process());
    let spliced = splice(&graph, "start", &task("custom_task", "Custom"), SpliceMode::ReplaceSequential, &no_graphs())
        .expect("Splice failed");

    for node in graph.nodes() {
        assert_eq!(spliced.graph.node(&node.id), Some(node));
        assert_eq!(spliced.mapping.resolve(&node.id), Some(node.id.as_str()));
    }
    for flow in graph.flows() {
        assert!(spliced.graph.flows().contains(flow));
    }

    assert_eq!(spliced.mapping.inserted(), ["custom_task", "custom_task_end"]);
    assert_eq!(spliced.graph.nodes().len(), graph.nodes().len() + 2);
    assert_eq!(spliced.graph.flows().len(), graph.flows().len() + 2);
    assert_eq!(spliced.graph.successors("start"), vec!["theTask", "custom_task"]);
    assert_eq!(spliced.graph.successors("custom_task"), vec!["custom_task_end"]);
    assert_eq!(spliced.roots, vec!["custom_task"]);
    assert!(spliced.fork.is_none() && spliced.join.is_none());
}

#[test]
fn test_parallel_join_splice() {
    let graph = compile(one_task_process());
    let spliced = splice(&graph, "theTask", &task("custom_task", "Custom"), SpliceMode::ParallelJoin, &no_graphs())
        .expect("Splice failed");
    let g = &spliced.graph;

    assert_eq!(spliced.fork.as_deref(), Some("custom_task_fork"));
    assert_eq!(spliced.join.as_deref(), Some("custom_task_join"));
    assert_eq!(g.successors("start"), vec!["custom_task_fork"]);
    assert_eq!(g.successors("custom_task_fork"), vec!["theTask", "custom_task"]);
    assert_eq!(g.successors("theTask"), vec!["custom_task_join"]);
    assert_eq!(g.successors("custom_task"), vec!["custom_task_join"]);
    assert_eq!(g.successors("custom_task_join"), vec!["end"]);
    assert_eq!(
        g.node("custom_task_fork").unwrap().kind,
        NodeKind::Fork { join: Some("custom_task_join".to_string()) }
    );
    assert_eq!(
        g.node("custom_task_join").unwrap().kind,
        NodeKind::Join { fork: Some("custom_task_fork".to_string()) }
    );

    // Existing flows keep their ids.
    for flow in graph.flows() {
        assert!(g.has_flow(&flow.id));
    }
}

#[test]
fn test_parallel_no_join_splice() {
    let graph = compile(one_task_process());
    let spliced = splice(&graph, "theTask", &task("custom_task", "Custom"), SpliceMode::ParallelNoJoin, &no_graphs())
        .expect("Splice failed");
    let g = &spliced.graph;

    assert!(spliced.join.is_none());
    assert_eq!(g.node("custom_task_fork").unwrap().kind, NodeKind::Fork { join: None });
    assert_eq!(g.successors("theTask"), vec!["end"]);
    assert_eq!(g.successors("custom_task"), vec!["custom_task_end"]);
    assert!(!g.contains("custom_task_join"));
}

#[test]
fn test_splice_is_pure() {
    let graph = compile(one_task_process());
    let nodes = graph.nodes().to_vec();
    let flows = graph.flows().to_vec();

    splice(&graph, "theTask", &task("custom_task", "Custom"), SpliceMode::ParallelJoin, &no_graphs()).unwrap();

    assert_eq!(graph.nodes(), nodes.as_slice());
    assert_eq!(graph.flows(), flows.as_slice());
}

#[test]
fn test_unknown_anchor() {
    let graph = compile(one_task_process());
    let result = splice(&graph, "nope", &task("custom_task", "Custom"), SpliceMode::ParallelJoin, &no_graphs());
    assert!(matches!(result, Err(Error::InvalidAnchor { anchor, .. }) if anchor == "nope"));
}

#[test]
fn test_structural_conflicts() {
    let graph = compile(one_task_process());

    // Id already taken
    let result = splice(&graph, "theTask", &task("end", "Clash"), SpliceMode::ParallelJoin, &no_graphs());
    assert!(matches!(result, Err(Error::StructuralConflict { .. })));

    // Gateways cannot anchor a parallel branch
    let graph = compile(five_parallel_process());
    let result = splice(&graph, "fork", &task("x", "X"), SpliceMode::ParallelNoJoin, &no_graphs());
    assert!(matches!(result, Err(Error::StructuralConflict { .. })));

    // An end event has nothing to run beside
    let result = splice(&graph, "end", &task("x", "X"), SpliceMode::ReplaceSequential, &no_graphs());
    assert!(matches!(result, Err(Error::StructuralConflict { mode: SpliceMode::ReplaceSequential, .. })));
}

#[test]
fn test_join_needs_single_continuation() {
    // `split` continues on two paths at once
    let graph = compile(
        ProcessBuilder::new("twoWays")
            .start("start")
            .user_task("split", "Split").build()
            .end("left")
            .end("right")
            .connect("start", "split")
            .connect("split", "left")
            .connect("split", "right")
            .build(),
    );

    let result = splice(&graph, "split", &task("x", "X"), SpliceMode::ParallelJoin, &no_graphs());
    assert!(matches!(result, Err(Error::StructuralConflict { mode: SpliceMode::ParallelJoin, .. })));

    let result = splice(&graph, "split", &task("x", "X"), SpliceMode::ParallelNoJoin, &no_graphs());
    assert!(result.is_ok());
}

#[test]
fn test_unresolved_sub_graph() {
    let graph = compile(one_task_process());
    let insertion = Insertion::SubProcess(SubProcessSpec::new("sub", DefinitionId::new("missing", 1)).unwrap());
    let result = splice(&graph, "theTask", &insertion, SpliceMode::ParallelJoin, &no_graphs());
    assert!(matches!(result, Err(Error::UnresolvedReference(id)) if id == "missing:1"));
}

#[test]
fn test_sub_graph_is_inlined_with_prefixed_ids() {
    let graph = compile(diamond_process());
    let inner = Arc::new(compile(five_parallel_process()));
    let inner_id = DefinitionId::new("testProcess02", 1);
    let graphs = HashMap::from([(inner_id.clone(), inner.clone())]);

    let insertion = Insertion::SubProcess(SubProcessSpec::new("sub", inner_id).unwrap());
    let spliced = splice(&graph, "taskB", &insertion, SpliceMode::ParallelJoin, &graphs).expect("Splice failed");
    let g = &spliced.graph;

    assert_eq!(g.node("sub").unwrap().kind, NodeKind::SubProcess);
    assert_eq!(g.node("sub").unwrap().scope.as_deref(), Some("subProcess"));
    for node in inner.nodes() {
        let inlined = g.node(&format!("sub_{}", node.id)).expect("Inlined node missing");
        assert_eq!(inlined.scope.as_deref(), Some("sub"));
    }
    assert_eq!(g.start_of(Some("sub")).unwrap().id, "sub_start");
    assert_eq!(
        g.node("sub_fork").unwrap().kind,
        NodeKind::Fork { join: Some("sub_join".to_string()) }
    );

    // Generated gateways step around the inlined ids.
    assert_eq!(spliced.fork.as_deref(), Some("sub_fork_2"));
    assert_eq!(spliced.join.as_deref(), Some("sub_join_2"));
    assert_eq!(g.node("sub_fork_2").unwrap().scope.as_deref(), Some("subProcess"));
    assert_eq!(g.successors("taskB"), vec!["sub_join_2"]);
    assert_eq!(g.successors("sub_join_2"), vec!["afterB"]);
    assert_eq!(spliced.roots, vec!["sub"]);
}
