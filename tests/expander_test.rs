use graft::compiler::expander::Expander;
use graft::dsl::builder::{ProcessBuilder, user_task_node};
use graft::dsl::NodeType;

#[test]
fn test_expand_parallel_node() {
    // Start -> Parallel(p1) [Branch1: A, Branch2: B->C] -> End
    let branch1 = vec![user_task_node("A", "Task A")];
    let branch2 = vec![user_task_node("B", "Task B"), user_task_node("C", "Task C")];

    let process = ProcessBuilder::new("parallel-expand-test")
        .start("start")
        .parallel("p1", vec![branch1, branch2])
        .end("end")
        .connect("start", "p1")
        .connect("p1", "end")
        .build();

    let expander = Expander::new();
    let expanded = expander.expand(process).expect("Expansion failed");

    // Start, End, A, B, C, p1_fork, p1_join
    assert_eq!(expanded.nodes.len(), 7);

    let fork_node = expanded.nodes.iter().find(|n| n.id == "p1_fork").expect("Fork node not found");
    assert_eq!(fork_node.kind, NodeType::Fork { join: Some("p1_join".to_string()) });
    assert!(expanded.nodes.iter().any(|n| n.id == "p1_join" && n.kind == NodeType::Join));

    let has_edge = |s: &str, t: &str| expanded.edges.iter().any(|e| e.source == s && e.target == t);
    // Redirected outer edges
    assert!(has_edge("start", "p1_fork"));
    assert!(has_edge("p1_join", "end"));
    // Branch heads, chain and tails
    assert!(has_edge("p1_fork", "A"));
    assert!(has_edge("p1_fork", "B"));
    assert!(has_edge("B", "C"));
    assert!(has_edge("A", "p1_join"));
    assert!(has_edge("C", "p1_join"));
    assert!(!expanded.edges.iter().any(|e| e.source == "p1" || e.target == "p1"));
}

#[test]
fn test_expand_inside_sub_process() {
    let process = ProcessBuilder::new("nested")
        .start("start")
        .sub_process("sp", |sp| {
            sp.start("inner")
                .parallel("p", vec![vec![user_task_node("x", "X")], vec![user_task_node("y", "Y")]])
                .end("innerEnd")
                .connect("inner", "p")
                .connect("p", "innerEnd")
        })
        .end("end")
        .connect("start", "sp")
        .connect("sp", "end")
        .build();

    let expanded = Expander::new().expand(process).unwrap();
    let sp = expanded.nodes.iter().find(|n| n.id == "sp").unwrap();
    let NodeType::SubProcess { nodes, edges } = &sp.kind else {
        panic!("sp is not a sub-process");
    };
    assert!(nodes.iter().any(|n| n.id == "p_fork"));
    assert!(nodes.iter().any(|n| n.id == "p_join"));
    assert!(edges.iter().any(|e| e.source == "inner" && e.target == "p_fork"));
    assert!(edges.iter().any(|e| e.source == "p_join" && e.target == "innerEnd"));
}

#[test]
fn test_expand_rejects_single_branch() {
    let process = ProcessBuilder::new("lonely")
        .start("start")
        .parallel("p", vec![vec![user_task_node("x", "X")], vec![]])
        .end("end")
        .connect("start", "p")
        .connect("p", "end")
        .build();
    assert!(Expander::new().expand(process).is_err());
}
