use crate::error::Error;
use crate::runtime::graph::{Graph, GraphNode};
use crate::runtime::node::NodeBehavior;
use crate::runtime::syscall::Syscall;

// --- FORK NODE ---

#[derive(Debug)]
pub struct ForkNode;

impl NodeBehavior for ForkNode {
    fn name(&self) -> &str { "fork" }

    fn execute(&self, node: &GraphNode, graph: &Graph, syscall: &mut dyn Syscall) -> Result<(), Error> {
        syscall.jump(graph.successors(&node.id));
        Ok(())
    }
}

// --- JOIN NODE ---

/// Waits for one token per incoming flow before continuing, once per scope.
#[derive(Debug)]
pub struct JoinNode;

impl NodeBehavior for JoinNode {
    fn name(&self) -> &str { "join" }

    fn execute(&self, node: &GraphNode, graph: &Graph, syscall: &mut dyn Syscall) -> Result<(), Error> {
        let expected = graph.incoming(&node.id).len();
        syscall.join(expected, graph.successors(&node.id));
        Ok(())
    }
}
