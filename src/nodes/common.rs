use crate::error::Error;
use crate::runtime::graph::{Graph, GraphNode};
use crate::runtime::node::NodeBehavior;
use crate::runtime::syscall::Syscall;

#[derive(Debug)]
pub struct StartNode;

impl NodeBehavior for StartNode {
    fn name(&self) -> &str { "start" }

    fn execute(&self, node: &GraphNode, graph: &Graph, syscall: &mut dyn Syscall) -> Result<(), Error> {
        syscall.jump(graph.successors(&node.id));
        Ok(())
    }
}

#[derive(Debug)]
pub struct EndNode;

impl NodeBehavior for EndNode {
    fn name(&self) -> &str { "end" }

    fn execute(&self, _node: &GraphNode, _graph: &Graph, syscall: &mut dyn Syscall) -> Result<(), Error> {
        syscall.terminate();
        Ok(())
    }
}
