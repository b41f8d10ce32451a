use crate::error::{Error, GraphError};
use crate::runtime::graph::{Graph, GraphNode};
use crate::runtime::node::NodeBehavior;
use crate::runtime::syscall::Syscall;

/// Waits until its task is completed. Task creation happens once the tree is committed.
#[derive(Debug)]
pub struct UserTaskNode;

impl NodeBehavior for UserTaskNode {
    fn name(&self) -> &str { "user_task" }

    fn execute(&self, _node: &GraphNode, _graph: &Graph, syscall: &mut dyn Syscall) -> Result<(), Error> {
        syscall.wait();
        Ok(())
    }
}

#[derive(Debug)]
pub struct SubProcessNode;

impl NodeBehavior for SubProcessNode {
    fn name(&self) -> &str { "sub_process" }

    fn execute(&self, node: &GraphNode, graph: &Graph, syscall: &mut dyn Syscall) -> Result<(), Error> {
        let start = graph.start_of(Some(&node.id))
            .ok_or_else(|| GraphError::invalid(&graph.id, format!("sub-process '{}' has no start event", node.id)))?;
        syscall.open_scope(start.id.clone());
        Ok(())
    }
}
