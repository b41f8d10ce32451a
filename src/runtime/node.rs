use std::fmt::Debug;
use crate::error::Error;
use crate::runtime::graph::{Graph, GraphNode};
use crate::runtime::syscall::Syscall;

/// 运行时节点接口
pub trait NodeBehavior: Send + Sync + Debug {
    fn name(&self) -> &str;

    /// Called when a token enters `node`.
    fn execute(&self, node: &GraphNode, graph: &Graph, syscall: &mut dyn Syscall) -> Result<(), Error>;
}
