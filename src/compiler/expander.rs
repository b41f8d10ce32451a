use crate::dsl::{Process, Node, NodeType, Edge, Branch};
use crate::error::GraphError;

/// Rewrites structured `Parallel` blocks into explicit, paired fork/join gateways.
pub struct Expander {}

impl Expander {
    pub fn new() -> Self {
        Self {}
    }

    pub fn expand(&self, process: Process) -> Result<Process, GraphError> {
        let key = process.id.clone();
        let (nodes, edges) = self.expand_scope(&key, process.nodes, process.edges)?;
        Ok(Process {
            nodes,
            edges,
            ..process
        })
    }

    fn expand_scope(&self, key: &str, nodes: Vec<Node>, edges: Vec<Edge>) -> Result<(Vec<Node>, Vec<Edge>), GraphError> {
        let mut new_nodes = Vec::with_capacity(nodes.len());
        let mut new_edges = edges;

        for node in nodes {
            match node.kind {
                NodeType::Parallel { branches } => {
                    self.expand_parallel(key, node.id, branches, &mut new_nodes, &mut new_edges)?;
                }
                // 子流程有自己的作用域，递归展开
                NodeType::SubProcess { nodes, edges } => {
                    let (nodes, edges) = self.expand_scope(key, nodes, edges)?;
                    new_nodes.push(Node {
                        id: node.id,
                        kind: NodeType::SubProcess { nodes, edges },
                    });
                }
                _ => new_nodes.push(node),
            }
        }
        Ok((new_nodes, new_edges))
    }

    fn expand_parallel(
        &self,
        key: &str,
        parallel_id: String,
        branches: Vec<Branch>,
        new_nodes: &mut Vec<Node>,
        new_edges: &mut Vec<Edge>,
    ) -> Result<(), GraphError> {
        let fork_id = format!("{}_fork", parallel_id);
        let join_id = format!("{}_join", parallel_id);

        let branches: Vec<Branch> = branches.into_iter().filter(|b| !b.nodes.is_empty()).collect();
        if branches.len() < 2 {
            return Err(GraphError::invalid(
                key,
                format!("parallel block '{}' needs at least two non-empty branches", parallel_id),
            ));
        }

        for branch in branches {
            let chain: Vec<String> = branch.nodes.iter().map(|n| n.id.clone()).collect();

            // 分支内部线性连接，头尾分别接到 Fork 和 Join
            let mut branch_edges = Vec::with_capacity(chain.len() + 1);
            if let (Some(head), Some(tail)) = (chain.first(), chain.last()) {
                branch_edges.push(Edge::new(&fork_id, head));
                for pair in chain.windows(2) {
                    branch_edges.push(Edge::new(&pair[0], &pair[1]));
                }
                branch_edges.push(Edge::new(tail, &join_id));
            }

            // Nested blocks inside a branch are expanded with the branch's own edges.
            let (nodes, edges) = self.expand_scope(key, branch.nodes, branch_edges)?;
            new_nodes.extend(nodes);
            new_edges.extend(edges);
        }

        new_nodes.push(Node {
            id: fork_id.clone(),
            kind: NodeType::Fork { join: Some(join_id.clone()) },
        });
        new_nodes.push(Node {
            id: join_id.clone(),
            kind: NodeType::Join,
        });

        // 修正外部边：指向 Parallel 的改指 Fork，从 Parallel 出发的改由 Join 出发
        for edge in new_edges.iter_mut() {
            if edge.target == parallel_id {
                edge.target = fork_id.clone();
            }
            if edge.source == parallel_id {
                edge.source = join_id.clone();
            }
        }

        Ok(())
    }
}

impl Default for Expander {
    fn default() -> Self {
        Self::new()
    }
}
