use std::collections::{HashMap, HashSet};
use tracing::debug;
use crate::dsl::{Process, Node, NodeType, Edge};
use crate::compiler::expander::Expander;
use crate::error::GraphError;
use crate::runtime::graph::{Graph, GraphNode, NodeKind, SequenceFlow};

/// Turns a DSL process into a validated, flattened [`Graph`].
pub struct Compiler {
    nodes: Vec<GraphNode>,
    flows: Vec<SequenceFlow>,
    flow_ids: HashSet<String>,
}

impl Compiler {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            flows: Vec::new(),
            flow_ids: HashSet::new(),
        }
    }

    pub fn compile(&mut self, raw_process: Process) -> Result<Graph, GraphError> {
        self.nodes.clear();
        self.flows.clear();
        self.flow_ids.clear();

        // 0. Pass 0: Expand
        let expander = Expander::new();
        let process = expander.expand(raw_process)?;

        // 1. Pass 1: Flatten scopes
        self.flatten(&process.id, process.nodes, process.edges, None)?;

        // 2. Pass 2: Pair joins with the fork that names them
        let pairs: HashMap<String, String> = self.nodes.iter()
            .filter_map(|n| match &n.kind {
                NodeKind::Fork { join: Some(join) } => Some((join.clone(), n.id.clone())),
                _ => None,
            })
            .collect();
        for node in &mut self.nodes {
            if let NodeKind::Join { fork } = &mut node.kind {
                *fork = pairs.get(&node.id).cloned();
            }
        }

        // 3. Validate
        let name = if process.name.is_empty() { process.id.clone() } else { process.name };
        let graph = Graph::new(
            process.id,
            name,
            std::mem::take(&mut self.nodes),
            std::mem::take(&mut self.flows),
        )?
        .with_variables(process.variables);
        debug!(graph = %graph.id, nodes = graph.nodes().len(), flows = graph.flows().len(), "Process compiled");
        Ok(graph)
    }

    fn flatten(&mut self, key: &str, nodes: Vec<Node>, edges: Vec<Edge>, scope: Option<&str>) -> Result<(), GraphError> {
        for node in nodes {
            let kind = match node.kind {
                NodeType::Start => NodeKind::Start,
                NodeType::End => NodeKind::End,
                NodeType::UserTask { name, assignee } => NodeKind::UserTask { name, assignee },
                NodeType::Fork { join } => NodeKind::Fork { join },
                NodeType::Join => NodeKind::Join { fork: None },
                NodeType::SubProcess { nodes, edges } => {
                    self.nodes.push(GraphNode {
                        id: node.id.clone(),
                        kind: NodeKind::SubProcess,
                        scope: scope.map(str::to_string),
                    });
                    self.flatten(key, nodes, edges, Some(&node.id))?;
                    continue;
                }
                NodeType::Parallel { .. } => {
                    return Err(GraphError::invalid(key, format!("parallel node '{}' should have been expanded", node.id)));
                }
            };
            self.nodes.push(GraphNode {
                id: node.id,
                kind,
                scope: scope.map(str::to_string),
            });
        }

        for edge in edges {
            let id = match edge.id {
                Some(id) => id,
                None => self.fresh_flow_id(&edge.source, &edge.target),
            };
            self.flow_ids.insert(id.clone());
            self.flows.push(SequenceFlow {
                id,
                source: edge.source,
                target: edge.target,
            });
        }
        Ok(())
    }

    fn fresh_flow_id(&self, source: &str, target: &str) -> String {
        let base = format!("flow_{}_{}", source, target);
        if !self.flow_ids.contains(&base) {
            return base;
        }
        (2..)
            .map(|n| format!("{}_{}", base, n))
            .find(|candidate| !self.flow_ids.contains(candidate))
            .unwrap_or(base)
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}
