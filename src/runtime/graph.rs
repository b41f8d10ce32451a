use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use serde::{Serialize, Deserialize};
use serde_json::Value;
use crate::error::GraphError;

pub type NodeIndex = usize;

/// A validated process graph. Sub-process contents are flattened into the same
/// node list and tagged with the id of their enclosing sub-process (`scope`).
///
/// Never mutated once built; the splicer produces new graphs instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "GraphParts")]
pub struct Graph {
    pub id: String,
    pub name: String,
    /// Initial variables of every instance started from this graph.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub variables: HashMap<String, Value>,
    nodes: Vec<GraphNode>,
    flows: Vec<SequenceFlow>,
    #[serde(skip)]
    index: HashMap<String, NodeIndex>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GraphNode {
    pub id: String,
    pub kind: NodeKind,
    /// Enclosing sub-process id, `None` for the process level.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum NodeKind {
    Start,
    End,
    UserTask {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        assignee: Option<String>,
    },
    SubProcess,
    Fork {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        join: Option<String>,
    },
    Join {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        fork: Option<String>,
    },
}

impl NodeKind {
    pub fn label(&self) -> &'static str {
        match self {
            NodeKind::Start => "start",
            NodeKind::End => "end",
            NodeKind::UserTask { .. } => "user_task",
            NodeKind::SubProcess => "sub_process",
            NodeKind::Fork { .. } => "fork",
            NodeKind::Join { .. } => "join",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SequenceFlow {
    pub id: String,
    pub source: String,
    pub target: String,
}

/// Unvalidated graph contents, used for deserialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphParts {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub variables: HashMap<String, Value>,
    pub nodes: Vec<GraphNode>,
    pub flows: Vec<SequenceFlow>,
}

impl TryFrom<GraphParts> for Graph {
    type Error = GraphError;

    fn try_from(parts: GraphParts) -> Result<Self, Self::Error> {
        Graph::new(parts.id, parts.name, parts.nodes, parts.flows)
            .map(|graph| graph.with_variables(parts.variables))
    }
}

impl Graph {
    pub fn new(id: String, name: String, nodes: Vec<GraphNode>, flows: Vec<SequenceFlow>) -> Result<Self, GraphError> {
        let mut index = HashMap::with_capacity(nodes.len());
        for (idx, node) in nodes.iter().enumerate() {
            if index.insert(node.id.clone(), idx).is_some() {
                return Err(GraphError::invalid(&id, format!("duplicate node id '{}'", node.id)));
            }
        }
        let graph = Self { id, name, variables: HashMap::new(), nodes, flows, index };
        graph.validate()?;
        Ok(graph)
    }

    pub fn with_variables(mut self, variables: HashMap<String, Value>) -> Self {
        self.variables = variables;
        self
    }

    pub fn nodes(&self) -> &[GraphNode] {
        &self.nodes
    }

    pub fn flows(&self) -> &[SequenceFlow] {
        &self.flows
    }

    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        self.index.get(id).map(|&idx| &self.nodes[idx])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn has_flow(&self, id: &str) -> bool {
        self.flows.iter().any(|f| f.id == id)
    }

    pub fn outgoing(&self, id: &str) -> Vec<&SequenceFlow> {
        self.flows.iter().filter(|f| f.source == id).collect()
    }

    pub fn incoming(&self, id: &str) -> Vec<&SequenceFlow> {
        self.flows.iter().filter(|f| f.target == id).collect()
    }

    /// Target node ids of the outgoing flows, in declaration order.
    pub fn successors(&self, id: &str) -> Vec<String> {
        self.outgoing(id).into_iter().map(|f| f.target.clone()).collect()
    }

    /// The start event of a scope (`None` = process level).
    pub fn start_of(&self, scope: Option<&str>) -> Option<&GraphNode> {
        self.nodes.iter()
            .find(|n| matches!(n.kind, NodeKind::Start) && n.scope.as_deref() == scope)
    }

    pub fn user_tasks(&self) -> impl Iterator<Item = &GraphNode> {
        self.nodes.iter().filter(|n| matches!(n.kind, NodeKind::UserTask { .. }))
    }

    fn validate(&self) -> Result<(), GraphError> {
        let fail = |reason: String| GraphError::invalid(&self.id, reason);

        for flow in &self.flows {
            let source = self.node(&flow.source)
                .ok_or_else(|| fail(format!("flow '{}' starts at unknown node '{}'", flow.id, flow.source)))?;
            let target = self.node(&flow.target)
                .ok_or_else(|| fail(format!("flow '{}' ends at unknown node '{}'", flow.id, flow.target)))?;
            if source.scope != target.scope {
                return Err(fail(format!("flow '{}' crosses a sub-process boundary", flow.id)));
            }
        }
        let mut flow_ids = HashSet::new();
        for flow in &self.flows {
            if !flow_ids.insert(flow.id.as_str()) {
                return Err(fail(format!("duplicate flow id '{}'", flow.id)));
            }
        }

        let mut scopes: Vec<Option<&str>> = vec![None];
        for node in &self.nodes {
            if let Some(scope) = node.scope.as_deref() {
                match self.node(scope).map(|n| &n.kind) {
                    Some(NodeKind::SubProcess) => {}
                    _ => return Err(fail(format!("node '{}' is scoped to '{}', which is not a sub-process", node.id, scope))),
                }
            }
            if matches!(node.kind, NodeKind::SubProcess) {
                scopes.push(Some(node.id.as_str()));
            }
        }

        for scope in &scopes {
            let starts = self.nodes.iter()
                .filter(|n| matches!(n.kind, NodeKind::Start) && n.scope.as_deref() == *scope)
                .count();
            if starts != 1 {
                return Err(fail(format!("scope '{}' has {} start events", scope.unwrap_or(self.id.as_str()), starts)));
            }
        }

        for node in &self.nodes {
            let ins = self.incoming(&node.id).len();
            let outs = self.outgoing(&node.id).len();
            match &node.kind {
                NodeKind::Start => {
                    if ins != 0 || outs == 0 {
                        return Err(fail(format!("start '{}' needs no incoming and at least one outgoing flow", node.id)));
                    }
                }
                NodeKind::Fork { join } => {
                    if ins != 1 || outs < 2 {
                        return Err(fail(format!("fork '{}' needs one incoming and at least two outgoing flows", node.id)));
                    }
                    if let Some(join) = join {
                        self.validate_pairing(&node.id, join)?;
                    }
                }
                NodeKind::Join { .. } => {
                    if ins < 2 || outs != 1 {
                        return Err(fail(format!("join '{}' needs at least two incoming and one outgoing flow", node.id)));
                    }
                }
                _ => {
                    if ins == 0 {
                        return Err(fail(format!("node '{}' has no incoming flow", node.id)));
                    }
                }
            }
        }

        for scope in scopes {
            self.validate_reachability(scope)?;
        }
        Ok(())
    }

    /// Every branch of `fork` must reach `join`, and every flow into `join` must come
    /// from a node reachable from `fork`.
    fn validate_pairing(&self, fork: &str, join: &str) -> Result<(), GraphError> {
        let fail = |reason: String| GraphError::invalid(&self.id, reason);
        match self.node(join).map(|n| &n.kind) {
            Some(NodeKind::Join { fork: paired }) => {
                if paired.as_deref().is_some_and(|p| p != fork) {
                    return Err(fail(format!("join '{}' is paired with another fork", join)));
                }
            }
            _ => return Err(fail(format!("fork '{}' is paired with '{}', which is not a join", fork, join))),
        }

        let branches = self.successors(fork);
        for branch in &branches {
            if !self.reaches(branch, join) {
                return Err(fail(format!("branch '{}' of fork '{}' never reaches join '{}'", branch, fork, join)));
            }
        }
        let reachable = self.reachable_from(fork);
        for flow in self.incoming(join) {
            if !reachable.contains(flow.source.as_str()) {
                return Err(fail(format!("join '{}' receives flow '{}' from outside fork '{}'", join, flow.id, fork)));
            }
        }
        if self.incoming(join).len() != branches.len() {
            return Err(fail(format!(
                "join '{}' expects {} branches but fork '{}' creates {}",
                join, self.incoming(join).len(), fork, branches.len()
            )));
        }
        Ok(())
    }

    fn validate_reachability(&self, scope: Option<&str>) -> Result<(), GraphError> {
        let Some(start) = self.start_of(scope) else {
            return Ok(());
        };
        let reachable = self.reachable_from(&start.id);
        for node in self.nodes.iter().filter(|n| n.scope.as_deref() == scope) {
            if !reachable.contains(node.id.as_str()) {
                return Err(GraphError::invalid(&self.id, format!("node '{}' is unreachable", node.id)));
            }
        }
        Ok(())
    }

    fn reaches(&self, from: &str, to: &str) -> bool {
        from == to || self.reachable_from(from).contains(to)
    }

    fn reachable_from<'a>(&'a self, from: &'a str) -> HashSet<&'a str> {
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([from]);
        while let Some(current) = queue.pop_front() {
            if !seen.insert(current) {
                continue;
            }
            for flow in &self.flows {
                if flow.source == current {
                    queue.push_back(flow.target.as_str());
                }
            }
        }
        seen
    }
}

impl fmt::Display for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "graph '{}' ({} nodes, {} flows)", self.id, self.nodes.len(), self.flows.len())?;
        for node in &self.nodes {
            let targets = self.successors(&node.id);
            match &node.scope {
                Some(scope) => writeln!(f, "  [{}] {} {} -> {:?}", scope, node.kind.label(), node.id, targets)?,
                None => writeln!(f, "  {} {} -> {:?}", node.kind.label(), node.id, targets)?,
            }
        }
        Ok(())
    }
}
