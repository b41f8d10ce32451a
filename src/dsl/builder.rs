use crate::dsl::{Process, Node, Edge, NodeType, Branch};
use std::collections::HashMap;
use serde_json::Value;

pub struct ProcessBuilder {
    id: String,
    name: String,
    variables: HashMap<String, Value>,
    pub nodes: Vec<Node>,
    edges: Vec<Edge>,
}

impl ProcessBuilder {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            name: id.to_string(),
            variables: HashMap::new(),
            nodes: Vec::new(),
            edges: Vec::new(),
        }
    }

    pub fn name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn var(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.variables.insert(key.to_string(), value.into());
        self
    }

    pub fn start(mut self, id: &str) -> Self {
        self.nodes.push(Node {
            id: id.to_string(),
            kind: NodeType::Start,
        });
        self
    }

    pub fn end(mut self, id: &str) -> Self {
        self.nodes.push(Node {
            id: id.to_string(),
            kind: NodeType::End,
        });
        self
    }

    pub fn user_task(self, id: &str, name: &str) -> UserTaskBuilder {
        UserTaskBuilder {
            process_builder: self,
            id: id.to_string(),
            name: name.to_string(),
            assignee: None,
        }
    }

    /// Fork whose branches are not merged again.
    pub fn fork(mut self, id: &str) -> Self {
        self.nodes.push(Node {
            id: id.to_string(),
            kind: NodeType::Fork { join: None },
        });
        self
    }

    /// Fork paired with the join gateway `join_id`.
    pub fn fork_joined(mut self, id: &str, join_id: &str) -> Self {
        self.nodes.push(Node {
            id: id.to_string(),
            kind: NodeType::Fork { join: Some(join_id.to_string()) },
        });
        self
    }

    pub fn join(mut self, id: &str) -> Self {
        self.nodes.push(Node {
            id: id.to_string(),
            kind: NodeType::Join,
        });
        self
    }

    /// 添加并行块
    pub fn parallel(mut self, id: &str, branches: Vec<Vec<Node>>) -> Self {
        let branches_structs = branches.into_iter()
            .map(|nodes| Branch { nodes })
            .collect();

        self.nodes.push(Node {
            id: id.to_string(),
            kind: NodeType::Parallel {
                branches: branches_structs,
            },
        });
        self
    }

    /// Embedded sub-process. The closure receives an empty builder for the inner scope.
    pub fn sub_process(mut self, id: &str, body: impl FnOnce(ProcessBuilder) -> ProcessBuilder) -> Self {
        let inner = body(ProcessBuilder::new(id));
        self.nodes.push(Node {
            id: id.to_string(),
            kind: NodeType::SubProcess {
                nodes: inner.nodes,
                edges: inner.edges,
            },
        });
        self
    }

    pub fn connect(mut self, source: &str, target: &str) -> Self {
        self.edges.push(Edge::new(source, target));
        self
    }

    pub fn build(self) -> Process {
        Process {
            id: self.id,
            name: self.name,
            variables: self.variables,
            nodes: self.nodes,
            edges: self.edges,
        }
    }
}

pub struct UserTaskBuilder {
    process_builder: ProcessBuilder,
    id: String,
    name: String,
    assignee: Option<String>,
}

impl UserTaskBuilder {
    pub fn assignee(mut self, assignee: &str) -> Self {
        self.assignee = Some(assignee.to_string());
        self
    }

    pub fn build(mut self) -> ProcessBuilder {
        self.process_builder.nodes.push(Node {
            id: self.id,
            kind: NodeType::UserTask {
                name: self.name,
                assignee: self.assignee,
            },
        });
        self.process_builder
    }
}

/// Shorthand for building loose `UserTask` nodes, e.g. for `parallel` branches.
pub fn user_task_node(id: &str, name: &str) -> Node {
    Node {
        id: id.to_string(),
        kind: NodeType::UserTask {
            name: name.to_string(),
            assignee: None,
        },
    }
}
