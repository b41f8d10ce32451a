pub mod builder;

use std::collections::HashMap;
use serde::{Serialize, Deserialize};
use serde_json::Value;

/// A process description as written by hand (YAML) or produced by the builder.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Process {
    /// Definition key. Every deployment of the same key gets a new version.
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub variables: HashMap<String, Value>,
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum NodeType {
    Start,
    End,
    UserTask {
        name: String,
        #[serde(default)]
        assignee: Option<String>,
    },
    /// Embedded scope with its own start event.
    SubProcess {
        nodes: Vec<Node>,
        #[serde(default)]
        edges: Vec<Edge>,
    },
    /// Parallel gateway split. `join` names the gateway that merges its branches;
    /// without it the branches run to their own ends.
    Fork {
        #[serde(default)]
        join: Option<String>,
    },
    Join,
    /// Structured parallel block, rewritten into a paired fork/join by the expander.
    Parallel {
        branches: Vec<Branch>,
    },
}

/// One branch of a `Parallel` block. Nodes are chained in order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Branch {
    pub nodes: Vec<Node>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Node {
    pub id: String,
    #[serde(flatten)]
    pub kind: NodeType,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Edge {
    #[serde(default)]
    pub id: Option<String>,
    pub source: String,
    pub target: String,
}

impl Edge {
    pub fn new(source: &str, target: &str) -> Self {
        Self {
            id: None,
            source: source.to_string(),
            target: target.to_string(),
        }
    }
}
