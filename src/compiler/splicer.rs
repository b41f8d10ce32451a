use std::collections::HashMap;
use std::fmt;
use serde::{Serialize, Deserialize};
use tracing::debug;
use crate::error::Error;
use crate::injection::request::{SubProcessSpec, UserTaskSpec};
use crate::runtime::definition::GraphResolver;
use crate::runtime::graph::{Graph, GraphNode, NodeKind, SequenceFlow};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SpliceMode {
    /// Add the insertion as an extra path leaving the anchor, ending on its own.
    ReplaceSequential,
    /// Fork before the anchor, join after it.
    ParallelJoin,
    /// Fork before the anchor; the inserted branch ends on its own.
    ParallelNoJoin,
}

impl SpliceMode {
    pub fn parallel(join: bool) -> Self {
        if join { SpliceMode::ParallelJoin } else { SpliceMode::ParallelNoJoin }
    }
}

impl fmt::Display for SpliceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SpliceMode::ReplaceSequential => "sequential",
            SpliceMode::ParallelJoin => "parallel-join",
            SpliceMode::ParallelNoJoin => "parallel-no-join",
        };
        f.write_str(s)
    }
}

/// What to insert next to the anchor.
#[derive(Debug, Clone)]
pub enum Insertion {
    UserTask(UserTaskSpec),
    /// Inlines the graph of another definition as an embedded sub-process.
    SubProcess(SubProcessSpec),
}

impl Insertion {
    pub fn id(&self) -> &str {
        match self {
            Insertion::UserTask(spec) => spec.id(),
            Insertion::SubProcess(spec) => spec.id(),
        }
    }
}

/// Old node id -> node id in the spliced graph, plus the ids the splice created.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IdMapping {
    map: HashMap<String, String>,
    inserted: Vec<String>,
}

impl IdMapping {
    pub(crate) fn identity(graph: &Graph) -> Self {
        Self {
            map: graph.nodes().iter().map(|n| (n.id.clone(), n.id.clone())).collect(),
            inserted: Vec::new(),
        }
    }

    fn insert(&mut self, id: &str) {
        self.map.insert(id.to_string(), id.to_string());
        self.inserted.push(id.to_string());
    }

    pub fn resolve(&self, old: &str) -> Option<&str> {
        self.map.get(old).map(String::as_str)
    }

    /// Ids that exist only in the spliced graph.
    pub fn inserted(&self) -> &[String] {
        &self.inserted
    }
}

/// The result of a splice.
#[derive(Debug, Clone)]
pub struct Spliced {
    pub graph: Graph,
    pub mapping: IdMapping,
    /// Nodes that new tokens must enter (the insertion's entry point).
    pub roots: Vec<String>,
    pub fork: Option<String>,
    pub join: Option<String>,
    pub anchor: String,
    pub mode: SpliceMode,
}

/// Inserts `insertion` relative to `anchor`. Pure: `graph` is left as is, and every
/// node of `graph` keeps its id in the result.
pub fn splice(
    graph: &Graph,
    anchor: &str,
    insertion: &Insertion,
    mode: SpliceMode,
    resolver: &dyn GraphResolver,
) -> Result<Spliced, Error> {
    Splicer::new(graph, anchor, mode)?.run(insertion, resolver)
}

struct Splicer<'a> {
    source: &'a Graph,
    anchor: &'a GraphNode,
    mode: SpliceMode,
    nodes: Vec<GraphNode>,
    flows: Vec<SequenceFlow>,
    mapping: IdMapping,
    flow_seq: usize,
}

impl<'a> Splicer<'a> {
    fn new(source: &'a Graph, anchor: &str, mode: SpliceMode) -> Result<Self, Error> {
        let anchor = source.node(anchor).ok_or_else(|| Error::InvalidAnchor {
            anchor: anchor.to_string(),
            reason: format!("no such node in graph '{}'", source.id),
        })?;
        Ok(Self {
            source,
            anchor,
            mode,
            nodes: source.nodes().to_vec(),
            flows: source.flows().to_vec(),
            mapping: IdMapping::identity(source),
            flow_seq: 0,
        })
    }

    fn conflict(&self, reason: impl Into<String>) -> Error {
        Error::StructuralConflict {
            anchor: self.anchor.id.clone(),
            mode: self.mode,
            reason: reason.into(),
        }
    }

    fn run(mut self, insertion: &Insertion, resolver: &dyn GraphResolver) -> Result<Spliced, Error> {
        let entry = self.add_insertion(insertion, resolver)?;
        let base = insertion.id();

        let (fork, join) = match self.mode {
            SpliceMode::ReplaceSequential => {
                self.splice_sequential(&entry, base)?;
                (None, None)
            }
            SpliceMode::ParallelJoin | SpliceMode::ParallelNoJoin => self.splice_parallel(&entry, base)?,
        };

        let graph = Graph::new(self.source.id.clone(), self.source.name.clone(), self.nodes, self.flows)
            .map_err(|e| Error::StructuralConflict {
                anchor: self.anchor.id.clone(),
                mode: self.mode,
                reason: e.to_string(),
            })?
            .with_variables(self.source.variables.clone());
        debug!(
            graph = %graph.id,
            anchor = %self.anchor.id,
            mode = %self.mode,
            inserted = self.mapping.inserted().len(),
            "Graph spliced"
        );

        Ok(Spliced {
            graph,
            mapping: self.mapping,
            roots: vec![entry],
            fork,
            join,
            anchor: self.anchor.id.clone(),
            mode: self.mode,
        })
    }

    /// Extra outgoing path from the anchor: anchor -> entry -> own end event.
    fn splice_sequential(&mut self, entry: &str, base: &str) -> Result<(), Error> {
        if matches!(self.anchor.kind, NodeKind::End) {
            return Err(self.conflict("an end event cannot start a new path"));
        }
        if self.source.outgoing(&self.anchor.id).is_empty() {
            return Err(self.conflict("anchor has no outgoing flow to run beside"));
        }
        let anchor = self.anchor.id.clone();
        let end = self.add_gateway(&format!("{}_end", base), NodeKind::End);
        self.add_flow(&anchor, entry);
        self.add_flow(entry, &end);
        Ok(())
    }

    /// Fork right before the anchor; with a join, merge right after it.
    fn splice_parallel(&mut self, entry: &str, base: &str) -> Result<(Option<String>, Option<String>), Error> {
        if !matches!(self.anchor.kind, NodeKind::UserTask { .. } | NodeKind::SubProcess) {
            return Err(self.conflict(format!("a {} cannot anchor a parallel branch", self.anchor.kind.label())));
        }
        let anchor = self.anchor.id.clone();
        let incoming: Vec<String> = self.source.incoming(&anchor).iter().map(|f| f.id.clone()).collect();
        if incoming.len() != 1 {
            return Err(self.conflict(format!("anchor has {} incoming flows, expected exactly one", incoming.len())));
        }
        let outgoing: Vec<String> = self.source.outgoing(&anchor).iter().map(|f| f.id.clone()).collect();
        let joins = self.mode == SpliceMode::ParallelJoin;
        if joins && outgoing.len() != 1 {
            return Err(self.conflict(format!(
                "cannot merge after an anchor with {} outgoing flows",
                outgoing.len()
            )));
        }

        let fork_id = self.fresh_id(&format!("{}_fork", base));
        let join_id = self.fresh_id(&format!("{}_join", base));
        let fork = self.add_gateway(&fork_id, NodeKind::Fork {
            join: joins.then(|| join_id.clone()),
        });
        self.retarget(&incoming[0], &fork);
        self.add_flow(&fork, &anchor);
        self.add_flow(&fork, entry);

        if !joins {
            let end = self.add_gateway(&format!("{}_end", base), NodeKind::End);
            self.add_flow(entry, &end);
            return Ok((Some(fork), None));
        }

        let join = self.add_gateway(&join_id, NodeKind::Join { fork: Some(fork.clone()) });
        self.resource(&outgoing[0], &join);
        self.add_flow(&anchor, &join);
        self.add_flow(entry, &join);
        Ok((Some(fork), Some(join)))
    }

    /// Adds the insertion's nodes next to the anchor and returns its entry node id.
    fn add_insertion(&mut self, insertion: &Insertion, resolver: &dyn GraphResolver) -> Result<String, Error> {
        let scope = self.anchor.scope.clone();
        match insertion {
            Insertion::UserTask(spec) => {
                self.add_node(GraphNode {
                    id: spec.id().to_string(),
                    kind: NodeKind::UserTask {
                        name: spec.name().to_string(),
                        assignee: spec.assignee().map(str::to_string),
                    },
                    scope,
                })?;
                Ok(spec.id().to_string())
            }
            Insertion::SubProcess(spec) => {
                let inlined = resolver.resolve_graph(spec.definition())
                    .ok_or_else(|| Error::UnresolvedReference(spec.definition().to_string()))?;
                let block = spec.id();
                self.add_node(GraphNode {
                    id: block.to_string(),
                    kind: NodeKind::SubProcess,
                    scope,
                })?;

                let prefix = |id: &str| format!("{}_{}", block, id);
                for node in inlined.nodes() {
                    let kind = match &node.kind {
                        NodeKind::Fork { join } => NodeKind::Fork { join: join.as_deref().map(prefix) },
                        NodeKind::Join { fork } => NodeKind::Join { fork: fork.as_deref().map(prefix) },
                        other => other.clone(),
                    };
                    self.add_node(GraphNode {
                        id: prefix(&node.id),
                        kind,
                        scope: Some(node.scope.as_deref().map_or_else(|| block.to_string(), prefix)),
                    })?;
                }
                for flow in inlined.flows() {
                    self.flows.push(SequenceFlow {
                        id: prefix(&flow.id),
                        source: prefix(&flow.source),
                        target: prefix(&flow.target),
                    });
                }
                Ok(block.to_string())
            }
        }
    }

    fn add_node(&mut self, node: GraphNode) -> Result<(), Error> {
        if self.mapping.resolve(&node.id).is_some() {
            return Err(self.conflict(format!("node id '{}' already exists", node.id)));
        }
        self.mapping.insert(&node.id);
        self.nodes.push(node);
        Ok(())
    }

    /// Adds a generated node next to the anchor. Generated ids never collide: a
    /// taken id gets a numeric suffix.
    fn add_gateway(&mut self, id: &str, kind: NodeKind) -> String {
        let id = self.fresh_id(id);
        self.mapping.insert(&id);
        self.nodes.push(GraphNode {
            id: id.clone(),
            kind,
            scope: self.anchor.scope.clone(),
        });
        id
    }

    fn fresh_id(&self, base: &str) -> String {
        if self.mapping.resolve(base).is_none() {
            return base.to_string();
        }
        (2..)
            .map(|n| format!("{}_{}", base, n))
            .find(|candidate| self.mapping.resolve(candidate).is_none())
            .unwrap_or_else(|| base.to_string())
    }

    fn add_flow(&mut self, source: &str, target: &str) {
        let id = loop {
            self.flow_seq += 1;
            let candidate = format!("flow_{}_{}", source, self.flow_seq);
            if !self.flows.iter().any(|f| f.id == candidate) {
                break candidate;
            }
        };
        self.flows.push(SequenceFlow {
            id,
            source: source.to_string(),
            target: target.to_string(),
        });
    }

    /// Points an existing flow at a new target, keeping its id.
    fn retarget(&mut self, flow_id: &str, target: &str) {
        if let Some(flow) = self.flows.iter_mut().find(|f| f.id == flow_id) {
            flow.target = target.to_string();
        }
    }

    /// Lets an existing flow leave from a new source, keeping its id.
    fn resource(&mut self, flow_id: &str, source: &str) {
        if let Some(flow) = self.flows.iter_mut().find(|f| f.id == flow_id) {
            flow.source = source.to_string();
        }
    }
}
