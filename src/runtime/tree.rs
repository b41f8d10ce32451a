use std::collections::{BTreeMap, HashMap};
use serde::{Serialize, Deserialize};
use serde_json::Value;
use uuid::Uuid;
use crate::runtime::definition::DefinitionId;

/// A live position in a running instance.
///
/// The root pointer stands for the instance scope itself; sub-process pointers
/// are scopes for the pointers nested under them. Concurrent branches are
/// siblings sharing the scope pointer as parent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionPointer {
    pub id: Uuid,
    pub instance_id: Uuid,
    pub parent: Option<Uuid>,
    pub node_id: String,
}

/// Arrival bookkeeping for one join gateway inside one scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinCounter {
    pub scope: Uuid,
    pub join: String,
    pub expected: usize,
    pub arrived: usize,
}

impl JoinCounter {
    pub fn new(scope: Uuid, join: &str, expected: usize) -> Self {
        Self {
            scope,
            join: join.to_string(),
            expected,
            arrived: 0,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.arrived >= self.expected
    }
}

/// Runtime state of one process start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    pub id: Uuid,
    pub definition: DefinitionId,
    pub root: Uuid,
    /// Bumped by the tree store on every commit.
    pub revision: u64,
    pub pointers: BTreeMap<Uuid, ExecutionPointer>,
    pub joins: Vec<JoinCounter>,
    pub variables: HashMap<String, Value>,
}

/// A single change to an execution tree. Commits are lists of these, applied
/// all-or-nothing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TreeMutation {
    Retarget { definition: DefinitionId },
    Rebind { pointer: Uuid, node: String },
    Spawn(ExecutionPointer),
    Remove { pointer: Uuid },
    ArmJoin(JoinCounter),
    Arrive { scope: Uuid, join: String, expected: usize },
    ReleaseJoin { scope: Uuid, join: String },
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TreeError {
    #[error("pointer {0} does not exist")]
    UnknownPointer(Uuid),
    #[error("pointer {0} already exists")]
    DuplicatePointer(Uuid),
    #[error("no join counter for '{join}' in scope {scope}")]
    UnknownJoin { scope: Uuid, join: String },
}

impl Instance {
    /// A fresh instance whose root pointer sits on the process start event.
    pub fn new(definition: DefinitionId, start_node: &str, variables: HashMap<String, Value>) -> Self {
        let id = Uuid::new_v4();
        let root = ExecutionPointer {
            id: Uuid::new_v4(),
            instance_id: id,
            parent: None,
            node_id: start_node.to_string(),
        };
        let root_id = root.id;
        Self {
            id,
            definition,
            root: root_id,
            revision: 0,
            pointers: BTreeMap::from([(root_id, root)]),
            joins: Vec::new(),
            variables,
        }
    }

    pub fn pointer(&self, id: Uuid) -> Option<&ExecutionPointer> {
        self.pointers.get(&id)
    }

    pub fn children(&self, parent: Uuid) -> impl Iterator<Item = &ExecutionPointer> {
        self.pointers.values().filter(move |p| p.parent == Some(parent))
    }

    pub fn has_children(&self, parent: Uuid) -> bool {
        self.children(parent).next().is_some()
    }

    /// Pointers without children: the positions where the instance is waiting.
    pub fn leaves(&self) -> impl Iterator<Item = &ExecutionPointer> {
        self.pointers.values().filter(|p| !self.has_children(p.id) && p.id != self.root)
    }

    pub fn join(&self, scope: Uuid, join: &str) -> Option<&JoinCounter> {
        self.joins.iter().find(|c| c.scope == scope && c.join == join)
    }

    /// The process has ended once the root pointer is gone.
    pub fn is_ended(&self) -> bool {
        !self.pointers.contains_key(&self.root)
    }

    pub fn apply(&mut self, mutation: &TreeMutation) -> Result<(), TreeError> {
        match mutation {
            TreeMutation::Retarget { definition } => {
                self.definition = definition.clone();
            }
            TreeMutation::Rebind { pointer, node } => {
                let p = self.pointers.get_mut(pointer).ok_or(TreeError::UnknownPointer(*pointer))?;
                p.node_id = node.clone();
            }
            TreeMutation::Spawn(pointer) => {
                if self.pointers.contains_key(&pointer.id) {
                    return Err(TreeError::DuplicatePointer(pointer.id));
                }
                if let Some(parent) = pointer.parent {
                    if !self.pointers.contains_key(&parent) {
                        return Err(TreeError::UnknownPointer(parent));
                    }
                }
                self.pointers.insert(pointer.id, pointer.clone());
            }
            TreeMutation::Remove { pointer } => {
                self.pointers.remove(pointer).ok_or(TreeError::UnknownPointer(*pointer))?;
                self.joins.retain(|c| c.scope != *pointer);
            }
            TreeMutation::ArmJoin(counter) => {
                self.joins.retain(|c| !(c.scope == counter.scope && c.join == counter.join));
                self.joins.push(counter.clone());
            }
            TreeMutation::Arrive { scope, join, expected } => {
                match self.joins.iter_mut().find(|c| c.scope == *scope && c.join == *join) {
                    Some(counter) => counter.arrived += 1,
                    None => {
                        let mut counter = JoinCounter::new(*scope, join, *expected);
                        counter.arrived = 1;
                        self.joins.push(counter);
                    }
                }
            }
            TreeMutation::ReleaseJoin { scope, join } => {
                let before = self.joins.len();
                self.joins.retain(|c| !(c.scope == *scope && c.join == *join));
                if self.joins.len() == before {
                    return Err(TreeError::UnknownJoin { scope: *scope, join: join.clone() });
                }
            }
        }
        Ok(())
    }
}

/// A working copy of an instance plus the mutations that produced it.
#[derive(Debug, Clone)]
pub struct StagedTree {
    base_revision: u64,
    working: Instance,
    mutations: Vec<TreeMutation>,
}

impl StagedTree {
    pub fn new(instance: Instance) -> Self {
        Self {
            base_revision: instance.revision,
            working: instance,
            mutations: Vec::new(),
        }
    }

    pub fn view(&self) -> &Instance {
        &self.working
    }

    pub fn push(&mut self, mutation: TreeMutation) -> Result<(), TreeError> {
        self.working.apply(&mutation)?;
        self.mutations.push(mutation);
        Ok(())
    }

    pub fn base_revision(&self) -> u64 {
        self.base_revision
    }

    pub fn mutations(&self) -> &[TreeMutation] {
        &self.mutations
    }
}
