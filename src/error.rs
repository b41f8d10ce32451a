use thiserror::Error;
use uuid::Uuid;
use crate::compiler::splicer::SpliceMode;
use crate::injection::InjectionState;
use crate::runtime::definition::DefinitionId;
use crate::runtime::tree::TreeError;

/// A process graph that violates a structural invariant.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphError {
    #[error("invalid graph '{graph}': {reason}")]
    Invalid { graph: String, reason: String },
}

impl GraphError {
    pub fn invalid(graph: &str, reason: impl Into<String>) -> Self {
        GraphError::Invalid {
            graph: graph.to_string(),
            reason: reason.into(),
        }
    }
}

/// Failures reported by the definition and execution-tree stores.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },

    #[error("instance {instance} was modified concurrently (expected revision {expected}, found {found})")]
    Conflict { instance: Uuid, expected: u64, found: u64 },

    #[error("write rejected: {0}")]
    Rejected(String),
}

/// Failures reported by the human-task service.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TaskError {
    #[error("task {0} not found")]
    NotFound(Uuid),

    #[error("task service unavailable: {0}")]
    Unavailable(String),
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid anchor '{anchor}': {reason}")]
    InvalidAnchor { anchor: String, reason: String },

    #[error("structural conflict at '{anchor}' ({mode}): {reason}")]
    StructuralConflict {
        anchor: String,
        mode: SpliceMode,
        reason: String,
    },

    #[error("definition {0} cannot be resolved")]
    UnresolvedReference(String),

    #[error("persistence error: {0}")]
    Persistence(#[from] StoreError),

    #[error("migration conflict: pointer {pointer} is bound to '{node}', which has no mapping")]
    MigrationConflict { pointer: Uuid, node: String },

    #[error("task service error: {source}")]
    TaskService {
        /// The pointer whose task was being materialised, if any.
        pointer: Option<Uuid>,
        #[source]
        source: TaskError,
    },

    #[error(transparent)]
    InvalidGraph(#[from] GraphError),

    #[error("inconsistent execution tree: {0}")]
    Tree(#[from] TreeError),

    #[error("process instance {0} not found")]
    InstanceNotFound(Uuid),

    #[error("task {0} not found")]
    TaskNotFound(Uuid),

    #[error("no definition deployed for key '{0}'")]
    UnknownKey(String),

    #[error("definition {definition} is still used by {instances} running instance(s)")]
    DefinitionInUse { definition: DefinitionId, instances: usize },

    #[error("process instance {0} is busy")]
    Busy(Uuid),
}

impl Error {
    /// Whether repeating the same request can succeed without changing it.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Persistence(_) | Error::TaskService { .. } | Error::Busy(_)
        )
    }
}

/// A failed injection request, with the state it reached and what was asked for.
#[derive(Error, Debug)]
#[error("injection at '{anchor}' ({mode}) failed in state {state}: {source}")]
pub struct InjectionError {
    pub state: InjectionState,
    pub anchor: String,
    pub mode: SpliceMode,
    #[source]
    pub source: Error,
}

impl InjectionError {
    pub fn is_retryable(&self) -> bool {
        self.source.is_retryable()
    }
}
