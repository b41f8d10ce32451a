//! Injection of new activities into running process instances.
//!
//! Every request walks the same states: the anchor is resolved, the graph is
//! spliced, the spliced graph is registered as a derived definition, the live
//! tree is migrated onto it and finally the new pointers are resumed (their
//! tasks created). A failure before the migration commit leaves the instance
//! exactly as it was.

pub mod request;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use serde::{Serialize, Deserialize};
use tracing::{info, warn};
use uuid::Uuid;
use crate::compiler::splicer::{splice, Insertion, SpliceMode};
use crate::error::{Error, InjectionError, StoreError};
use crate::runtime::definition::{Definition, DefinitionId};
use crate::runtime::engine::Engine;
use crate::runtime::graph::Graph;
use crate::runtime::migrator::{migrate, InjectionRoots};
use crate::runtime::tasks::HumanTask;
use crate::runtime::tree::Instance;

pub use request::{RequestError, SubProcessSpec, UserTaskSpec};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InjectionState {
    Resolved,
    Spliced,
    Registered,
    Migrated,
    Resumed,
}

impl fmt::Display for InjectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InjectionState::Resolved => "resolved",
            InjectionState::Spliced => "spliced",
            InjectionState::Registered => "registered",
            InjectionState::Migrated => "migrated",
            InjectionState::Resumed => "resumed",
        };
        f.write_str(s)
    }
}

/// What an injection produced.
#[derive(Debug, Clone)]
pub struct InjectionOutcome {
    pub instance_id: Uuid,
    /// The derived definition the instance now runs on.
    pub definition: DefinitionId,
    /// Tasks created by the inserted nodes.
    pub tasks: Vec<HumanTask>,
    /// Scope pointer of an inserted sub-process.
    pub sub_process: Option<Uuid>,
    /// Every pointer created by the injection.
    pub pointers: Vec<Uuid>,
}

/// Tracks one request through its states so failures carry where they happened.
struct Attempt {
    state: InjectionState,
    anchor: String,
    mode: SpliceMode,
}

impl Attempt {
    fn new(anchor: impl Into<String>, mode: SpliceMode) -> Self {
        Self {
            state: InjectionState::Resolved,
            anchor: anchor.into(),
            mode,
        }
    }

    fn enter(&mut self, state: InjectionState) {
        self.state = state;
    }

    fn reached(&self, state: InjectionState, instance_id: Uuid) {
        info!(instance_id = %instance_id, anchor = %self.anchor, mode = %self.mode, state = %state, "Injection state reached");
    }

    fn fail(&self, source: impl Into<Error>) -> InjectionError {
        let source = source.into();
        warn!(
            anchor = %self.anchor,
            mode = %self.mode,
            state = %self.state,
            retryable = source.is_retryable(),
            error = %source,
            "Injection failed"
        );
        InjectionError {
            state: self.state,
            anchor: self.anchor.clone(),
            mode: self.mode,
            source,
        }
    }
}

/// A resolved request: the instance, its definition, and where the insertion goes.
struct Target {
    instance: Instance,
    definition: Arc<Definition>,
    anchor: String,
    parent: Uuid,
}

impl Engine {
    /// Adds `spec` to a running instance as a second path next to the one it is on.
    /// Only instances with a single active branch are supported.
    pub async fn inject_sequential_task(&self, instance_id: Uuid, spec: UserTaskSpec) -> Result<InjectionOutcome, InjectionError> {
        let mut attempt = Attempt::new(instance_id.to_string(), SpliceMode::ReplaceSequential);
        let guard = self.lock(instance_id).await.map_err(|e| attempt.fail(e))?;

        let instance = self.load(instance_id).await.map_err(|e| attempt.fail(e))?;
        let definition = self.definitions.resolve(&instance.definition).await.map_err(|e| attempt.fail(e))?;
        let start = definition.graph.start_of(None)
            .map(|n| n.id.clone())
            .ok_or_else(|| attempt.fail(Error::InvalidAnchor {
                anchor: instance_id.to_string(),
                reason: "process has no start event".to_string(),
            }))?;
        attempt.anchor = start.clone();

        let active = instance.leaves().count();
        if active != 1 {
            return Err(attempt.fail(Error::StructuralConflict {
                anchor: start,
                mode: attempt.mode,
                reason: format!("instance has {} active branches, expected exactly one", active),
            }));
        }
        let target = Target {
            parent: instance.root,
            instance,
            definition,
            anchor: start,
        };
        attempt.reached(InjectionState::Resolved, instance_id);

        let outcome = self.run_injection(&mut attempt, target, Insertion::UserTask(spec), &HashMap::new(), guard).await?;
        Ok(outcome)
    }

    /// Runs `spec` in parallel to the task `anchor_task_id`. With `join_on_complete`
    /// both have to finish before the anchor's continuation runs.
    pub async fn inject_parallel_task(&self, anchor_task_id: Uuid, spec: UserTaskSpec) -> Result<InjectionOutcome, InjectionError> {
        let mode = SpliceMode::parallel(spec.joins());
        let mut attempt = Attempt::new(anchor_task_id.to_string(), mode);
        let (target, guard) = self.resolve_task_anchor(&mut attempt, anchor_task_id).await?;
        let instance_id = target.instance.id;
        attempt.reached(InjectionState::Resolved, instance_id);

        self.run_injection(&mut attempt, target, Insertion::UserTask(spec), &HashMap::new(), guard).await
    }

    /// Embeds the graph of another deployed definition as a sub-process running in
    /// parallel to the task `anchor_task_id`.
    pub async fn inject_parallel_sub_process(&self, anchor_task_id: Uuid, spec: SubProcessSpec) -> Result<InjectionOutcome, InjectionError> {
        let mode = SpliceMode::parallel(spec.joins());
        let mut attempt = Attempt::new(anchor_task_id.to_string(), mode);
        let (target, guard) = self.resolve_task_anchor(&mut attempt, anchor_task_id).await?;
        let instance_id = target.instance.id;

        let inlined = self.definitions.resolve(spec.definition()).await.map_err(|e| match e {
            StoreError::NotFound { .. } => attempt.fail(Error::UnresolvedReference(spec.definition().to_string())),
            other => attempt.fail(other),
        })?;
        let resolver: HashMap<DefinitionId, Arc<Graph>> = HashMap::from([(inlined.id.clone(), inlined.graph.clone())]);
        attempt.reached(InjectionState::Resolved, instance_id);

        self.run_injection(&mut attempt, target, Insertion::SubProcess(spec), &resolver, guard).await
    }

    /// Locks the instance owning the task and anchors on the task's pointer.
    async fn resolve_task_anchor(
        &self,
        attempt: &mut Attempt,
        task_id: Uuid,
    ) -> Result<(Target, tokio::sync::OwnedMutexGuard<()>), InjectionError> {
        let task = self.task(task_id).await.map_err(|e| attempt.fail(e))?;
        let guard = self.lock(task.instance_id).await.map_err(|e| attempt.fail(e))?;

        let instance = self.load(task.instance_id).await.map_err(|e| attempt.fail(e))?;
        let pointer = instance.pointer(task.pointer_id).cloned().ok_or_else(|| attempt.fail(Error::InvalidAnchor {
            anchor: task.definition_key.clone(),
            reason: format!("task {} has no live execution pointer", task_id),
        }))?;
        attempt.anchor = pointer.node_id.clone();

        let parent = pointer.parent.ok_or_else(|| attempt.fail(Error::InvalidAnchor {
            anchor: pointer.node_id.clone(),
            reason: "the instance root cannot anchor a parallel branch".to_string(),
        }))?;
        let definition = self.definitions.resolve(&instance.definition).await.map_err(|e| attempt.fail(e))?;

        Ok((
            Target {
                instance,
                definition,
                anchor: pointer.node_id,
                parent,
            },
            guard,
        ))
    }

    /// SPLICED -> REGISTERED -> MIGRATED under the instance lock, then RESUMED.
    async fn run_injection(
        &self,
        attempt: &mut Attempt,
        target: Target,
        insertion: Insertion,
        resolver: &HashMap<DefinitionId, Arc<Graph>>,
        guard: tokio::sync::OwnedMutexGuard<()>,
    ) -> Result<InjectionOutcome, InjectionError> {
        let instance_id = target.instance.id;

        attempt.enter(InjectionState::Spliced);
        let spliced = splice(&target.definition.graph, &target.anchor, &insertion, attempt.mode, resolver)
            .map_err(|e| attempt.fail(e))?;
        attempt.reached(InjectionState::Spliced, instance_id);

        attempt.enter(InjectionState::Registered);
        let derived = self.registry.register(spliced.graph, &target.definition).await
            .map_err(|e| attempt.fail(e))?;
        attempt.reached(InjectionState::Registered, instance_id);

        attempt.enter(InjectionState::Migrated);
        let roots = InjectionRoots {
            nodes: spliced.roots,
            parent: target.parent,
            join: spliced.join,
        };
        let migration = migrate(&target.instance, &spliced.mapping, &derived, &roots)
            .map_err(|e| attempt.fail(e))?;
        let created = migration.created;
        let committed = self.commit(migration.staged).await.map_err(|e| attempt.fail(e))?;
        drop(guard);
        attempt.reached(InjectionState::Migrated, instance_id);

        attempt.enter(InjectionState::Resumed);
        let tasks = self.materialize(&committed, &derived.graph, &created).await
            .map_err(|e| attempt.fail(e))?;
        let sub_process = match &insertion {
            Insertion::SubProcess(spec) => created.iter()
                .copied()
                .find(|id| committed.pointer(*id).is_some_and(|p| p.node_id == spec.id())),
            Insertion::UserTask(_) => None,
        };
        attempt.reached(InjectionState::Resumed, instance_id);

        Ok(InjectionOutcome {
            instance_id,
            definition: derived.id.clone(),
            tasks,
            sub_process,
            pointers: created,
        })
    }
}
