use std::collections::HashMap;
use std::sync::Arc;
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time::timeout;
use tracing::{debug, info, warn};
use uuid::Uuid;
use crate::compiler::core::Compiler;
use crate::config::EngineConfig;
use crate::dsl::Process;
use crate::error::{Error, GraphError, StoreError, TaskError};
use crate::runtime::definition::{Definition, DefinitionId, DefinitionStore, InMemoryDefinitionStore, Registry};
use crate::runtime::executor::Agenda;
use crate::runtime::graph::{Graph, NodeKind};
use crate::runtime::storage::{InMemoryTreeStore, TreeStore};
use crate::runtime::tasks::{HumanTask, InMemoryTaskService, NewTask, TaskService};
use crate::runtime::tree::{Instance, StagedTree};

/// Runs process instances over the definition, tree and task collaborators.
///
/// Mutations of one instance are serialized through a per-instance lock; different
/// instances never contend.
pub struct Engine {
    pub(crate) config: EngineConfig,
    pub(crate) definitions: Arc<dyn DefinitionStore>,
    pub(crate) trees: Arc<dyn TreeStore>,
    pub(crate) tasks: Arc<dyn TaskService>,
    pub(crate) registry: Registry,
    locks: DashMap<Uuid, Arc<Mutex<()>>>,
}

impl Engine {
    /// In-memory engine with the default configuration.
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Self::with_services(
            config,
            Arc::new(InMemoryDefinitionStore::new()),
            Arc::new(InMemoryTreeStore::new()),
            Arc::new(InMemoryTaskService::new()),
        )
    }

    pub fn with_services(
        config: EngineConfig,
        definitions: Arc<dyn DefinitionStore>,
        trees: Arc<dyn TreeStore>,
        tasks: Arc<dyn TaskService>,
    ) -> Self {
        let registry = Registry::new(definitions.clone(), config.derived_name_suffix.clone());
        Self {
            config,
            definitions,
            trees,
            tasks,
            registry,
            locks: DashMap::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    // --- Definitions ---

    pub async fn deploy(&self, process: Process) -> Result<Arc<Definition>, Error> {
        let mut compiler = Compiler::new();
        let graph = compiler.compile(process)?;
        self.deploy_graph(graph).await
    }

    pub async fn deploy_graph(&self, graph: Graph) -> Result<Arc<Definition>, Error> {
        let definition = self.definitions.persist(graph, None).await?;
        info!(definition = %definition.id, name = %definition.name, "Definition deployed");
        Ok(definition)
    }

    pub async fn definition(&self, id: &DefinitionId) -> Result<Arc<Definition>, Error> {
        Ok(self.definitions.resolve(id).await?)
    }

    pub async fn latest(&self, key: &str) -> Result<Arc<Definition>, Error> {
        self.definitions.latest(key).await.map_err(|e| match e {
            StoreError::NotFound { .. } => Error::UnknownKey(key.to_string()),
            other => Error::Persistence(other),
        })
    }

    /// Deletes one definition version. With `cascade`, the instances bound to it
    /// and their tasks go too; without it, a definition still in use is kept.
    pub async fn delete_definition(&self, id: &DefinitionId, cascade: bool) -> Result<usize, Error> {
        let instances = self.trees.instances_of(id).await?;
        if !instances.is_empty() && !cascade {
            return Err(Error::DefinitionInUse {
                definition: id.clone(),
                instances: instances.len(),
            });
        }

        for instance_id in &instances {
            let _guard = self.lock(*instance_id).await?;
            self.tasks.delete_for_instance(*instance_id).await.map_err(Self::task_error(None))?;
            self.trees.delete_tree(*instance_id).await?;
            self.locks.remove(instance_id);
        }
        self.definitions.delete(id).await?;
        info!(definition = %id, instances = instances.len(), "Definition deleted");
        Ok(instances.len())
    }

    /// Removes every definition produced by injection, together with its instances.
    pub async fn remove_derived_definitions(&self) -> Result<usize, Error> {
        let derived = self.registry.all_derived().await?;
        for definition in &derived {
            self.delete_definition(&definition.id, true).await?;
        }
        Ok(derived.len())
    }

    // --- Instances ---

    /// Starts the latest deployed (non-derived) version of `key` and runs it to its first wait states.
    pub async fn start_process(&self, key: &str, variables: HashMap<String, Value>) -> Result<Uuid, Error> {
        let definition = self.latest(key).await?;
        let graph = definition.graph.as_ref();
        let start = graph.start_of(None)
            .ok_or_else(|| GraphError::invalid(&graph.id, "no start event"))?;

        let mut vars = graph.variables.clone();
        vars.extend(variables);
        let instance = Instance::new(definition.id.clone(), &start.id, vars);
        let instance_id = instance.id;
        let root = instance.root;
        let guard = self.lock(instance_id).await?;
        self.trees.insert_tree(instance.clone()).await?;

        let mut agenda = Agenda::new(graph, StagedTree::new(instance));
        agenda.enter(&start.id, root);
        agenda.run()?;
        let (staged, created) = agenda.finish();
        let committed = self.commit(staged).await?;
        drop(guard);
        info!(instance_id = %instance_id, definition = %definition.id, "Process started");

        self.materialize(&committed, graph, &created).await?;
        Ok(instance_id)
    }

    /// Completes a human task and moves its token on.
    pub async fn complete_task(&self, task_id: Uuid) -> Result<(), Error> {
        let task = self.tasks.get_task(task_id).await
            .map_err(Self::task_error(None))?
            .ok_or(Error::TaskNotFound(task_id))?;

        let guard = self.lock(task.instance_id).await?;
        let instance = self.load(task.instance_id).await?;
        if instance.pointer(task.pointer_id).is_none() {
            // The token already moved on in an earlier call whose record update failed.
            self.tasks.complete_task(task_id).await.map_err(Self::task_error(Some(task.pointer_id)))?;
            warn!(instance_id = %task.instance_id, task = %task.name, pointer = %task.pointer_id, "Closed task of a consumed pointer");
            return Ok(());
        }
        let definition = self.definitions.resolve(&instance.definition).await?;
        let graph = definition.graph.as_ref();

        let mut agenda = Agenda::new(graph, StagedTree::new(instance));
        agenda.complete(task.pointer_id)?;
        agenda.run()?;
        let (staged, created) = agenda.finish();
        let committed = self.commit(staged).await?;
        self.tasks.complete_task(task_id).await.map_err(Self::task_error(Some(task.pointer_id)))?;
        drop(guard);
        info!(instance_id = %task.instance_id, task = %task.name, "Task completed");

        if committed.is_ended() {
            info!(instance_id = %task.instance_id, "Process instance ended");
            self.locks.remove(&task.instance_id);
            return Ok(());
        }
        self.materialize(&committed, graph, &created).await?;
        Ok(())
    }

    /// Open tasks of an instance, ordered by name.
    pub async fn tasks(&self, instance_id: Uuid) -> Result<Vec<HumanTask>, Error> {
        self.tasks.query_tasks(instance_id).await.map_err(Self::task_error(None))
    }

    pub async fn task(&self, task_id: Uuid) -> Result<HumanTask, Error> {
        self.tasks.get_task(task_id).await
            .map_err(Self::task_error(None))?
            .ok_or(Error::TaskNotFound(task_id))
    }

    pub async fn is_ended(&self, instance_id: Uuid) -> Result<bool, Error> {
        self.trees.is_archived(instance_id).await.map_err(|e| Self::instance_error(instance_id, e))
    }

    pub async fn instance(&self, instance_id: Uuid) -> Result<Instance, Error> {
        self.load(instance_id).await
    }

    pub async fn variable(&self, instance_id: Uuid, name: &str) -> Result<Option<Value>, Error> {
        Ok(self.load(instance_id).await?.variables.get(name).cloned())
    }

    /// Creates the missing tasks of every waiting user-task pointer. Safe to repeat.
    pub async fn resume(&self, instance_id: Uuid) -> Result<Vec<HumanTask>, Error> {
        let _guard = self.lock(instance_id).await?;
        let instance = self.load(instance_id).await?;
        if instance.is_ended() {
            return Ok(Vec::new());
        }
        let definition = self.definitions.resolve(&instance.definition).await?;
        let waiting: Vec<Uuid> = instance.leaves().map(|p| p.id).collect();
        self.materialize(&instance, &definition.graph, &waiting).await
    }

    // --- Internals ---

    pub(crate) async fn lock(&self, instance_id: Uuid) -> Result<OwnedMutexGuard<()>, Error> {
        let mutex = self.locks.entry(instance_id).or_default().value().clone();
        timeout(self.config.lock_timeout(), mutex.lock_owned())
            .await
            .map_err(|_| {
                warn!(instance_id = %instance_id, timeout_ms = self.config.lock_timeout_ms, "Instance lock timed out");
                Error::Busy(instance_id)
            })
    }

    pub(crate) async fn load(&self, instance_id: Uuid) -> Result<Instance, Error> {
        self.trees.load_tree(instance_id).await.map_err(|e| Self::instance_error(instance_id, e))
    }

    pub(crate) async fn commit(&self, staged: StagedTree) -> Result<Instance, Error> {
        let instance_id = staged.view().id;
        let committed = self.trees.commit_tree(instance_id, staged.base_revision(), staged.mutations()).await?;
        debug!(instance_id = %instance_id, revision = committed.revision, mutations = staged.mutations().len(), "Tree committed");
        Ok(committed)
    }

    /// Creates the task owned by each user-task pointer in `pointers`, retrying
    /// failed creations. A pointer that already has a task keeps it.
    pub(crate) async fn materialize(&self, instance: &Instance, graph: &Graph, pointers: &[Uuid]) -> Result<Vec<HumanTask>, Error> {
        let mut created = Vec::new();
        for pointer_id in pointers {
            let Some(pointer) = instance.pointer(*pointer_id) else {
                continue;
            };
            let Some(NodeKind::UserTask { name, assignee }) = graph.node(&pointer.node_id).map(|n| &n.kind) else {
                continue;
            };
            let existing = self.tasks.task_for_pointer(pointer.id).await
                .map_err(Self::task_error(Some(pointer.id)))?;
            if let Some(task) = existing {
                created.push(task);
                continue;
            }
            let request = NewTask {
                instance_id: instance.id,
                pointer_id: pointer.id,
                definition_key: pointer.node_id.clone(),
                name: name.clone(),
                assignee: assignee.clone(),
            };
            created.push(self.create_task_with_retry(request).await?);
        }
        Ok(created)
    }

    async fn create_task_with_retry(&self, request: NewTask) -> Result<HumanTask, Error> {
        let attempts = self.config.resume_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.tasks.create_task(request.clone()).await {
                Ok(task) => {
                    debug!(task = %task.name, pointer = %task.pointer_id, "Task materialized");
                    return Ok(task);
                }
                Err(e) if attempt < attempts => {
                    warn!(pointer = %request.pointer_id, attempt, error = %e, "Task creation failed, retrying");
                    attempt += 1;
                }
                Err(e) => return Err(Self::task_error(Some(request.pointer_id))(e)),
            }
        }
    }

    fn task_error(pointer: Option<Uuid>) -> impl Fn(TaskError) -> Error {
        move |source| match source {
            TaskError::NotFound(id) => Error::TaskNotFound(id),
            other => Error::TaskService { pointer, source: other },
        }
    }

    fn instance_error(instance_id: Uuid, e: StoreError) -> Error {
        match e {
            StoreError::NotFound { .. } => Error::InstanceNotFound(instance_id),
            other => Error::Persistence(other),
        }
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}
