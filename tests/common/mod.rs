#![allow(dead_code)]

use graft::dsl::Process;
use graft::dsl::builder::ProcessBuilder;
use graft::runtime::engine::Engine;
use graft::runtime::tasks::HumanTask;
use uuid::Uuid;

/// start -> "The Task" -> end
pub fn one_task_process() -> Process {
    ProcessBuilder::new("oneTask")
        .name("One task process")
        .start("start")
        .user_task("theTask", "The Task").build()
        .end("end")
        .connect("start", "theTask")
        .connect("theTask", "end")
        .build()
}

/// A sub-process running tasks A-D in parallel, with "After B" behind B, followed
/// by "After sub process".
pub fn diamond_process() -> Process {
    ProcessBuilder::new("testProcess01")
        .start("start")
        .sub_process("subProcess", |sp| {
            sp.start("subStart")
                .fork_joined("fork", "join")
                .user_task("taskA", "Task A").build()
                .user_task("taskB", "Task B").build()
                .user_task("taskC", "Task C").build()
                .user_task("taskD", "Task D").build()
                .user_task("afterB", "After B").build()
                .join("join")
                .end("subEnd")
                .connect("subStart", "fork")
                .connect("fork", "taskA")
                .connect("fork", "taskB")
                .connect("fork", "taskC")
                .connect("fork", "taskD")
                .connect("taskA", "join")
                .connect("taskB", "afterB")
                .connect("afterB", "join")
                .connect("taskC", "join")
                .connect("taskD", "join")
                .connect("join", "subEnd")
        })
        .user_task("afterSubProcess", "After sub process").build()
        .end("end")
        .connect("start", "subProcess")
        .connect("subProcess", "afterSubProcess")
        .connect("afterSubProcess", "end")
        .build()
}

/// Five parallel tasks "Task 1".."Task 5" between a paired fork and join.
pub fn five_parallel_process() -> Process {
    ProcessBuilder::new("testProcess02")
        .start("start")
        .fork_joined("fork", "join")
        .user_task("one", "Task 1").build()
        .user_task("two", "Task 2").build()
        .user_task("three", "Task 3").build()
        .user_task("four", "Task 4").build()
        .user_task("five", "Task 5").build()
        .join("join")
        .end("end")
        .connect("start", "fork")
        .connect("fork", "one")
        .connect("fork", "two")
        .connect("fork", "three")
        .connect("fork", "four")
        .connect("fork", "five")
        .connect("one", "join")
        .connect("two", "join")
        .connect("three", "join")
        .connect("four", "join")
        .connect("five", "join")
        .connect("join", "end")
        .build()
}

pub async fn task_named(engine: &Engine, instance_id: Uuid, name: &str) -> HumanTask {
    engine.tasks(instance_id).await
        .expect("Failed to query tasks")
        .into_iter()
        .find(|t| t.name == name)
        .unwrap_or_else(|| panic!("No open task named '{}'", name))
}

pub async fn task_names(engine: &Engine, instance_id: Uuid) -> Vec<String> {
    engine.tasks(instance_id).await
        .expect("Failed to query tasks")
        .into_iter()
        .map(|t| t.name)
        .collect()
}

pub async fn complete_all(engine: &Engine, instance_id: Uuid) {
    for task in engine.tasks(instance_id).await.expect("Failed to query tasks") {
        engine.complete_task(task.id).await.expect("Failed to complete task");
    }
}

// --- Fault-injecting collaborators ---

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use async_trait::async_trait;
use dashmap::DashMap;
use graft::error::{StoreError, TaskError};
use graft::runtime::definition::{Definition, DefinitionId, DefinitionStore, InMemoryDefinitionStore};
use graft::runtime::graph::Graph;
use graft::runtime::storage::{InMemoryTreeStore, TreeStore};
use graft::runtime::tasks::{InMemoryTaskService, NewTask, TaskService};
use graft::runtime::tree::{Instance, TreeMutation};

/// Rejects derived definitions while `reject_derived` is set.
#[derive(Default)]
pub struct RejectingDefinitionStore {
    inner: InMemoryDefinitionStore,
    pub reject_derived: AtomicBool,
}

#[async_trait]
impl DefinitionStore for RejectingDefinitionStore {
    async fn resolve(&self, id: &DefinitionId) -> Result<Arc<Definition>, StoreError> {
        self.inner.resolve(id).await
    }

    async fn persist(&self, graph: Graph, derived_from: Option<DefinitionId>) -> Result<Arc<Definition>, StoreError> {
        if derived_from.is_some() && self.reject_derived.load(Ordering::SeqCst) {
            return Err(StoreError::Rejected("definition store is read-only".to_string()));
        }
        self.inner.persist(graph, derived_from).await
    }

    async fn latest(&self, key: &str) -> Result<Arc<Definition>, StoreError> {
        self.inner.latest(key).await
    }

    async fn query_derived(&self, derived_from: Option<&DefinitionId>) -> Result<Vec<Arc<Definition>>, StoreError> {
        self.inner.query_derived(derived_from).await
    }

    async fn delete(&self, id: &DefinitionId) -> Result<(), StoreError> {
        self.inner.delete(id).await
    }
}

/// Fails the next `fail_commits` commits.
#[derive(Default)]
pub struct FlakyTreeStore {
    inner: InMemoryTreeStore,
    pub fail_commits: AtomicUsize,
}

#[async_trait]
impl TreeStore for FlakyTreeStore {
    async fn insert_tree(&self, instance: Instance) -> Result<(), StoreError> {
        self.inner.insert_tree(instance).await
    }

    async fn load_tree(&self, instance_id: Uuid) -> Result<Instance, StoreError> {
        self.inner.load_tree(instance_id).await
    }

    async fn commit_tree(&self, instance_id: Uuid, expected_revision: u64, mutations: &[TreeMutation]) -> Result<Instance, StoreError> {
        let pending = self.fail_commits.load(Ordering::SeqCst);
        if pending > 0 {
            self.fail_commits.store(pending - 1, Ordering::SeqCst);
            return Err(StoreError::Rejected("tree store unavailable".to_string()));
        }
        self.inner.commit_tree(instance_id, expected_revision, mutations).await
    }

    async fn is_archived(&self, instance_id: Uuid) -> Result<bool, StoreError> {
        self.inner.is_archived(instance_id).await
    }

    async fn instances_of(&self, definition: &DefinitionId) -> Result<Vec<Uuid>, StoreError> {
        self.inner.instances_of(definition).await
    }

    async fn delete_tree(&self, instance_id: Uuid) -> Result<(), StoreError> {
        self.inner.delete_tree(instance_id).await
    }
}

/// Fails the next `fail_creates` task creations and counts every attempt.
/// `fail_completes` does the same for task completions.
#[derive(Default)]
pub struct FlakyTaskService {
    inner: InMemoryTaskService,
    pub fail_creates: AtomicUsize,
    pub fail_completes: AtomicUsize,
    pub attempts: AtomicUsize,
}

#[async_trait]
impl TaskService for FlakyTaskService {
    async fn create_task(&self, task: NewTask) -> Result<HumanTask, TaskError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let pending = self.fail_creates.load(Ordering::SeqCst);
        if pending > 0 {
            self.fail_creates.store(pending - 1, Ordering::SeqCst);
            return Err(TaskError::Unavailable("task service timed out".to_string()));
        }
        self.inner.create_task(task).await
    }

    async fn complete_task(&self, task_id: Uuid) -> Result<HumanTask, TaskError> {
        let pending = self.fail_completes.load(Ordering::SeqCst);
        if pending > 0 {
            self.fail_completes.store(pending - 1, Ordering::SeqCst);
            return Err(TaskError::Unavailable("task service timed out".to_string()));
        }
        self.inner.complete_task(task_id).await
    }

    async fn get_task(&self, task_id: Uuid) -> Result<Option<HumanTask>, TaskError> {
        self.inner.get_task(task_id).await
    }

    async fn task_for_pointer(&self, pointer_id: Uuid) -> Result<Option<HumanTask>, TaskError> {
        self.inner.task_for_pointer(pointer_id).await
    }

    async fn query_tasks(&self, instance_id: Uuid) -> Result<Vec<HumanTask>, TaskError> {
        self.inner.query_tasks(instance_id).await
    }

    async fn delete_for_instance(&self, instance_id: Uuid) -> Result<(), TaskError> {
        self.inner.delete_for_instance(instance_id).await
    }
}

/// Stores every create request as a new task, whatever pointer it is for.
#[derive(Default)]
pub struct ForgetfulTaskService {
    tasks: DashMap<Uuid, HumanTask>,
}

#[async_trait]
impl TaskService for ForgetfulTaskService {
    async fn create_task(&self, task: NewTask) -> Result<HumanTask, TaskError> {
        let record = HumanTask {
            id: Uuid::new_v4(),
            instance_id: task.instance_id,
            pointer_id: task.pointer_id,
            definition_key: task.definition_key,
            name: task.name,
            assignee: task.assignee,
        };
        self.tasks.insert(record.id, record.clone());
        Ok(record)
    }

    async fn complete_task(&self, task_id: Uuid) -> Result<HumanTask, TaskError> {
        self.tasks.remove(&task_id).map(|(_, t)| t).ok_or(TaskError::NotFound(task_id))
    }

    async fn get_task(&self, task_id: Uuid) -> Result<Option<HumanTask>, TaskError> {
        Ok(self.tasks.get(&task_id).map(|t| t.value().clone()))
    }

    async fn task_for_pointer(&self, pointer_id: Uuid) -> Result<Option<HumanTask>, TaskError> {
        Ok(self.tasks.iter().find(|t| t.pointer_id == pointer_id).map(|t| t.value().clone()))
    }

    async fn query_tasks(&self, instance_id: Uuid) -> Result<Vec<HumanTask>, TaskError> {
        let mut tasks: Vec<HumanTask> = self.tasks.iter()
            .filter(|t| t.instance_id == instance_id)
            .map(|t| t.value().clone())
            .collect();
        tasks.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(tasks)
    }

    async fn delete_for_instance(&self, instance_id: Uuid) -> Result<(), TaskError> {
        self.tasks.retain(|_, t| t.instance_id != instance_id);
        Ok(())
    }
}
