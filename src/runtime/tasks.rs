use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Serialize, Deserialize};
use uuid::Uuid;
use crate::error::TaskError;

/// A human task owned by an execution pointer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HumanTask {
    pub id: Uuid,
    pub instance_id: Uuid,
    pub pointer_id: Uuid,
    /// Id of the user-task node that created it.
    pub definition_key: String,
    pub name: String,
    pub assignee: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewTask {
    pub instance_id: Uuid,
    pub pointer_id: Uuid,
    pub definition_key: String,
    pub name: String,
    pub assignee: Option<String>,
}

#[async_trait]
pub trait TaskService: Send + Sync {
    async fn create_task(&self, task: NewTask) -> Result<HumanTask, TaskError>;

    async fn complete_task(&self, task_id: Uuid) -> Result<HumanTask, TaskError>;

    async fn get_task(&self, task_id: Uuid) -> Result<Option<HumanTask>, TaskError>;

    async fn task_for_pointer(&self, pointer_id: Uuid) -> Result<Option<HumanTask>, TaskError>;

    /// Open tasks of an instance, ordered by name.
    async fn query_tasks(&self, instance_id: Uuid) -> Result<Vec<HumanTask>, TaskError>;

    async fn delete_for_instance(&self, instance_id: Uuid) -> Result<(), TaskError>;
}

pub struct InMemoryTaskService {
    tasks: DashMap<Uuid, HumanTask>,
    // Map<PointerId, TaskId>
    by_pointer: DashMap<Uuid, Uuid>,
}

impl InMemoryTaskService {
    pub fn new() -> Self {
        Self {
            tasks: DashMap::new(),
            by_pointer: DashMap::new(),
        }
    }
}

impl Default for InMemoryTaskService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskService for InMemoryTaskService {
    async fn create_task(&self, task: NewTask) -> Result<HumanTask, TaskError> {
        // One task per pointer: a repeated request returns the existing record.
        let id = *self.by_pointer.entry(task.pointer_id).or_insert_with(Uuid::new_v4);
        let record = self.tasks.entry(id).or_insert_with(|| HumanTask {
            id,
            instance_id: task.instance_id,
            pointer_id: task.pointer_id,
            definition_key: task.definition_key,
            name: task.name,
            assignee: task.assignee,
        });
        Ok(record.value().clone())
    }

    async fn complete_task(&self, task_id: Uuid) -> Result<HumanTask, TaskError> {
        let (_, task) = self.tasks.remove(&task_id).ok_or(TaskError::NotFound(task_id))?;
        self.by_pointer.remove(&task.pointer_id);
        Ok(task)
    }

    async fn get_task(&self, task_id: Uuid) -> Result<Option<HumanTask>, TaskError> {
        Ok(self.tasks.get(&task_id).map(|t| t.value().clone()))
    }

    async fn task_for_pointer(&self, pointer_id: Uuid) -> Result<Option<HumanTask>, TaskError> {
        let Some(task_id) = self.by_pointer.get(&pointer_id).map(|id| *id) else {
            return Ok(None);
        };
        self.get_task(task_id).await
    }

    async fn query_tasks(&self, instance_id: Uuid) -> Result<Vec<HumanTask>, TaskError> {
        let mut tasks: Vec<HumanTask> = self.tasks.iter()
            .filter(|t| t.instance_id == instance_id)
            .map(|t| t.value().clone())
            .collect();
        tasks.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(tasks)
    }

    async fn delete_for_instance(&self, instance_id: Uuid) -> Result<(), TaskError> {
        self.tasks.retain(|_, t| t.instance_id != instance_id);
        self.by_pointer.retain(|_, task_id| self.tasks.contains_key(task_id));
        Ok(())
    }
}
