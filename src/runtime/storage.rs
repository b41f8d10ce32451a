use async_trait::async_trait;
use uuid::Uuid;
use dashmap::DashMap;
use tracing::debug;
use crate::error::StoreError;
use crate::runtime::definition::DefinitionId;
use crate::runtime::tree::{Instance, TreeMutation};

// --- Interfaces ---

#[async_trait]
pub trait TreeStore: Send + Sync {
    async fn insert_tree(&self, instance: Instance) -> Result<(), StoreError>;

    /// Live or archived instance. Archived ones are read-only.
    async fn load_tree(&self, instance_id: Uuid) -> Result<Instance, StoreError>;

    /// Applies `mutations` as one unit on top of revision `expected_revision`.
    /// Returns the committed instance. An instance whose root is removed is archived.
    async fn commit_tree(
        &self,
        instance_id: Uuid,
        expected_revision: u64,
        mutations: &[TreeMutation],
    ) -> Result<Instance, StoreError>;

    async fn is_archived(&self, instance_id: Uuid) -> Result<bool, StoreError>;

    /// Live instances bound to `definition`.
    async fn instances_of(&self, definition: &DefinitionId) -> Result<Vec<Uuid>, StoreError>;

    async fn delete_tree(&self, instance_id: Uuid) -> Result<(), StoreError>;
}

// --- In-Memory Implementation ---

pub struct InMemoryTreeStore {
    live: DashMap<Uuid, Instance>,
    archived: DashMap<Uuid, Instance>,
}

impl InMemoryTreeStore {
    pub fn new() -> Self {
        Self {
            live: DashMap::new(),
            archived: DashMap::new(),
        }
    }

    fn not_found(instance_id: Uuid) -> StoreError {
        StoreError::NotFound {
            kind: "instance",
            id: instance_id.to_string(),
        }
    }
}

impl Default for InMemoryTreeStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TreeStore for InMemoryTreeStore {
    async fn insert_tree(&self, instance: Instance) -> Result<(), StoreError> {
        if self.live.contains_key(&instance.id) {
            return Err(StoreError::Rejected(format!("instance {} already exists", instance.id)));
        }
        self.live.insert(instance.id, instance);
        Ok(())
    }

    async fn load_tree(&self, instance_id: Uuid) -> Result<Instance, StoreError> {
        self.live.get(&instance_id)
            .or_else(|| self.archived.get(&instance_id))
            .map(|i| i.value().clone())
            .ok_or_else(|| Self::not_found(instance_id))
    }

    async fn commit_tree(
        &self,
        instance_id: Uuid,
        expected_revision: u64,
        mutations: &[TreeMutation],
    ) -> Result<Instance, StoreError> {
        let committed = {
            let mut stored = self.live.get_mut(&instance_id).ok_or_else(|| Self::not_found(instance_id))?;
            if stored.revision != expected_revision {
                return Err(StoreError::Conflict {
                    instance: instance_id,
                    expected: expected_revision,
                    found: stored.revision,
                });
            }

            // Apply on a copy so a failing mutation leaves the stored tree untouched.
            let mut next = stored.clone();
            for mutation in mutations {
                next.apply(mutation).map_err(|e| StoreError::Rejected(e.to_string()))?;
            }
            next.revision += 1;
            *stored = next.clone();
            next
        };

        if committed.is_ended() {
            self.live.remove(&instance_id);
            self.archived.insert(instance_id, committed.clone());
            debug!(instance_id = %instance_id, "Instance archived");
        }
        Ok(committed)
    }

    async fn is_archived(&self, instance_id: Uuid) -> Result<bool, StoreError> {
        if self.archived.contains_key(&instance_id) {
            return Ok(true);
        }
        if self.live.contains_key(&instance_id) {
            return Ok(false);
        }
        Err(Self::not_found(instance_id))
    }

    async fn instances_of(&self, definition: &DefinitionId) -> Result<Vec<Uuid>, StoreError> {
        Ok(self.live.iter()
            .filter(|i| &i.definition == definition)
            .map(|i| i.id)
            .collect())
    }

    async fn delete_tree(&self, instance_id: Uuid) -> Result<(), StoreError> {
        let live = self.live.remove(&instance_id).is_some();
        let archived = self.archived.remove(&instance_id).is_some();
        if live || archived {
            Ok(())
        } else {
            Err(Self::not_found(instance_id))
        }
    }
}
