use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Serialize, Deserialize};
use tracing::{debug, info};
use crate::error::StoreError;
use crate::runtime::graph::Graph;

/// Identity of a deployed definition: key plus version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DefinitionId {
    pub key: String,
    pub version: u32,
}

impl DefinitionId {
    pub fn new(key: impl Into<String>, version: u32) -> Self {
        Self { key: key.into(), version }
    }
}

impl fmt::Display for DefinitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.key, self.version)
    }
}

/// An immutable, versioned process graph.
#[derive(Debug, Clone)]
pub struct Definition {
    pub id: DefinitionId,
    pub name: String,
    pub graph: Arc<Graph>,
    pub derived_from: Option<DefinitionId>,
}

/// Append-only definition storage.
#[async_trait]
pub trait DefinitionStore: Send + Sync {
    async fn resolve(&self, id: &DefinitionId) -> Result<Arc<Definition>, StoreError>;

    /// Stores `graph` under the next version of its key. Versions are never
    /// handed out twice, even after a delete.
    async fn persist(&self, graph: Graph, derived_from: Option<DefinitionId>) -> Result<Arc<Definition>, StoreError>;

    /// Highest deployed version of `key`. Derived definitions are skipped.
    async fn latest(&self, key: &str) -> Result<Arc<Definition>, StoreError>;

    async fn query_derived(&self, derived_from: Option<&DefinitionId>) -> Result<Vec<Arc<Definition>>, StoreError>;

    async fn delete(&self, id: &DefinitionId) -> Result<(), StoreError>;
}

/// Synchronous lookup of graphs by definition id, used while splicing.
pub trait GraphResolver {
    fn resolve_graph(&self, id: &DefinitionId) -> Option<Arc<Graph>>;
}

impl GraphResolver for HashMap<DefinitionId, Arc<Graph>> {
    fn resolve_graph(&self, id: &DefinitionId) -> Option<Arc<Graph>> {
        self.get(id).cloned()
    }
}

// --- In-Memory Implementation ---

#[derive(Default)]
struct Versions {
    // 已分配的最大版本号，删除后不回退
    issued: u32,
    definitions: BTreeMap<u32, Arc<Definition>>,
}

pub struct InMemoryDefinitionStore {
    keys: DashMap<String, Versions>,
}

impl InMemoryDefinitionStore {
    pub fn new() -> Self {
        Self {
            keys: DashMap::new(),
        }
    }

    fn not_found(id: impl ToString) -> StoreError {
        StoreError::NotFound {
            kind: "definition",
            id: id.to_string(),
        }
    }
}

impl Default for InMemoryDefinitionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphResolver for InMemoryDefinitionStore {
    fn resolve_graph(&self, id: &DefinitionId) -> Option<Arc<Graph>> {
        self.keys.get(&id.key)
            .and_then(|versions| versions.definitions.get(&id.version).map(|d| d.graph.clone()))
    }
}

#[async_trait]
impl DefinitionStore for InMemoryDefinitionStore {
    async fn resolve(&self, id: &DefinitionId) -> Result<Arc<Definition>, StoreError> {
        self.keys.get(&id.key)
            .and_then(|versions| versions.definitions.get(&id.version).cloned())
            .ok_or_else(|| Self::not_found(id))
    }

    async fn persist(&self, graph: Graph, derived_from: Option<DefinitionId>) -> Result<Arc<Definition>, StoreError> {
        // The entry guard serializes version allocation per key.
        let mut versions = self.keys.entry(graph.id.clone()).or_default();
        versions.issued += 1;
        let version = versions.issued;

        let definition = Arc::new(Definition {
            id: DefinitionId::new(graph.id.clone(), version),
            name: graph.name.clone(),
            graph: Arc::new(graph),
            derived_from,
        });
        versions.definitions.insert(version, definition.clone());
        debug!(definition = %definition.id, "Definition stored");
        Ok(definition)
    }

    async fn latest(&self, key: &str) -> Result<Arc<Definition>, StoreError> {
        self.keys.get(key)
            .and_then(|versions| {
                versions.definitions.values()
                    .rev()
                    .find(|d| d.derived_from.is_none())
                    .cloned()
            })
            .ok_or_else(|| Self::not_found(key))
    }

    async fn query_derived(&self, derived_from: Option<&DefinitionId>) -> Result<Vec<Arc<Definition>>, StoreError> {
        let mut found: Vec<Arc<Definition>> = self.keys.iter()
            .flat_map(|entry| entry.value().definitions.values().cloned().collect::<Vec<_>>())
            .filter(|d| match derived_from {
                Some(source) => d.derived_from.as_ref() == Some(source),
                None => d.derived_from.is_some(),
            })
            .collect();
        found.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(found)
    }

    async fn delete(&self, id: &DefinitionId) -> Result<(), StoreError> {
        let mut versions = self.keys.get_mut(&id.key).ok_or_else(|| Self::not_found(id))?;
        versions.definitions.remove(&id.version).ok_or_else(|| Self::not_found(id))?;
        Ok(())
    }
}

/// Turns spliced graphs into derived definitions of their source.
pub struct Registry {
    store: Arc<dyn DefinitionStore>,
    name_suffix: String,
}

impl Registry {
    pub fn new(store: Arc<dyn DefinitionStore>, name_suffix: impl Into<String>) -> Self {
        Self {
            store,
            name_suffix: name_suffix.into(),
        }
    }

    /// Persists `graph` as a new version of `source`'s key, derived from `source`.
    /// Every call allocates a fresh version.
    pub async fn register(&self, graph: Graph, source: &Definition) -> Result<Arc<Definition>, StoreError> {
        if graph.id != source.id.key {
            return Err(StoreError::Rejected(format!(
                "graph '{}' cannot be registered under key '{}'",
                graph.id, source.id.key
            )));
        }
        let mut graph = graph;
        if !graph.name.ends_with(&self.name_suffix) {
            graph.name = format!("{}{}", source.name, self.name_suffix);
        }

        let definition = self.store.persist(graph, Some(source.id.clone())).await?;
        info!(definition = %definition.id, derived_from = %source.id, "Derived definition registered");
        Ok(definition)
    }

    pub async fn derived_from(&self, source: &DefinitionId) -> Result<Vec<Arc<Definition>>, StoreError> {
        self.store.query_derived(Some(source)).await
    }

    /// Every definition that was produced by splicing.
    pub async fn all_derived(&self) -> Result<Vec<Arc<Definition>>, StoreError> {
        self.store.query_derived(None).await
    }
}
