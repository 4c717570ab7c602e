//! Storage layer for pim data.
//!
//! Graph mutations happen in memory; writing them out is explicit. Each node
//! carries an optional [`PersistenceHandle`] that names the store it belongs
//! to and remembers what was last written for it, so that a save only
//! touches rows that actually changed.
//!
//! ## Storage Backends
//!
//! - **SQLite** (default): one row per task plus relation tables for parent
//!   edges, tags, hyperlinks and user access
//! - **YAML**: the whole graph in one file under a top-level `tasks:` list

pub mod backend;
pub mod reconcile;
pub mod sqlite;
pub mod yaml;

pub use backend::{BackendType, TaskStore};
pub use reconcile::{Reconciliation, mark_and_sweep};
pub use sqlite::{SqliteStore, SyncStats};
pub use yaml::YamlStore;

use std::path::Path;
use std::sync::Arc;

use crate::models::TaskGraph;
use crate::{Error, Result};

/// What a store last wrote for one node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncState {
    /// A record for this node exists in storage
    pub persisted: bool,
    /// Parent ids whose edge to this node exists in storage
    pub saved_parent_ids: Vec<String>,
}

impl SyncState {
    pub fn has_parent_id(&self, id: &str) -> bool {
        self.saved_parent_ids.iter().any(|p| p == id)
    }

    pub fn add_parent_id(&mut self, id: &str) {
        if !self.has_parent_id(id) {
            self.saved_parent_ids.push(id.to_string());
        }
    }

    pub fn remove_parent_id(&mut self, id: &str) {
        self.saved_parent_ids.retain(|p| p != id);
    }

    pub fn reset(&mut self) {
        self.persisted = false;
        self.saved_parent_ids.clear();
    }
}

/// A node's link to its store plus the node's sync state.
#[derive(Debug)]
pub struct PersistenceHandle {
    store: Arc<dyn TaskStore>,
    state: SyncState,
}

impl PersistenceHandle {
    /// Handle for a node that has never been written.
    pub fn new(store: Arc<dyn TaskStore>) -> Self {
        Self {
            store,
            state: SyncState::default(),
        }
    }

    /// Handle for a node that was just read from `store`.
    pub fn loaded(store: Arc<dyn TaskStore>) -> Self {
        Self {
            store,
            state: SyncState {
                persisted: true,
                saved_parent_ids: Vec::new(),
            },
        }
    }

    /// Same store, empty sync state.
    pub fn fresh(&self) -> Self {
        Self::new(Arc::clone(&self.store))
    }

    pub fn store(&self) -> &Arc<dyn TaskStore> {
        &self.store
    }

    pub fn is_persisted(&self) -> bool {
        self.state.persisted
    }

    pub fn state(&self) -> &SyncState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut SyncState {
        &mut self.state
    }
}

/// Persistence entry points on the graph.
impl TaskGraph {
    /// Bind a node to a store, replacing any existing handle.
    pub fn attach_store(&mut self, id: &str, store: Arc<dyn TaskStore>) -> Result<()> {
        self.node_mut(id)?.persistence = Some(PersistenceHandle::new(store));
        Ok(())
    }

    /// The store a node is bound to.
    pub fn store_of(&self, id: &str) -> Result<Arc<dyn TaskStore>> {
        self.node(id)?
            .persistence
            .as_ref()
            .map(|h| Arc::clone(h.store()))
            .ok_or_else(|| Error::NoPersistence(id.to_string()))
    }

    /// Save a node, and everything below it when `recurse` is set.
    ///
    /// Grouping nodes are skipped but their children are still saved.
    pub fn save(&mut self, id: &str, recurse: bool) -> Result<()> {
        let save_myself = !self.node(id)?.is_memory_only();
        self.save_with(id, recurse, save_myself)
    }

    pub fn save_with(&mut self, id: &str, save_children: bool, save_myself: bool) -> Result<()> {
        let store = self.store_of(id)?;
        store.save(self, id, save_children, save_myself)
    }

    /// Load a node from its store, and its descendants when `recurse` is set.
    ///
    /// Loading a grouping node attaches the top-level stored tasks under it.
    pub fn load(&mut self, id: &str, recurse: bool) -> Result<()> {
        let root_placeholder = self.node(id)?.is_memory_only();
        let store = self.store_of(id)?;
        store.load(self, id, recurse, root_placeholder)
    }

    /// Delete a node's stored data without changing the in-memory graph.
    pub fn delete_persisted(&mut self, id: &str, reparent_to: Option<&str>) -> Result<()> {
        let store = self.store_of(id)?;
        store.delete(self, id, reparent_to)
    }

    /// True if a record for this node exists in its store.
    pub fn is_persisted(&self, id: &str) -> bool {
        self.get(id)
            .and_then(|n| n.persistence.as_ref())
            .is_some_and(|h| h.is_persisted())
    }

    pub fn sync_state(&self, id: &str) -> Option<&SyncState> {
        self.get(id)?.persistence.as_ref().map(|h| h.state())
    }

    pub(crate) fn sync_state_mut(&mut self, id: &str) -> Option<&mut SyncState> {
        self.get_mut(id)?.persistence.as_mut().map(|h| h.state_mut())
    }

    /// Give a node a handle if it has none.
    pub(crate) fn ensure_handle(&mut self, id: &str, store: &Arc<dyn TaskStore>) -> Result<()> {
        let node = self.node_mut(id)?;
        if node.persistence.is_none() {
            node.persistence = Some(PersistenceHandle::new(Arc::clone(store)));
        }
        Ok(())
    }
}

/// Open the store for a backend.
pub fn open_store(backend: BackendType, database: &Path, yaml_file: &Path) -> Result<Arc<dyn TaskStore>> {
    let store: Arc<dyn TaskStore> = match backend {
        BackendType::Sqlite => {
            if let Some(parent) = database.parent() {
                std::fs::create_dir_all(parent)?;
            }
            Arc::new(SqliteStore::open(database)?)
        }
        BackendType::Yaml => Arc::new(YamlStore::new(yaml_file)),
    };
    tracing::debug!(backend = %backend, location = %store.location(), "opened store");
    Ok(store)
}
