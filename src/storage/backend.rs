//! Storage backend trait and backend selection.
//!
//! pim ships two backends:
//! - `SqliteStore` - relational storage, reconciled incrementally
//! - `YamlStore` - a single YAML file rewritten on every save

use std::fmt::Debug;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::models::TaskGraph;
use crate::{Error, Result};

/// Contract every task store implements.
///
/// Stores operate on a node of a [`TaskGraph`] by id. The per-node sync
/// state (whether a row exists, which parent edges were written) lives in the
/// node's `PersistenceHandle`; the store only holds connection-level state.
pub trait TaskStore: Send + Sync + Debug {
    /// Write a node and, when `save_children` is set, everything below it.
    ///
    /// `save_myself` is false for a grouping node saved directly. Children
    /// reached through `save_children` are always written themselves.
    fn save(&self, graph: &mut TaskGraph, id: &str, save_children: bool, save_myself: bool) -> Result<()>;

    /// Read a node and, when `load_children` is set, attach its descendants.
    ///
    /// A `root_placeholder` node is never read itself; its children are the
    /// top-level tasks in storage.
    fn load(&self, graph: &mut TaskGraph, id: &str, load_children: bool, root_placeholder: bool) -> Result<()>;

    /// Delete a node's stored data, optionally moving its child edges to
    /// `reparent_to`.
    fn delete(&self, graph: &mut TaskGraph, id: &str, reparent_to: Option<&str>) -> Result<()>;

    /// Open a store of the same kind bound to another database or file.
    fn new_empty(&self, storage_name: &str) -> Result<Arc<dyn TaskStore>>;

    /// Sticky error from the last load, if the backend records one.
    fn last_error(&self) -> Option<Error>;

    /// Get the backend type.
    fn backend_type(&self) -> BackendType;

    /// Name of the database or file this store is bound to.
    fn storage_name(&self) -> String;

    /// Get the storage location description (for display purposes).
    fn location(&self) -> String;
}

/// Available storage backend types.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendType {
    /// SQLite database (default)
    #[default]
    Sqlite,
    /// Whole-graph YAML file
    Yaml,
}

impl BackendType {
    /// Parse a backend type from a string.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "sqlite" | "db" | "database" | "default" => Some(Self::Sqlite),
            "yaml" | "yml" | "file" => Some(Self::Yaml),
            _ => None,
        }
    }

    /// Get the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite",
            Self::Yaml => "yaml",
        }
    }
}

impl std::fmt::Display for BackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
