//! YAML task store.
//!
//! The whole graph lives in one file:
//!
//! ```yaml
//! tasks:
//!   - id: 5b0c...
//!     name: Groceries
//!     state: notStarted
//!     estimate: 30
//!     tags: [today]
//!     parents: [a1f3...]
//! ```
//!
//! Every save rewrites the file from the root of the saved node's hierarchy.
//! Deletes are no-ops: a detached node is simply absent from the next save.

use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::models::{Hyperlink, TaskGraph, TaskNode, TaskState};
use crate::storage::{BackendType, PersistenceHandle, TaskStore};
use crate::{Error, Result};

/// Top-level document.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct TasksDocument {
    #[serde(default)]
    pub tasks: Vec<TaskRecord>,
}

/// One task as written to the file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub state: TaskState,
    /// Estimate in minutes
    #[serde(default)]
    pub estimate: i64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub links: Vec<Hyperlink>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub users: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parents: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_start_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_start_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_completion_time: Option<DateTime<Utc>>,
}

impl TaskRecord {
    fn from_node(graph: &TaskGraph, node: &TaskNode) -> Self {
        Self {
            id: node.id().to_string(),
            name: node.name.clone(),
            state: node.state,
            estimate: node.estimate_minutes(),
            tags: node.tags().to_vec(),
            links: node.links().to_vec(),
            users: node.users().to_vec(),
            parents: node
                .parents()
                .iter()
                .filter(|p| graph.get(p).is_some_and(|n| !n.is_memory_only()))
                .cloned()
                .collect(),
            target_start_time: node.target_start_time,
            actual_start_time: node.actual_start_time,
            actual_completion_time: node.actual_completion_time,
        }
    }

    fn to_node(&self) -> Result<TaskNode> {
        let mut node = TaskNode::with_id(self.id.clone(), self.name.clone());
        node.state = self.state;
        node.set_estimate_minutes(self.estimate)?;
        node.target_start_time = self.target_start_time;
        node.actual_start_time = self.actual_start_time;
        node.actual_completion_time = self.actual_completion_time;
        node.replace_lists(self.tags.clone(), self.links.clone(), self.users.clone());
        Ok(node)
    }
}

/// Build the document for everything reachable from the root of `id`.
///
/// Grouping nodes are left out, as are edges to them.
pub fn export_document(graph: &TaskGraph, id: &str) -> Result<TasksDocument> {
    let root = graph.root_of(id)?;
    let mut tasks = Vec::new();
    for task_id in graph.descendants(&root)? {
        let node = graph.node(&task_id)?;
        if !node.is_memory_only() {
            tasks.push(TaskRecord::from_node(graph, node));
        }
    }
    Ok(TasksDocument { tasks })
}

/// Write `contents` next to `path` and rename it into place.
pub fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir)?;

    let mut temp = NamedTempFile::new_in(&dir)?;
    temp.write_all(contents.as_bytes())?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| Error::Io(e.error))?;
    Ok(())
}

/// Task store backed by a single YAML file.
#[derive(Debug)]
pub struct YamlStore {
    path: PathBuf,
    save_lock: Mutex<()>,
    last_error: Mutex<Option<String>>,
}

impl YamlStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            save_lock: Mutex::new(()),
            last_error: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn set_last_error(&self, message: Option<String>) {
        if let Ok(mut slot) = self.last_error.lock() {
            *slot = message;
        }
    }

    /// Read the file. A missing file is an empty document.
    fn read_document(&self) -> Result<TasksDocument> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(TasksDocument::default()),
            Err(e) => return Err(e.into()),
        };
        if content.trim().is_empty() {
            return Ok(TasksDocument::default());
        }
        Ok(serde_yaml::from_str(&content)?)
    }
}

impl TaskStore for YamlStore {
    fn save(&self, graph: &mut TaskGraph, id: &str, _save_children: bool, _save_myself: bool) -> Result<()> {
        let _guard = self
            .save_lock
            .lock()
            .map_err(|_| Error::Other("yaml save lock poisoned".to_string()))?;

        let document = export_document(graph, id)?;
        let yaml = serde_yaml::to_string(&document)?;
        write_atomic(&self.path, &yaml)?;

        for record in &document.tasks {
            if let Some(state) = graph.sync_state_mut(&record.id) {
                state.persisted = true;
                state.saved_parent_ids = record.parents.clone();
            }
        }
        debug!(path = %self.path.display(), tasks = document.tasks.len(), "wrote yaml store");
        Ok(())
    }

    fn load(&self, graph: &mut TaskGraph, id: &str, load_children: bool, root_placeholder: bool) -> Result<()> {
        if !(root_placeholder && load_children) {
            warn!(
                task = %id,
                load_children,
                root_placeholder,
                "yaml store only loads the whole graph under a placeholder root"
            );
            return Ok(());
        }

        let document = match self.read_document() {
            Ok(document) => document,
            Err(Error::Yaml(e)) => {
                warn!(path = %self.path.display(), error = %e, "could not parse yaml store");
                self.set_last_error(Some(e.to_string()));
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        // Construct every node first so parents can be resolved in any order.
        // A record that cannot become a node rejects the whole document.
        let mut nodes = Vec::new();
        for record in document.tasks.iter().filter(|r| !graph.contains(&r.id)) {
            match record.to_node() {
                Ok(node) => nodes.push(node),
                Err(e) => {
                    warn!(
                        path = %self.path.display(),
                        task = %record.id,
                        error = %e,
                        "invalid record in yaml store"
                    );
                    self.set_last_error(Some(format!("task {}: {e}", record.id)));
                    return Ok(());
                }
            }
        }
        self.set_last_error(None);

        let store = graph.store_of(id)?;
        let mut fresh = HashSet::new();
        for mut node in nodes {
            if !fresh.insert(node.id().to_string()) {
                continue;
            }
            node.persistence = Some(PersistenceHandle::loaded(Arc::clone(&store)));
            graph.insert(node)?;
        }

        for record in &document.tasks {
            let mut attached = false;
            for parent in &record.parents {
                if !graph.contains(parent) {
                    continue;
                }
                if graph.node(&record.id)?.parents().contains(parent) {
                    attached = true;
                    continue;
                }
                match graph.add_child(parent, &record.id) {
                    Ok(()) => attached = true,
                    Err(e) => warn!(task = %record.id, parent = %parent, error = %e, "skipping stored edge"),
                }
            }

            if !attached && fresh.contains(&record.id) {
                if !record.parents.is_empty() {
                    warn!(task = %record.id, "no stored parent could be resolved, attaching to root");
                }
                graph.add_child(id, &record.id)?;
            }

            if let Some(state) = graph.sync_state_mut(&record.id) {
                state.persisted = true;
                state.saved_parent_ids = record.parents.clone();
            }
        }
        debug!(path = %self.path.display(), tasks = document.tasks.len(), "loaded yaml store");
        Ok(())
    }

    fn delete(&self, _graph: &mut TaskGraph, id: &str, _reparent_to: Option<&str>) -> Result<()> {
        debug!(task = %id, "yaml delete deferred to next save");
        Ok(())
    }

    fn new_empty(&self, storage_name: &str) -> Result<Arc<dyn TaskStore>> {
        Ok(Arc::new(YamlStore::new(storage_name)))
    }

    fn last_error(&self) -> Option<Error> {
        self.last_error
            .lock()
            .ok()
            .and_then(|slot| slot.clone())
            .map(Error::Parse)
    }

    fn backend_type(&self) -> BackendType {
        BackendType::Yaml
    }

    fn storage_name(&self) -> String {
        self.path.display().to_string()
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TAG_TODAY;
    use crate::test_utils::TestEnv;

    fn graph_with_root(store: Arc<dyn TaskStore>) -> (TaskGraph, String) {
        let mut graph = TaskGraph::new();
        let root = graph.create_memory_only("root");
        graph.attach_store(&root, store).unwrap();
        (graph, root)
    }

    fn add(graph: &mut TaskGraph, parent: &str, name: &str) -> String {
        let id = graph.create(name);
        graph.add_child(parent, &id).unwrap();
        id
    }

    #[test]
    fn test_yaml_round_trip() {
        let env = TestEnv::new();
        let (mut graph, root) = graph_with_root(env.yaml());
        let project = add(&mut graph, &root, "Project");
        let step = add(&mut graph, &project, "Step");
        let other = add(&mut graph, &root, "Other");
        graph.add_child(&other, &step).unwrap();
        {
            let node = graph.node_mut(&step).unwrap();
            node.set_tag(TAG_TODAY);
            node.set_estimate_minutes(90).unwrap();
            node.state = TaskState::OnHold;
            node.set_link(Hyperlink::new("https://example.com", 0, 4));
        }

        graph.save(&step, false).unwrap();
        assert!(graph.is_persisted(&project));
        assert!(graph.is_persisted(&other));

        let (mut loaded, new_root) = graph_with_root(env.yaml());
        loaded.load(&new_root, true).unwrap();

        assert_eq!(loaded.node(&new_root).unwrap().children(), &[project.clone(), other.clone()]);
        let node = loaded.node(&step).unwrap();
        assert_eq!(node.parents(), &[project.clone(), other.clone()]);
        assert_eq!(node.estimate_minutes(), 90);
        assert_eq!(node.state, TaskState::OnHold);
        assert!(node.is_tag_set(TAG_TODAY));
        assert_eq!(node.links().len(), 1);
        assert!(loaded.is_persisted(&step));
    }

    #[test]
    fn test_yaml_file_shape() {
        let env = TestEnv::new();
        let (mut graph, root) = graph_with_root(env.yaml());
        add(&mut graph, &root, "Only task");
        graph.save(&root, true).unwrap();

        let content = std::fs::read_to_string(env.yaml_path()).unwrap();
        assert!(content.starts_with("tasks:"));
        assert!(content.contains("name: Only task"));
        assert!(content.contains("state: notStarted"));
        // Grouping root is never written
        assert!(!content.contains("root"));
    }

    #[test]
    fn test_unresolved_parent_falls_back_to_root() {
        let env = TestEnv::new();
        std::fs::write(
            env.yaml_path(),
            "tasks:\n  - id: a\n    name: A\n  - id: b\n    name: B\n    parents: [missing]\n  - id: c\n    name: C\n    parents: [a]\n",
        )
        .unwrap();

        let (mut graph, root) = graph_with_root(env.yaml());
        graph.load(&root, true).unwrap();

        assert_eq!(graph.node(&root).unwrap().children(), &["a".to_string(), "b".to_string()]);
        assert_eq!(graph.node("c").unwrap().parents(), &["a".to_string()]);
    }

    #[test]
    fn test_missing_file_loads_nothing() {
        let env = TestEnv::new();
        let store = env.yaml();
        let (mut graph, root) = graph_with_root(store.clone());
        graph.load(&root, true).unwrap();
        assert_eq!(graph.len(), 1);
        assert!(store.last_error().is_none());
    }

    #[test]
    fn test_parse_error_is_sticky() {
        let env = TestEnv::new();
        std::fs::write(env.yaml_path(), "tasks: [this is: not: valid").unwrap();
        let store = env.yaml();
        let (mut graph, root) = graph_with_root(store.clone());

        graph.load(&root, true).unwrap();
        assert_eq!(graph.len(), 1);
        assert!(matches!(store.last_error(), Some(Error::Parse(_))));
    }

    #[test]
    fn test_out_of_range_estimate_rejects_document() {
        let env = TestEnv::new();
        std::fs::write(
            env.yaml_path(),
            "tasks:\n  - id: a\n    name: A\n  - id: b\n    name: B\n    estimate: 9223372036854775807\n",
        )
        .unwrap();
        let store = env.yaml();
        let (mut graph, root) = graph_with_root(store.clone());

        graph.load(&root, true).unwrap();
        assert_eq!(graph.len(), 1);
        match store.last_error() {
            Some(Error::Parse(message)) => assert!(message.contains("task b")),
            other => panic!("expected a parse error, got {other:?}"),
        }
    }

    #[test]
    fn test_concurrent_saves_never_interleave() {
        let env = TestEnv::new();
        let store: Arc<dyn TaskStore> = Arc::new(YamlStore::new(env.yaml_path()));

        let (mut small, small_root) = graph_with_root(store.clone());
        for name in ["a", "b", "c"] {
            add(&mut small, &small_root, name);
        }
        let (mut large, large_root) = graph_with_root(store.clone());
        let mut parent = large_root.clone();
        for name in ["v", "w", "x", "y", "z"] {
            parent = add(&mut large, &parent, name);
        }
        small.save(&small_root, true).unwrap();

        std::thread::scope(|scope| {
            scope.spawn(|| {
                for _ in 0..25 {
                    small.save(&small_root, true).unwrap();
                }
            });
            scope.spawn(|| {
                for _ in 0..25 {
                    large.save(&large_root, true).unwrap();
                }
            });
            for _ in 0..50 {
                let content = std::fs::read_to_string(env.yaml_path()).unwrap();
                let document: TasksDocument = serde_yaml::from_str(&content).unwrap();
                assert!(matches!(document.tasks.len(), 3 | 5), "torn document: {content}");
            }
        });

        let content = std::fs::read_to_string(env.yaml_path()).unwrap();
        let document: TasksDocument = serde_yaml::from_str(&content).unwrap();
        assert!(matches!(document.tasks.len(), 3 | 5));
    }

    #[test]
    fn test_partial_load_modes_do_nothing() {
        let env = TestEnv::new();
        std::fs::write(env.yaml_path(), "tasks:\n  - id: a\n    name: A\n").unwrap();
        let (mut graph, root) = graph_with_root(env.yaml());

        graph.load(&root, false).unwrap();
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn test_detached_node_dropped_on_next_save() {
        let env = TestEnv::new();
        let (mut graph, root) = graph_with_root(env.yaml());
        let keep = add(&mut graph, &root, "keep");
        let drop_me = add(&mut graph, &root, "drop me");
        graph.save(&root, true).unwrap();

        graph.remove(&drop_me, None).unwrap();
        graph.save(&root, true).unwrap();

        let (mut loaded, new_root) = graph_with_root(env.yaml());
        loaded.load(&new_root, true).unwrap();
        assert_eq!(loaded.node(&new_root).unwrap().children(), &[keep]);
    }
}
