//! SQLite task store.
//!
//! Tasks are rows in `tasks`; parent edges, tags, hyperlinks and user access
//! live in relation tables. A save compares what the node holds in memory
//! with what was last written and only issues the inserts and deletes needed
//! to close the gap.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter};
use tracing::debug;

use crate::models::{Hyperlink, TaskGraph, TaskNode, TaskState};
use crate::storage::reconcile::mark_and_sweep;
use crate::storage::{BackendType, PersistenceHandle, SyncState, TaskStore};
use crate::{Error, Result};

const IN_MEMORY: &str = ":memory:";

const TASK_COLUMNS: &str = "t.id, t.name, t.state, t.target_start_time, t.actual_start_time, \
     t.actual_completion_time, t.estimate_minutes";

/// Rows written and removed by a store, per relation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncStats {
    pub tasks_inserted: usize,
    pub tasks_updated: usize,
    pub tasks_deleted: usize,
    pub edges_inserted: usize,
    pub edges_deleted: usize,
    pub tags_created: usize,
    pub tag_links_inserted: usize,
    pub tag_links_deleted: usize,
    pub links_inserted: usize,
    pub links_updated: usize,
    pub links_deleted: usize,
    pub users_inserted: usize,
    pub users_deleted: usize,
}

impl SyncStats {
    /// Writes to relation tables. Zero after re-saving an unchanged graph.
    pub fn relation_writes(&self) -> usize {
        self.edges_inserted
            + self.edges_deleted
            + self.tags_created
            + self.tag_links_inserted
            + self.tag_links_deleted
            + self.links_inserted
            + self.links_updated
            + self.links_deleted
            + self.users_inserted
            + self.users_deleted
    }
}

/// Task store backed by one SQLite connection.
pub struct SqliteStore {
    name: String,
    path: Option<PathBuf>,
    conn: Mutex<Connection>,
    stats: Mutex<SyncStats>,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("name", &self.name)
            .field("path", &self.path)
            .finish()
    }
}

/// Scalar columns of one task row.
struct TaskRow {
    id: String,
    name: String,
    state: TaskState,
    target_start_time: Option<DateTime<Utc>>,
    actual_start_time: Option<DateTime<Utc>>,
    actual_completion_time: Option<DateTime<Utc>>,
    estimate_minutes: i64,
}

impl TaskRow {
    fn from_node(node: &TaskNode) -> Self {
        Self {
            id: node.id().to_string(),
            name: node.name.clone(),
            state: node.state,
            target_start_time: node.target_start_time,
            actual_start_time: node.actual_start_time,
            actual_completion_time: node.actual_completion_time,
            estimate_minutes: node.estimate_minutes(),
        }
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let state: i64 = row.get(2)?;
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            state: TaskState::from_code(state).unwrap_or_default(),
            target_start_time: parse_time(row.get(3)?),
            actual_start_time: parse_time(row.get(4)?),
            actual_completion_time: parse_time(row.get(5)?),
            estimate_minutes: row.get(6)?,
        })
    }
}

/// A task row together with its relation rows.
struct LoadedTask {
    row: TaskRow,
    tags: Vec<String>,
    links: Vec<Hyperlink>,
    users: Vec<String>,
}

impl LoadedTask {
    fn apply_to(self, node: &mut TaskNode) -> Result<()> {
        node.set_estimate_minutes(self.row.estimate_minutes)
            .map_err(|e| Error::Parse(format!("task {}: {e}", self.row.id)))?;
        node.name = self.row.name;
        node.state = self.row.state;
        node.target_start_time = self.row.target_start_time;
        node.actual_start_time = self.row.actual_start_time;
        node.actual_completion_time = self.row.actual_completion_time;
        node.replace_lists(self.tags, self.links, self.users);
        Ok(())
    }
}

/// Everything a save needs from the node, copied out of the graph.
struct PendingSave {
    row: TaskRow,
    /// Parent ids in order, with whether the parent has a stored row
    parents: Vec<(String, bool)>,
    tags: Vec<String>,
    links: Vec<Hyperlink>,
    users: Vec<String>,
}

fn parse_time(value: Option<String>) -> Option<DateTime<Utc>> {
    value.and_then(|s| {
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
    })
}

fn format_time(value: Option<DateTime<Utc>>) -> Option<String> {
    value.map(|t| t.to_rfc3339())
}

impl SqliteStore {
    /// Open or create a database file.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::init_schema(&conn)?;
        debug!(path = %path.display(), "opened sqlite store");
        Ok(Self {
            name: path.display().to_string(),
            path: Some(path.to_path_buf()),
            conn: Mutex::new(conn),
            stats: Mutex::new(SyncStats::default()),
        })
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self {
            name: IN_MEMORY.to_string(),
            path: None,
            conn: Mutex::new(conn),
            stats: Mutex::new(SyncStats::default()),
        })
    }

    /// Initialize the SQLite schema.
    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS tasks (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                state INTEGER NOT NULL DEFAULT 0,
                target_start_time TEXT,
                actual_start_time TEXT,
                actual_completion_time TEXT,
                estimate_minutes INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS task_parents (
                parent_id TEXT NOT NULL,
                child_id TEXT NOT NULL,
                PRIMARY KEY (parent_id, child_id),
                FOREIGN KEY (parent_id) REFERENCES tasks(id),
                FOREIGN KEY (child_id) REFERENCES tasks(id)
            );

            CREATE TABLE IF NOT EXISTS tags (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE
            );

            CREATE TABLE IF NOT EXISTS task_tags (
                task_id TEXT NOT NULL,
                tag_id INTEGER NOT NULL,
                PRIMARY KEY (task_id, tag_id),
                FOREIGN KEY (task_id) REFERENCES tasks(id),
                FOREIGN KEY (tag_id) REFERENCES tags(id)
            );

            CREATE TABLE IF NOT EXISTS task_links (
                task_id TEXT NOT NULL,
                uri TEXT NOT NULL,
                name_offset INTEGER NOT NULL DEFAULT 0,
                name_length INTEGER NOT NULL DEFAULT 0,
                position INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (task_id, uri),
                FOREIGN KEY (task_id) REFERENCES tasks(id)
            );

            CREATE TABLE IF NOT EXISTS task_users (
                task_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                PRIMARY KEY (task_id, user_id),
                FOREIGN KEY (task_id) REFERENCES tasks(id)
            );

            CREATE INDEX IF NOT EXISTS idx_task_parents_child ON task_parents(child_id);
            "#,
        )?;
        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Other("sqlite connection lock poisoned".to_string()))
    }

    fn record(&self, update: impl FnOnce(&mut SyncStats)) {
        if let Ok(mut stats) = self.stats.lock() {
            update(&mut stats);
        }
    }

    /// Counters accumulated since the store was opened or last reset.
    pub fn stats(&self) -> SyncStats {
        self.stats.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn reset_stats(&self) {
        self.record(|stats| *stats = SyncStats::default());
    }

    /// Stored parent ids of a task, in insertion order.
    pub fn stored_parent_ids(&self, id: &str) -> Result<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT parent_id FROM task_parents WHERE child_id = ?1 ORDER BY rowid")?;
        let ids = stmt
            .query_map(params![id], |row| row.get(0))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(ids)
    }

    /// Number of stored tasks.
    pub fn task_count(&self) -> Result<usize> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM tasks", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    // Save

    /// Copy out of the graph what a save of `id` needs.
    fn pending_save(graph: &TaskGraph, id: &str) -> Result<PendingSave> {
        let node = graph.node(id)?;
        Ok(PendingSave {
            row: TaskRow::from_node(node),
            parents: node
                .parents()
                .iter()
                .map(|p| (p.clone(), graph.is_persisted(p)))
                .collect(),
            tags: node.tags().to_vec(),
            links: node.links().to_vec(),
            users: node.users().to_vec(),
        })
    }

    /// Write one node. The sync state is written back even when a step
    /// fails, so it always reflects the rows that now exist.
    fn save_node(&self, graph: &mut TaskGraph, id: &str) -> Result<()> {
        let pending = Self::pending_save(graph, id)?;
        let mut state = graph.sync_state(id).cloned().unwrap_or_default();

        let result = {
            let conn = self.conn()?;
            self.write_node(&conn, &pending, &mut state)
        };

        if let Some(stored) = graph.sync_state_mut(id) {
            *stored = state;
        }
        result
    }

    fn write_node(&self, conn: &Connection, pending: &PendingSave, state: &mut SyncState) -> Result<()> {
        self.upsert_task(conn, &pending.row, state)?;
        self.sync_parents(conn, &pending.row.id, &pending.parents, state)?;
        self.sync_tags(conn, &pending.row.id, &pending.tags)?;
        self.sync_links(conn, &pending.row.id, &pending.links)?;
        self.sync_users(conn, &pending.row.id, &pending.users)?;
        Ok(())
    }

    /// Insert on first write, update afterwards. The cached flag decides.
    fn upsert_task(&self, conn: &Connection, row: &TaskRow, state: &mut SyncState) -> Result<()> {
        let code = row.state.code();
        let target = format_time(row.target_start_time);
        let started = format_time(row.actual_start_time);
        let completed = format_time(row.actual_completion_time);

        if state.persisted {
            let changed = conn.execute(
                "UPDATE tasks SET name = ?2, state = ?3, target_start_time = ?4, actual_start_time = ?5,
                 actual_completion_time = ?6, estimate_minutes = ?7 WHERE id = ?1",
                params![row.id, row.name, code, target, started, completed, row.estimate_minutes],
            )?;
            if changed == 0 {
                return Err(Error::NotFound(format!(
                    "Task {} is marked as saved but has no stored row",
                    row.id
                )));
            }
            self.record(|s| s.tasks_updated += 1);
        } else {
            conn.execute(
                "INSERT INTO tasks (id, name, state, target_start_time, actual_start_time,
                 actual_completion_time, estimate_minutes) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![row.id, row.name, code, target, started, completed, row.estimate_minutes],
            )?;
            state.persisted = true;
            self.record(|s| s.tasks_inserted += 1);
        }
        Ok(())
    }

    /// Mark-and-sweep of parent edges against the cached parent ids.
    fn sync_parents(
        &self,
        conn: &Connection,
        id: &str,
        parents: &[(String, bool)],
        state: &mut SyncState,
    ) -> Result<()> {
        let mut desired = Vec::new();
        for (parent, parent_persisted) in parents {
            if *parent_persisted || state.has_parent_id(parent) {
                desired.push(parent.clone());
            } else {
                debug!(parent = %parent, child = %id, "skipping edge to unsaved parent");
            }
        }

        let diff = mark_and_sweep(&desired, &state.saved_parent_ids);
        for parent in &diff.missing {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO task_parents (parent_id, child_id) VALUES (?1, ?2)",
                params![parent, id],
            )?;
            state.add_parent_id(parent);
            self.record(|s| s.edges_inserted += inserted);
        }
        for parent in &diff.stale {
            let deleted = conn.execute(
                "DELETE FROM task_parents WHERE parent_id = ?1 AND child_id = ?2",
                params![parent, id],
            )?;
            state.remove_parent_id(parent);
            self.record(|s| s.edges_deleted += deleted);
        }
        Ok(())
    }

    /// Reconcile tag links by name, growing the tag vocabulary as needed.
    fn sync_tags(&self, conn: &Connection, id: &str, tags: &[String]) -> Result<()> {
        let mut vocabulary: HashMap<String, i64> = {
            let mut stmt = conn.prepare("SELECT name, id FROM tags")?;
            let rows = stmt
                .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
                .filter_map(|r| r.ok())
                .collect();
            rows
        };
        let stored = Self::stored_tags(conn, id)?;

        let diff = mark_and_sweep(tags, &stored);

        for name in &diff.missing {
            let tag_id = match vocabulary.get(name) {
                Some(tag_id) => *tag_id,
                None => {
                    conn.execute("INSERT INTO tags (name) VALUES (?1)", params![name])?;
                    let tag_id = conn.last_insert_rowid();
                    vocabulary.insert(name.clone(), tag_id);
                    self.record(|s| s.tags_created += 1);
                    tag_id
                }
            };
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO task_tags (task_id, tag_id) VALUES (?1, ?2)",
                params![id, tag_id],
            )?;
            self.record(|s| s.tag_links_inserted += inserted);
        }

        if !diff.stale.is_empty() {
            let stale_ids: Vec<i64> = diff
                .stale
                .iter()
                .filter_map(|name| vocabulary.get(name).copied())
                .collect();
            let placeholders = vec!["?"; stale_ids.len()].join(", ");
            let sql = format!(
                "DELETE FROM task_tags WHERE task_id = ? AND tag_id IN ({})",
                placeholders
            );
            let mut values = vec![Value::Text(id.to_string())];
            values.extend(stale_ids.iter().map(|tag_id| Value::Integer(*tag_id)));

            let deleted = conn.execute(&sql, params_from_iter(values.iter()))?;
            if deleted < stale_ids.len() {
                // Rows already removed elsewhere; the goal state is reached anyway
                debug!(
                    task = %id,
                    expected = stale_ids.len(),
                    deleted,
                    "some tag links were already absent"
                );
            }
            self.record(|s| s.tag_links_deleted += deleted);
        }
        Ok(())
    }

    /// Reconcile hyperlinks keyed by URI.
    fn sync_links(&self, conn: &Connection, id: &str, links: &[Hyperlink]) -> Result<()> {
        let stored: HashMap<String, (u32, u32, i64)> = {
            let mut stmt = conn.prepare(
                "SELECT uri, name_offset, name_length, position FROM task_links WHERE task_id = ?1",
            )?;
            let rows = stmt
                .query_map(params![id], |row| {
                    Ok((row.get(0)?, (row.get(1)?, row.get(2)?, row.get(3)?)))
                })?
                .filter_map(|r| r.ok())
                .collect();
            rows
        };
        let desired: Vec<String> = links.iter().map(|l| l.uri.clone()).collect();
        let stored_uris: Vec<String> = stored.keys().cloned().collect();
        let diff = mark_and_sweep(&desired, &stored_uris);

        for (position, link) in links.iter().enumerate() {
            let position = position as i64;
            match stored.get(&link.uri) {
                None => {
                    conn.execute(
                        "INSERT INTO task_links (task_id, uri, name_offset, name_length, position)
                         VALUES (?1, ?2, ?3, ?4, ?5)",
                        params![id, link.uri, link.name_offset, link.name_length, position],
                    )?;
                    self.record(|s| s.links_inserted += 1);
                }
                Some(&(offset, length, stored_position))
                    if offset != link.name_offset
                        || length != link.name_length
                        || stored_position != position =>
                {
                    conn.execute(
                        "UPDATE task_links SET name_offset = ?3, name_length = ?4, position = ?5
                         WHERE task_id = ?1 AND uri = ?2",
                        params![id, link.uri, link.name_offset, link.name_length, position],
                    )?;
                    self.record(|s| s.links_updated += 1);
                }
                Some(_) => {}
            }
        }

        for uri in &diff.stale {
            let deleted = conn.execute(
                "DELETE FROM task_links WHERE task_id = ?1 AND uri = ?2",
                params![id, uri],
            )?;
            self.record(|s| s.links_deleted += deleted);
        }
        Ok(())
    }

    /// Reconcile the users granted visibility.
    fn sync_users(&self, conn: &Connection, id: &str, users: &[String]) -> Result<()> {
        let stored = Self::stored_users(conn, id)?;
        let diff = mark_and_sweep(users, &stored);

        for user in &diff.missing {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO task_users (task_id, user_id) VALUES (?1, ?2)",
                params![id, user],
            )?;
            self.record(|s| s.users_inserted += inserted);
        }
        for user in &diff.stale {
            let deleted = conn.execute(
                "DELETE FROM task_users WHERE task_id = ?1 AND user_id = ?2",
                params![id, user],
            )?;
            self.record(|s| s.users_deleted += deleted);
        }
        Ok(())
    }

    // Load

    fn read_task(conn: &Connection, id: &str) -> Result<Option<LoadedTask>> {
        let row = conn
            .query_row(
                &format!("SELECT {} FROM tasks t WHERE t.id = ?1", TASK_COLUMNS),
                params![id],
                TaskRow::from_row,
            )
            .optional()?;
        match row {
            Some(row) => Ok(Some(Self::read_relations(conn, row)?)),
            None => Ok(None),
        }
    }

    fn read_relations(conn: &Connection, row: TaskRow) -> Result<LoadedTask> {
        let tags = Self::stored_tags(conn, &row.id)?;
        let links = {
            let mut stmt = conn.prepare(
                "SELECT uri, name_offset, name_length FROM task_links
                 WHERE task_id = ?1 ORDER BY position",
            )?;
            let links = stmt
                .query_map(params![row.id], |r| {
                    Ok(Hyperlink::new(r.get::<_, String>(0)?, r.get(1)?, r.get(2)?))
                })?
                .filter_map(|r| r.ok())
                .collect();
            links
        };
        let users = Self::stored_users(conn, &row.id)?;
        Ok(LoadedTask {
            row,
            tags,
            links,
            users,
        })
    }

    fn stored_tags(conn: &Connection, id: &str) -> Result<Vec<String>> {
        let mut stmt = conn.prepare(
            "SELECT t.name FROM task_tags tt JOIN tags t ON t.id = tt.tag_id
             WHERE tt.task_id = ?1 ORDER BY tt.rowid",
        )?;
        let tags = stmt
            .query_map(params![id], |row| row.get(0))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(tags)
    }

    fn stored_users(conn: &Connection, id: &str) -> Result<Vec<String>> {
        let mut stmt =
            conn.prepare("SELECT user_id FROM task_users WHERE task_id = ?1 ORDER BY rowid")?;
        let users = stmt
            .query_map(params![id], |row| row.get(0))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(users)
    }

    /// Direct children of `parent`, or every top-level task for a placeholder.
    fn read_children(conn: &Connection, parent: &str, placeholder: bool) -> Result<Vec<LoadedTask>> {
        let rows: Vec<TaskRow> = if placeholder {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM tasks t
                 WHERE NOT EXISTS (SELECT 1 FROM task_parents tp WHERE tp.child_id = t.id)
                 ORDER BY t.rowid",
                TASK_COLUMNS
            ))?;
            let rows = stmt
                .query_map([], TaskRow::from_row)?
                .filter_map(|r| r.ok())
                .collect();
            rows
        } else {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM task_parents tp JOIN tasks t ON t.id = tp.child_id
                 WHERE tp.parent_id = ?1 ORDER BY tp.rowid",
                TASK_COLUMNS
            ))?;
            let rows = stmt
                .query_map(params![parent], TaskRow::from_row)?
                .filter_map(|r| r.ok())
                .collect();
            rows
        };

        rows.into_iter()
            .map(|row| Self::read_relations(conn, row))
            .collect()
    }

    /// Attach the stored children of `parent` and recurse into new ones.
    ///
    /// A child already in memory (reached through another parent) only
    /// gains the edge; its subtree was loaded the first time.
    fn load_children(&self, graph: &mut TaskGraph, parent: &str, placeholder: bool) -> Result<()> {
        let store = graph.store_of(parent)?;
        let children = {
            let conn = self.conn()?;
            Self::read_children(&conn, parent, placeholder)?
        };

        for loaded in children {
            let child_id = loaded.row.id.clone();
            let is_new = !graph.contains(&child_id);
            if is_new {
                let mut node = TaskNode::with_id(child_id.clone(), "");
                loaded.apply_to(&mut node)?;
                node.persistence = Some(PersistenceHandle::loaded(Arc::clone(&store)));
                graph.insert(node)?;
            }
            if !graph.node(&child_id)?.parents().iter().any(|p| p == parent) {
                graph.add_child(parent, &child_id)?;
            }
            if !placeholder {
                if let Some(state) = graph.sync_state_mut(&child_id) {
                    state.add_parent_id(parent);
                }
            }
            if is_new {
                self.load_children(graph, &child_id, false)?;
            }
        }
        Ok(())
    }
}

impl TaskStore for SqliteStore {
    fn save(&self, graph: &mut TaskGraph, id: &str, save_children: bool, save_myself: bool) -> Result<()> {
        if save_myself {
            self.save_node(graph, id)?;
            debug!(task = %id, "saved task");
        }

        // Children of a saved node are always written, grouping or not.
        if save_children {
            let store = graph.store_of(id)?;
            let children = graph.node(id)?.children().to_vec();
            for child in children {
                graph.ensure_handle(&child, &store)?;
                graph.save_with(&child, true, true)?;
            }
        }
        Ok(())
    }

    fn load(&self, graph: &mut TaskGraph, id: &str, load_children: bool, root_placeholder: bool) -> Result<()> {
        if !root_placeholder {
            let loaded = {
                let conn = self.conn()?;
                Self::read_task(&conn, id)?
            };
            let loaded = loaded.ok_or_else(|| Error::NotFound(id.to_string()))?;
            loaded.apply_to(graph.node_mut(id)?)?;
            if let Some(state) = graph.sync_state_mut(id) {
                state.persisted = true;
            }
        }

        if load_children {
            self.load_children(graph, id, root_placeholder)?;
        }
        debug!(task = %id, load_children, root_placeholder, "loaded task");
        Ok(())
    }

    fn delete(&self, graph: &mut TaskGraph, id: &str, reparent_to: Option<&str>) -> Result<()> {
        if !graph.is_persisted(id) {
            debug!(task = %id, "delete skipped, task was never saved");
            return Ok(());
        }
        let reparent = reparent_to
            .filter(|p| graph.is_persisted(p))
            .map(str::to_string);

        let removed_rows = {
            let conn = self.conn()?;
            let mut edges = 0;
            if let Some(new_parent) = &reparent {
                conn.execute(
                    "UPDATE OR IGNORE task_parents SET parent_id = ?1
                     WHERE parent_id = ?2 AND child_id != ?1",
                    params![new_parent, id],
                )?;
            }
            edges += conn.execute("DELETE FROM task_parents WHERE parent_id = ?1", params![id])?;
            edges += conn.execute("DELETE FROM task_parents WHERE child_id = ?1", params![id])?;
            conn.execute("DELETE FROM task_tags WHERE task_id = ?1", params![id])?;
            conn.execute("DELETE FROM task_links WHERE task_id = ?1", params![id])?;
            conn.execute("DELETE FROM task_users WHERE task_id = ?1", params![id])?;
            let tasks = conn.execute("DELETE FROM tasks WHERE id = ?1", params![id])?;
            (edges, tasks)
        };
        self.record(|s| {
            s.edges_deleted += removed_rows.0;
            s.tasks_deleted += removed_rows.1;
        });

        if let Some(state) = graph.sync_state_mut(id) {
            state.reset();
        }
        let children = graph.node(id)?.children().to_vec();
        for child in children {
            if let Some(state) = graph.sync_state_mut(&child) {
                if state.has_parent_id(id) {
                    state.remove_parent_id(id);
                    if let Some(new_parent) = &reparent {
                        if new_parent != &child {
                            state.add_parent_id(new_parent);
                        }
                    }
                }
            }
        }
        debug!(task = %id, reparent = ?reparent, "deleted task");
        Ok(())
    }

    fn new_empty(&self, storage_name: &str) -> Result<Arc<dyn TaskStore>> {
        let store = if storage_name == IN_MEMORY {
            SqliteStore::open_in_memory()?
        } else {
            SqliteStore::open(Path::new(storage_name))?
        };
        Ok(Arc::new(store))
    }

    fn last_error(&self) -> Option<Error> {
        None
    }

    fn backend_type(&self) -> BackendType {
        BackendType::Sqlite
    }

    fn storage_name(&self) -> String {
        self.name.clone()
    }

    fn location(&self) -> String {
        match &self.path {
            Some(path) => path.display().to_string(),
            None => "in-memory database".to_string(),
        }
    }
}
