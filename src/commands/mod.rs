//! Command implementations for the pim CLI.
//!
//! Every command opens a [`Session`]: the configured store is loaded under a
//! grouping root, the command runs through the session's command history,
//! and the whole graph is saved before the result is returned.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Local, NaiveDate, Utc};
use serde::Serialize;

use crate::config::{CONFIG_FILE_NAME, OutputFormat, PimConfig, ResolvedConfig};
use crate::history::CommandHistory;
use crate::models::{Hyperlink, TaskGraph, TaskNode, TaskState, estimate_from_minutes, query};
use crate::storage::yaml::{export_document, write_atomic};
use crate::storage::{BackendType, TaskStore, open_store};
use crate::{Error, Result};

/// Command results that can be serialized to JSON or formatted for humans.
pub trait Output {
    fn to_json(&self) -> String;

    fn to_human(&self) -> String;
}

fn json<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|e| format!(r#"{{"error": "{}"}}"#, e))
}

/// A loaded graph plus the history used to change it.
#[derive(Debug)]
pub struct Session {
    pub graph: TaskGraph,
    pub root: String,
    pub history: CommandHistory,
    store: Arc<dyn TaskStore>,
}

impl Session {
    /// Open the configured store and load every task under a grouping root.
    pub fn open(config: &ResolvedConfig) -> Result<Self> {
        let store = open_store(config.backend(), config.database(), config.yaml_file())?;
        Self::with_store(store)
    }

    pub fn with_store(store: Arc<dyn TaskStore>) -> Result<Self> {
        let mut graph = TaskGraph::new();
        let root = graph.create_memory_only("root");
        graph.attach_store(&root, Arc::clone(&store))?;
        graph.load(&root, true)?;
        if let Some(err) = store.last_error() {
            return Err(err);
        }
        Ok(Self {
            graph,
            root,
            history: CommandHistory::new(),
            store,
        })
    }

    pub fn store(&self) -> &Arc<dyn TaskStore> {
        &self.store
    }

    /// Save everything reachable from the root.
    pub fn save(&mut self) -> Result<()> {
        self.graph.save(&self.root, true)
    }

    /// Resolve a full task id or a unique prefix of one.
    pub fn resolve_id(&self, id: &str) -> Result<String> {
        if id != self.root && self.graph.contains(id) {
            return Ok(id.to_string());
        }
        let matches: Vec<&str> = self
            .graph
            .nodes()
            .map(|n| n.id())
            .filter(|candidate| *candidate != self.root && candidate.starts_with(id))
            .collect();
        match matches.as_slice() {
            [] => Err(Error::NotFound(id.to_string())),
            [only] => Ok(only.to_string()),
            _ => Err(Error::InvalidInput(format!(
                "Task id prefix '{}' is ambiguous ({} matches)",
                id,
                matches.len()
            ))),
        }
    }

    /// Resolve an optional parent id, defaulting to the root.
    fn parent_or_root(&self, parent: Option<&str>) -> Result<String> {
        match parent {
            Some(id) => self.resolve_id(id),
            None => Ok(self.root.clone()),
        }
    }

    fn view(&self, id: &str) -> Result<TaskView> {
        Ok(TaskView::from_node(self.node_parents(id)?, self.graph.node(id)?))
    }

    /// Parents of a node without the grouping root.
    fn node_parents(&self, id: &str) -> Result<Vec<String>> {
        Ok(self
            .graph
            .node(id)?
            .parents()
            .iter()
            .filter(|p| **p != self.root)
            .cloned()
            .collect())
    }

    fn views(&self, ids: &[String]) -> Result<Vec<TaskView>> {
        ids.iter().map(|id| self.view(id)).collect()
    }
}

/// Parse a date (`YYYY-MM-DD`, local midnight) or an RFC 3339 timestamp.
pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    let date = parse_date(s)?;
    date.and_hms_opt(0, 0, 0)
        .and_then(|naive| naive.and_local_timezone(Local).earliest())
        .map(|local| local.with_timezone(&Utc))
        .ok_or_else(|| Error::InvalidInput(format!("Invalid date: {}", s)))
}

pub fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| {
        Error::InvalidInput(format!(
            "Invalid date '{}': expected YYYY-MM-DD or an RFC 3339 timestamp",
            s
        ))
    })
}

fn validate_tag(tag: &str) -> Result<&str> {
    let tag = tag.trim();
    if tag.is_empty() {
        return Err(Error::InvalidInput("Tag must not be empty".to_string()));
    }
    Ok(tag)
}

/// Move a task into `state`, stamping start and completion times.
fn apply_state(node: &mut TaskNode, state: TaskState, now: DateTime<Utc>) {
    match state {
        TaskState::InProgress => {
            if node.actual_start_time.is_none() {
                node.actual_start_time = Some(now);
            }
            node.actual_completion_time = None;
        }
        TaskState::Complete => {
            if node.actual_completion_time.is_none() {
                node.actual_completion_time = Some(now);
            }
        }
        TaskState::NotStarted | TaskState::OnHold => node.actual_completion_time = None,
    }
    node.state = state;
}

// === Result types ===

/// One task as shown to the user.
#[derive(Debug, Clone, Serialize)]
pub struct TaskView {
    pub id: String,
    pub name: String,
    pub state: TaskState,
    pub estimate_minutes: i64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub links: Vec<Hyperlink>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub users: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub parents: Vec<String>,
    pub children: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_start_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_start_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_completion_time: Option<DateTime<Utc>>,
}

impl TaskView {
    fn from_node(parents: Vec<String>, node: &TaskNode) -> Self {
        Self {
            id: node.id().to_string(),
            name: node.name.clone(),
            state: node.state,
            estimate_minutes: node.estimate_minutes(),
            tags: node.tags().to_vec(),
            links: node.links().to_vec(),
            users: node.users().to_vec(),
            parents,
            children: node.children().to_vec(),
            target_start_time: node.target_start_time,
            actual_start_time: node.actual_start_time,
            actual_completion_time: node.actual_completion_time,
        }
    }

    fn summary_line(&self) -> String {
        let tags = if self.tags.is_empty() {
            String::new()
        } else {
            format!(" [{}]", self.tags.join(", "))
        };
        format!("{} [{}] {}{}", self.id, self.state.glyph(), self.name, tags)
    }
}

impl Output for TaskView {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        let mut lines = vec![
            format!("{} {}", self.id, self.name),
            format!("  State: {}", self.state),
            format!("  Estimate: {} min", self.estimate_minutes),
        ];
        if !self.tags.is_empty() {
            lines.push(format!("  Tags: {}", self.tags.join(", ")));
        }
        if let Some(target) = self.target_start_time {
            lines.push(format!("  Target start: {}", target.with_timezone(&Local).format("%Y-%m-%d %H:%M")));
        }
        if let Some(done) = self.actual_completion_time {
            lines.push(format!("  Completed: {}", done.with_timezone(&Local).format("%Y-%m-%d %H:%M")));
        }
        for link in &self.links {
            lines.push(format!("  Link: {}", link.uri));
        }
        if !self.users.is_empty() {
            lines.push(format!("  Users: {}", self.users.join(", ")));
        }
        if !self.parents.is_empty() {
            lines.push(format!("  Parents: {}", self.parents.join(", ")));
        }
        lines.push(format!("  Sub-tasks: {}", self.children.len()));
        lines.join("\n")
    }
}

#[derive(Debug, Serialize)]
pub struct TaskList {
    pub tasks: Vec<TaskView>,
    pub count: usize,
}

impl TaskList {
    fn new(tasks: Vec<TaskView>) -> Self {
        let count = tasks.len();
        Self { tasks, count }
    }
}

impl Output for TaskList {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        if self.tasks.is_empty() {
            return "No tasks found.".to_string();
        }
        let mut lines: Vec<String> = self.tasks.iter().map(|t| t.summary_line()).collect();
        lines.push(format!("{} task(s)", self.count));
        lines.join("\n")
    }
}

#[derive(Debug, Serialize)]
pub struct TaskCreated {
    pub id: String,
    pub name: String,
    pub parents: Vec<String>,
}

impl Output for TaskCreated {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        format!("Created task {} \"{}\"", self.id, self.name)
    }
}

#[derive(Debug, Serialize)]
pub struct TaskUpdated {
    pub id: String,
    pub updated_fields: Vec<String>,
}

impl Output for TaskUpdated {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        if self.updated_fields.is_empty() {
            format!("Task {} unchanged", self.id)
        } else {
            format!("Updated task {}: {}", self.id, self.updated_fields.join(", "))
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TaskDeleted {
    pub id: String,
    pub reparented: Vec<String>,
}

impl Output for TaskDeleted {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        if self.reparented.is_empty() {
            format!("Deleted task {}", self.id)
        } else {
            format!(
                "Deleted task {} ({} sub-task(s) moved)",
                self.id,
                self.reparented.len()
            )
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TagCounts {
    pub tags: BTreeMap<String, usize>,
}

impl Output for TagCounts {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        if self.tags.is_empty() {
            return "No tags.".to_string();
        }
        self.tags
            .iter()
            .map(|(tag, count)| format!("{:<20} {}", tag, count))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug, Serialize)]
pub struct TreeResult {
    pub rendered: String,
}

impl Output for TreeResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        if self.rendered.is_empty() {
            "No tasks.".to_string()
        } else {
            self.rendered.clone()
        }
    }
}

#[derive(Debug, Serialize)]
pub struct InitResult {
    pub data_dir: PathBuf,
    pub config_path: PathBuf,
    pub config_created: bool,
    pub backend: BackendType,
    pub location: String,
}

impl Output for InitResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        let config = if self.config_created { "created" } else { "kept" };
        format!(
            "Initialized pim in {}\n  Config: {} ({})\n  Backend: {} at {}",
            self.data_dir.display(),
            self.config_path.display(),
            config,
            self.backend,
            self.location
        )
    }
}

#[derive(Debug, Serialize)]
pub struct ExportResult {
    pub path: PathBuf,
    pub tasks: usize,
}

impl Output for ExportResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        format!("Exported {} task(s) to {}", self.tasks, self.path.display())
    }
}

#[derive(Debug, Serialize)]
pub struct ConfigEntry {
    pub key: String,
    pub value: String,
    pub source: String,
}

#[derive(Debug, Serialize)]
pub struct ConfigShow {
    pub settings: Vec<ConfigEntry>,
}

impl Output for ConfigShow {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        self.settings
            .iter()
            .map(|e| format!("{:<14} {}  ({})", e.key, e.value, e.source))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug, Serialize)]
pub struct ConfigSet {
    pub key: String,
    pub value: String,
    pub path: PathBuf,
}

impl Output for ConfigSet {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        format!("Set {} = {} in {}", self.key, self.value, self.path.display())
    }
}

// === Commands ===

/// Create the data directory, a config file if none exists, and the store.
pub fn init(config: &ResolvedConfig) -> Result<InitResult> {
    std::fs::create_dir_all(config.data_dir())?;
    let config_path = config.config_path();
    let config_created = !config_path.exists();
    if config_created {
        let file = PimConfig {
            backend: Some(config.backend()),
            ..Default::default()
        };
        file.write_to_file(&config_path)?;
    }

    let mut session = Session::open(config)?;
    session.save()?;
    Ok(InitResult {
        data_dir: config.data_dir().to_path_buf(),
        config_path,
        config_created,
        backend: config.backend(),
        location: session.store().location(),
    })
}

/// Fields for a new task.
#[derive(Debug, Default, Clone)]
pub struct NewTask {
    pub name: String,
    pub parents: Vec<String>,
    pub tags: Vec<String>,
    pub estimate: Option<i64>,
    pub target: Option<String>,
    pub links: Vec<String>,
    pub users: Vec<String>,
}

pub fn task_create(session: &mut Session, new: NewTask) -> Result<TaskCreated> {
    let name = new.name.trim().to_string();
    if name.is_empty() {
        return Err(Error::InvalidInput("Task name must not be empty".to_string()));
    }
    let parents = if new.parents.is_empty() {
        vec![session.root.clone()]
    } else {
        new.parents
            .iter()
            .map(|p| session.resolve_id(p))
            .collect::<Result<Vec<_>>>()?
    };
    let target = new.target.as_deref().map(parse_timestamp).transpose()?;
    let tags = new
        .tags
        .iter()
        .map(|t| validate_tag(t))
        .collect::<Result<Vec<_>>>()?;

    let mut node = TaskNode::new(name.clone());
    for tag in tags {
        node.set_tag(tag);
    }
    if let Some(minutes) = new.estimate {
        node.set_estimate_minutes(minutes)?;
    }
    node.target_start_time = target;
    let name_length = name.chars().count() as u32;
    for uri in &new.links {
        node.set_link(Hyperlink::new(uri.clone(), 0, name_length));
    }
    for user in &new.users {
        node.grant_user(user.clone());
    }

    let id = session.graph.insert(node)?;
    for parent in &parents {
        session.graph.add_child(parent, &id)?;
    }
    session.history.create_task(&mut session.graph, &id)?;
    session.save()?;

    Ok(TaskCreated {
        id: id.clone(),
        name,
        parents: session.node_parents(&id)?,
    })
}

pub fn task_list(session: &Session, parent: Option<&str>, tags: &[String], dates: bool) -> Result<TaskList> {
    let parent = session.parent_or_root(parent)?;
    let ids = if tags.is_empty() {
        session.graph.node(&parent)?.children().to_vec()
    } else {
        query::find_tag_matches(&session.graph, &parent, tags, dates)?
    };
    Ok(TaskList::new(session.views(&ids)?))
}

pub fn task_show(session: &Session, id: &str) -> Result<TaskView> {
    let id = session.resolve_id(id)?;
    session.view(&id)
}

/// Edits for an existing task.
#[derive(Debug, Default, Clone)]
pub struct TaskEdit {
    pub name: Option<String>,
    pub state: Option<String>,
    pub tags: Vec<String>,
    pub untags: Vec<String>,
    pub estimate: Option<i64>,
    pub target: Option<String>,
    pub add_parents: Vec<String>,
    pub remove_parents: Vec<String>,
}

pub fn task_update(session: &mut Session, id: &str, edit: TaskEdit) -> Result<TaskUpdated> {
    let id = session.resolve_id(id)?;
    let state = edit
        .state
        .as_deref()
        .map(|s| {
            TaskState::parse(s).ok_or_else(|| {
                Error::InvalidInput(format!(
                    "Invalid state '{}': expected notStarted, inProgress, onHold or complete",
                    s
                ))
            })
        })
        .transpose()?;
    let target = edit.target.as_deref().map(parse_timestamp).transpose()?;
    let estimate = edit.estimate.map(estimate_from_minutes).transpose()?;
    let add_parents = edit
        .add_parents
        .iter()
        .map(|p| session.resolve_id(p))
        .collect::<Result<Vec<_>>>()?;
    let remove_parents = edit
        .remove_parents
        .iter()
        .map(|p| session.resolve_id(p))
        .collect::<Result<Vec<_>>>()?;

    let command = session.history.modify_task_begin(&session.graph, &id)?;
    let mut updated = Vec::new();
    {
        let node = session.graph.node_mut(&id)?;
        if let Some(name) = edit.name {
            let name = name.trim().to_string();
            if name.is_empty() {
                return Err(Error::InvalidInput("Task name must not be empty".to_string()));
            }
            node.name = name;
            updated.push("name".to_string());
        }
        if let Some(state) = state {
            apply_state(node, state, Utc::now());
            updated.push("state".to_string());
        }
        for tag in &edit.tags {
            if node.set_tag(validate_tag(tag)?) {
                updated.push(format!("+{}", tag.trim()));
            }
        }
        for tag in &edit.untags {
            if node.reset_tag(tag.trim()) {
                updated.push(format!("-{}", tag.trim()));
            }
        }
        if let Some(estimate) = estimate {
            node.estimate = estimate;
            updated.push("estimate".to_string());
        }
        if target.is_some() {
            node.target_start_time = target;
            updated.push("target".to_string());
        }
    }

    for parent in &add_parents {
        session.graph.add_child(parent, &id)?;
        updated.push("parents".to_string());
    }
    for parent in &remove_parents {
        session.graph.remove_child(parent, &id)?;
        updated.push("parents".to_string());
    }
    if !add_parents.is_empty() {
        // A task with real parents no longer sits at the top level
        if session.graph.node(&id)?.parents().len() > 1
            && session.graph.node(&id)?.parents().contains(&session.root)
        {
            session.graph.remove_child(&session.root, &id)?;
        }
    }
    if !session.graph.node(&id)?.has_parents() {
        session.graph.add_child(&session.root, &id)?;
    }
    updated.dedup();

    session.history.modify_task_end(&mut session.graph, command)?;
    session.save()?;
    Ok(TaskUpdated {
        id,
        updated_fields: updated,
    })
}

pub fn task_delete(session: &mut Session, id: &str, reparent: Option<&str>) -> Result<TaskDeleted> {
    let id = session.resolve_id(id)?;
    let new_parent = session.parent_or_root(reparent)?;
    let orphans: Vec<String> = session
        .graph
        .node(&id)?
        .children()
        .iter()
        .filter(|c| session.graph.get(c).is_some_and(|n| n.parents().len() == 1))
        .cloned()
        .collect();

    session
        .history
        .delete_task(&mut session.graph, &id, Some(&new_parent))?;
    session.save()?;
    Ok(TaskDeleted {
        id,
        reparented: orphans,
    })
}

pub fn today(session: &Session, parent: Option<&str>) -> Result<TaskList> {
    let parent = session.parent_or_root(parent)?;
    let ids = query::find_today(&session.graph, &parent)?;
    Ok(TaskList::new(session.views(&ids)?))
}

pub fn week(session: &Session, parent: Option<&str>) -> Result<TaskList> {
    let parent = session.parent_or_root(parent)?;
    let ids = query::find_this_week(&session.graph, &parent)?;
    Ok(TaskList::new(session.views(&ids)?))
}

pub fn completed(session: &Session, on: Option<&str>, parent: Option<&str>) -> Result<TaskList> {
    let parent = session.parent_or_root(parent)?;
    let ids = match on {
        Some(date) => query::find_by_completion_date(&session.graph, &parent, parse_date(date)?)?,
        None => query::find_completed(&session.graph, &parent)?,
    };
    Ok(TaskList::new(session.views(&ids)?))
}

pub fn tags(session: &Session, parent: Option<&str>) -> Result<TagCounts> {
    let parent = session.parent_or_root(parent)?;
    Ok(TagCounts {
        tags: query::child_tags(&session.graph, &parent)?,
    })
}

pub fn tree(session: &Session, id: Option<&str>) -> Result<TreeResult> {
    let rendered = match id {
        Some(id) => session.graph.render(&session.resolve_id(id)?)?,
        None => session.graph.render_children(&session.root)?,
    };
    Ok(TreeResult { rendered })
}

pub fn export(session: &Session, path: &Path) -> Result<ExportResult> {
    let document = export_document(&session.graph, &session.root)?;
    write_atomic(path, &serde_yaml::to_string(&document)?)?;
    Ok(ExportResult {
        path: path.to_path_buf(),
        tasks: document.tasks.len(),
    })
}

pub fn config_show(config: &ResolvedConfig) -> ConfigShow {
    let entry = |key: &str, value: String, source: String| ConfigEntry {
        key: key.to_string(),
        value,
        source,
    };
    ConfigShow {
        settings: vec![
            entry(
                "data-dir",
                config.data_dir().display().to_string(),
                config.data_dir.source.to_string(),
            ),
            entry(
                "backend",
                config.backend().to_string(),
                config.backend.source.to_string(),
            ),
            entry(
                "database",
                config.database().display().to_string(),
                config.database.source.to_string(),
            ),
            entry(
                "yaml-file",
                config.yaml_file().display().to_string(),
                config.yaml_file.source.to_string(),
            ),
            entry(
                "log-level",
                config.log_level().to_string(),
                config.log_level.source.to_string(),
            ),
            entry(
                "output-format",
                config.output_format().to_string(),
                config.output_format.source.to_string(),
            ),
        ],
    }
}

pub fn config_set(config: &ResolvedConfig, key: &str, value: &str) -> Result<ConfigSet> {
    let path = config.data_dir().join(CONFIG_FILE_NAME);
    let mut file = PimConfig::load_from_file(&path)?;
    match key {
        "backend" => {
            file.backend = Some(BackendType::from_str(value).ok_or_else(|| {
                Error::InvalidInput(format!("Unknown backend '{}': expected sqlite or yaml", value))
            })?);
        }
        "database" => file.database = Some(PathBuf::from(value)),
        "yaml-file" => file.yaml_file = Some(PathBuf::from(value)),
        "log-level" => file.log_level = Some(value.to_string()),
        "output-format" => {
            file.output_format = Some(OutputFormat::parse(value).ok_or_else(|| {
                Error::InvalidInput(format!("Unknown output format '{}': expected json or human", value))
            })?);
        }
        other => {
            return Err(Error::InvalidInput(format!(
                "Unknown config key '{}': expected backend, database, yaml-file, log-level or output-format",
                other
            )));
        }
    }
    file.write_to_file(&path)?;
    Ok(ConfigSet {
        key: key.to_string(),
        value: value.to_string(),
        path,
    })
}
