//! Data models for pim.
//!
//! A [`TaskNode`] is a single task in the graph. Nodes never own their
//! relatives: parent and child edges are stored as id lists and kept
//! symmetric by the operations in [`graph`].

pub mod graph;
pub mod query;

pub use graph::{Removal, SiblingLookup, SiblingResolution, TaskGraph};

use chrono::{DateTime, Datelike, Duration, Local, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::storage::PersistenceHandle;
use crate::{Error, Result};

/// System tag marking a task for today.
pub const TAG_TODAY: &str = "today";

/// System tag marking a task for the current week.
pub const TAG_THIS_WEEK: &str = "thisweek";

/// System tag for tasks that should stay visible until done.
pub const TAG_DONT_FORGET: &str = "dontforget";

/// Estimate for a minute count, if a [`Duration`] can hold it.
pub fn estimate_from_minutes(minutes: i64) -> Result<Duration> {
    Duration::try_minutes(minutes)
        .ok_or_else(|| Error::InvalidInput(format!("Estimate out of range: {minutes} minutes")))
}

/// Task state in the workflow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TaskState {
    #[default]
    NotStarted,
    Complete,
    InProgress,
    OnHold,
}

impl TaskState {
    /// Parse a state from its name, case-insensitive.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().replace(['-', '_'], "").as_str() {
            "notstarted" | "todo" => Some(Self::NotStarted),
            "complete" | "done" => Some(Self::Complete),
            "inprogress" | "started" => Some(Self::InProgress),
            "onhold" | "hold" => Some(Self::OnHold),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "notStarted",
            Self::Complete => "complete",
            Self::InProgress => "inProgress",
            Self::OnHold => "onHold",
        }
    }

    /// Integer code stored in the database.
    pub fn code(&self) -> i64 {
        match self {
            Self::NotStarted => 0,
            Self::Complete => 1,
            Self::InProgress => 2,
            Self::OnHold => 3,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::NotStarted),
            1 => Some(Self::Complete),
            2 => Some(Self::InProgress),
            3 => Some(Self::OnHold),
            _ => None,
        }
    }

    /// Single character used when rendering a hierarchy.
    pub fn glyph(&self) -> char {
        match self {
            Self::NotStarted => ' ',
            Self::Complete => '\u{2713}',
            Self::InProgress => '\u{27a0}',
            Self::OnHold => '\u{2394}',
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A hyperlink embedded in a task name.
///
/// `name_offset` and `name_length` locate the link text inside the name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hyperlink {
    pub uri: String,
    #[serde(default)]
    pub name_offset: u32,
    #[serde(default)]
    pub name_length: u32,
}

impl Hyperlink {
    pub fn new(uri: impl Into<String>, name_offset: u32, name_length: u32) -> Self {
        Self {
            uri: uri.into(),
            name_offset,
            name_length,
        }
    }
}

/// A single task in the graph.
#[derive(Debug)]
pub struct TaskNode {
    id: String,

    pub name: String,
    pub state: TaskState,
    pub target_start_time: Option<DateTime<Utc>>,
    pub actual_start_time: Option<DateTime<Utc>>,
    pub actual_completion_time: Option<DateTime<Utc>>,

    /// Expected effort, persisted in whole minutes
    pub estimate: Duration,

    /// Marker a UI uses to track a path through the hierarchy
    pub current: bool,

    tags: Vec<String>,
    links: Vec<Hyperlink>,
    users: Vec<String>,

    parents: Vec<String>,
    children: Vec<String>,

    /// Grouping node that is never written to storage itself
    memory_only: bool,

    child_cursor: usize,
    parent_cursor: usize,

    pub(crate) persistence: Option<PersistenceHandle>,
}

impl TaskNode {
    /// Create a new task with a freshly generated id.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_id(uuid::Uuid::new_v4().to_string(), name)
    }

    /// Create a task for an id that already exists in storage.
    pub fn with_id(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            state: TaskState::NotStarted,
            target_start_time: None,
            actual_start_time: None,
            actual_completion_time: None,
            estimate: Duration::zero(),
            current: false,
            tags: Vec::new(),
            links: Vec::new(),
            users: Vec::new(),
            parents: Vec::new(),
            children: Vec::new(),
            memory_only: false,
            child_cursor: 0,
            parent_cursor: 0,
            persistence: None,
        }
    }

    /// Create a grouping node that is never persisted.
    pub fn memory_only(name: impl Into<String>) -> Self {
        let mut node = Self::new(name);
        node.memory_only = true;
        node
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_memory_only(&self) -> bool {
        self.memory_only
    }

    pub fn parents(&self) -> &[String] {
        &self.parents
    }

    pub fn children(&self) -> &[String] {
        &self.children
    }

    pub fn has_parents(&self) -> bool {
        !self.parents.is_empty()
    }

    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }

    pub fn persistence(&self) -> Option<&PersistenceHandle> {
        self.persistence.as_ref()
    }

    /// Estimate rounded down to whole minutes.
    pub fn estimate_minutes(&self) -> i64 {
        self.estimate.num_minutes()
    }

    /// Fails when `minutes` does not fit in a [`Duration`].
    pub fn set_estimate_minutes(&mut self, minutes: i64) -> Result<()> {
        self.estimate = estimate_from_minutes(minutes)?;
        Ok(())
    }

    // Tags

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    /// Add a tag. Returns false if the tag was already set.
    pub fn set_tag(&mut self, tag: impl Into<String>) -> bool {
        let tag = tag.into();
        if tag.is_empty() || self.is_tag_set(&tag) {
            return false;
        }
        self.tags.push(tag);
        true
    }

    /// Remove a tag. Returns false if the tag was not set.
    pub fn reset_tag(&mut self, tag: &str) -> bool {
        let before = self.tags.len();
        self.tags.retain(|t| t != tag);
        self.tags.len() != before
    }

    pub fn clear_tags(&mut self) {
        self.tags.clear();
    }

    pub fn is_tag_set(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    // Links

    pub fn links(&self) -> &[Hyperlink] {
        &self.links
    }

    /// Add a link, or update the offsets of the link with the same URI.
    pub fn set_link(&mut self, link: Hyperlink) {
        match self.links.iter_mut().find(|l| l.uri == link.uri) {
            Some(existing) => *existing = link,
            None => self.links.push(link),
        }
    }

    pub fn remove_link(&mut self, uri: &str) -> bool {
        let before = self.links.len();
        self.links.retain(|l| l.uri != uri);
        self.links.len() != before
    }

    // Users

    pub fn users(&self) -> &[String] {
        &self.users
    }

    pub fn grant_user(&mut self, user: impl Into<String>) -> bool {
        let user = user.into();
        if self.users.contains(&user) {
            return false;
        }
        self.users.push(user);
        true
    }

    pub fn revoke_user(&mut self, user: &str) -> bool {
        let before = self.users.len();
        self.users.retain(|u| u != user);
        self.users.len() != before
    }

    pub fn is_visible_to(&self, user: &str) -> bool {
        self.users.iter().any(|u| u == user)
    }

    // Date predicates

    /// True if tagged `today` or the target start falls on the current local day.
    pub fn is_today(&self) -> bool {
        self.is_today_at(Local::now())
    }

    pub fn is_today_at(&self, now: DateTime<Local>) -> bool {
        if self.is_tag_set(TAG_TODAY) {
            return true;
        }
        self.target_local_date()
            .is_some_and(|date| date == now.date_naive())
    }

    /// True if tagged `thisweek` or the target start falls in the current
    /// Sunday-to-Saturday local week.
    pub fn is_this_week(&self) -> bool {
        self.is_this_week_at(Local::now())
    }

    pub fn is_this_week_at(&self, now: DateTime<Local>) -> bool {
        if self.is_tag_set(TAG_THIS_WEEK) {
            return true;
        }
        let today = now.date_naive();
        let start = today - Duration::days(i64::from(today.weekday().num_days_from_sunday()));
        let end = start + Duration::days(7);
        self.target_local_date()
            .is_some_and(|date| date >= start && date < end)
    }

    /// Local calendar day of the completion time, if completed.
    pub fn completion_date(&self) -> Option<NaiveDate> {
        self.actual_completion_time
            .map(|t| t.with_timezone(&Local).date_naive())
    }

    fn target_local_date(&self) -> Option<NaiveDate> {
        self.target_start_time
            .map(|t| t.with_timezone(&Local).date_naive())
    }

    /// Capture every value field plus the edge lists.
    pub fn snapshot(&self) -> TaskSnapshot {
        TaskSnapshot {
            id: self.id.clone(),
            name: self.name.clone(),
            state: self.state,
            target_start_time: self.target_start_time,
            actual_start_time: self.actual_start_time,
            actual_completion_time: self.actual_completion_time,
            estimate: self.estimate,
            tags: self.tags.clone(),
            links: self.links.clone(),
            users: self.users.clone(),
            parents: self.parents.clone(),
            children: self.children.clone(),
            positions: Vec::new(),
        }
    }

    /// Copy the value fields of a snapshot onto this node. Edges are untouched.
    pub(crate) fn apply_fields(&mut self, snapshot: &TaskSnapshot) {
        self.name = snapshot.name.clone();
        self.state = snapshot.state;
        self.target_start_time = snapshot.target_start_time;
        self.actual_start_time = snapshot.actual_start_time;
        self.actual_completion_time = snapshot.actual_completion_time;
        self.estimate = snapshot.estimate;
        self.tags = snapshot.tags.clone();
        self.links = snapshot.links.clone();
        self.users = snapshot.users.clone();
    }

    /// Replace tags, links and users wholesale, as read from storage.
    pub(crate) fn replace_lists(&mut self, tags: Vec<String>, links: Vec<Hyperlink>, users: Vec<String>) {
        self.tags.clear();
        for tag in tags {
            self.set_tag(tag);
        }
        self.links.clear();
        for link in links {
            self.set_link(link);
        }
        self.users.clear();
        for user in users {
            self.grant_user(user);
        }
    }

    /// Single line used by [`TaskGraph::render`].
    pub fn render_line(&self, level: usize) -> String {
        format!(
            "{}{}[{}] {} ({} sub-tasks)",
            "   ".repeat(level),
            if self.current { '*' } else { ' ' },
            self.state.glyph(),
            self.name,
            self.children.len()
        )
    }
}

/// Value copy of a task taken before a modification, used for undo.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskSnapshot {
    pub id: String,
    pub name: String,
    pub state: TaskState,
    pub target_start_time: Option<DateTime<Utc>>,
    pub actual_start_time: Option<DateTime<Utc>>,
    pub actual_completion_time: Option<DateTime<Utc>>,
    pub estimate: Duration,
    pub tags: Vec<String>,
    pub links: Vec<Hyperlink>,
    pub users: Vec<String>,
    pub parents: Vec<String>,
    pub children: Vec<String>,
    /// Each parent with the sibling that followed this task in it
    pub positions: Vec<(String, Option<String>)>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn local(y: i32, m: u32, d: u32, h: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    #[test]
    fn test_task_state_serialization() {
        let json = serde_json::to_string(&TaskState::NotStarted).unwrap();
        assert_eq!(json, r#""notStarted""#);

        let state: TaskState = serde_json::from_str(r#""onHold""#).unwrap();
        assert_eq!(state, TaskState::OnHold);
    }

    #[test]
    fn test_task_state_codes() {
        for state in [
            TaskState::NotStarted,
            TaskState::Complete,
            TaskState::InProgress,
            TaskState::OnHold,
        ] {
            assert_eq!(TaskState::from_code(state.code()), Some(state));
        }
        assert_eq!(TaskState::from_code(9), None);
    }

    #[test]
    fn test_task_state_parse() {
        assert_eq!(TaskState::parse("in-progress"), Some(TaskState::InProgress));
        assert_eq!(TaskState::parse("Complete"), Some(TaskState::Complete));
        assert_eq!(TaskState::parse("whenever"), None);
    }

    #[test]
    fn test_new_task_has_unique_id() {
        let a = TaskNode::new("a");
        let b = TaskNode::new("a");
        assert_ne!(a.id(), b.id());
        assert_eq!(a.state, TaskState::NotStarted);
        assert!(!a.is_memory_only());
    }

    #[test]
    fn test_tags_are_unique() {
        let mut task = TaskNode::new("t");
        assert!(task.set_tag("work"));
        assert!(!task.set_tag("work"));
        assert!(!task.set_tag(""));
        assert_eq!(task.tags(), &["work".to_string()]);

        assert!(task.reset_tag("work"));
        assert!(!task.reset_tag("work"));
        assert!(task.tags().is_empty());
    }

    #[test]
    fn test_set_link_replaces_same_uri() {
        let mut task = TaskNode::new("read the docs");
        task.set_link(Hyperlink::new("https://docs.rs", 0, 4));
        task.set_link(Hyperlink::new("https://crates.io", 5, 3));
        task.set_link(Hyperlink::new("https://docs.rs", 9, 4));

        assert_eq!(task.links().len(), 2);
        assert_eq!(task.links()[0], Hyperlink::new("https://docs.rs", 9, 4));
        assert!(task.remove_link("https://crates.io"));
        assert_eq!(task.links().len(), 1);
    }

    #[test]
    fn test_user_visibility() {
        let mut task = TaskNode::new("shared");
        assert!(!task.is_visible_to("alice"));
        assert!(task.grant_user("alice"));
        assert!(!task.grant_user("alice"));
        assert!(task.is_visible_to("alice"));
        assert!(task.revoke_user("alice"));
        assert!(!task.is_visible_to("alice"));
    }

    #[test]
    fn test_is_today_from_tag_or_date() {
        let now = local(2026, 3, 11, 12);
        let mut task = TaskNode::new("t");
        assert!(!task.is_today_at(now));

        task.target_start_time = Some(local(2026, 3, 11, 8).with_timezone(&Utc));
        assert!(task.is_today_at(now));

        task.target_start_time = Some(local(2026, 3, 12, 8).with_timezone(&Utc));
        assert!(!task.is_today_at(now));

        task.set_tag(TAG_TODAY);
        assert!(task.is_today_at(now));
    }

    #[test]
    fn test_is_this_week_sunday_to_saturday() {
        // 2026-03-11 is a Wednesday; its week runs 03-08 (Sun) to 03-14 (Sat).
        let now = local(2026, 3, 11, 12);
        let mut task = TaskNode::new("t");

        task.target_start_time = Some(local(2026, 3, 8, 10).with_timezone(&Utc));
        assert!(task.is_this_week_at(now));

        task.target_start_time = Some(local(2026, 3, 14, 23).with_timezone(&Utc));
        assert!(task.is_this_week_at(now));

        task.target_start_time = Some(local(2026, 3, 15, 0).with_timezone(&Utc));
        assert!(!task.is_this_week_at(now));

        task.target_start_time = Some(local(2026, 3, 7, 23).with_timezone(&Utc));
        assert!(!task.is_this_week_at(now));

        task.set_tag(TAG_THIS_WEEK);
        assert!(task.is_this_week_at(now));
    }

    #[test]
    fn test_render_line() {
        let mut task = TaskNode::new("Write report");
        task.state = TaskState::Complete;
        assert_eq!(task.render_line(1), "    [\u{2713}] Write report (0 sub-tasks)");

        task.current = true;
        assert_eq!(task.render_line(0), "*[\u{2713}] Write report (0 sub-tasks)");
    }

    #[test]
    fn test_snapshot_apply_fields() {
        let mut task = TaskNode::new("before");
        task.set_tag("a");
        task.set_estimate_minutes(30).unwrap();
        let snapshot = task.snapshot();

        task.name = "after".to_string();
        task.clear_tags();
        task.set_estimate_minutes(5).unwrap();
        task.apply_fields(&snapshot);

        assert_eq!(task.snapshot(), snapshot);
        assert_eq!(task.estimate_minutes(), 30);
    }

    #[test]
    fn test_estimate_out_of_range_is_rejected() {
        let mut task = TaskNode::new("forever");
        task.set_estimate_minutes(90).unwrap();

        let result = task.set_estimate_minutes(i64::MAX);
        assert!(matches!(result, Err(Error::InvalidInput(_))));
        assert_eq!(task.estimate_minutes(), 90);
    }
}
