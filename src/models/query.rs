//! Queries over the direct children of a task.
//!
//! Every helper returns child ids in child-list order.

use std::collections::BTreeMap;

use chrono::{DateTime, Local, NaiveDate};

use crate::models::{TAG_THIS_WEEK, TAG_TODAY, TaskGraph, TaskNode, TaskState};
use crate::Result;

/// Children of `parent` carrying every one of `tags`.
///
/// With `auto_date`, the `today` and `thisweek` tags also match children
/// whose target start date falls in that window.
pub fn find_tag_matches(
    graph: &TaskGraph,
    parent: &str,
    tags: &[String],
    auto_date: bool,
) -> Result<Vec<String>> {
    find_tag_matches_at(graph, parent, tags, auto_date, Local::now())
}

pub fn find_tag_matches_at(
    graph: &TaskGraph,
    parent: &str,
    tags: &[String],
    auto_date: bool,
    now: DateTime<Local>,
) -> Result<Vec<String>> {
    filter_children(graph, parent, |child| {
        tags.iter().all(|tag| {
            if auto_date && tag == TAG_TODAY {
                child.is_today_at(now)
            } else if auto_date && tag == TAG_THIS_WEEK {
                child.is_this_week_at(now)
            } else {
                child.is_tag_set(tag)
            }
        })
    })
}

/// Children completed on the given local calendar day.
pub fn find_by_completion_date(graph: &TaskGraph, parent: &str, date: NaiveDate) -> Result<Vec<String>> {
    filter_children(graph, parent, |child| child.completion_date() == Some(date))
}

pub fn find_today(graph: &TaskGraph, parent: &str) -> Result<Vec<String>> {
    find_today_at(graph, parent, Local::now())
}

pub fn find_today_at(graph: &TaskGraph, parent: &str, now: DateTime<Local>) -> Result<Vec<String>> {
    filter_children(graph, parent, |child| child.is_today_at(now))
}

pub fn find_this_week(graph: &TaskGraph, parent: &str) -> Result<Vec<String>> {
    find_this_week_at(graph, parent, Local::now())
}

pub fn find_this_week_at(graph: &TaskGraph, parent: &str, now: DateTime<Local>) -> Result<Vec<String>> {
    filter_children(graph, parent, |child| child.is_this_week_at(now))
}

pub fn find_completed(graph: &TaskGraph, parent: &str) -> Result<Vec<String>> {
    filter_children(graph, parent, |child| child.state == TaskState::Complete)
}

/// Every tag used by the children of `parent`, with how many children use it.
pub fn child_tags(graph: &TaskGraph, parent: &str) -> Result<BTreeMap<String, usize>> {
    let mut counts = BTreeMap::new();
    for child in graph.node(parent)?.children() {
        for tag in graph.node(child)?.tags() {
            *counts.entry(tag.clone()).or_insert(0) += 1;
        }
    }
    Ok(counts)
}

fn filter_children<F>(graph: &TaskGraph, parent: &str, mut keep: F) -> Result<Vec<String>>
where
    F: FnMut(&TaskNode) -> bool,
{
    let mut matches = Vec::new();
    for child in graph.node(parent)?.children() {
        if keep(graph.node(child)?) {
            matches.push(child.clone());
        }
    }
    Ok(matches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn now() -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 3, 11, 12, 0, 0).unwrap()
    }

    fn graph_with_children(names: &[&str]) -> (TaskGraph, String, Vec<String>) {
        let mut graph = TaskGraph::new();
        let root = graph.create_memory_only("root");
        let kids = names
            .iter()
            .map(|name| {
                let id = graph.create(*name);
                graph.add_child(&root, &id).unwrap();
                id
            })
            .collect();
        (graph, root, kids)
    }

    #[test]
    fn test_find_tag_matches_requires_all_tags() {
        let (mut graph, root, kids) = graph_with_children(&["a", "b", "c"]);
        graph.node_mut(&kids[0]).unwrap().set_tag("work");
        graph.node_mut(&kids[0]).unwrap().set_tag("urgent");
        graph.node_mut(&kids[1]).unwrap().set_tag("work");

        let tags = vec!["work".to_string(), "urgent".to_string()];
        let found = find_tag_matches_at(&graph, &root, &tags, false, now()).unwrap();
        assert_eq!(found, vec![kids[0].clone()]);

        let found = find_tag_matches_at(&graph, &root, &["work".to_string()], false, now()).unwrap();
        assert_eq!(found, vec![kids[0].clone(), kids[1].clone()]);
    }

    #[test]
    fn test_find_tag_matches_auto_date() {
        let (mut graph, root, kids) = graph_with_children(&["dated", "plain"]);
        graph.node_mut(&kids[0]).unwrap().target_start_time =
            Some(Local.with_ymd_and_hms(2026, 3, 11, 9, 0, 0).unwrap().with_timezone(&Utc));

        let tags = vec![TAG_TODAY.to_string()];
        assert!(find_tag_matches_at(&graph, &root, &tags, false, now()).unwrap().is_empty());
        assert_eq!(
            find_tag_matches_at(&graph, &root, &tags, true, now()).unwrap(),
            vec![kids[0].clone()]
        );
    }

    #[test]
    fn test_find_today_and_this_week() {
        let (mut graph, root, kids) = graph_with_children(&["today", "friday", "later"]);
        graph.node_mut(&kids[0]).unwrap().set_tag(TAG_TODAY);
        graph.node_mut(&kids[1]).unwrap().target_start_time =
            Some(Local.with_ymd_and_hms(2026, 3, 13, 9, 0, 0).unwrap().with_timezone(&Utc));
        graph.node_mut(&kids[2]).unwrap().target_start_time =
            Some(Local.with_ymd_and_hms(2026, 4, 1, 9, 0, 0).unwrap().with_timezone(&Utc));

        assert_eq!(find_today_at(&graph, &root, now()).unwrap(), vec![kids[0].clone()]);
        assert_eq!(find_this_week_at(&graph, &root, now()).unwrap(), vec![kids[1].clone()]);
    }

    #[test]
    fn test_find_completed_and_by_date() {
        let (mut graph, root, kids) = graph_with_children(&["done", "open"]);
        let done = graph.node_mut(&kids[0]).unwrap();
        done.state = TaskState::Complete;
        done.actual_completion_time =
            Some(Local.with_ymd_and_hms(2026, 3, 10, 17, 0, 0).unwrap().with_timezone(&Utc));

        assert_eq!(find_completed(&graph, &root).unwrap(), vec![kids[0].clone()]);
        let day = NaiveDate::from_ymd_opt(2026, 3, 10).unwrap();
        assert_eq!(find_by_completion_date(&graph, &root, day).unwrap(), vec![kids[0].clone()]);
        let other_day = NaiveDate::from_ymd_opt(2026, 3, 11).unwrap();
        assert!(find_by_completion_date(&graph, &root, other_day).unwrap().is_empty());
    }

    #[test]
    fn test_child_tags_counts() {
        let (mut graph, root, kids) = graph_with_children(&["a", "b"]);
        graph.node_mut(&kids[0]).unwrap().set_tag("home");
        graph.node_mut(&kids[0]).unwrap().set_tag("work");
        graph.node_mut(&kids[1]).unwrap().set_tag("work");

        let counts = child_tags(&graph, &root).unwrap();
        assert_eq!(counts.get("work"), Some(&2));
        assert_eq!(counts.get("home"), Some(&1));
        assert_eq!(counts.len(), 2);
    }

    #[test]
    fn test_queries_unknown_parent() {
        let graph = TaskGraph::new();
        assert!(find_completed(&graph, "missing").is_err());
    }
}
