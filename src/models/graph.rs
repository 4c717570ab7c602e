//! In-memory task graph.
//!
//! Nodes live in an arena keyed by id. Every edge is recorded twice, once in
//! the parent's child list and once in the child's parent list, and both
//! sides are always changed together. Edges that would close a cycle are
//! rejected.

use std::collections::{HashMap, HashSet};

use crate::models::{TaskNode, TaskSnapshot};
use crate::{Error, Result};

/// Which parent a sibling lookup used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SiblingResolution {
    /// The caller named the parent
    Explicit(String),
    /// The first parent marked current
    Current(String),
    /// No current parent, so the first parent was used
    FirstAvailable(String),
}

impl SiblingResolution {
    pub fn parent_id(&self) -> &str {
        match self {
            Self::Explicit(id) | Self::Current(id) | Self::FirstAvailable(id) => id,
        }
    }
}

/// Result of a sibling lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiblingLookup {
    /// Neighbouring child in the resolved parent's list, if any
    pub sibling: Option<String>,
    pub resolution: SiblingResolution,
}

/// What a removal detached, so it can be reversed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Removal {
    pub former_parents: Vec<String>,
    pub former_children: Vec<String>,
    /// Children that were orphaned and attached to the replacement parent
    pub reparented: Vec<String>,
}

/// Arena of task nodes joined by parent/child edges.
#[derive(Debug, Default)]
pub struct TaskGraph {
    nodes: HashMap<String, TaskNode>,
}

impl TaskGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a detached node to the arena and return its id.
    pub fn insert(&mut self, node: TaskNode) -> Result<String> {
        let id = node.id().to_string();
        if self.nodes.contains_key(&id) {
            return Err(Error::InvalidInput(format!("Task {} already exists", id)));
        }
        self.nodes.insert(id.clone(), node);
        Ok(id)
    }

    /// Create a new task with a fresh id.
    pub fn create(&mut self, name: impl Into<String>) -> String {
        let node = TaskNode::new(name);
        let id = node.id().to_string();
        self.nodes.insert(id.clone(), node);
        id
    }

    /// Create a grouping node that is never persisted itself.
    pub fn create_memory_only(&mut self, name: impl Into<String>) -> String {
        let node = TaskNode::memory_only(name);
        let id = node.id().to_string();
        self.nodes.insert(id.clone(), node);
        id
    }

    pub fn get(&self, id: &str) -> Option<&TaskNode> {
        self.nodes.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut TaskNode> {
        self.nodes.get_mut(id)
    }

    /// Get a node or fail with `NotFound`.
    pub fn node(&self, id: &str) -> Result<&TaskNode> {
        self.nodes
            .get(id)
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    pub fn node_mut(&mut self, id: &str) -> Result<&mut TaskNode> {
        self.nodes
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &TaskNode> {
        self.nodes.values()
    }

    // Edges

    /// Append `child` to `parent`'s children and `parent` to `child`'s parents.
    ///
    /// A node without a persistence handle receives a fresh copy of the
    /// other side's handle.
    pub fn add_child(&mut self, parent: &str, child: &str) -> Result<()> {
        if parent == child {
            return Err(Error::InvalidInput(format!(
                "Task {} cannot be its own child",
                parent
            )));
        }
        let parent_handle = self.node(parent)?.persistence.as_ref().map(|h| h.fresh());
        let child_node = self.node(child)?;
        let child_handle = child_node.persistence.as_ref().map(|h| h.fresh());

        if child_node.parents.iter().any(|p| p == parent) {
            return Err(Error::InvalidInput(format!(
                "Task {} is already a child of {}",
                child, parent
            )));
        }
        if self.would_create_cycle(parent, child) {
            return Err(Error::CycleDetected {
                parent: parent.to_string(),
                child: child.to_string(),
            });
        }

        let parent_node = self.node_mut(parent)?;
        parent_node.children.push(child.to_string());
        if parent_node.persistence.is_none() {
            parent_node.persistence = child_handle;
        }

        let child_node = self.node_mut(child)?;
        child_node.parents.push(parent.to_string());
        if child_node.persistence.is_none() {
            child_node.persistence = parent_handle;
        }
        Ok(())
    }

    pub fn add_parent(&mut self, child: &str, parent: &str) -> Result<()> {
        self.add_child(parent, child)
    }

    /// Remove the edge, failing if either side of it is missing.
    pub fn remove_parent(&mut self, child: &str, parent: &str) -> Result<()> {
        self.unlink(parent, child)
    }

    pub fn remove_child(&mut self, parent: &str, child: &str) -> Result<()> {
        self.unlink(parent, child)
    }

    fn unlink(&mut self, parent: &str, child: &str) -> Result<()> {
        let edge_missing = || Error::EdgeNotFound {
            parent: parent.to_string(),
            child: child.to_string(),
        };
        let parent_idx = self
            .node(child)?
            .parents
            .iter()
            .position(|p| p == parent)
            .ok_or_else(edge_missing)?;
        let child_idx = self
            .node(parent)?
            .children
            .iter()
            .position(|c| c == child)
            .ok_or_else(edge_missing)?;

        self.node_mut(child)?.parents.remove(parent_idx);
        self.node_mut(parent)?.children.remove(child_idx);
        Ok(())
    }

    /// Returns true if `child` can already reach `parent` through child links.
    pub fn would_create_cycle(&self, parent: &str, child: &str) -> bool {
        let mut visited = HashSet::new();
        let mut stack = vec![child.to_string()];

        while let Some(current) = stack.pop() {
            if current == parent {
                return true;
            }
            if !visited.insert(current.clone()) {
                continue;
            }
            if let Some(node) = self.nodes.get(&current) {
                for next in &node.children {
                    if !visited.contains(next) {
                        stack.push(next.clone());
                    }
                }
            }
        }
        false
    }

    /// Detach a node from all relatives without touching storage.
    ///
    /// Children left without any parent are attached to `new_parent` when
    /// one is given. The node itself stays in the arena.
    pub fn detach(&mut self, id: &str, new_parent: Option<&str>) -> Result<Removal> {
        self.check_new_parent(id, new_parent)?;
        let node = self.node(id)?;
        let mut removal = Removal {
            former_parents: node.parents.clone(),
            former_children: node.children.clone(),
            reparented: Vec::new(),
        };

        for parent in &removal.former_parents {
            self.remove_child(parent, id)?;
        }
        for child in &removal.former_children {
            self.remove_parent(child, id)?;
            if let Some(np) = new_parent {
                if !self.node(child)?.has_parents() {
                    self.add_child(np, child)?;
                    removal.reparented.push(child.clone());
                }
            }
        }
        Ok(removal)
    }

    /// Reject a reparent target that could not adopt `id`'s orphans.
    ///
    /// Once this passes, detaching `id` cannot fail partway.
    fn check_new_parent(&self, id: &str, new_parent: Option<&str>) -> Result<()> {
        self.node(id)?;
        let Some(np) = new_parent else {
            return Ok(());
        };
        self.node(np)?;
        if np == id {
            return Err(Error::InvalidInput(format!(
                "Task {} cannot adopt its own children",
                id
            )));
        }
        if self.find_descendant(id, np).is_some() {
            return Err(Error::InvalidInput(format!(
                "Task {} is below {} and cannot adopt its children",
                np, id
            )));
        }
        Ok(())
    }

    /// Delete a node from storage, then detach it.
    ///
    /// Storage goes first because the backend needs the node's relationships
    /// to find what to delete. The reparent target is checked before either.
    pub fn remove(&mut self, id: &str, new_parent: Option<&str>) -> Result<Removal> {
        self.check_new_parent(id, new_parent)?;
        if self.node(id)?.persistence.is_some() {
            self.delete_persisted(id, None)?;
        }
        self.detach(id, new_parent)
    }

    /// Move `id` before `target` in `parent`'s child list, or to the end.
    pub fn move_before(&mut self, parent: &str, id: &str, target: Option<&str>) -> Result<()> {
        let children = &mut self.node_mut(parent)?.children;
        let from = children
            .iter()
            .position(|c| c == id)
            .ok_or_else(|| Error::NotInList(id.to_string()))?;
        if let Some(t) = target {
            if !children.iter().any(|c| c == t) {
                return Err(Error::NotInList(t.to_string()));
            }
            if t == id {
                return Ok(());
            }
        }

        let moved = children.remove(from);
        match target {
            Some(t) => {
                // Target is known to be present after removing `id`
                let to = children.iter().position(|c| c == t).unwrap_or(children.len());
                children.insert(to, moved);
            }
            None => children.push(moved),
        }
        Ok(())
    }

    // Iteration

    /// Step the child cursor by `delta`; zero resets to the first child.
    ///
    /// Stepping outside the list returns `None` and leaves the cursor alone.
    pub fn iter_child(&mut self, id: &str, delta: isize) -> Result<Option<String>> {
        let node = self.node_mut(id)?;
        Ok(step_cursor(&node.children, &mut node.child_cursor, delta))
    }

    pub fn iter_parent(&mut self, id: &str, delta: isize) -> Result<Option<String>> {
        let node = self.node_mut(id)?;
        Ok(step_cursor(&node.parents, &mut node.parent_cursor, delta))
    }

    pub fn first_child(&mut self, id: &str) -> Result<Option<String>> {
        self.iter_child(id, 0)
    }

    pub fn next_child(&mut self, id: &str) -> Result<Option<String>> {
        self.iter_child(id, 1)
    }

    pub fn prev_child(&mut self, id: &str) -> Result<Option<String>> {
        self.iter_child(id, -1)
    }

    pub fn first_parent(&mut self, id: &str) -> Result<Option<String>> {
        self.iter_parent(id, 0)
    }

    pub fn next_parent(&mut self, id: &str) -> Result<Option<String>> {
        self.iter_parent(id, 1)
    }

    pub fn prev_parent(&mut self, id: &str) -> Result<Option<String>> {
        self.iter_parent(id, -1)
    }

    /// First parent of `id` marked current.
    pub fn current_parent(&self, id: &str) -> Option<&str> {
        let node = self.nodes.get(id)?;
        node.parents
            .iter()
            .find(|p| self.nodes.get(p.as_str()).is_some_and(|n| n.current))
            .map(|p| p.as_str())
    }

    // Siblings

    pub fn prev_sibling(&self, id: &str, parent: Option<&str>) -> Result<Option<SiblingLookup>> {
        self.sibling(id, parent, -1)
    }

    pub fn next_sibling(&self, id: &str, parent: Option<&str>) -> Result<Option<SiblingLookup>> {
        self.sibling(id, parent, 1)
    }

    /// Resolve which parent's list to walk, then step one place in it.
    ///
    /// Returns `None` for a node without parents.
    fn sibling(&self, id: &str, parent: Option<&str>, delta: isize) -> Result<Option<SiblingLookup>> {
        let node = self.node(id)?;
        let resolution = match parent {
            Some(p) => SiblingResolution::Explicit(p.to_string()),
            None => match self.current_parent(id) {
                Some(p) => SiblingResolution::Current(p.to_string()),
                None => match node.parents.first() {
                    Some(p) => SiblingResolution::FirstAvailable(p.clone()),
                    None => return Ok(None),
                },
            },
        };

        let siblings = &self.node(resolution.parent_id())?.children;
        let idx = siblings
            .iter()
            .position(|c| c == id)
            .ok_or_else(|| Error::NotInList(id.to_string()))?;
        let sibling = idx
            .checked_add_signed(delta)
            .and_then(|i| siblings.get(i))
            .cloned();
        Ok(Some(SiblingLookup {
            sibling,
            resolution,
        }))
    }

    // Search

    /// Direct child of `parent` with the given id.
    pub fn find_child(&self, parent: &str, id: &str) -> Option<&TaskNode> {
        let node = self.nodes.get(parent)?;
        if node.children.iter().any(|c| c == id) {
            self.nodes.get(id)
        } else {
            None
        }
    }

    /// Any descendant of `root` with the given id.
    pub fn find_descendant(&self, root: &str, id: &str) -> Option<&TaskNode> {
        let mut visited = HashSet::new();
        let mut stack: Vec<&str> = self.nodes.get(root)?.children.iter().map(|c| c.as_str()).rev().collect();

        while let Some(current) = stack.pop() {
            if current == id {
                return self.nodes.get(id);
            }
            if !visited.insert(current) {
                continue;
            }
            if let Some(node) = self.nodes.get(current) {
                stack.extend(node.children.iter().rev().map(|c| c.as_str()));
            }
        }
        None
    }

    /// Follow first parents up to the top of the hierarchy.
    pub fn root_of(&self, id: &str) -> Result<String> {
        let mut current = self.node(id)?;
        let mut seen = HashSet::new();
        while let Some(parent) = current.parents.first() {
            if !seen.insert(parent.clone()) {
                break;
            }
            current = self.node(parent)?;
        }
        Ok(current.id().to_string())
    }

    /// `root` and every node reachable from it, each once, in pre-order.
    pub fn descendants(&self, root: &str) -> Result<Vec<String>> {
        self.node(root)?;
        let mut order = Vec::new();
        let mut visited = HashSet::new();
        let mut stack = vec![root.to_string()];

        while let Some(current) = stack.pop() {
            if !visited.insert(current.clone()) {
                continue;
            }
            if let Some(node) = self.nodes.get(&current) {
                stack.extend(node.children.iter().rev().cloned());
            }
            order.push(current);
        }
        Ok(order)
    }

    /// Indented listing of `id` and everything below it.
    pub fn render(&self, id: &str) -> Result<String> {
        let mut lines = Vec::new();
        self.render_into(id, 0, &mut lines)?;
        Ok(lines.join("\n"))
    }

    /// Listing of the children of `id` without the node itself.
    pub fn render_children(&self, id: &str) -> Result<String> {
        let mut lines = Vec::new();
        for child in &self.node(id)?.children {
            self.render_into(child, 0, &mut lines)?;
        }
        Ok(lines.join("\n"))
    }

    fn render_into(&self, id: &str, level: usize, lines: &mut Vec<String>) -> Result<()> {
        let node = self.node(id)?;
        lines.push(node.render_line(level));
        for child in &node.children {
            self.render_into(child, level + 1, lines)?;
        }
        Ok(())
    }

    // Snapshots

    /// Snapshot a node together with its place among each parent's children.
    pub fn snapshot(&self, id: &str) -> Result<TaskSnapshot> {
        let mut snapshot = self.node(id)?.snapshot();
        snapshot.positions = self.sibling_positions(id)?;
        Ok(snapshot)
    }

    /// Each parent of `id` with the sibling that follows `id` in it.
    pub fn sibling_positions(&self, id: &str) -> Result<Vec<(String, Option<String>)>> {
        let node = self.node(id)?;
        Ok(node
            .parents
            .iter()
            .map(|parent| {
                let following = self.nodes.get(parent).and_then(|p| {
                    p.children
                        .iter()
                        .position(|c| c == id)
                        .and_then(|i| p.children.get(i + 1))
                        .cloned()
                });
                (parent.clone(), following)
            })
            .collect())
    }

    /// Put a node back into the state captured by `snapshot`.
    ///
    /// Edges are changed through the normal edge operations so both sides
    /// stay in sync; the node's own parent and child order is restored too.
    /// Every edge change is checked first, so an error leaves the node as it was.
    pub fn restore_snapshot(&mut self, snapshot: &TaskSnapshot) -> Result<()> {
        let id = snapshot.id.as_str();
        let current = self.node(id)?;
        let stale_parents: Vec<String> = current
            .parents
            .iter()
            .filter(|p| !snapshot.parents.contains(p))
            .cloned()
            .collect();
        let stale_children: Vec<String> = current
            .children
            .iter()
            .filter(|c| !snapshot.children.contains(c))
            .cloned()
            .collect();
        let missing_parents: Vec<String> = snapshot
            .parents
            .iter()
            .filter(|p| !current.parents.contains(p))
            .cloned()
            .collect();
        let missing_children: Vec<String> = snapshot
            .children
            .iter()
            .filter(|c| !current.children.contains(c))
            .cloned()
            .collect();

        // Check every edge change up front so a failure leaves the node as it was
        for parent in &stale_parents {
            if !self.node(parent)?.children.iter().any(|c| c == id) {
                return Err(Error::EdgeNotFound {
                    parent: parent.clone(),
                    child: id.to_string(),
                });
            }
        }
        for child in &stale_children {
            if !self.node(child)?.parents.iter().any(|p| p == id) {
                return Err(Error::EdgeNotFound {
                    parent: id.to_string(),
                    child: child.clone(),
                });
            }
        }
        for parent in &missing_parents {
            if parent == id || self.node(parent)?.children.iter().any(|c| c == id) {
                return Err(Error::InvalidInput(format!(
                    "Cannot restore {} under {}",
                    id, parent
                )));
            }
        }
        for child in &missing_children {
            if child == id || self.node(child)?.parents.iter().any(|p| p == id) {
                return Err(Error::InvalidInput(format!(
                    "Cannot restore {} under {}",
                    child, id
                )));
            }
        }
        for child in &snapshot.children {
            for parent in &snapshot.parents {
                if parent == child || self.find_descendant(child, parent).is_some() {
                    return Err(Error::CycleDetected {
                        parent: parent.clone(),
                        child: id.to_string(),
                    });
                }
            }
        }

        for parent in &stale_parents {
            self.remove_child(parent, id)?;
        }
        for child in &stale_children {
            self.remove_child(id, child)?;
        }
        for parent in &missing_parents {
            self.add_child(parent, id)?;
            let following = snapshot
                .positions
                .iter()
                .find(|(p, _)| p == parent)
                .and_then(|(_, following)| following.as_deref())
                .filter(|f| self.nodes.get(parent).is_some_and(|p| p.children.iter().any(|c| c == f)));
            if following.is_some() {
                self.move_before(parent, id, following)?;
            }
        }
        for child in &missing_children {
            self.add_child(id, child)?;
        }

        let node = self.node_mut(id)?;
        node.parents = snapshot.parents.clone();
        node.children = snapshot.children.clone();
        node.apply_fields(snapshot);
        Ok(())
    }
}

/// Move `cursor` by `delta` within `items`.
fn step_cursor(items: &[String], cursor: &mut usize, delta: isize) -> Option<String> {
    let next = if delta == 0 {
        Some(0)
    } else {
        cursor.checked_add_signed(delta)
    };
    match next {
        Some(i) if i < items.len() => {
            *cursor = i;
            Some(items[i].clone())
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Graph with root R and children A, B, C in that order.
    fn sample_graph() -> (TaskGraph, String, Vec<String>) {
        let mut graph = TaskGraph::new();
        let root = graph.create("R");
        let kids: Vec<String> = ["A", "B", "C"]
            .iter()
            .map(|name| {
                let id = graph.create(*name);
                graph.add_child(&root, &id).unwrap();
                id
            })
            .collect();
        (graph, root, kids)
    }

    fn assert_symmetric(graph: &TaskGraph) {
        for node in graph.nodes() {
            for child in node.children() {
                assert!(graph.node(child).unwrap().parents().contains(&node.id().to_string()));
            }
            for parent in node.parents() {
                assert!(graph.node(parent).unwrap().children().contains(&node.id().to_string()));
            }
        }
    }

    #[test]
    fn test_add_child_is_symmetric() {
        let (graph, root, kids) = sample_graph();
        assert_eq!(graph.node(&root).unwrap().children(), kids.as_slice());
        for kid in &kids {
            assert_eq!(graph.node(kid).unwrap().parents(), &[root.clone()]);
        }
        assert_symmetric(&graph);
    }

    #[test]
    fn test_add_child_rejects_self_and_duplicate() {
        let (mut graph, root, kids) = sample_graph();
        assert!(matches!(graph.add_child(&root, &root), Err(Error::InvalidInput(_))));
        assert!(matches!(graph.add_child(&root, &kids[0]), Err(Error::InvalidInput(_))));
        assert!(matches!(graph.add_child(&root, "missing"), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_add_child_rejects_cycle() {
        let (mut graph, root, kids) = sample_graph();
        let grandchild = graph.create("G");
        graph.add_child(&kids[0], &grandchild).unwrap();

        let err = graph.add_child(&grandchild, &root).unwrap_err();
        assert!(matches!(err, Error::CycleDetected { .. }));
        assert!(graph.node(&root).unwrap().parents().is_empty());
        assert_symmetric(&graph);
    }

    #[test]
    fn test_multiple_parents() {
        let (mut graph, _root, kids) = sample_graph();
        let shared = graph.create("shared");
        graph.add_child(&kids[0], &shared).unwrap();
        graph.add_parent(&shared, &kids[1]).unwrap();

        assert_eq!(graph.node(&shared).unwrap().parents(), &[kids[0].clone(), kids[1].clone()]);
        assert_symmetric(&graph);
    }

    #[test]
    fn test_remove_parent_and_child() {
        let (mut graph, root, kids) = sample_graph();
        graph.remove_parent(&kids[0], &root).unwrap();
        graph.remove_child(&root, &kids[1]).unwrap();

        assert_eq!(graph.node(&root).unwrap().children(), &[kids[2].clone()]);
        assert!(!graph.node(&kids[0]).unwrap().has_parents());
        assert_symmetric(&graph);

        let err = graph.remove_child(&root, &kids[0]).unwrap_err();
        assert!(matches!(err, Error::EdgeNotFound { .. }));
    }

    #[test]
    fn test_remove_detects_desynced_edge() {
        let (mut graph, root, kids) = sample_graph();
        graph.node_mut(&root).unwrap().children.retain(|c| c != &kids[0]);

        let err = graph.remove_parent(&kids[0], &root).unwrap_err();
        assert!(matches!(err, Error::EdgeNotFound { .. }));
        // Nothing was changed on the surviving side
        assert_eq!(graph.node(&kids[0]).unwrap().parents(), &[root]);
    }

    #[test]
    fn test_detach_reparents_orphans_only() {
        let (mut graph, root, kids) = sample_graph();
        let orphan = graph.create("orphan");
        let shared = graph.create("shared");
        graph.add_child(&kids[0], &orphan).unwrap();
        graph.add_child(&kids[0], &shared).unwrap();
        graph.add_child(&kids[1], &shared).unwrap();

        let removal = graph.detach(&kids[0], Some(&root)).unwrap();

        assert_eq!(removal.former_parents, vec![root.clone()]);
        assert_eq!(removal.former_children, vec![orphan.clone(), shared.clone()]);
        assert_eq!(removal.reparented, vec![orphan.clone()]);
        assert_eq!(graph.node(&orphan).unwrap().parents(), &[root.clone()]);
        assert_eq!(graph.node(&shared).unwrap().parents(), &[kids[1].clone()]);
        assert!(graph.contains(&kids[0]));
        assert_symmetric(&graph);
    }

    #[test]
    fn test_detach_without_new_parent_leaves_orphans() {
        let (mut graph, _root, kids) = sample_graph();
        let orphan = graph.create("orphan");
        graph.add_child(&kids[2], &orphan).unwrap();

        let removal = graph.detach(&kids[2], None).unwrap();
        assert!(removal.reparented.is_empty());
        assert!(!graph.node(&orphan).unwrap().has_parents());
    }

    #[test]
    fn test_remove_rejects_descendant_as_new_parent() {
        let (mut graph, root, kids) = sample_graph();
        let child = graph.create("child");
        let grandchild = graph.create("grandchild");
        graph.add_child(&kids[0], &child).unwrap();
        graph.add_child(&child, &grandchild).unwrap();

        for target in [&kids[0], &child, &grandchild] {
            let err = graph.remove(&kids[0], Some(target)).unwrap_err();
            assert!(matches!(err, Error::InvalidInput(_)));
        }

        // Nothing was detached
        assert_eq!(graph.node(&kids[0]).unwrap().parents(), &[root.clone()]);
        assert_eq!(graph.node(&kids[0]).unwrap().children(), &[child.clone()]);
        assert_eq!(graph.node(&root).unwrap().children(), kids.as_slice());
        assert_symmetric(&graph);

        // A sibling can still adopt
        let removal = graph.remove(&kids[0], Some(&kids[1])).unwrap();
        assert_eq!(removal.reparented, vec![child.clone()]);
        assert_eq!(graph.node(&child).unwrap().parents(), &[kids[1].clone()]);
    }

    #[test]
    fn test_move_before() {
        let (mut graph, root, kids) = sample_graph();
        graph.move_before(&root, &kids[2], Some(&kids[0])).unwrap();
        assert_eq!(
            graph.node(&root).unwrap().children(),
            &[kids[2].clone(), kids[0].clone(), kids[1].clone()]
        );

        graph.move_before(&root, &kids[2], None).unwrap();
        assert_eq!(graph.node(&root).unwrap().children(), kids.as_slice());

        assert!(matches!(
            graph.move_before(&root, "nope", None),
            Err(Error::NotInList(_))
        ));
        assert!(matches!(
            graph.move_before(&root, &kids[0], Some("nope")),
            Err(Error::NotInList(_))
        ));
    }

    #[test]
    fn test_iter_child_cursor() {
        let (mut graph, root, kids) = sample_graph();
        assert_eq!(graph.first_child(&root).unwrap(), Some(kids[0].clone()));
        assert_eq!(graph.next_child(&root).unwrap(), Some(kids[1].clone()));
        assert_eq!(graph.next_child(&root).unwrap(), Some(kids[2].clone()));
        assert_eq!(graph.next_child(&root).unwrap(), None);
        // Cursor was left on the last child
        assert_eq!(graph.prev_child(&root).unwrap(), Some(kids[1].clone()));
        assert_eq!(graph.iter_child(&root, 5).unwrap(), None);
        assert_eq!(graph.iter_child(&root, -1).unwrap(), Some(kids[0].clone()));
        assert_eq!(graph.prev_child(&root).unwrap(), None);
    }

    #[test]
    fn test_iter_on_empty_list() {
        let mut graph = TaskGraph::new();
        let lonely = graph.create("lonely");
        assert_eq!(graph.first_child(&lonely).unwrap(), None);
        assert_eq!(graph.first_parent(&lonely).unwrap(), None);
        assert_eq!(graph.next_parent(&lonely).unwrap(), None);
    }

    #[test]
    fn test_sibling_resolution() {
        let (mut graph, root, kids) = sample_graph();
        let other = graph.create("other");
        graph.add_child(&other, &kids[1]).unwrap();

        let lookup = graph.next_sibling(&kids[1], None).unwrap().unwrap();
        assert_eq!(lookup.sibling, Some(kids[2].clone()));
        assert_eq!(lookup.resolution, SiblingResolution::FirstAvailable(root.clone()));

        graph.node_mut(&other).unwrap().current = true;
        let lookup = graph.prev_sibling(&kids[1], None).unwrap().unwrap();
        assert_eq!(lookup.sibling, None);
        assert_eq!(lookup.resolution, SiblingResolution::Current(other.clone()));

        let lookup = graph.prev_sibling(&kids[1], Some(&root)).unwrap().unwrap();
        assert_eq!(lookup.sibling, Some(kids[0].clone()));
        assert_eq!(lookup.resolution, SiblingResolution::Explicit(root.clone()));

        assert!(graph.next_sibling(&root, None).unwrap().is_none());
        assert!(matches!(
            graph.next_sibling(&kids[0], Some(&other)),
            Err(Error::NotInList(_))
        ));
    }

    #[test]
    fn test_find_child_and_descendant() {
        let (mut graph, root, kids) = sample_graph();
        let deep = graph.create("deep");
        graph.add_child(&kids[1], &deep).unwrap();

        assert!(graph.find_child(&root, &kids[1]).is_some());
        assert!(graph.find_child(&root, &deep).is_none());
        assert_eq!(graph.find_descendant(&root, &deep).unwrap().name, "deep");
        assert!(graph.find_descendant(&kids[0], &deep).is_none());
    }

    #[test]
    fn test_root_of_and_descendants() {
        let (mut graph, root, kids) = sample_graph();
        let deep = graph.create("deep");
        graph.add_child(&kids[0], &deep).unwrap();
        graph.add_child(&kids[1], &deep).unwrap();

        assert_eq!(graph.root_of(&deep).unwrap(), root);
        let all = graph.descendants(&root).unwrap();
        assert_eq!(all, vec![root.clone(), kids[0].clone(), deep.clone(), kids[1].clone(), kids[2].clone()]);
    }

    #[test]
    fn test_render_hierarchy() {
        let (mut graph, root, kids) = sample_graph();
        graph.node_mut(&kids[0]).unwrap().state = crate::models::TaskState::InProgress;
        let rendered = graph.render(&root).unwrap();
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], " [ ] R (3 sub-tasks)");
        assert_eq!(lines[1], "    [\u{27a0}] A (0 sub-tasks)");

        let children = graph.render_children(&root).unwrap();
        assert!(children.starts_with(" [\u{27a0}] A"));
    }

    #[test]
    fn test_restore_snapshot_restores_edges() {
        let (mut graph, root, kids) = sample_graph();
        let other = graph.create("other");
        let before = graph.snapshot(&kids[1]).unwrap();

        graph.node_mut(&kids[1]).unwrap().name = "renamed".to_string();
        graph.remove_child(&root, &kids[1]).unwrap();
        graph.add_child(&other, &kids[1]).unwrap();

        graph.restore_snapshot(&before).unwrap();
        assert_eq!(graph.snapshot(&kids[1]).unwrap(), before);
        assert!(graph.node(&other).unwrap().children().is_empty());
        assert_symmetric(&graph);
    }

    #[test]
    fn test_restore_snapshot_keeps_sibling_position() {
        let (mut graph, root, kids) = sample_graph();
        let before = graph.snapshot(&kids[0]).unwrap();
        assert_eq!(before.positions, vec![(root.clone(), Some(kids[1].clone()))]);

        graph.remove_child(&root, &kids[0]).unwrap();
        graph.restore_snapshot(&before).unwrap();
        assert_eq!(graph.node(&root).unwrap().children(), kids.as_slice());
    }

    #[test]
    fn test_failed_restore_leaves_node_untouched() {
        let (mut graph, root, kids) = sample_graph();
        let below = graph.create("below");
        graph.add_child(&kids[1], &below).unwrap();
        let before = graph.snapshot(&kids[1]).unwrap();

        // Root now hangs below B's child, so putting B back under root loops
        graph.remove_child(&root, &kids[1]).unwrap();
        graph.add_child(&below, &root).unwrap();
        graph.node_mut(&kids[1]).unwrap().name = "renamed".to_string();

        let err = graph.restore_snapshot(&before).unwrap_err();
        assert!(matches!(err, Error::CycleDetected { .. }));
        assert_eq!(graph.node(&kids[1]).unwrap().name, "renamed");
        assert!(!graph.node(&kids[1]).unwrap().has_parents());
        assert_symmetric(&graph);
    }
}
