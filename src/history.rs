//! Reversible graph mutations.
//!
//! Each mutation is wrapped in a [`Command`] that knows how to persist the
//! change and how to take it back. [`CommandHistory`] keeps the commands that
//! ran successfully so they can be undone newest first.

use std::fmt;

use tracing::{info, warn};

use crate::models::{Removal, TaskGraph, TaskSnapshot};
use crate::{Error, Result};

/// Lifecycle of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandState {
    Created,
    Executed,
    Failed,
}

impl fmt::Display for CommandState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandState::Created => write!(f, "created"),
            CommandState::Executed => write!(f, "executed"),
            CommandState::Failed => write!(f, "failed"),
        }
    }
}

/// A graph mutation that can be executed once and undone.
pub trait Command: fmt::Debug {
    fn exec(&mut self, graph: &mut TaskGraph) -> Result<()>;

    fn undo(&mut self, graph: &mut TaskGraph) -> Result<()>;

    /// Short human-readable label, used in logs.
    fn describe(&self) -> String;

    fn state(&self) -> CommandState;
}

/// Persists a node that was just created and linked into the graph.
#[derive(Debug)]
pub struct CreateTaskCmd {
    id: String,
    state: CommandState,
}

impl CreateTaskCmd {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            state: CommandState::Created,
        }
    }
}

impl Command for CreateTaskCmd {
    fn exec(&mut self, graph: &mut TaskGraph) -> Result<()> {
        let result = graph.save(&self.id, true);
        self.state = outcome(&result);
        result
    }

    fn undo(&mut self, graph: &mut TaskGraph) -> Result<()> {
        graph.remove(&self.id, None)?;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("create task {}", self.id)
    }

    fn state(&self) -> CommandState {
        self.state
    }
}

/// Removes a node, remembering enough to put it back where it was.
#[derive(Debug)]
pub struct DeleteTaskCmd {
    id: String,
    new_parent: Option<String>,
    /// Each former parent with the sibling that followed the node
    positions: Vec<(String, Option<String>)>,
    removal: Option<Removal>,
    state: CommandState,
}

impl DeleteTaskCmd {
    pub fn new(id: impl Into<String>, new_parent: Option<String>) -> Self {
        Self {
            id: id.into(),
            new_parent,
            positions: Vec::new(),
            removal: None,
            state: CommandState::Created,
        }
    }

    /// What the delete detached, once executed.
    pub fn removal(&self) -> Option<&Removal> {
        self.removal.as_ref()
    }

    fn record_positions(&mut self, graph: &TaskGraph) -> Result<()> {
        self.positions = graph.sibling_positions(&self.id)?;
        Ok(())
    }

    fn run(&mut self, graph: &mut TaskGraph) -> Result<()> {
        self.record_positions(graph)?;
        let removal = graph.remove(&self.id, self.new_parent.as_deref())?;
        for child in &removal.reparented {
            graph.save(child, false)?;
        }
        self.removal = Some(removal);
        Ok(())
    }
}

impl Command for DeleteTaskCmd {
    fn exec(&mut self, graph: &mut TaskGraph) -> Result<()> {
        let result = self.run(graph);
        self.state = outcome(&result);
        result
    }

    fn undo(&mut self, graph: &mut TaskGraph) -> Result<()> {
        let removal = self
            .removal
            .take()
            .ok_or_else(|| Error::Other(format!("delete of {} was never executed", self.id)))?;

        if let Some(new_parent) = &self.new_parent {
            for child in &removal.reparented {
                graph.remove_child(new_parent, child)?;
            }
        }
        for (parent, following) in &self.positions {
            graph.add_child(parent, &self.id)?;
            if let Some(target) = following {
                if graph.node(parent)?.children().contains(target) {
                    graph.move_before(parent, &self.id, Some(target))?;
                }
            }
        }
        for child in &removal.former_children {
            graph.add_child(&self.id, child)?;
        }
        graph.save(&self.id, true)
    }

    fn describe(&self) -> String {
        match &self.new_parent {
            Some(parent) => format!("delete task {} (children to {})", self.id, parent),
            None => format!("delete task {}", self.id),
        }
    }

    fn state(&self) -> CommandState {
        self.state
    }
}

/// Saves edits made to a node since its snapshot was taken.
#[derive(Debug)]
pub struct UpdateTaskCmd {
    snapshot: TaskSnapshot,
    state: CommandState,
}

impl UpdateTaskCmd {
    pub fn new(snapshot: TaskSnapshot) -> Self {
        Self {
            snapshot,
            state: CommandState::Created,
        }
    }

    pub fn id(&self) -> &str {
        &self.snapshot.id
    }

    /// The node as it was before the edit.
    pub fn before(&self) -> &TaskSnapshot {
        &self.snapshot
    }
}

impl Command for UpdateTaskCmd {
    fn exec(&mut self, graph: &mut TaskGraph) -> Result<()> {
        let result = graph.save(&self.snapshot.id, false);
        self.state = outcome(&result);
        result
    }

    fn undo(&mut self, graph: &mut TaskGraph) -> Result<()> {
        graph.restore_snapshot(&self.snapshot)?;
        graph.save(&self.snapshot.id, true)
    }

    fn describe(&self) -> String {
        format!("update task {}", self.snapshot.id)
    }

    fn state(&self) -> CommandState {
        self.state
    }
}

fn outcome(result: &Result<()>) -> CommandState {
    if result.is_ok() {
        CommandState::Executed
    } else {
        CommandState::Failed
    }
}

/// Stack of executed commands.
#[derive(Debug, Default)]
pub struct CommandHistory {
    done: Vec<Box<dyn Command>>,
}

impl CommandHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run a command, keeping it for undo only if it succeeded.
    pub fn execute(&mut self, graph: &mut TaskGraph, mut command: Box<dyn Command>) -> Result<()> {
        command.exec(graph)?;
        info!(command = %command.describe(), "executed");
        self.done.push(command);
        Ok(())
    }

    /// Undo the most recent command.
    ///
    /// A command whose undo fails stays on the stack so it can be retried.
    pub fn undo(&mut self, graph: &mut TaskGraph) -> Result<()> {
        let mut command = self.done.pop().ok_or(Error::UndoEmpty)?;
        if let Err(e) = command.undo(graph) {
            warn!(command = %command.describe(), error = %e, "undo failed");
            self.done.push(command);
            return Err(e);
        }
        info!(command = %command.describe(), "undone");
        Ok(())
    }

    /// Persist a node the caller already created and linked.
    pub fn create_task(&mut self, graph: &mut TaskGraph, id: &str) -> Result<()> {
        self.execute(graph, Box::new(CreateTaskCmd::new(id)))
    }

    /// Capture a node before the caller edits it.
    pub fn modify_task_begin(&self, graph: &TaskGraph, id: &str) -> Result<UpdateTaskCmd> {
        Ok(UpdateTaskCmd::new(graph.snapshot(id)?))
    }

    /// Save the edits made since [`modify_task_begin`](Self::modify_task_begin).
    pub fn modify_task_end(&mut self, graph: &mut TaskGraph, command: UpdateTaskCmd) -> Result<()> {
        self.execute(graph, Box::new(command))
    }

    pub fn delete_task(&mut self, graph: &mut TaskGraph, id: &str, new_parent: Option<&str>) -> Result<()> {
        self.execute(
            graph,
            Box::new(DeleteTaskCmd::new(id, new_parent.map(str::to_string))),
        )
    }

    pub fn len(&self) -> usize {
        self.done.len()
    }

    pub fn is_empty(&self) -> bool {
        self.done.is_empty()
    }
}
