//! CLI argument definitions for pim.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::{ConfigOverrides, OutputFormat};
use crate::storage::BackendType;

/// pim - a personal task manager whose tasks form a graph.
///
/// A task may sit under several parents. Start with `pim init`, then
/// `pim task create` and `pim tree`.
#[derive(Parser, Debug)]
#[command(name = "pim")]
#[command(author, version, about = "A personal task manager whose tasks form a graph", long_about = None)]
pub struct Cli {
    /// Output in human-readable format instead of JSON
    #[arg(short = 'H', long = "human", global = true)]
    pub human_readable: bool,

    /// Directory holding the database and data-dir config.kdl
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Storage backend (sqlite, yaml)
    #[arg(long, global = true, value_parser = parse_backend)]
    pub backend: Option<BackendType>,

    /// SQLite database file
    #[arg(long, global = true)]
    pub database: Option<PathBuf>,

    /// YAML store file
    #[arg(long, global = true)]
    pub yaml_file: Option<PathBuf>,

    /// Log filter, e.g. "debug" or "pim=trace" (written to stderr)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Overrides carried by global flags.
    pub fn overrides(&self) -> ConfigOverrides {
        let mut overrides = ConfigOverrides::new();
        if let Some(ref dir) = self.data_dir {
            overrides = overrides.with_data_dir(dir.clone());
        }
        if let Some(backend) = self.backend {
            overrides = overrides.with_backend(backend);
        }
        if let Some(ref path) = self.database {
            overrides = overrides.with_database(path.clone());
        }
        if let Some(ref path) = self.yaml_file {
            overrides = overrides.with_yaml_file(path.clone());
        }
        if let Some(ref level) = self.log_level {
            overrides = overrides.with_log_level(level.clone());
        }
        if self.human_readable {
            overrides = overrides.with_output_format(OutputFormat::Human);
        }
        overrides
    }
}

fn parse_backend(s: &str) -> Result<BackendType, String> {
    BackendType::from_str(s).ok_or_else(|| format!("unknown backend '{}' (expected sqlite or yaml)", s))
}

/// Top-level commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the data directory, config.kdl and an empty store
    Init,

    /// Task management commands
    Task {
        #[command(subcommand)]
        command: TaskCommands,
    },

    /// Tasks planned for today (tagged or by target start)
    Today {
        /// Restrict to children of this task
        #[arg(long)]
        parent: Option<String>,
    },

    /// Tasks planned for this week (tagged or by target start)
    Week {
        /// Restrict to children of this task
        #[arg(long)]
        parent: Option<String>,
    },

    /// Completed tasks
    Completed {
        /// Only tasks completed on this date (YYYY-MM-DD)
        #[arg(long)]
        on: Option<String>,

        /// Restrict to children of this task
        #[arg(long)]
        parent: Option<String>,
    },

    /// Tag usage counts
    Tags {
        /// Count tags on children of this task instead of top-level tasks
        #[arg(long)]
        parent: Option<String>,
    },

    /// Print the task hierarchy
    Tree {
        /// Task to start from (default: all top-level tasks)
        id: Option<String>,
    },

    /// Write every task to a YAML file
    Export {
        /// Output file
        file: PathBuf,
    },

    /// Configuration commands
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

/// Task subcommands
#[derive(Subcommand, Debug)]
pub enum TaskCommands {
    /// Create a new task
    Create {
        /// Task name
        name: String,

        /// Parent task ID (repeatable; default: top level)
        #[arg(short, long)]
        parent: Vec<String>,

        /// Tags for the task
        #[arg(short, long)]
        tag: Vec<String>,

        /// Estimate in minutes
        #[arg(short, long)]
        estimate: Option<i64>,

        /// Target start (YYYY-MM-DD or RFC 3339)
        #[arg(long)]
        target: Option<String>,

        /// Hyperlink URI attached to the whole name
        #[arg(long)]
        link: Vec<String>,

        /// Grant visibility to a user
        #[arg(long)]
        user: Vec<String>,
    },

    /// List tasks
    List {
        /// List children of this task (default: top level)
        #[arg(long)]
        parent: Option<String>,

        /// Only tasks carrying all of these tags
        #[arg(short, long)]
        tag: Vec<String>,

        /// Let today/thisweek match by target start as well as by tag
        #[arg(long)]
        dates: bool,
    },

    /// Show one task
    Show {
        /// Task ID (a unique prefix is enough)
        id: String,
    },

    /// Update a task (state: notStarted, inProgress, onHold, complete)
    Update {
        /// Task ID
        id: String,

        /// New name
        #[arg(long)]
        name: Option<String>,

        /// New state
        #[arg(long)]
        state: Option<String>,

        /// Add a tag
        #[arg(long)]
        tag: Vec<String>,

        /// Remove a tag
        #[arg(long)]
        untag: Vec<String>,

        /// New estimate in minutes
        #[arg(long)]
        estimate: Option<i64>,

        /// New target start (YYYY-MM-DD or RFC 3339)
        #[arg(long)]
        target: Option<String>,

        /// Add a parent
        #[arg(long)]
        add_parent: Vec<String>,

        /// Remove a parent
        #[arg(long)]
        remove_parent: Vec<String>,
    },

    /// Delete a task
    Delete {
        /// Task ID
        id: String,

        /// Adopt orphaned children into this task instead of the top level
        #[arg(long)]
        reparent: Option<String>,
    },
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show resolved settings and where each came from
    Show,

    /// Set a value in the data-dir config.kdl
    Set {
        /// Key (backend, database, yaml-file, log-level, output-format)
        key: String,

        /// Value
        value: String,
    },
}
