//! pim - a personal task manager whose tasks form a graph.
//!
//! Tasks may have several parents and several children. The library keeps the
//! graph in memory and reconciles it against a backing store on demand:
//! a SQLite database that stores every relation incrementally, or a single
//! YAML file that is rewritten as a whole.

pub mod cli;
pub mod commands;
pub mod config;
pub mod history;
pub mod logging;
pub mod models;
pub mod storage;


/// Library-level error type for pim operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Task not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Adding {child} under {parent} would create a cycle")]
    CycleDetected { parent: String, child: String },

    #[error("Edge not found between parent {parent} and child {child}")]
    EdgeNotFound { parent: String, child: String },

    #[error("Could not find task in parent or child list: {0}")]
    NotInList(String),

    #[error("Nothing to undo")]
    UndoEmpty,

    #[error("Task has no persistence configured: {0}")]
    NoPersistence(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("{0}")]
    Other(String),
}

impl From<kdl::KdlError> for Error {
    fn from(err: kdl::KdlError) -> Self {
        Error::Config(err.to_string())
    }
}

/// Result type alias for pim operations.
pub type Result<T> = std::result::Result<T, Error>;
