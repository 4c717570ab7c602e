//! Configuration for pim.
//!
//! Settings live in `config.kdl` files at two levels:
//!
//! - System: `~/.config/pim/config.kdl` (or `$PIM_CONFIG_DIR/config.kdl`)
//! - Data dir: `~/.local/share/pim/config.kdl` (or `$PIM_DATA_DIR/config.kdl`)
//!
//! Contains:
//! - `backend` - "sqlite" or "yaml"
//! - `database` - SQLite database file
//! - `yaml-file` - YAML store file
//! - `log-level` - tracing filter directive
//! - `output-format` - "json" or "human"
//!
//! ## Precedence
//!
//! CLI flag > environment variable > data-dir config > system config > defaults
//!
//! Use the [`resolver`] module for precedence resolution.

pub mod resolver;
pub mod schema;

pub use resolver::{
    ConfigOverrides, Resolved, ResolvedConfig, ValueSource, read_system_config, resolve_config,
    system_config_dir,
};
pub use schema::{CONFIG_FILE_NAME, OutputFormat, PimConfig};
