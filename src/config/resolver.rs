//! Precedence resolution for configuration.
//!
//! ## Precedence (highest to lowest)
//!
//! 1. CLI flags (passed at runtime)
//! 2. Environment variables (`PIM_BACKEND`, `PIM_DATABASE`, ...)
//! 3. Data-dir config.kdl (`~/.local/share/pim/config.kdl`)
//! 4. System config.kdl (`~/.config/pim/config.kdl`)
//! 5. Built-in defaults
//!
//! The data directory itself comes from `--data-dir`, then `PIM_DATA_DIR`,
//! then the platform data directory.

use std::path::{Path, PathBuf};

use crate::config::schema::{CONFIG_FILE_NAME, OutputFormat, PimConfig};
use crate::storage::BackendType;
use crate::{Error, Result};

pub const DATA_DIR_ENV: &str = "PIM_DATA_DIR";
pub const CONFIG_DIR_ENV: &str = "PIM_CONFIG_DIR";
pub const BACKEND_ENV: &str = "PIM_BACKEND";
pub const DATABASE_ENV: &str = "PIM_DATABASE";
pub const YAML_FILE_ENV: &str = "PIM_YAML_FILE";
pub const LOG_ENV: &str = "PIM_LOG";
pub const OUTPUT_FORMAT_ENV: &str = "PIM_OUTPUT_FORMAT";

pub const DEFAULT_DATABASE_NAME: &str = "pim.db";
pub const DEFAULT_YAML_NAME: &str = "pim.yaml";
pub const DEFAULT_LOG_LEVEL: &str = "off";

/// Tracks where a resolved value came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueSource {
    /// Value from environment variable
    EnvVar(String),
    /// Value from the data-dir config.kdl
    DataDir,
    /// Value from the system config.kdl
    System,
    /// Value from CLI flag
    CliFlag,
    /// Built-in default value
    Default,
}

impl std::fmt::Display for ValueSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValueSource::EnvVar(name) => write!(f, "env:{}", name),
            ValueSource::DataDir => write!(f, "data-dir"),
            ValueSource::System => write!(f, "system"),
            ValueSource::CliFlag => write!(f, "cli"),
            ValueSource::Default => write!(f, "default"),
        }
    }
}

/// A resolved value with its source.
#[derive(Debug, Clone)]
pub struct Resolved<T> {
    pub value: T,
    pub source: ValueSource,
}

impl<T> Resolved<T> {
    pub fn new(value: T, source: ValueSource) -> Self {
        Self { value, source }
    }
}

/// Fully resolved configuration with source tracking.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub data_dir: Resolved<PathBuf>,
    pub backend: Resolved<BackendType>,
    pub database: Resolved<PathBuf>,
    pub yaml_file: Resolved<PathBuf>,
    pub log_level: Resolved<String>,
    pub output_format: Resolved<OutputFormat>,
}

impl ResolvedConfig {
    pub fn data_dir(&self) -> &Path {
        &self.data_dir.value
    }

    pub fn backend(&self) -> BackendType {
        self.backend.value
    }

    pub fn database(&self) -> &Path {
        &self.database.value
    }

    pub fn yaml_file(&self) -> &Path {
        &self.yaml_file.value
    }

    pub fn log_level(&self) -> &str {
        &self.log_level.value
    }

    pub fn output_format(&self) -> OutputFormat {
        self.output_format.value
    }

    /// Path of the data-dir config file.
    pub fn config_path(&self) -> PathBuf {
        self.data_dir.value.join(CONFIG_FILE_NAME)
    }
}

/// CLI overrides for configuration resolution.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub data_dir: Option<PathBuf>,
    pub backend: Option<BackendType>,
    pub database: Option<PathBuf>,
    pub yaml_file: Option<PathBuf>,
    pub log_level: Option<String>,
    pub output_format: Option<OutputFormat>,
}

impl ConfigOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }

    pub fn with_backend(mut self, backend: BackendType) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn with_database(mut self, path: impl Into<PathBuf>) -> Self {
        self.database = Some(path.into());
        self
    }

    pub fn with_yaml_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.yaml_file = Some(path.into());
        self
    }

    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = Some(level.into());
        self
    }

    pub fn with_output_format(mut self, format: OutputFormat) -> Self {
        self.output_format = Some(format);
        self
    }
}

/// Directory holding the system config.kdl.
///
/// `PIM_CONFIG_DIR` overrides the platform config directory.
pub fn system_config_dir() -> Option<PathBuf> {
    if let Some(dir) = env_value(CONFIG_DIR_ENV) {
        return Some(PathBuf::from(dir));
    }
    dirs::config_dir().map(|d| d.join("pim"))
}

/// Read the system config.kdl, or an empty config if there is none.
pub fn read_system_config() -> Result<PimConfig> {
    match system_config_dir() {
        Some(dir) => PimConfig::load_from_file(&dir.join(CONFIG_FILE_NAME)),
        None => Ok(PimConfig::new()),
    }
}

fn default_data_dir() -> Result<PathBuf> {
    dirs::data_dir()
        .map(|d| d.join("pim"))
        .ok_or_else(|| Error::Config("Could not determine data directory".to_string()))
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

/// Relative paths in config files are relative to the data directory.
fn anchor(path: &Path, data_dir: &Path) -> PathBuf {
    if path.is_relative() {
        data_dir.join(path)
    } else {
        path.to_path_buf()
    }
}

/// Resolve configuration with full precedence chain.
pub fn resolve_config(overrides: &ConfigOverrides) -> Result<ResolvedConfig> {
    let data_dir = if let Some(ref dir) = overrides.data_dir {
        Resolved::new(dir.clone(), ValueSource::CliFlag)
    } else if let Some(dir) = env_value(DATA_DIR_ENV) {
        Resolved::new(
            PathBuf::from(dir),
            ValueSource::EnvVar(DATA_DIR_ENV.to_string()),
        )
    } else {
        Resolved::new(default_data_dir()?, ValueSource::Default)
    };
    let dir = data_dir.value.clone();

    let system_config = read_system_config()?;
    let data_config = PimConfig::load_from_file(&dir.join(CONFIG_FILE_NAME))?;

    // Resolve backend
    let backend = if let Some(backend) = overrides.backend {
        Resolved::new(backend, ValueSource::CliFlag)
    } else if let Some(raw) = env_value(BACKEND_ENV) {
        let backend = BackendType::from_str(&raw).ok_or_else(|| {
            Error::Config(format!("{}: unknown backend '{}'", BACKEND_ENV, raw))
        })?;
        Resolved::new(backend, ValueSource::EnvVar(BACKEND_ENV.to_string()))
    } else if let Some(backend) = data_config.backend {
        Resolved::new(backend, ValueSource::DataDir)
    } else if let Some(backend) = system_config.backend {
        Resolved::new(backend, ValueSource::System)
    } else {
        Resolved::new(BackendType::default(), ValueSource::Default)
    };

    // Resolve database
    let database = if let Some(ref path) = overrides.database {
        Resolved::new(path.clone(), ValueSource::CliFlag)
    } else if let Some(path) = env_value(DATABASE_ENV) {
        Resolved::new(
            PathBuf::from(path),
            ValueSource::EnvVar(DATABASE_ENV.to_string()),
        )
    } else if let Some(ref path) = data_config.database {
        Resolved::new(anchor(path, &dir), ValueSource::DataDir)
    } else if let Some(ref path) = system_config.database {
        Resolved::new(anchor(path, &dir), ValueSource::System)
    } else {
        Resolved::new(dir.join(DEFAULT_DATABASE_NAME), ValueSource::Default)
    };

    // Resolve yaml_file
    let yaml_file = if let Some(ref path) = overrides.yaml_file {
        Resolved::new(path.clone(), ValueSource::CliFlag)
    } else if let Some(path) = env_value(YAML_FILE_ENV) {
        Resolved::new(
            PathBuf::from(path),
            ValueSource::EnvVar(YAML_FILE_ENV.to_string()),
        )
    } else if let Some(ref path) = data_config.yaml_file {
        Resolved::new(anchor(path, &dir), ValueSource::DataDir)
    } else if let Some(ref path) = system_config.yaml_file {
        Resolved::new(anchor(path, &dir), ValueSource::System)
    } else {
        Resolved::new(dir.join(DEFAULT_YAML_NAME), ValueSource::Default)
    };

    // Resolve log_level
    let log_level = if let Some(ref level) = overrides.log_level {
        Resolved::new(level.clone(), ValueSource::CliFlag)
    } else if let Some(level) = env_value(LOG_ENV) {
        Resolved::new(level, ValueSource::EnvVar(LOG_ENV.to_string()))
    } else if let Some(ref level) = data_config.log_level {
        Resolved::new(level.clone(), ValueSource::DataDir)
    } else if let Some(ref level) = system_config.log_level {
        Resolved::new(level.clone(), ValueSource::System)
    } else {
        Resolved::new(DEFAULT_LOG_LEVEL.to_string(), ValueSource::Default)
    };

    // Resolve output_format
    let output_format = if let Some(format) = overrides.output_format {
        Resolved::new(format, ValueSource::CliFlag)
    } else if let Some(format) = env_value(OUTPUT_FORMAT_ENV).and_then(|v| OutputFormat::parse(&v)) {
        Resolved::new(format, ValueSource::EnvVar(OUTPUT_FORMAT_ENV.to_string()))
    } else if let Some(format) = data_config.output_format {
        Resolved::new(format, ValueSource::DataDir)
    } else if let Some(format) = system_config.output_format {
        Resolved::new(format, ValueSource::System)
    } else {
        Resolved::new(OutputFormat::default(), ValueSource::Default)
    };

    Ok(ResolvedConfig {
        data_dir,
        backend,
        database,
        yaml_file,
        log_level,
        output_format,
    })
}
