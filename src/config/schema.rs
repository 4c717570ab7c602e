//! KDL schema for config.kdl.
//!
//! This module provides:
//! - The [`PimConfig`] struct and the output format preference
//! - Conversion to and from KDL documents
//! - Validation and merging
//! - Reading and writing config files

use std::path::{Path, PathBuf};

use kdl::{KdlDocument, KdlEntry, KdlNode, KdlValue};
use serde::{Deserialize, Serialize};

use crate::storage::BackendType;
use crate::{Error, Result};

/// Config file name inside a config or data directory.
pub const CONFIG_FILE_NAME: &str = "config.kdl";

/// Output format preference for CLI commands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// JSON output (default, machine-readable)
    #[default]
    Json,
    /// Human-readable output
    Human,
}

impl OutputFormat {
    /// Parse from string, case-insensitive.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "json" => Some(OutputFormat::Json),
            "human" => Some(OutputFormat::Human),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Human => "human",
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Settings stored in config.kdl.
///
/// # KDL Schema
///
/// ```kdl
/// backend "sqlite"          // or "yaml"
/// database "/path/pim.db"
/// yaml-file "/path/pim.yaml"
/// log-level "info"
/// output-format "human"     // or "json"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PimConfig {
    /// Storage backend
    pub backend: Option<BackendType>,

    /// SQLite database file
    pub database: Option<PathBuf>,

    /// YAML store file
    pub yaml_file: Option<PathBuf>,

    /// Log filter directive, e.g. "info" or "pim=debug"
    pub log_level: Option<String>,

    /// Default output format for CLI commands
    pub output_format: Option<OutputFormat>,
}

impl PimConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the config values.
    ///
    /// Returns an error message if any value is invalid.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if let Some(ref database) = self.database {
            if database.as_os_str().is_empty() {
                return Err("database must not be empty".to_string());
            }
        }
        if let Some(ref yaml_file) = self.yaml_file {
            if yaml_file.as_os_str().is_empty() {
                return Err("yaml-file must not be empty".to_string());
            }
        }
        if let Some(ref level) = self.log_level {
            if level.trim().is_empty() {
                return Err("log-level must not be empty".to_string());
            }
        }
        Ok(())
    }

    /// Parse config from a KDL document.
    ///
    /// Unknown nodes and values of the wrong type are ignored.
    pub fn from_kdl(doc: &KdlDocument) -> Self {
        let mut config = Self::new();

        if let Some(s) = first_string(doc, "backend") {
            config.backend = BackendType::from_str(s);
        }

        if let Some(s) = first_string(doc, "database") {
            config.database = Some(PathBuf::from(s));
        }

        if let Some(s) = first_string(doc, "yaml-file") {
            config.yaml_file = Some(PathBuf::from(s));
        }

        if let Some(s) = first_string(doc, "log-level") {
            config.log_level = Some(s.to_string());
        }

        if let Some(s) = first_string(doc, "output-format") {
            config.output_format = OutputFormat::parse(s);
        }

        config
    }

    /// Convert config to a KDL document.
    pub fn to_kdl(&self) -> KdlDocument {
        let mut doc = KdlDocument::new();

        if let Some(backend) = self.backend {
            push_string(&mut doc, "backend", backend.as_str());
        }
        if let Some(ref database) = self.database {
            push_string(&mut doc, "database", &database.display().to_string());
        }
        if let Some(ref yaml_file) = self.yaml_file {
            push_string(&mut doc, "yaml-file", &yaml_file.display().to_string());
        }
        if let Some(ref level) = self.log_level {
            push_string(&mut doc, "log-level", level);
        }
        if let Some(format) = self.output_format {
            push_string(&mut doc, "output-format", format.as_str());
        }

        doc
    }

    /// Merge another config into this one.
    /// Values from `other` override values in `self` if they are Some.
    pub fn merge(&mut self, other: &PimConfig) {
        if other.backend.is_some() {
            self.backend = other.backend;
        }
        if other.database.is_some() {
            self.database = other.database.clone();
        }
        if other.yaml_file.is_some() {
            self.yaml_file = other.yaml_file.clone();
        }
        if other.log_level.is_some() {
            self.log_level = other.log_level.clone();
        }
        if other.output_format.is_some() {
            self.output_format = other.output_format;
        }
    }

    /// Read a config file. A missing file yields an empty config.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let content = std::fs::read_to_string(path)?;
        let doc: KdlDocument = content
            .parse()
            .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))?;
        let config = Self::from_kdl(&doc);
        config
            .validate()
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        Ok(config)
    }

    /// Write this config to `path`, creating parent directories.
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        self.validate().map_err(Error::Config)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_kdl().to_string())?;
        Ok(())
    }
}

fn first_string<'a>(doc: &'a KdlDocument, name: &str) -> Option<&'a str> {
    doc.get(name)?.entries().first()?.value().as_string()
}

fn push_string(doc: &mut KdlDocument, name: &str, value: &str) {
    let mut node = KdlNode::new(name);
    node.push(KdlEntry::new(KdlValue::String(value.to_string())));
    doc.nodes_mut().push(node);
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_output_format_parse() {
        assert_eq!(OutputFormat::parse("JSON"), Some(OutputFormat::Json));
        assert_eq!(OutputFormat::parse("human"), Some(OutputFormat::Human));
        assert_eq!(OutputFormat::parse("xml"), None);
    }

    #[test]
    fn test_config_from_kdl_empty() {
        let doc = KdlDocument::new();
        assert_eq!(PimConfig::from_kdl(&doc), PimConfig::default());
    }

    #[test]
    fn test_config_from_kdl_full() {
        let kdl = r#"
            backend "yaml"
            database "/tmp/pim.db"
            yaml-file "/tmp/pim.yaml"
            log-level "debug"
            output-format "human"
        "#;
        let doc: KdlDocument = kdl.parse().unwrap();
        let config = PimConfig::from_kdl(&doc);

        assert_eq!(config.backend, Some(BackendType::Yaml));
        assert_eq!(config.database, Some(PathBuf::from("/tmp/pim.db")));
        assert_eq!(config.yaml_file, Some(PathBuf::from("/tmp/pim.yaml")));
        assert_eq!(config.log_level, Some("debug".to_string()));
        assert_eq!(config.output_format, Some(OutputFormat::Human));
    }

    #[test]
    fn test_config_ignores_unknown_values() {
        let kdl = r#"
            backend "postgres"
            output-format 3
            editor "vim"
        "#;
        let doc: KdlDocument = kdl.parse().unwrap();
        assert_eq!(PimConfig::from_kdl(&doc), PimConfig::default());
    }

    #[test]
    fn test_config_to_kdl_roundtrip() {
        let config = PimConfig {
            backend: Some(BackendType::Sqlite),
            database: Some(PathBuf::from("/data/pim.db")),
            yaml_file: None,
            log_level: Some("warn".to_string()),
            output_format: Some(OutputFormat::Json),
        };

        let parsed = PimConfig::from_kdl(&config.to_kdl());
        assert_eq!(config, parsed);
    }

    #[test]
    fn test_config_merge() {
        let mut base = PimConfig {
            backend: Some(BackendType::Sqlite),
            log_level: Some("info".to_string()),
            output_format: Some(OutputFormat::Json),
            ..Default::default()
        };
        let overlay = PimConfig {
            backend: Some(BackendType::Yaml),
            ..Default::default()
        };

        base.merge(&overlay);

        assert_eq!(base.backend, Some(BackendType::Yaml));
        assert_eq!(base.log_level, Some("info".to_string()));
        assert_eq!(base.output_format, Some(OutputFormat::Json));
    }

    #[test]
    fn test_validate_rejects_empty_paths() {
        let config = PimConfig {
            database: Some(PathBuf::new()),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_file_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE_NAME);

        assert_eq!(PimConfig::load_from_file(&path).unwrap(), PimConfig::default());

        let config = PimConfig {
            output_format: Some(OutputFormat::Human),
            ..Default::default()
        };
        config.write_to_file(&path).unwrap();
        assert_eq!(PimConfig::load_from_file(&path).unwrap(), config);
    }

    #[test]
    fn test_load_invalid_kdl_fails() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "backend \"sqlite").unwrap();
        assert!(matches!(PimConfig::load_from_file(&path), Err(Error::Config(_))));
    }
}
