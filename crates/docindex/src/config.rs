//! Configuration handling.
//!
//! Loaded from `config.toml` in the platform config directory (or
//! `DOCINDEX_CONFIG_DIR`). Every field has a default, so an empty or
//! missing file is a valid configuration.

use directories::ProjectDirs;
use docindex_core::{Error, Result};
use docindex_engine::EngineConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Engine tuning
    #[serde(default)]
    pub engine: EngineSection,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Index definitions
    #[serde(default)]
    pub indexes: Vec<IndexSpec>,
}

/// Engine-related configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSection {
    /// Documents per lease during a rebuild
    #[serde(default = "default_rebuild_batch_size")]
    pub rebuild_batch_size: usize,

    /// Longest label kept, in characters
    #[serde(default = "default_max_label_length")]
    pub max_label_length: usize,

    /// Queued document events before producers wait
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,

    /// Capacity of the update broadcast
    #[serde(default = "default_update_buffer")]
    pub update_buffer: usize,
}

fn default_rebuild_batch_size() -> usize {
    256
}

fn default_max_label_length() -> usize {
    128
}

fn default_event_buffer() -> usize {
    1024
}

fn default_update_buffer() -> usize {
    256
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            rebuild_batch_size: default_rebuild_batch_size(),
            max_label_length: default_max_label_length(),
            event_buffer: default_event_buffer(),
            update_buffer: default_update_buffer(),
        }
    }
}

impl EngineSection {
    #[must_use]
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            rebuild_batch_size: self.rebuild_batch_size,
            max_label_length: self.max_label_length,
            update_buffer: self.update_buffer,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level or filter directive
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional)
    pub file: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

fn default_true() -> bool {
    true
}

/// One configured index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSpec {
    pub label: String,
    pub slug: String,

    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Document types this index applies to (empty = all)
    #[serde(default)]
    pub document_types: Vec<String>,

    /// Top-level template nodes
    #[serde(default)]
    pub nodes: Vec<NodeSpec>,
}

/// One configured template node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSpec {
    pub expression: String,

    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub link_documents: bool,

    #[serde(default)]
    pub children: Vec<NodeSpec>,
}

impl NodeSpec {
    /// This node and its descendants, parents first.
    pub fn walk(&self) -> Vec<&NodeSpec> {
        let mut out = vec![self];
        for child in &self.children {
            out.extend(child.walk());
        }
        out
    }
}

impl Config {
    /// Load from the default path, or defaults if no file exists.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load from `path`, falling back to the default path. A missing file
    /// at the default path yields defaults; a missing explicit file is an
    /// error.
    pub fn load_from(path: Option<PathBuf>) -> Result<Self> {
        let (path, explicit) = match path {
            Some(path) => (path, true),
            None => match Self::config_path() {
                Some(path) => (path, false),
                None => return Ok(Self::default()),
            },
        };

        if !path.exists() {
            if explicit {
                return Err(Error::Config(format!(
                    "config file {} does not exist",
                    path.display()
                )));
            }
            return Ok(Self::default());
        }
        Self::from_file(&path)
    }

    fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
        let config = Self::parse(&text)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        Ok(config)
    }

    /// Parse and validate TOML text.
    pub fn parse(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Structural checks that need no evaluator.
    pub fn validate(&self) -> Result<()> {
        if self.engine.rebuild_batch_size == 0 {
            return Err(Error::Config("engine.rebuild_batch_size must be at least 1".to_string()));
        }
        if self.engine.max_label_length == 0 {
            return Err(Error::Config("engine.max_label_length must be at least 1".to_string()));
        }

        let mut slugs = HashSet::new();
        for index in &self.indexes {
            if !slugs.insert(index.slug.as_str()) {
                return Err(Error::Config(format!("duplicate index slug `{}`", index.slug)));
            }
        }
        Ok(())
    }

    /// Default config file path.
    pub fn config_path() -> Option<PathBuf> {
        config_dir().map(|dir| dir.join("config.toml"))
    }

    /// An example configuration file.
    #[must_use]
    pub fn sample_toml() -> &'static str {
        r#"# docindex configuration

[engine]
# Documents processed per lease while rebuilding an index
rebuild_batch_size = 256
# Labels are truncated to this many characters
max_label_length = 128
# Queued document events before producers wait
event_buffer = 1024
update_buffer = 256

[logging]
level = "info"
# file = "/var/log/docindex.log"

# Documents by tag, then by year
[[indexes]]
label = "Tags"
slug = "tags"

[[indexes.nodes]]
expression = "doc.tag_list | lower"
link_documents = true

[[indexes.nodes.children]]
expression = "doc.date_added | date:'%Y'"

# Invoices by client
[[indexes]]
label = "Clients"
slug = "clients"
document_types = ["invoice"]

[[indexes.nodes]]
expression = "doc.metadata.client | default:'Unknown'"
link_documents = true
"#
    }
}

/// Get the config directory for docindex.
pub fn config_dir() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var("DOCINDEX_CONFIG_DIR") {
        return Some(PathBuf::from(dir));
    }

    ProjectDirs::from("", "", "docindex").map(|dirs| dirs.config_dir().to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.engine.rebuild_batch_size, 256);
        assert_eq!(config.engine.max_label_length, 128);
        assert_eq!(config.engine.event_buffer, 1024);
        assert_eq!(config.logging.level, "info");
        assert!(config.logging.file.is_none());
        assert!(config.indexes.is_empty());
    }

    #[test]
    fn test_empty_text_is_default() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.engine.update_buffer, 256);
    }

    #[test]
    fn test_sample_parses() {
        let config = Config::parse(Config::sample_toml()).unwrap();
        assert_eq!(config.indexes.len(), 2);

        let tags = &config.indexes[0];
        assert!(tags.enabled);
        assert_eq!(tags.nodes.len(), 1);
        assert!(tags.nodes[0].link_documents);
        assert_eq!(tags.nodes[0].children.len(), 1);
        assert!(!tags.nodes[0].children[0].link_documents);
        assert_eq!(tags.nodes[0].walk().len(), 2);

        assert_eq!(config.indexes[1].document_types, vec!["invoice"]);
    }

    #[test]
    fn test_partial_engine_section() {
        let config = Config::parse("[engine]\nrebuild_batch_size = 8\n").unwrap();
        assert_eq!(config.engine.rebuild_batch_size, 8);
        assert_eq!(config.engine.max_label_length, 128);

        let engine = config.engine.engine_config();
        assert_eq!(engine.rebuild_batch_size, 8);
        assert_eq!(engine.update_buffer, 256);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(Config::parse("[engine]\nrebuild_batch_size = 0\n").is_err());
        assert!(Config::parse("[engine]\nmax_label_length = 0\n").is_err());
        assert!(Config::parse("[engine\n").is_err());

        let duplicate = r#"
[[indexes]]
label = "A"
slug = "same"

[[indexes]]
label = "B"
slug = "same"
"#;
        let err = Config::parse(duplicate).unwrap_err();
        assert!(err.to_string().contains("duplicate index slug"));
    }

    #[test]
    fn test_round_trip_through_toml() {
        let config = Config::parse(Config::sample_toml()).unwrap();
        let text = toml::to_string_pretty(&config).unwrap();
        let again = Config::parse(&text).unwrap();
        assert_eq!(again.indexes, config.indexes);
    }
}
