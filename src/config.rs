//! Load options and the YAML configuration file.
//!
//! CLI flags override file values; contradictory combinations are rejected
//! before any I/O happens.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable supplying the database password when no flag is
/// given.
pub const PASSWORD_ENV: &str = "NEO_PASSWORD";

/// Default cap on reported validation errors per file.
pub const DEFAULT_MAX_VIOLATIONS: usize = 10;

/// How rows are applied to the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadMode {
    /// Write-or-update by id
    #[default]
    Upsert,
    /// Fail on an existing id
    New,
    /// Remove with cascade
    Delete,
}

impl fmt::Display for LoadMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LoadMode::Upsert => "upsert",
            LoadMode::New => "new",
            LoadMode::Delete => "delete",
        };
        f.write_str(name)
    }
}

impl FromStr for LoadMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "upsert" => Ok(LoadMode::Upsert),
            "new" => Ok(LoadMode::New),
            "delete" => Ok(LoadMode::Delete),
            other => Err(format!("unknown loading mode \"{other}\"")),
        }
    }
}

/// What happens when an upsert finds a single-parent edge already bound to a
/// different parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RebindPolicy {
    /// Delete the old edge with a warning
    #[default]
    Warn,
    /// Treat the rebind as a load error
    Deny,
}

/// Options governing one load run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadOptions {
    /// Loading mode
    #[serde(default)]
    pub mode: LoadMode,
    /// Skip all pre-load validation
    #[serde(default)]
    pub cheat_mode: bool,
    /// Validate only, write nothing
    #[serde(default)]
    pub dry_run: bool,
    /// Detach-delete the whole graph before loading
    #[serde(default)]
    pub wipe_db: bool,
    /// Skip the backup step
    #[serde(default)]
    pub no_backup: bool,
    /// Where backup archives are written
    #[serde(default)]
    pub backup_folder: Option<PathBuf>,
    /// Commit every `BATCH_SIZE` rows instead of once per pass
    #[serde(default)]
    pub split_transactions: bool,
    /// Stop validating a file after this many errors (0 = unlimited)
    #[serde(default = "default_max_violations")]
    pub max_violations: usize,
    /// Skip interactive confirmations
    #[serde(default)]
    pub yes: bool,
    /// Single-parent edge rebind policy
    #[serde(default)]
    pub rebind_policy: RebindPolicy,
}

fn default_max_violations() -> usize {
    DEFAULT_MAX_VIOLATIONS
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            mode: LoadMode::Upsert,
            cheat_mode: false,
            dry_run: false,
            wipe_db: false,
            no_backup: false,
            backup_folder: None,
            split_transactions: false,
            max_violations: DEFAULT_MAX_VIOLATIONS,
            yes: false,
            rebind_policy: RebindPolicy::Warn,
        }
    }
}

/// Errors raised while assembling the configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The configuration file could not be read
    #[error("cannot read configuration file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    /// The configuration file could not be parsed
    #[error("cannot parse configuration file {path}: {source}")]
    Yaml {
        path: String,
        source: serde_yaml::Error,
    },

    /// Contradictory or incomplete options
    #[error("{0}")]
    Invalid(String),
}

impl LoadOptions {
    /// Reject contradictory option combinations. A backup is mandatory in
    /// split-transaction mode because partial commits survive a failure.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.split_transactions && self.no_backup {
            return Err(ConfigError::Invalid(
                "split-transactions and no-backup cannot both be enabled, \
                 a backup is required when running in split transactions mode"
                    .to_string(),
            ));
        }
        if !self.no_backup && !self.dry_run && self.backup_folder.is_none() {
            return Err(ConfigError::Invalid(
                "backup folder not specified, a backup folder is required \
                 unless no-backup is used"
                    .to_string(),
            ));
        }
        Ok(())
    }
}

/// A plugin entry in the configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginConfig {
    /// Registry name of the plugin
    pub name: String,
    /// Free-form parameters handed to the plugin factory
    #[serde(default)]
    pub params: serde_yaml::Value,
}

/// Graph database connection settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Neo4jConfig {
    pub uri: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
}

/// The YAML configuration file, all fields overridable from the CLI.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoaderConfig {
    /// Version string recorded in the validation log banner
    pub data_model_version: Option<String>,
    /// Database connection
    #[serde(default)]
    pub neo4j: Neo4jConfig,
    /// Schema model files, fed as a sequence
    #[serde(default)]
    pub schema: Vec<PathBuf>,
    /// Properties document
    pub prop_file: Option<PathBuf>,
    /// Directory holding the dataset's .txt/.tsv files
    pub dataset: Option<PathBuf>,
    /// Load options
    #[serde(flatten)]
    pub options: LoadOptions,
    /// Plugins to instantiate
    #[serde(default)]
    pub plugins: Vec<PluginConfig>,
}

impl LoaderConfig {
    /// Parse a configuration file. The settings live under a top-level
    /// `config` key.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        #[derive(Deserialize)]
        struct Wrapper {
            config: LoaderConfig,
        }
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let wrapper: Wrapper =
            serde_yaml::from_str(&text).map_err(|source| ConfigError::Yaml {
                path: path.display().to_string(),
                source,
            })?;
        Ok(wrapper.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_parsing() {
        assert_eq!("upsert".parse::<LoadMode>().unwrap(), LoadMode::Upsert);
        assert_eq!("NEW".parse::<LoadMode>().unwrap(), LoadMode::New);
        assert_eq!("delete".parse::<LoadMode>().unwrap(), LoadMode::Delete);
        assert!("merge".parse::<LoadMode>().is_err());
    }

    #[test]
    fn test_split_requires_backup() {
        let options = LoadOptions {
            split_transactions: true,
            no_backup: true,
            ..Default::default()
        };
        assert!(options.validate().is_err());

        let options = LoadOptions {
            split_transactions: true,
            backup_folder: Some(PathBuf::from("/tmp/backup")),
            ..Default::default()
        };
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_backup_folder_required_unless_no_backup() {
        let options = LoadOptions::default();
        assert!(options.validate().is_err());

        let options = LoadOptions {
            no_backup: true,
            ..Default::default()
        };
        assert!(options.validate().is_ok());

        let options = LoadOptions {
            dry_run: true,
            ..Default::default()
        };
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_config_file_parsing() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("loader.yml");
        std::fs::write(
            &path,
            r#"
config:
  data_model_version: "1.2.0"
  neo4j:
    uri: bolt://localhost:7687
    user: neo4j
  schema:
    - model.yml
  prop_file: props.yml
  dataset: ./data
  mode: new
  no_backup: true
  max_violations: 25
  plugins:
    - name: visit_creator
      params:
        kinds: [visit]
"#,
        )
        .unwrap();
        let config = LoaderConfig::from_file(&path).unwrap();
        assert_eq!(config.data_model_version.as_deref(), Some("1.2.0"));
        assert_eq!(config.neo4j.uri.as_deref(), Some("bolt://localhost:7687"));
        assert_eq!(config.options.mode, LoadMode::New);
        assert_eq!(config.options.max_violations, 25);
        assert!(config.options.no_backup);
        assert_eq!(config.plugins[0].name, "visit_creator");
    }
}
