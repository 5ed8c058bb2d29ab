//! TOML configuration for the merge engine and the `wcmerge` CLI.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::diff::DiffOptions;
use crate::errors::ConfigError;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Configuration loaded from a TOML file. Every section is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeConfig {
    /// Diff engine and scratch space.
    #[serde(default)]
    pub merge: MergeSettings,

    /// Entry database location.
    #[serde(default)]
    pub store: StoreConfig,

    /// Logging.
    #[serde(default)]
    pub log: LogConfig,
}

// ---------------------------------------------------------------------------
// Merge
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeSettings {
    /// External diff3 program. Unset selects the internal engine.
    #[serde(default)]
    pub diff3_cmd: Option<PathBuf>,

    /// Options passed to the diff engine when a request carries none.
    #[serde(default)]
    pub diff3_options: Vec<String>,

    /// Include the base text (`|||||||` section) in internal conflict hunks.
    #[serde(default)]
    pub display_original: bool,

    /// Where scoped temporaries go (default: the system temp directory).
    #[serde(default)]
    pub scratch_dir: Option<PathBuf>,
}

impl MergeSettings {
    pub fn scratch_dir(&self) -> PathBuf {
        self.scratch_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Path of the SQLite entry database.
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

fn default_db_path() -> PathBuf {
    PathBuf::from(".wcmerge/entries.db")
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

// ---------------------------------------------------------------------------
// Log
// ---------------------------------------------------------------------------

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Minimum tracing level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".into()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// ---------------------------------------------------------------------------
// Loading & validation
// ---------------------------------------------------------------------------

impl MergeConfig {
    /// Load a [`MergeConfig`] from a TOML file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading configuration");

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config: MergeConfig =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        debug!("configuration parsed successfully");
        Ok(config)
    }

    /// Load and validate in one call.
    pub fn load_and_validate<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = Self::load_from_file(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to TOML, e.g. for writing a starter file.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Check values that parse but cannot work.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(cmd) = &self.merge.diff3_cmd {
            if cmd.as_os_str().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "merge.diff3_cmd".into(),
                    detail: "diff3 command must not be empty".into(),
                });
            }
        } else if let Err(e) = DiffOptions::parse(&self.merge.diff3_options) {
            return Err(ConfigError::InvalidValue {
                field: "merge.diff3_options".into(),
                detail: e.to_string(),
            });
        }

        if let Some(dir) = &self.merge.scratch_dir {
            if !dir.is_dir() {
                return Err(ConfigError::InvalidValue {
                    field: "merge.scratch_dir".into(),
                    detail: format!("'{}' is not a directory", dir.display()),
                });
            }
        }

        if self.store.path.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "store.path".into(),
                detail: "database path must not be empty".into(),
            });
        }

        if !LOG_LEVELS.contains(&self.log.level.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "log.level".into(),
                detail: format!("expected one of {}", LOG_LEVELS.join(", ")),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn sample_toml() -> &'static str {
        r#"
[merge]
diff3_cmd = "/usr/bin/diff3"
diff3_options = ["--strip-trailing-cr"]
display_original = true

[store]
path = "/var/lib/wcmerge/entries.db"

[log]
level = "debug"
"#
    }

    #[test]
    fn test_parse_full_config() {
        let config: MergeConfig = toml::from_str(sample_toml()).expect("failed to parse toml");
        assert_eq!(config.merge.diff3_cmd, Some(PathBuf::from("/usr/bin/diff3")));
        assert_eq!(config.merge.diff3_options, vec!["--strip-trailing-cr"]);
        assert!(config.merge.display_original);
        assert_eq!(config.store.path, PathBuf::from("/var/lib/wcmerge/entries.db"));
        assert_eq!(config.log.level, "debug");
        config.validate().unwrap();
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wcmerge.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(sample_toml().as_bytes()).unwrap();

        let config = MergeConfig::load_from_file(&path).expect("load_from_file failed");
        assert_eq!(config.log.level, "debug");
    }

    #[test]
    fn test_file_not_found() {
        let result = MergeConfig::load_from_file("/nonexistent/wcmerge.toml");
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_defaults() {
        let config: MergeConfig = toml::from_str("").unwrap();
        assert_eq!(config, MergeConfig::default());
        assert_eq!(config.merge.diff3_cmd, None);
        assert!(!config.merge.display_original);
        assert_eq!(config.merge.scratch_dir(), std::env::temp_dir());
        assert_eq!(config.store.path, PathBuf::from(".wcmerge/entries.db"));
        assert_eq!(config.log.level, "info");
        config.validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_unknown_internal_option() {
        let mut config = MergeConfig::default();
        config.merge.diff3_options = vec!["--minimal".into()];
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "merge.diff3_options"
        ));

        // External tools take whatever options they understand.
        config.merge.diff3_cmd = Some(PathBuf::from("diff3"));
        config.validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_bad_log_level() {
        let mut config = MergeConfig::default();
        config.log.level = "loud".into();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "log.level"
        ));
    }

    #[test]
    fn test_round_trips_through_toml() {
        let config: MergeConfig = toml::from_str(sample_toml()).unwrap();
        let text = config.to_toml_string().unwrap();
        let back: MergeConfig = toml::from_str(&text).unwrap();
        assert_eq!(back, config);
    }
}
