//! Runtime configuration.
//!
//! Loaded from the `[runtime]` table of an `effrun.toml` file, either given
//! explicitly or found by walking up from the current directory.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use serde::Deserialize;
use thiserror::Error;

pub const CONFIG_FILE_NAME: &str = "effrun.toml";

const MIN_STACK_SIZE: usize = 64 * 1024;

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Stack size in bytes of the thread backing each suspension.
    #[serde(default = "default_stack_size")]
    pub suspension_stack_size: usize,

    /// Prefix for suspension thread names (`<prefix>-<suspension id>`).
    #[serde(default = "default_thread_name_prefix")]
    pub thread_name_prefix: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            suspension_stack_size: default_stack_size(),
            thread_name_prefix: default_thread_name_prefix(),
        }
    }
}

fn default_stack_size() -> usize {
    2 * 1024 * 1024
}

fn default_thread_name_prefix() -> String {
    "effrun".to_string()
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid runtime configuration: {0}")]
    Invalid(String),

    #[error("runtime configuration already installed")]
    AlreadyConfigured,
}

#[derive(Debug, Deserialize, Default)]
struct ConfigFile {
    #[serde(default)]
    runtime: Option<RuntimeConfig>,
}

impl RuntimeConfig {
    /// Parse a configuration document. A missing `[runtime]` table yields the defaults.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile = toml::from_str(content)?;
        let config = file.runtime.unwrap_or_default();
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.suspension_stack_size < MIN_STACK_SIZE {
            return Err(ConfigError::Invalid(format!(
                "suspension_stack_size must be at least {MIN_STACK_SIZE} bytes, got {}",
                self.suspension_stack_size
            )));
        }
        if self.thread_name_prefix.is_empty() {
            return Err(ConfigError::Invalid(
                "thread_name_prefix must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Find `effrun.toml` starting from a path and walking up
pub fn find_config_file(start_path: &Path) -> Option<PathBuf> {
    let mut current = if start_path.is_file() {
        start_path.parent()?
    } else {
        start_path
    };

    loop {
        let candidate = current.join(CONFIG_FILE_NAME);
        if candidate.exists() {
            return Some(candidate);
        }

        current = current.parent()?;
    }
}

/// Load configuration from `path`, or from the nearest `effrun.toml` above the
/// current directory. `Ok(None)` when no file is found.
pub fn load_config(path: Option<&Path>) -> Result<Option<RuntimeConfig>, ConfigError> {
    let config_path = match path {
        Some(p) => p.to_path_buf(),
        None => {
            let Ok(cwd) = std::env::current_dir() else {
                return Ok(None);
            };
            match find_config_file(&cwd) {
                Some(found) => found,
                None => return Ok(None),
            }
        }
    };

    log::debug!("loading runtime config from {}", config_path.display());
    RuntimeConfig::from_path(&config_path).map(Some)
}

static RUNTIME_CONFIG: OnceLock<RuntimeConfig> = OnceLock::new();

/// Install the process-wide configuration. Only the first call succeeds, and
/// only if no suspension has read the configuration yet.
pub fn configure(config: RuntimeConfig) -> Result<(), ConfigError> {
    config.validate()?;
    RUNTIME_CONFIG
        .set(config)
        .map_err(|_| ConfigError::AlreadyConfigured)
}

/// The installed configuration, or the defaults.
pub fn runtime_config() -> &'static RuntimeConfig {
    RUNTIME_CONFIG.get_or_init(RuntimeConfig::default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_when_table_missing() {
        let config = RuntimeConfig::from_toml_str("").unwrap();
        assert_eq!(config, RuntimeConfig::default());
        assert_eq!(config.thread_name_prefix, "effrun");
    }

    #[test]
    fn test_partial_table_keeps_other_defaults() {
        let config = RuntimeConfig::from_toml_str(
            r#"
[runtime]
suspension_stack_size = 524288
"#,
        )
        .unwrap();
        assert_eq!(config.suspension_stack_size, 524288);
        assert_eq!(config.thread_name_prefix, "effrun");
    }

    #[test]
    fn test_rejects_tiny_stack() {
        let err = RuntimeConfig::from_toml_str("[runtime]\nsuspension_stack_size = 16\n")
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_rejects_malformed_toml() {
        let err = RuntimeConfig::from_toml_str("[runtime\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_find_config_file_walks_up() {
        let tmp = tempdir().expect("tmpdir");
        let nested = tmp.path().join("a").join("b");
        fs::create_dir_all(&nested).unwrap();
        fs::write(
            tmp.path().join(CONFIG_FILE_NAME),
            "[runtime]\nthread_name_prefix = \"fx\"\n",
        )
        .unwrap();

        let found = find_config_file(&nested).unwrap();
        assert_eq!(found, tmp.path().join(CONFIG_FILE_NAME));

        let config = load_config(Some(&found)).unwrap().unwrap();
        assert_eq!(config.thread_name_prefix, "fx");
    }

    #[test]
    fn test_load_missing_explicit_path_is_io_error() {
        let tmp = tempdir().expect("tmpdir");
        let err = load_config(Some(&tmp.path().join("nope.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
