//! Connector configuration.
//!
//! Loaded from an optional TOML file, then overridden by `AMPLIHACK_MEMORY_*`
//! environment variables. A missing file is not an error.

use crate::core::error::{MemoryError, MemoryResult};
use crate::core::schemas::MEMORY_EVENTS_NAME;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const ENV_DB_PATH: &str = "AMPLIHACK_MEMORY_DB";
pub const ENV_AUDIT_LOG: &str = "AMPLIHACK_MEMORY_AUDIT_LOG";
pub const ENV_BUSY_TIMEOUT_SECS: &str = "AMPLIHACK_MEMORY_BUSY_TIMEOUT_SECS";

pub const DEFAULT_DB_PATH: &str = ".amplihack/memory.db";
pub const DEFAULT_BUSY_TIMEOUT_SECS: u32 = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Database file; created along with missing parent directories.
    pub db_path: PathBuf,
    /// How long a blocked writer waits on another process's lock.
    pub busy_timeout_secs: u32,
    /// JSONL audit log of connector operations. Disabled when unset.
    pub audit_log: Option<PathBuf>,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            busy_timeout_secs: DEFAULT_BUSY_TIMEOUT_SECS,
            audit_log: None,
        }
    }
}

impl MemoryConfig {
    pub fn with_db_path(path: impl AsRef<Path>) -> Self {
        Self {
            db_path: path.as_ref().to_path_buf(),
            ..Self::default()
        }
    }

    pub fn audit_log(mut self, path: impl AsRef<Path>) -> Self {
        self.audit_log = Some(path.as_ref().to_path_buf());
        self
    }

    /// Audit to `memory.events.jsonl` in the database file's directory.
    pub fn audit_log_beside_db(self) -> Self {
        let dir = match self.db_path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        self.audit_log(dir.join(MEMORY_EVENTS_NAME))
    }

    /// Load config from a TOML file. Absent file = defaults.
    pub fn load(path: &Path) -> MemoryResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path).map_err(MemoryError::IoError)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> MemoryResult<Self> {
        let config: MemoryConfig =
            toml::from_str(content).map_err(|e| MemoryError::ConfigError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// `load` followed by `apply_env_overrides`.
    pub fn resolve(path: &Path) -> MemoryResult<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) -> MemoryResult<()> {
        if let Some(db) = non_empty_env(ENV_DB_PATH) {
            self.db_path = PathBuf::from(db);
        }
        if let Some(log) = non_empty_env(ENV_AUDIT_LOG) {
            self.audit_log = Some(PathBuf::from(log));
        }
        if let Some(raw) = non_empty_env(ENV_BUSY_TIMEOUT_SECS) {
            self.busy_timeout_secs = raw.trim().parse().map_err(|_| {
                MemoryError::ConfigError(format!(
                    "{ENV_BUSY_TIMEOUT_SECS} must be a non-negative integer, got '{raw}'"
                ))
            })?;
        }
        self.validate()
    }

    fn validate(&self) -> MemoryResult<()> {
        if self.db_path.as_os_str().is_empty() {
            return Err(MemoryError::ConfigError(
                "db_path must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}
