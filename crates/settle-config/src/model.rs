//! Typed configuration models for completion handlers.
//!
//! # Design
//! - Every field is defaulted so a partial document (or none at all) is valid.
//! - Actions are tagged enums so invalid combinations cannot be expressed.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Endpoint name used when the document does not provide one.
pub const DEFAULT_ENDPOINT: &str = "files";
/// Number of keys the idempotent repository keeps in memory by default.
pub const DEFAULT_REPOSITORY_CAPACITY: usize = 1_000;
/// Log level used when neither the document nor `RUST_LOG` provides one.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Complete settings for one completion endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CompletionSettings {
    /// Logical name of the endpoint the resources are consumed from.
    pub endpoint: String,
    /// Whether committed resources are recorded in the idempotent repository.
    pub idempotent: bool,
    /// Backing store for the idempotent repository.
    pub repository: RepositorySettings,
    /// Commit and rollback behaviour for consumed files.
    pub strategy: StrategySettings,
    /// Logging output configuration.
    pub logging: LoggingSettings,
}

impl Default for CompletionSettings {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            idempotent: true,
            repository: RepositorySettings::default(),
            strategy: StrategySettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

/// Backing store for consumed resource keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RepositorySettings {
    /// Process-local LRU set; keys are lost on restart.
    Memory {
        /// Maximum number of keys retained.
        #[serde(default = "default_capacity")]
        capacity: usize,
    },
    /// Keys persisted one per line in a store file.
    File {
        /// Location of the store file.
        path: PathBuf,
        /// Maximum number of keys retained in memory and in the file.
        #[serde(default = "default_capacity")]
        capacity: usize,
    },
}

impl RepositorySettings {
    /// Configured capacity regardless of the backing store.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        match self {
            Self::Memory { capacity } | Self::File { capacity, .. } => *capacity,
        }
    }
}

impl Default for RepositorySettings {
    fn default() -> Self {
        Self::Memory {
            capacity: DEFAULT_REPOSITORY_CAPACITY,
        }
    }
}

const fn default_capacity() -> usize {
    DEFAULT_REPOSITORY_CAPACITY
}

/// Commit and rollback behaviour applied to consumed files.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StrategySettings {
    /// Action taken once processing succeeded.
    pub commit: CommitActionSettings,
    /// Action taken when processing failed or commit could not be confirmed.
    pub rollback: RollbackActionSettings,
    /// Suffix of the read-lock marker released after commit or rollback.
    pub lock_suffix: Option<String>,
}

/// Action taken on commit.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum CommitActionSettings {
    /// Leave the file where it is.
    #[default]
    Leave,
    /// Delete the file.
    Delete,
    /// Move the file into a done directory, keeping its relative name.
    Move {
        /// Directory receiving committed files.
        directory: PathBuf,
    },
}

/// Action taken on rollback.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum RollbackActionSettings {
    /// Leave the file in place so it is picked up again.
    #[default]
    Leave,
    /// Move the file into a failed directory, keeping its relative name.
    Move {
        /// Directory receiving rolled-back files.
        directory: PathBuf,
    },
}

/// Logging output configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingSettings {
    /// Level directive applied when `RUST_LOG` is not set.
    pub level: String,
    /// Output format (`json` or `pretty`); inferred from the build when absent.
    pub format: Option<String>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
            format: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_document_uses_defaults() -> Result<(), serde_json::Error> {
        let settings: CompletionSettings = serde_json::from_value(json!({}))?;
        assert_eq!(settings, CompletionSettings::default());
        assert_eq!(settings.endpoint, DEFAULT_ENDPOINT);
        assert!(settings.idempotent);
        assert_eq!(settings.repository.capacity(), DEFAULT_REPOSITORY_CAPACITY);
        Ok(())
    }

    #[test]
    fn tagged_actions_deserialize() -> Result<(), serde_json::Error> {
        let settings: CompletionSettings = serde_json::from_value(json!({
            "repository": {"kind": "file", "path": "/var/lib/settle/keys"},
            "strategy": {
                "commit": {"action": "move", "directory": "/data/.done"},
                "rollback": {"action": "leave"},
                "lock_suffix": ".lock"
            }
        }))?;
        assert_eq!(
            settings.repository,
            RepositorySettings::File {
                path: PathBuf::from("/var/lib/settle/keys"),
                capacity: DEFAULT_REPOSITORY_CAPACITY,
            }
        );
        assert_eq!(
            settings.strategy.commit,
            CommitActionSettings::Move {
                directory: PathBuf::from("/data/.done"),
            }
        );
        assert_eq!(settings.strategy.rollback, RollbackActionSettings::Leave);
        assert_eq!(settings.strategy.lock_suffix.as_deref(), Some(".lock"));
        Ok(())
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let result = serde_json::from_value::<CompletionSettings>(json!({"idempotnet": false}));
        assert!(result.is_err());
    }
}
