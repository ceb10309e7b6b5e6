//! Validation helpers and parsing utilities for configuration documents.

use std::path::Path;

use crate::error::{ConfigError, ConfigResult};
use crate::model::{
    CommitActionSettings, CompletionSettings, RepositorySettings, RollbackActionSettings,
};

/// Validate a settings document after it has been parsed and overridden.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidField`] for the first field that fails validation.
pub fn validate_settings(settings: &CompletionSettings) -> ConfigResult<()> {
    if settings.endpoint.trim().is_empty() {
        return Err(ConfigError::invalid("completion", "endpoint", None, "empty"));
    }

    if settings.repository.capacity() == 0 {
        return Err(ConfigError::invalid(
            "repository",
            "capacity",
            Some("0".to_string()),
            "must_be_positive",
        ));
    }
    if let RepositorySettings::File { path, .. } = &settings.repository {
        ensure_path("repository", "path", path)?;
    }

    if let CommitActionSettings::Move { directory } = &settings.strategy.commit {
        ensure_path("strategy", "commit.directory", directory)?;
    }
    if let RollbackActionSettings::Move { directory } = &settings.strategy.rollback {
        ensure_path("strategy", "rollback.directory", directory)?;
    }
    if let Some(suffix) = &settings.strategy.lock_suffix
        && suffix.trim().is_empty()
    {
        return Err(ConfigError::invalid(
            "strategy",
            "lock_suffix",
            Some(suffix.clone()),
            "empty",
        ));
    }

    if settings.logging.level.trim().is_empty() {
        return Err(ConfigError::invalid("logging", "level", None, "empty"));
    }
    if let Some(format) = &settings.logging.format
        && !["json", "pretty"]
            .iter()
            .any(|known| format.trim().eq_ignore_ascii_case(known))
    {
        return Err(ConfigError::invalid(
            "logging",
            "format",
            Some(format.clone()),
            "unsupported_format",
        ));
    }

    Ok(())
}

fn ensure_path(section: &'static str, field: &'static str, path: &Path) -> ConfigResult<()> {
    if path.as_os_str().is_empty() {
        return Err(ConfigError::invalid(section, field, None, "empty"));
    }
    Ok(())
}

pub(crate) fn parse_bool(
    section: &'static str,
    field: &'static str,
    raw: &str,
) -> ConfigResult<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::invalid(
            section,
            field,
            Some(raw.to_string()),
            "expected_bool",
        )),
    }
}
