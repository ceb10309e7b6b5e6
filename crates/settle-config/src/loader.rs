//! JSON document loading and environment overrides.
//!
//! # Design
//! - Documents are parsed into [`CompletionSettings`], then overridden from
//!   `SETTLE_*` variables, then validated; callers only ever see validated settings.
//! - Environment access is injected as an iterator so overrides are testable.

use std::fs;
use std::path::Path;

use tracing::{debug, info};

use crate::error::{ConfigError, ConfigResult};
use crate::model::CompletionSettings;
use crate::validate::{parse_bool, validate_settings};

/// Prefix shared by every environment override.
pub const ENV_PREFIX: &str = "SETTLE_";

impl CompletionSettings {
    /// Parse settings from a JSON document without validating them.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Json`] when the document does not match the model.
    pub fn from_json_str(raw: &str) -> ConfigResult<Self> {
        serde_json::from_str(raw).map_err(|source| ConfigError::Json { path: None, source })
    }

    /// Apply `SETTLE_*` overrides from the supplied variables.
    ///
    /// Recognised keys: `SETTLE_ENDPOINT`, `SETTLE_IDEMPOTENT`, `SETTLE_LOG_LEVEL`,
    /// `SETTLE_LOG_FORMAT`. Other keys are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidField`] when a boolean override cannot be parsed.
    pub fn apply_env_overrides<I, K, V>(&mut self, vars: I) -> ConfigResult<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (key, value) in vars {
            let Some(name) = key.as_ref().strip_prefix(ENV_PREFIX) else {
                continue;
            };
            let value = value.as_ref();
            match name {
                "ENDPOINT" => self.endpoint = value.to_string(),
                "IDEMPOTENT" => {
                    self.idempotent = parse_bool("completion", "idempotent", value)?;
                }
                "LOG_LEVEL" => self.logging.level = value.to_string(),
                "LOG_FORMAT" => self.logging.format = Some(value.to_string()),
                _ => continue,
            }
            debug!(variable = key.as_ref(), "applied configuration override");
        }
        Ok(())
    }
}

/// Load, parse and validate a settings document from disk.
///
/// # Errors
///
/// Returns an error if the file cannot be read, is not valid JSON for the
/// settings model, or fails validation.
pub fn load_from_path(path: &Path) -> ConfigResult<CompletionSettings> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let settings: CompletionSettings =
        serde_json::from_str(&raw).map_err(|source| ConfigError::Json {
            path: Some(path.to_path_buf()),
            source,
        })?;
    validate_settings(&settings)?;
    info!(path = %path.display(), endpoint = %settings.endpoint, "loaded completion settings");
    Ok(settings)
}

/// Build settings from an optional document plus the process environment.
///
/// Without a path the defaults are used as the base document.
///
/// # Errors
///
/// Returns an error if the document cannot be loaded, an override is invalid,
/// or the resulting settings fail validation.
pub fn load_from_env(path: Option<&Path>) -> ConfigResult<CompletionSettings> {
    let mut settings = match path {
        Some(path) => load_from_path(path)?,
        None => CompletionSettings::default(),
    };
    settings.apply_env_overrides(std::env::vars())?;
    validate_settings(&settings)?;
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RepositorySettings;

    #[test]
    fn overrides_replace_matching_fields() -> ConfigResult<()> {
        let mut settings = CompletionSettings::default();
        settings.apply_env_overrides([
            ("SETTLE_ENDPOINT", "inbox"),
            ("SETTLE_IDEMPOTENT", "false"),
            ("SETTLE_LOG_LEVEL", "debug"),
            ("SETTLE_LOG_FORMAT", "json"),
            ("SETTLE_UNKNOWN", "ignored"),
            ("HOME", "/root"),
        ])?;
        assert_eq!(settings.endpoint, "inbox");
        assert!(!settings.idempotent);
        assert_eq!(settings.logging.level, "debug");
        assert_eq!(settings.logging.format.as_deref(), Some("json"));
        assert_eq!(settings.repository, RepositorySettings::default());
        Ok(())
    }

    #[test]
    fn invalid_bool_override_is_reported() {
        let mut settings = CompletionSettings::default();
        let err = settings
            .apply_env_overrides([("SETTLE_IDEMPOTENT", "sometimes")])
            .expect_err("invalid bool should fail");
        assert!(matches!(
            err,
            ConfigError::InvalidField {
                field: "idempotent",
                reason: "expected_bool",
                ..
            }
        ));
    }

    #[test]
    fn from_json_str_reports_parse_errors() {
        let err = CompletionSettings::from_json_str("{not json").expect_err("should fail");
        assert!(matches!(err, ConfigError::Json { path: None, .. }));
    }
}
