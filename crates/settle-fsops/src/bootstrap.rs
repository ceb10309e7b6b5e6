//! Wiring from validated settings to a ready completion handler.

use std::sync::Arc;

use settle_completion::{
    CommitRollbackStrategy, CompletionHandler, EventBusReporter, FileResource,
    IdempotentRepository, MemoryIdempotentRepository,
};
use settle_config::{CompletionSettings, LoggingSettings, RepositorySettings, validate_settings};
use settle_events::EventBus;
use settle_telemetry::{LoggingConfig, Metrics, build_sha, init_logging, log_format_from_str};
use tracing::info;

use crate::error::FsOpsResult;
use crate::repository::FileIdempotentRepository;
use crate::strategy::LocalFileStrategy;

/// Build a handler for local files from `settings`.
///
/// Errors are published on `events` (when given) before being logged.
///
/// # Errors
///
/// Returns an error if the settings are invalid or the file repository cannot be opened.
pub fn build_handler(
    settings: &CompletionSettings,
    metrics: Option<Metrics>,
    events: Option<EventBus>,
) -> FsOpsResult<CompletionHandler<FileResource>> {
    validate_settings(settings)?;

    let strategy: Arc<dyn CommitRollbackStrategy<FileResource>> =
        Arc::new(LocalFileStrategy::from_settings(&settings.strategy));
    let repository: Arc<dyn IdempotentRepository> = match &settings.repository {
        RepositorySettings::Memory { capacity } => {
            Arc::new(MemoryIdempotentRepository::with_capacity(*capacity))
        }
        RepositorySettings::File { path, capacity } => {
            Arc::new(FileIdempotentRepository::open(path, *capacity)?)
        }
    };

    let mut builder = CompletionHandler::builder(strategy)
        .endpoint(settings.endpoint.clone())
        .idempotent(settings.idempotent)
        .repository(repository);
    if let Some(metrics) = metrics {
        builder = builder.metrics(metrics);
    }
    if let Some(events) = events {
        builder = builder
            .reporter(Arc::new(EventBusReporter::new(events.clone())))
            .events(events);
    }

    info!(
        endpoint = %settings.endpoint,
        idempotent = settings.idempotent,
        repository_capacity = settings.repository.capacity(),
        "completion handler ready"
    );
    Ok(builder.build())
}

/// Install the global tracing subscriber described by `settings`.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn install_logging(settings: &LoggingSettings) -> settle_telemetry::Result<()> {
    init_logging(&LoggingConfig {
        level: &settings.level,
        format: log_format_from_str(settings.format.as_deref()),
        build_sha: build_sha(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FsOpsError;
    use std::path::PathBuf;

    #[test]
    fn invalid_settings_are_rejected() {
        let settings = CompletionSettings {
            endpoint: String::new(),
            ..CompletionSettings::default()
        };
        let result = build_handler(&settings, None, None);
        assert!(matches!(result, Err(FsOpsError::Config { .. })));
    }

    #[test]
    fn memory_repository_is_installed_by_default() -> anyhow::Result<()> {
        let handler = build_handler(&CompletionSettings::default(), None, None)?;
        assert_eq!(handler.endpoint(), "files");
        assert!(handler.is_idempotent());
        assert!(handler.repository().is_some());
        Ok(())
    }

    #[test]
    fn unreadable_file_repository_fails_the_build() -> anyhow::Result<()> {
        let temp = tempfile::Builder::new().prefix("settle-fsops-").tempdir()?;
        let settings = CompletionSettings {
            repository: RepositorySettings::File {
                path: PathBuf::from(temp.path()),
                capacity: 8,
            },
            ..CompletionSettings::default()
        };
        let result = build_handler(&settings, None, None);
        assert!(matches!(result, Err(FsOpsError::Io { .. })));
        Ok(())
    }
}
