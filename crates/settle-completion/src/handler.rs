//! Completion handler driving commit or rollback for each processed resource.
//!
//! # Design
//! - One decision routine serves both notification channels; the outcome's own
//!   status is authoritative.
//! - Every collaborator call is isolated: its error (or panic) is reported and
//!   the sequence continues, so exactly one terminal disposition is reached.
//! - Nothing is retried. A failed commit falls through to a single rollback; a
//!   failed rollback is reported and abandoned.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use settle_events::{Event, EventBus};
use settle_telemetry::Metrics;
use tracing::{debug, error, trace, warn};

use crate::error::{CompletionError, RepositoryError, StrategyError};
use crate::model::{
    CompletionContext, Disposition, OutcomeStatus, ProcessingOutcome, Resource, ResourceKey,
};
use crate::reporter::{ExceptionReporter, LoggingExceptionReporter};
use crate::repository::{IdempotentRepository, MemoryIdempotentRepository};
use crate::strategy::CommitRollbackStrategy;

const DEFAULT_ENDPOINT: &str = "files";

/// Completes processed resources by committing or rolling them back.
pub struct CompletionHandler<R> {
    endpoint: Arc<str>,
    strategy: Arc<dyn CommitRollbackStrategy<R>>,
    repository: Option<Arc<dyn IdempotentRepository>>,
    idempotent: bool,
    reporter: Arc<dyn ExceptionReporter>,
    metrics: Option<Metrics>,
    events: Option<EventBus>,
}

impl<R> Clone for CompletionHandler<R> {
    fn clone(&self) -> Self {
        Self {
            endpoint: Arc::clone(&self.endpoint),
            strategy: Arc::clone(&self.strategy),
            repository: self.repository.clone(),
            idempotent: self.idempotent,
            reporter: Arc::clone(&self.reporter),
            metrics: self.metrics.clone(),
            events: self.events.clone(),
        }
    }
}

impl<R: Resource> CompletionHandler<R> {
    /// Start building a handler around `strategy`.
    #[must_use]
    pub fn builder(strategy: Arc<dyn CommitRollbackStrategy<R>>) -> CompletionHandlerBuilder<R> {
        CompletionHandlerBuilder::new(strategy)
    }

    /// Success notification channel.
    pub fn on_success(&self, outcome: ProcessingOutcome<R>) {
        let _ = self.complete(outcome);
    }

    /// Failure notification channel.
    pub fn on_failure(&self, outcome: ProcessingOutcome<R>) {
        let _ = self.complete(outcome);
    }

    /// Commit or roll back the resource carried by `outcome`.
    ///
    /// Never fails and never panics on collaborator failures; every error is
    /// handed to the exception reporter.
    pub fn complete(&self, outcome: ProcessingOutcome<R>) -> Disposition {
        let context = CompletionContext::new(Arc::clone(&self.endpoint), outcome.is_failed());
        let (resource, status) = outcome.into_parts();
        let key = resource.key();
        debug!(
            endpoint = %self.endpoint,
            completion_id = %context.completion_id,
            resource = ?resource,
            failed = context.processing_failed,
            "done processing resource"
        );

        let committed = match status {
            OutcomeStatus::Succeeded => self.commit(&resource, &key, &context),
            OutcomeStatus::Failed { error } => {
                if let Some(source) = error {
                    self.report(CompletionError::Processing {
                        key: key.clone(),
                        source,
                    });
                }
                false
            }
        };

        if committed {
            self.record(Disposition::Committed, &key, &context);
            return Disposition::Committed;
        }

        self.rollback(&resource, &key, &context);
        self.record(Disposition::RolledBack, &key, &context);
        Disposition::RolledBack
    }

    /// Endpoint name reported in logs and events.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Whether committed keys are recorded in the repository.
    #[must_use]
    pub const fn is_idempotent(&self) -> bool {
        self.idempotent
    }

    /// Repository shared with upstream consumers for `contains` checks.
    #[must_use]
    pub fn repository(&self) -> Option<&Arc<dyn IdempotentRepository>> {
        self.repository.as_ref()
    }

    /// Reporter receiving every completion error.
    #[must_use]
    pub fn reporter(&self) -> &Arc<dyn ExceptionReporter> {
        &self.reporter
    }

    fn commit(&self, resource: &R, key: &ResourceKey, context: &CompletionContext) -> bool {
        let mut committed = true;

        // Recorded before the strategy runs: a failed archive does not undo the
        // logical consumption of the resource.
        if self.idempotent
            && let Some(repository) = &self.repository
        {
            match guarded(
                || repository.add(key),
                |message| RepositoryError::panicked("add", message),
            ) {
                Ok(_) => {
                    if let Some(metrics) = &self.metrics {
                        metrics.inc_repository_write();
                    }
                }
                Err(source) => {
                    committed = false;
                    self.report(CompletionError::Repository {
                        key: key.clone(),
                        source,
                    });
                }
            }
        }

        trace!(
            endpoint = %self.endpoint,
            completion_id = %context.completion_id,
            strategy = self.strategy.name(),
            resource = ?resource,
            "committing resource"
        );
        if let Err(source) = guarded(
            || self.strategy.commit(resource, context),
            |message| StrategyError::panicked("commit", message),
        ) {
            committed = false;
            self.report(CompletionError::Commit {
                key: key.clone(),
                source,
            });
        }

        committed
    }

    fn rollback(&self, resource: &R, key: &ResourceKey, context: &CompletionContext) {
        warn!(
            endpoint = %self.endpoint,
            completion_id = %context.completion_id,
            strategy = self.strategy.name(),
            resource = ?resource,
            "rolling back resource"
        );
        if let Err(source) = guarded(
            || self.strategy.rollback(resource, context),
            |message| StrategyError::panicked("rollback", message),
        ) {
            self.report(CompletionError::Rollback {
                key: key.clone(),
                source,
            });
        }
    }

    fn report(&self, error: CompletionError) {
        let kind = error.kind();
        if let Some(metrics) = &self.metrics {
            metrics.inc_completion_error(kind.as_str());
        }
        let reporter = &self.reporter;
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| reporter.report(error))) {
            error!(
                endpoint = %self.endpoint,
                kind = kind.as_str(),
                panic = %panic_message(payload.as_ref()),
                "exception reporter panicked"
            );
        }
    }

    fn record(&self, disposition: Disposition, key: &ResourceKey, context: &CompletionContext) {
        if let Some(metrics) = &self.metrics {
            match disposition {
                Disposition::Committed => metrics.inc_committed(),
                Disposition::RolledBack => metrics.inc_rolled_back(),
            }
        }
        if let Some(events) = &self.events {
            let event = match disposition {
                Disposition::Committed => Event::ResourceCommitted {
                    completion_id: context.completion_id,
                    endpoint: self.endpoint.to_string(),
                    key: key.to_string(),
                },
                Disposition::RolledBack => Event::ResourceRolledBack {
                    completion_id: context.completion_id,
                    endpoint: self.endpoint.to_string(),
                    key: key.to_string(),
                    processing_failed: context.processing_failed,
                },
            };
            let _ = events.publish(event);
        }
        debug!(
            endpoint = %self.endpoint,
            completion_id = %context.completion_id,
            key = %key,
            disposition = disposition.as_str(),
            "completion finished"
        );
    }
}

/// Builder for [`CompletionHandler`].
pub struct CompletionHandlerBuilder<R> {
    endpoint: Arc<str>,
    strategy: Arc<dyn CommitRollbackStrategy<R>>,
    repository: Option<Arc<dyn IdempotentRepository>>,
    idempotent: bool,
    reporter: Option<Arc<dyn ExceptionReporter>>,
    metrics: Option<Metrics>,
    events: Option<EventBus>,
}

impl<R: Resource> CompletionHandlerBuilder<R> {
    fn new(strategy: Arc<dyn CommitRollbackStrategy<R>>) -> Self {
        Self {
            endpoint: Arc::from(DEFAULT_ENDPOINT),
            strategy,
            repository: None,
            idempotent: false,
            reporter: None,
            metrics: None,
            events: None,
        }
    }

    /// Name of the endpoint the resources are consumed from.
    #[must_use]
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Arc::from(endpoint.into());
        self
    }

    /// Enable or disable recording committed keys.
    #[must_use]
    pub const fn idempotent(mut self, enabled: bool) -> Self {
        self.idempotent = enabled;
        self
    }

    /// Repository receiving committed keys.
    #[must_use]
    pub fn repository(mut self, repository: Arc<dyn IdempotentRepository>) -> Self {
        self.repository = Some(repository);
        self
    }

    /// Reporter receiving completion errors; defaults to logging.
    #[must_use]
    pub fn reporter(mut self, reporter: Arc<dyn ExceptionReporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    /// Metrics registry updated for every completion.
    #[must_use]
    pub fn metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Event bus receiving commit and rollback events.
    #[must_use]
    pub fn events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    /// Finish the handler, resolving defaults for unset collaborators.
    ///
    /// Tracking without an explicit repository installs a
    /// [`MemoryIdempotentRepository`].
    #[must_use]
    pub fn build(self) -> CompletionHandler<R> {
        let repository = match (self.repository, self.idempotent) {
            (Some(repository), _) => Some(repository),
            (None, true) => {
                let repository: Arc<dyn IdempotentRepository> =
                    Arc::new(MemoryIdempotentRepository::default());
                Some(repository)
            }
            (None, false) => None,
        };
        CompletionHandler {
            endpoint: self.endpoint,
            strategy: self.strategy,
            repository,
            idempotent: self.idempotent,
            reporter: self
                .reporter
                .unwrap_or_else(|| Arc::new(LoggingExceptionReporter)),
            metrics: self.metrics,
            events: self.events,
        }
    }
}

fn guarded<T, E>(
    call: impl FnOnce() -> Result<T, E>,
    on_panic: impl FnOnce(String) -> E,
) -> Result<T, E> {
    match panic::catch_unwind(AssertUnwindSafe(call)) {
        Ok(result) => result,
        Err(payload) => Err(on_panic(panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|message| (*message).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}
