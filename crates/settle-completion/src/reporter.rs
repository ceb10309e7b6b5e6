//! Sinks for errors raised while completing resources.

use std::sync::Arc;

use settle_events::{Event, EventBus};
use tracing::error;

use crate::error::CompletionError;

/// Records an error without propagating it.
///
/// Implementations must not panic; the handler treats `report` as infallible.
pub trait ExceptionReporter: Send + Sync {
    /// Handle `error`.
    fn report(&self, error: CompletionError);
}

/// Default reporter: logs every error with its full source chain.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingExceptionReporter;

impl ExceptionReporter for LoggingExceptionReporter {
    fn report(&self, error: CompletionError) {
        error!(
            kind = error.kind().as_str(),
            key = %error.key(),
            error = %error.chain(),
            "completion error"
        );
    }
}

/// Dead-letter reporter: publishes every error on the event bus, then hands it
/// to an inner reporter.
#[derive(Clone)]
pub struct EventBusReporter {
    events: EventBus,
    inner: Arc<dyn ExceptionReporter>,
}

impl EventBusReporter {
    /// Publish to `events` and log through [`LoggingExceptionReporter`].
    #[must_use]
    pub fn new(events: EventBus) -> Self {
        Self::with_inner(events, Arc::new(LoggingExceptionReporter))
    }

    /// Publish to `events` and delegate to `inner`.
    #[must_use]
    pub fn with_inner(events: EventBus, inner: Arc<dyn ExceptionReporter>) -> Self {
        Self { events, inner }
    }
}

impl ExceptionReporter for EventBusReporter {
    fn report(&self, error: CompletionError) {
        let _ = self.events.publish(Event::CompletionErrorReported {
            key: error.key().to_string(),
            kind: error.kind().as_str().to_string(),
            message: error.chain(),
        });
        self.inner.report(error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StrategyError;
    use crate::model::ResourceKey;
    use std::io;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Collect {
        keys: Mutex<Vec<String>>,
    }

    impl ExceptionReporter for Collect {
        fn report(&self, error: CompletionError) {
            self.keys
                .lock()
                .expect("collector mutex poisoned")
                .push(error.key().to_string());
        }
    }

    fn rollback_error(key: &str) -> CompletionError {
        CompletionError::Rollback {
            key: ResourceKey::from(key),
            source: StrategyError::new("rollback.move", io::Error::other("read-only")),
        }
    }

    #[test]
    fn logging_reporter_accepts_errors() {
        LoggingExceptionReporter.report(rollback_error("x"));
    }

    #[test]
    fn event_bus_reporter_publishes_then_delegates() {
        let events = EventBus::with_capacity(4);
        let inner = Arc::new(Collect::default());
        let reporter = EventBusReporter::with_inner(events.clone(), inner.clone());

        reporter.report(rollback_error("invoice-42.csv"));

        let backlog = events.backlog_since(0);
        assert_eq!(backlog.len(), 1);
        match &backlog[0].event {
            Event::CompletionErrorReported { key, kind, message } => {
                assert_eq!(key, "invoice-42.csv");
                assert_eq!(kind, "rollback");
                assert!(message.ends_with("read-only"));
            }
            other => panic!("unexpected event: {other:?}"),
        }
        let keys = inner.keys.lock().expect("collector mutex poisoned");
        assert_eq!(keys.as_slice(), ["invoice-42.csv".to_string()]);
    }
}
