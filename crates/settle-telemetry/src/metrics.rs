//! Prometheus-backed metrics registry and snapshot helpers.
//!
//! # Design
//! - Encapsulates collector registration to keep the public API small.
//! - Exposes only the counters the completion handler reports.

use std::sync::Arc;

use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use serde::Serialize;

use crate::error::{Result, TelemetryError};

const DISPOSITION_COMMITTED: &str = "committed";
const DISPOSITION_ROLLED_BACK: &str = "rolled_back";
const ERROR_KINDS: [&str; 3] = ["processing", "commit", "rollback"];

/// Prometheus-backed metrics registry shared across completion handlers.
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    registry: Registry,
    completions_total: IntCounterVec,
    completion_errors_total: IntCounterVec,
    repository_writes_total: IntCounter,
}

/// Snapshot of the completion counters for health reporting.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Resources whose commit fully succeeded.
    pub committed_total: u64,
    /// Resources for which a rollback was attempted.
    pub rolled_back_total: u64,
    /// Errors handed to the exception reporter across the known kinds.
    pub errors_total: u64,
    /// Successful writes to the idempotent repository.
    pub repository_writes_total: u64,
}

impl Metrics {
    /// Construct a new metrics registry with the completion collectors registered.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the Prometheus collectors cannot be
    /// built or registered.
    pub fn new() -> Result<Self> {
        let registry = Registry::new();
        let completions_total = counter_vec(
            &registry,
            "completions_total",
            "Resource completions by terminal disposition",
            "disposition",
        )?;
        let completion_errors_total = counter_vec(
            &registry,
            "completion_errors_total",
            "Errors reported while completing resources, by kind",
            "kind",
        )?;
        let repository_writes_total = IntCounter::with_opts(Opts::new(
            "repository_writes_total",
            "Keys written to the idempotent repository",
        ))
        .map_err(|source| TelemetryError::metric("build", "repository_writes_total", source))?;
        register(&registry, "repository_writes_total", &repository_writes_total)?;

        Ok(Self {
            inner: Arc::new(MetricsInner {
                registry,
                completions_total,
                completion_errors_total,
                repository_writes_total,
            }),
        })
    }

    /// Count a resource that reached the committed state.
    pub fn inc_committed(&self) {
        self.inner
            .completions_total
            .with_label_values(&[DISPOSITION_COMMITTED])
            .inc();
    }

    /// Count a resource for which a rollback was attempted.
    pub fn inc_rolled_back(&self) {
        self.inner
            .completions_total
            .with_label_values(&[DISPOSITION_ROLLED_BACK])
            .inc();
    }

    /// Count an error handed to the reporter.
    pub fn inc_completion_error(&self, kind: &str) {
        self.inner
            .completion_errors_total
            .with_label_values(&[kind])
            .inc();
    }

    /// Count a key written to the idempotent repository.
    pub fn inc_repository_write(&self) {
        self.inner.repository_writes_total.inc();
    }

    /// Render the metrics registry using the Prometheus text exposition format.
    ///
    /// # Errors
    ///
    /// Returns an error if the metrics cannot be encoded or if the encoded
    /// buffer is not valid UTF-8.
    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.inner.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|source| TelemetryError::metric("encode", "registry", source))?;
        String::from_utf8(buffer).map_err(|source| TelemetryError::RenderUtf8 { source })
    }

    /// Take a point-in-time snapshot of the completion counters.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        let errors_total = ERROR_KINDS
            .iter()
            .map(|kind| {
                self.inner
                    .completion_errors_total
                    .with_label_values(&[*kind])
                    .get()
            })
            .sum();
        MetricsSnapshot {
            committed_total: self
                .inner
                .completions_total
                .with_label_values(&[DISPOSITION_COMMITTED])
                .get(),
            rolled_back_total: self
                .inner
                .completions_total
                .with_label_values(&[DISPOSITION_ROLLED_BACK])
                .get(),
            errors_total,
            repository_writes_total: self.inner.repository_writes_total.get(),
        }
    }
}

fn register<C>(registry: &Registry, name: &'static str, collector: &C) -> Result<()>
where
    C: prometheus::core::Collector + Clone + 'static,
{
    registry
        .register(Box::new(collector.clone()))
        .map_err(|source| TelemetryError::metric("register", name, source))
}

fn counter_vec(
    registry: &Registry,
    name: &'static str,
    help: &str,
    label: &str,
) -> Result<IntCounterVec> {
    let counter = IntCounterVec::new(Opts::new(name, help), &[label])
        .map_err(|source| TelemetryError::metric("build", name, source))?;
    register(registry, name, &counter)?;
    Ok(counter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_snapshot_reflects_updates() -> Result<()> {
        let metrics = Metrics::new()?;
        metrics.inc_committed();
        metrics.inc_committed();
        metrics.inc_rolled_back();
        metrics.inc_completion_error("commit");
        metrics.inc_completion_error("rollback");
        metrics.inc_repository_write();

        let snapshot = metrics.snapshot();
        assert_eq!(
            snapshot,
            MetricsSnapshot {
                committed_total: 2,
                rolled_back_total: 1,
                errors_total: 2,
                repository_writes_total: 1,
            }
        );

        let rendered = metrics.render()?;
        assert!(rendered.contains("completions_total"));
        assert!(rendered.contains("completion_errors_total"));
        assert!(rendered.contains("repository_writes_total"));
        Ok(())
    }

    #[test]
    fn duplicate_registration_is_reported() -> Result<()> {
        let registry = Registry::new();
        let _ = counter_vec(&registry, "completions_total", "first", "disposition")?;
        let duplicate = counter_vec(&registry, "completions_total", "second", "disposition");
        assert!(matches!(
            duplicate,
            Err(TelemetryError::Metric {
                operation: "register",
                ..
            })
        ));
        Ok(())
    }

    #[test]
    fn fresh_registry_reports_zero() -> Result<()> {
        let metrics = Metrics::new()?;
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.committed_total, 0);
        assert_eq!(snapshot.errors_total, 0);
        Ok(())
    }
}
