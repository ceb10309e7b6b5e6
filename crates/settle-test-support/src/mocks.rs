//! Recording fakes for the completion collaborators.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use settle_completion::{
    CommitRollbackStrategy, CompletionContext, CompletionError, ErrorKind, ExceptionReporter,
    IdempotentRepository, MemoryIdempotentRepository, RepositoryError, RepositoryResult,
    Resource, ResourceKey, StrategyError, StrategyResult,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Strategy call observed by [`RecordingStrategy`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StrategyCall {
    /// `commit` was invoked for the key.
    Commit(ResourceKey),
    /// `rollback` was invoked for the key.
    Rollback(ResourceKey),
}

/// Strategy that records every call and fails on demand.
#[derive(Debug, Default)]
pub struct RecordingStrategy {
    calls: Mutex<Vec<StrategyCall>>,
    contexts: Mutex<Vec<CompletionContext>>,
    fail_commit: AtomicBool,
    fail_rollback: AtomicBool,
    panic_commit: AtomicBool,
}

impl RecordingStrategy {
    /// Strategy whose commit and rollback both succeed.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent commit fail with an I/O error.
    #[must_use]
    pub fn failing_commit(self) -> Self {
        self.fail_commit.store(true, Ordering::SeqCst);
        self
    }

    /// Make every subsequent rollback fail with an I/O error.
    #[must_use]
    pub fn failing_rollback(self) -> Self {
        self.fail_rollback.store(true, Ordering::SeqCst);
        self
    }

    /// Make every subsequent commit panic.
    #[must_use]
    pub fn panicking_commit(self) -> Self {
        self.panic_commit.store(true, Ordering::SeqCst);
        self
    }

    /// Calls observed so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<StrategyCall> {
        lock(&self.calls).clone()
    }

    /// Contexts passed to the strategy, in call order.
    #[must_use]
    pub fn contexts(&self) -> Vec<CompletionContext> {
        lock(&self.contexts).clone()
    }

    /// Number of `commit` calls.
    #[must_use]
    pub fn commits(&self) -> usize {
        lock(&self.calls)
            .iter()
            .filter(|call| matches!(call, StrategyCall::Commit(_)))
            .count()
    }

    /// Number of `rollback` calls.
    #[must_use]
    pub fn rollbacks(&self) -> usize {
        lock(&self.calls)
            .iter()
            .filter(|call| matches!(call, StrategyCall::Rollback(_)))
            .count()
    }

    fn record(&self, call: StrategyCall, context: &CompletionContext) {
        lock(&self.calls).push(call);
        lock(&self.contexts).push(context.clone());
    }
}

impl<R: Resource> CommitRollbackStrategy<R> for RecordingStrategy {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn commit(&self, resource: &R, context: &CompletionContext) -> StrategyResult<()> {
        self.record(StrategyCall::Commit(resource.key()), context);
        assert!(
            !self.panic_commit.load(Ordering::SeqCst),
            "recording strategy commit panicked"
        );
        if self.fail_commit.load(Ordering::SeqCst) {
            return Err(StrategyError::new(
                "commit",
                io::Error::other("commit target unavailable"),
            ));
        }
        Ok(())
    }

    fn rollback(&self, resource: &R, context: &CompletionContext) -> StrategyResult<()> {
        self.record(StrategyCall::Rollback(resource.key()), context);
        if self.fail_rollback.load(Ordering::SeqCst) {
            return Err(StrategyError::new(
                "rollback",
                io::Error::other("rollback target unavailable"),
            ));
        }
        Ok(())
    }
}

/// In-memory repository that records writes and fails on demand.
#[derive(Debug, Default)]
pub struct RecordingRepository {
    inner: MemoryIdempotentRepository,
    adds: Mutex<Vec<ResourceKey>>,
    fail_add: AtomicBool,
}

impl RecordingRepository {
    /// Repository whose writes succeed.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `add` fail with an I/O error.
    #[must_use]
    pub fn failing_add(self) -> Self {
        self.fail_add.store(true, Ordering::SeqCst);
        self
    }

    /// Keys passed to `add`, in order, including failed attempts.
    #[must_use]
    pub fn adds(&self) -> Vec<ResourceKey> {
        lock(&self.adds).clone()
    }
}

impl IdempotentRepository for RecordingRepository {
    fn add(&self, key: &ResourceKey) -> RepositoryResult<bool> {
        lock(&self.adds).push(key.clone());
        if self.fail_add.load(Ordering::SeqCst) {
            return Err(RepositoryError::new(
                "add",
                io::Error::other("repository store unavailable"),
            ));
        }
        self.inner.add(key)
    }

    fn contains(&self, key: &ResourceKey) -> RepositoryResult<bool> {
        self.inner.contains(key)
    }

    fn remove(&self, key: &ResourceKey) -> RepositoryResult<bool> {
        self.inner.remove(key)
    }
}

/// Reporter that keeps every error it receives.
#[derive(Debug, Default)]
pub struct CapturingReporter {
    errors: Mutex<Vec<CompletionError>>,
}

impl CapturingReporter {
    /// Empty reporter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of captured errors.
    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.errors).len()
    }

    /// Whether nothing was captured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        lock(&self.errors).is_empty()
    }

    /// Kinds of the captured errors, in report order.
    #[must_use]
    pub fn kinds(&self) -> Vec<ErrorKind> {
        lock(&self.errors).iter().map(CompletionError::kind).collect()
    }

    /// Rendered source chains of the captured errors, in report order.
    #[must_use]
    pub fn chains(&self) -> Vec<String> {
        lock(&self.errors).iter().map(CompletionError::chain).collect()
    }

    /// Remove and return every captured error.
    #[must_use]
    pub fn take(&self) -> Vec<CompletionError> {
        std::mem::take(&mut *lock(&self.errors))
    }
}

impl ExceptionReporter for CapturingReporter {
    fn report(&self, error: CompletionError) {
        lock(&self.errors).push(error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use settle_completion::FileResource;
    use std::sync::Arc;

    fn context() -> CompletionContext {
        CompletionContext::new(Arc::from("inbox"), false)
    }

    #[test]
    fn recording_strategy_counts_calls_and_fails_on_demand() {
        let strategy = RecordingStrategy::new().failing_rollback();
        let file = FileResource::new("a.csv", "/in/a.csv");

        assert!(strategy.commit(&file, &context()).is_ok());
        assert!(strategy.rollback(&file, &context()).is_err());
        assert_eq!(strategy.commits(), 1);
        assert_eq!(strategy.rollbacks(), 1);
        assert_eq!(
            strategy.calls(),
            vec![
                StrategyCall::Commit(ResourceKey::from("a.csv")),
                StrategyCall::Rollback(ResourceKey::from("a.csv")),
            ]
        );
        assert_eq!(strategy.contexts().len(), 2);
    }

    #[test]
    fn recording_repository_records_failed_adds() {
        let repository = RecordingRepository::new().failing_add();
        let key = ResourceKey::from("a.csv");
        assert!(repository.add(&key).is_err());
        assert_eq!(repository.adds(), vec![key.clone()]);
        assert!(matches!(repository.contains(&key), Ok(false)));
    }

    #[test]
    fn capturing_reporter_drains_on_take() {
        let reporter = CapturingReporter::new();
        reporter.report(CompletionError::Rollback {
            key: ResourceKey::from("a.csv"),
            source: StrategyError::new("rollback", io::Error::other("denied")),
        });
        assert_eq!(reporter.kinds(), vec![ErrorKind::Rollback]);
        assert_eq!(reporter.len(), 1);
        assert_eq!(reporter.take().len(), 1);
        assert!(reporter.is_empty());
    }
}
