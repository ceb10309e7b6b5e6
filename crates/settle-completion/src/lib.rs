//! Commit-or-rollback completion for consumed resources.
//!
//! After a resource (typically a file) has been processed, [`CompletionHandler`]
//! drives exactly one terminal disposition: the resource is committed (and its
//! key recorded for deduplication) or a rollback is attempted. Errors raised while
//! deciding are funnelled to an [`ExceptionReporter`] and never reach the caller.
#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::cargo,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]
#![allow(clippy::module_name_repetitions, clippy::multiple_crate_versions)]

pub mod error;
pub mod handler;
pub mod model;
pub mod reporter;
pub mod repository;
pub mod strategy;

pub use error::{
    BoxError, CompletionError, ErrorKind, PanicPayload, Panicked, RepositoryError,
    RepositoryResult, StrategyError, StrategyResult,
};
pub use handler::{CompletionHandler, CompletionHandlerBuilder};
pub use model::{
    CompletionContext, Disposition, FileResource, OutcomeStatus, ProcessingOutcome, Resource,
    ResourceKey,
};
pub use reporter::{EventBusReporter, ExceptionReporter, LoggingExceptionReporter};
pub use repository::{
    DEFAULT_CACHE_CAPACITY, IdempotentRepository, KeyCache, MemoryIdempotentRepository,
};
pub use strategy::CommitRollbackStrategy;
