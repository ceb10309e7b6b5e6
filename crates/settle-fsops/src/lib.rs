//! Local filesystem transport for the completion handler.
//!
//! Layout: `strategy.rs` (commit/rollback of files on disk), `repository.rs`
//! (durable key store), `bootstrap.rs` (settings to handler wiring), `error.rs`.
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

pub mod bootstrap;
pub mod error;
pub mod repository;
pub mod strategy;

pub use bootstrap::{build_handler, install_logging};
pub use error::{FsOpsError, FsOpsResult};
pub use repository::FileIdempotentRepository;
pub use strategy::{CommitAction, LocalFileStrategy, RollbackAction};
