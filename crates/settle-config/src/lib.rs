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
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]

//! File-backed configuration for completion handlers.
//!
//! Layout: `model.rs` (typed settings and defaults), `validate.rs`
//! (validation helpers), `loader.rs` (JSON documents and environment overrides).

pub mod error;
pub mod loader;
pub mod model;
pub mod validate;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ENV_PREFIX, load_from_env, load_from_path};
pub use model::{
    CommitActionSettings, CompletionSettings, LoggingSettings, RepositorySettings,
    RollbackActionSettings, StrategySettings,
};
pub use validate::validate_settings;
