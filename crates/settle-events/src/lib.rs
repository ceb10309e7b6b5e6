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
#![allow(clippy::multiple_crate_versions)]

//! Completion event bus for the Settle workspace.
//!
//! The bus carries typed completion events with sequential identifiers and
//! replays recent events to subscribers that reconnect with a known id.
//! Internally it uses `tokio::broadcast` with a bounded buffer; when the channel
//! overflows, the oldest events are dropped.
//!
//! Layout: `payloads.rs` (event enum and envelope), `routing.rs` (`EventBus`).

pub mod payloads;
pub mod routing;

pub use payloads::{DEFAULT_REPLAY_CAPACITY, Event, EventEnvelope, EventId};
pub use routing::{EventBus, EventStream, EventStreamItem};
