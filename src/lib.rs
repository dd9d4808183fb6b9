//! An offline-first, multi-backend personal task synchronization engine.
//!
//! Lists and tasks live in a local [`store::TaskStore`] (SQLite) regardless
//! of whether a remote [`provider::RemoteProvider`] is reachable. Mutations
//! are recorded in a [`journal::SyncJournal`] and replayed by
//! [`sync::engine::SyncEngine`] whenever a reconciliation runs, so the CLI
//! never blocks on the network.
//!
//! ## Possible uses
//!
//! [`sync_aware_store::SyncAwareStore`] is the entry point most callers
//! want: it wraps [`store::TaskStore`] with background sync scheduling and
//! daemon awareness. A CLI or GUI talks to it, not to `TaskStore` directly,
//! unless it's implementing its own scheduling policy.
//!
//! The [`daemon`] module provides a long-running process that owns the
//! single write path to the remote provider; [`daemon::client::DaemonClient`]
//! is how other processes talk to it over its Unix-domain socket.
//!
//! Writing a new backend means implementing [`provider::RemoteProvider`];
//! `mock_provider` behind the `mock_provider` feature is a worked example
//! used by this crate's own integration tests.
//!
//! ## Configuration options
//!
//! See [`sync::engine::SyncEngineConfig`], [`daemon::DaemonConfig`], and
//! [`sync_aware_store::SyncAwareStoreConfig`] for the tunables this crate
//! exposes to its caller; it does not parse config files itself.

pub mod error;
pub mod model;

pub mod journal;
pub mod provider;
#[cfg(feature = "mock_provider")]
pub mod provider_mock;
pub mod store;
pub mod sync;
pub mod sync_aware_store;

pub mod cache;
pub mod daemon;
pub mod utils;

pub use error::{Error, ErrorKind, Result};
pub use journal::SyncJournal;
pub use model::{List, Task};
pub use provider::RemoteProvider;
pub use store::TaskStore;
pub use sync::{SyncEngine, SyncEngineConfig, SyncReport};
pub use sync_aware_store::SyncAwareStore;
