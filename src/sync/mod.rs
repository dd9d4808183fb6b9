//! Reconciliation: pushing queued local changes to a provider, pulling
//! remote state back, and resolving the conflicts that surfaces.

pub mod conflict;
pub mod engine;
pub mod progress;

pub use conflict::{resolve, ConflictStrategy, Resolution};
pub use engine::{OfflineMode, StatusMapping, SyncEngine, SyncEngineConfig, SyncReport};
pub use progress::{feedback_channel, FeedbackReceiver, FeedbackSender, SyncEvent, SyncProgress};
