//! Utilities to track and report the progress of a sync cycle.

use std::fmt::{Display, Formatter};

/// An event emitted as a reconciliation proceeds.
#[derive(Clone, Debug)]
pub enum SyncEvent {
    NotStarted,
    Started,
    /// One list is being reconciled.
    ListInProgress { list_name: String, detail: String },
    Finished { success: bool },
}

impl Display for SyncEvent {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncEvent::NotStarted => write!(f, "not started"),
            SyncEvent::Started => write!(f, "sync started..."),
            SyncEvent::ListInProgress { list_name, detail } => {
                write!(f, "[{list_name}] {detail}...")
            }
            SyncEvent::Finished { success: true } => write!(f, "sync finished"),
            SyncEvent::Finished { success: false } => write!(f, "sync finished with errors"),
        }
    }
}

impl Default for SyncEvent {
    fn default() -> Self {
        Self::NotStarted
    }
}

pub type FeedbackSender = tokio::sync::watch::Sender<SyncEvent>;
pub type FeedbackReceiver = tokio::sync::watch::Receiver<SyncEvent>;

pub fn feedback_channel() -> (FeedbackSender, FeedbackReceiver) {
    tokio::sync::watch::channel(SyncEvent::default())
}

/// Tracks the error count of one reconciliation and optionally forwards
/// progress to a feedback channel (used by a daemon or CLI to show "syncing
/// list X..." while a background sync is in flight).
pub struct SyncProgress {
    n_errors: u32,
    n_warnings: u32,
    feedback: Option<FeedbackSender>,
}

impl SyncProgress {
    pub fn new() -> Self {
        Self {
            n_errors: 0,
            n_warnings: 0,
            feedback: None,
        }
    }

    pub fn with_feedback_channel(feedback: FeedbackSender) -> Self {
        Self {
            n_errors: 0,
            n_warnings: 0,
            feedback: Some(feedback),
        }
    }

    pub fn is_success(&self) -> bool {
        self.n_errors == 0
    }

    pub fn n_errors(&self) -> u32 {
        self.n_errors
    }

    pub fn n_warnings(&self) -> u32 {
        self.n_warnings
    }

    pub fn error(&mut self, text: &str) {
        log::error!("{text}");
        self.n_errors += 1;
    }

    pub fn warn(&mut self, text: &str) {
        log::warn!("{text}");
        self.n_warnings += 1;
    }

    pub fn info(&mut self, text: &str) {
        log::info!("{text}");
    }

    pub fn debug(&mut self, text: &str) {
        log::debug!("{text}");
    }

    pub fn feedback(&self, event: SyncEvent) {
        if let Some(sender) = &self.feedback {
            let _ = sender.send(event);
        }
    }
}

impl Default for SyncProgress {
    fn default() -> Self {
        Self::new()
    }
}
