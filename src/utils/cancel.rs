//! A minimal cooperative cancellation handle.
//!
//! [`crate::sync::engine::SyncEngine::reconcile`] and `pull_only` accept one
//! of these and check it between each list/task they process, so a caller
//! can cut off a long pull partway through. `TaskStore`'s own operations are
//! single transactions and don't take one: there's no intermediate point to
//! check mid-statement. Callers cancel by calling [`Cancellation::cancel`]
//! from another thread or task.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{Error, Result};

#[derive(Clone, Default)]
pub struct Cancellation(Arc<AtomicBool>);

impl Cancellation {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Short-circuit with `Error::Cancelled` if cancellation has fired.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}
