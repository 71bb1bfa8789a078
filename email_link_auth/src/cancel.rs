//! Caller-driven cancellation for engine operations
//!
//! A [`Cancellation`] handle is shared between the caller and the engine.
//! Every storage call checks it first, so a cancelled request stops before
//! touching the database and reports a distinct error instead of a generic
//! storage failure.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::storage::StorageError;

#[derive(Debug, Clone, Default)]
pub struct Cancellation {
    cancelled: Arc<AtomicBool>,
}

impl Cancellation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. All clones observe it.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
        tracing::debug!("Cancellation requested");
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    pub(crate) fn check(&self) -> Result<(), StorageError> {
        if self.is_cancelled() {
            return Err(StorageError::Cancelled);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_handle_is_active() {
        let cancel = Cancellation::new();
        assert!(!cancel.is_cancelled());
        assert!(cancel.check().is_ok());
    }

    #[test]
    fn test_cancel_is_visible_through_clones() {
        let cancel = Cancellation::new();
        let observer = cancel.clone();

        cancel.cancel();

        assert!(observer.is_cancelled());
        assert!(matches!(observer.check(), Err(StorageError::Cancelled)));
    }
}
