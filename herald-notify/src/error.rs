use std::time::Duration;

use herald_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Notifier not initialized: {0}")]
    NotInitialized(String),
}

impl NotifyError {
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::Store(StoreError::NotFound(_)))
    }
}

/// Why a real-time push did not reach its recipient
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PublishError {
    /// Nobody is listening on the channel right now
    #[error("No subscribers on {0}")]
    Offline(String),

    #[error("Push timed out after {0:?}")]
    Timeout(Duration),

    #[error("Push rejected: {0}")]
    Rejected(String),
}
