//! Typed error handling for delivery operations.
//!
//! - Validation errors reject a delivery at creation time
//! - Guard errors reject a control operation on a record in the wrong state
//! - Transport errors are never returned to callers; they become the
//!   `last_error` of a failed record

use std::time::Duration;

use chrono::{DateTime, Utc};
use herald_store::StoreError;
use thiserror::Error;

use crate::record::DeliveryStatus;

/// Top-level delivery error type.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The delivery request was malformed.
    #[error("Invalid delivery: {0}")]
    Validation(#[from] ValidationError),

    /// The record is not in a state that permits the operation.
    #[error(transparent)]
    Guard(#[from] GuardError),

    /// The record store failed or could not be reached.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Delivery processor not initialized.
    #[error("Delivery processor not initialized: {0}")]
    NotInitialized(String),
}

impl DeliveryError {
    /// Returns `true` if the error means no such record exists.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::Store(StoreError::NotFound(_)))
    }

    /// Returns `true` if the caller asked for something invalid, as opposed
    /// to the system failing.
    #[must_use]
    pub const fn is_rejection(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::Guard(_)) || self.is_not_found()
    }
}

/// Envelope and schedule validation failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field} address is empty")]
    EmptyAddress { field: &'static str },

    #[error("{field} address is not a valid address: {address}")]
    InvalidAddress { field: &'static str, address: String },

    #[error("Subject is empty")]
    EmptySubject,

    #[error("A scheduled delivery needs a due time")]
    MissingDueAt,

    #[error("Due time {due_at} is not in the future")]
    DueAtNotInFuture { due_at: DateTime<Utc> },
}

/// State guard violations from the control operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GuardError {
    #[error("Delivery is {status} and cannot be cancelled")]
    NotCancellable { status: DeliveryStatus },

    #[error("Delivery is {status} and cannot be retried")]
    NotRetryable { status: DeliveryStatus },
}

/// Failures reported by a [`crate::Transport`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("Send timed out after {0:?}")]
    Timeout(Duration),

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Rejected by relay: {0}")]
    Rejected(String),
}

impl TransportError {
    /// Short label used to tag failure metrics
    #[must_use]
    pub const fn category(&self) -> &'static str {
        match self {
            Self::Timeout(_) => "timeout",
            Self::Connection(_) => "connection",
            Self::Rejected(_) => "rejected",
        }
    }
}

#[cfg(test)]
mod tests {
    use herald_store::RecordId;

    use super::*;

    #[test]
    fn test_rejections_are_distinguished_from_failures() {
        assert!(DeliveryError::from(ValidationError::EmptySubject).is_rejection());
        assert!(
            DeliveryError::from(GuardError::NotRetryable {
                status: DeliveryStatus::Sent
            })
            .is_rejection()
        );

        let missing = DeliveryError::from(StoreError::NotFound(RecordId::generate()));
        assert!(missing.is_not_found());
        assert!(missing.is_rejection());

        let outage = DeliveryError::from(StoreError::Unavailable("down".to_string()));
        assert!(!outage.is_rejection());
    }

    #[test]
    fn test_guard_error_names_the_status() {
        let err = GuardError::NotCancellable {
            status: DeliveryStatus::Sent,
        };
        assert_eq!(err.to_string(), "Delivery is sent and cannot be cancelled");
    }
}
