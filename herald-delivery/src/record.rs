//! Delivery records and their state machine
//!
//! ```text
//!            dispatch ok
//!   pending ───────────────▶ sent
//!     │  │   dispatch fails
//!     │  └─────────────────▶ failed ──┐
//!     │ cancel                 ▲      │ retry
//!     ▼                        └──────┘ (back to pending, immediate)
//!   cancelled
//! ```
//!
//! Every transition is a method on [`DeliveryRecord`] that checks its own
//! guard, so the store's atomic `modify` is all that is needed to make a
//! transition race-free.

use std::{collections::BTreeMap, fmt, str::FromStr};

use chrono::{DateTime, Utc};
use herald_common::{CompanyId, UserId};
use herald_store::{Record, RecordId};
use serde::{Deserialize, Serialize};

use crate::error::{GuardError, ValidationError};

/// Longest diagnostic kept in `last_error`, in characters
pub const MAX_ERROR_LEN: usize = 512;

/// A display name and address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mailbox {
    pub name: Option<String>,
    pub address: String,
}

impl Mailbox {
    #[must_use]
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            name: None,
            address: address.into(),
        }
    }

    #[must_use]
    pub fn named(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            address: address.into(),
        }
    }

    /// The display name, falling back to the address
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.address)
    }

    fn validate(&self, field: &'static str) -> Result<(), ValidationError> {
        let address = self.address.trim();
        if address.is_empty() {
            return Err(ValidationError::EmptyAddress { field });
        }

        match address.split_once('@') {
            Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(()),
            _ => Err(ValidationError::InvalidAddress {
                field,
                address: address.to_string(),
            }),
        }
    }
}

impl fmt::Display for Mailbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{name} <{}>", self.address),
            None => f.write_str(&self.address),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeliveryStatus {
    Pending,
    Sent,
    Failed,
    Cancelled,
}

impl DeliveryStatus {
    pub const ALL: [Self; 4] = [Self::Pending, Self::Sent, Self::Failed, Self::Cancelled];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Sent => "sent",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Whether automatic processing is finished with this record
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeliveryStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown delivery status: {s}"))
    }
}

/// A request to send one message, as submitted by a producer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewDelivery {
    pub sender: Mailbox,
    pub recipient: Mailbox,
    pub subject: String,
    pub body: String,
    pub template: Option<String>,
    pub variables: BTreeMap<String, String>,
    pub immediate: bool,
    pub due_at: Option<DateTime<Utc>>,
    pub created_by: UserId,
    pub company: Option<CompanyId>,
}

impl NewDelivery {
    /// Check the envelope and schedule
    ///
    /// A due time is required and must be strictly after `now` unless the
    /// delivery is immediate, in which case any due time is kept but ignored.
    ///
    /// # Errors
    /// The first [`ValidationError`] found.
    pub fn validate(&self, now: DateTime<Utc>) -> Result<(), ValidationError> {
        self.sender.validate("Sender")?;
        self.recipient.validate("Recipient")?;

        if self.subject.trim().is_empty() {
            return Err(ValidationError::EmptySubject);
        }

        if !self.immediate {
            match self.due_at {
                None => return Err(ValidationError::MissingDueAt),
                Some(due_at) if due_at <= now => {
                    return Err(ValidationError::DueAtNotInFuture { due_at });
                }
                Some(_) => {}
            }
        }

        Ok(())
    }

    /// Validate and turn the request into a fresh `Pending` record
    ///
    /// # Errors
    /// The first [`ValidationError`] found.
    pub fn into_record(self, now: DateTime<Utc>) -> Result<DeliveryRecord, ValidationError> {
        self.validate(now)?;

        Ok(DeliveryRecord {
            id: RecordId::generate(),
            sender: self.sender,
            recipient: self.recipient,
            subject: self.subject,
            body: self.body,
            template: self.template,
            variables: self.variables,
            immediate: self.immediate,
            due_at: self.due_at,
            status: DeliveryStatus::Pending,
            sent_at: None,
            failed_at: None,
            last_error: None,
            created_by: self.created_by,
            company: self.company,
            created_at: now,
            updated_at: now,
            attempts: 0,
        })
    }
}

/// A durable intent to send one message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryRecord {
    pub id: RecordId,

    pub sender: Mailbox,
    pub recipient: Mailbox,
    pub subject: String,
    pub body: String,
    pub template: Option<String>,
    pub variables: BTreeMap<String, String>,

    pub immediate: bool,
    pub due_at: Option<DateTime<Utc>>,

    pub status: DeliveryStatus,
    pub sent_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,

    pub created_by: UserId,
    pub company: Option<CompanyId>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Number of dispatch attempts that reached a verdict
    pub attempts: u32,
}

impl Record for DeliveryRecord {
    fn id(&self) -> &RecordId {
        &self.id
    }
}

impl DeliveryRecord {
    /// Pending and either immediate or past its due time
    #[must_use]
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == DeliveryStatus::Pending
            && (self.immediate || self.due_at.is_some_and(|due_at| due_at <= now))
    }

    /// `pending → sent`. Returns `false`, changing nothing, from any other state.
    pub fn mark_sent(&mut self, now: DateTime<Utc>) -> bool {
        if self.status != DeliveryStatus::Pending {
            return false;
        }

        self.status = DeliveryStatus::Sent;
        self.sent_at = Some(now);
        self.last_error = None;
        self.attempts = self.attempts.saturating_add(1);
        self.updated_at = now;
        true
    }

    /// `pending → failed`. Returns `false`, changing nothing, from any other state.
    pub fn mark_failed(&mut self, now: DateTime<Utc>, reason: &str) -> bool {
        if self.status != DeliveryStatus::Pending {
            return false;
        }

        self.status = DeliveryStatus::Failed;
        self.failed_at = Some(now);
        self.last_error = Some(truncate(reason));
        self.attempts = self.attempts.saturating_add(1);
        self.updated_at = now;
        true
    }

    /// `pending → cancelled`
    ///
    /// # Errors
    /// [`GuardError::NotCancellable`] from any other state.
    pub fn cancel(&mut self, now: DateTime<Utc>) -> Result<(), GuardError> {
        if self.status != DeliveryStatus::Pending {
            return Err(GuardError::NotCancellable {
                status: self.status,
            });
        }

        self.status = DeliveryStatus::Cancelled;
        self.updated_at = now;
        Ok(())
    }

    /// `failed → pending`, due immediately
    ///
    /// # Errors
    /// [`GuardError::NotRetryable`] from any other state.
    pub fn retry(&mut self, now: DateTime<Utc>) -> Result<(), GuardError> {
        if self.status != DeliveryStatus::Failed {
            return Err(GuardError::NotRetryable {
                status: self.status,
            });
        }

        self.status = DeliveryStatus::Pending;
        self.immediate = true;
        self.last_error = None;
        self.failed_at = None;
        self.updated_at = now;
        Ok(())
    }

    /// Whether the outcome metadata agrees with the status
    #[must_use]
    pub const fn is_consistent(&self) -> bool {
        match self.status {
            DeliveryStatus::Sent => self.sent_at.is_some() && self.last_error.is_none(),
            DeliveryStatus::Failed => self.failed_at.is_some() && self.last_error.is_some(),
            DeliveryStatus::Pending | DeliveryStatus::Cancelled => true,
        }
    }
}

fn truncate(reason: &str) -> String {
    reason.chars().take(MAX_ERROR_LEN).collect()
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn request(now: DateTime<Utc>) -> NewDelivery {
        NewDelivery {
            sender: Mailbox::named("Payroll", "payroll@example.com"),
            recipient: Mailbox::named("Ada", "ada@example.com"),
            subject: "Your payslip".to_string(),
            body: "Hello {{recipient_name}}".to_string(),
            template: None,
            variables: BTreeMap::new(),
            immediate: false,
            due_at: Some(now + Duration::minutes(5)),
            created_by: UserId::from("manager-1"),
            company: Some(CompanyId::from("acme")),
        }
    }

    #[test]
    fn test_validation_rules() {
        let now = Utc::now();
        assert!(request(now).validate(now).is_ok());

        let mut bad = request(now);
        bad.recipient.address = "  ".to_string();
        assert_eq!(
            bad.validate(now),
            Err(ValidationError::EmptyAddress { field: "Recipient" })
        );

        let mut bad = request(now);
        bad.sender.address = "payroll.example.com".to_string();
        assert!(matches!(
            bad.validate(now),
            Err(ValidationError::InvalidAddress { field: "Sender", .. })
        ));

        let mut bad = request(now);
        bad.subject = String::new();
        assert_eq!(bad.validate(now), Err(ValidationError::EmptySubject));

        let mut bad = request(now);
        bad.due_at = None;
        assert_eq!(bad.validate(now), Err(ValidationError::MissingDueAt));

        let mut bad = request(now);
        bad.due_at = Some(now);
        assert_eq!(
            bad.validate(now),
            Err(ValidationError::DueAtNotInFuture { due_at: now })
        );
    }

    #[test]
    fn test_immediate_keeps_but_ignores_due_at() {
        let now = Utc::now();
        let mut req = request(now);
        req.immediate = true;
        req.due_at = Some(now - Duration::days(1));

        let record = req.into_record(now).expect("immediate delivery is valid");
        assert_eq!(record.due_at, Some(now - Duration::days(1)));
        assert_eq!(record.status, DeliveryStatus::Pending);
        assert!(record.is_due(now));
    }

    #[test]
    fn test_due_predicate() {
        let now = Utc::now();
        let record = request(now).into_record(now).expect("valid");

        assert!(!record.is_due(now));
        assert!(record.is_due(now + Duration::minutes(5)));

        let mut cancelled = record;
        cancelled.cancel(now).expect("pending is cancellable");
        assert!(!cancelled.is_due(now + Duration::hours(1)));
    }

    #[test]
    fn test_sent_and_failed_outcomes_are_consistent() {
        let now = Utc::now();
        let mut sent = request(now).into_record(now).expect("valid");
        assert!(sent.mark_sent(now));
        assert!(sent.is_consistent());
        assert_eq!(sent.attempts, 1);
        assert!(!sent.mark_failed(now, "late failure"));
        assert_eq!(sent.status, DeliveryStatus::Sent);

        let mut failed = request(now).into_record(now).expect("valid");
        assert!(failed.mark_failed(now, &"x".repeat(2000)));
        assert!(failed.is_consistent());
        assert_eq!(
            failed.last_error.as_ref().map(|e| e.chars().count()),
            Some(MAX_ERROR_LEN)
        );
        assert!(!failed.mark_sent(now));
    }

    #[test]
    fn test_guards() {
        let now = Utc::now();
        let mut record = request(now).into_record(now).expect("valid");

        assert_eq!(
            record.retry(now),
            Err(GuardError::NotRetryable {
                status: DeliveryStatus::Pending
            })
        );

        assert!(record.mark_failed(now, "relay refused"));
        assert_eq!(
            record.cancel(now),
            Err(GuardError::NotCancellable {
                status: DeliveryStatus::Failed
            })
        );

        record.retry(now).expect("failed is retryable");
        assert_eq!(record.status, DeliveryStatus::Pending);
        assert!(record.immediate);
        assert!(record.last_error.is_none());
        assert!(record.failed_at.is_none());

        assert!(record.mark_sent(now));
        assert!(record.cancel(now).is_err());
        assert!(record.retry(now).is_err());
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!("Failed".parse(), Ok(DeliveryStatus::Failed));
        assert_eq!(" pending ".parse(), Ok(DeliveryStatus::Pending));
        assert!("queued".parse::<DeliveryStatus>().is_err());
    }
}
