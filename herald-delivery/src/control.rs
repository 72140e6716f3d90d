//! Producer and operator operations on delivery records
//!
//! Authorization is the caller's concern; these functions only enforce the
//! state guards. A rejected guard leaves the record untouched.

use chrono::{DateTime, Utc};
use herald_common::{CompanyId, UserId, audit, tracing::info};
use herald_store::{BackingStore, Modify, RecordId};
use serde::{Deserialize, Serialize};

use crate::{
    error::{DeliveryError, GuardError},
    record::{DeliveryRecord, DeliveryStatus, NewDelivery},
};

const fn default_page_limit() -> usize {
    50
}

/// Which records a listing should include; `None` fields match anything
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryFilter {
    pub status: Option<DeliveryStatus>,
    pub created_by: Option<UserId>,
    pub company: Option<CompanyId>,
}

impl DeliveryFilter {
    #[must_use]
    pub fn matches(&self, record: &DeliveryRecord) -> bool {
        self.status.is_none_or(|status| record.status == status)
            && self
                .created_by
                .as_ref()
                .is_none_or(|user| &record.created_by == user)
            && self
                .company
                .as_ref()
                .is_none_or(|company| record.company.as_ref() == Some(company))
    }
}

/// Offset pagination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    #[serde(default)]
    pub offset: usize,
    #[serde(default = "default_page_limit")]
    pub limit: usize,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: default_page_limit(),
        }
    }
}

/// Record counts by status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryStats {
    pub pending: usize,
    pub sent: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl DeliveryStats {
    #[must_use]
    pub const fn total(&self) -> usize {
        self.pending + self.sent + self.failed + self.cancelled
    }

    fn count(&mut self, status: DeliveryStatus) {
        match status {
            DeliveryStatus::Pending => self.pending += 1,
            DeliveryStatus::Sent => self.sent += 1,
            DeliveryStatus::Failed => self.failed += 1,
            DeliveryStatus::Cancelled => self.cancelled += 1,
        }
    }
}

/// Validate and store a new pending delivery
///
/// # Errors
/// [`DeliveryError::Validation`] for a bad request, or a store error.
pub async fn create_delivery(
    store: &dyn BackingStore<DeliveryRecord>,
    request: NewDelivery,
    now: DateTime<Utc>,
) -> Result<DeliveryRecord, DeliveryError> {
    let record = request.into_record(now)?;
    store.insert(&record).await?;

    let due = if record.immediate {
        "immediate".to_string()
    } else {
        record
            .due_at
            .map_or_else(|| "unscheduled".to_string(), |due| due.to_rfc3339())
    };

    info!(record_id = %record.id, due = %due, "Delivery created");
    audit::log_delivery_created(
        &record.id.to_string(),
        &record.recipient.address,
        record.created_by.as_str(),
        &due,
    );

    Ok(record)
}

/// `pending → cancelled`
///
/// A send already in flight is not interrupted, but its outcome will not
/// overwrite the cancellation.
///
/// # Errors
/// [`GuardError::NotCancellable`] unless the record is pending, or a store error.
pub async fn cancel_delivery(
    store: &dyn BackingStore<DeliveryRecord>,
    id: &RecordId,
    now: DateTime<Utc>,
) -> Result<DeliveryRecord, DeliveryError> {
    match store
        .modify(id, Box::new(move |record: &mut DeliveryRecord| record.cancel(now).is_ok()))
        .await?
    {
        Modify::Applied(record) => {
            info!(record_id = %id, "Delivery cancelled");
            audit::log_delivery_cancelled(&id.to_string());
            Ok(record)
        }
        Modify::Unchanged(record) => Err(GuardError::NotCancellable {
            status: record.status,
        }
        .into()),
    }
}

/// `failed → pending`, due immediately
///
/// # Errors
/// [`GuardError::NotRetryable`] unless the record has failed, or a store error.
pub async fn retry_delivery(
    store: &dyn BackingStore<DeliveryRecord>,
    id: &RecordId,
    now: DateTime<Utc>,
) -> Result<DeliveryRecord, DeliveryError> {
    match store
        .modify(id, Box::new(move |record: &mut DeliveryRecord| record.retry(now).is_ok()))
        .await?
    {
        Modify::Applied(record) => {
            info!(record_id = %id, "Delivery queued for retry");
            audit::log_delivery_retried(&id.to_string());
            Ok(record)
        }
        Modify::Unchanged(record) => Err(GuardError::NotRetryable {
            status: record.status,
        }
        .into()),
    }
}

/// # Errors
/// A store error, including not-found.
pub async fn get_delivery(
    store: &dyn BackingStore<DeliveryRecord>,
    id: &RecordId,
) -> Result<DeliveryRecord, DeliveryError> {
    Ok(store.read(id).await?)
}

/// Matching records, newest first, one page of them
///
/// # Errors
/// A store error.
pub async fn list_deliveries(
    store: &dyn BackingStore<DeliveryRecord>,
    filter: &DeliveryFilter,
    page: Page,
) -> Result<Vec<DeliveryRecord>, DeliveryError> {
    let matching = store
        .scan(&|record: &DeliveryRecord| filter.matches(record), None)
        .await?;

    Ok(matching
        .into_iter()
        .rev()
        .skip(page.offset)
        .take(page.limit)
        .collect())
}

/// # Errors
/// A store error.
pub async fn delivery_stats(
    store: &dyn BackingStore<DeliveryRecord>,
    filter: &DeliveryFilter,
) -> Result<DeliveryStats, DeliveryError> {
    let matching = store
        .scan(&|record: &DeliveryRecord| filter.matches(record), None)
        .await?;

    let mut stats = DeliveryStats::default();
    for record in &matching {
        stats.count(record.status);
    }
    Ok(stats)
}
