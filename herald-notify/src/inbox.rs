//! Read side of the notification collection

use std::sync::Arc;

use chrono::Utc;
use herald_common::{UserId, tracing::debug};
use herald_store::{BackingStore, Modify, RecordId};

use crate::{error::NotifyError, record::NotificationRecord};

/// One user's view of their notifications
#[derive(Debug, Clone)]
pub struct Inbox {
    store: Arc<dyn BackingStore<NotificationRecord>>,
}

impl Inbox {
    #[must_use]
    pub fn new(store: Arc<dyn BackingStore<NotificationRecord>>) -> Self {
        Self { store }
    }

    /// A recipient's notifications, newest first
    ///
    /// # Errors
    /// A store error.
    pub async fn list(
        &self,
        recipient: &UserId,
        unread_only: bool,
    ) -> Result<Vec<NotificationRecord>, NotifyError> {
        let mut records = self
            .store
            .scan(
                &|record: &NotificationRecord| {
                    &record.recipient == recipient && !(unread_only && record.is_read)
                },
                None,
            )
            .await?;
        records.reverse();
        Ok(records)
    }

    /// # Errors
    /// Not-found, or another store error.
    pub async fn get(&self, id: &RecordId) -> Result<NotificationRecord, NotifyError> {
        Ok(self.store.read(id).await?)
    }

    /// Mark one notification read. Reading it again changes nothing.
    ///
    /// # Errors
    /// Not-found, or another store error.
    pub async fn mark_read(&self, id: &RecordId) -> Result<NotificationRecord, NotifyError> {
        let now = Utc::now();
        let record = self
            .store
            .modify(id, Box::new(move |record: &mut NotificationRecord| record.mark_read(now)))
            .await?;

        if record.is_applied() {
            debug!(record_id = %id, "Notification marked read");
        }
        Ok(record.into_inner())
    }

    /// Mark every unread notification of `recipient` read
    ///
    /// Returns how many changed, so a second call returns 0.
    ///
    /// # Errors
    /// A store error. Records marked before the error stay read.
    pub async fn mark_all_read(&self, recipient: &UserId) -> Result<usize, NotifyError> {
        let unread = self.list(recipient, true).await?;
        if unread.is_empty() {
            return Ok(0);
        }

        let now = Utc::now();
        let mut changed = 0;
        for record in unread {
            let outcome = self
                .store
                .modify(
                    &record.id,
                    Box::new(move |record: &mut NotificationRecord| record.mark_read(now)),
                )
                .await?;
            if let Modify::Applied(_) = outcome {
                changed += 1;
            }
        }

        debug!(recipient = %recipient, changed, "Notifications marked read");
        Ok(changed)
    }

    /// # Errors
    /// A store error.
    pub async fn unread_count(&self, recipient: &UserId) -> Result<usize, NotifyError> {
        Ok(self.list(recipient, true).await?.len())
    }
}
