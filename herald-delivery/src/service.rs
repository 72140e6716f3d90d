//! Service trait abstraction for delivery operations
//!
//! Decouples control interfaces (the control socket handler) from the
//! concrete [`DeliveryProcessor`], and gives tests something to mock.

use async_trait::async_trait;
use chrono::Utc;
use herald_store::RecordId;

use crate::{
    DeliveryProcessor,
    control::{self, DeliveryFilter, DeliveryStats, Page},
    error::DeliveryError,
    processor::sweep::SweepOutcome,
    record::{DeliveryRecord, NewDelivery},
};

/// Operations on scheduled deliveries
///
/// # Example
///
/// ```rust,ignore
/// async fn pending(service: &dyn DeliveryService) -> usize {
///     service.delivery_stats(&DeliveryFilter::default()).await.map_or(0, |s| s.pending)
/// }
/// ```
#[async_trait]
pub trait DeliveryService: Send + Sync {
    /// Validate and store a new delivery
    async fn create_delivery(&self, request: NewDelivery) -> Result<DeliveryRecord, DeliveryError>;

    async fn get_delivery(&self, id: &RecordId) -> Result<DeliveryRecord, DeliveryError>;

    /// Matching records, newest first
    async fn list_deliveries(
        &self,
        filter: &DeliveryFilter,
        page: Page,
    ) -> Result<Vec<DeliveryRecord>, DeliveryError>;

    /// Cancel a pending delivery
    async fn cancel_delivery(&self, id: &RecordId) -> Result<DeliveryRecord, DeliveryError>;

    /// Put a failed delivery back in line, due immediately
    async fn retry_delivery(&self, id: &RecordId) -> Result<DeliveryRecord, DeliveryError>;

    async fn delivery_stats(&self, filter: &DeliveryFilter) -> Result<DeliveryStats, DeliveryError>;

    /// Trigger a sweep outside the timer, subject to the same single-flight guard
    async fn process_now(&self) -> Result<SweepOutcome, DeliveryError>;
}

#[async_trait]
impl DeliveryService for DeliveryProcessor {
    async fn create_delivery(&self, request: NewDelivery) -> Result<DeliveryRecord, DeliveryError> {
        control::create_delivery(self.store()?.as_ref(), request, Utc::now()).await
    }

    async fn get_delivery(&self, id: &RecordId) -> Result<DeliveryRecord, DeliveryError> {
        control::get_delivery(self.store()?.as_ref(), id).await
    }

    async fn list_deliveries(
        &self,
        filter: &DeliveryFilter,
        page: Page,
    ) -> Result<Vec<DeliveryRecord>, DeliveryError> {
        control::list_deliveries(self.store()?.as_ref(), filter, page).await
    }

    async fn cancel_delivery(&self, id: &RecordId) -> Result<DeliveryRecord, DeliveryError> {
        control::cancel_delivery(self.store()?.as_ref(), id, Utc::now()).await
    }

    async fn retry_delivery(&self, id: &RecordId) -> Result<DeliveryRecord, DeliveryError> {
        control::retry_delivery(self.store()?.as_ref(), id, Utc::now()).await
    }

    async fn delivery_stats(&self, filter: &DeliveryFilter) -> Result<DeliveryStats, DeliveryError> {
        control::delivery_stats(self.store()?.as_ref(), filter).await
    }

    async fn process_now(&self) -> Result<SweepOutcome, DeliveryError> {
        self.sweep().await
    }
}
