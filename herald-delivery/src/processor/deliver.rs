//! Per-record delivery: re-check, render, send, settle

use chrono::Utc;
use herald_common::{
    audit,
    tracing::{debug, error, info, warn},
};
use herald_store::{Modify, RecordId, StoreError};

use super::dispatch::{DispatchOutcome, Dispatcher};
use crate::{
    record::{DeliveryRecord, DeliveryStatus},
    template::Template,
    transport::{OutboundMessage, send_with_timeout},
};

/// Why a send did not succeed
#[derive(Debug)]
pub(super) struct Failure {
    reason: String,
    category: &'static str,
}

impl Failure {
    pub(super) const fn new(reason: String, category: &'static str) -> Self {
        Self { reason, category }
    }
}

/// Deliver one record
///
/// The record is re-read first: a sweep's snapshot may be stale by the time
/// its group comes up, and a record cancelled in the meantime must not be
/// sent.
pub(super) async fn deliver(dispatcher: &Dispatcher, id: RecordId) -> DispatchOutcome {
    let record = match dispatcher.store.read(&id).await {
        Ok(record) => record,
        Err(e @ StoreError::NotFound(_)) => {
            info!(record_id = %id, "Delivery was removed before sending, dropping it");
            return DispatchOutcome::Unrecorded {
                id,
                error: e.to_string(),
            };
        }
        Err(e) => {
            warn!(record_id = %id, error = %e, "Could not re-read delivery before sending");
            return DispatchOutcome::Unrecorded {
                id,
                error: e.to_string(),
            };
        }
    };

    if record.status != DeliveryStatus::Pending {
        debug!(record_id = %id, status = %record.status, "Delivery no longer pending, skipping");
        record_skipped();
        return DispatchOutcome::Skipped {
            id,
            status: record.status,
        };
    }

    let template = Template::resolve(record.template.as_deref());
    let rendered = dispatcher.renderer.render(template, &record);
    let message = OutboundMessage::new(id, record.sender, record.recipient, rendered);

    let failure = send_with_timeout(
        dispatcher.transport.as_ref(),
        &message,
        dispatcher.send_timeout(),
    )
    .await
    .err()
    .map(|e| Failure::new(e.to_string(), e.category()));

    settle(dispatcher, id, failure).await
}

/// Apply the outcome of a send to the stored record
///
/// The transition is guarded: if the record left `Pending` while the send
/// was in flight (it was cancelled, say), it is not overwritten.
pub(super) async fn settle(
    dispatcher: &Dispatcher,
    id: RecordId,
    failure: Option<Failure>,
) -> DispatchOutcome {
    let now = Utc::now();
    let reason = failure.as_ref().map(|f| f.reason.clone());

    let transition = dispatcher
        .store
        .modify(
            &id,
            Box::new(move |record: &mut DeliveryRecord| match &reason {
                None => record.mark_sent(now),
                Some(reason) => record.mark_failed(now, reason),
            }),
        )
        .await;

    match transition {
        Ok(Modify::Applied(record)) => match failure {
            None => {
                info!(record_id = %id, recipient = %record.recipient.address, "Delivery sent");
                audit::log_delivery_sent(
                    &id.to_string(),
                    &record.recipient.address,
                    record.attempts,
                );
                if let Some(metrics) = herald_metrics::metrics() {
                    metrics.delivery.record_sent();
                }
                DispatchOutcome::Sent { id }
            }
            Some(failure) => {
                let reason = record.last_error.clone().unwrap_or(failure.reason);
                warn!(record_id = %id, error = %reason, "Delivery failed");
                audit::log_delivery_failed(
                    &id.to_string(),
                    &record.recipient.address,
                    &reason,
                    record.attempts,
                );
                if let Some(metrics) = herald_metrics::metrics() {
                    metrics.delivery.record_failed(failure.category);
                }
                DispatchOutcome::Failed { id, reason }
            }
        },
        Ok(Modify::Unchanged(record)) => {
            info!(
                record_id = %id,
                status = %record.status,
                "Delivery changed state while sending, leaving it as it is"
            );
            record_skipped();
            DispatchOutcome::Skipped {
                id,
                status: record.status,
            }
        }
        Err(e) => {
            error!(record_id = %id, error = %e, "Could not record delivery outcome");
            DispatchOutcome::Unrecorded {
                id,
                error: e.to_string(),
            }
        }
    }
}

fn record_skipped() {
    if let Some(metrics) = herald_metrics::metrics() {
        metrics.delivery.record_skipped();
    }
}
