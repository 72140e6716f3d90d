//! Single-flight sweep for due deliveries

use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use herald_common::tracing::{debug, error, info};
use tokio::time::Instant;

use super::dispatch::{DispatchOutcome, Dispatcher};
use crate::record::DeliveryRecord;

/// Result of one trigger of the poller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SweepOutcome {
    /// The sweep ran; here is what it did
    Completed(SweepReport),
    /// Another sweep held the guard, so this trigger did nothing
    AlreadyRunning,
    /// The store could not be queried; nothing was dispatched
    Aborted(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Number of due records selected
    pub due: usize,
    pub outcomes: Vec<DispatchOutcome>,
}

impl SweepReport {
    #[must_use]
    pub fn sent(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_sent()).count()
    }

    #[must_use]
    pub fn failed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_failed()).count()
    }

    #[must_use]
    pub fn skipped(&self) -> usize {
        self.outcomes.len() - self.sent() - self.failed()
    }
}

/// Holds the in-flight flag for as long as it lives
///
/// Released on drop, so every exit from a sweep clears the flag: normal
/// return, early return, and unwinding.
#[derive(Debug)]
pub(crate) struct SweepGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> SweepGuard<'a> {
    pub(crate) fn try_acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for SweepGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Select up to `limit` due records, oldest first, and dispatch them
pub(crate) async fn sweep(flag: &AtomicBool, dispatcher: &Dispatcher, limit: usize) -> SweepOutcome {
    let Some(_guard) = SweepGuard::try_acquire(flag) else {
        debug!("Sweep already in flight, skipping trigger");
        if let Some(metrics) = herald_metrics::metrics() {
            metrics.delivery.record_sweep_already_running();
        }
        return SweepOutcome::AlreadyRunning;
    };

    let started = Instant::now();
    let now = Utc::now();

    let due = match dispatcher
        .store
        .scan(&move |record: &DeliveryRecord| record.is_due(now), Some(limit))
        .await
    {
        Ok(due) => due,
        Err(e) => {
            error!(error = %e, "Could not query the delivery store, skipping sweep");
            if let Some(metrics) = herald_metrics::metrics() {
                metrics.delivery.record_sweep_aborted();
            }
            return SweepOutcome::Aborted(e.to_string());
        }
    };

    let count = due.len();
    if count == 0 {
        debug!("No deliveries due");
    } else {
        info!(due = count, "Dispatching due deliveries");
    }

    let outcomes = dispatcher.dispatch(due).await;
    let report = SweepReport {
        due: count,
        outcomes,
    };

    if count > 0 {
        info!(
            sent = report.sent(),
            failed = report.failed(),
            skipped = report.skipped(),
            elapsed_ms = started.elapsed().as_millis(),
            "Sweep complete"
        );
    }

    if let Some(metrics) = herald_metrics::metrics() {
        metrics
            .delivery
            .record_sweep(count as u64, started.elapsed().as_secs_f64());
    }

    SweepOutcome::Completed(report)
}
