//! Delivery engine metrics
//!
//! Tracks the scheduled-delivery engine:
//! - Sweeps by outcome (completed, already running, aborted)
//! - Dispatched records by outcome (sent, failed, skipped)
//! - Sweep durations

use std::sync::atomic::{AtomicU64, Ordering};

use opentelemetry::{
    KeyValue,
    metrics::{Counter, Histogram, Meter},
};

use crate::MetricsError;

/// Delivery metrics collector
#[derive(Debug)]
pub struct DeliveryMetrics {
    sweeps_total: Counter<u64>,
    dispatched_total: Counter<u64>,
    sweep_duration_seconds: Histogram<f64>,
    due_records: Histogram<u64>,

    // Local mirrors of the counters, readable without an exporter
    sweeps: AtomicU64,
    sent: AtomicU64,
    failed: AtomicU64,
    skipped: AtomicU64,
}

impl DeliveryMetrics {
    /// Create a new delivery metrics collector
    ///
    /// # Errors
    ///
    /// Returns an error if metric instruments cannot be created.
    pub fn new() -> Result<Self, MetricsError> {
        let meter = meter();

        let sweeps_total = meter
            .u64_counter("herald.delivery.sweeps.total")
            .with_description("Total number of sweep triggers by outcome")
            .build();

        let dispatched_total = meter
            .u64_counter("herald.delivery.dispatched.total")
            .with_description("Total number of dispatched records by outcome")
            .build();

        let sweep_duration_seconds = meter
            .f64_histogram("herald.delivery.sweep.duration.seconds")
            .with_description("Distribution of sweep durations")
            .build();

        let due_records = meter
            .u64_histogram("herald.delivery.sweep.due_records")
            .with_description("Number of due records selected per sweep")
            .build();

        Ok(Self {
            sweeps_total,
            dispatched_total,
            sweep_duration_seconds,
            due_records,
            sweeps: AtomicU64::new(0),
            sent: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
        })
    }

    /// Record a sweep that ran to completion
    pub fn record_sweep(&self, due: u64, duration_secs: f64) {
        self.sweeps_total
            .add(1, &[KeyValue::new("outcome", "completed")]);
        self.sweep_duration_seconds.record(duration_secs, &[]);
        self.due_records.record(due, &[]);
        self.sweeps.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a trigger that found a sweep already in flight
    pub fn record_sweep_already_running(&self) {
        self.sweeps_total
            .add(1, &[KeyValue::new("outcome", "already_running")]);
    }

    /// Record a sweep abandoned because the store could not be reached
    pub fn record_sweep_aborted(&self) {
        self.sweeps_total
            .add(1, &[KeyValue::new("outcome", "aborted")]);
    }

    pub fn record_sent(&self) {
        self.dispatched_total
            .add(1, &[KeyValue::new("outcome", "sent")]);
        self.sent.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a failed send, tagged with the failure category
    pub fn record_failed(&self, reason: &'static str) {
        self.dispatched_total.add(
            1,
            &[
                KeyValue::new("outcome", "failed"),
                KeyValue::new("reason", reason),
            ],
        );
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_skipped(&self) {
        self.dispatched_total
            .add(1, &[KeyValue::new("outcome", "skipped")]);
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn sweeps_count(&self) -> u64 {
        self.sweeps.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn sent_count(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn failed_count(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn skipped_count(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }
}

/// Get the OpenTelemetry meter for delivery metrics
fn meter() -> Meter {
    opentelemetry::global::meter("herald.delivery")
}
