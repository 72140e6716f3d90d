//! Fan-out notifier metrics

use std::sync::atomic::{AtomicU64, Ordering};

use opentelemetry::{
    KeyValue,
    metrics::{Counter, Histogram, Meter},
};

use crate::MetricsError;

/// Fan-out metrics collector
#[derive(Debug)]
pub struct NotifyMetrics {
    records_persisted: Counter<u64>,
    pushes_total: Counter<u64>,
    fanout_size: Histogram<u64>,

    persisted: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
}

impl NotifyMetrics {
    /// Create a new fan-out metrics collector
    ///
    /// # Errors
    ///
    /// Returns an error if metric instruments cannot be created.
    pub fn new() -> Result<Self, MetricsError> {
        let meter = meter();

        let records_persisted = meter
            .u64_counter("herald.notify.records.persisted.total")
            .with_description("Total number of notification records persisted")
            .build();

        let pushes_total = meter
            .u64_counter("herald.notify.pushes.total")
            .with_description("Total number of real-time pushes by outcome")
            .build();

        let fanout_size = meter
            .u64_histogram("herald.notify.fanout.recipients")
            .with_description("Distribution of recipients per fan-out")
            .build();

        Ok(Self {
            records_persisted,
            pushes_total,
            fanout_size,
            persisted: AtomicU64::new(0),
            delivered: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        })
    }

    /// Record one fan-out: how many records were persisted and how the
    /// pushes went
    pub fn record_fanout(&self, persisted: u64, delivered: u64, failed: u64) {
        self.fanout_size.record(persisted, &[]);
        self.records_persisted.add(persisted, &[]);
        self.pushes_total
            .add(delivered, &[KeyValue::new("outcome", "delivered")]);
        self.pushes_total
            .add(failed, &[KeyValue::new("outcome", "failed")]);

        self.persisted.fetch_add(persisted, Ordering::Relaxed);
        self.delivered.fetch_add(delivered, Ordering::Relaxed);
        self.failed.fetch_add(failed, Ordering::Relaxed);
    }

    #[must_use]
    pub fn persisted_count(&self) -> u64 {
        self.persisted.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn delivered_count(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn failed_count(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

/// Get the OpenTelemetry meter for fan-out metrics
fn meter() -> Meter {
    opentelemetry::global::meter("herald.notify")
}
