//! Fan-out of one event to many recipients
//!
//! Two steps: persist one record per recipient in a single batch, then push
//! each record to its recipient's channel with bounded concurrency. Only the
//! first step can fail the call. Push failures are reported per recipient
//! and never retried.

use std::{any::Any, collections::HashSet, panic::AssertUnwindSafe, sync::Arc, time::Duration};

use chrono::Utc;
use futures_util::{FutureExt, StreamExt, stream};
use herald_common::{
    UserId, audit, internal,
    tracing::{debug, error, info, warn},
};
use herald_store::{BackingStore, RecordId};
use serde::Deserialize;

use crate::{
    error::NotifyError,
    publisher::{Publisher, publish_with_timeout},
    record::{EventDescriptor, NotificationRecord},
};

const fn default_push_concurrency() -> usize {
    16
}

const fn default_push_timeout() -> u64 {
    5
}

/// How one recipient's push went
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    Delivered {
        id: RecordId,
        recipient: UserId,
    },
    Failed {
        id: RecordId,
        recipient: UserId,
        reason: String,
    },
}

impl PushOutcome {
    #[must_use]
    pub const fn id(&self) -> &RecordId {
        match self {
            Self::Delivered { id, .. } | Self::Failed { id, .. } => id,
        }
    }

    #[must_use]
    pub const fn recipient(&self) -> &UserId {
        match self {
            Self::Delivered { recipient, .. } | Self::Failed { recipient, .. } => recipient,
        }
    }

    #[must_use]
    pub const fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered { .. })
    }
}

/// Result of one fan-out. Every outcome has a persisted record behind it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FanoutReport {
    pub source_event: RecordId,
    pub outcomes: Vec<PushOutcome>,
}

impl FanoutReport {
    /// Number of records persisted
    #[must_use]
    pub fn recipients(&self) -> usize {
        self.outcomes.len()
    }

    #[must_use]
    pub fn delivered(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_delivered()).count()
    }

    #[must_use]
    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.delivered()
    }
}

/// Fans events out to per-user notification records
#[derive(Debug, Deserialize)]
pub struct FanoutNotifier {
    /// Most pushes in flight at once
    #[serde(default = "default_push_concurrency")]
    pub push_concurrency: usize,

    /// Longest a single push may take (in seconds)
    #[serde(default = "default_push_timeout")]
    pub push_timeout_secs: u64,

    #[serde(skip)]
    store: Option<Arc<dyn BackingStore<NotificationRecord>>>,

    #[serde(skip)]
    publisher: Option<Arc<dyn Publisher>>,
}

impl Default for FanoutNotifier {
    fn default() -> Self {
        Self {
            push_concurrency: default_push_concurrency(),
            push_timeout_secs: default_push_timeout(),
            store: None,
            publisher: None,
        }
    }
}

impl FanoutNotifier {
    /// Attach the notification store and the push channel
    ///
    /// # Errors
    ///
    /// Returns an error if `push_timeout_secs` is zero, which would fail
    /// every push.
    pub fn init(
        &mut self,
        store: Arc<dyn BackingStore<NotificationRecord>>,
        publisher: Arc<dyn Publisher>,
    ) -> Result<(), NotifyError> {
        if self.push_timeout_secs == 0 {
            return Err(NotifyError::NotInitialized(
                "push_timeout_secs must be at least 1".to_string(),
            ));
        }

        internal!(
            "Fan-out notifier initialized with push_concurrency={}, push_timeout={}s",
            self.push_concurrency,
            self.push_timeout_secs
        );

        self.store = Some(store);
        self.publisher = Some(publisher);
        Ok(())
    }

    /// The notification store
    ///
    /// # Errors
    ///
    /// Returns an error if `init()` has not been called
    pub fn store(&self) -> Result<&Arc<dyn BackingStore<NotificationRecord>>, NotifyError> {
        self.store.as_ref().ok_or_else(not_initialized)
    }

    fn publisher(&self) -> Result<&Arc<dyn Publisher>, NotifyError> {
        self.publisher.as_ref().ok_or_else(not_initialized)
    }

    /// Deliver `event` to every distinct recipient
    ///
    /// Recipients are de-duplicated keeping first-seen order. An empty list is
    /// a no-op that touches neither the store nor the publisher.
    ///
    /// # Errors
    ///
    /// Returns an error only if the records could not be persisted, in which
    /// case nothing was pushed.
    #[tracing::instrument(level = "debug", skip_all, fields(kind = %event.kind))]
    pub async fn notify(
        &self,
        event: &EventDescriptor,
        recipients: &[UserId],
    ) -> Result<FanoutReport, NotifyError> {
        let store = self.store()?;
        let publisher = self.publisher()?;
        let source_event = RecordId::generate();

        let recipients = distinct(recipients);
        if recipients.is_empty() {
            debug!(source_event = %source_event, "No recipients, nothing to fan out");
            return Ok(FanoutReport {
                source_event,
                outcomes: Vec::new(),
            });
        }

        let now = Utc::now();
        let records = recipients
            .into_iter()
            .map(|recipient| NotificationRecord::new(event, recipient, source_event, now))
            .collect::<Vec<_>>();

        store.insert_many(&records).await?;
        debug!(source_event = %source_event, count = records.len(), "Persisted notifications");

        let timeout = Duration::from_secs(self.push_timeout_secs);
        let outcomes = stream::iter(&records)
            .map(|record| push(publisher.as_ref(), record, timeout))
            .buffer_unordered(self.push_concurrency.max(1))
            .collect::<Vec<_>>()
            .boxed()
            .await;

        let report = FanoutReport {
            source_event,
            outcomes,
        };

        info!(
            source_event = %source_event,
            recipients = report.recipients(),
            delivered = report.delivered(),
            failed = report.failed(),
            "Fan-out completed"
        );
        audit::log_fanout_completed(
            &source_event.to_string(),
            &event.kind,
            report.recipients(),
            report.delivered(),
            report.failed(),
        );
        if let Some(metrics) = herald_metrics::metrics() {
            metrics.notify.record_fanout(
                report.recipients() as u64,
                report.delivered() as u64,
                report.failed() as u64,
            );
        }

        Ok(report)
    }
}

/// Push one record; a panicking publisher fails only this recipient
async fn push(
    publisher: &dyn Publisher,
    record: &NotificationRecord,
    timeout: Duration,
) -> PushOutcome {
    let result = match AssertUnwindSafe(publish_with_timeout(publisher, record, timeout))
        .catch_unwind()
        .await
    {
        Ok(result) => result.map_err(|e| e.to_string()),
        Err(panic) => {
            let reason = format!("push panicked: {}", panic_message(&*panic));
            error!(record_id = %record.id, recipient = %record.recipient, "{reason}");
            Err(reason)
        }
    };

    match result {
        Ok(()) => PushOutcome::Delivered {
            id: record.id,
            recipient: record.recipient.clone(),
        },
        Err(reason) => {
            warn!(record_id = %record.id, recipient = %record.recipient, error = %reason, "Push failed");
            PushOutcome::Failed {
                id: record.id,
                recipient: record.recipient.clone(),
                reason,
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

fn distinct(recipients: &[UserId]) -> Vec<UserId> {
    let mut seen = HashSet::with_capacity(recipients.len());
    recipients
        .iter()
        .filter(|recipient| seen.insert(*recipient))
        .cloned()
        .collect()
}

fn not_initialized() -> NotifyError {
    NotifyError::NotInitialized("Fan-out notifier not initialized. Call init() first.".to_string())
}
