//! Batched dispatch of due records
//!
//! Records are sent in groups of `batch_size`. Every send in a group runs
//! concurrently on its own task, and a group is fully settled before the next
//! one starts. One record's failure, or even a panic while sending it, is
//! confined to that record.

use std::{any::Any, panic::AssertUnwindSafe, sync::Arc, time::Duration};

use futures_util::FutureExt;
use herald_common::tracing::{debug, error};
use herald_store::{BackingStore, RecordId};
use tokio::task::JoinSet;

use super::deliver::{self, Failure};
use crate::{
    record::{DeliveryRecord, DeliveryStatus},
    template::Renderer,
    transport::Transport,
};

/// What happened to one record during dispatch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Sent, and the record now says so
    Sent { id: RecordId },
    /// Not sent, and the record is now `Failed` with this reason
    Failed { id: RecordId, reason: String },
    /// Left alone because the record was no longer pending
    Skipped { id: RecordId, status: DeliveryStatus },
    /// The record could not be read or its transition could not be written.
    /// A record that still exists stays pending and is picked up again by a
    /// later sweep. One that was deleted in the meantime is simply gone.
    Unrecorded { id: RecordId, error: String },
}

impl DispatchOutcome {
    #[must_use]
    pub const fn id(&self) -> &RecordId {
        match self {
            Self::Sent { id }
            | Self::Failed { id, .. }
            | Self::Skipped { id, .. }
            | Self::Unrecorded { id, .. } => id,
        }
    }

    #[must_use]
    pub const fn is_sent(&self) -> bool {
        matches!(self, Self::Sent { .. })
    }

    #[must_use]
    pub const fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// Sends records through a transport and records the outcomes
#[derive(Debug, Clone)]
pub struct Dispatcher {
    pub(crate) store: Arc<dyn BackingStore<DeliveryRecord>>,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) renderer: Arc<dyn Renderer>,
    batch_size: usize,
    send_timeout: Duration,
}

impl Dispatcher {
    #[must_use]
    pub fn new(
        store: Arc<dyn BackingStore<DeliveryRecord>>,
        transport: Arc<dyn Transport>,
        renderer: Arc<dyn Renderer>,
        batch_size: usize,
        send_timeout: Duration,
    ) -> Self {
        Self {
            store,
            transport,
            renderer,
            batch_size: batch_size.max(1),
            send_timeout,
        }
    }

    pub(crate) const fn send_timeout(&self) -> Duration {
        self.send_timeout
    }

    /// Dispatch `records` group by group and report every outcome
    ///
    /// Each record is re-read before sending, so the caller's copies only
    /// name the work.
    pub async fn dispatch(&self, records: Vec<DeliveryRecord>) -> Vec<DispatchOutcome> {
        let mut outcomes = Vec::with_capacity(records.len());

        for (index, group) in records.chunks(self.batch_size).enumerate() {
            debug!(group = index, size = group.len(), "Dispatching delivery group");

            let mut join_set = JoinSet::new();
            for record in group {
                let dispatcher = self.clone();
                let id = record.id;

                join_set.spawn(async move {
                    match AssertUnwindSafe(deliver::deliver(&dispatcher, id))
                        .catch_unwind()
                        .await
                    {
                        Ok(outcome) => outcome,
                        Err(panic) => {
                            let reason = format!("dispatch panicked: {}", panic_message(&*panic));
                            error!(record_id = %id, "{reason}");
                            deliver::settle(&dispatcher, id, Some(Failure::new(reason, "panic")))
                                .await
                        }
                    }
                });
            }

            while let Some(joined) = join_set.join_next().await {
                match joined {
                    Ok(outcome) => outcomes.push(outcome),
                    Err(e) => error!(error = %e, "Dispatch task ended abnormally"),
                }
            }
        }

        outcomes
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}
