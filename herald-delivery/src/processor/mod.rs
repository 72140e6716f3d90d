//! Delivery processor orchestration
//!
//! The processor owns the poller: one interval timer and the single-flight
//! flag that every trigger, timed or requested, has to claim before it may
//! sweep.

pub mod deliver;
pub mod dispatch;
pub mod sweep;

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use herald_common::{
    Signal, internal,
    tracing::{debug, error, warn},
};
use herald_store::BackingStore;
use serde::Deserialize;
use tokio::time::{Instant, MissedTickBehavior};

use self::{dispatch::Dispatcher, sweep::SweepOutcome};
use crate::{
    error::DeliveryError, record::DeliveryRecord, template::Renderer, transport::Transport,
};

const fn default_poll_interval() -> u64 {
    10
}

const fn default_sweep_limit() -> usize {
    100
}

const fn default_batch_size() -> usize {
    5
}

const fn default_send_timeout() -> u64 {
    30
}

const fn default_shutdown_timeout() -> u64 {
    30
}

/// Processor for scheduled deliveries
///
/// Every `poll_interval_secs` it selects up to `sweep_limit` due records,
/// oldest first, and dispatches them in groups of `batch_size`.
#[derive(Debug, Deserialize)]
pub struct DeliveryProcessor {
    /// How often to sweep for due deliveries (in seconds)
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Most records a single sweep will dispatch
    #[serde(default = "default_sweep_limit")]
    pub sweep_limit: usize,

    /// Number of sends that run concurrently
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Longest a single send may take before it counts as failed (in seconds)
    #[serde(default = "default_send_timeout")]
    pub send_timeout_secs: u64,

    /// How long shutdown waits for an in-flight sweep (in seconds)
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,

    /// Store, transport and renderer (initialized in `init()`)
    #[serde(skip)]
    pub(crate) dispatcher: Option<Dispatcher>,

    /// Set while a sweep is in flight
    #[serde(skip)]
    sweeping: AtomicBool,
}

impl Default for DeliveryProcessor {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            sweep_limit: default_sweep_limit(),
            batch_size: default_batch_size(),
            send_timeout_secs: default_send_timeout(),
            shutdown_timeout_secs: default_shutdown_timeout(),
            dispatcher: None,
            sweeping: AtomicBool::new(false),
        }
    }
}

impl DeliveryProcessor {
    /// Initialize the delivery processor
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot work
    pub fn init(
        &mut self,
        store: Arc<dyn BackingStore<DeliveryRecord>>,
        transport: Arc<dyn Transport>,
        renderer: Arc<dyn Renderer>,
    ) -> Result<(), DeliveryError> {
        internal!("Initialising Delivery Processor ...");

        if self.batch_size == 0 || self.sweep_limit == 0 || self.send_timeout_secs == 0 {
            return Err(DeliveryError::NotInitialized(format!(
                "batch_size ({}), sweep_limit ({}) and send_timeout_secs ({}) must all be at least 1",
                self.batch_size, self.sweep_limit, self.send_timeout_secs
            )));
        }

        self.dispatcher = Some(Dispatcher::new(
            store,
            transport,
            renderer,
            self.batch_size,
            Duration::from_secs(self.send_timeout_secs),
        ));

        internal!(
            "Delivery processor initialized with poll_interval={}s, sweep_limit={}, batch_size={}, send_timeout={}s",
            self.poll_interval_secs,
            self.sweep_limit,
            self.batch_size,
            self.send_timeout_secs
        );

        Ok(())
    }

    pub(crate) fn dispatcher(&self) -> Result<&Dispatcher, DeliveryError> {
        self.dispatcher.as_ref().ok_or_else(|| {
            DeliveryError::NotInitialized(
                "Delivery processor not initialized. Call init() first.".to_string(),
            )
        })
    }

    /// The delivery store
    ///
    /// # Errors
    ///
    /// Returns an error if `init()` has not been called
    pub fn store(&self) -> Result<&Arc<dyn BackingStore<DeliveryRecord>>, DeliveryError> {
        Ok(&self.dispatcher()?.store)
    }

    /// Whether a sweep is in flight right now
    #[must_use]
    pub fn is_sweeping(&self) -> bool {
        self.sweeping.load(Ordering::Acquire)
    }

    /// Run one sweep now, unless one is already in flight
    ///
    /// The timer and explicit requests both come through here, so they share
    /// the same single-flight guard.
    ///
    /// # Errors
    ///
    /// Returns an error if `init()` has not been called. Store failures
    /// during the sweep are reported as [`SweepOutcome::Aborted`].
    pub async fn sweep(&self) -> Result<SweepOutcome, DeliveryError> {
        let dispatcher = self.dispatcher()?;
        Ok(sweep::sweep(&self.sweeping, dispatcher, self.sweep_limit).await)
    }

    /// Run the delivery processor
    ///
    /// Sweeps every `poll_interval_secs` until a shutdown signal arrives. A
    /// tick that lands while a sweep is still running is a no-op; ticks missed
    /// while the runtime was busy are skipped, not replayed.
    ///
    /// ## Graceful Shutdown
    ///
    /// When a shutdown signal is received:
    /// 1. Stop triggering new sweeps
    /// 2. Wait for any in-flight sweep to complete (bounded by `shutdown_timeout_secs`)
    /// 3. Exit cleanly
    ///
    /// Records whose transition had not been written when the wait ran out
    /// are still pending and will be sent again after a restart.
    ///
    /// # Errors
    ///
    /// Returns an error if `init()` has not been called
    #[tracing::instrument(level = "trace", skip_all)]
    pub async fn serve(
        self: Arc<Self>,
        mut shutdown: tokio::sync::broadcast::Receiver<Signal>,
    ) -> Result<(), DeliveryError> {
        internal!("Delivery processor starting");
        self.dispatcher()?;

        let mut timer = tokio::time::interval(Duration::from_secs(self.poll_interval_secs.max(1)));
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

        // Skip the first tick to avoid immediate execution
        timer.tick().await;

        loop {
            tokio::select! {
                _ = timer.tick() => {
                    let processor = Arc::clone(&self);
                    tokio::spawn(async move {
                        if let Err(e) = processor.sweep().await {
                            error!("Error sweeping deliveries: {e}");
                        }
                    });
                }
                sig = shutdown.recv() => {
                    match sig {
                        Ok(Signal::Shutdown | Signal::Finalised) => {
                            internal!("Delivery processor received shutdown signal");
                            self.wait_for_in_flight().await;
                            internal!("Delivery processor shutdown complete");
                            break;
                        }
                        Err(e) => {
                            error!("Delivery processor shutdown channel error: {e}");
                            break;
                        }
                    }
                }
            }
        }

        Ok(())
    }

    async fn wait_for_in_flight(&self) {
        let shutdown_timeout = Duration::from_secs(self.shutdown_timeout_secs);
        let start = Instant::now();

        while self.is_sweeping() {
            if start.elapsed() >= shutdown_timeout {
                warn!(
                    "Shutdown timeout exceeded, unsettled deliveries remain pending and will be retried on restart"
                );
                return;
            }

            debug!(
                "Waiting for in-flight sweep to complete ({:.1}s elapsed)...",
                start.elapsed().as_secs_f64()
            );
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        internal!("No sweep in flight");
    }
}
