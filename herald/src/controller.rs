use std::{
    path::PathBuf,
    sync::{Arc, LazyLock},
};

use herald_common::{Signal, audit, internal, logging};
use herald_control::{ControlAuthConfig, ControlServer, DEFAULT_CONTROL_SOCKET};
use herald_delivery::{DefaultRenderer, DeliveryProcessor, DeliveryRecord, LogTransport};
use herald_metrics::MetricsConfig;
use herald_notify::{BroadcastPublisher, FanoutNotifier, Inbox, NotificationRecord};
use herald_store::StoreConfig;
use serde::Deserialize;
use tokio::sync::broadcast;

use crate::control_handler::HeraldControlHandler;

/// Collection holding delivery records
pub const DELIVERIES: &str = "deliveries";
/// Collection holding notification records
pub const NOTIFICATIONS: &str = "notifications";

fn default_socket() -> PathBuf {
    PathBuf::from(DEFAULT_CONTROL_SOCKET)
}

const fn default_true() -> bool {
    true
}

/// Control socket settings
#[derive(Debug, Clone, Deserialize)]
pub struct ControlConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_socket")]
    pub socket: PathBuf,
    #[serde(default)]
    pub auth: ControlAuthConfig,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            socket: default_socket(),
            auth: ControlAuthConfig::default(),
        }
    }
}

/// The whole service, as described by `herald.config.ron`
#[derive(Debug, Default, Deserialize)]
pub struct Herald {
    #[serde(default)]
    store: StoreConfig,
    #[serde(alias = "processor", default)]
    delivery: DeliveryProcessor,
    #[serde(alias = "notifier", default)]
    notify: FanoutNotifier,
    #[serde(default)]
    control: ControlConfig,
    #[serde(default)]
    metrics: MetricsConfig,
    #[serde(default)]
    audit: audit::AuditConfig,
}

/// Wired-up components, ready to serve
pub struct Services {
    pub delivery: Arc<DeliveryProcessor>,
    pub notifier: Arc<FanoutNotifier>,
    pub inbox: Inbox,
    pub publisher: BroadcastPublisher,
    pub handler: Arc<HeraldControlHandler>,
    pub control: Option<ControlServer>,
}

pub static SHUTDOWN_BROADCAST: LazyLock<broadcast::Sender<Signal>> = LazyLock::new(|| {
    let (sender, _receiver) = broadcast::channel(64);
    sender
});

#[tracing::instrument(level = "trace")]
async fn shutdown() -> anyhow::Result<()> {
    let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            internal!("CTRL+C entered -- Enter it again to force shutdown");
        }
        _ = terminate.recv() => {
            internal!("Terminate Signal received, shutting down");
        }
    };

    let mut receiver = SHUTDOWN_BROADCAST.subscribe();

    SHUTDOWN_BROADCAST
        .send(Signal::Shutdown)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Interrupted, e.to_string()))?;

    loop {
        tokio::select! {
            sig = receiver.recv() => {
                match sig {
                    Ok(s) => tracing::debug!("Received {s:?}"),
                    Err(broadcast::error::RecvError::Closed) => break,
                    Err(e) => tracing::debug!("Received: {e:?}"),
                }
            }

            _ = tokio::signal::ctrl_c() => {
                break;
            }
        }
    }

    Ok(())
}

impl Herald {
    /// Open the collections and wire every component together
    ///
    /// # Errors
    ///
    /// Returns an error if a collection cannot be opened, or a component
    /// rejects its configuration.
    pub fn assemble(mut self) -> anyhow::Result<Services> {
        audit::init(self.audit.clone());

        let deliveries = self.store.open::<DeliveryRecord>(DELIVERIES)?;
        let notifications = self.store.open::<NotificationRecord>(NOTIFICATIONS)?;

        self.delivery
            .init(deliveries, Arc::new(LogTransport), Arc::new(DefaultRenderer))?;

        let publisher = BroadcastPublisher::new();
        self.notify
            .init(Arc::clone(&notifications), Arc::new(publisher.clone()))?;

        let delivery = Arc::new(self.delivery);
        let notifier = Arc::new(self.notify);
        let inbox = Inbox::new(notifications);

        let handler = Arc::new(HeraldControlHandler::new(
            Arc::clone(&delivery),
            Arc::clone(&notifier),
            inbox.clone(),
        ));

        let control = if self.control.enabled {
            Some(
                ControlServer::new(self.control.socket, Arc::clone(&handler) as _)?
                    .with_auth(self.control.auth),
            )
        } else {
            internal!(level = WARN, "Control socket disabled");
            None
        };

        Ok(Services {
            delivery,
            notifier,
            inbox,
            publisher,
            handler,
            control,
        })
    }

    /// Run this controller, and everything it controls
    ///
    /// # Errors
    ///
    /// This function will return an error if any component fails to
    /// initialise, or the control socket cannot be bound.
    #[tracing::instrument(level = "trace", skip_all, err)]
    pub async fn run(self) -> anyhow::Result<()> {
        logging::init();
        herald_metrics::init_metrics(&self.metrics)?;

        let services = self.assemble()?;
        internal!("Controller running");

        let delivery = Arc::clone(&services.delivery).serve(SHUTDOWN_BROADCAST.subscribe());
        let control = async {
            match &services.control {
                Some(control) => control.serve(SHUTDOWN_BROADCAST.subscribe()).await,
                None => Ok(()),
            }
        };

        let ret = tokio::select! {
            r = async {
                let (delivery, control) = tokio::join!(delivery, control);
                delivery?;
                control?;
                Ok::<(), anyhow::Error>(())
            } => {
                r
            }
            r = shutdown() => {
                r
            }
        };

        internal!("Shutting down...");

        ret
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let herald: Herald = ron::from_str("()").expect("valid config");

        assert_eq!(herald.delivery.poll_interval_secs, 10);
        assert_eq!(herald.notify.push_concurrency, 16);
        assert!(herald.control.enabled);
        assert_eq!(herald.control.socket, PathBuf::from(DEFAULT_CONTROL_SOCKET));
        assert!(!herald.metrics.enabled);
        assert!(herald.audit.enabled);
    }

    #[test]
    fn test_sections_are_read() {
        let herald: Herald = ron::from_str(
            r#"(
                store: (type: "Memory"),
                delivery: (poll_interval_secs: 5, batch_size: 2),
                notify: (push_concurrency: 4),
                control: (socket: "/run/herald/control.sock", auth: (enabled: true)),
                audit: (redact_recipients: true),
            )"#,
        )
        .expect("valid config");

        assert!(matches!(herald.store, StoreConfig::Memory(_)));
        assert_eq!(herald.delivery.poll_interval_secs, 5);
        assert_eq!(herald.delivery.batch_size, 2);
        assert_eq!(herald.notify.push_concurrency, 4);
        assert_eq!(herald.control.socket, PathBuf::from("/run/herald/control.sock"));
        assert!(herald.control.auth.enabled);
        assert!(herald.audit.redact_recipients);
    }

    #[test]
    fn test_sample_config_parses() {
        let herald: Herald =
            ron::from_str(include_str!("../../herald.config.ron")).expect("valid sample");

        assert!(matches!(herald.store, StoreConfig::File(_)));
        assert_eq!(herald.delivery.batch_size, 5);
        assert!(!herald.control.auth.enabled);
    }

    #[test]
    fn test_zero_batch_size_is_rejected() {
        let herald: Herald = ron::from_str(
            r#"(store: (type: "Memory"), delivery: (batch_size: 0), control: (enabled: false))"#,
        )
        .expect("valid config");

        assert!(herald.assemble().is_err());
    }

    #[test]
    fn test_zero_timeouts_are_rejected() {
        for section in ["delivery: (send_timeout_secs: 0)", "notify: (push_timeout_secs: 0)"] {
            let herald: Herald = ron::from_str(&format!(
                r#"(store: (type: "Memory"), {section}, control: (enabled: false))"#
            ))
            .expect("valid config");

            assert!(herald.assemble().is_err(), "{section} was accepted");
        }
    }
}
