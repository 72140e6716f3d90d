//! Audit logging for the record lifecycle
//!
//! Every state change of a delivery record, and every completed fan-out, is
//! emitted as a structured `tracing` event with a stable `event` field so the
//! audit trail can be filtered out of the regular log stream.
//!
//! ## Audit Events
//!
//! - `DeliveryCreated`: a producer stored a new delivery record
//! - `DeliverySent`: the transport accepted the message
//! - `DeliveryFailed`: the transport rejected the message or timed out
//! - `DeliveryCancelled`: an operator cancelled a pending record
//! - `DeliveryRetried`: an operator moved a failed record back to pending
//! - `FanoutCompleted`: a notification batch was persisted and pushed
//!
//! Recipient addresses can be redacted through [`AuditConfig`].

use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Audit logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    /// Enable audit logging for lifecycle events
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Redact the local part of recipient addresses
    #[serde(default)]
    pub redact_recipients: bool,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            redact_recipients: false,
        }
    }
}

const fn default_true() -> bool {
    true
}

static AUDIT_CONFIG: std::sync::OnceLock<Arc<AuditConfig>> = std::sync::OnceLock::new();

/// Initialize audit logging with configuration
pub fn init(config: AuditConfig) {
    AUDIT_CONFIG.get_or_init(|| Arc::new(config));
}

/// Get the current audit configuration
#[must_use]
pub fn config() -> Arc<AuditConfig> {
    AUDIT_CONFIG
        .get()
        .cloned()
        .unwrap_or_else(|| Arc::new(AuditConfig::default()))
}

/// Redact an email address if redaction is enabled, keeping the domain
#[must_use]
pub fn redact_email(email: &str, redact: bool) -> String {
    if redact {
        if let Some((_, domain)) = email.split_once('@') {
            format!("[REDACTED]@{domain}")
        } else {
            "[REDACTED]".to_string()
        }
    } else {
        email.to_string()
    }
}

pub fn log_delivery_created(record_id: &str, recipient: &str, created_by: &str, due: &str) {
    let config = config();
    if !config.enabled {
        return;
    }

    tracing::event!(
        tracing::Level::INFO,
        event = "DeliveryCreated",
        record_id = %record_id,
        recipient = %redact_email(recipient, config.redact_recipients),
        created_by = %created_by,
        due = %due,
        "Audit: Delivery record created"
    );
}

pub fn log_delivery_sent(record_id: &str, recipient: &str, attempt: u32) {
    let config = config();
    if !config.enabled {
        return;
    }

    tracing::event!(
        tracing::Level::INFO,
        event = "DeliverySent",
        record_id = %record_id,
        recipient = %redact_email(recipient, config.redact_recipients),
        delivery_attempt = attempt,
        "Audit: Delivery sent"
    );
}

pub fn log_delivery_failed(record_id: &str, recipient: &str, error: &str, attempt: u32) {
    let config = config();
    if !config.enabled {
        return;
    }

    tracing::event!(
        tracing::Level::WARN,
        event = "DeliveryFailed",
        record_id = %record_id,
        recipient = %redact_email(recipient, config.redact_recipients),
        error = %error,
        delivery_attempt = attempt,
        "Audit: Delivery failed"
    );
}

pub fn log_delivery_cancelled(record_id: &str) {
    if !config().enabled {
        return;
    }

    tracing::event!(
        tracing::Level::INFO,
        event = "DeliveryCancelled",
        record_id = %record_id,
        "Audit: Delivery cancelled"
    );
}

pub fn log_delivery_retried(record_id: &str) {
    if !config().enabled {
        return;
    }

    tracing::event!(
        tracing::Level::INFO,
        event = "DeliveryRetried",
        record_id = %record_id,
        "Audit: Delivery queued for retry"
    );
}

/// Log the outcome of one fan-out batch
///
/// # Fields
/// - `source_event`: batch key shared by every record of the fan-out
/// - `kind`: notification type tag
/// - `recipients`: number of records persisted
/// - `pushed`/`push_failed`: real-time publish outcomes
pub fn log_fanout_completed(
    source_event: &str,
    kind: &str,
    recipients: usize,
    pushed: usize,
    push_failed: usize,
) {
    if !config().enabled {
        return;
    }

    tracing::event!(
        tracing::Level::INFO,
        event = "FanoutCompleted",
        source_event = %source_event,
        kind = %kind,
        recipients = recipients,
        pushed = pushed,
        push_failed = push_failed,
        "Audit: Fan-out completed"
    );
}
