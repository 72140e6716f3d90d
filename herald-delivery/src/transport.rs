//! Outbound transport seam

use std::{fmt::Debug, time::Duration};

use async_trait::async_trait;
use herald_common::outgoing;
use herald_store::RecordId;

use crate::{error::TransportError, record::Mailbox, template::RenderedMessage};

/// One rendered message addressed for sending
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub record_id: RecordId,
    pub from: Mailbox,
    pub to: Mailbox,
    pub subject: String,
    pub text: String,
    pub html: String,
}

impl OutboundMessage {
    #[must_use]
    pub fn new(record_id: RecordId, from: Mailbox, to: Mailbox, rendered: RenderedMessage) -> Self {
        Self {
            record_id,
            from,
            to,
            subject: rendered.subject,
            text: rendered.text,
            html: rendered.html,
        }
    }
}

/// The outbound channel, typically a mail relay
///
/// A transport reports each attempt as a success or a [`TransportError`];
/// it never retries on its own.
#[async_trait]
pub trait Transport: Send + Sync + Debug {
    async fn send(&self, message: &OutboundMessage) -> Result<(), TransportError>;
}

/// Transport that writes each message to the log and reports success
///
/// Used when no relay is configured, e.g. in development.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogTransport;

#[async_trait]
impl Transport for LogTransport {
    async fn send(&self, message: &OutboundMessage) -> Result<(), TransportError> {
        outgoing!(
            level = INFO,
            "Delivering {} from {} to {}: {:?} ({} bytes)",
            message.record_id,
            message.from,
            message.to,
            message.subject,
            message.text.len()
        );
        Ok(())
    }
}

/// Send through `transport`, treating an overrun of `timeout` as a failure
pub(crate) async fn send_with_timeout(
    transport: &dyn Transport,
    message: &OutboundMessage,
    timeout: Duration,
) -> Result<(), TransportError> {
    tokio::time::timeout(timeout, transport.send(message))
        .await
        .unwrap_or(Err(TransportError::Timeout(timeout)))
}
