//! Scheduled delivery engine
//!
//! This crate provides:
//! - The delivery record state machine (`pending → sent | failed | cancelled`,
//!   and `failed → pending` on retry)
//! - A single-flight poller that sweeps for due records on a fixed interval
//! - A dispatch batcher that sends in bounded concurrent groups and isolates
//!   per-record failures
//! - Guarded cancel/retry operations for operators

pub mod control;
mod error;
mod processor;
mod record;
mod service;
mod template;
mod transport;

pub use control::{DeliveryFilter, DeliveryStats, Page};
pub use error::{DeliveryError, GuardError, TransportError, ValidationError};
pub use processor::{
    DeliveryProcessor,
    dispatch::{DispatchOutcome, Dispatcher},
    sweep::{SweepOutcome, SweepReport},
};
pub use record::{DeliveryRecord, DeliveryStatus, MAX_ERROR_LEN, Mailbox, NewDelivery};
pub use service::DeliveryService;
pub use template::{DefaultRenderer, RenderedMessage, Renderer, Template};
pub use transport::{LogTransport, OutboundMessage, Transport};
