//! Control protocol for managing a running herald instance
//!
//! Operators and the surrounding application talk to herald over a Unix
//! domain socket to:
//! - Inspect, cancel and retry scheduled deliveries
//! - Trigger a sweep outside the poll interval
//! - Publish notifications and manage inboxes
//! - Check system health
//!
//! Frames are a 4-byte big-endian length followed by a bincode payload.
//! Every request names a [`Requester`]; what it may do is decided by
//! [`policy::evaluate`].

pub mod auth;
pub mod client;
pub mod error;
pub mod policy;
pub mod protocol;
pub mod server;

pub use auth::{AuthError, ControlAuthConfig, hash_token};
pub use client::ControlClient;
pub use error::{ControlError, Result};
pub use policy::{Capability, Requester, Resource, Role, Scope};
pub use protocol::{
    DeliveryCommand, NotificationCommand, PROTOCOL_VERSION, Request, RequestCommand, Response,
    ResponseData, ResponsePayload, SystemCommand,
};
pub use server::{CommandHandler, ControlServer};

/// Default path for the control socket
pub const DEFAULT_CONTROL_SOCKET: &str = "/tmp/herald.sock";
