//! Shared building blocks for the herald workspace
//!
//! - [`logging`]: subscriber setup and the `internal!` family of macros
//! - [`audit`]: structured audit events for the record lifecycle
//! - [`identity`]: opaque user and company identifiers

pub mod audit;
pub mod identity;
pub mod logging;

pub use identity::{CompanyId, UserId};
pub use tracing;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Shutdown,
    Finalised,
}
