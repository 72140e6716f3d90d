//! In-app notification fan-out
//!
//! One event becomes one [`NotificationRecord`] per distinct recipient, all
//! sharing a `source_event` key. Records are persisted before any real-time
//! push is attempted; the [`Inbox`] reads them back.

mod error;
mod inbox;
mod notifier;
mod publisher;
mod record;

pub use error::{NotifyError, PublishError};
pub use inbox::Inbox;
pub use notifier::{FanoutNotifier, FanoutReport, PushOutcome};
pub use publisher::{BroadcastPublisher, Publisher};
pub use record::{EventDescriptor, NotificationRecord, channel_for};
