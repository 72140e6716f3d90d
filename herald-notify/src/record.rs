use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use herald_common::UserId;
use herald_store::{Record, RecordId};
use serde::{Deserialize, Serialize};

/// What happened, independent of who hears about it
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventDescriptor {
    /// Type tag, e.g. `task.assigned`
    pub kind: String,
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub payload: BTreeMap<String, String>,
    /// Deep-link target in the client application
    #[serde(default)]
    pub link: Option<String>,
}

impl EventDescriptor {
    #[must_use]
    pub fn new(kind: impl Into<String>, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            title: title.into(),
            message: message.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_payload(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_link(mut self, link: impl Into<String>) -> Self {
        self.link = Some(link.into());
        self
    }
}

/// One recipient's copy of a fanned-out event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub id: RecordId,
    pub recipient: UserId,

    pub kind: String,
    pub title: String,
    pub message: String,
    pub payload: BTreeMap<String, String>,
    pub link: Option<String>,

    pub is_read: bool,
    pub read_at: Option<DateTime<Utc>>,

    /// Shared by every record created by the same fan-out
    pub source_event: RecordId,
    pub created_at: DateTime<Utc>,
}

impl Record for NotificationRecord {
    fn id(&self) -> &RecordId {
        &self.id
    }
}

impl NotificationRecord {
    #[must_use]
    pub fn new(
        event: &EventDescriptor,
        recipient: UserId,
        source_event: RecordId,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: RecordId::generate(),
            recipient,
            kind: event.kind.clone(),
            title: event.title.clone(),
            message: event.message.clone(),
            payload: event.payload.clone(),
            link: event.link.clone(),
            is_read: false,
            read_at: None,
            source_event,
            created_at: now,
        }
    }

    /// The real-time channel this record is pushed to
    #[must_use]
    pub fn channel(&self) -> String {
        channel_for(&self.recipient)
    }

    /// Returns `false`, changing nothing, if the record was already read
    pub fn mark_read(&mut self, now: DateTime<Utc>) -> bool {
        if self.is_read {
            return false;
        }

        self.is_read = true;
        self.read_at = Some(now);
        true
    }
}

/// Private channel name for one user
#[must_use]
pub fn channel_for(recipient: &UserId) -> String {
    format!("private-user.{recipient}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_copies_the_event() {
        let event = EventDescriptor::new("task.assigned", "New task", "You have a task")
            .with_payload("task_id", "17")
            .with_link("/tasks/17");
        let source = RecordId::generate();
        let record = NotificationRecord::new(&event, UserId::from("u1"), source, Utc::now());

        assert_eq!(record.kind, "task.assigned");
        assert_eq!(record.payload.get("task_id").map(String::as_str), Some("17"));
        assert_eq!(record.link.as_deref(), Some("/tasks/17"));
        assert_eq!(record.source_event, source);
        assert!(!record.is_read);
        assert_eq!(record.channel(), "private-user.u1");
    }

    #[test]
    fn test_read_is_monotonic() {
        let event = EventDescriptor::new("k", "t", "m");
        let mut record =
            NotificationRecord::new(&event, UserId::from("u1"), RecordId::generate(), Utc::now());

        let first = Utc::now();
        assert!(record.mark_read(first));
        assert!(!record.mark_read(Utc::now()));
        assert!(record.is_read);
        assert_eq!(record.read_at, Some(first));
    }
}
