#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::{
    collections::HashSet,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use herald_common::UserId;
use herald_notify::{
    BroadcastPublisher, EventDescriptor, FanoutNotifier, Inbox, NotificationRecord, NotifyError,
    PublishError, Publisher,
};
use herald_store::{BackingStore, TestBackingStore};
use pretty_assertions::assert_eq;

/// Publisher that fails for a fixed set of channels and records the rest
#[derive(Debug, Default)]
struct ScriptedPublisher {
    failing: HashSet<String>,
    hanging: HashSet<String>,
    panicking: HashSet<String>,
    calls: AtomicUsize,
    published: Mutex<Vec<String>>,
}

impl ScriptedPublisher {
    fn failing(recipients: &[&str]) -> Self {
        Self {
            failing: recipients
                .iter()
                .map(|r| format!("private-user.{r}"))
                .collect(),
            ..Self::default()
        }
    }

    fn panicking(recipients: &[&str]) -> Self {
        Self {
            panicking: recipients
                .iter()
                .map(|r| format!("private-user.{r}"))
                .collect(),
            ..Self::default()
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Publisher for ScriptedPublisher {
    async fn publish(
        &self,
        channel: &str,
        _notification: &NotificationRecord,
    ) -> Result<(), PublishError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.hanging.contains(channel) {
            std::future::pending::<()>().await;
        }
        assert!(!self.panicking.contains(channel), "publisher exploded for {channel}");
        if self.failing.contains(channel) {
            return Err(PublishError::Rejected(format!("{channel} refused")));
        }
        self.published.lock().unwrap().push(channel.to_string());
        Ok(())
    }
}

fn event() -> EventDescriptor {
    EventDescriptor::new("task.assigned", "New task", "You were assigned a task")
        .with_payload("task_id", "42")
        .with_link("/tasks/42")
}

fn users(count: usize) -> Vec<UserId> {
    (0..count).map(|n| UserId::from(format!("user-{n}"))).collect()
}

fn notifier(
    publisher: Arc<dyn Publisher>,
) -> (FanoutNotifier, Arc<TestBackingStore<NotificationRecord>>) {
    let store = Arc::new(TestBackingStore::new());
    let mut notifier = FanoutNotifier::default();
    notifier.init(
        store.clone() as Arc<dyn BackingStore<NotificationRecord>>,
        publisher,
    )
    .expect("notifier init");
    (notifier, store)
}

#[tokio::test]
async fn test_push_failures_never_lose_records() {
    let publisher = Arc::new(ScriptedPublisher::failing(&["user-1", "user-4", "user-8"]));
    let (notifier, store) = notifier(publisher.clone());

    let report = notifier.notify(&event(), &users(10)).await.unwrap();

    assert_eq!(report.recipients(), 10);
    assert_eq!(report.delivered(), 7);
    assert_eq!(report.failed(), 3);

    let records = store.records();
    assert_eq!(records.len(), 10);
    assert!(
        records
            .iter()
            .all(|r| r.source_event == report.source_event && !r.is_read)
    );

    let failed: HashSet<_> = report
        .outcomes
        .iter()
        .filter(|o| !o.is_delivered())
        .map(|o| o.recipient().to_string())
        .collect();
    assert_eq!(
        failed,
        ["user-1", "user-4", "user-8"]
            .map(String::from)
            .into_iter()
            .collect()
    );
}

#[tokio::test]
async fn test_panicking_push_fails_only_its_recipient() {
    let publisher = Arc::new(ScriptedPublisher::panicking(&["user-1"]));
    let store = Arc::new(TestBackingStore::new());
    let mut notifier = FanoutNotifier::default();
    notifier.push_concurrency = 1;
    notifier
        .init(
            store.clone() as Arc<dyn BackingStore<NotificationRecord>>,
            publisher.clone(),
        )
        .expect("notifier init");

    let report = notifier.notify(&event(), &users(5)).await.unwrap();

    assert_eq!(report.recipients(), 5);
    assert_eq!(report.delivered(), 4);
    assert_eq!(report.failed(), 1);
    let failed = report
        .outcomes
        .iter()
        .find(|outcome| !outcome.is_delivered())
        .unwrap();
    assert_eq!(failed.recipient(), &UserId::from("user-1"));
    assert!(matches!(
        failed,
        herald_notify::PushOutcome::Failed { reason, .. } if reason.starts_with("push panicked")
    ));

    // Every recipient was attempted and every record kept
    assert_eq!(publisher.calls(), 5);
    assert_eq!(publisher.published.lock().unwrap().len(), 4);
    assert_eq!(store.record_count(), 5);
}

#[tokio::test]
async fn test_duplicate_recipients_get_one_record() {
    let publisher = Arc::new(ScriptedPublisher::default());
    let (notifier, store) = notifier(publisher.clone());

    let recipients = ["a", "b", "a", "c", "b"].map(UserId::from);
    let report = notifier.notify(&event(), &recipients).await.unwrap();

    assert_eq!(report.recipients(), 3);
    assert_eq!(store.record_count(), 3);
    assert_eq!(publisher.calls(), 3);
}

#[tokio::test]
async fn test_no_recipients_is_a_no_op() {
    let publisher = Arc::new(ScriptedPublisher::default());
    let (notifier, store) = notifier(publisher.clone());
    store.set_available(false);

    let report = notifier.notify(&event(), &[]).await.unwrap();

    assert!(report.outcomes.is_empty());
    assert_eq!(publisher.calls(), 0);
    store.set_available(true);
    assert_eq!(store.count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_persist_failure_is_returned_and_nothing_is_pushed() {
    let publisher = Arc::new(ScriptedPublisher::default());
    let (notifier, store) = notifier(publisher.clone());
    store.set_available(false);

    let result = notifier.notify(&event(), &users(3)).await;

    assert!(matches!(result, Err(NotifyError::Store(_))));
    assert_eq!(publisher.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_hanging_push_times_out() {
    let publisher = Arc::new(ScriptedPublisher {
        hanging: HashSet::from(["private-user.user-0".to_string()]),
        ..ScriptedPublisher::default()
    });
    let (mut notifier, store) = notifier(publisher.clone());
    notifier.push_timeout_secs = 1;

    let report = notifier.notify(&event(), &users(2)).await.unwrap();

    assert_eq!(report.delivered(), 1);
    assert_eq!(report.failed(), 1);
    assert_eq!(store.record_count(), 2);
    assert_eq!(publisher.published.lock().unwrap().as_slice(), ["private-user.user-1"]);
    let timed_out = report.outcomes.iter().find(|o| !o.is_delivered()).unwrap();
    assert_eq!(timed_out.recipient(), &UserId::from("user-0"));
}

#[tokio::test]
async fn test_online_subscriber_receives_the_record() {
    let publisher = Arc::new(BroadcastPublisher::new());
    let mut online = publisher.subscribe(&UserId::from("user-0"));
    let (notifier, _store) = notifier(publisher.clone());

    let report = notifier.notify(&event(), &users(2)).await.unwrap();

    // user-1 has no subscriber; the record waits in their inbox
    assert_eq!(report.delivered(), 1);
    assert_eq!(report.failed(), 1);

    let pushed = tokio::time::timeout(Duration::from_secs(1), online.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(pushed.recipient, UserId::from("user-0"));
    assert_eq!(pushed.link.as_deref(), Some("/tasks/42"));
}

#[tokio::test]
async fn test_inbox_read_tracking() {
    let publisher = Arc::new(ScriptedPublisher::default());
    let (notifier, store) = notifier(publisher);
    let inbox = Inbox::new(store.clone() as Arc<dyn BackingStore<NotificationRecord>>);
    let alice = UserId::from("alice");
    let bob = UserId::from("bob");

    notifier
        .notify(&event(), &[alice.clone(), bob.clone()])
        .await
        .unwrap();
    std::thread::sleep(Duration::from_millis(2));
    notifier
        .notify(&EventDescriptor::new("task.done", "Done", "Finished"), &[alice.clone()])
        .await
        .unwrap();

    let listed = inbox.list(&alice, false).await.unwrap();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].kind, "task.done");
    assert_eq!(inbox.unread_count(&alice).await.unwrap(), 2);

    let read = inbox.mark_read(&listed[0].id).await.unwrap();
    assert!(read.is_read);
    assert!(read.read_at.is_some());
    let again = inbox.mark_read(&listed[0].id).await.unwrap();
    assert_eq!(again.read_at, read.read_at);
    assert_eq!(inbox.unread_count(&alice).await.unwrap(), 1);

    assert_eq!(inbox.mark_all_read(&alice).await.unwrap(), 1);
    assert_eq!(inbox.mark_all_read(&alice).await.unwrap(), 0);
    assert_eq!(inbox.unread_count(&alice).await.unwrap(), 0);
    assert!(inbox.list(&alice, true).await.unwrap().is_empty());

    // Other recipients are untouched
    assert_eq!(inbox.unread_count(&bob).await.unwrap(), 1);
}

#[tokio::test]
async fn test_mark_read_unknown_id() {
    let (_, store) = notifier(Arc::new(ScriptedPublisher::default()));
    let inbox = Inbox::new(store as Arc<dyn BackingStore<NotificationRecord>>);

    let error = inbox
        .mark_read(&herald_store::RecordId::generate())
        .await
        .unwrap_err();
    assert!(error.is_not_found());
}
