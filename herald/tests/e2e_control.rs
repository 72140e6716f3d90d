//! End-to-end tests: a full herald driven through its control socket
#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

mod support;

use std::collections::BTreeMap;

use chrono::{Duration, Utc};
use herald_common::UserId;
use herald_control::{
    ControlError, DeliveryCommand, NotificationCommand, RequestCommand, ResponseData,
    ResponsePayload, SystemCommand,
    protocol::{FanoutSummary, SweepSummary},
};
use herald_delivery::{DeliveryStatus, Mailbox, NewDelivery, Page};
use herald_notify::EventDescriptor;
use pretty_assertions::assert_eq;
use support::{TestHerald, admin, employee, manager};

fn new_delivery(immediate: bool) -> NewDelivery {
    NewDelivery {
        sender: Mailbox::named("Herald", "noreply@herald.test"),
        recipient: Mailbox::named("Ana", "ana@example.com"),
        subject: "Contract renewal".to_string(),
        body: "Hello {{recipient_name}}".to_string(),
        template: None,
        variables: BTreeMap::new(),
        immediate,
        due_at: (!immediate).then(|| Utc::now() + Duration::days(1)),
        // Overwritten with the requester
        created_by: UserId::from("nobody"),
        company: None,
    }
}

fn create(immediate: bool) -> RequestCommand {
    RequestCommand::Delivery(DeliveryCommand::Create(Box::new(new_delivery(immediate))))
}

fn delivery(command: DeliveryCommand) -> RequestCommand {
    RequestCommand::Delivery(command)
}

fn notification(command: NotificationCommand) -> RequestCommand {
    RequestCommand::Notification(command)
}

fn denied(result: herald_control::Result<herald_control::Response>) -> bool {
    matches!(result, Err(ControlError::ServerError(ref msg)) if msg.contains("Permission denied"))
}

#[tokio::test]
async fn test_created_delivery_is_sent_by_process_now() {
    let herald = TestHerald::start("").await;
    let eve = employee("eve", "acme");

    let ResponseData::DeliveryDetails(created) = herald.data(&eve, create(true)).await else {
        panic!("expected delivery details");
    };
    assert_eq!(created.status, DeliveryStatus::Pending);
    assert_eq!(created.created_by, "eve");
    assert_eq!(created.company.as_deref(), Some("acme"));

    // Employees may not trigger sweeps
    assert!(denied(
        herald.send(&eve, delivery(DeliveryCommand::ProcessNow)).await
    ));

    let sweep = herald
        .data(&manager("acme"), delivery(DeliveryCommand::ProcessNow))
        .await;
    assert!(matches!(
        sweep,
        ResponseData::Sweep(SweepSummary::Completed {
            due: 1,
            sent: 1,
            failed: 0,
            skipped: 0
        })
    ));

    let ResponseData::DeliveryDetails(viewed) = herald
        .data(&eve, delivery(DeliveryCommand::View { id: created.id }))
        .await
    else {
        panic!("expected delivery details");
    };
    assert_eq!(viewed.status, DeliveryStatus::Sent);
    assert!(viewed.sent_at.is_some());
    assert_eq!(viewed.attempts, 1);

    let ResponseData::DeliveryStats(stats) =
        herald.data(&admin(), delivery(DeliveryCommand::Stats)).await
    else {
        panic!("expected stats");
    };
    assert_eq!(stats.sent, 1);
    assert_eq!(stats.total(), 1);

    herald.stop().await;
}

#[tokio::test]
async fn test_delivery_permissions_follow_company_and_role() {
    let herald = TestHerald::start("").await;
    let eve = employee("eve", "acme");
    let bob = employee("bob", "acme");
    let mallory = employee("mallory", "globex");

    let ResponseData::DeliveryDetails(created) = herald.data(&eve, create(false)).await else {
        panic!("expected delivery details");
    };
    let id = created.id;

    // A colleague can look but not touch
    assert!(
        herald
            .send(&bob, delivery(DeliveryCommand::View { id: id.clone() }))
            .await
            .is_ok()
    );
    assert!(denied(
        herald
            .send(&bob, delivery(DeliveryCommand::Cancel { id: id.clone() }))
            .await
    ));

    // Another company cannot even see it
    assert!(denied(
        herald
            .send(&mallory, delivery(DeliveryCommand::View { id: id.clone() }))
            .await
    ));
    let ResponseData::DeliveryList(listed) = herald
        .data(
            &mallory,
            delivery(DeliveryCommand::List {
                status: None,
                page: Page::default(),
            }),
        )
        .await
    else {
        panic!("expected a list");
    };
    assert!(listed.is_empty());

    // Their manager can cancel, once
    let ResponseData::DeliveryDetails(cancelled) = herald
        .data(
            &manager("acme"),
            delivery(DeliveryCommand::Cancel { id: id.clone() }),
        )
        .await
    else {
        panic!("expected delivery details");
    };
    assert_eq!(cancelled.status, DeliveryStatus::Cancelled);

    let again = herald
        .send(&eve, delivery(DeliveryCommand::Cancel { id: id.clone() }))
        .await;
    assert!(
        matches!(again, Err(ControlError::ServerError(ref msg)) if msg.contains("cannot be cancelled")),
        "{again:?}"
    );

    // Only failed deliveries can be retried
    let retry = herald.send(&eve, delivery(DeliveryCommand::Retry { id })).await;
    assert!(
        matches!(retry, Err(ControlError::ServerError(ref msg)) if msg.contains("cannot be retried")),
        "{retry:?}"
    );

    herald.stop().await;
}

#[tokio::test]
async fn test_unknown_and_malformed_ids() {
    let herald = TestHerald::start("").await;

    let malformed = herald
        .send(
            &admin(),
            delivery(DeliveryCommand::View {
                id: "not-an-id".to_string(),
            }),
        )
        .await;
    assert!(matches!(malformed, Err(ControlError::ServerError(ref msg)) if msg.contains("Invalid id")));

    let unknown = herald
        .send(
            &admin(),
            delivery(DeliveryCommand::Cancel {
                id: "01ARZ3NDEKTSV4RRFFQ69G5FAV".to_string(),
            }),
        )
        .await;
    assert!(matches!(unknown, Err(ControlError::ServerError(_))));

    herald.stop().await;
}

#[tokio::test]
async fn test_published_event_reaches_inboxes_and_live_subscribers() {
    let herald = TestHerald::start("").await;
    let eve = employee("eve", "acme");
    let bob = employee("bob", "acme");

    let mut live = herald.services.publisher.subscribe(&eve.user);

    let publish = notification(NotificationCommand::Publish {
        event: EventDescriptor::new("task.assigned", "New task", "You have a new task")
            .with_link("/tasks/7"),
        recipients: vec![eve.user.clone(), bob.user.clone(), eve.user.clone()],
    });

    // Only managers broadcast
    assert!(denied(herald.send(&eve, publish.clone()).await));

    let ResponseData::Fanout(fanout) = herald.data(&manager("acme"), publish).await else {
        panic!("expected a fan-out summary");
    };
    assert_eq!(
        fanout,
        FanoutSummary {
            source_event: fanout.source_event.clone(),
            recipients: 2,
            delivered: 1,
            failed: 1,
        }
    );

    let pushed = live.recv().await.expect("live push");
    assert_eq!(pushed.title, "New task");
    assert_eq!(pushed.recipient, eve.user);

    // Nobody reads someone else's inbox
    assert!(denied(
        herald
            .send(
                &bob,
                notification(NotificationCommand::List {
                    recipient: eve.user.clone(),
                    unread_only: false,
                }),
            )
            .await
    ));

    let ResponseData::NotificationList(inbox) = herald
        .data(
            &eve,
            notification(NotificationCommand::List {
                recipient: eve.user.clone(),
                unread_only: true,
            }),
        )
        .await
    else {
        panic!("expected a notification list");
    };
    assert_eq!(inbox.len(), 1);
    assert_eq!(inbox[0].link.as_deref(), Some("/tasks/7"));

    assert!(denied(
        herald
            .send(
                &bob,
                notification(NotificationCommand::MarkRead {
                    id: inbox[0].id.clone(),
                }),
            )
            .await
    ));

    let ResponseData::Notification(read) = herald
        .data(
            &eve,
            notification(NotificationCommand::MarkRead {
                id: inbox[0].id.clone(),
            }),
        )
        .await
    else {
        panic!("expected a notification");
    };
    assert!(read.is_read);

    let mark_all = |who: &herald_control::Requester| {
        notification(NotificationCommand::MarkAllRead {
            recipient: who.user.clone(),
        })
    };
    assert!(matches!(
        herald.data(&eve, mark_all(&eve)).await,
        ResponseData::Count(0)
    ));
    assert!(matches!(
        herald.data(&bob, mark_all(&bob)).await,
        ResponseData::Count(1)
    ));

    herald.stop().await;
}

#[tokio::test]
async fn test_system_status_reports_both_collections() {
    let herald = TestHerald::start("").await;

    let ping = herald
        .send(&admin(), RequestCommand::System(SystemCommand::Ping))
        .await
        .unwrap();
    assert!(matches!(ping.payload, ResponsePayload::Ok));

    herald.data(&employee("eve", "acme"), create(false)).await;
    herald
        .data(
            &manager("acme"),
            notification(NotificationCommand::Publish {
                event: EventDescriptor::new("leave.approved", "Leave approved", "Enjoy"),
                recipients: vec![UserId::from("eve"), UserId::from("bob")],
            }),
        )
        .await;

    let ResponseData::SystemStatus(status) = herald
        .data(&admin(), RequestCommand::System(SystemCommand::Status))
        .await
    else {
        panic!("expected a system status");
    };
    assert_eq!(status.version, env!("CARGO_PKG_VERSION"));
    assert_eq!(status.deliveries.pending, 1);
    assert!(!status.sweeping);
    assert_eq!(status.notifications, 2);

    // Delivery counts only cover what the requester may list
    let ResponseData::SystemStatus(outsider) = herald
        .data(
            &employee("mallory", "globex"),
            RequestCommand::System(SystemCommand::Status),
        )
        .await
    else {
        panic!("expected a system status");
    };
    assert_eq!(outsider.deliveries.total(), 0);

    herald.stop().await;
}
