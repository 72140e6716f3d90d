//! Control handler implementation for herald
//!
//! Implements [`CommandHandler`] on top of the delivery service, the
//! notifier and the inbox. Every command is authorized through
//! [`policy::evaluate`] before it touches a record.

use std::{str::FromStr, sync::Arc, time::Instant};

use async_trait::async_trait;
use herald_common::{
    UserId,
    tracing::{debug, warn},
};
use herald_control::{
    Capability, CommandHandler, ControlError, DeliveryCommand, NotificationCommand, Request,
    RequestCommand, Requester, Resource, Response, ResponseData, Role, Scope, SystemCommand,
    policy,
    protocol::{
        DeliveryDetails, DeliverySummary, FanoutSummary, NotificationSummary, SweepSummary,
        SystemStatus,
    },
};
use herald_delivery::{
    DeliveryFilter, DeliveryProcessor, DeliveryRecord, DeliveryService, DeliveryStatus,
    NewDelivery,
};
use herald_notify::{EventDescriptor, FanoutNotifier, FanoutReport, Inbox};
use herald_store::RecordId;

/// Handler for control commands
pub struct HeraldControlHandler {
    delivery: Arc<DeliveryProcessor>,
    notifier: Arc<FanoutNotifier>,
    inbox: Inbox,
    /// Server start time for uptime calculation
    start_time: Instant,
}

type Result<T> = herald_control::Result<T>;

fn server_error(e: impl std::fmt::Display) -> ControlError {
    ControlError::ServerError(e.to_string())
}

fn denied(requester: &Requester) -> ControlError {
    warn!(user = %requester.user, role = ?requester.role, "Control request denied");
    ControlError::ServerError("Permission denied".to_string())
}

fn parse_id(id: &str) -> Result<RecordId> {
    RecordId::from_str(id).map_err(|_| ControlError::ServerError(format!("Invalid id: {id}")))
}

fn require(capability: Capability, requester: &Requester, manage: bool) -> Result<()> {
    let allowed = if manage {
        capability.can_manage()
    } else {
        capability.can_view()
    };

    if allowed { Ok(()) } else { Err(denied(requester)) }
}

fn require_inbox(requester: &Requester, owner: &UserId) -> Result<()> {
    require(
        policy::evaluate(requester, Resource::Inbox { owner }),
        requester,
        true,
    )
}

fn resource(record: &DeliveryRecord) -> Resource<'_> {
    Resource::Delivery {
        created_by: &record.created_by,
        company: record.company.as_ref(),
    }
}

/// The filter that keeps a listing within what the requester may see
fn scoped(requester: &Requester, status: Option<DeliveryStatus>) -> DeliveryFilter {
    let mut filter = DeliveryFilter {
        status,
        ..DeliveryFilter::default()
    };
    match policy::scope(requester) {
        Scope::All => {}
        Scope::Company(company) => filter.company = Some(company),
        Scope::Own(user) => filter.created_by = Some(user),
    }
    filter
}

impl HeraldControlHandler {
    /// Create a new control handler
    #[must_use]
    pub fn new(delivery: Arc<DeliveryProcessor>, notifier: Arc<FanoutNotifier>, inbox: Inbox) -> Self {
        Self {
            delivery,
            notifier,
            inbox,
            start_time: Instant::now(),
        }
    }

    /// Load a delivery and check the requester's capability on it
    async fn authorized_delivery(
        &self,
        requester: &Requester,
        id: &str,
        manage: bool,
    ) -> Result<DeliveryRecord> {
        let id = parse_id(id)?;
        let record = self.delivery.get_delivery(&id).await.map_err(server_error)?;
        require(policy::evaluate(requester, resource(&record)), requester, manage)?;
        Ok(record)
    }

    async fn handle_delivery_command(
        &self,
        requester: &Requester,
        command: DeliveryCommand,
    ) -> Result<Response> {
        match command {
            DeliveryCommand::Create(request) => {
                require(policy::evaluate(requester, Resource::DeliveryQueue), requester, false)?;
                let request = attribute(requester, *request);
                let record = self
                    .delivery
                    .create_delivery(request)
                    .await
                    .map_err(server_error)?;
                Ok(Response::data(ResponseData::DeliveryDetails(
                    DeliveryDetails::from(&record),
                )))
            }

            DeliveryCommand::List { status, page } => {
                let records = self
                    .delivery
                    .list_deliveries(&scoped(requester, status), page)
                    .await
                    .map_err(server_error)?;
                Ok(Response::data(ResponseData::DeliveryList(
                    records.iter().map(DeliverySummary::from).collect(),
                )))
            }

            DeliveryCommand::View { id } => {
                let record = self.authorized_delivery(requester, &id, false).await?;
                Ok(Response::data(ResponseData::DeliveryDetails(
                    DeliveryDetails::from(&record),
                )))
            }

            DeliveryCommand::Cancel { id } => {
                let record = self.authorized_delivery(requester, &id, true).await?;
                let record = self
                    .delivery
                    .cancel_delivery(&record.id)
                    .await
                    .map_err(server_error)?;
                Ok(Response::data(ResponseData::DeliveryDetails(
                    DeliveryDetails::from(&record),
                )))
            }

            DeliveryCommand::Retry { id } => {
                let record = self.authorized_delivery(requester, &id, true).await?;
                let record = self
                    .delivery
                    .retry_delivery(&record.id)
                    .await
                    .map_err(server_error)?;
                Ok(Response::data(ResponseData::DeliveryDetails(
                    DeliveryDetails::from(&record),
                )))
            }

            DeliveryCommand::Stats => {
                let stats = self
                    .delivery
                    .delivery_stats(&scoped(requester, None))
                    .await
                    .map_err(server_error)?;
                Ok(Response::data(ResponseData::DeliveryStats(stats)))
            }

            DeliveryCommand::ProcessNow => {
                require(policy::evaluate(requester, Resource::DeliveryQueue), requester, true)?;
                let outcome = self.delivery.process_now().await.map_err(server_error)?;
                debug!("Sweep requested over control socket: {outcome:?}");
                Ok(Response::data(ResponseData::Sweep(SweepSummary::from(&outcome))))
            }
        }
    }

    async fn handle_notification_command(
        &self,
        requester: &Requester,
        command: NotificationCommand,
    ) -> Result<Response> {
        match command {
            NotificationCommand::Publish { event, recipients } => {
                require(policy::evaluate(requester, Resource::Broadcast), requester, true)?;
                let report = self.publish(&event, &recipients).await?;
                Ok(Response::data(ResponseData::Fanout(FanoutSummary::from(&report))))
            }

            NotificationCommand::List {
                recipient,
                unread_only,
            } => {
                require_inbox(requester, &recipient)?;
                let records = self
                    .inbox
                    .list(&recipient, unread_only)
                    .await
                    .map_err(server_error)?;
                Ok(Response::data(ResponseData::NotificationList(
                    records.iter().map(NotificationSummary::from).collect(),
                )))
            }

            NotificationCommand::MarkRead { id } => {
                let id = parse_id(&id)?;
                let record = self.inbox.get(&id).await.map_err(server_error)?;
                require_inbox(requester, &record.recipient)?;
                let record = self.inbox.mark_read(&id).await.map_err(server_error)?;
                Ok(Response::data(ResponseData::Notification(
                    NotificationSummary::from(&record),
                )))
            }

            NotificationCommand::MarkAllRead { recipient } => {
                require_inbox(requester, &recipient)?;
                let changed = self
                    .inbox
                    .mark_all_read(&recipient)
                    .await
                    .map_err(server_error)?;
                Ok(Response::data(ResponseData::Count(changed)))
            }
        }
    }

    async fn publish(
        &self,
        event: &EventDescriptor,
        recipients: &[UserId],
    ) -> Result<FanoutReport> {
        self.notifier
            .notify(event, recipients)
            .await
            .map_err(server_error)
    }

    async fn handle_system_command(
        &self,
        requester: &Requester,
        command: SystemCommand,
    ) -> Result<Response> {
        match command {
            SystemCommand::Ping => Ok(Response::ok()),

            SystemCommand::Status => {
                let deliveries = self
                    .delivery
                    .delivery_stats(&scoped(requester, None))
                    .await
                    .map_err(server_error)?;
                let notifications = self
                    .notifier
                    .store()
                    .map_err(server_error)?
                    .count()
                    .await
                    .map_err(server_error)?;

                let status = SystemStatus {
                    version: env!("CARGO_PKG_VERSION").to_string(),
                    uptime_secs: self.start_time.elapsed().as_secs(),
                    deliveries,
                    sweeping: self.delivery.is_sweeping(),
                    notifications,
                };

                Ok(Response::data(ResponseData::SystemStatus(status)))
            }
        }
    }
}

/// Stamp a new delivery with who asked for it
///
/// Only a super-admin may create on behalf of someone else or another
/// company.
fn attribute(requester: &Requester, mut request: NewDelivery) -> NewDelivery {
    if requester.role != Role::SuperAdmin {
        request.created_by = requester.user.clone();
        request.company.clone_from(&requester.company);
    }
    request
}

#[async_trait]
impl CommandHandler for HeraldControlHandler {
    async fn handle_request(&self, request: Request) -> Result<Response> {
        let Request {
            requester, command, ..
        } = request;

        match command {
            RequestCommand::Delivery(command) => {
                self.handle_delivery_command(&requester, command).await
            }
            RequestCommand::Notification(command) => {
                self.handle_notification_command(&requester, command).await
            }
            RequestCommand::System(command) => {
                self.handle_system_command(&requester, command).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use herald_delivery::Mailbox;

    use super::*;

    #[test]
    fn test_scoped_filters_follow_policy() {
        let admin = Requester::new("root", Role::SuperAdmin, None);
        assert_eq!(scoped(&admin, None), DeliveryFilter::default());

        let manager = Requester::new("mia", Role::Manager, Some("acme"));
        let filter = scoped(&manager, Some(DeliveryStatus::Failed));
        assert_eq!(filter.status, Some(DeliveryStatus::Failed));
        assert_eq!(filter.company.as_ref().map(|c| c.as_str()), Some("acme"));

        let loner = Requester::new("lee", Role::Employee, None);
        assert_eq!(scoped(&loner, None).created_by, Some(UserId::from("lee")));
    }

    #[test]
    fn test_attribute_overrides_creator_unless_super_admin() {
        let request = NewDelivery {
            sender: Mailbox::new("noreply@herald.test"),
            recipient: Mailbox::new("ana@example.com"),
            subject: "Reminder".to_string(),
            body: "Hello".to_string(),
            template: None,
            variables: BTreeMap::new(),
            immediate: true,
            due_at: None,
            created_by: UserId::from("someone-else"),
            company: None,
        };

        let employee = Requester::new("eve", Role::Employee, Some("acme"));
        let stamped = attribute(&employee, request.clone());
        assert_eq!(stamped.created_by, UserId::from("eve"));
        assert_eq!(stamped.company.as_ref().map(|c| c.as_str()), Some("acme"));

        let admin = Requester::new("root", Role::SuperAdmin, None);
        assert_eq!(attribute(&admin, request).created_by, UserId::from("someone-else"));
    }

    #[test]
    fn test_bad_ids_are_rejected() {
        assert!(parse_id("not-a-ulid").is_err());
        assert!(parse_id("01ARZ3NDEKTSV4RRFFQ69G5FAV").is_ok());
    }
}
