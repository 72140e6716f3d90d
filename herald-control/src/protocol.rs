//! Control protocol types and serialization

use std::fmt::{Display, Formatter};

use chrono::{DateTime, Utc};
use herald_common::UserId;
use herald_delivery::{DeliveryRecord, DeliveryStats, DeliveryStatus, NewDelivery, Page, SweepOutcome};
use herald_notify::{EventDescriptor, FanoutReport, NotificationRecord};
use serde::{Deserialize, Serialize};

use crate::policy::Requester;

/// Current protocol version
pub const PROTOCOL_VERSION: u32 = 1;

fn format_time(time: Option<&DateTime<Utc>>) -> String {
    time.map_or_else(
        || "-".to_string(),
        |time| time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

/// Request sent to the control server (versioned wrapper)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Protocol version
    pub version: u32,
    /// Optional authentication token (bearer token)
    ///
    /// When authentication is enabled on the server, this must be provided
    /// and must match one of the configured token hashes.
    #[serde(default)]
    pub token: Option<String>,
    /// Who is asking; authorization is decided from this
    pub requester: Requester,
    /// The actual command to execute
    pub command: RequestCommand,
}

/// Request command types
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RequestCommand {
    Delivery(DeliveryCommand),
    Notification(NotificationCommand),
    System(SystemCommand),
}

/// Scheduled delivery commands
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DeliveryCommand {
    /// Schedule a new delivery
    Create(Box<NewDelivery>),
    /// List deliveries visible to the requester, newest first
    List {
        status: Option<DeliveryStatus>,
        page: Page,
    },
    View {
        id: String,
    },
    Cancel {
        id: String,
    },
    Retry {
        id: String,
    },
    /// Counts by status, within the requester's scope
    Stats,
    /// Trigger a sweep now
    ProcessNow,
}

/// In-app notification commands
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum NotificationCommand {
    /// Fan an event out to recipients
    Publish {
        event: EventDescriptor,
        recipients: Vec<UserId>,
    },
    List {
        recipient: UserId,
        unread_only: bool,
    },
    MarkRead {
        id: String,
    },
    MarkAllRead {
        recipient: UserId,
    },
}

/// System management commands
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SystemCommand {
    /// Health check / ping
    Ping,
    /// Get system status and statistics
    Status,
}

/// Response from the control server (versioned wrapper)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// Protocol version
    pub version: u32,
    /// The actual response payload
    pub payload: ResponsePayload,
}

/// Response payload types
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ResponsePayload {
    /// Command succeeded
    Ok,
    /// Command succeeded with data
    Data(Box<ResponseData>),
    /// Command failed with error message
    Error(String),
}

/// Response data types
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ResponseData {
    DeliveryList(Vec<DeliverySummary>),
    DeliveryDetails(DeliveryDetails),
    DeliveryStats(DeliveryStats),
    Sweep(SweepSummary),
    NotificationList(Vec<NotificationSummary>),
    Notification(NotificationSummary),
    Fanout(FanoutSummary),
    /// Number of records a command changed
    Count(usize),
    SystemStatus(SystemStatus),
    /// Simple string message
    Message(String),
}

/// Delivery summary (for list command)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliverySummary {
    pub id: String,
    pub recipient: String,
    pub subject: String,
    pub status: DeliveryStatus,
    /// `None` for immediate deliveries
    pub due_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<&DeliveryRecord> for DeliverySummary {
    fn from(record: &DeliveryRecord) -> Self {
        Self {
            id: record.id.to_string(),
            recipient: record.recipient.address.clone(),
            subject: record.subject.clone(),
            status: record.status,
            due_at: if record.immediate { None } else { record.due_at },
            created_at: record.created_at,
        }
    }
}

impl Display for DeliverySummary {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "ID:        {}", self.id)?;
        writeln!(f, "To:        {}", self.recipient)?;
        writeln!(f, "Subject:   {}", self.subject)?;
        writeln!(f, "Status:    {}", self.status)?;
        match &self.due_at {
            Some(due_at) => writeln!(f, "Due:       {}", format_time(Some(due_at)))?,
            None => writeln!(f, "Due:       immediately")?,
        }
        writeln!(f, "Created:   {}", format_time(Some(&self.created_at)))
    }
}

/// Full delivery record (for view command)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryDetails {
    pub id: String,
    pub sender: String,
    pub recipient: String,
    pub subject: String,
    pub template: Option<String>,
    pub status: DeliveryStatus,
    pub immediate: bool,
    pub due_at: Option<DateTime<Utc>>,
    pub sent_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub attempts: u32,
    pub created_by: String,
    pub company: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub body: String,
}

impl From<&DeliveryRecord> for DeliveryDetails {
    fn from(record: &DeliveryRecord) -> Self {
        Self {
            id: record.id.to_string(),
            sender: record.sender.to_string(),
            recipient: record.recipient.to_string(),
            subject: record.subject.clone(),
            template: record.template.clone(),
            status: record.status,
            immediate: record.immediate,
            due_at: record.due_at,
            sent_at: record.sent_at,
            failed_at: record.failed_at,
            last_error: record.last_error.clone(),
            attempts: record.attempts,
            created_by: record.created_by.to_string(),
            company: record.company.as_ref().map(ToString::to_string),
            created_at: record.created_at,
            updated_at: record.updated_at,
            body: record.body.clone(),
        }
    }
}

impl Display for DeliveryDetails {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "ID:         {}", self.id)?;
        writeln!(f, "From:       {}", self.sender)?;
        writeln!(f, "To:         {}", self.recipient)?;
        writeln!(f, "Subject:    {}", self.subject)?;
        if let Some(template) = &self.template {
            writeln!(f, "Template:   {template}")?;
        }
        writeln!(f, "Status:     {}", self.status)?;
        if self.immediate {
            writeln!(f, "Due:        immediately")?;
        } else {
            writeln!(f, "Due:        {}", format_time(self.due_at.as_ref()))?;
        }
        if self.sent_at.is_some() {
            writeln!(f, "Sent:       {}", format_time(self.sent_at.as_ref()))?;
        }
        if self.failed_at.is_some() {
            writeln!(f, "Failed:     {}", format_time(self.failed_at.as_ref()))?;
        }
        if let Some(error) = &self.last_error {
            writeln!(f, "Last error: {error}")?;
        }
        writeln!(f, "Attempts:   {}", self.attempts)?;
        writeln!(f, "Created by: {}", self.created_by)?;
        if let Some(company) = &self.company {
            writeln!(f, "Company:    {company}")?;
        }
        writeln!(f, "Created:    {}", format_time(Some(&self.created_at)))?;
        writeln!(f, "Updated:    {}", format_time(Some(&self.updated_at)))?;

        f.write_str("\n--- Body ---\n")?;
        writeln!(f, "{}", self.body)
    }
}

/// How a requested sweep went
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SweepSummary {
    Completed {
        due: usize,
        sent: usize,
        failed: usize,
        skipped: usize,
    },
    AlreadyRunning,
    Aborted(String),
}

impl From<&SweepOutcome> for SweepSummary {
    fn from(outcome: &SweepOutcome) -> Self {
        match outcome {
            SweepOutcome::Completed(report) => Self::Completed {
                due: report.due,
                sent: report.sent(),
                failed: report.failed(),
                skipped: report.skipped(),
            },
            SweepOutcome::AlreadyRunning => Self::AlreadyRunning,
            SweepOutcome::Aborted(reason) => Self::Aborted(reason.clone()),
        }
    }
}

impl Display for SweepSummary {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Completed {
                due,
                sent,
                failed,
                skipped,
            } => write!(
                f,
                "Sweep completed: {due} due, {sent} sent, {failed} failed, {skipped} skipped"
            ),
            Self::AlreadyRunning => f.write_str("A sweep is already running"),
            Self::Aborted(reason) => write!(f, "Sweep aborted: {reason}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationSummary {
    pub id: String,
    pub recipient: String,
    pub kind: String,
    pub title: String,
    pub message: String,
    pub link: Option<String>,
    pub is_read: bool,
    pub source_event: String,
    pub created_at: DateTime<Utc>,
}

impl From<&NotificationRecord> for NotificationSummary {
    fn from(record: &NotificationRecord) -> Self {
        Self {
            id: record.id.to_string(),
            recipient: record.recipient.to_string(),
            kind: record.kind.clone(),
            title: record.title.clone(),
            message: record.message.clone(),
            link: record.link.clone(),
            is_read: record.is_read,
            source_event: record.source_event.to_string(),
            created_at: record.created_at,
        }
    }
}

impl Display for NotificationSummary {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let marker = if self.is_read { " " } else { "*" };
        writeln!(f, "{marker} {} [{}] {}", self.id, self.kind, self.title)?;
        writeln!(f, "  {}", self.message)?;
        if let Some(link) = &self.link {
            writeln!(f, "  -> {link}")?;
        }
        writeln!(f, "  {}", format_time(Some(&self.created_at)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FanoutSummary {
    pub source_event: String,
    pub recipients: usize,
    pub delivered: usize,
    pub failed: usize,
}

impl From<&FanoutReport> for FanoutSummary {
    fn from(report: &FanoutReport) -> Self {
        Self {
            source_event: report.source_event.to_string(),
            recipients: report.recipients(),
            delivered: report.delivered(),
            failed: report.failed(),
        }
    }
}

impl Display for FanoutSummary {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Event {}: {} notified, {} pushed live, {} waiting in inbox",
            self.source_event, self.recipients, self.delivered, self.failed
        )
    }
}

/// System status information
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemStatus {
    /// Server version
    pub version: String,
    /// Uptime in seconds
    pub uptime_secs: u64,
    pub deliveries: DeliveryStats,
    /// Whether a sweep is in flight right now
    pub sweeping: bool,
    pub notifications: usize,
}

impl Display for SystemStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Version:       {}", self.version)?;
        writeln!(f, "Uptime:        {}s", self.uptime_secs)?;
        writeln!(
            f,
            "Deliveries:    {} pending, {} sent, {} failed, {} cancelled",
            self.deliveries.pending,
            self.deliveries.sent,
            self.deliveries.failed,
            self.deliveries.cancelled
        )?;
        writeln!(
            f,
            "Sweep:         {}",
            if self.sweeping { "running" } else { "idle" }
        )?;
        writeln!(f, "Notifications: {}", self.notifications)
    }
}

impl Request {
    /// Create a new request with the current protocol version
    #[must_use]
    pub const fn new(requester: Requester, command: RequestCommand) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            token: None,
            requester,
            command,
        }
    }

    /// Create a new request with authentication token
    #[must_use]
    pub fn with_token(
        requester: Requester,
        command: RequestCommand,
        token: impl Into<String>,
    ) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            token: Some(token.into()),
            requester,
            command,
        }
    }

    /// Check if the request version is compatible with the current version
    #[must_use]
    pub const fn is_version_compatible(&self) -> bool {
        self.version == PROTOCOL_VERSION
    }
}

impl Response {
    /// Create an error response
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            payload: ResponsePayload::Error(message.into()),
        }
    }

    /// Create a success response with no data
    #[must_use]
    pub const fn ok() -> Self {
        Self {
            version: PROTOCOL_VERSION,
            payload: ResponsePayload::Ok,
        }
    }

    /// Create a response with data
    #[must_use]
    pub fn data(data: ResponseData) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            payload: ResponsePayload::Data(Box::new(data)),
        }
    }

    /// Check if the response indicates success (not an error)
    #[must_use]
    pub const fn is_success(&self) -> bool {
        !matches!(self.payload, ResponsePayload::Error(_))
    }

    /// Check if the response version is compatible with the current version
    #[must_use]
    pub const fn is_version_compatible(&self) -> bool {
        self.version == PROTOCOL_VERSION
    }
}
