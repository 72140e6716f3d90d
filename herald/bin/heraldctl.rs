//! Command-line utility for managing a running herald service
//!
//! Everything goes through the control socket:
//! - Deliveries (list, view, cancel, retry, stats, process-now)
//! - Notifications (list, read, read-all, publish)
//! - System status and health checks

use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use herald_control::{
    ControlClient, DEFAULT_CONTROL_SOCKET, DeliveryCommand, NotificationCommand, Request,
    RequestCommand, Requester, Response, ResponseData, ResponsePayload, Role, SystemCommand,
};
use herald_delivery::{DeliveryStatus, Page};
use herald_notify::EventDescriptor;

/// Command-line utility for managing herald
#[derive(Parser, Debug)]
#[command(name = "heraldctl")]
#[command(about = "Manage the herald delivery service", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the control socket
    #[arg(short = 'c', long, default_value = DEFAULT_CONTROL_SOCKET)]
    control_socket: String,

    /// Authentication token, when the server requires one
    #[arg(long)]
    token: Option<String>,

    /// User to act as
    #[arg(short, long, default_value = "operator")]
    user: String,

    /// Role to act with
    #[arg(long, value_enum, default_value = "super-admin")]
    role: RoleArg,

    /// Company the user belongs to
    #[arg(long)]
    company: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Scheduled email deliveries
    Delivery {
        #[command(subcommand)]
        action: DeliveryAction,
    },
    /// In-app notifications
    Notification {
        #[command(subcommand)]
        action: NotificationAction,
    },
    /// System status and health
    System {
        #[command(subcommand)]
        action: SystemAction,
    },
}

#[derive(Subcommand, Debug)]
enum DeliveryAction {
    /// List deliveries, newest first
    List {
        /// Filter by status
        #[arg(long, value_enum)]
        status: Option<StatusFilter>,

        /// Skip this many deliveries
        #[arg(long, default_value = "0")]
        offset: usize,

        /// Show at most this many deliveries
        #[arg(long, default_value = "50")]
        limit: usize,
    },
    /// View detailed information about a delivery
    View {
        /// Delivery ID to view
        id: String,
    },
    /// Cancel a pending delivery
    Cancel {
        /// Delivery ID to cancel
        id: String,
    },
    /// Put a failed delivery back in the queue
    Retry {
        /// Delivery ID to retry
        id: String,
    },
    /// Show delivery counts by status
    Stats {
        /// Watch mode - continuously update statistics
        #[arg(long)]
        watch: bool,

        /// Update interval in seconds (for watch mode)
        #[arg(long, default_value = "2")]
        interval: u64,
    },
    /// Run a sweep now instead of waiting for the next tick
    ProcessNow,
}

#[derive(Subcommand, Debug)]
enum NotificationAction {
    /// List a user's notifications, newest first
    List {
        /// Whose inbox; defaults to --user
        recipient: Option<String>,

        /// Only unread notifications
        #[arg(long)]
        unread: bool,
    },
    /// Mark one notification read
    Read {
        /// Notification ID
        id: String,
    },
    /// Mark every notification of a user read
    ReadAll {
        /// Whose inbox; defaults to --user
        recipient: Option<String>,
    },
    /// Notify a set of users about an event
    Publish {
        /// Event type, e.g. `task.assigned`
        #[arg(long)]
        kind: String,

        #[arg(long)]
        title: String,

        #[arg(long)]
        message: String,

        /// Link the notification points at
        #[arg(long)]
        link: Option<String>,

        /// Users to notify
        #[arg(required = true)]
        recipients: Vec<String>,
    },
}

#[derive(Subcommand, Debug)]
enum SystemAction {
    /// Check if herald is responding
    Ping,
    /// Get system status and statistics
    Status,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum StatusFilter {
    Pending,
    Sent,
    Failed,
    Cancelled,
}

impl From<StatusFilter> for DeliveryStatus {
    fn from(filter: StatusFilter) -> Self {
        match filter {
            StatusFilter::Pending => Self::Pending,
            StatusFilter::Sent => Self::Sent,
            StatusFilter::Failed => Self::Failed,
            StatusFilter::Cancelled => Self::Cancelled,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum RoleArg {
    SuperAdmin,
    Manager,
    Employee,
}

impl From<RoleArg> for Role {
    fn from(role: RoleArg) -> Self {
        match role {
            RoleArg::SuperAdmin => Self::SuperAdmin,
            RoleArg::Manager => Self::Manager,
            RoleArg::Employee => Self::Employee,
        }
    }
}

/// Who requests are sent as, and with which token
struct Identity {
    requester: Requester,
    token: Option<String>,
}

impl Identity {
    fn request(&self, command: RequestCommand) -> Request {
        match &self.token {
            Some(token) => Request::with_token(self.requester.clone(), command, token.as_str()),
            None => Request::new(self.requester.clone(), command),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    let identity = Identity {
        requester: Requester::new(cli.user.as_str(), cli.role.into(), cli.company.as_deref()),
        token: cli.token.or_else(|| std::env::var("HERALD_TOKEN").ok()),
    };
    let client = check_control_socket(&cli.control_socket)?;

    match cli.command {
        Commands::Delivery { action } => {
            handle_delivery_command(&cli.control_socket, client, &identity, action).await
        }
        Commands::Notification { action } => {
            handle_notification_command(&client, &identity, action).await
        }
        Commands::System { action } => handle_system_command(&client, &identity, action).await,
    }
}

/// Build a client, failing early with a readable message if herald isn't
/// running
fn check_control_socket(socket_path: &str) -> anyhow::Result<ControlClient> {
    let client = ControlClient::new(socket_path);

    if let Err(e) = client.check_socket_exists() {
        anyhow::bail!("{e}\nIs herald running? Check the control socket path with --control-socket");
    }

    Ok(client)
}

async fn handle_delivery_command(
    socket_path: &str,
    client: ControlClient,
    identity: &Identity,
    action: DeliveryAction,
) -> anyhow::Result<()> {
    let command = match action {
        DeliveryAction::List {
            status,
            offset,
            limit,
        } => DeliveryCommand::List {
            status: status.map(Into::into),
            page: Page { offset, limit },
        },
        DeliveryAction::View { id } => DeliveryCommand::View { id },
        DeliveryAction::Cancel { id } => DeliveryCommand::Cancel { id },
        DeliveryAction::Retry { id } => DeliveryCommand::Retry { id },
        DeliveryAction::Stats { watch, interval } => {
            if watch {
                let client = ControlClient::new(socket_path).with_persistent_connection();
                return watch_stats(&client, identity, interval).await;
            }
            DeliveryCommand::Stats
        }
        DeliveryAction::ProcessNow => DeliveryCommand::ProcessNow,
    };

    let response = client
        .send_request(identity.request(RequestCommand::Delivery(command)))
        .await?;
    print_response(response);
    Ok(())
}

/// Redraw delivery statistics every `interval` seconds until interrupted
async fn watch_stats(
    client: &ControlClient,
    identity: &Identity,
    interval: u64,
) -> anyhow::Result<()> {
    loop {
        let response = client
            .send_request(identity.request(RequestCommand::Delivery(DeliveryCommand::Stats)))
            .await?;

        // Clear screen
        print!("\x1B[2J\x1B[1;1H");
        print_response(response);
        println!("\nPress Ctrl+C to exit");

        tokio::time::sleep(Duration::from_secs(interval)).await;
    }
}

async fn handle_notification_command(
    client: &ControlClient,
    identity: &Identity,
    action: NotificationAction,
) -> anyhow::Result<()> {
    let own = || identity.requester.user.clone();

    let command = match action {
        NotificationAction::List { recipient, unread } => NotificationCommand::List {
            recipient: recipient.map_or_else(own, Into::into),
            unread_only: unread,
        },
        NotificationAction::Read { id } => NotificationCommand::MarkRead { id },
        NotificationAction::ReadAll { recipient } => NotificationCommand::MarkAllRead {
            recipient: recipient.map_or_else(own, Into::into),
        },
        NotificationAction::Publish {
            kind,
            title,
            message,
            link,
            recipients,
        } => {
            let mut event = EventDescriptor::new(kind, title, message);
            if let Some(link) = link {
                event = event.with_link(link);
            }
            NotificationCommand::Publish {
                event,
                recipients: recipients.into_iter().map(Into::into).collect(),
            }
        }
    };

    let response = client
        .send_request(identity.request(RequestCommand::Notification(command)))
        .await?;
    print_response(response);
    Ok(())
}

async fn handle_system_command(
    client: &ControlClient,
    identity: &Identity,
    action: SystemAction,
) -> anyhow::Result<()> {
    let command = match action {
        SystemAction::Ping => SystemCommand::Ping,
        SystemAction::Status => SystemCommand::Status,
    };

    let response = client
        .send_request(identity.request(RequestCommand::System(command)))
        .await?;

    match response.payload {
        ResponsePayload::Ok => println!("✓ Pong! herald is responding"),
        ResponsePayload::Data(data) => match *data {
            ResponseData::SystemStatus(status) => {
                println!("=== herald Status ===\n");
                println!("Version:       {}", status.version);
                println!("Uptime:        {}", format_duration(status.uptime_secs));
                println!(
                    "Deliveries:    {} pending, {} sent, {} failed, {} cancelled",
                    status.deliveries.pending,
                    status.deliveries.sent,
                    status.deliveries.failed,
                    status.deliveries.cancelled
                );
                println!(
                    "Sweep:         {}",
                    if status.sweeping { "running" } else { "idle" }
                );
                println!("Notifications: {}", status.notifications);
            }
            other => println!("Unexpected response for system command: {other:?}"),
        },
        // The client turns error payloads into errors before we get here
        ResponsePayload::Error(err) => anyhow::bail!("Server error: {err}"),
    }

    Ok(())
}

fn print_response(response: Response) {
    let data = match response.payload {
        ResponsePayload::Ok => {
            println!("✓ Command completed successfully");
            return;
        }
        ResponsePayload::Error(err) => {
            eprintln!("Server error: {err}");
            return;
        }
        ResponsePayload::Data(data) => *data,
    };

    match data {
        ResponseData::DeliveryList(deliveries) => {
            if deliveries.is_empty() {
                println!("No deliveries found");
            } else {
                println!("=== Deliveries ({}) ===\n", deliveries.len());
                for delivery in deliveries {
                    println!("{delivery}");
                }
            }
        }
        ResponseData::DeliveryDetails(details) => print!("{details}"),
        ResponseData::DeliveryStats(stats) => {
            println!("=== herald Delivery Statistics ===\n");
            println!("Total:      {}", stats.total());
            println!("Pending:    {}", stats.pending);
            println!("Sent:       {}", stats.sent);
            println!("Failed:     {}", stats.failed);
            println!("Cancelled:  {}", stats.cancelled);
        }
        ResponseData::Sweep(sweep) => println!("✓ {sweep}"),
        ResponseData::NotificationList(notifications) => {
            if notifications.is_empty() {
                println!("No notifications");
            } else {
                let unread = notifications.iter().filter(|n| !n.is_read).count();
                println!(
                    "=== Notifications ({}, {unread} unread) ===\n",
                    notifications.len()
                );
                for notification in notifications {
                    println!("{notification}");
                }
            }
        }
        ResponseData::Notification(notification) => print!("{notification}"),
        ResponseData::Fanout(fanout) => println!("✓ {fanout}"),
        ResponseData::Count(count) => println!("✓ {count} notification(s) marked read"),
        ResponseData::SystemStatus(status) => print!("{status}"),
        ResponseData::Message(msg) => println!("✓ {msg}"),
    }
}

/// Format duration in human-readable form
fn format_duration(secs: u64) -> String {
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        let mins = secs / 60;
        let rem_secs = secs % 60;
        format!("{mins}m {rem_secs}s")
    } else if secs < 86400 {
        let hours = secs / 3600;
        let rem_mins = (secs % 3600) / 60;
        format!("{hours}h {rem_mins}m")
    } else {
        let days = secs / 86400;
        let rem_hours = (secs % 86400) / 3600;
        format!("{days}d {rem_hours}h")
    }
}
