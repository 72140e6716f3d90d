//! A complete herald, memory-backed, answering on a temporary socket

use std::{path::PathBuf, time::Duration};

use herald::{Herald, Services};
use herald_common::Signal;
use herald_control::{
    ControlClient, Request, RequestCommand, Requester, Response, ResponseData, ResponsePayload,
    Result, Role,
};
use tempfile::TempDir;
use tokio::{sync::broadcast, task::JoinHandle};

pub struct TestHerald {
    pub services: Services,
    socket: PathBuf,
    shutdown: broadcast::Sender<Signal>,
    server: JoinHandle<()>,
    _dir: TempDir,
}

impl TestHerald {
    /// Assemble from `extra` RON fields and start the control server only
    ///
    /// The delivery loop is left stopped so tests decide when sweeps run.
    pub async fn start(extra: &str) -> Self {
        let dir = TempDir::new().expect("temp dir");
        let socket = dir.path().join("herald.sock");
        let config = format!(
            r#"(
                store: (type: "Memory"),
                control: (socket: "{}"),
                audit: (enabled: false),
                {extra}
            )"#,
            socket.display()
        );

        let herald: Herald = ron::from_str(&config).expect("valid config");
        let mut services = herald.assemble().expect("assembled");
        let control = services.control.take().expect("control enabled");

        let (shutdown, receiver) = broadcast::channel(4);
        let server = tokio::spawn(async move {
            if let Err(e) = control.serve(receiver).await {
                eprintln!("Control server error: {e}");
            }
        });

        for _ in 0..50 {
            if socket.exists() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        Self {
            services,
            socket,
            shutdown,
            server,
            _dir: dir,
        }
    }

    pub fn client(&self) -> ControlClient {
        ControlClient::new(&self.socket)
    }

    pub async fn send(&self, requester: &Requester, command: RequestCommand) -> Result<Response> {
        self.client()
            .send_request(Request::new(requester.clone(), command))
            .await
    }

    /// Send, and unwrap the data of a successful response
    pub async fn data(&self, requester: &Requester, command: RequestCommand) -> ResponseData {
        let response = self.send(requester, command).await.expect("request succeeded");
        match response.payload {
            ResponsePayload::Data(data) => *data,
            other => panic!("expected data, got {other:?}"),
        }
    }

    pub async fn stop(self) {
        self.shutdown.send(Signal::Shutdown).expect("server listening");
        tokio::time::timeout(Duration::from_secs(5), self.server)
            .await
            .expect("server stopped in time")
            .expect("server task");
    }
}

pub fn admin() -> Requester {
    Requester::new("root", Role::SuperAdmin, None)
}

pub fn manager(company: &str) -> Requester {
    Requester::new(format!("manager@{company}"), Role::Manager, Some(company))
}

pub fn employee(name: &str, company: &str) -> Requester {
    Requester::new(name, Role::Employee, Some(company))
}
