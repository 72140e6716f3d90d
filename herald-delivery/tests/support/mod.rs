//! Shared fixtures for delivery tests

#![allow(dead_code, clippy::expect_used, clippy::unwrap_used)]

use std::{
    collections::{BTreeMap, HashSet},
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use herald_common::UserId;
use herald_delivery::{
    DefaultRenderer, DeliveryProcessor, DeliveryRecord, Mailbox, NewDelivery, OutboundMessage,
    Transport, TransportError,
};
use herald_store::{BackingStore, TestBackingStore};
use tokio::sync::Semaphore;

/// Transport whose behaviour is scripted per recipient address
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    reject: HashSet<String>,
    panic: HashSet<String>,
    stall: HashSet<String>,
    gate: Option<Arc<Semaphore>>,
    started: AtomicUsize,
    sent: Mutex<Vec<String>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rejecting(mut self, address: &str) -> Self {
        self.reject.insert(address.to_string());
        self
    }

    pub fn panicking(mut self, address: &str) -> Self {
        self.panic.insert(address.to_string());
        self
    }

    /// Never completes a send to `address`
    pub fn stalling(mut self, address: &str) -> Self {
        self.stall.insert(address.to_string());
        self
    }

    /// Every send waits for a permit from `gate` before completing
    pub fn gated(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Number of sends that have begun
    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    /// Recipients of the sends that succeeded, in completion order
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    pub async fn wait_for_started(&self, expected: usize) {
        while self.started() < expected {
            tokio::task::yield_now().await;
        }
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, message: &OutboundMessage) -> Result<(), TransportError> {
        self.started.fetch_add(1, Ordering::SeqCst);
        let address = message.to.address.clone();

        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }

        if self.stall.contains(&address) {
            std::future::pending::<()>().await;
        }

        assert!(!self.panic.contains(&address), "transport exploded for {address}");

        if self.reject.contains(&address) {
            return Err(TransportError::Rejected(format!("550 mailbox unavailable: {address}")));
        }

        self.sent.lock().unwrap().push(address);
        Ok(())
    }
}

pub fn request(recipient: &str) -> NewDelivery {
    NewDelivery {
        sender: Mailbox::named("Herald", "noreply@herald.test"),
        recipient: Mailbox::new(recipient),
        subject: "Scheduled notice".to_string(),
        body: "Hello {{recipient_name}}".to_string(),
        template: None,
        variables: BTreeMap::new(),
        immediate: true,
        due_at: None,
        created_by: UserId::from("creator"),
        company: None,
    }
}

pub fn scheduled(recipient: &str, due_at: DateTime<Utc>) -> NewDelivery {
    NewDelivery {
        immediate: false,
        due_at: Some(due_at),
        ..request(recipient)
    }
}

pub struct Harness {
    pub store: Arc<TestBackingStore<DeliveryRecord>>,
    pub transport: Arc<ScriptedTransport>,
    pub processor: Arc<DeliveryProcessor>,
}

impl Harness {
    pub fn new(transport: ScriptedTransport) -> Self {
        Self::with_processor(transport, DeliveryProcessor::default())
    }

    pub fn with_processor(transport: ScriptedTransport, mut processor: DeliveryProcessor) -> Self {
        let store = Arc::new(TestBackingStore::new());
        let transport = Arc::new(transport);

        processor
            .init(
                store.clone() as Arc<dyn BackingStore<DeliveryRecord>>,
                transport.clone(),
                Arc::new(DefaultRenderer),
            )
            .expect("processor init");

        Self {
            store,
            transport,
            processor: Arc::new(processor),
        }
    }

    /// Create deliveries one by one, a couple of milliseconds apart so their
    /// ids sort in creation order
    pub async fn create_all(&self, requests: Vec<NewDelivery>) -> Vec<DeliveryRecord> {
        let mut created = Vec::new();
        for request in requests {
            std::thread::sleep(Duration::from_millis(2));
            created.push(
                herald_delivery::control::create_delivery(self.store.as_ref(), request, Utc::now())
                    .await
                    .expect("create delivery"),
            );
        }
        created
    }

    pub async fn reload(&self, record: &DeliveryRecord) -> DeliveryRecord {
        self.store.read(&record.id).await.expect("record exists")
    }
}
