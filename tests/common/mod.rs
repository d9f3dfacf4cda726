#![allow(dead_code)]

use async_trait::async_trait;
use rowgate::core::{GatewayError, StoreError};
use rowgate::transaction::{Change, TransactionId};
use rowgate::{
    CommitListener, EndpointConfig, EndpointController, ExternalGateway, GatewayResponse,
    InMemoryRecordStore, Input, Notification, Record, RecordId, RecordStore, RecordType,
    Transaction,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub type Events = Arc<Mutex<Vec<String>>>;

/// Record store that counts calls before delegating.
pub struct CountingStore {
    pub inner: InMemoryRecordStore,
    pub fetches: AtomicUsize,
    pub persists: AtomicUsize,
}

impl CountingStore {
    pub fn new(records: impl IntoIterator<Item = Record>) -> Self {
        Self {
            inner: InMemoryRecordStore::with_lock_timeout(Duration::from_secs(2)).with_records(records),
            fetches: AtomicUsize::new(0),
            persists: AtomicUsize::new(0),
        }
    }

    pub fn persist_calls(&self) -> usize {
        self.persists.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RecordStore for CountingStore {
    async fn fetch_locked(
        &self,
        txn: &mut Transaction,
        id: RecordId,
    ) -> Result<Option<Record>, StoreError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.inner.fetch_locked(txn, id).await
    }

    async fn persist(&self, txn: &mut Transaction, record: &Record) -> Result<(), StoreError> {
        self.persists.fetch_add(1, Ordering::SeqCst);
        self.inner.persist(txn, record).await
    }

    async fn apply(&self, txn_id: TransactionId, changes: &[Change]) -> Result<Vec<Record>, StoreError> {
        self.inner.apply(txn_id, changes).await
    }

    async fn get(&self, id: RecordId) -> Result<Option<Record>, StoreError> {
        self.inner.get(id).await
    }
}

/// Gateway answering a fixed status, recording each call and optionally
/// sleeping to widen the locked window.
pub struct RecordingGateway {
    pub status: u16,
    pub delay: Duration,
    pub calls: AtomicUsize,
    pub events: Events,
}

impl RecordingGateway {
    pub fn new(status: u16, events: Events) -> Self {
        Self {
            status,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            events,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExternalGateway for RecordingGateway {
    async fn call(&self, record: &Record, input: &Input) -> Result<GatewayResponse, GatewayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        push(&self.events, format!("gateway:start:{}:v{}", input.name, record.version));
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        push(&self.events, format!("gateway:end:{}", input.name));
        Ok(GatewayResponse::new(self.status))
    }
}

/// Listener appending `notified:<name>:v<version>` for each committed record.
pub struct RecordingListener {
    pub events: Events,
}

#[async_trait]
impl CommitListener for RecordingListener {
    async fn on_commit(&self, notification: &Notification) -> anyhow::Result<()> {
        push(
            &self.events,
            format!(
                "notified:{}:v{}",
                notification.record.name, notification.record.version
            ),
        );
        Ok(())
    }
}

pub fn push(events: &Events, event: String) {
    events.lock().unwrap().push(event);
}

pub fn events_snapshot(events: &Events) -> Vec<String> {
    events.lock().unwrap().clone()
}

/// Polls until an event with `prefix` shows up; post-commit hooks run in the background.
pub async fn wait_for_event(events: &Events, prefix: &str) -> bool {
    for _ in 0..200 {
        if events_snapshot(events).iter().any(|event| event.starts_with(prefix)) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

pub struct Harness {
    pub store: Arc<CountingStore>,
    pub gateway: Arc<RecordingGateway>,
    pub controller: Arc<EndpointController>,
    pub events: Events,
}

pub fn harness(status: u16) -> Harness {
    harness_with(RecordingGateway::new(status, Events::default()), EndpointConfig::default())
}

pub fn harness_with(gateway: RecordingGateway, config: EndpointConfig) -> Harness {
    let events = gateway.events.clone();
    let store = Arc::new(CountingStore::new([Record::new(1, "seed", RecordType::BankAccount)]));
    let gateway = Arc::new(gateway);
    let controller = EndpointController::new(store.clone(), gateway.clone(), &config).with_listener(
        Arc::new(RecordingListener {
            events: events.clone(),
        }),
    );

    Harness {
        store,
        gateway,
        controller: Arc::new(controller),
        events,
    }
}
