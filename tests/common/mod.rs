//! Scripted BLE peripheral shared by the integration tests.

#![allow(dead_code)]

use anyhow::{anyhow, Result};
use feather_link::bluetooth::{
    GattCharacteristic, GattService, NotificationStream, Peripheral, READ_CHARACTERISTIC_UUID,
    WRITE_CHARACTERISTIC_UUID,
};
use feather_link::{EventKind, Feather, LinkConfig, LinkEvent};
use futures::channel::mpsc as notify_channel;
use futures::future::BoxFuture;
use futures::{FutureExt, StreamExt};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Semaphore};
use uuid::Uuid;

/// Upper bound for waiting on a single event.
pub const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

/// What the peripheral answers to each request.
pub struct Script {
    pub connect_error: Option<String>,
    pub discovery_error: Option<String>,
    pub no_services: bool,
    pub characteristics_error: Option<String>,
    pub characteristics: Vec<Uuid>,
    pub subscribe_error: Option<String>,
    /// Delay before a write of exactly this chunk completes.
    pub write_delays: HashMap<String, Duration>,
    /// Writes of exactly this chunk fail with the given reason.
    pub write_errors: HashMap<String, String>,
    pub rssi: i16,
    pub rssi_error: Option<String>,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            connect_error: None,
            discovery_error: None,
            no_services: false,
            characteristics_error: None,
            characteristics: vec![READ_CHARACTERISTIC_UUID, WRITE_CHARACTERISTIC_UUID],
            subscribe_error: None,
            write_delays: HashMap::new(),
            write_errors: HashMap::new(),
            rssi: -42,
            rssi_error: None,
        }
    }
}

struct MockState {
    script: Mutex<Script>,
    link_down: watch::Sender<bool>,
    notifier: Mutex<Option<notify_channel::UnboundedSender<Vec<u8>>>>,
    issued_writes: Mutex<Vec<(String, bool)>>,
    completed_writes: Mutex<Vec<String>>,
    rssi_queries: AtomicUsize,
    rssi_gate: Mutex<Option<Arc<Semaphore>>>,
    connect_gate: Mutex<Option<Arc<Semaphore>>>,
    disconnect_calls: AtomicUsize,
}

#[derive(Clone)]
pub struct MockPeripheral {
    state: Arc<MockState>,
}

impl MockPeripheral {
    pub fn new(script: Script) -> Self {
        let (link_down, _) = watch::channel(false);
        Self {
            state: Arc::new(MockState {
                script: Mutex::new(script),
                link_down,
                notifier: Mutex::new(None),
                issued_writes: Mutex::new(Vec::new()),
                completed_writes: Mutex::new(Vec::new()),
                rssi_queries: AtomicUsize::new(0),
                rssi_gate: Mutex::new(None),
                connect_gate: Mutex::new(None),
                disconnect_calls: AtomicUsize::new(0),
            }),
        }
    }

    /// A well-behaved Feather.
    pub fn feather() -> Self {
        Self::new(Script::default())
    }

    pub fn script(&self) -> parking_lot::MutexGuard<'_, Script> {
        self.state.script.lock()
    }

    /// Push a notification payload as the read characteristic would.
    pub fn notify(&self, payload: &[u8]) {
        let notifier = self.state.notifier.lock();
        notifier
            .as_ref()
            .expect("not subscribed")
            .unbounded_send(payload.to_vec())
            .expect("notification stream closed");
    }

    /// Simulate the link dropping.
    pub fn drop_link(&self) {
        self.state.link_down.send_replace(true);
    }

    /// Chunks in the order their writes were issued.
    pub fn issued_writes(&self) -> Vec<String> {
        self.state
            .issued_writes
            .lock()
            .iter()
            .map(|(chunk, _)| chunk.clone())
            .collect()
    }

    pub fn writes_without_response(&self) -> bool {
        self.state
            .issued_writes
            .lock()
            .iter()
            .all(|(_, without_response)| *without_response)
    }

    /// Chunks in the order their writes completed.
    pub fn completed_writes(&self) -> Vec<String> {
        self.state.completed_writes.lock().clone()
    }

    pub fn rssi_queries(&self) -> usize {
        self.state.rssi_queries.load(Ordering::SeqCst)
    }

    /// Hold every RSSI query until [`release_rssi`] lets it through.
    pub fn gate_rssi(&self) {
        *self.state.rssi_gate.lock() = Some(Arc::new(Semaphore::new(0)));
    }

    pub fn release_rssi(&self, queries: usize) {
        if let Some(gate) = self.state.rssi_gate.lock().as_ref() {
            gate.add_permits(queries);
        }
    }

    /// Hold `connect` until [`release_connect`] lets it through.
    pub fn gate_connect(&self) {
        *self.state.connect_gate.lock() = Some(Arc::new(Semaphore::new(0)));
    }

    pub fn release_connect(&self) {
        if let Some(gate) = self.state.connect_gate.lock().as_ref() {
            gate.add_permits(1);
        }
    }

    pub fn disconnect_calls(&self) -> usize {
        self.state.disconnect_calls.load(Ordering::SeqCst)
    }
}

impl Peripheral for MockPeripheral {
    type Service = MockService;
    type Characteristic = MockCharacteristic;

    fn connect(&self) -> BoxFuture<'_, Result<()>> {
        async move {
            let gate = self.state.connect_gate.lock().clone();
            if let Some(gate) = gate {
                gate.acquire().await?.forget();
            }

            match self.state.script.lock().connect_error.clone() {
                Some(reason) => Err(anyhow!(reason)),
                None => Ok(()),
            }
        }
        .boxed()
    }

    fn disconnected(&self) -> BoxFuture<'static, ()> {
        let mut link_down = self.state.link_down.subscribe();
        async move {
            let _ = link_down.wait_for(|down| *down).await;
        }
        .boxed()
    }

    fn discover_services(&self, uuids: Vec<Uuid>) -> BoxFuture<'_, Result<Vec<MockService>>> {
        async move {
            let script = self.state.script.lock();
            if let Some(reason) = script.discovery_error.clone() {
                return Err(anyhow!(reason));
            }
            if script.no_services {
                return Ok(Vec::new());
            }
            Ok(uuids
                .into_iter()
                .map(|uuid| MockService {
                    uuid,
                    state: self.state.clone(),
                })
                .collect())
        }
        .boxed()
    }

    fn update_rssi(&self) -> BoxFuture<'_, Result<i16>> {
        async move {
            self.state.rssi_queries.fetch_add(1, Ordering::SeqCst);

            let gate = self.state.rssi_gate.lock().clone();
            if let Some(gate) = gate {
                gate.acquire().await?.forget();
            }

            let script = self.state.script.lock();
            match script.rssi_error.clone() {
                Some(reason) => Err(anyhow!(reason)),
                None => Ok(script.rssi),
            }
        }
        .boxed()
    }

    fn disconnect(&self) -> BoxFuture<'_, Result<()>> {
        async move {
            self.state.disconnect_calls.fetch_add(1, Ordering::SeqCst);
            self.state.link_down.send_replace(true);
            Ok(())
        }
        .boxed()
    }
}

pub struct MockService {
    uuid: Uuid,
    state: Arc<MockState>,
}

impl GattService for MockService {
    type Characteristic = MockCharacteristic;

    fn uuid(&self) -> Uuid {
        self.uuid
    }

    fn discover_characteristics(
        &self,
        uuids: Vec<Uuid>,
    ) -> BoxFuture<'_, Result<Vec<MockCharacteristic>>> {
        async move {
            let script = self.state.script.lock();
            if let Some(reason) = script.characteristics_error.clone() {
                return Err(anyhow!(reason));
            }
            Ok(script
                .characteristics
                .iter()
                .filter(|uuid| uuids.contains(uuid))
                .map(|&uuid| MockCharacteristic {
                    uuid,
                    state: self.state.clone(),
                })
                .collect())
        }
        .boxed()
    }
}

#[derive(Clone)]
pub struct MockCharacteristic {
    uuid: Uuid,
    state: Arc<MockState>,
}

impl GattCharacteristic for MockCharacteristic {
    fn uuid(&self) -> Uuid {
        self.uuid
    }

    fn subscribe(&self) -> BoxFuture<'_, Result<NotificationStream>> {
        async move {
            if let Some(reason) = self.state.script.lock().subscribe_error.clone() {
                return Err(anyhow!(reason));
            }
            let (tx, rx) = notify_channel::unbounded();
            *self.state.notifier.lock() = Some(tx);
            Ok(rx.boxed())
        }
        .boxed()
    }

    fn write(&self, data: Vec<u8>, without_response: bool) -> BoxFuture<'_, Result<()>> {
        async move {
            let chunk = String::from_utf8(data)?;
            self.state
                .issued_writes
                .lock()
                .push((chunk.clone(), without_response));

            let (delay, error) = {
                let script = self.state.script.lock();
                (
                    script.write_delays.get(&chunk).copied(),
                    script.write_errors.get(&chunk).cloned(),
                )
            };
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }

            self.state.completed_writes.lock().push(chunk);
            match error {
                Some(reason) => Err(anyhow!(reason)),
                None => Ok(()),
            }
        }
        .boxed()
    }
}

/// Build a link over `mock` and run setup to completion.
pub async fn ready_feather(mock: &MockPeripheral, config: LinkConfig) -> Feather<MockPeripheral> {
    let feather = Feather::new(mock.clone(), config).expect("valid config");
    feather.setup().await.expect("setup succeeds");
    feather
}

/// Wait for the next event on `rx`.
pub async fn next_event(rx: &mut mpsc::UnboundedReceiver<LinkEvent>) -> LinkEvent {
    tokio::time::timeout(EVENT_TIMEOUT, rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

/// Everything already queued on `rx`.
pub fn drain(rx: &mut mpsc::UnboundedReceiver<LinkEvent>) -> Vec<LinkEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Let spawned tasks run.
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

pub fn channel(feather: &Feather<MockPeripheral>, kind: EventKind) -> mpsc::UnboundedReceiver<LinkEvent> {
    feather.events().channel(kind)
}
