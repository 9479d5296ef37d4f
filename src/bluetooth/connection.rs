// Copyright 2026 Daniel Pelikan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Connection lifecycle and message channel for a single Feather.

use futures::StreamExt;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use super::ble_constants::{READ_CHARACTERISTIC_UUID, UART_SERVICE_UUID, WRITE_CHARACTERISTIC_UUID};
use super::framer::{chunk_message, frame_message, PendingSend};
use super::peripheral::{GattCharacteristic, GattService, NotificationStream, Peripheral};
use super::poller::SignalPoller;
use super::reassembler::MessageReassembler;
use crate::config::LinkConfig;
use crate::error::LinkError;
use crate::events::{EventBus, EventKind, LinkEvent};
use crate::state::LinkState;

/// Handles and lifecycle position of the link.
struct Connection<C> {
    state: LinkState,
    read: Option<C>,
    write: Option<C>,
}

struct Shared<P: Peripheral> {
    peripheral: Arc<P>,
    config: LinkConfig,
    bus: Arc<EventBus>,
    connected: Arc<AtomicBool>,
    connection: Mutex<Connection<P::Characteristic>>,
    input: Mutex<MessageReassembler>,
    last_message: Mutex<Option<String>>,
    poller: Mutex<Option<SignalPoller>>,
}

/// A message channel to one Feather over the BLE UART service.
///
/// Cloning yields another handle to the same link. A link is set up once;
/// after it disconnects a new `Feather` must be created.
pub struct Feather<P: Peripheral> {
    shared: Arc<Shared<P>>,
}

impl<P: Peripheral> Clone for Feather<P> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<P: Peripheral> Feather<P> {
    /// Create a link over `peripheral`.
    pub fn new(peripheral: P, config: LinkConfig) -> Result<Self, LinkError> {
        config.validate()?;

        let input = MessageReassembler::new(config.terminator_byte(), config.max_message_len);
        Ok(Self {
            shared: Arc::new(Shared {
                peripheral: Arc::new(peripheral),
                config,
                bus: Arc::new(EventBus::new()),
                connected: Arc::new(AtomicBool::new(false)),
                connection: Mutex::new(Connection {
                    state: LinkState::Idle,
                    read: None,
                    write: None,
                }),
                input: Mutex::new(input),
                last_message: Mutex::new(None),
                poller: Mutex::new(None),
            }),
        })
    }

    /// Subscribe to events of `kind`.
    pub fn on<F>(&self, kind: EventKind, listener: F)
    where
        F: Fn(&LinkEvent) + Send + Sync + 'static,
    {
        self.shared.bus.on(kind, listener);
    }

    /// The event registry of this link.
    pub fn events(&self) -> &EventBus {
        &self.shared.bus
    }

    pub fn peripheral(&self) -> &P {
        &self.shared.peripheral
    }

    pub fn config(&self) -> &LinkConfig {
        &self.shared.config
    }

    pub fn state(&self) -> LinkState {
        self.shared.connection.lock().state
    }

    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    pub fn is_ready(&self) -> bool {
        self.state() == LinkState::Ready
    }

    pub fn is_polling(&self) -> bool {
        self.shared
            .poller
            .lock()
            .as_ref()
            .is_some_and(SignalPoller::is_running)
    }

    /// The most recent complete message received.
    pub fn last_message(&self) -> Option<String> {
        self.shared.last_message.lock().clone()
    }

    /// Bytes received since the last terminator.
    pub fn pending_input_len(&self) -> usize {
        self.shared.input.lock().buffer_size()
    }

    /// Connect, discover the UART service and its characteristics, and
    /// subscribe to notifications.
    ///
    /// Every failure is returned here and also delivered to `Ready`
    /// listeners. On success `Ready` listeners get `Ok(())` exactly once.
    pub async fn setup(&self) -> Result<(), LinkError> {
        {
            let mut connection = self.shared.connection.lock();
            if connection.state != LinkState::Idle {
                warn!("Setup requested in state {}", connection.state.as_str());
                return Err(LinkError::AlreadyStarted(connection.state.as_str()));
            }
            connection.state = LinkState::Connecting;
        }
        info!("Connecting to Feather...");

        let result = self.run_setup().await;
        if let Err(ref e) = result {
            error!("Feather setup failed: {}", e);
            self.shared.bus.emit(&LinkEvent::Ready(Err(e.clone())));
        }
        result
    }

    async fn run_setup(&self) -> Result<(), LinkError> {
        let shared = &self.shared;

        shared
            .peripheral
            .connect()
            .await
            .map_err(LinkError::connect)?;
        {
            let mut connection = shared.connection.lock();
            if connection.state == LinkState::Disconnected {
                warn!("Disconnected while connecting");
                return Err(LinkError::NotConnected);
            }
            shared.connected.store(true, Ordering::SeqCst);
            connection.state = LinkState::DiscoveringServices;
        }
        info!("Connected");
        self.watch_disconnect();

        let services = shared
            .peripheral
            .discover_services(vec![UART_SERVICE_UUID])
            .await
            .map_err(LinkError::service_discovery)?;
        let service = services.into_iter().next().ok_or_else(|| {
            LinkError::ServiceDiscovery(format!("UART service {} not found", UART_SERVICE_UUID))
        })?;

        self.transition(LinkState::DiscoveringCharacteristics)?;
        let characteristics = service
            .discover_characteristics(vec![READ_CHARACTERISTIC_UUID, WRITE_CHARACTERISTIC_UUID])
            .await
            .map_err(LinkError::characteristic_discovery)?;
        if characteristics.is_empty() {
            return Err(LinkError::CharacteristicDiscovery(format!(
                "no UART characteristics on service {}",
                service.uuid()
            )));
        }
        info!("Characteristics found ({})", characteristics.len());

        for characteristic in characteristics {
            let uuid = characteristic.uuid();
            if self.is_ready() {
                debug!("Already ready, ignoring characteristic {}", uuid);
                continue;
            }

            if uuid == READ_CHARACTERISTIC_UUID {
                self.transition(LinkState::Subscribing)?;
                info!("Subscribing to characteristic {}...", uuid);
                let notifications = characteristic
                    .subscribe()
                    .await
                    .map_err(LinkError::subscription)?;
                info!("Subscribed");

                self.forward_notifications(notifications);
                self.shared.connection.lock().read = Some(characteristic);
                self.check_ready()?;
            } else if uuid == WRITE_CHARACTERISTIC_UUID {
                self.shared.connection.lock().write = Some(characteristic);
                self.check_ready()?;
            } else {
                debug!("Ignoring characteristic {}", uuid);
            }
        }

        if self.is_ready() {
            Ok(())
        } else {
            let connection = self.shared.connection.lock();
            let missing = if connection.read.is_none() {
                READ_CHARACTERISTIC_UUID
            } else {
                WRITE_CHARACTERISTIC_UUID
            };
            Err(LinkError::CharacteristicDiscovery(format!(
                "characteristic {} not found",
                missing
            )))
        }
    }

    /// Move the lifecycle to `next`, failing if the link died meanwhile.
    fn transition(&self, next: LinkState) -> Result<(), LinkError> {
        let mut connection = self.shared.connection.lock();
        if connection.state == LinkState::Disconnected {
            return Err(LinkError::NotConnected);
        }
        if connection.state == next {
            return Ok(());
        }
        if !connection.state.can_transition_to(next) {
            warn!(
                "Ignoring transition {} -> {}",
                connection.state.as_str(),
                next.as_str()
            );
            return Ok(());
        }

        debug!("{} -> {}", connection.state.as_str(), next.as_str());
        connection.state = next;
        Ok(())
    }

    /// Enter `Ready` once both handles are known. Later calls are no-ops.
    fn check_ready(&self) -> Result<(), LinkError> {
        {
            let mut connection = self.shared.connection.lock();
            match connection.state {
                LinkState::Disconnected => return Err(LinkError::NotConnected),
                LinkState::Ready => return Ok(()),
                _ => {}
            }
            if connection.read.is_none() || connection.write.is_none() {
                if connection.state == LinkState::Subscribing {
                    connection.state = LinkState::DiscoveringCharacteristics;
                }
                return Ok(());
            }
            connection.state = LinkState::Ready;
        }

        let rssi = &self.shared.config.rssi;
        if rssi.enabled {
            info!("Polling RSSI every {} ms", rssi.interval_ms);
            let poller = SignalPoller::start(
                self.shared.peripheral.clone(),
                self.shared.connected.clone(),
                self.shared.bus.clone(),
                rssi.interval(),
            );
            *self.shared.poller.lock() = Some(poller);
        }

        info!("Feather ready");
        self.shared.bus.emit(&LinkEvent::Ready(Ok(())));
        Ok(())
    }

    /// Mark the link dead and notify `Disconnect` listeners when the
    /// peripheral reports the link dropped.
    fn watch_disconnect(&self) {
        let link_down = self.shared.peripheral.disconnected();
        let shared = Arc::downgrade(&self.shared);

        tokio::spawn(async move {
            link_down.await;
            let Some(shared) = shared.upgrade() else {
                return;
            };

            info!("Peripheral disconnected");
            {
                let mut connection = shared.connection.lock();
                shared.connected.store(false, Ordering::SeqCst);
                connection.state = LinkState::Disconnected;
            }
            shared.bus.emit(&LinkEvent::Disconnected);
        });
    }

    fn forward_notifications(&self, mut notifications: NotificationStream) {
        let feather = Arc::downgrade(&self.shared);

        tokio::spawn(async move {
            while let Some(payload) = notifications.next().await {
                let Some(shared) = feather.upgrade() else {
                    break;
                };
                Feather { shared }.on_data(&payload);
            }
            debug!("Notification stream ended");
        });
    }

    /// Feed one notification payload into the input buffer and emit a
    /// `Message` event per completed message.
    pub fn on_data(&self, payload: &[u8]) {
        debug!("Data received: {} bytes", payload.len());

        let messages = self.shared.input.lock().process_packet(payload);
        for message in messages {
            if let Ok(ref text) = message {
                *self.shared.last_message.lock() = Some(text.clone());
            }
            self.shared.bus.emit(&LinkEvent::Message(message));
        }
    }

    /// Send `message`, calling `on_complete` once every chunk has been
    /// written.
    ///
    /// Returns `false` without calling `on_complete` when the link is not
    /// connected or not yet writable. Must be called within a Tokio runtime.
    pub fn send_message<F>(&self, message: &str, on_complete: F) -> bool
    where
        F: FnOnce(Result<(), LinkError>) + Send + 'static,
    {
        if !self.is_connected() {
            debug!("Not connected, dropping message");
            return false;
        }
        let Some(write) = self.shared.connection.lock().write.clone() else {
            debug!("No write characteristic yet, dropping message");
            return false;
        };

        let framed = match frame_message(message, self.shared.config.terminator) {
            Ok(framed) => framed,
            Err(e) => {
                warn!("Refusing to send message: {}", e);
                on_complete(Err(e));
                return true;
            }
        };

        let chunks = chunk_message(&framed, self.shared.config.chunk_size);
        let pending = PendingSend::new(
            chunks.len(),
            self.shared.config.write_error_policy,
            Box::new(on_complete),
        );
        debug!(
            "Sending {} bytes in {} chunk(s)",
            framed.len(),
            pending.chunk_count()
        );
        let pending = Arc::new(Mutex::new(pending));

        for (index, chunk) in chunks.into_iter().enumerate() {
            let data = chunk.as_bytes().to_vec();
            let write = write.clone();
            let pending = pending.clone();

            tokio::spawn(async move {
                let result = write
                    .write(data, true)
                    .await
                    .map_err(|e| LinkError::write(index, e));
                if let Err(ref e) = result {
                    error!("Error sending message: {}", e);
                }

                let completion = pending.lock().record(index, result);
                if let Some(completion) = completion {
                    completion.fire();
                }
            });
        }

        true
    }

    /// Send `message` and wait until every chunk has been written.
    pub async fn send(&self, message: &str) -> Result<(), LinkError> {
        let (tx, rx) = oneshot::channel();
        let issued = self.send_message(message, move |result| {
            let _ = tx.send(result);
        });
        if !issued {
            return Err(LinkError::NotConnected);
        }

        rx.await.unwrap_or(Err(LinkError::NotConnected))
    }

    /// Mark the link dead and ask the peripheral to drop it.
    pub async fn disconnect(&self) {
        {
            // `connected` only changes under the connection lock.
            let mut connection = self.shared.connection.lock();
            self.shared.connected.store(false, Ordering::SeqCst);
            if connection.state != LinkState::Idle {
                connection.state = LinkState::Disconnected;
            }
        }

        info!("Disconnecting from Feather");
        if let Err(e) = self.shared.peripheral.disconnect().await {
            warn!("Disconnect failed: {:#}", e);
        }
    }
}

impl<P: Peripheral> Drop for Shared<P> {
    fn drop(&mut self) {
        if let Some(poller) = self.poller.lock().take() {
            poller.stop();
        }
    }
}
