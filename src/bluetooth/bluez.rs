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

//! BlueZ central implementation of the peripheral traits.

use anyhow::{anyhow, Context, Result};
use bluer::gatt::remote::{Characteristic, CharacteristicWriteRequest, Service};
use bluer::gatt::WriteOp;
use bluer::{Adapter, AdapterEvent, Address, Device, DeviceEvent, DeviceProperty};
use futures::future::BoxFuture;
use futures::{pin_mut, FutureExt, Stream, StreamExt};
use std::time::Duration;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::peripheral::{
    is_candidate_device, Advertisement, GattCharacteristic, GattService, NotificationStream,
    Peripheral,
};

/// How long to wait for BlueZ to resolve services after connecting.
const SERVICE_RESOLVE_TIMEOUT: Duration = Duration::from_secs(10);

/// Poll period while waiting for service resolution.
const SERVICE_RESOLVE_POLL: Duration = Duration::from_millis(100);

/// Open the default adapter and make sure it is powered.
pub async fn default_adapter() -> Result<Adapter> {
    // Create BlueZ session
    let session = bluer::Session::new().await?;
    debug!("BlueZ session created");

    let adapter = session.default_adapter().await?;
    info!("Using Bluetooth adapter: {}", adapter.name());

    if !adapter.is_powered().await? {
        info!("Powering on Bluetooth adapter...");
        adapter.set_powered(true).await?;
    }

    Ok(adapter)
}

/// Read what BlueZ knows of a device's advertisement.
pub async fn advertisement(device: &Device) -> Result<Advertisement> {
    Ok(Advertisement {
        local_name: device.name().await?,
        service_uuids: device
            .uuids()
            .await?
            .unwrap_or_default()
            .into_iter()
            .collect(),
    })
}

/// Scan until a device advertising the UART service shows up.
///
/// With `address` set, other candidates are ignored.
pub async fn scan_for_feather(
    adapter: &Adapter,
    address: Option<Address>,
    scan_timeout: Duration,
) -> Result<Device> {
    info!("Scanning for Feather devices...");
    let events = adapter.discover_devices().await?;
    pin_mut!(events);

    let found: Result<Result<Device>, _> = timeout(scan_timeout, async {
        while let Some(event) = events.next().await {
            let AdapterEvent::DeviceAdded(addr) = event else {
                continue;
            };
            if address.is_some_and(|wanted| wanted != addr) {
                continue;
            }

            let device = adapter.device(addr)?;
            let advertisement = match advertisement(&device).await {
                Ok(advertisement) => advertisement,
                Err(e) => {
                    debug!("Skipping {}: {:#}", addr, e);
                    continue;
                }
            };
            if is_candidate_device(&advertisement) {
                info!(
                    "Found Feather {} ({})",
                    addr,
                    advertisement.local_name.as_deref().unwrap_or("unnamed")
                );
                return Ok(device);
            }
        }
        Err(anyhow!("device discovery ended"))
    })
    .await;

    match found {
        Ok(result) => result,
        Err(_) => Err(anyhow!(
            "no Feather found within {} s",
            scan_timeout.as_secs()
        )),
    }
}

/// Resolves once `events` reports the link down, or right away if it
/// already was when the stream was opened.
async fn link_dropped<S>(events: S, connected: bool)
where
    S: Stream<Item = DeviceEvent>,
{
    if !connected {
        return;
    }
    pin_mut!(events);

    while let Some(event) = events.next().await {
        if let DeviceEvent::PropertyChanged(DeviceProperty::Connected(false)) = event {
            return;
        }
    }
}

/// A Feather reached through BlueZ.
#[derive(Clone)]
pub struct BluezPeripheral {
    device: Device,
}

impl BluezPeripheral {
    pub fn new(device: Device) -> Self {
        Self { device }
    }

    pub fn address(&self) -> Address {
        self.device.address()
    }

    async fn wait_for_services(&self) -> Result<()> {
        let deadline = Instant::now() + SERVICE_RESOLVE_TIMEOUT;
        while !self.device.is_services_resolved().await? {
            if Instant::now() >= deadline {
                return Err(anyhow!("services not resolved after connecting"));
            }
            sleep(SERVICE_RESOLVE_POLL).await;
        }
        Ok(())
    }
}

impl Peripheral for BluezPeripheral {
    type Service = BluezService;
    type Characteristic = BluezCharacteristic;

    fn connect(&self) -> BoxFuture<'_, Result<()>> {
        async move {
            if !self.device.is_connected().await? {
                self.device.connect().await.context("connect")?;
            }
            self.wait_for_services().await
        }
        .boxed()
    }

    fn disconnected(&self) -> BoxFuture<'static, ()> {
        let device = self.device.clone();
        async move {
            let events = match device.events().await {
                Ok(events) => events,
                Err(e) => {
                    warn!("Cannot watch {} for disconnects: {}", device.address(), e);
                    return futures::future::pending().await;
                }
            };
            // A drop before the subscription produced no event.
            let connected = device.is_connected().await.unwrap_or(true);
            link_dropped(events, connected).await;
        }
        .boxed()
    }

    fn discover_services(&self, uuids: Vec<Uuid>) -> BoxFuture<'_, Result<Vec<BluezService>>> {
        async move {
            let mut found = Vec::new();
            for service in self.device.services().await? {
                let uuid = service.uuid().await?;
                if uuids.contains(&uuid) {
                    found.push(BluezService {
                        inner: service,
                        uuid,
                    });
                }
            }
            Ok(found)
        }
        .boxed()
    }

    fn update_rssi(&self) -> BoxFuture<'_, Result<i16>> {
        async move {
            self.device
                .rssi()
                .await?
                .ok_or_else(|| anyhow!("RSSI not available"))
        }
        .boxed()
    }

    fn disconnect(&self) -> BoxFuture<'_, Result<()>> {
        async move {
            self.device.disconnect().await?;
            Ok(())
        }
        .boxed()
    }
}

/// A remote GATT service.
pub struct BluezService {
    inner: Service,
    uuid: Uuid,
}

impl GattService for BluezService {
    type Characteristic = BluezCharacteristic;

    fn uuid(&self) -> Uuid {
        self.uuid
    }

    fn discover_characteristics(
        &self,
        uuids: Vec<Uuid>,
    ) -> BoxFuture<'_, Result<Vec<BluezCharacteristic>>> {
        async move {
            let mut found = Vec::new();
            for characteristic in self.inner.characteristics().await? {
                let uuid = characteristic.uuid().await?;
                if uuids.contains(&uuid) {
                    found.push(BluezCharacteristic {
                        inner: characteristic,
                        uuid,
                    });
                }
            }
            Ok(found)
        }
        .boxed()
    }
}

/// A remote GATT characteristic.
#[derive(Clone)]
pub struct BluezCharacteristic {
    inner: Characteristic,
    uuid: Uuid,
}

impl GattCharacteristic for BluezCharacteristic {
    fn uuid(&self) -> Uuid {
        self.uuid
    }

    fn subscribe(&self) -> BoxFuture<'_, Result<NotificationStream>> {
        async move {
            let notifications = self.inner.notify().await?;
            Ok(notifications.boxed())
        }
        .boxed()
    }

    fn write(&self, data: Vec<u8>, without_response: bool) -> BoxFuture<'_, Result<()>> {
        async move {
            let request = CharacteristicWriteRequest {
                op_type: if without_response {
                    WriteOp::Command
                } else {
                    WriteOp::Request
                },
                ..Default::default()
            };
            self.inner.write_ext(&data, &request).await?;
            Ok(())
        }
        .boxed()
    }
}
