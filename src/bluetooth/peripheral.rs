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

//! Abstraction over the BLE stack a link drives.
//!
//! Every operation resolves exactly once. Implementations exist for BlueZ
//! ([`super::bluez`]) and for scripted peripherals in tests.

use anyhow::Result;
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use uuid::Uuid;

use super::ble_constants::UART_SERVICE_UUID;

/// Payloads pushed by a subscribed characteristic, in arrival order.
pub type NotificationStream = BoxStream<'static, Vec<u8>>;

/// A remote BLE peripheral.
pub trait Peripheral: Send + Sync + 'static {
    type Service: GattService<Characteristic = Self::Characteristic>;
    type Characteristic: GattCharacteristic;

    /// Establish the physical link.
    fn connect(&self) -> BoxFuture<'_, Result<()>>;

    /// Resolves once, when the link drops for any reason.
    fn disconnected(&self) -> BoxFuture<'static, ()>;

    /// Discover the primary services whose UUID is in `uuids`.
    fn discover_services(&self, uuids: Vec<Uuid>) -> BoxFuture<'_, Result<Vec<Self::Service>>>;

    /// Read the current signal strength in dBm.
    fn update_rssi(&self) -> BoxFuture<'_, Result<i16>>;

    /// Drop the physical link.
    fn disconnect(&self) -> BoxFuture<'_, Result<()>>;
}

/// A discovered GATT service.
pub trait GattService: Send + Sync + 'static {
    type Characteristic: GattCharacteristic;

    fn uuid(&self) -> Uuid;

    /// Discover the characteristics whose UUID is in `uuids`.
    fn discover_characteristics(
        &self,
        uuids: Vec<Uuid>,
    ) -> BoxFuture<'_, Result<Vec<Self::Characteristic>>>;
}

/// A discovered GATT characteristic.
pub trait GattCharacteristic: Clone + Send + Sync + 'static {
    fn uuid(&self) -> Uuid;

    /// Enable notifications and return the payload stream.
    fn subscribe(&self) -> BoxFuture<'_, Result<NotificationStream>>;

    /// Write one value.
    fn write(&self, data: Vec<u8>, without_response: bool) -> BoxFuture<'_, Result<()>>;
}

/// What a scan saw of a device.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Advertisement {
    pub local_name: Option<String>,
    pub service_uuids: Vec<Uuid>,
}

/// Whether an advertised device exposes the Feather UART service.
///
/// The device name plays no part in the decision.
pub fn is_candidate_device(advertisement: &Advertisement) -> bool {
    advertisement.service_uuids.contains(&UART_SERVICE_UUID)
}
