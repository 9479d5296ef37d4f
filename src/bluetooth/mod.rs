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

//! Bluetooth communication module.
//!
//! Turns the Feather's BLE UART service into a message channel.

pub mod ble_constants;
pub mod bluez;
mod connection;
pub mod framer;
mod peripheral;
mod poller;
pub mod reassembler;

pub use ble_constants::{
    MESSAGE_TERMINATOR, READ_CHARACTERISTIC_UUID, RSSI_DISCONNECTED, UART_SERVICE_UUID,
    WRITE_CHARACTERISTIC_UUID,
};
pub use bluez::{BluezCharacteristic, BluezPeripheral, BluezService};
pub use connection::Feather;
pub use framer::{chunk_message, frame_message, ChunkStatus, PendingSend};
pub use peripheral::{
    is_candidate_device, Advertisement, GattCharacteristic, GattService, NotificationStream,
    Peripheral,
};
pub use poller::SignalPoller;
pub use reassembler::MessageReassembler;
