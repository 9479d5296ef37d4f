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

//! BLE UART service UUIDs and wire constants for the Feather.

use uuid::Uuid;

/// UART GATT service UUID.
pub const UART_SERVICE_UUID: Uuid = Uuid::from_u128(0x6e400001_b5a3_f393_e0a9_e50e24dcca9e);

/// Write characteristic UUID (central writes messages here).
/// Properties: Write, Write Without Response
pub const WRITE_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x6e400002_b5a3_f393_e0a9_e50e24dcca9e);

/// Read characteristic UUID (Feather pushes messages here).
/// Properties: Notify
pub const READ_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x6e400003_b5a3_f393_e0a9_e50e24dcca9e);

/// Character that marks the end of a message.
pub const MESSAGE_TERMINATOR: char = '~';

/// RSSI value reported alongside the terminal "not connected" poll event.
pub const RSSI_DISCONNECTED: i16 = -1000;

/// BLE configuration constants.
pub mod config {
    /// Bytes sent over BLE in a single write.
    pub const BLE_MAX_CHUNK_SIZE: usize = 20;

    /// Smallest chunk size that still fits any UTF-8 character.
    pub const MIN_CHUNK_SIZE: usize = 4;

    /// Largest ATT attribute value.
    pub const MAX_ATT_VALUE: usize = 512;

    /// Inbound bytes buffered before a terminator must arrive.
    pub const MAX_MESSAGE_LEN: usize = 4096;

    /// Default RSSI polling period in milliseconds.
    pub const RSSI_UPDATE_RATE_MS: u64 = 1000;
}
