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

//! Feather Link
//!
//! Message-oriented channel to a Feather wearable over the BLE UART service:
//! connection setup, chunked sends, terminator-based reassembly of
//! notifications and optional RSSI polling.

pub mod bluetooth;
pub mod config;
pub mod error;
pub mod events;
pub mod state;

pub use bluetooth::{is_candidate_device, Advertisement, Feather, Peripheral};
pub use config::{ErrorPolicy, LinkConfig};
pub use error::LinkError;
pub use events::{EventBus, EventKind, LinkEvent};
pub use state::LinkState;
