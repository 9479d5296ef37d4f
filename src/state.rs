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

//! Connection lifecycle states.

/// Where a link is in its setup sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Idle,
    Connecting,
    DiscoveringServices,
    DiscoveringCharacteristics,
    Subscribing,
    Ready,
    Disconnected,
}

impl LinkState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkState::Idle => "Idle",
            LinkState::Connecting => "Connecting...",
            LinkState::DiscoveringServices => "Discovering services...",
            LinkState::DiscoveringCharacteristics => "Discovering characteristics...",
            LinkState::Subscribing => "Subscribing...",
            LinkState::Ready => "Ready",
            LinkState::Disconnected => "Disconnected",
        }
    }

    /// Whether the lifecycle may move from `self` to `next`.
    ///
    /// Setup only moves forward, `Subscribing` may be left back towards
    /// `DiscoveringCharacteristics` while further characteristics are
    /// handled, and `Disconnected` is terminal.
    pub fn can_transition_to(self, next: LinkState) -> bool {
        use LinkState::*;

        match (self, next) {
            (Disconnected, _) => false,
            (Idle, Disconnected) => false,
            (_, Disconnected) => true,
            (Idle, Connecting) => true,
            (Connecting, DiscoveringServices) => true,
            (DiscoveringServices, DiscoveringCharacteristics) => true,
            (DiscoveringCharacteristics, Subscribing) => true,
            (Subscribing, DiscoveringCharacteristics) => true,
            (DiscoveringCharacteristics, Ready) => true,
            (Subscribing, Ready) => true,
            _ => false,
        }
    }

    /// Whether setup is still running.
    pub fn is_setting_up(&self) -> bool {
        !matches!(
            self,
            LinkState::Idle | LinkState::Ready | LinkState::Disconnected
        )
    }
}
