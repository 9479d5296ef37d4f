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

//! Error types for the Feather link.

use thiserror::Error;

/// Errors reported by a Feather link.
///
/// Errors are delivered to several listeners at once, so every variant owns
/// its detail as plain text and the type is cheap to clone.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LinkError {
    /// The peripheral refused or failed the connection attempt.
    #[error("could not connect: {0}")]
    Connect(String),

    /// The UART service could not be discovered.
    #[error("service discovery failed: {0}")]
    ServiceDiscovery(String),

    /// The read/write characteristics could not be discovered.
    #[error("characteristic discovery failed: {0}")]
    CharacteristicDiscovery(String),

    /// Enabling notifications on the read characteristic failed.
    #[error("could not subscribe to notifications: {0}")]
    Subscription(String),

    /// A single chunk write failed.
    #[error("write of chunk {chunk} failed: {reason}")]
    Write { chunk: usize, reason: String },

    /// The signal strength query failed.
    #[error("signal strength query failed: {0}")]
    SignalQuery(String),

    /// The link is down.
    #[error("no longer connected")]
    NotConnected,

    /// A peer sent more than `limit` bytes without a terminator.
    #[error("inbound message exceeded {limit} bytes without a terminator")]
    BufferOverflow { limit: usize },

    /// An outbound message carries the terminator before its end.
    #[error("message contains the terminator {0:?}")]
    TerminatorInMessage(char),

    /// `setup` was called on a link that already left the idle state.
    #[error("setup already started (state: {0})")]
    AlreadyStarted(&'static str),

    /// The link configuration is unusable.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl LinkError {
    pub(crate) fn connect(err: anyhow::Error) -> Self {
        Self::Connect(format!("{err:#}"))
    }

    pub(crate) fn service_discovery(err: anyhow::Error) -> Self {
        Self::ServiceDiscovery(format!("{err:#}"))
    }

    pub(crate) fn characteristic_discovery(err: anyhow::Error) -> Self {
        Self::CharacteristicDiscovery(format!("{err:#}"))
    }

    pub(crate) fn subscription(err: anyhow::Error) -> Self {
        Self::Subscription(format!("{err:#}"))
    }

    pub(crate) fn write(chunk: usize, err: anyhow::Error) -> Self {
        Self::Write {
            chunk,
            reason: format!("{err:#}"),
        }
    }

    pub(crate) fn signal_query(err: anyhow::Error) -> Self {
        Self::SignalQuery(format!("{err:#}"))
    }
}

/// Result alias for link operations.
pub type Result<T, E = LinkError> = std::result::Result<T, E>;
