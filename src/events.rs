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

//! Event registry and synchronous dispatch.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::LinkError;

/// Kinds of events a link emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Ready,
    Disconnect,
    Message,
    Rssi,
}

impl EventKind {
    /// Every event kind, in declaration order.
    pub const ALL: [EventKind; 4] = [
        EventKind::Ready,
        EventKind::Disconnect,
        EventKind::Message,
        EventKind::Rssi,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Ready => "ready",
            EventKind::Disconnect => "disconnect",
            EventKind::Message => "message",
            EventKind::Rssi => "rssi",
        }
    }
}

/// Events emitted by a link.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    /// Setup finished, or failed with the given error.
    Ready(Result<(), LinkError>),
    /// The physical link dropped.
    Disconnected,
    /// A complete message arrived, or the inbound buffer overflowed.
    Message(Result<String, LinkError>),
    /// Signal strength update. `value` is a sentinel when `error` is set.
    Rssi {
        value: i16,
        error: Option<LinkError>,
    },
}

impl LinkEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            LinkEvent::Ready(_) => EventKind::Ready,
            LinkEvent::Disconnected => EventKind::Disconnect,
            LinkEvent::Message(_) => EventKind::Message,
            LinkEvent::Rssi { .. } => EventKind::Rssi,
        }
    }
}

/// A subscriber callback.
pub type Listener = Arc<dyn Fn(&LinkEvent) + Send + Sync>;

/// Ordered listener lists per event kind.
///
/// Listeners only ever get appended. Dispatch works on a snapshot of the
/// list, so a listener may subscribe further listeners without deadlocking;
/// those are called from the next dispatch onwards.
#[derive(Default)]
pub struct EventBus {
    listeners: RwLock<HashMap<EventKind, Vec<Listener>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a listener for `kind`.
    pub fn on<F>(&self, kind: EventKind, listener: F)
    where
        F: Fn(&LinkEvent) + Send + Sync + 'static,
    {
        self.listeners
            .write()
            .entry(kind)
            .or_default()
            .push(Arc::new(listener));
    }

    /// Forward every event of `kind` into a channel.
    pub fn channel(&self, kind: EventKind) -> mpsc::UnboundedReceiver<LinkEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.forward(kind, tx);
        rx
    }

    /// Forward every event of `kind` into `tx`. Several kinds may share
    /// one sender to keep their relative order.
    pub fn forward(&self, kind: EventKind, tx: mpsc::UnboundedSender<LinkEvent>) {
        self.on(kind, move |event| {
            let _ = tx.send(event.clone());
        });
    }

    /// Dispatch `event` to its listeners in registration order.
    ///
    /// Returns the number of listeners called.
    pub fn emit(&self, event: &LinkEvent) -> usize {
        let kind = event.kind();
        let snapshot: Vec<Listener> = self
            .listeners
            .read()
            .get(&kind)
            .cloned()
            .unwrap_or_default();

        debug!(
            "Dispatching '{}' to {} listener(s)",
            kind.as_str(),
            snapshot.len()
        );
        for listener in &snapshot {
            listener(event);
        }
        snapshot.len()
    }

    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.listeners.read().get(&kind).map_or(0, Vec::len)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let listeners = self.listeners.read();
        let mut map = f.debug_map();
        for kind in EventKind::ALL {
            map.entry(&kind.as_str(), &listeners.get(&kind).map_or(0, Vec::len));
        }
        map.finish()
    }
}
