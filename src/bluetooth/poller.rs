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

//! Periodic RSSI polling tied to connection liveness.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use super::ble_constants::RSSI_DISCONNECTED;
use super::peripheral::Peripheral;
use crate::error::LinkError;
use crate::events::{EventBus, LinkEvent};

struct PollState {
    request_in_flight: AtomicBool,
    stopped: AtomicBool,
}

impl PollState {
    /// Stop for good, reporting the dead link once.
    fn terminate(&self, bus: &EventBus) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("RSSI polling stopped: link is down");
        bus.emit(&LinkEvent::Rssi {
            value: RSSI_DISCONNECTED,
            error: Some(LinkError::NotConnected),
        });
    }
}

/// Recurring signal strength query.
///
/// Ticks while a query is outstanding are skipped. Once the link is seen
/// down the poller emits a single terminal `Rssi` event and never runs
/// again.
pub struct SignalPoller {
    state: Arc<PollState>,
    task: JoinHandle<()>,
}

impl SignalPoller {
    /// Start polling every `period`. The first query runs one period after
    /// start.
    pub fn start<P: Peripheral>(
        peripheral: Arc<P>,
        connected: Arc<AtomicBool>,
        bus: Arc<EventBus>,
        period: Duration,
    ) -> Self {
        let state = Arc::new(PollState {
            request_in_flight: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
        });

        let task = {
            let state = state.clone();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                ticker.tick().await;

                loop {
                    ticker.tick().await;

                    if state.stopped.load(Ordering::SeqCst) {
                        break;
                    }
                    if !connected.load(Ordering::SeqCst) {
                        state.terminate(&bus);
                        break;
                    }
                    if state.request_in_flight.swap(true, Ordering::SeqCst) {
                        debug!("RSSI request still in flight, skipping tick");
                        continue;
                    }

                    let peripheral = peripheral.clone();
                    let connected = connected.clone();
                    let bus = bus.clone();
                    let state = state.clone();
                    tokio::spawn(async move {
                        let result = peripheral.update_rssi().await;

                        if !connected.load(Ordering::SeqCst) {
                            state.terminate(&bus);
                            return;
                        }
                        if state.stopped.load(Ordering::SeqCst) {
                            return;
                        }

                        let event = match result {
                            Ok(value) => {
                                debug!("RSSI: {} dBm", value);
                                LinkEvent::Rssi { value, error: None }
                            }
                            Err(e) => LinkEvent::Rssi {
                                value: RSSI_DISCONNECTED,
                                error: Some(LinkError::signal_query(e)),
                            },
                        };
                        bus.emit(&event);
                        state.request_in_flight.store(false, Ordering::SeqCst);
                    });
                }
            })
        };

        Self { state, task }
    }

    /// Stop polling without emitting anything.
    pub fn stop(&self) {
        self.state.stopped.store(true, Ordering::SeqCst);
        self.task.abort();
    }

    pub fn is_running(&self) -> bool {
        !self.state.stopped.load(Ordering::SeqCst) && !self.task.is_finished()
    }

    pub fn is_request_in_flight(&self) -> bool {
        self.state.request_in_flight.load(Ordering::SeqCst)
    }
}

impl Drop for SignalPoller {
    fn drop(&mut self) {
        self.task.abort();
    }
}
