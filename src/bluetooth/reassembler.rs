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

//! Reassembly of terminator-delimited messages from BLE notifications.

use tracing::{debug, warn};

use crate::error::LinkError;

/// Rebuilds messages from notification payloads.
///
/// Bytes accumulate until the terminator byte arrives, at which point the
/// buffered bytes are decoded as one message and the buffer is cleared.
pub struct MessageReassembler {
    buffer: Vec<u8>,
    terminator: u8,
    max_len: usize,
    discarding: bool,
}

impl MessageReassembler {
    /// Create a new message reassembler.
    pub fn new(terminator: u8, max_len: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(max_len.min(4096)),
            terminator,
            max_len,
            discarding: false,
        }
    }

    /// Process an incoming notification payload.
    ///
    /// Returns one entry per terminator seen, in order. An overflow is
    /// reported once; the bytes up to the next terminator are then dropped.
    pub fn process_packet(&mut self, packet: &[u8]) -> Vec<Result<String, LinkError>> {
        let mut messages = Vec::new();

        for &byte in packet {
            if byte == self.terminator {
                if self.discarding {
                    debug!("Resynchronised after overflow");
                    self.discarding = false;
                    continue;
                }
                let raw = std::mem::take(&mut self.buffer);
                let message = String::from_utf8_lossy(&raw).into_owned();
                debug!("Message reassembly complete: {} bytes", raw.len());
                messages.push(Ok(message));
                continue;
            }

            if self.discarding {
                continue;
            }

            if self.buffer.len() >= self.max_len {
                warn!(
                    "Input buffer exceeded {} bytes without terminator, discarding",
                    self.max_len
                );
                self.buffer.clear();
                self.discarding = true;
                messages.push(Err(LinkError::BufferOverflow {
                    limit: self.max_len,
                }));
                continue;
            }

            self.buffer.push(byte);
        }

        messages
    }

    /// Reset the reassembler state.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.discarding = false;
    }

    /// Bytes received since the last terminator.
    pub fn buffer_size(&self) -> usize {
        self.buffer.len()
    }

    /// The partial message received so far.
    pub fn pending(&self) -> String {
        String::from_utf8_lossy(&self.buffer).into_owned()
    }

    /// Whether input is being dropped after an overflow.
    pub fn is_discarding(&self) -> bool {
        self.discarding
    }
}
