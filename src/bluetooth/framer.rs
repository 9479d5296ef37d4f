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

//! Outbound message framing and per-send completion tracking.

use tracing::{debug, warn};

use crate::config::ErrorPolicy;
use crate::error::LinkError;

/// Callback invoked once when every chunk of a send has settled.
pub type SendCallback = Box<dyn FnOnce(Result<(), LinkError>) + Send>;

/// Terminate `message` unless it already ends with `terminator`.
///
/// Fails if the terminator appears anywhere before the end, since the peer
/// would split the message there.
pub fn frame_message(message: &str, terminator: char) -> Result<String, LinkError> {
    let body = message.strip_suffix(terminator).unwrap_or(message);
    if body.contains(terminator) {
        return Err(LinkError::TerminatorInMessage(terminator));
    }

    let mut framed = String::with_capacity(body.len() + terminator.len_utf8());
    framed.push_str(body);
    framed.push(terminator);
    Ok(framed)
}

/// Split `data` into ordered chunks of at most `max_len` bytes.
///
/// Chunks never cut through a UTF-8 character. A character wider than
/// `max_len` is emitted as a chunk of its own.
pub fn chunk_message(data: &str, max_len: usize) -> Vec<&str> {
    let max_len = max_len.max(1);
    let mut chunks = Vec::with_capacity(data.len().div_ceil(max_len));
    let mut start = 0;

    while start < data.len() {
        let mut end = (start + max_len).min(data.len());
        while !data.is_char_boundary(end) {
            end -= 1;
        }
        if end == start {
            end = start + data[start..].chars().next().map_or(1, char::len_utf8);
        }

        chunks.push(&data[start..end]);
        start = end;
    }

    chunks
}

/// Delivery state of one chunk.
#[derive(Debug, Clone, PartialEq)]
pub enum ChunkStatus {
    NotSent,
    Sent,
    Failed(LinkError),
}

impl ChunkStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ChunkStatus::NotSent)
    }
}

/// Completion bookkeeping for one in-flight send.
pub struct PendingSend {
    statuses: Vec<ChunkStatus>,
    settled: usize,
    error: Option<LinkError>,
    policy: ErrorPolicy,
    on_complete: Option<SendCallback>,
}

/// The callback and outcome of a send whose chunks have all settled.
pub struct Completion {
    callback: SendCallback,
    result: Result<(), LinkError>,
}

impl Completion {
    pub fn result(&self) -> &Result<(), LinkError> {
        &self.result
    }

    /// Invoke the caller's callback.
    pub fn fire(self) {
        (self.callback)(self.result)
    }
}

impl PendingSend {
    pub fn new(chunks: usize, policy: ErrorPolicy, on_complete: SendCallback) -> Self {
        Self {
            statuses: vec![ChunkStatus::NotSent; chunks],
            settled: 0,
            error: None,
            policy,
            on_complete: Some(on_complete),
        }
    }

    pub fn chunk_count(&self) -> usize {
        self.statuses.len()
    }

    pub fn status(&self, index: usize) -> Option<&ChunkStatus> {
        self.statuses.get(index)
    }

    pub fn is_complete(&self) -> bool {
        self.settled == self.statuses.len()
    }

    /// Record the write outcome of chunk `index`.
    ///
    /// Returns the completion exactly once: on the call that settles the
    /// last outstanding chunk. The caller fires it after releasing any lock
    /// around this `PendingSend`.
    pub fn record(&mut self, index: usize, result: Result<(), LinkError>) -> Option<Completion> {
        let Some(status) = self.statuses.get_mut(index) else {
            warn!("Completion for unknown chunk {}", index);
            return None;
        };
        if status.is_terminal() {
            warn!("Duplicate completion for chunk {}", index);
            return None;
        }

        match result {
            Ok(()) => *status = ChunkStatus::Sent,
            Err(e) => {
                debug!("Chunk {} failed: {}", index, e);
                let keep = match self.policy {
                    ErrorPolicy::First => self.error.is_none(),
                    ErrorPolicy::Last => true,
                };
                if keep {
                    self.error = Some(e.clone());
                }
                *status = ChunkStatus::Failed(e);
            }
        }
        self.settled += 1;

        if !self.is_complete() {
            return None;
        }

        let callback = self.on_complete.take()?;
        let result = match self.error.take() {
            Some(e) => Err(e),
            None => Ok(()),
        };
        Some(Completion { callback, result })
    }
}

impl std::fmt::Debug for PendingSend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingSend")
            .field("statuses", &self.statuses)
            .field("settled", &self.settled)
            .field("policy", &self.policy)
            .finish()
    }
}
