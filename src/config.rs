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

//! Configuration module.
//!
//! Handles link tuning and loading/saving the bridge settings file.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::bluetooth::ble_constants::{config as ble, MESSAGE_TERMINATOR};
use crate::error::LinkError;

/// Which chunk error is reported when several writes of one message fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorPolicy {
    /// The first failure observed is reported.
    #[default]
    First,
    /// Every failure overwrites the previous one.
    Last,
}

/// Per-link protocol settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Maximum bytes per write.
    pub chunk_size: usize,

    /// Character closing every message. Must be ASCII.
    pub terminator: char,

    /// Inbound bytes buffered before a terminator must arrive.
    pub max_message_len: usize,

    /// Chunk error aggregation.
    pub write_error_policy: ErrorPolicy,

    /// Signal strength polling.
    pub rssi: RssiConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RssiConfig {
    /// Poll RSSI once the link is ready.
    pub enabled: bool,

    /// Polling period in milliseconds.
    pub interval_ms: u64,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            chunk_size: ble::BLE_MAX_CHUNK_SIZE,
            terminator: MESSAGE_TERMINATOR,
            max_message_len: ble::MAX_MESSAGE_LEN,
            write_error_policy: ErrorPolicy::default(),
            rssi: RssiConfig::default(),
        }
    }
}

impl Default for RssiConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_ms: ble::RSSI_UPDATE_RATE_MS,
        }
    }
}

impl RssiConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl LinkConfig {
    /// Enable RSSI polling with the given period.
    pub fn with_rssi(mut self, interval: Duration) -> Self {
        self.rssi = RssiConfig {
            enabled: true,
            interval_ms: interval.as_millis() as u64,
        };
        self
    }

    /// The terminator as it appears on the wire.
    pub fn terminator_byte(&self) -> u8 {
        self.terminator as u8
    }

    /// Reject settings the framer and reassembler cannot honour.
    pub fn validate(&self) -> Result<(), LinkError> {
        if !(ble::MIN_CHUNK_SIZE..=ble::MAX_ATT_VALUE).contains(&self.chunk_size) {
            return Err(LinkError::Config(format!(
                "chunk_size must be within {}..={}, got {}",
                ble::MIN_CHUNK_SIZE,
                ble::MAX_ATT_VALUE,
                self.chunk_size
            )));
        }
        if !self.terminator.is_ascii() {
            return Err(LinkError::Config(format!(
                "terminator must be ASCII, got {:?}",
                self.terminator
            )));
        }
        if self.max_message_len == 0 {
            return Err(LinkError::Config("max_message_len must be non-zero".to_string()));
        }
        if self.rssi.enabled && self.rssi.interval_ms == 0 {
            return Err(LinkError::Config("rssi.interval_ms must be non-zero".to_string()));
        }
        Ok(())
    }
}

/// Bridge application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Link protocol settings.
    pub link: LinkConfig,

    /// Device scan settings.
    pub scan: ScanConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Give up scanning after this many seconds.
    pub timeout_secs: u64,

    /// Only accept the Feather with this address ("AA:BB:CC:DD:EE:FF").
    pub address: Option<String>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            address: None,
        }
    }
}

fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("feather-link")
        .join("config.toml")
}

impl Config {
    /// Load configuration from file or create default.
    pub fn load() -> Result<Self> {
        let config_path = config_path();

        if config_path.exists() {
            return Self::load_from(&config_path);
        }

        let config = Self::default();
        config.save_to(&config_path)?;
        Ok(config)
    }

    /// Load and validate configuration from an explicit file.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: Self =
            toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
        config.link.validate()?;
        Ok(config)
    }

    fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
