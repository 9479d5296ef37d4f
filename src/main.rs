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

//! Feather Link command-line bridge.
//!
//! Scans for a Feather, prints what it sends and sends every stdin line.

use anyhow::{anyhow, Result};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use feather_link::bluetooth::{bluez, BluezPeripheral};
use feather_link::config::Config;
use feather_link::{EventKind, Feather, LinkEvent};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("feather_link=info".parse()?),
        )
        .init();

    info!("Starting Feather Link v{}...", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = Config::load()?;
    info!("Configuration loaded");

    let address = config
        .scan
        .address
        .as_deref()
        .map(|s| s.parse::<bluer::Address>())
        .transpose()
        .map_err(|e| anyhow!("invalid scan.address: {:?}", e))?;

    let adapter = bluez::default_adapter().await?;
    let device = bluez::scan_for_feather(
        &adapter,
        address,
        Duration::from_secs(config.scan.timeout_secs),
    )
    .await?;

    let feather = Feather::new(BluezPeripheral::new(device), config.link.clone())?;

    info!("Using Feather {}", feather.peripheral().address());

    // One receiver for every kind, so disconnects stay ordered after messages
    let (event_tx, mut event_rx) = tokio::sync::mpsc::unbounded_channel::<LinkEvent>();
    for kind in EventKind::ALL {
        feather.events().forward(kind, event_tx.clone());
    }
    drop(event_tx);

    feather.setup().await?;
    info!("Ready. Type a line to send it, Ctrl-C to quit.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            Some(event) = event_rx.recv() => {
                match event {
                    LinkEvent::Message(Ok(text)) => println!("< {}", text),
                    LinkEvent::Message(Err(e)) => warn!("Dropped inbound data: {}", e),
                    LinkEvent::Rssi { value, error: None } => info!("RSSI: {} dBm", value),
                    LinkEvent::Rssi { error: Some(e), .. } => warn!("RSSI unavailable: {}", e),
                    LinkEvent::Disconnected => {
                        info!("Feather disconnected");
                        break;
                    }
                    LinkEvent::Ready(_) => {}
                }
            }
            line = lines.next_line() => {
                match line? {
                    Some(line) => {
                        if let Err(e) = feather.send(&line).await {
                            error!("Failed to send message: {}", e);
                        }
                    }
                    None => {
                        info!("End of input");
                        break;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    if feather.is_connected() {
        feather.disconnect().await;
    }

    info!("Feather Link stopped");
    Ok(())
}
