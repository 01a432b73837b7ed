//! ==============================================================================
//! relay.rs - outbound pushes to devices and a second database
//! ==============================================================================
//!
//! purpose:
//!     some deployments cannot have the device poll. there the gateway pushes
//!     each language selection straight to the device. independently, a
//!     deployment may mirror every saved sensor record to another database
//!     endpoint.
//!
//!     both are chosen in `[relay]` of gateway.toml. neither ever affects the
//!     response of the request that triggered it: calls run on their own
//!     task, failures are logged and dropped, nothing is retried.
//!
//! relationships:
//!     - used by: dispatcher.rs (select_language, log_sensor_data)
//!     - reads: config.rs (RelayConfig)
//!
//! ==============================================================================

use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::config::{RelayConfig, RelayMode};
use crate::domain::{Language, SensorRecord};

#[derive(Clone)]
pub struct Relay {
    client: reqwest::Client,
    /// set only in push mode
    device_url: Option<String>,
    forward_telemetry_url: Option<String>,
}

/// body pushed to the device; same shape the device gets when polling
#[derive(Serialize)]
struct DeviceCommand<'a> {
    cmd: Language,
    audio_url: &'a str,
}

impl Relay {
    pub fn from_config(config: &RelayConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .context("failed to build relay http client")?;

        let device_url = match config.mode {
            RelayMode::Push => config.device_url.clone(),
            RelayMode::Poll => None,
        };

        Ok(Self {
            client,
            device_url,
            forward_telemetry_url: config.forward_telemetry_url.clone(),
        })
    }

    /// a relay that never sends anything
    pub fn disabled() -> Self {
        Self {
            client: reqwest::Client::new(),
            device_url: None,
            forward_telemetry_url: None,
        }
    }

    pub fn pushes_selection(&self) -> bool {
        self.device_url.is_some()
    }

    /// hand the new selection to the device (push mode only)
    pub fn push_selection(&self, lang: Language, audio_url: String) {
        let Some(url) = self.device_url.clone() else {
            return;
        };
        let client = self.client.clone();
        tokio::spawn(async move {
            let body = DeviceCommand { cmd: lang, audio_url: &audio_url };
            match client.post(&url).json(&body).send().await {
                Ok(resp) if resp.status().is_success() => {
                    tracing::info!("[RELAY] pushed {} to {}", lang, url);
                }
                Ok(resp) => {
                    tracing::warn!("[RELAY] device at {} answered {}", url, resp.status());
                }
                Err(e) => {
                    tracing::warn!("[RELAY] push to {} failed: {}", url, e);
                }
            }
        });
    }

    /// mirror a saved record to the second database, if one is configured
    pub fn forward_record(&self, record: &SensorRecord) {
        let Some(url) = self.forward_telemetry_url.clone() else {
            return;
        };
        let client = self.client.clone();
        let record = record.clone();
        tokio::spawn(async move {
            match client.post(&url).json(&record).send().await {
                Ok(resp) if resp.status().is_success() => {
                    tracing::debug!("[RELAY] forwarded record from {}", record.device_id);
                }
                Ok(resp) => {
                    tracing::warn!("[RELAY] telemetry sink {} answered {}", url, resp.status());
                }
                Err(e) => {
                    tracing::warn!("[RELAY] forwarding to {} failed: {}", url, e);
                }
            }
        });
    }
}
