//! ==============================================================================
//! config.rs - Gateway Configuration Loader
//! ==============================================================================
//!
//! purpose:
//!     defines the schema for `gateway.toml`.
//!     loads configuration from file or falls back to defaults.
//!
//! structure:
//!     - ServerConfig: bind address, upload size limit, public url prefix.
//!     - StorageConfig: telemetry log file and the two audio directories.
//!     - AudioConfig: which language the fixed download endpoint serves.
//!     - RelayConfig: deployment mode (poll vs push) and forwarding targets.
//!     - LoggingConfig: log level and per-record echo.
//!
//! ==============================================================================

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::domain::Language;

/// Root configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct GatewayConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub max_upload_bytes: usize,
    /// prefix for `audio_url` in selection responses; empty gives a relative url
    pub public_base_url: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub telemetry_log: PathBuf,
    pub audio_send_dir: PathBuf,
    pub audio_received_dir: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AudioConfig {
    pub default_language: Language,
}

/// how the selected language reaches the device
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RelayMode {
    /// device polls `GET /api/selection`
    #[default]
    Poll,
    /// gateway POSTs each selection to `device_url`
    Push,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RelayConfig {
    pub mode: RelayMode,
    pub device_url: Option<String>,
    /// second database endpoint that receives a copy of every saved record
    pub forward_telemetry_url: Option<String>,
    pub timeout_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub show_sensor_data: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:5000".to_string(),
            max_upload_bytes: 10 * 1024 * 1024,
            public_base_url: String::new(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            telemetry_log: PathBuf::from("sensor_logs.txt"),
            audio_send_dir: PathBuf::from("audio").join("send"),
            audio_received_dir: PathBuf::from("audio").join("received"),
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self { default_language: Language::English }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            mode: RelayMode::Poll,
            device_url: None,
            forward_telemetry_url: None,
            timeout_ms: 3_000,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), show_sensor_data: true }
    }
}

impl GatewayConfig {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| anyhow::anyhow!("Failed to read config file: {}", e))?;

        let config: GatewayConfig = toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse config: {}", e))?;

        config.validate()?;
        Ok(config)
    }

    /// Load with default fallback
    ///
    /// `GATEWAY_CONFIG` wins over the search paths when set. Returns the
    /// config plus a note on where it came from; logging is not up yet
    /// when this runs, so the caller reports it.
    pub fn load_or_default() -> (Self, String) {
        let mut paths = Vec::new();
        if let Ok(explicit) = std::env::var("GATEWAY_CONFIG") {
            paths.push(PathBuf::from(explicit));
        }
        paths.push(PathBuf::from("config").join("gateway.toml"));
        paths.push(PathBuf::from("..").join("config").join("gateway.toml"));

        let mut notes = Vec::new();
        for path in &paths {
            if path.exists() {
                match Self::load(path) {
                    Ok(config) => return (config, format!("loaded from {}", path.display())),
                    Err(e) => notes.push(format!("failed to load {}: {}", path.display(), e)),
                }
            }
        }

        notes.push("no usable config file found - using defaults".to_string());
        (Self::default(), notes.join("; "))
    }

    /// push mode needs a device address and an absolute audio url,
    /// the device cannot resolve a relative one
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.relay.mode != RelayMode::Push {
            return Ok(());
        }
        if self.relay.device_url.is_none() {
            anyhow::bail!("relay.mode = \"push\" requires relay.device_url");
        }
        if self.server.public_base_url.trim().is_empty() {
            anyhow::bail!("relay.mode = \"push\" requires server.public_base_url");
        }
        Ok(())
    }

    /// Log configuration summary
    pub fn log_summary(&self) {
        tracing::info!("[CONFIG] bind: {}", self.server.bind);
        tracing::info!("[CONFIG] telemetry log: {}", self.storage.telemetry_log.display());
        tracing::info!(
            "[CONFIG] audio dirs: send={} received={}",
            self.storage.audio_send_dir.display(),
            self.storage.audio_received_dir.display()
        );
        tracing::info!("[CONFIG] default language: {}", self.audio.default_language);
        tracing::info!("[CONFIG] relay mode: {:?}", self.relay.mode);
        if let Some(url) = &self.relay.forward_telemetry_url {
            tracing::info!("[CONFIG] forwarding telemetry to {}", url);
        }
        tracing::info!("[CONFIG] log level: {}", self.logging.level);
    }
}
