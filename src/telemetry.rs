//! ==============================================================================
//! telemetry.rs - append-only sensor log
//! ==============================================================================
//!
//! purpose:
//!     persists sensor readings as one JSON object per line and answers
//!     "last N readings" queries.
//!
//! write discipline:
//!     appends go through a single async mutex that owns the file handle and
//!     the durable length. each record is serialized up front, written in one
//!     call, flushed and `sync_data`'d before the lock is released. if the
//!     write fails the file is cut back to the last durable length so the
//!     next append starts on a clean line.
//!
//! read discipline:
//!     readers never take the append lock. they read the file and only trust
//!     newline-terminated lines, so an append in flight shows up as an
//!     earlier prefix of the log, never as a torn record.
//!
//! relationships:
//!     - used by: dispatcher.rs (log_sensor_data, fetch_sensor_data)
//!
//! ==============================================================================

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::domain::SensorRecord;
use crate::error::{GatewayError, Result};

pub struct TelemetryLog {
    path: PathBuf,
    writer: Mutex<LogWriter>,
}

struct LogWriter {
    file: File,
    /// bytes known to be complete, newline-terminated records
    len: u64,
}

/// result of a `fetch_last` call
#[derive(Debug, Clone, PartialEq)]
pub struct Window {
    /// oldest to newest
    pub records: Vec<SensorRecord>,
    pub requested: usize,
    pub available: usize,
}

impl Window {
    /// more records were asked for than the log holds
    pub fn is_clamped(&self) -> bool {
        self.requested > self.available
    }

    pub fn clamp_message(&self) -> Option<String> {
        self.is_clamped()
            .then(|| format!("max data in DB is {}", self.available))
    }
}

impl TelemetryLog {
    /// open (or create) the log at `path`
    ///
    /// a trailing partial line left behind by a crash is dropped so new
    /// records never get glued onto it.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| storage_failure("create log directory", &path, e))?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| storage_failure("open telemetry log", &path, e))?;

        let content = tokio::fs::read(&path)
            .await
            .map_err(|e| storage_failure("read telemetry log", &path, e))?;
        let durable = complete_prefix_len(&content);
        if durable < content.len() as u64 {
            tracing::warn!(
                "[TELEMETRY] dropping {} bytes of torn record at end of {}",
                content.len() as u64 - durable,
                path.display()
            );
            file.set_len(durable)
                .await
                .map_err(|e| storage_failure("repair telemetry log", &path, e))?;
        }

        tracing::debug!("[TELEMETRY] opened {} ({} bytes)", path.display(), durable);
        Ok(Self {
            path,
            writer: Mutex::new(LogWriter { file, len: durable }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// durably append one record
    pub async fn append(&self, record: &SensorRecord) -> Result<()> {
        validate(record)?;

        let mut line = serde_json::to_vec(record)
            .map_err(|e| GatewayError::storage(format!("Failed to encode sensor record: {}", e)))?;
        line.push(b'\n');

        let mut writer = self.writer.lock().await;
        let start = writer.len;
        if let Err(e) = write_line(&mut writer.file, &line).await {
            tracing::error!("[TELEMETRY] append to {} failed: {}", self.path.display(), e);
            if let Err(e) = cut_back(&writer.file, start).await {
                tracing::error!("[TELEMETRY] could not cut back torn append: {}", e);
            }
            return Err(GatewayError::storage("Failed to log sensor data"));
        }
        writer.len = start + line.len() as u64;
        Ok(())
    }

    /// the most recent `min(n, total)` records, oldest first
    pub async fn fetch_last(&self, n: usize) -> Result<Window> {
        if n == 0 {
            return Err(GatewayError::validation("count must be a positive integer"));
        }

        let mut records = self.read_all().await?;
        if records.is_empty() {
            return Err(GatewayError::Empty("No sensor data available".to_string()));
        }

        let available = records.len();
        let tail = records.split_off(available.saturating_sub(n));
        Ok(Window { records: tail, requested: n, available })
    }

    /// number of complete records currently in the log
    pub async fn len(&self) -> Result<usize> {
        Ok(self.read_all().await?.len())
    }

    async fn read_all(&self) -> Result<Vec<SensorRecord>> {
        let content = match tokio::fs::read(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                tracing::error!("[TELEMETRY] read of {} failed: {}", self.path.display(), e);
                return Err(GatewayError::storage("Failed to read sensor data"));
            }
        };
        Ok(parse_records(&content))
    }
}

fn validate(record: &SensorRecord) -> Result<()> {
    if record.device_id.trim().is_empty() {
        return Err(GatewayError::validation("device_id must not be empty"));
    }
    if record.timestamp.trim().is_empty() {
        return Err(GatewayError::validation("timestamp must not be empty"));
    }
    let finite = |n: &serde_json::Number| n.as_f64().is_some_and(f64::is_finite);
    if !finite(&record.light_value) || !finite(&record.moisture_value) {
        return Err(GatewayError::validation("sensor values must be finite numbers"));
    }
    Ok(())
}

async fn write_line(file: &mut File, line: &[u8]) -> std::io::Result<()> {
    file.write_all(line).await?;
    file.flush().await?;
    file.sync_data().await
}

/// drop whatever a failed append left past `len`
async fn cut_back(file: &File, len: u64) -> std::io::Result<()> {
    file.set_len(len).await?;
    file.sync_data().await
}

/// length of the newline-terminated part of `content`
fn complete_prefix_len(content: &[u8]) -> u64 {
    content
        .iter()
        .rposition(|&b| b == b'\n')
        .map(|i| i as u64 + 1)
        .unwrap_or(0)
}

fn parse_records(content: &[u8]) -> Vec<SensorRecord> {
    let complete = &content[..complete_prefix_len(content) as usize];
    complete
        .split(|&b| b == b'\n')
        .enumerate()
        .filter(|(_, line)| !line.iter().all(u8::is_ascii_whitespace))
        .filter_map(|(i, line)| match serde_json::from_slice::<SensorRecord>(line) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::warn!("[TELEMETRY] skipping unreadable line {}: {}", i + 1, e);
                None
            }
        })
        .collect()
}

fn storage_failure(action: &str, path: &Path, e: std::io::Error) -> GatewayError {
    tracing::error!("[TELEMETRY] {} {}: {}", action, path.display(), e);
    GatewayError::storage(format!("Failed to {}", action))
}
