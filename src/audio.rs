//! ==============================================================================
//! audio.rs - audio blob store
//! ==============================================================================
//!
//! purpose:
//!     keeps the audio prompts the devices play and the clips they upload.
//!
//! layout:
//!     send/English.wav        one blob per supported language (named-key mode)
//!     received/<filename>     free-form device uploads (filename mode)
//!
//! atomicity:
//!     a put writes the whole payload to a unique temp file next to the
//!     target, flushes it, then renames it over the target. readers see the
//!     old blob or the new one. two puts racing on one key leave whichever
//!     rename landed last.
//!
//! ==============================================================================

use std::io::{Cursor, ErrorKind};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use hound::{SampleFormat, WavReader};
use tokio::io::AsyncWriteExt;

use crate::domain::Language;
use crate::error::{GatewayError, Result};

pub const CONTENT_TYPE: &str = "audio/wav";

/// where a blob lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlobKey {
    Language(Language),
    /// a sanitized device filename, see [`BlobKey::upload`]
    Upload(String),
}

impl BlobKey {
    /// key for a device upload, cleaned up like a browser form filename
    pub fn upload(raw_name: &str) -> Result<Self> {
        let name = sanitize_filename(raw_name);
        if name.is_empty() {
            return Err(GatewayError::validation("No selected file"));
        }
        Ok(BlobKey::Upload(name))
    }

    pub fn file_name(&self) -> &str {
        match self {
            BlobKey::Language(lang) => lang.file_name(),
            BlobKey::Upload(name) => name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioBlob {
    pub filename: String,
    pub bytes: Vec<u8>,
    pub content_type: &'static str,
}

/// what the WAV header says
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavFormat {
    pub channels: u16,
    pub sample_rate: u32,
    pub bits_per_sample: u16,
    pub pcm: bool,
}

impl WavFormat {
    /// the devices only play 8 or 16 bit integer PCM
    pub fn is_expected(&self) -> bool {
        self.pcm && matches!(self.bits_per_sample, 8 | 16)
    }
}

pub struct AudioBlobStore {
    send_dir: PathBuf,
    received_dir: PathBuf,
    tmp_seq: AtomicU64,
}

impl AudioBlobStore {
    pub async fn open(send_dir: impl AsRef<Path>, received_dir: impl AsRef<Path>) -> Result<Self> {
        let send_dir = send_dir.as_ref().to_path_buf();
        let received_dir = received_dir.as_ref().to_path_buf();
        for dir in [&send_dir, &received_dir] {
            tokio::fs::create_dir_all(dir).await.map_err(|e| {
                tracing::error!("[AUDIO] cannot create {}: {}", dir.display(), e);
                GatewayError::storage("Failed to prepare audio directory")
            })?;
        }
        Ok(Self { send_dir, received_dir, tmp_seq: AtomicU64::new(0) })
    }

    fn path_for(&self, key: &BlobKey) -> PathBuf {
        match key {
            BlobKey::Language(lang) => self.send_dir.join(lang.file_name()),
            BlobKey::Upload(name) => self.received_dir.join(name),
        }
    }

    /// replace the blob stored under `key`
    pub async fn put(&self, key: &BlobKey, bytes: &[u8]) -> Result<()> {
        let target = self.path_for(key);
        let dir = target.parent().unwrap_or(Path::new("."));
        let seq = self.tmp_seq.fetch_add(1, Ordering::Relaxed);
        let tmp = dir.join(format!(".{}.{}.{}.tmp", key.file_name(), std::process::id(), seq));

        if let Err(e) = write_then_rename(&tmp, &target, bytes).await {
            tracing::error!("[AUDIO] saving {} failed: {}", target.display(), e);
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(GatewayError::storage(format!(
                "Failed to save file {}",
                key.file_name()
            )));
        }

        tracing::info!("[AUDIO] stored {} ({} bytes)", target.display(), bytes.len());
        Ok(())
    }

    pub async fn get(&self, key: &BlobKey) -> Result<AudioBlob> {
        let path = self.path_for(key);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(AudioBlob {
                filename: key.file_name().to_string(),
                bytes,
                content_type: CONTENT_TYPE,
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(GatewayError::not_found(format!(
                "File {} not found",
                key.file_name()
            ))),
            Err(e) => {
                tracing::error!("[AUDIO] reading {} failed: {}", path.display(), e);
                Err(GatewayError::storage(format!("Failed to read file {}", key.file_name())))
            }
        }
    }

    /// header diagnostics for a stored blob; `None` when missing or unreadable
    pub async fn inspect(&self, key: &BlobKey) -> Option<WavFormat> {
        let blob = self.get(key).await.ok()?;
        inspect(&blob.filename, &blob.bytes)
    }
}

async fn write_then_rename(tmp: &Path, target: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = tokio::fs::File::create(tmp).await?;
    file.write_all(bytes).await?;
    file.flush().await?;
    file.sync_all().await?;
    drop(file);
    tokio::fs::rename(tmp, target).await
}

/// read the WAV header of `bytes`
///
/// advisory only: logs a warning when the audio is not something the
/// devices can play, and never fails.
pub fn inspect(name: &str, bytes: &[u8]) -> Option<WavFormat> {
    let spec = match WavReader::new(Cursor::new(bytes)) {
        Ok(reader) => reader.spec(),
        Err(e) => {
            tracing::warn!("[AUDIO] {} is not a readable WAV file: {}", name, e);
            return None;
        }
    };

    let format = WavFormat {
        channels: spec.channels,
        sample_rate: spec.sample_rate,
        bits_per_sample: spec.bits_per_sample,
        pcm: spec.sample_format == SampleFormat::Int,
    };

    if format.is_expected() {
        tracing::debug!(
            "[AUDIO] {}: {} Hz, {} ch, {} bit PCM",
            name, format.sample_rate, format.channels, format.bits_per_sample
        );
    } else {
        tracing::warn!(
            "[AUDIO] {}: unexpected format ({} Hz, {} ch, {} bit, pcm={})",
            name, format.sample_rate, format.channels, format.bits_per_sample, format.pcm
        );
    }
    Some(format)
}

/// basename only, spaces to underscores, ascii `[A-Za-z0-9._-]`, no leading dots
pub fn sanitize_filename(raw: &str) -> String {
    let base = raw.rsplit(['/', '\\']).next().unwrap_or("");
    let cleaned: String = base
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
        .collect();
    cleaned.trim_start_matches(['.', '_']).to_string()
}
