//! ==============================================================================
//! dispatcher.rs - transport-agnostic request handling
//! ==============================================================================
//!
//! purpose:
//!     the one place where inbound requests meet the stores. the http routes
//!     and the websocket events both call in here with raw payloads and get
//!     back either a response struct or a GatewayError.
//!
//! per operation:
//!     1. decode the payload into a request struct (nothing touched yet)
//!     2. call the store(s)
//!     3. return exactly the protocol fields
//!
//! relationships:
//!     - used by: server.rs (http), ws.rs (socket events)
//!     - owns: telemetry.rs, audio.rs, selection.rs, relay.rs
//!
//! ==============================================================================

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Deserialize;
use serde_json::Value;

use crate::audio::{self, AudioBlob, AudioBlobStore, BlobKey};
use crate::config::GatewayConfig;
use crate::domain::{
    AudioEnvelope, AudioEnvelopeResponse, FetchResponse, Language, SelectResponse,
    SelectionResponse, SensorRecordRequest, StatusResponse, UploadAudio, UploadResponse,
};
use crate::error::{GatewayError, Result};
use crate::relay::Relay;
use crate::selection::SelectionState;
use crate::telemetry::TelemetryLog;

/// knobs the dispatcher needs beyond its stores
#[derive(Debug, Clone)]
pub struct DispatcherSettings {
    /// served when a download names no language
    pub default_language: Language,
    /// prefix for `audio_url`; empty keeps the url relative
    pub public_base_url: String,
    /// echo every saved record at info level
    pub show_sensor_data: bool,
}

/// cheap to clone; all clones share the same stores
#[derive(Clone)]
pub struct GatewayDispatcher {
    inner: Arc<Inner>,
}

struct Inner {
    telemetry: TelemetryLog,
    audio: AudioBlobStore,
    selection: SelectionState,
    relay: Relay,
    settings: DispatcherSettings,
}

#[derive(Debug, Default, Deserialize)]
struct AudioQuery {
    #[serde(default)]
    lang: Option<String>,
}

impl GatewayDispatcher {
    pub fn new(
        telemetry: TelemetryLog,
        audio: AudioBlobStore,
        relay: Relay,
        settings: DispatcherSettings,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                telemetry,
                audio,
                selection: SelectionState::new(),
                relay,
                settings,
            }),
        }
    }

    /// open every store named in `config`
    pub async fn open(config: &GatewayConfig) -> anyhow::Result<Self> {
        let telemetry = TelemetryLog::open(&config.storage.telemetry_log).await?;
        let audio = AudioBlobStore::open(
            &config.storage.audio_send_dir,
            &config.storage.audio_received_dir,
        )
        .await?;
        let relay = Relay::from_config(&config.relay)?;

        for lang in Language::ALL {
            if audio.inspect(&BlobKey::Language(lang)).await.is_none() {
                tracing::info!("[AUDIO] no usable prompt for {} yet", lang);
            }
        }

        Ok(Self::new(
            telemetry,
            audio,
            relay,
            DispatcherSettings {
                default_language: config.audio.default_language,
                public_base_url: config.server.public_base_url.clone(),
                show_sensor_data: config.logging.show_sensor_data,
            },
        ))
    }

    // ==========================================================================
    // audio
    // ==========================================================================

    /// store an upload: under its language when one is given, otherwise
    /// under its (sanitized) filename
    pub async fn upload_audio(&self, upload: UploadAudio) -> Result<UploadResponse> {
        if upload.audio.is_empty() {
            return Err(GatewayError::validation("Audio payload is empty"));
        }
        let key = match upload.lang {
            Some(lang) => BlobKey::Language(lang),
            None => BlobKey::upload(&upload.filename)?,
        };

        audio::inspect(key.file_name(), &upload.audio);
        self.inner.audio.put(&key, &upload.audio).await?;

        Ok(UploadResponse {
            status: "received",
            filename: key.file_name().to_string(),
        })
    }

    /// `{audio: <base64>, filename, lang?}` form of [`upload_audio`]
    ///
    /// [`upload_audio`]: GatewayDispatcher::upload_audio
    pub async fn upload_audio_envelope(&self, payload: Value) -> Result<UploadResponse> {
        let upload = decode_upload(payload)?;
        self.upload_audio(upload).await
    }

    pub async fn request_audio(&self, lang: Option<&str>) -> Result<AudioBlob> {
        let lang = match lang.map(str::trim).filter(|code| !code.is_empty()) {
            Some(code) => code.parse::<Language>()?,
            None => self.inner.settings.default_language,
        };
        self.inner.audio.get(&BlobKey::Language(lang)).await
    }

    /// `{lang?}` in, `{filename, audio: <base64>}` out
    pub async fn request_audio_envelope(&self, payload: Value) -> Result<AudioEnvelopeResponse> {
        let query: AudioQuery = decode_optional(payload, "audio request")?;
        let blob = self.request_audio(query.lang.as_deref()).await?;
        Ok(AudioEnvelopeResponse {
            filename: blob.filename,
            audio: STANDARD.encode(&blob.bytes),
        })
    }

    // ==========================================================================
    // telemetry
    // ==========================================================================

    pub async fn log_sensor_data(&self, payload: Value) -> Result<StatusResponse> {
        if !payload.is_object() {
            return Err(GatewayError::validation("Request must be JSON"));
        }
        let request: SensorRecordRequest = serde_json::from_value(payload)
            .map_err(|e| GatewayError::validation(format!("Invalid sensor fields: {}", e)))?;
        let record = request.into_record()?;

        self.inner.telemetry.append(&record).await?;
        if self.inner.settings.show_sensor_data {
            tracing::info!(
                "[TELEMETRY] {} @ {} | light: {} | moisture: {}",
                record.device_id, record.timestamp, record.light_value, record.moisture_value
            );
        }
        self.inner.relay.forward_record(&record);

        Ok(StatusResponse { status: "saved" })
    }

    /// `count` may be a JSON integer or a numeric string; absent means 1
    pub async fn fetch_sensor_data(&self, count: Option<&Value>) -> Result<FetchResponse> {
        let n = parse_count(count)?;
        let window = self.inner.telemetry.fetch_last(n).await?;
        let message = window.clamp_message();
        Ok(FetchResponse {
            entries_returned: window.records.len(),
            data: window.records,
            message,
        })
    }

    // ==========================================================================
    // selection
    // ==========================================================================

    pub fn current_selection(&self) -> SelectionResponse {
        let cmd = self.inner.selection.current();
        SelectionResponse {
            cmd,
            audio_url: cmd.map(|lang| self.audio_url(lang)),
        }
    }

    pub fn select_language(&self, code: &str) -> Result<SelectResponse> {
        let lang = self.inner.selection.select(code)?;
        if self.inner.relay.pushes_selection() {
            self.inner.relay.push_selection(lang, self.audio_url(lang));
        }
        Ok(SelectResponse { lang })
    }

    pub fn health(&self) -> StatusResponse {
        StatusResponse { status: "ok" }
    }

    fn audio_url(&self, lang: Language) -> String {
        format!(
            "{}/api/audio2?lang={}",
            self.inner.settings.public_base_url.trim_end_matches('/'),
            lang.code()
        )
    }
}

/// decode the json upload form into an [`UploadAudio`]
pub fn decode_upload(payload: Value) -> Result<UploadAudio> {
    if !payload.is_object() {
        return Err(GatewayError::validation("Request must be JSON"));
    }
    let envelope: AudioEnvelope = serde_json::from_value(payload)
        .map_err(|e| GatewayError::validation(format!("Invalid audio payload: {}", e)))?;

    let encoded = envelope
        .audio
        .ok_or_else(|| GatewayError::validation("No audio file part in the request"))?;
    let audio = STANDARD
        .decode(encoded.trim())
        .map_err(|_| GatewayError::validation("audio must be base64-encoded"))?;
    let lang = envelope.lang.map(|code| code.parse::<Language>()).transpose()?;

    Ok(UploadAudio {
        filename: envelope.filename.unwrap_or_default(),
        lang,
        audio,
    })
}

/// positive integer, given as a number or a numeric string
pub fn parse_count(raw: Option<&Value>) -> Result<usize> {
    let invalid = || GatewayError::validation("count must be a positive integer");
    let n: i64 = match raw {
        None | Some(Value::Null) => return Ok(1),
        Some(Value::Number(n)) => n.as_i64().ok_or_else(invalid)?,
        Some(Value::String(s)) => s.trim().parse().map_err(|_| invalid())?,
        Some(_) => return Err(invalid()),
    };
    if n <= 0 {
        return Err(invalid());
    }
    usize::try_from(n).map_err(|_| invalid())
}

/// null and missing payloads decode as the default request
fn decode_optional<T: Default + serde::de::DeserializeOwned>(payload: Value, what: &str) -> Result<T> {
    if payload.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(payload)
        .map_err(|e| GatewayError::validation(format!("Invalid {}: {}", what, e)))
}
