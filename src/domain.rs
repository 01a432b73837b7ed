use serde::{Deserialize, Serialize};
use serde_json::Number;
use std::fmt;
use std::str::FromStr;

use crate::error::GatewayError;

/// one reading from a field device, stored as a single log line
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct SensorRecord {
    /// opaque device identifier (e.g., "AGRO-001")
    pub device_id: String,
    /// ISO-8601 timestamp as sent by the device; not reordered or checked
    pub timestamp: String,
    /// raw light channel, kept exactly as the device sent it
    pub light_value: Number,
    /// raw soil moisture channel
    pub moisture_value: Number,
}

/// languages the devices carry prompts for
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Language {
    #[serde(rename = "en")]
    English,
    #[serde(rename = "ha")]
    Hausa,
    #[serde(rename = "sw")]
    Swahili,
}

impl Language {
    pub const ALL: [Language; 3] = [Language::English, Language::Hausa, Language::Swahili];

    pub fn code(self) -> &'static str {
        match self {
            Language::English => "en",
            Language::Hausa => "ha",
            Language::Swahili => "sw",
        }
    }

    /// name of the blob on disk, e.g. `English.wav`
    pub fn file_name(self) -> &'static str {
        match self {
            Language::English => "English.wav",
            Language::Hausa => "Hausa.wav",
            Language::Swahili => "Swahili.wav",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Language {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Language::ALL
            .into_iter()
            .find(|lang| lang.code() == s.trim())
            .ok_or_else(|| GatewayError::validation("Invalid language"))
    }
}

// ==============================================================================
// request structs
// ==============================================================================

/// sensor payload as it arrives; every field optional so a missing key is
/// reported as such instead of as a generic decode failure
#[derive(Debug, Default, Deserialize)]
pub struct SensorRecordRequest {
    #[serde(default)]
    pub device_id: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub light_value: Option<Number>,
    #[serde(default)]
    pub moisture_value: Option<Number>,
}

impl SensorRecordRequest {
    pub fn into_record(self) -> Result<SensorRecord, GatewayError> {
        match (self.device_id, self.timestamp, self.light_value, self.moisture_value) {
            (Some(device_id), Some(timestamp), Some(light_value), Some(moisture_value)) => {
                Ok(SensorRecord { device_id, timestamp, light_value, moisture_value })
            }
            _ => Err(GatewayError::validation("Missing required sensor fields")),
        }
    }
}

/// JSON form of an audio upload, used by the socket and by JSON POSTs
#[derive(Debug, Deserialize)]
pub struct AudioEnvelope {
    /// base64-encoded audio bytes
    pub audio: Option<String>,
    pub filename: Option<String>,
    pub lang: Option<String>,
}

/// a fully decoded upload, ready for the blob store
#[derive(Debug, Clone)]
pub struct UploadAudio {
    pub filename: String,
    pub lang: Option<Language>,
    pub audio: Vec<u8>,
}

// ==============================================================================
// response structs
// ==============================================================================

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct StatusResponse {
    pub status: &'static str,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct UploadResponse {
    pub status: &'static str,
    pub filename: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct AudioEnvelopeResponse {
    pub filename: String,
    pub audio: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FetchResponse {
    pub entries_returned: usize,
    pub data: Vec<SensorRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SelectionResponse {
    pub cmd: Option<Language>,
    pub audio_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SelectResponse {
    pub lang: Language,
}
