use serde::{Deserialize, Serialize};

/// Envelope received on the media stream connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum StreamMessage {
    Connected {
        #[serde(default)]
        protocol: Option<String>,
        #[serde(default)]
        version: Option<String>,
    },
    Start {
        #[serde(rename = "streamSid", default)]
        stream_sid: Option<String>,
        start: StartMetadata,
    },
    Media {
        #[serde(rename = "streamSid", default)]
        stream_sid: Option<String>,
        media: MediaPayload,
    },
    Stop {
        #[serde(rename = "streamSid", default)]
        stream_sid: Option<String>,
        stop: StopMetadata,
    },
    Mark {
        #[serde(rename = "streamSid", default)]
        stream_sid: Option<String>,
    },
    #[serde(other)]
    Unknown,
}

impl StreamMessage {
    pub fn parse(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }

    /// Event name, for logging
    pub fn kind(&self) -> &'static str {
        match self {
            StreamMessage::Connected { .. } => "connected",
            StreamMessage::Start { .. } => "start",
            StreamMessage::Media { .. } => "media",
            StreamMessage::Stop { .. } => "stop",
            StreamMessage::Mark { .. } => "mark",
            StreamMessage::Unknown => "unknown",
        }
    }
}

/// Call metadata carried by the `start` event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartMetadata {
    #[serde(default)]
    pub stream_sid: String,
    #[serde(default)]
    pub account_sid: String,
    #[serde(default)]
    pub call_sid: String,
    #[serde(default)]
    pub tracks: Vec<String>,
    #[serde(default)]
    pub custom_parameters: serde_json::Value,
    pub media_format: MediaFormat,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaFormat {
    /// e.g. "audio/x-mulaw"
    pub encoding: String,
    pub sample_rate: u32,
    pub channels: u16,
}

/// One audio chunk for one track
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaPayload {
    pub track: String,
    #[serde(default)]
    pub chunk: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
    /// Base64-encoded audio
    pub payload: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopMetadata {
    #[serde(default)]
    pub account_sid: String,
    #[serde(default)]
    pub call_sid: String,
}
