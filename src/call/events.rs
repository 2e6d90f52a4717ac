use crate::recognition::{RecognitionError, SessionObserver};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

/// A piece of recognized text attributed to a track
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptFragment {
    /// Track the audio came from (e.g. "inbound")
    pub track: String,

    /// Transcribed text, trimmed and never empty
    pub text: String,

    /// When this fragment was received
    pub timestamp: DateTime<Utc>,

    /// Whether the backend marked the result final (otherwise interim)
    pub is_final: bool,
}

/// What a call reports to its consumer
#[derive(Debug, Clone)]
pub enum CallEvent {
    Transcription(TranscriptFragment),
    Error {
        track: String,
        error: RecognitionError,
    },
}

impl CallEvent {
    pub fn track(&self) -> &str {
        match self {
            CallEvent::Transcription(fragment) => &fragment.track,
            CallEvent::Error { track, .. } => track,
        }
    }
}

/// Observer installed on every session of a call; tags events with the
/// track and forwards them to the call's event channel.
pub struct TrackObserver {
    track: String,
    events: mpsc::UnboundedSender<CallEvent>,
}

impl TrackObserver {
    pub fn new(track: impl Into<String>, events: mpsc::UnboundedSender<CallEvent>) -> Self {
        Self {
            track: track.into(),
            events,
        }
    }

    fn forward(&self, event: CallEvent) {
        if self.events.send(event).is_err() {
            debug!("Call event consumer gone, dropping event for {}", self.track);
        }
    }
}

impl SessionObserver for TrackObserver {
    fn on_transcription(&self, text: &str, is_final: bool) {
        self.forward(CallEvent::Transcription(TranscriptFragment {
            track: self.track.clone(),
            text: text.to_string(),
            timestamp: Utc::now(),
            is_final,
        }));
    }

    fn on_error(&self, error: &RecognitionError) {
        self.forward(CallEvent::Error {
            track: self.track.clone(),
            error: error.clone(),
        });
    }
}
