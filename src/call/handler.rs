use super::events::CallEvent;
use super::messages::{MediaPayload, StartMetadata, StreamMessage};
use super::registry::TrackRegistry;
use crate::recognition::{RecognitionBackend, RecognitionSettings};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallState {
    AwaitingStart,
    Active,
    Ended,
}

/// Handles the media stream of a single call
///
/// Messages are processed one at a time in arrival order. Audio is only
/// accepted between `start` and `stop`; nothing received here is ever
/// allowed to fail the connection.
pub struct CallHandler {
    state: CallState,
    metadata: Option<StartMetadata>,
    settings: RecognitionSettings,
    registry: TrackRegistry,
    /// Audio frames ignored because the call was not active
    frames_dropped: usize,
}

impl CallHandler {
    pub fn new(
        settings: RecognitionSettings,
        backend: Arc<dyn RecognitionBackend>,
        events: mpsc::UnboundedSender<CallEvent>,
    ) -> Self {
        let registry = TrackRegistry::new(settings.clone(), backend, events);

        Self {
            state: CallState::AwaitingStart,
            metadata: None,
            settings,
            registry,
            frames_dropped: 0,
        }
    }

    /// Parse and handle one text frame from the media connection
    pub fn handle_text(&mut self, raw: &str) {
        match StreamMessage::parse(raw) {
            Ok(message) => self.handle(message),
            Err(e) => warn!("Ignoring malformed media stream message: {}", e),
        }
    }

    pub fn handle(&mut self, message: StreamMessage) {
        match message {
            StreamMessage::Connected { protocol, version } => {
                info!(
                    "Media stream connected (protocol {}, version {})",
                    protocol.as_deref().unwrap_or("unknown"),
                    version.as_deref().unwrap_or("unknown")
                );
            }
            StreamMessage::Start { start, .. } => self.start(start),
            StreamMessage::Media { media, .. } => self.media(media),
            StreamMessage::Stop { stop, .. } => {
                info!("Call ended: {} (account {})", stop.call_sid, stop.account_sid);
                self.end();
            }
            other => debug!("Ignoring {} event", other.kind()),
        }
    }

    pub fn start(&mut self, metadata: StartMetadata) {
        if self.state != CallState::AwaitingStart {
            warn!(
                "Ignoring start for call {} while {:?}",
                metadata.call_sid, self.state
            );
            return;
        }

        info!(
            "Call started: {} (stream {}, tracks {:?})",
            metadata.call_sid, metadata.stream_sid, metadata.tracks
        );

        let expected = &self.settings.streaming.config;
        let format = &metadata.media_format;
        if !expected.encoding.matches_mime(&format.encoding)
            || format.sample_rate != expected.sample_rate_hertz
        {
            warn!(
                "Call {} streams {} at {}Hz but recognition is configured for {:?} at {}Hz",
                metadata.call_sid,
                format.encoding,
                format.sample_rate,
                expected.encoding,
                expected.sample_rate_hertz
            );
        }

        self.metadata = Some(metadata);
        self.state = CallState::Active;
    }

    pub fn media(&mut self, media: MediaPayload) {
        if self.state != CallState::Active {
            debug!(
                "Dropping audio for track {} while {:?}",
                media.track, self.state
            );
            self.frames_dropped += 1;
            return;
        }

        match self.registry.session(&media.track) {
            Some(session) => session.send_payload(&media.payload),
            None => self.frames_dropped += 1,
        }
    }

    /// End the call and close every track's session. Safe to call repeatedly.
    pub fn end(&mut self) {
        if self.state == CallState::Ended {
            return;
        }
        self.state = CallState::Ended;

        let torn_down = self.registry.close_all();

        for track in self.registry.tracks() {
            if let Some(session) = self.registry.get(&track) {
                let stats = session.stats();
                info!(
                    "Track {}: {} chunks forwarded, {} dropped, {} streams opened, {} renewals",
                    track,
                    stats.chunks_forwarded,
                    stats.chunks_dropped,
                    stats.connections_opened,
                    stats.renewals
                );
            }
        }

        info!(
            "Call {} closed ({} tracks, {} live streams torn down)",
            self.call_sid().unwrap_or("<not started>"),
            self.registry.len(),
            torn_down
        );
    }

    pub fn state(&self) -> CallState {
        self.state
    }

    pub fn metadata(&self) -> Option<&StartMetadata> {
        self.metadata.as_ref()
    }

    pub fn call_sid(&self) -> Option<&str> {
        self.metadata.as_ref().map(|m| m.call_sid.as_str())
    }

    pub fn registry(&self) -> &TrackRegistry {
        &self.registry
    }

    pub fn frames_dropped(&self) -> usize {
        self.frames_dropped
    }
}

impl Drop for CallHandler {
    fn drop(&mut self) {
        self.end();
    }
}
