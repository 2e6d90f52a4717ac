use super::events::{CallEvent, TrackObserver};
use crate::recognition::{RecognitionBackend, RecognitionSession, RecognitionSettings};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;

/// One recognition session per track of a call
///
/// Sessions are created on first use and live until `close_all`; tracks are
/// never torn down individually.
pub struct TrackRegistry {
    settings: RecognitionSettings,
    backend: Arc<dyn RecognitionBackend>,
    events: mpsc::UnboundedSender<CallEvent>,
    /// Active sessions (track → session)
    sessions: HashMap<String, RecognitionSession>,
    closed: bool,
}

impl TrackRegistry {
    pub fn new(
        settings: RecognitionSettings,
        backend: Arc<dyn RecognitionBackend>,
        events: mpsc::UnboundedSender<CallEvent>,
    ) -> Self {
        Self {
            settings,
            backend,
            events,
            sessions: HashMap::new(),
            closed: false,
        }
    }

    /// Session for `track`, created on first sight.
    ///
    /// Returns `None` once the registry has been closed.
    pub fn session(&mut self, track: &str) -> Option<&mut RecognitionSession> {
        if self.closed {
            return None;
        }

        if !self.sessions.contains_key(track) {
            info!("Creating recognition session for track {}", track);

            let observer = Arc::new(TrackObserver::new(track, self.events.clone()));
            let session = RecognitionSession::new(
                track,
                self.settings.clone(),
                Arc::clone(&self.backend),
                observer,
            );
            self.sessions.insert(track.to_string(), session);
        }

        self.sessions.get_mut(track)
    }

    /// Existing session for `track`, without creating one
    pub fn get(&self, track: &str) -> Option<&RecognitionSession> {
        self.sessions.get(track)
    }

    /// Close every session. Each one is closed regardless of how the others
    /// fare; returns how many had a live stream to tear down.
    pub fn close_all(&mut self) -> usize {
        self.closed = true;

        let mut torn_down = 0;
        for (track, session) in self.sessions.iter_mut() {
            info!("Closing {} handler", track);
            if session.close() {
                torn_down += 1;
            }
        }
        torn_down
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Track names, sorted
    pub fn tracks(&self) -> Vec<String> {
        let mut tracks: Vec<String> = self.sessions.keys().cloned().collect();
        tracks.sort();
        tracks
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
