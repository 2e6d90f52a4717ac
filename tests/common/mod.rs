// Shared test doubles: an in-memory recognition backend and an observer
// that records everything a session reports.

#![allow(dead_code)]

use call_transcriber::recognition::{
    BackendConnection, BackendEvent, RecognitionBackend, RecognitionError, RecognitionSettings,
    SessionObserver, SpeechRecognitionAlternative, StreamingConfig, StreamingRecognitionResult,
    StreamingRecognizeResponse,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// Test side of one opened stream
pub struct MockStream {
    pub config: StreamingConfig,
    pub audio: mpsc::Receiver<Vec<u8>>,
    pub events: mpsc::Sender<BackendEvent>,
}

/// Backend whose streams are driven by the test
#[derive(Default)]
pub struct MockBackend {
    attempts: AtomicUsize,
    failures: AtomicUsize,
    streams: Mutex<Vec<MockStream>>,
}

impl MockBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make the next `n` calls to `open` fail
    pub fn fail_next_opens(&self, n: usize) {
        self.failures.store(n, Ordering::SeqCst);
    }

    /// Calls to `open`, failed ones included
    pub fn open_attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Streams that opened successfully
    pub fn stream_count(&self) -> usize {
        self.streams.lock().unwrap().len()
    }

    pub fn config(&self, index: usize) -> StreamingConfig {
        self.streams.lock().unwrap()[index].config.clone()
    }

    /// Audio received so far by stream `index`
    pub fn drain_audio(&self, index: usize) -> Vec<Vec<u8>> {
        let mut streams = self.streams.lock().unwrap();
        let mut chunks = Vec::new();
        while let Ok(chunk) = streams[index].audio.try_recv() {
            chunks.push(chunk);
        }
        chunks
    }

    pub fn emit(&self, index: usize, event: BackendEvent) {
        let streams = self.streams.lock().unwrap();
        streams[index]
            .events
            .try_send(event)
            .expect("stream event buffer full or closed");
    }

    /// Whether the session side of stream `index` has been torn down
    pub fn is_released(&self, index: usize) -> bool {
        self.streams.lock().unwrap()[index].events.is_closed()
    }
}

#[async_trait::async_trait]
impl RecognitionBackend for MockBackend {
    async fn open(&self, config: &StreamingConfig) -> Result<BackendConnection, RecognitionError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        let fail = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if fail {
            return Err(RecognitionError::Open("mock backend unavailable".to_string()));
        }

        let (audio_tx, audio_rx) = mpsc::channel(1024);
        let (event_tx, event_rx) = mpsc::channel(64);

        self.streams.lock().unwrap().push(MockStream {
            config: config.clone(),
            audio: audio_rx,
            events: event_tx,
        });

        Ok(BackendConnection {
            audio: audio_tx,
            events: event_rx,
        })
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// Backend whose streams open fine but never take audio off their channel
pub struct UnresponsiveBackend {
    /// `None` drops the audio receiver as soon as a stream opens
    audio_capacity: Option<usize>,
    attempts: AtomicUsize,
    held: Mutex<Vec<(Option<mpsc::Receiver<Vec<u8>>>, mpsc::Sender<BackendEvent>)>>,
}

impl UnresponsiveBackend {
    /// Streams whose audio side is gone the moment they open
    pub fn broken() -> Arc<Self> {
        Arc::new(Self {
            audio_capacity: None,
            attempts: AtomicUsize::new(0),
            held: Mutex::new(Vec::new()),
        })
    }

    /// Streams that buffer `capacity` chunks and never read them
    pub fn stalled(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            audio_capacity: Some(capacity),
            attempts: AtomicUsize::new(0),
            held: Mutex::new(Vec::new()),
        })
    }

    pub fn open_attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn emit(&self, index: usize, event: BackendEvent) {
        let held = self.held.lock().unwrap();
        held[index]
            .1
            .try_send(event)
            .expect("stream event buffer full or closed");
    }
}

#[async_trait::async_trait]
impl RecognitionBackend for UnresponsiveBackend {
    async fn open(&self, _config: &StreamingConfig) -> Result<BackendConnection, RecognitionError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        let (audio_tx, audio_rx) = mpsc::channel(self.audio_capacity.unwrap_or(1));
        let (event_tx, event_rx) = mpsc::channel(64);

        let audio_rx = self.audio_capacity.map(|_| audio_rx);
        self.held.lock().unwrap().push((audio_rx, event_tx));

        Ok(BackendConnection {
            audio: audio_tx,
            events: event_rx,
        })
    }

    fn name(&self) -> &str {
        "unresponsive"
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Observed {
    Transcription { text: String, is_final: bool },
    Error(RecognitionError),
}

#[derive(Default)]
pub struct RecordingObserver {
    seen: Mutex<Vec<Observed>>,
}

impl RecordingObserver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn seen(&self) -> Vec<Observed> {
        self.seen.lock().unwrap().clone()
    }

    pub fn transcripts(&self) -> Vec<String> {
        self.seen()
            .into_iter()
            .filter_map(|o| match o {
                Observed::Transcription { text, .. } => Some(text),
                Observed::Error(_) => None,
            })
            .collect()
    }

    pub fn errors(&self) -> Vec<RecognitionError> {
        self.seen()
            .into_iter()
            .filter_map(|o| match o {
                Observed::Error(e) => Some(e),
                Observed::Transcription { .. } => None,
            })
            .collect()
    }
}

impl SessionObserver for RecordingObserver {
    fn on_transcription(&self, text: &str, is_final: bool) {
        self.seen.lock().unwrap().push(Observed::Transcription {
            text: text.to_string(),
            is_final,
        });
    }

    fn on_error(&self, error: &RecognitionError) {
        self.seen.lock().unwrap().push(Observed::Error(error.clone()));
    }
}

pub fn settings(timeout_secs: u64) -> RecognitionSettings {
    RecognitionSettings {
        stream_timeout: Duration::from_secs(timeout_secs),
        reconnect_cooldown: Duration::from_secs(1),
        max_reconnect_cooldown: Duration::from_secs(30),
        ..RecognitionSettings::default()
    }
}

/// Result batch with the given alternatives for a single result
pub fn result(alternatives: &[&str], is_final: bool) -> BackendEvent {
    BackendEvent::Data(StreamingRecognizeResponse {
        results: vec![StreamingRecognitionResult {
            alternatives: alternatives
                .iter()
                .map(|t| SpeechRecognitionAlternative {
                    transcript: t.to_string(),
                    confidence: None,
                })
                .collect(),
            is_final,
            stability: None,
        }],
        error: None,
    })
}

/// Let spawned stream tasks catch up without moving the clock
pub async fn settle() {
    for _ in 0..50 {
        tokio::task::yield_now().await;
    }
}
