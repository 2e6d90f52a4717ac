use super::backend::{BackendConnection, BackendEvent, RecognitionBackend, SessionObserver};
use super::error::RecognitionError;
use super::messages::{AudioEncoding, RecognitionConfig, StreamingConfig};
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Settings shared by every stream a session opens
#[derive(Debug, Clone)]
pub struct RecognitionSettings {
    /// Sent as the first message of each backend stream
    pub streaming: StreamingConfig,

    /// A stream older than this is replaced on the next write
    pub stream_timeout: Duration,

    /// Base delay before reopening after repeated failures
    pub reconnect_cooldown: Duration,

    /// Upper bound for the reopen delay
    pub max_reconnect_cooldown: Duration,
}

impl Default for RecognitionSettings {
    fn default() -> Self {
        Self {
            streaming: StreamingConfig {
                config: RecognitionConfig {
                    encoding: AudioEncoding::Mulaw,
                    sample_rate_hertz: 8000, // Telephony audio
                    language_code: "en-US".to_string(),
                },
                interim_results: true,
            },
            stream_timeout: Duration::from_secs(60),
            reconnect_cooldown: Duration::from_secs(1),
            max_reconnect_cooldown: Duration::from_secs(30),
        }
    }
}

/// Chunks buffered between `send` and the stream task
const AUDIO_QUEUE: usize = 64;

/// Counters for one recognition session
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStats {
    /// Backend streams started, including the first one
    pub connections_opened: usize,

    /// Streams replaced because they aged out or broke
    pub renewals: usize,

    /// Chunks accepted by a backend stream
    pub chunks_forwarded: usize,

    /// Chunks discarded (no usable stream, backend backed up or broken,
    /// bad payload, session closed)
    pub chunks_dropped: usize,

    /// Whether `close` has been called
    pub closed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RenewReason {
    Absent,
    Destroyed,
    Expired,
}

const OPENING: u8 = 0;
const OPEN: u8 = 1;
const DESTROYED: u8 = 2;

/// Lifecycle of one backend stream, shared between the session and the
/// task driving the stream.
struct ConnectionState {
    phase: AtomicU8,
    failed: AtomicBool,
    produced_results: AtomicBool,
    destroyed_at: Mutex<Option<Instant>>,
}

impl ConnectionState {
    fn new() -> Self {
        Self {
            phase: AtomicU8::new(OPENING),
            failed: AtomicBool::new(false),
            produced_results: AtomicBool::new(false),
            destroyed_at: Mutex::new(None),
        }
    }

    fn mark_open(&self) -> bool {
        self.phase
            .compare_exchange(OPENING, OPEN, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Move to DESTROYED. Only the first caller gets `true`.
    fn destroy(&self, failed: bool) -> bool {
        if self.phase.load(Ordering::SeqCst) == DESTROYED {
            return false;
        }

        if failed {
            self.failed.store(true, Ordering::SeqCst);
        }
        *self
            .destroyed_at
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Instant::now());

        self.phase.swap(DESTROYED, Ordering::SeqCst) != DESTROYED
    }

    fn is_opening(&self) -> bool {
        self.phase.load(Ordering::SeqCst) == OPENING
    }

    fn is_destroyed(&self) -> bool {
        self.phase.load(Ordering::SeqCst) == DESTROYED
    }

    fn record_result(&self) {
        self.produced_results.store(true, Ordering::SeqCst);
    }

    /// Failed before the backend ever produced a result
    fn failed_unproductive(&self) -> bool {
        self.failed.load(Ordering::SeqCst) && !self.produced_results.load(Ordering::SeqCst)
    }

    fn destroyed_at(&self) -> Option<Instant> {
        *self
            .destroyed_at
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Chunk accounting shared by a session and its stream tasks
#[derive(Debug, Default)]
struct ChunkCounters {
    forwarded: AtomicUsize,
    dropped: AtomicUsize,
}

impl ChunkCounters {
    fn forwarded(&self) {
        self.forwarded.fetch_add(1, Ordering::SeqCst);
    }

    fn dropped(&self, count: usize) {
        self.dropped.fetch_add(count, Ordering::SeqCst);
    }
}

/// Receiving end of a stream's local audio queue.
///
/// Chunks still queued when it goes away (failed open, backend end, abort)
/// are counted as dropped.
struct AudioQueue {
    rx: mpsc::Receiver<Vec<u8>>,
    counters: Arc<ChunkCounters>,
}

impl AudioQueue {
    async fn recv(&mut self) -> Option<Vec<u8>> {
        self.rx.recv().await
    }
}

impl Drop for AudioQueue {
    fn drop(&mut self) {
        self.rx.close();

        let mut stranded = 0;
        while self.rx.try_recv().is_ok() {
            stranded += 1;
        }
        if stranded > 0 {
            self.counters.dropped(stranded);
        }
    }
}

struct Connection {
    number: usize,
    created_at: Instant,
    state: Arc<ConnectionState>,
    audio: mpsc::Sender<Vec<u8>>,
    task: JoinHandle<()>,
}

/// Keeps a streaming recognition session warm for one audio track
///
/// Streams are opened lazily on the first write and replaced when they
/// exceed `stream_timeout` or the backend reports an error, end or close.
/// Writes never wait on the backend. Each stream buffers at most a few
/// chunks locally; anything the backend cannot take right away is dropped,
/// never queued for retry.
pub struct RecognitionSession {
    /// Used in log lines (the track name)
    label: String,
    settings: RecognitionSettings,
    backend: Arc<dyn RecognitionBackend>,
    observer: Arc<dyn SessionObserver>,
    connection: Option<Connection>,
    /// Replaced streams still flushing their local queue
    draining: Vec<JoinHandle<()>>,
    counters: Arc<ChunkCounters>,
    /// Consecutive streams that failed without producing a result
    failure_streak: u32,
    closed: bool,
    stats: SessionStats,
}

impl RecognitionSession {
    pub fn new(
        label: impl Into<String>,
        settings: RecognitionSettings,
        backend: Arc<dyn RecognitionBackend>,
        observer: Arc<dyn SessionObserver>,
    ) -> Self {
        Self {
            label: label.into(),
            settings,
            backend,
            observer,
            connection: None,
            draining: Vec::new(),
            counters: Arc::new(ChunkCounters::default()),
            failure_streak: 0,
            closed: false,
            stats: SessionStats::default(),
        }
    }

    /// Decode a base64 media payload and send it
    pub fn send_payload(&mut self, payload: &str) {
        match base64::engine::general_purpose::STANDARD.decode(payload) {
            Ok(audio) => self.send(audio),
            Err(e) => {
                warn!("Dropping undecodable audio payload for {}: {}", self.label, e);
                self.counters.dropped(1);
                self.observer.on_error(&RecognitionError::from(e));
            }
        }
    }

    /// Forward raw audio, opening or renewing the backend stream first if needed
    pub fn send(&mut self, audio: Vec<u8>) {
        let queued = match self.current_connection() {
            Some(connection) => match connection.audio.try_send(audio) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    debug!("Audio queue full for {}, skipping audio chunk", self.label);
                    false
                }
                Err(TrySendError::Closed(_)) => false,
            },
            None => {
                debug!("Stream not ready for {}, skipping audio chunk", self.label);
                false
            }
        };

        if !queued {
            self.counters.dropped(1);
        }
    }

    /// Tear down the current stream and stop accepting audio.
    ///
    /// Returns whether a stream was actually torn down; calling it again is a no-op.
    pub fn close(&mut self) -> bool {
        self.closed = true;
        self.stats.closed = true;

        for task in self.draining.drain(..) {
            task.abort();
        }

        match self.connection.take() {
            Some(connection) => {
                connection.state.destroy(false);
                connection.task.abort();
                info!(
                    "Closed recognition stream #{} for {}",
                    connection.number, self.label
                );
                true
            }
            None => false,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            chunks_forwarded: self.counters.forwarded.load(Ordering::SeqCst),
            chunks_dropped: self.counters.dropped.load(Ordering::SeqCst),
            ..self.stats.clone()
        }
    }

    fn current_connection(&mut self) -> Option<&Connection> {
        if self.closed {
            return None;
        }

        if let Some(reason) = self.renewal_reason() {
            if let Some(remaining) = self.cooldown_remaining() {
                debug!(
                    "Recognition backend for {} still cooling down ({:.1}s left)",
                    self.label,
                    remaining.as_secs_f64()
                );
                return None;
            }
            self.renew(reason);
        }

        self.connection.as_ref()
    }

    fn renewal_reason(&self) -> Option<RenewReason> {
        match &self.connection {
            None => Some(RenewReason::Absent),
            Some(c) if c.state.is_destroyed() => Some(RenewReason::Destroyed),
            Some(c) if c.created_at.elapsed() > self.settings.stream_timeout => {
                Some(RenewReason::Expired)
            }
            Some(_) => None,
        }
    }

    /// Failure streak including the current stream
    fn pending_streak(&self) -> u32 {
        match &self.connection {
            Some(c) if c.state.failed_unproductive() => self.failure_streak + 1,
            _ => 0,
        }
    }

    fn cooldown_remaining(&self) -> Option<Duration> {
        let backoff = reconnect_backoff(
            self.pending_streak(),
            self.settings.reconnect_cooldown,
            self.settings.max_reconnect_cooldown,
        )?;
        let destroyed_at = self.connection.as_ref()?.state.destroyed_at()?;

        let ready_at = destroyed_at + backoff;
        let now = Instant::now();
        (now < ready_at).then(|| ready_at - now)
    }

    fn renew(&mut self, reason: RenewReason) {
        self.failure_streak = self.pending_streak();

        if let Some(old) = self.connection.take() {
            info!(
                "Renewing recognition stream #{} for {} ({:?}, age {:.1}s)",
                old.number,
                self.label,
                reason,
                old.created_at.elapsed().as_secs_f64()
            );
            if old.state.is_opening() {
                debug!(
                    "Abandoning recognition stream #{} for {}, still opening",
                    old.number, self.label
                );
                old.task.abort();
            } else {
                // Dropping the sender lets the old stream flush its local
                // queue and then shut down on its own.
                drop(old.audio);
                self.draining.push(old.task);
            }
            self.stats.renewals += 1;
        }

        self.draining.retain(|task| !task.is_finished());
        self.open_connection();
    }

    fn open_connection(&mut self) {
        let number = self.stats.connections_opened + 1;
        let state = Arc::new(ConnectionState::new());
        let (audio_tx, audio_rx) = mpsc::channel(AUDIO_QUEUE);
        let queue = AudioQueue {
            rx: audio_rx,
            counters: Arc::clone(&self.counters),
        };

        info!(
            "Opening recognition stream #{} for {} via {}",
            number,
            self.label,
            self.backend.name()
        );

        let task = ConnectionTask {
            number,
            label: self.label.clone(),
            backend: Arc::clone(&self.backend),
            config: self.settings.streaming.clone(),
            state: Arc::clone(&state),
            observer: Arc::clone(&self.observer),
            counters: Arc::clone(&self.counters),
        };

        self.stats.connections_opened = number;
        self.connection = Some(Connection {
            number,
            created_at: Instant::now(),
            state,
            audio: audio_tx,
            task: tokio::spawn(task.run(queue)),
        });
    }
}

impl Drop for RecognitionSession {
    fn drop(&mut self) {
        for task in self.draining.drain(..) {
            task.abort();
        }
        if let Some(connection) = self.connection.take() {
            connection.task.abort();
        }
    }
}

/// Delay before reopening after `streak` consecutive unproductive failures.
///
/// A single failure reopens immediately; from the second one on the delay
/// doubles per failure, capped at `max`.
fn reconnect_backoff(streak: u32, base: Duration, max: Duration) -> Option<Duration> {
    if streak < 2 {
        return None;
    }

    let exponent = (streak - 2).min(16);
    Some(base.saturating_mul(1u32 << exponent).min(max))
}

/// Drives one backend stream: opens it, pumps audio in, delivers events out
struct ConnectionTask {
    number: usize,
    label: String,
    backend: Arc<dyn RecognitionBackend>,
    config: StreamingConfig,
    state: Arc<ConnectionState>,
    observer: Arc<dyn SessionObserver>,
    counters: Arc<ChunkCounters>,
}

impl ConnectionTask {
    async fn run(self, mut queue: AudioQueue) {
        let connection = match self.backend.open(&self.config).await {
            Ok(connection) => connection,
            Err(e) => {
                error!(
                    "Failed to open recognition stream #{} for {}: {}",
                    self.number, self.label, e
                );
                if self.state.destroy(true) {
                    self.observer.on_error(&e);
                }
                return;
            }
        };

        if !self.state.mark_open() {
            return;
        }

        let BackendConnection { audio, mut events } = connection;

        loop {
            tokio::select! {
                chunk = queue.recv() => match chunk {
                    Some(chunk) => {
                        if !self.forward(&audio, chunk) {
                            break;
                        }
                    }
                    None => {
                        debug!("Recognition stream #{} for {} released", self.number, self.label);
                        break;
                    }
                },
                event = events.recv() => {
                    if !self.handle_event(event) {
                        break;
                    }
                }
            }
        }
    }

    /// Hand one chunk to the backend without waiting on it.
    ///
    /// Returns `false` once the backend stopped accepting audio.
    fn forward(&self, audio: &mpsc::Sender<Vec<u8>>, chunk: Vec<u8>) -> bool {
        match audio.try_send(chunk) {
            Ok(()) => {
                self.counters.forwarded();
                true
            }
            Err(TrySendError::Full(_)) => {
                debug!(
                    "Recognition stream #{} for {} is backed up, skipping audio chunk",
                    self.number, self.label
                );
                self.counters.dropped(1);
                true
            }
            Err(TrySendError::Closed(_)) => {
                self.counters.dropped(1);
                error!(
                    "Recognition stream #{} for {} stopped accepting audio",
                    self.number, self.label
                );
                if self.state.destroy(true) {
                    self.observer.on_error(&RecognitionError::Backend(
                        "stream stopped accepting audio".to_string(),
                    ));
                }
                false
            }
        }
    }

    /// Returns `false` once the stream is finished
    fn handle_event(&self, event: Option<BackendEvent>) -> bool {
        match event {
            Some(BackendEvent::Data(response)) => {
                // Empty batches (keep-alives) do not count as progress
                if let Some(top) = response.top_transcript() {
                    self.state.record_result();
                    self.observer.on_transcription(&top.text, top.is_final);
                }
                true
            }
            Some(BackendEvent::Error(e)) => {
                error!(
                    "Speech recognition error on stream #{} for {}: {}",
                    self.number, self.label, e
                );
                if self.state.destroy(true) {
                    self.observer.on_error(&e);
                }
                false
            }
            Some(BackendEvent::End) => {
                info!(
                    "Speech recognition stream #{} for {} ended",
                    self.number, self.label
                );
                self.state.destroy(false);
                false
            }
            Some(BackendEvent::Close) | None => {
                info!(
                    "Speech recognition stream #{} for {} closed",
                    self.number, self.label
                );
                self.state.destroy(false);
                false
            }
        }
    }
}
