use super::error::RecognitionError;
use super::messages::{StreamingConfig, StreamingRecognizeResponse};
use tokio::sync::mpsc;

/// Events delivered by an open backend stream, in the order it produced them
#[derive(Debug, Clone)]
pub enum BackendEvent {
    /// A result batch
    Data(StreamingRecognizeResponse),
    /// The stream failed; no further events follow
    Error(RecognitionError),
    /// The backend finished the stream gracefully
    End,
    /// The underlying transport went away
    Close,
}

/// One open backend stream
///
/// Audio written to `audio` is forwarded to the recognizer; results come
/// back on `events`. Dropping the connection tears the stream down.
pub struct BackendConnection {
    pub audio: mpsc::Sender<Vec<u8>>,
    pub events: mpsc::Receiver<BackendEvent>,
}

/// Speech recognition backend trait
///
/// Implementations hold configuration only; every call to `open` starts an
/// independent stream.
/// - WebSocket speech gateway (production)
/// - In-memory doubles (tests)
#[async_trait::async_trait]
pub trait RecognitionBackend: Send + Sync {
    /// Open a new stream configured by `config`
    async fn open(&self, config: &StreamingConfig) -> Result<BackendConnection, RecognitionError>;

    /// Get backend name for logging
    fn name(&self) -> &str;
}

/// Receives what a recognition session produces
///
/// Mostly called from the session's connection task, so implementations
/// must not block.
pub trait SessionObserver: Send + Sync {
    fn on_transcription(&self, text: &str, is_final: bool);

    fn on_error(&self, error: &RecognitionError);
}
