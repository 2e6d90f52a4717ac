use thiserror::Error;

/// Failures reported by a recognition session to its observer
///
/// None of these are fatal: the session recovers on the next write.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RecognitionError {
    /// The backend could not be reached or rejected the stream
    #[error("failed to open recognition stream: {0}")]
    Open(String),

    /// A live stream reported an error
    #[error("recognition stream error: {0}")]
    Backend(String),

    /// The backend sent something we could not understand
    #[error("unexpected message from recognition backend: {0}")]
    Protocol(String),

    /// Incoming audio payload was not valid base64
    #[error("invalid audio payload: {0}")]
    Decode(#[from] base64::DecodeError),
}
