//! Streaming speech recognition
//!
//! A `RecognitionSession` keeps one backend stream warm for a single audio
//! track and transparently replaces it when it ages out or fails. Backends
//! are pluggable through the `RecognitionBackend` trait; the production
//! implementation talks to a WebSocket speech gateway.

mod backend;
mod error;
mod messages;
mod session;
mod websocket;

pub use backend::{BackendConnection, BackendEvent, RecognitionBackend, SessionObserver};
pub use error::RecognitionError;
pub use messages::{
    AudioEncoding, RecognitionConfig, SpeechRecognitionAlternative, Status, StreamingConfig,
    StreamingRecognitionResult, StreamingRecognizeResponse, TopTranscript,
};
pub use session::{RecognitionSession, RecognitionSettings, SessionStats};
pub use websocket::WsRecognitionBackend;
