pub mod call;
pub mod config;
pub mod http;
pub mod recognition;

pub use call::{CallEvent, CallHandler, CallState, StreamMessage, TrackRegistry, TranscriptFragment};
pub use config::Config;
pub use http::{create_router, AppState};
pub use recognition::{
    BackendConnection, BackendEvent, RecognitionBackend, RecognitionError, RecognitionSession,
    RecognitionSettings, SessionObserver, SessionStats, StreamingConfig,
    StreamingRecognizeResponse, WsRecognitionBackend,
};
