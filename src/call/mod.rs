//! Per-call processing
//!
//! A `CallHandler` owns everything belonging to one call: the call
//! lifecycle, and a `TrackRegistry` with one recognition session per audio
//! track. Results leave the call as `CallEvent`s tagged with their track.

mod events;
mod handler;
mod messages;
mod registry;

pub use events::{CallEvent, TrackObserver, TranscriptFragment};
pub use handler::{CallHandler, CallState};
pub use messages::{MediaFormat, MediaPayload, StartMetadata, StopMetadata, StreamMessage};
pub use registry::TrackRegistry;
