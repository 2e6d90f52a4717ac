//! HTTP surface for the telephony provider
//!
//! - POST /twiml - Media stream instructions for an incoming call
//! - GET / and GET /media - Media stream WebSocket, one call per connection
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use handlers::{inline_twiml, log_call_events};
pub use routes::create_router;
pub use state::AppState;
