use super::state::AppState;
use crate::call::{CallEvent, CallHandler};
use crate::config::TwimlConfig;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::{header, StatusCode},
    response::IntoResponse,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

// ============================================================================
// Call setup
// ============================================================================

/// POST /twiml
/// Serve the media stream instructions, falling back to an inline document
pub async fn twiml(State(state): State<AppState>) -> impl IntoResponse {
    info!("POST TwiML");

    let twiml = &state.config.twiml;
    let body = match tokio::fs::read_to_string(&twiml.template_path).await {
        Ok(body) => body,
        Err(e) => {
            info!(
                "Template file {} not available ({}), using inline TwiML",
                twiml.template_path, e
            );
            inline_twiml(twiml)
        }
    };

    (StatusCode::OK, [(header::CONTENT_TYPE, "text/xml")], body)
}

/// Fallback document pointing the provider at our media stream endpoint
pub fn inline_twiml(twiml: &TwimlConfig) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<Response>
  <Start>
    <Stream url="{}"></Stream>
  </Start>
  <Pause length="{}"/>
</Response>"#,
        twiml.stream_url, twiml.pause_secs
    )
}

// ============================================================================
// Media streams
// ============================================================================

/// GET / (WebSocket upgrade)
pub async fn media_stream(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_media_socket(socket, state))
}

async fn handle_media_socket(mut socket: WebSocket, state: AppState) {
    let connection_id = Uuid::new_v4();
    info!("Media WS: Connection accepted ({})", connection_id);

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let consumer = tokio::spawn(log_call_events(events_rx));

    let mut handler = CallHandler::new(
        state.config.speech.settings(),
        Arc::clone(&state.backend),
        events_tx,
    );

    while let Some(message) = socket.recv().await {
        match message {
            Ok(Message::Text(text)) => handler.handle_text(&text),
            Ok(Message::Binary(_)) => {
                info!("Media WS: binary message received (not supported)");
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                warn!("Media WS ({}): receive failed: {}", connection_id, e);
                break;
            }
        }
    }

    info!("Media WS: closed ({})", connection_id);

    // Dropping the handler releases the last event senders, ending the consumer
    handler.end();
    drop(handler);

    if let Err(e) = consumer.await {
        error!("Call event consumer for {} failed: {}", connection_id, e);
    }
}

/// Log every event of a call until all of its sessions are gone
pub async fn log_call_events(mut events: mpsc::UnboundedReceiver<CallEvent>) -> usize {
    let mut transcripts = 0;

    while let Some(event) = events.recv().await {
        match event {
            CallEvent::Transcription(fragment) => {
                transcripts += 1;
                info!(
                    "Transcription ({}{}): {}",
                    fragment.track,
                    if fragment.is_final { "" } else { ", interim" },
                    fragment.text
                );
            }
            CallEvent::Error { track, error } => {
                warn!("Transcription Error ({}): {}", track, error);
            }
        }
    }

    transcripts
}

// ============================================================================
// Health
// ============================================================================

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
