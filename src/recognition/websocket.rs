use super::backend::{BackendConnection, BackendEvent, RecognitionBackend};
use super::error::RecognitionError;
use super::messages::{StreamingConfig, StreamingRecognizeResponse};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

/// Audio chunks buffered per stream before writes apply backpressure
const AUDIO_BUFFER: usize = 256;
const EVENT_BUFFER: usize = 64;

/// Streaming recognition over a WebSocket speech gateway
///
/// Protocol: the first text frame carries the `StreamingConfig`, audio
/// follows as binary frames, results come back as JSON text frames shaped
/// like `StreamingRecognizeResponse`.
pub struct WsRecognitionBackend {
    url: String,
}

impl WsRecognitionBackend {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait::async_trait]
impl RecognitionBackend for WsRecognitionBackend {
    async fn open(&self, config: &StreamingConfig) -> Result<BackendConnection, RecognitionError> {
        let (socket, _) = connect_async(self.url.as_str())
            .await
            .map_err(|e| RecognitionError::Open(format!("{}: {}", self.url, e)))?;

        info!("Connected to speech gateway at {}", self.url);

        let (mut sink, mut stream) = socket.split();

        let request = serde_json::to_string(config)
            .map_err(|e| RecognitionError::Open(format!("invalid streaming config: {}", e)))?;
        sink.send(Message::Text(request))
            .await
            .map_err(|e| RecognitionError::Open(format!("failed to send streaming config: {}", e)))?;

        let (audio_tx, mut audio_rx) = mpsc::channel::<Vec<u8>>(AUDIO_BUFFER);
        let (event_tx, event_rx) = mpsc::channel(EVENT_BUFFER);

        // Writer: audio out, close frame once the session lets go
        tokio::spawn(async move {
            while let Some(chunk) = audio_rx.recv().await {
                if let Err(e) = sink.send(Message::Binary(chunk)).await {
                    debug!("Speech gateway write failed: {}", e);
                    return;
                }
            }

            if let Err(e) = sink.send(Message::Close(None)).await {
                debug!("Failed to close speech gateway stream: {}", e);
            }
        });

        // Reader: frames in, events out
        tokio::spawn(async move {
            while let Some(frame) = stream.next().await {
                let event = match frame {
                    Ok(Message::Text(text)) => parse_response(&text),
                    Ok(Message::Close(_)) => BackendEvent::End,
                    Ok(_) => continue,
                    Err(e) => BackendEvent::Error(RecognitionError::Backend(e.to_string())),
                };

                let last = !matches!(event, BackendEvent::Data(_));
                if event_tx.send(event).await.is_err() || last {
                    return;
                }
            }

            // Receiver may already be gone; nothing left to report to
            let _ = event_tx.send(BackendEvent::Close).await;
        });

        Ok(BackendConnection {
            audio: audio_tx,
            events: event_rx,
        })
    }

    fn name(&self) -> &str {
        "websocket"
    }
}

fn parse_response(text: &str) -> BackendEvent {
    match serde_json::from_str::<StreamingRecognizeResponse>(text) {
        Ok(StreamingRecognizeResponse {
            error: Some(status), ..
        }) => BackendEvent::Error(RecognitionError::Backend(format!(
            "{} (code {})",
            status.message, status.code
        ))),
        Ok(response) => BackendEvent::Data(response),
        Err(e) => {
            warn!("Unparseable speech gateway message: {}", e);
            BackendEvent::Error(RecognitionError::Protocol(e.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_result_frame() {
        let event = parse_response(r#"{"results":[{"alternatives":[{"transcript":"hi"}]}]}"#);

        match event {
            BackendEvent::Data(response) => {
                assert_eq!(response.top_transcript().unwrap().text, "hi");
            }
            other => panic!("expected data, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_error_frame() {
        let event = parse_response(r#"{"error":{"code":14,"message":"unavailable"}}"#);

        match event {
            BackendEvent::Error(RecognitionError::Backend(message)) => {
                assert!(message.contains("unavailable"));
                assert!(message.contains("14"));
            }
            other => panic!("expected backend error, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_garbage_frame() {
        let event = parse_response("not json");

        assert!(matches!(
            event,
            BackendEvent::Error(RecognitionError::Protocol(_))
        ));
    }

    #[tokio::test]
    async fn test_open_unreachable_gateway() {
        let backend = WsRecognitionBackend::new("ws://127.0.0.1:1/speech");
        let config = crate::recognition::RecognitionSettings::default().streaming;

        let result = backend.open(&config).await;

        assert!(matches!(result, Err(RecognitionError::Open(_))));
    }
}
