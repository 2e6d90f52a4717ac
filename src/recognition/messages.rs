use serde::{Deserialize, Serialize};

/// Audio encoding of the stream sent to the recognizer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AudioEncoding {
    /// 8-bit G.711 mu-law, what telephony media streams carry
    Mulaw,
    /// 16-bit signed little-endian PCM
    Linear16,
    Alaw,
}

impl AudioEncoding {
    /// Name used by media-stream envelopes (`audio/x-mulaw` etc.)
    pub fn matches_mime(&self, mime: &str) -> bool {
        let mime = mime.to_ascii_lowercase();
        match self {
            AudioEncoding::Mulaw => mime.contains("mulaw") || mime.contains("pcmu"),
            AudioEncoding::Linear16 => mime.contains("l16") || mime.contains("linear16"),
            AudioEncoding::Alaw => mime.contains("alaw") || mime.contains("pcma"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecognitionConfig {
    pub encoding: AudioEncoding,
    pub sample_rate_hertz: u32,
    pub language_code: String,
}

/// First message of every backend stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamingConfig {
    pub config: RecognitionConfig,
    pub interim_results: bool,
}

/// One result batch produced by the backend
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamingRecognizeResponse {
    #[serde(default)]
    pub results: Vec<StreamingRecognitionResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Status>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamingRecognitionResult {
    #[serde(default)]
    pub alternatives: Vec<SpeechRecognitionAlternative>,
    #[serde(default)]
    pub is_final: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stability: Option<f32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpeechRecognitionAlternative {
    #[serde(default)]
    pub transcript: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
}

/// Error status embedded in a response
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Status {
    #[serde(default)]
    pub code: i32,
    #[serde(default)]
    pub message: String,
}

/// Transcript picked from a result batch
#[derive(Debug, Clone, PartialEq)]
pub struct TopTranscript {
    pub text: String,
    pub is_final: bool,
}

impl StreamingRecognizeResponse {
    /// Text of the first alternative of the first result, trimmed.
    ///
    /// Later results and alternatives are never inspected, so a batch whose
    /// first alternative is blank yields nothing.
    pub fn top_transcript(&self) -> Option<TopTranscript> {
        let result = self.results.first()?;
        let alternative = result.alternatives.first()?;
        let text = alternative.transcript.trim();

        if text.is_empty() {
            return None;
        }

        Some(TopTranscript {
            text: text.to_string(),
            is_final: result.is_final,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(json: &str) -> StreamingRecognizeResponse {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_streaming_config_wire_shape() {
        let config = StreamingConfig {
            config: RecognitionConfig {
                encoding: AudioEncoding::Mulaw,
                sample_rate_hertz: 8000,
                language_code: "en-US".to_string(),
            },
            interim_results: true,
        };

        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "config": {
                    "encoding": "MULAW",
                    "sampleRateHertz": 8000,
                    "languageCode": "en-US"
                },
                "interimResults": true
            })
        );
    }

    #[test]
    fn test_top_transcript_trims_text() {
        let r = response(
            r#"{"results":[{"alternatives":[{"transcript":"  hello world ","confidence":0.92}],"isFinal":true}]}"#,
        );

        let top = r.top_transcript().unwrap();
        assert_eq!(top.text, "hello world");
        assert!(top.is_final);
    }

    #[test]
    fn test_top_transcript_interim_result() {
        let r = response(r#"{"results":[{"alternatives":[{"transcript":"hel"}],"stability":0.1}]}"#);

        let top = r.top_transcript().unwrap();
        assert_eq!(top.text, "hel");
        assert!(!top.is_final);
    }

    #[test]
    fn test_top_transcript_skips_blank() {
        assert!(response(r#"{"results":[{"alternatives":[{"transcript":"   "}]}]}"#)
            .top_transcript()
            .is_none());
        assert!(response(r#"{"results":[{"alternatives":[{"transcript":""}]}]}"#)
            .top_transcript()
            .is_none());
    }

    #[test]
    fn test_top_transcript_without_alternatives() {
        assert!(response(r#"{"results":[{"alternatives":[]}]}"#)
            .top_transcript()
            .is_none());
        assert!(response(r#"{"results":[]}"#).top_transcript().is_none());
        assert!(response(r#"{}"#).top_transcript().is_none());
    }

    #[test]
    fn test_only_first_alternative_is_inspected() {
        let r = response(
            r#"{"results":[{"alternatives":[{"transcript":""},{"transcript":"second guess"}]}]}"#,
        );
        assert!(r.top_transcript().is_none());
    }

    #[test]
    fn test_only_first_result_is_inspected() {
        let r = response(
            r#"{"results":[{"alternatives":[{"transcript":"first"}]},{"alternatives":[{"transcript":"second"}]}]}"#,
        );
        assert_eq!(r.top_transcript().unwrap().text, "first");
    }

    #[test]
    fn test_error_status() {
        let r = response(r#"{"error":{"code":11,"message":"Exceeded maximum allowed stream duration"}}"#);
        let status = r.error.unwrap();
        assert_eq!(status.code, 11);
        assert!(status.message.contains("maximum"));
    }

    #[test]
    fn test_encoding_matches_mime() {
        assert!(AudioEncoding::Mulaw.matches_mime("audio/x-mulaw"));
        assert!(!AudioEncoding::Mulaw.matches_mime("audio/l16"));
        assert!(AudioEncoding::Linear16.matches_mime("audio/L16"));
    }
}
