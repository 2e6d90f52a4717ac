use crate::recognition::{AudioEncoding, RecognitionConfig, RecognitionSettings, StreamingConfig};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::time::Duration;

/// Prefix for structured environment overrides, e.g. `CALL_TRANSCRIBER__SPEECH__LANGUAGE`
const ENV_PREFIX: &str = "CALL_TRANSCRIBER";

/// Flat variables understood by earlier deployments, mapped onto config keys
const LEGACY_ENV: &[(&str, &str)] = &[
    ("SERVER_HOST", "service.http.bind"),
    ("SERVER_PORT", "service.http.port"),
    ("SPEECH_STREAM_TIMEOUT", "speech.stream_timeout_secs"),
    ("SPEECH_SAMPLE_RATE", "speech.sample_rate"),
    ("SPEECH_LANGUAGE", "speech.language"),
];

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    pub speech: SpeechConfig,
    pub twiml: TwimlConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpeechConfig {
    /// Streaming endpoint of the speech gateway
    pub backend_url: String,
    pub encoding: AudioEncoding,
    pub sample_rate: u32,
    pub language: String,
    /// Maximum lifetime of one backend stream before it is renewed
    pub stream_timeout_secs: u64,
    pub reconnect_cooldown_ms: u64,
    pub max_reconnect_cooldown_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TwimlConfig {
    pub template_path: String,
    /// Stream URL used by the inline document when the template is missing
    pub stream_url: String,
    pub pause_secs: u32,
}

impl SpeechConfig {
    /// Per-session recognition settings derived from this section
    pub fn settings(&self) -> RecognitionSettings {
        RecognitionSettings {
            streaming: StreamingConfig {
                config: RecognitionConfig {
                    encoding: self.encoding,
                    sample_rate_hertz: self.sample_rate,
                    language_code: self.language.clone(),
                },
                interim_results: true,
            },
            stream_timeout: Duration::from_secs(self.stream_timeout_secs),
            reconnect_cooldown: Duration::from_millis(self.reconnect_cooldown_ms),
            max_reconnect_cooldown: Duration::from_millis(self.max_reconnect_cooldown_ms),
        }
    }
}

impl Config {
    /// Load configuration from defaults, an optional file at `path`
    /// (extension resolved by the `config` crate) and the environment.
    pub fn load(path: &str) -> Result<Self> {
        let legacy = LEGACY_ENV
            .iter()
            .map(|(var, key)| (*key, std::env::var(var).ok()));

        Self::build(
            path,
            Some(config::Environment::with_prefix(ENV_PREFIX).separator("__")),
            legacy,
        )
    }

    /// Defaults plus the optional file at `path`, ignoring the environment
    pub fn from_file(path: &str) -> Result<Self> {
        Self::build(path, None, std::iter::empty())
    }

    fn build<'a>(
        path: &str,
        env: Option<config::Environment>,
        overrides: impl Iterator<Item = (&'a str, Option<String>)>,
    ) -> Result<Self> {
        let mut builder =
            Self::defaults()?.add_source(config::File::with_name(path).required(false));
        if let Some(env) = env {
            builder = builder.add_source(env);
        }

        for (key, value) in overrides {
            builder = builder.set_override_option(key, value)?;
        }

        let settings = builder.build().context("Failed to build configuration")?;

        settings
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    fn defaults() -> Result<config::ConfigBuilder<config::builder::DefaultState>> {
        Ok(config::Config::builder()
            .set_default("service.name", "call-transcriber")?
            .set_default("service.http.bind", "localhost")?
            .set_default("service.http.port", 8080)?
            .set_default(
                "speech.backend_url",
                "ws://localhost:9090/v1/speech:streamingRecognize",
            )?
            .set_default("speech.encoding", "MULAW")?
            .set_default("speech.sample_rate", 8000)?
            .set_default("speech.language", "en-US")?
            .set_default("speech.stream_timeout_secs", 60)?
            .set_default("speech.reconnect_cooldown_ms", 1000)?
            .set_default("speech.max_reconnect_cooldown_ms", 30_000)?
            .set_default("twiml.template_path", "templates/streams.xml")?
            .set_default("twiml.stream_url", "wss://your-ngrok-url.ngrok.io/")?
            .set_default("twiml.pause_secs", 40)?)
    }
}
