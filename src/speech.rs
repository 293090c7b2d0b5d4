//! Speech synthesis for assistant replies.
//!
//! Synthesis is best-effort: a reply is never lost because the voice vendor
//! is down. The chat service calls `synthesize_or_skip`, which logs failures
//! and returns `None` so the turn persists with a null audio reference.

use std::path::{Path, PathBuf};

use futures_util::future::BoxFuture;
use serde::Serialize;
use uuid::Uuid;

use crate::config::Settings;

#[derive(Debug, thiserror::Error)]
pub enum SpeechError {
    #[error("Speech API returned an error (HTTP {status}): {body}")]
    Api { status: u16, body: String },

    #[error("Speech transport error: {0}")]
    Transport(String),

    #[error("Could not store audio artifact: {0}")]
    Storage(#[from] std::io::Error),

    #[error("Speech synthesis is not configured")]
    NotConfigured,
}

/// Text → audio bytes.
pub trait SpeechSynthesizer: Send + Sync {
    fn synthesize<'a>(&'a self, text: &'a str) -> BoxFuture<'a, Result<Vec<u8>, SpeechError>>;
}

/// HTTP client for the voice vendor's text-to-speech endpoint.
pub struct TtsClient {
    base_url: String,
    api_key: String,
    voice_id: String,
    model_id: String,
    client: reqwest::Client,
}

impl TtsClient {
    pub fn new(base_url: &str, api_key: &str, voice_id: &str, model_id: &str, timeout_secs: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_default();

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            voice_id: voice_id.to_string(),
            model_id: model_id.to_string(),
            client,
        }
    }

    /// Build a client from settings, or `None` when no key is configured.
    pub fn from_settings(settings: &Settings) -> Option<Self> {
        settings.voice_api_key.as_deref().map(|key| {
            Self::new(
                &settings.voice_base_url,
                key,
                &settings.voice_id,
                &settings.voice_model_id,
                settings.request_timeout_secs,
            )
        })
    }
}

#[derive(Serialize)]
struct TtsRequest<'a> {
    text: &'a str,
    model_id: &'a str,
    voice_settings: VoiceSettings,
}

#[derive(Serialize)]
struct VoiceSettings {
    stability: f32,
    similarity_boost: f32,
    style: f32,
    use_speaker_boost: bool,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self { stability: 0.0, similarity_boost: 1.0, style: 0.0, use_speaker_boost: true }
    }
}

impl SpeechSynthesizer for TtsClient {
    fn synthesize<'a>(&'a self, text: &'a str) -> BoxFuture<'a, Result<Vec<u8>, SpeechError>> {
        Box::pin(async move {
            let url = format!("{}/v1/text-to-speech/{}", self.base_url, self.voice_id);
            let body = TtsRequest {
                text,
                model_id: &self.model_id,
                voice_settings: VoiceSettings::default(),
            };

            let response = self
                .client
                .post(&url)
                .header("xi-api-key", &self.api_key)
                .json(&body)
                .send()
                .await
                .map_err(|e| SpeechError::Transport(e.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(SpeechError::Api { status: status.as_u16(), body });
            }

            let bytes = response
                .bytes()
                .await
                .map_err(|e| SpeechError::Transport(e.to_string()))?;
            Ok(bytes.to_vec())
        })
    }
}

/// Write audio bytes under `audio_dir` and return the relative reference
/// stored on the turn.
pub fn store_audio(audio_dir: &Path, bytes: &[u8]) -> Result<String, SpeechError> {
    std::fs::create_dir_all(audio_dir)?;
    let file_name = format!("{}.mp3", Uuid::new_v4());
    let path: PathBuf = audio_dir.join(&file_name);
    std::fs::write(path, bytes)?;
    Ok(format!("audio/{file_name}"))
}

/// Synthesize and store speech for a reply, swallowing every failure.
///
/// Returns the stored audio reference, or `None` when synthesis is
/// unavailable or failed — the reply itself must still persist.
pub async fn synthesize_or_skip(
    synthesizer: Option<&dyn SpeechSynthesizer>,
    audio_dir: &Path,
    text: &str,
) -> Option<String> {
    let synthesizer = synthesizer?;
    match synthesizer.synthesize(text).await {
        Ok(bytes) => match store_audio(audio_dir, &bytes) {
            Ok(reference) => Some(reference),
            Err(e) => {
                tracing::warn!(error = %e, "failed to store synthesized audio");
                None
            }
        },
        Err(e) => {
            tracing::warn!(error = %e, "speech synthesis failed, persisting reply without audio");
            None
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Stub synthesizer: canned bytes or a canned failure.
    pub(crate) struct MockSynthesizer {
        result: Result<Vec<u8>, ()>,
    }

    impl MockSynthesizer {
        pub(crate) fn ok(bytes: &[u8]) -> Self {
            Self { result: Ok(bytes.to_vec()) }
        }

        pub(crate) fn failing() -> Self {
            Self { result: Err(()) }
        }
    }

    impl SpeechSynthesizer for MockSynthesizer {
        fn synthesize<'a>(&'a self, _text: &'a str) -> BoxFuture<'a, Result<Vec<u8>, SpeechError>> {
            Box::pin(async move {
                self.result
                    .clone()
                    .map_err(|_| SpeechError::Api { status: 503, body: "busy".to_string() })
            })
        }
    }

    #[tokio::test]
    async fn synthesis_failure_yields_none_not_error() {
        let dir = tempfile::tempdir().unwrap();
        let synth = MockSynthesizer::failing();
        let result = synthesize_or_skip(Some(&synth), dir.path(), "hello").await;
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn successful_synthesis_stores_and_references() {
        let dir = tempfile::tempdir().unwrap();
        let synth = MockSynthesizer::ok(b"mp3-bytes");
        let reference = synthesize_or_skip(Some(&synth), dir.path(), "hello")
            .await
            .unwrap();
        assert!(reference.starts_with("audio/"));
        assert!(reference.ends_with(".mp3"));

        let file_name = reference.strip_prefix("audio/").unwrap();
        let stored = std::fs::read(dir.path().join(file_name)).unwrap();
        assert_eq!(stored, b"mp3-bytes");
    }

    #[tokio::test]
    async fn no_synthesizer_configured_yields_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(synthesize_or_skip(None, dir.path(), "hello").await.is_none());
    }

    #[test]
    fn store_audio_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("does/not/exist");
        let reference = store_audio(&nested, b"xyz").unwrap();
        assert!(reference.starts_with("audio/"));
    }

    #[test]
    fn tts_request_serializes_voice_settings() {
        let body = TtsRequest {
            text: "hello",
            model_id: "eleven_multilingual_v2",
            voice_settings: VoiceSettings::default(),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["text"], "hello");
        assert_eq!(json["model_id"], "eleven_multilingual_v2");
        assert_eq!(json["voice_settings"]["use_speaker_boost"], true);
    }
}
