//! Transcription backend traits and implementations for audio-to-text.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use journal_core::{defaults, Error, Result};

/// A segment of transcribed audio with timestamps.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TranscriptionSegment {
    pub start_secs: f64,
    pub end_secs: f64,
    pub text: String,
}

/// Result of audio transcription.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TranscriptionResult {
    /// Full transcribed text.
    pub full_text: String,
    /// Timestamped segments.
    pub segments: Vec<TranscriptionSegment>,
    /// Detected language (ISO 639-1 code).
    pub language: Option<String>,
    /// Total audio duration in seconds.
    pub duration_secs: Option<f64>,
}

/// Backend for transcribing audio buffers.
#[async_trait]
pub trait TranscriptionBackend: Send + Sync {
    /// Transcribe audio data. An empty transcript is a valid result.
    async fn transcribe(
        &self,
        audio_data: &[u8],
        mime_type: &str,
        language: Option<&str>,
    ) -> Result<TranscriptionResult>;

    /// Check if the transcription backend is available.
    async fn health_check(&self) -> Result<bool>;

    /// Get the model name being used.
    fn model_name(&self) -> &str;
}

/// Configuration for [`WhisperBackend`].
#[derive(Debug, Clone)]
pub struct WhisperConfig {
    /// Service root; the backend appends `/v1/audio/transcriptions`.
    pub base_url: String,
    pub model: String,
    /// Bearer token (required by OpenAI, optional for self-hosted servers).
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

impl Default for WhisperConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::WHISPER_BASE_URL.to_string(),
            model: defaults::WHISPER_MODEL.to_string(),
            api_key: None,
            timeout_secs: defaults::ADAPTER_TIMEOUT_SECS,
        }
    }
}

impl WhisperConfig {
    /// Read configuration from the environment. The API key is shared with
    /// the OpenAI backend.
    pub fn from_env() -> Self {
        Self {
            base_url: std::env::var(defaults::ENV_WHISPER_BASE_URL)
                .ok()
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| defaults::WHISPER_BASE_URL.to_string()),
            model: std::env::var(defaults::ENV_WHISPER_MODEL)
                .unwrap_or_else(|_| defaults::WHISPER_MODEL.to_string()),
            api_key: std::env::var(defaults::ENV_OPENAI_API_KEY)
                .ok()
                .filter(|k| !k.trim().is_empty()),
            timeout_secs: defaults::ADAPTER_TIMEOUT_SECS,
        }
    }
}

/// OpenAI-compatible Whisper backend (OpenAI cloud, Speaches,
/// faster-whisper-server).
pub struct WhisperBackend {
    config: WhisperConfig,
    client: reqwest::Client,
}

impl WhisperBackend {
    pub fn new(config: WhisperConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    /// Create from environment variables.
    pub fn from_env() -> Self {
        Self::new(WhisperConfig::from_env())
    }

    pub fn config(&self) -> &WhisperConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }
}

/// File extension sent with the multipart upload; Whisper infers the
/// container from the file name.
pub fn extension_for_mime(mime_type: &str) -> &'static str {
    match mime_type {
        "audio/mpeg" | "audio/mp3" => "mp3",
        "audio/wav" | "audio/x-wav" => "wav",
        "audio/m4a" | "audio/x-m4a" => "m4a",
        "audio/mp4" => "mp4",
        "audio/aac" => "aac",
        "audio/ogg" => "ogg",
        "audio/flac" => "flac",
        "audio/webm" => "webm",
        _ => "wav",
    }
}

/// OpenAI Whisper API response format.
#[derive(Deserialize)]
struct WhisperResponse {
    text: String,
    #[serde(default)]
    segments: Option<Vec<WhisperSegment>>,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    duration: Option<f64>,
}

#[derive(Deserialize)]
struct WhisperSegment {
    start: f64,
    end: f64,
    text: String,
}

#[async_trait]
impl TranscriptionBackend for WhisperBackend {
    async fn transcribe(
        &self,
        audio_data: &[u8],
        mime_type: &str,
        language: Option<&str>,
    ) -> Result<TranscriptionResult> {
        let start = Instant::now();
        let url = self.url("/v1/audio/transcriptions");
        let ext = extension_for_mime(mime_type);

        debug!(
            subsystem = "inference",
            component = "whisper",
            op = "transcribe",
            byte_len = audio_data.len(),
            model = %self.config.model,
            "Transcribing audio"
        );

        let file_part = reqwest::multipart::Part::bytes(audio_data.to_vec())
            .file_name(format!("audio.{}", ext))
            .mime_str(mime_type)
            .map_err(|e| Error::InvalidInput(format!("Unsupported MIME type: {}", e)))?;

        let mut form = reqwest::multipart::Form::new()
            .part("file", file_part)
            .text("model", self.config.model.clone())
            .text("response_format", "verbose_json");

        if let Some(lang) = language {
            form = form.text("language", lang.to_string());
        }

        let mut request = self
            .client
            .post(&url)
            .multipart(form)
            .timeout(Duration::from_secs(self.config.timeout_secs));
        if let Some(ref key) = self.config.api_key {
            request = request.header("Authorization", format!("Bearer {}", key));
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                Error::Timeout {
                    operation: "whisper transcription".to_string(),
                    secs: self.config.timeout_secs,
                }
            } else {
                Error::Transcription(format!("Transcription request failed: {}", e))
            }
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!(
                subsystem = "inference",
                component = "whisper",
                status = status.as_u16(),
                error = %body,
                "Whisper request rejected"
            );
            return Err(Error::Transcription(format!(
                "Whisper API returned {}: {}",
                status, body
            )));
        }

        let result: WhisperResponse = response.json().await.map_err(|e| {
            Error::Transcription(format!("Failed to parse whisper response: {}", e))
        })?;

        let segments = result
            .segments
            .unwrap_or_default()
            .into_iter()
            .map(|s| TranscriptionSegment {
                start_secs: s.start,
                end_secs: s.end,
                text: s.text,
            })
            .collect();

        let full_text = result.text.trim().to_string();
        debug!(
            subsystem = "inference",
            component = "whisper",
            op = "transcribe",
            response_len = full_text.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Transcription complete"
        );

        Ok(TranscriptionResult {
            full_text,
            segments,
            language: result.language,
            duration_secs: result.duration,
        })
    }

    async fn health_check(&self) -> Result<bool> {
        match self
            .client
            .get(self.url("/health"))
            .timeout(Duration::from_secs(5))
            .send()
            .await
        {
            Ok(resp) => Ok(resp.status().is_success()),
            Err(_) => Ok(false),
        }
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}
