//! OpenAI-compatible inference backend implementation.

use async_trait::async_trait;
use reqwest::Client;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use journal_core::{
    defaults, EmbeddingBackend, Error, GenerationBackend, InferenceBackend, Result, Vector,
};

use super::error::{to_journal_error, ApiCall, OpenAIErrorCode};
use super::types::*;

/// Configuration for OpenAI-compatible backend.
#[derive(Debug, Clone)]
pub struct OpenAIConfig {
    /// Base URL for the API endpoint.
    pub base_url: String,
    /// API key for authentication (optional for local endpoints).
    pub api_key: Option<String>,
    /// Model to use for embeddings.
    pub embed_model: String,
    /// Model to use for generation.
    pub gen_model: String,
    /// Expected embedding dimension.
    pub embed_dimension: usize,
    /// Request timeout in seconds.
    pub timeout_seconds: u64,
}

impl Default for OpenAIConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::OPENAI_BASE_URL.to_string(),
            api_key: None,
            embed_model: defaults::EMBED_MODEL.to_string(),
            gen_model: defaults::GEN_MODEL.to_string(),
            embed_dimension: defaults::EMBED_DIMENSION,
            timeout_seconds: defaults::OPENAI_TIMEOUT_SECS,
        }
    }
}

impl OpenAIConfig {
    /// Read configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self {
            base_url: std::env::var(defaults::ENV_OPENAI_BASE_URL)
                .unwrap_or_else(|_| defaults::OPENAI_BASE_URL.to_string()),
            api_key: std::env::var(defaults::ENV_OPENAI_API_KEY)
                .ok()
                .filter(|k| !k.trim().is_empty()),
            embed_model: std::env::var(defaults::ENV_OPENAI_EMBED_MODEL)
                .unwrap_or_else(|_| defaults::EMBED_MODEL.to_string()),
            gen_model: std::env::var(defaults::ENV_OPENAI_GEN_MODEL)
                .unwrap_or_else(|_| defaults::GEN_MODEL.to_string()),
            embed_dimension: std::env::var(defaults::ENV_OPENAI_EMBED_DIM)
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults::EMBED_DIMENSION),
            timeout_seconds: std::env::var(defaults::ENV_OPENAI_TIMEOUT)
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults::OPENAI_TIMEOUT_SECS),
        }
    }
}

/// OpenAI-compatible inference backend.
pub struct OpenAIBackend {
    client: Client,
    config: OpenAIConfig,
}

impl OpenAIBackend {
    /// Create a new OpenAI backend with the given configuration.
    pub fn new(config: OpenAIConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        info!(
            subsystem = "inference",
            component = "openai",
            url = %config.base_url,
            embed_model = %config.embed_model,
            gen_model = %config.gen_model,
            "Initializing OpenAI backend"
        );

        Ok(Self { client, config })
    }

    /// Create with default configuration.
    pub fn with_defaults() -> Result<Self> {
        Self::new(OpenAIConfig::default())
    }

    /// Create from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::new(OpenAIConfig::from_env())
    }

    /// Get the current configuration.
    pub fn config(&self) -> &OpenAIConfig {
        &self.config
    }

    /// Build a request with authentication if configured.
    fn build_request(&self, endpoint: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.config.base_url.trim_end_matches('/'), endpoint);
        let mut req = self.client.post(&url);

        if let Some(ref api_key) = self.config.api_key {
            req = req.header("Authorization", format!("Bearer {}", api_key));
        }

        req.header("Content-Type", "application/json")
    }

    /// Build a GET request with authentication.
    fn build_get_request(&self, endpoint: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.config.base_url.trim_end_matches('/'), endpoint);
        let mut req = self.client.get(&url);

        if let Some(ref api_key) = self.config.api_key {
            req = req.header("Authorization", format!("Bearer {}", api_key));
        }

        req
    }

    /// Map a transport failure to the error family of the calling endpoint.
    fn send_error(&self, call: ApiCall, e: reqwest::Error) -> Error {
        if e.is_timeout() {
            return Error::Timeout {
                operation: match call {
                    ApiCall::Embedding => "openai embeddings".to_string(),
                    ApiCall::Completion => "openai chat completion".to_string(),
                },
                secs: self.config.timeout_seconds,
            };
        }
        to_journal_error(
            OpenAIErrorCode::Unknown,
            call,
            &format!("Request failed: {}", e),
        )
    }
}

/// Turn a non-2xx response into an error, reading the OpenAI error body when
/// it parses.
async fn error_from_response(call: ApiCall, response: reqwest::Response) -> Error {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    let body: OpenAIErrorResponse =
        serde_json::from_str(&text).unwrap_or_else(|_| OpenAIErrorResponse::unknown(&text));
    let code = OpenAIErrorCode::from_response(status.as_u16(), &body.error.error_type);
    warn!(
        subsystem = "inference",
        component = "openai",
        status = status.as_u16(),
        retryable = code.is_retryable(),
        error = %body.error.message,
        "OpenAI request rejected"
    );
    to_journal_error(
        code,
        call,
        &format!("OpenAI returned {}: {}", status, body.error.message),
    )
}

#[async_trait]
impl EmbeddingBackend for OpenAIBackend {
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vector>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let start = Instant::now();
        debug!(
            subsystem = "inference",
            component = "openai",
            op = "embed_texts",
            input_count = texts.len(),
            model = %self.config.embed_model,
            "Embedding texts"
        );

        let request = EmbeddingRequest {
            model: self.config.embed_model.clone(),
            input: texts.to_vec(),
            encoding_format: Some("float".to_string()),
        };

        let response = self
            .build_request("/embeddings")
            .json(&request)
            .send()
            .await
            .map_err(|e| self.send_error(ApiCall::Embedding, e))?;

        if !response.status().is_success() {
            return Err(error_from_response(ApiCall::Embedding, response).await);
        }

        let result: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| Error::Embedding(format!("Failed to parse response: {}", e)))?;

        if result.data.len() != texts.len() {
            return Err(Error::Embedding(format!(
                "Expected {} embeddings, received {}",
                texts.len(),
                result.data.len()
            )));
        }

        // Sort by index to ensure correct ordering
        let mut data = result.data;
        data.sort_by_key(|d| d.index);

        let vectors: Vec<Vector> = data
            .into_iter()
            .map(|d| Vector::from(d.embedding))
            .collect();

        debug!(
            subsystem = "inference",
            component = "openai",
            op = "embed_texts",
            result_count = vectors.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Embeddings generated"
        );
        Ok(vectors)
    }

    fn dimension(&self) -> usize {
        self.config.embed_dimension
    }

    fn model_name(&self) -> &str {
        &self.config.embed_model
    }
}

#[async_trait]
impl GenerationBackend for OpenAIBackend {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.generate_with_system("", prompt).await
    }

    async fn generate_with_system(&self, system: &str, prompt: &str) -> Result<String> {
        let start = Instant::now();
        debug!(
            subsystem = "inference",
            component = "openai",
            op = "generate",
            model = %self.config.gen_model,
            prompt_len = prompt.len(),
            "Generating completion"
        );

        let mut messages = Vec::new();
        if !system.is_empty() {
            messages.push(ChatMessage::system(system));
        }
        messages.push(ChatMessage::user(prompt));

        let request = ChatCompletionRequest {
            model: self.config.gen_model.clone(),
            messages,
            temperature: None,
            response_format: None,
        };

        let response = self
            .build_request("/chat/completions")
            .json(&request)
            .send()
            .await
            .map_err(|e| self.send_error(ApiCall::Completion, e))?;

        if !response.status().is_success() {
            return Err(error_from_response(ApiCall::Completion, response).await);
        }

        let result: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| Error::Inference(format!("Failed to parse response: {}", e)))?;

        let content = result
            .choices
            .first()
            .map(|c| c.message.content.clone())
            .unwrap_or_default();

        debug!(
            subsystem = "inference",
            component = "openai",
            op = "generate",
            response_len = content.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Generation complete"
        );
        Ok(content)
    }

    fn model_name(&self) -> &str {
        &self.config.gen_model
    }
}

#[async_trait]
impl InferenceBackend for OpenAIBackend {
    async fn health_check(&self) -> Result<bool> {
        // For OpenAI-compatible APIs, we try a minimal models list request
        let response = self
            .build_get_request("/models")
            .timeout(Duration::from_secs(5))
            .send()
            .await;

        match response {
            Ok(resp) => {
                if resp.status().is_success() {
                    info!(subsystem = "inference", component = "openai", "Health check passed");
                    Ok(true)
                } else {
                    warn!(
                        subsystem = "inference",
                        component = "openai",
                        status = resp.status().as_u16(),
                        "Health check failed"
                    );
                    Ok(false)
                }
            }
            Err(e) => {
                warn!(
                    subsystem = "inference",
                    component = "openai",
                    error = %e,
                    "Health check error"
                );
                Ok(false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = OpenAIConfig::default();
        assert_eq!(config.base_url, defaults::OPENAI_BASE_URL);
        assert_eq!(config.embed_model, defaults::EMBED_MODEL);
        assert_eq!(config.gen_model, defaults::GEN_MODEL);
        assert_eq!(config.embed_dimension, defaults::EMBED_DIMENSION);
        assert_eq!(config.timeout_seconds, defaults::OPENAI_TIMEOUT_SECS);
        assert!(config.api_key.is_none());
    }

    #[test]
    fn test_backend_reports_models() {
        let backend = OpenAIBackend::new(OpenAIConfig {
            embed_model: "embed-x".to_string(),
            gen_model: "gen-y".to_string(),
            embed_dimension: 42,
            ..OpenAIConfig::default()
        })
        .unwrap();

        assert_eq!(EmbeddingBackend::model_name(&backend), "embed-x");
        assert_eq!(GenerationBackend::model_name(&backend), "gen-y");
        assert_eq!(backend.dimension(), 42);
    }

    #[tokio::test]
    async fn test_embed_empty_input_skips_request() {
        // Unroutable base URL: any request would fail.
        let backend = OpenAIBackend::new(OpenAIConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            ..OpenAIConfig::default()
        })
        .unwrap();

        let vectors = backend.embed_texts(&[]).await.unwrap();
        assert!(vectors.is_empty());
    }
}
