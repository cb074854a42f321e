//! Mock inference backends for deterministic testing.
//!
//! Provides mock implementations of the embedding, generation, transcription
//! and analysis adapters that produce deterministic output and record every
//! call.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use journal_inference::mock::MockInferenceBackend;
//! use journal_core::{EmbeddingBackend, GenerationBackend};
//!
//! #[tokio::test]
//! async fn test_with_mock_backend() {
//!     let backend = MockInferenceBackend::new()
//!         .with_dimension(384)
//!         .with_fixed_response("Test response");
//!
//!     let vectors = backend.embed_texts(&["test text".to_string()]).await.unwrap();
//!     assert_eq!(vectors[0].as_slice().len(), 384);
//! }
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use journal_core::{
    AnalysisBackend, EmbeddingBackend, EntryAnalysis, Error, GenerationBackend,
    InferenceBackend, Result, Vector,
};

use crate::transcription::{TranscriptionBackend, TranscriptionResult};

/// Operation names recorded in the call log.
pub const OP_EMBED: &str = "embed";
pub const OP_GENERATE: &str = "generate";
pub const OP_TRANSCRIBE: &str = "transcribe";
pub const OP_ANALYZE: &str = "analyze";
pub const OP_KEY_POINTS: &str = "key_points";

/// Mock inference backend for testing.
#[derive(Clone)]
pub struct MockInferenceBackend {
    config: Arc<MockConfig>,
    call_log: Arc<Mutex<Vec<MockCall>>>,
}

#[derive(Debug, Clone)]
struct MockConfig {
    dimension: usize,
    fixed_responses: HashMap<String, String>,
    default_response: String,
    transcript: Option<String>,
    failing: HashSet<String>,
    latency_ms: u64,
}

#[derive(Debug, Clone)]
pub struct MockCall {
    pub operation: String,
    pub input: String,
    pub timestamp: std::time::Instant,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            dimension: 384,
            fixed_responses: HashMap::new(),
            default_response: "Mock response".to_string(),
            transcript: None,
            failing: HashSet::new(),
            latency_ms: 0,
        }
    }
}

fn lock_log(log: &Mutex<Vec<MockCall>>) -> std::sync::MutexGuard<'_, Vec<MockCall>> {
    log.lock().unwrap_or_else(|e| e.into_inner())
}

impl MockInferenceBackend {
    /// Create a new mock backend with default configuration.
    pub fn new() -> Self {
        Self {
            config: Arc::new(MockConfig::default()),
            call_log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Set the embedding dimension.
    pub fn with_dimension(mut self, dimension: usize) -> Self {
        Arc::make_mut(&mut self.config).dimension = dimension;
        self
    }

    /// Set a fixed response for generation requests.
    pub fn with_fixed_response(mut self, response: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.config).default_response = response.into();
        self
    }

    /// Add a response mapping for a specific prompt.
    pub fn with_response_mapping(
        mut self,
        input: impl Into<String>,
        output: impl Into<String>,
    ) -> Self {
        Arc::make_mut(&mut self.config)
            .fixed_responses
            .insert(input.into(), output.into());
        self
    }

    /// Return this transcript for every audio buffer. Without it the
    /// transcript is the buffer decoded as UTF-8 (lossy) and trimmed.
    pub fn with_transcript(mut self, transcript: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.config).transcript = Some(transcript.into());
        self
    }

    /// Make every call of `operation` (see the `OP_*` constants) fail with
    /// the adapter error of that operation.
    pub fn with_failing_operation(mut self, operation: &str) -> Self {
        Arc::make_mut(&mut self.config)
            .failing
            .insert(operation.to_string());
        self
    }

    /// Set simulated latency for all operations.
    pub fn with_latency_ms(mut self, latency_ms: u64) -> Self {
        Arc::make_mut(&mut self.config).latency_ms = latency_ms;
        self
    }

    /// Get all logged calls for assertion.
    pub fn get_calls(&self) -> Vec<MockCall> {
        lock_log(&self.call_log).clone()
    }

    /// Clear the call log.
    pub fn clear_calls(&self) {
        lock_log(&self.call_log).clear()
    }

    /// Number of logged calls of `operation`.
    pub fn call_count(&self, operation: &str) -> usize {
        lock_log(&self.call_log)
            .iter()
            .filter(|c| c.operation == operation)
            .count()
    }

    /// Get number of embed calls (one per text).
    pub fn embed_call_count(&self) -> usize {
        self.call_count(OP_EMBED)
    }

    /// Get number of generation calls.
    pub fn generate_call_count(&self) -> usize {
        self.call_count(OP_GENERATE)
    }

    /// Get number of transcription calls.
    pub fn transcribe_call_count(&self) -> usize {
        self.call_count(OP_TRANSCRIBE)
    }

    fn log_call(&self, operation: &str, input: &str) {
        lock_log(&self.call_log).push(MockCall {
            operation: operation.to_string(),
            input: input.to_string(),
            timestamp: std::time::Instant::now(),
        });
    }

    fn should_fail(&self, operation: &str) -> bool {
        self.config.failing.contains(operation)
    }

    async fn simulate_latency(&self) {
        if self.config.latency_ms > 0 {
            tokio::time::sleep(tokio::time::Duration::from_millis(self.config.latency_ms)).await;
        }
    }
}

impl Default for MockInferenceBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmbeddingBackend for MockInferenceBackend {
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vector>> {
        for text in texts {
            self.log_call(OP_EMBED, text);
        }
        self.simulate_latency().await;

        if self.should_fail(OP_EMBED) {
            return Err(Error::Embedding("Simulated failure for testing".to_string()));
        }

        Ok(texts
            .iter()
            .map(|t| Vector::from(MockEmbeddingGenerator::generate(t, self.config.dimension)))
            .collect())
    }

    fn dimension(&self) -> usize {
        self.config.dimension
    }

    fn model_name(&self) -> &str {
        "mock-embed"
    }
}

#[async_trait]
impl GenerationBackend for MockInferenceBackend {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.generate_with_system("", prompt).await
    }

    async fn generate_with_system(&self, _system: &str, prompt: &str) -> Result<String> {
        self.log_call(OP_GENERATE, prompt);
        self.simulate_latency().await;

        if self.should_fail(OP_GENERATE) {
            return Err(Error::Inference("Simulated failure for testing".to_string()));
        }

        // Check for mapped response
        if let Some(response) = self.config.fixed_responses.get(prompt) {
            return Ok(response.clone());
        }

        Ok(self.config.default_response.clone())
    }

    fn model_name(&self) -> &str {
        "mock-gen"
    }
}

#[async_trait]
impl InferenceBackend for MockInferenceBackend {
    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }
}

#[async_trait]
impl TranscriptionBackend for MockInferenceBackend {
    async fn transcribe(
        &self,
        audio_data: &[u8],
        mime_type: &str,
        _language: Option<&str>,
    ) -> Result<TranscriptionResult> {
        self.log_call(OP_TRANSCRIBE, mime_type);
        self.simulate_latency().await;

        if self.should_fail(OP_TRANSCRIBE) {
            return Err(Error::Transcription(
                "Simulated failure for testing".to_string(),
            ));
        }

        let full_text = match &self.config.transcript {
            Some(text) => text.clone(),
            None => String::from_utf8_lossy(audio_data).trim().to_string(),
        };
        Ok(TranscriptionResult {
            full_text,
            segments: Vec::new(),
            language: None,
            duration_secs: None,
        })
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    fn model_name(&self) -> &str {
        "mock-whisper"
    }
}

/// Analysis adapter returning a fixed result and counting calls.
#[derive(Clone, Default)]
pub struct MockAnalysisBackend {
    analysis: EntryAnalysis,
    fail: bool,
    call_log: Arc<Mutex<Vec<MockCall>>>,
}

impl MockAnalysisBackend {
    pub fn new(analysis: EntryAnalysis) -> Self {
        Self {
            analysis,
            ..Self::default()
        }
    }

    /// Fail every call with an inference error.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Texts passed to `analyze`, in call order.
    pub fn analyzed_texts(&self) -> Vec<String> {
        self.inputs(OP_ANALYZE)
    }

    /// Texts passed to `key_points`, in call order.
    pub fn key_point_texts(&self) -> Vec<String> {
        self.inputs(OP_KEY_POINTS)
    }

    pub fn analyze_call_count(&self) -> usize {
        self.analyzed_texts().len()
    }

    pub fn key_points_call_count(&self) -> usize {
        self.key_point_texts().len()
    }

    fn inputs(&self, operation: &str) -> Vec<String> {
        lock_log(&self.call_log)
            .iter()
            .filter(|c| c.operation == operation)
            .map(|c| c.input.clone())
            .collect()
    }

    fn record(&self, operation: &str, text: &str) -> Result<()> {
        lock_log(&self.call_log).push(MockCall {
            operation: operation.to_string(),
            input: text.to_string(),
            timestamp: std::time::Instant::now(),
        });
        if self.fail {
            return Err(Error::Inference("Simulated failure for testing".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl AnalysisBackend for MockAnalysisBackend {
    async fn analyze(&self, text: &str) -> Result<EntryAnalysis> {
        self.record(OP_ANALYZE, text)?;
        Ok(self.analysis.clone().normalized())
    }

    async fn key_points(&self, text: &str) -> Result<Vec<String>> {
        self.record(OP_KEY_POINTS, text)?;
        Ok(self.analysis.clone().normalized().key_points)
    }
}

/// Mock embedding generator with deterministic output.
pub struct MockEmbeddingGenerator;

impl MockEmbeddingGenerator {
    /// Generate a deterministic embedding from text.
    ///
    /// Uses character-based hashing for reproducibility. The same text
    /// will always produce the same embedding.
    pub fn generate(text: &str, dimension: usize) -> Vec<f32> {
        let dimension = dimension.max(1);
        let mut vec = vec![0.0; dimension];

        // Use character codes to generate deterministic values
        for (i, c) in text.chars().enumerate() {
            let idx = (c as usize + i) % dimension;
            vec[idx] += 0.1;
        }

        // Normalize to unit vector
        Self::normalize(&mut vec);
        vec
    }

    fn normalize(vec: &mut [f32]) {
        let magnitude: f32 = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            vec.iter_mut().for_each(|x| *x /= magnitude);
        }
    }

    /// Calculate cosine similarity between two vectors.
    pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
        assert_eq!(a.len(), b.len(), "Vectors must have same dimension");

        let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
        let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

        if mag_a > 0.0 && mag_b > 0.0 {
            dot / (mag_a * mag_b)
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_backend_embed() {
        let backend = MockInferenceBackend::new().with_dimension(128);

        let vectors = backend.embed_texts(&["test".to_string()]).await.unwrap();
        assert_eq!(vectors.len(), 1);
        assert_eq!(vectors[0].as_slice().len(), 128);
        assert_eq!(backend.dimension(), 128);
    }

    #[tokio::test]
    async fn test_mock_backend_deterministic() {
        let backend = MockInferenceBackend::new();
        let texts = vec!["morning run".to_string(), "morning run".to_string()];

        let vectors = backend.embed_texts(&texts).await.unwrap();
        assert_eq!(vectors[0], vectors[1], "Embeddings should be deterministic");
    }

    #[tokio::test]
    async fn test_mock_backend_generate() {
        let backend = MockInferenceBackend::new().with_fixed_response("Custom response");

        let response = backend.generate("test prompt").await.unwrap();
        assert_eq!(response, "Custom response");
    }

    #[tokio::test]
    async fn test_mock_backend_response_mapping() {
        let backend = MockInferenceBackend::new()
            .with_response_mapping("hello", "world")
            .with_response_mapping("foo", "bar");

        assert_eq!(backend.generate("hello").await.unwrap(), "world");
        assert_eq!(backend.generate("foo").await.unwrap(), "bar");
    }

    #[tokio::test]
    async fn test_mock_backend_call_logging() {
        let backend = MockInferenceBackend::new();

        backend
            .embed_texts(&["text1".to_string(), "text2".to_string()])
            .await
            .unwrap();
        backend.generate("prompt").await.unwrap();

        assert_eq!(backend.embed_call_count(), 2);
        assert_eq!(backend.generate_call_count(), 1);
        assert_eq!(backend.get_calls().len(), 3);

        backend.clear_calls();
        assert!(backend.get_calls().is_empty());
    }

    #[tokio::test]
    async fn test_mock_transcript_defaults_to_buffer_text() {
        let backend = MockInferenceBackend::new();
        let result = backend
            .transcribe(b"  walked the dog \n", "audio/mpeg", None)
            .await
            .unwrap();
        assert_eq!(result.full_text, "walked the dog");

        let fixed = MockInferenceBackend::new().with_transcript("fixed");
        let result = fixed.transcribe(b"ignored", "audio/wav", None).await.unwrap();
        assert_eq!(result.full_text, "fixed");
        assert_eq!(fixed.transcribe_call_count(), 1);
    }

    #[tokio::test]
    async fn test_failing_operation_uses_matching_error() {
        let backend = MockInferenceBackend::new()
            .with_failing_operation(OP_TRANSCRIBE)
            .with_failing_operation(OP_EMBED);

        let err = backend.transcribe(b"x", "audio/wav", None).await.unwrap_err();
        assert!(matches!(err, Error::Transcription(_)));

        let err = backend.embed_texts(&["x".to_string()]).await.unwrap_err();
        assert!(matches!(err, Error::Embedding(_)));

        assert!(backend.generate("still works").await.is_ok());
    }

    #[tokio::test]
    async fn test_mock_analysis_backend() {
        let analysis = EntryAnalysis {
            sentiment: 9.0,
            key_points: vec!["  one ".to_string()],
            ..EntryAnalysis::default()
        };
        let backend = MockAnalysisBackend::new(analysis);

        let result = backend.analyze("text a").await.unwrap();
        assert_eq!(result.sentiment, 3.0);
        assert_eq!(backend.key_points("text b").await.unwrap(), vec!["one"]);
        assert_eq!(backend.analyzed_texts(), vec!["text a"]);
        assert_eq!(backend.key_point_texts(), vec!["text b"]);

        let failing = MockAnalysisBackend::failing();
        assert!(matches!(
            failing.analyze("x").await.unwrap_err(),
            Error::Inference(_)
        ));
        assert_eq!(failing.analyze_call_count(), 1);
    }

    #[test]
    fn test_embedding_generator_normalized() {
        let embedding = MockEmbeddingGenerator::generate("test", 128);
        let magnitude: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((magnitude - 1.0).abs() < 0.01, "Should be normalized");
    }

    #[test]
    fn test_cosine_similarity() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![1.0, 0.0, 0.0];
        let c = vec![0.0, 1.0, 0.0];

        assert!((MockEmbeddingGenerator::cosine_similarity(&a, &b) - 1.0).abs() < 0.01);
        assert!((MockEmbeddingGenerator::cosine_similarity(&a, &c)).abs() < 0.01);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mock_backend_latency_simulation() {
        let backend = MockInferenceBackend::new().with_latency_ms(50);

        let start = tokio::time::Instant::now();
        backend.generate("test").await.unwrap();
        assert!(start.elapsed().as_millis() >= 50, "Should simulate latency");
    }
}
