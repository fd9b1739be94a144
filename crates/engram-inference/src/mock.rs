//! Mock inference backend for deterministic testing.
//!
//! Implements [`Embedder`] and [`Generator`] with hash-seeded embeddings
//! and configurable canned responses, plus a call log for asserting how
//! many inference calls a pipeline actually made.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use engram_core::{Embedder, Error, Generator, Result, Vector};

use crate::fallback::deterministic_embedding;

#[derive(Debug, Clone)]
struct MockConfig {
    dimension: usize,
    fixed_responses: HashMap<String, String>,
    default_response: String,
    fail_embedding: bool,
    fail_generation: bool,
    latency_ms: u64,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            dimension: 384,
            fixed_responses: HashMap::new(),
            default_response: "Mock response".to_string(),
            fail_embedding: false,
            fail_generation: false,
            latency_ms: 0,
        }
    }
}

/// One recorded inference call.
#[derive(Debug, Clone)]
pub struct MockCall {
    pub operation: String,
    pub input: String,
}

/// Mock inference backend for testing.
#[derive(Clone, Default)]
pub struct MockInference {
    config: Arc<MockConfig>,
    call_log: Arc<Mutex<Vec<MockCall>>>,
}

impl MockInference {
    /// Create a new mock backend with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the embedding dimension.
    pub fn with_dimension(mut self, dimension: usize) -> Self {
        Arc::make_mut(&mut self.config).dimension = dimension;
        self
    }

    /// Set the default response for generation requests.
    pub fn with_fixed_response(mut self, response: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.config).default_response = response.into();
        self
    }

    /// Add a response for prompts containing the given needle.
    pub fn with_response_containing(
        mut self,
        needle: impl Into<String>,
        output: impl Into<String>,
    ) -> Self {
        Arc::make_mut(&mut self.config)
            .fixed_responses
            .insert(needle.into(), output.into());
        self
    }

    /// Make every embed call fail with a timeout.
    pub fn with_failing_embedding(mut self, fail: bool) -> Self {
        Arc::make_mut(&mut self.config).fail_embedding = fail;
        self
    }

    /// Make every generate call fail with a timeout.
    pub fn with_failing_generation(mut self, fail: bool) -> Self {
        Arc::make_mut(&mut self.config).fail_generation = fail;
        self
    }

    /// Set simulated latency for all operations.
    pub fn with_latency_ms(mut self, latency_ms: u64) -> Self {
        Arc::make_mut(&mut self.config).latency_ms = latency_ms;
        self
    }

    /// Get all logged calls for assertion.
    pub fn calls(&self) -> Vec<MockCall> {
        self.call_log.lock().unwrap().clone()
    }

    /// Number of embed calls.
    pub fn embed_call_count(&self) -> usize {
        self.count_ops("embed")
    }

    /// Number of generation calls.
    pub fn generate_call_count(&self) -> usize {
        self.count_ops("generate")
    }

    fn count_ops(&self, op: &str) -> usize {
        self.call_log
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.operation == op)
            .count()
    }

    fn log_call(&self, operation: &str, input: &str) {
        self.call_log.lock().unwrap().push(MockCall {
            operation: operation.to_string(),
            input: input.to_string(),
        });
    }

    async fn simulate_latency(&self) {
        if self.config.latency_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.config.latency_ms)).await;
        }
    }

    fn response_for(&self, prompt: &str) -> String {
        for (needle, output) in &self.config.fixed_responses {
            if prompt.contains(needle.as_str()) {
                return output.clone();
            }
        }
        self.config.default_response.clone()
    }
}

#[async_trait]
impl Embedder for MockInference {
    async fn embed(&self, text: &str) -> Result<Vector> {
        self.log_call("embed", text);
        self.simulate_latency().await;

        if self.config.fail_embedding {
            return Err(Error::Timeout {
                op: "embed",
                secs: 0,
            });
        }

        Ok(deterministic_embedding(text, self.config.dimension))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vector>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    fn dimension(&self) -> usize {
        self.config.dimension
    }

    fn model_name(&self) -> &str {
        "mock-embed"
    }
}

#[async_trait]
impl Generator for MockInference {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.log_call("generate", prompt);
        self.simulate_latency().await;

        if self.config.fail_generation {
            return Err(Error::Timeout {
                op: "generate",
                secs: 0,
            });
        }

        Ok(self.response_for(prompt))
    }

    async fn generate_json(&self, prompt: &str) -> Result<String> {
        self.generate(prompt).await
    }

    fn model_name(&self) -> &str {
        "mock-gen"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_embed_is_deterministic() {
        let mock = MockInference::new().with_dimension(16);
        let a = mock.embed("hello").await.unwrap();
        let b = mock.embed("hello").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
        assert_eq!(mock.embed_call_count(), 2);
    }

    #[tokio::test]
    async fn test_generate_default_and_mapped() {
        let mock = MockInference::new()
            .with_fixed_response("default")
            .with_response_containing("weather", "sunny [1]");

        assert_eq!(mock.generate("anything").await.unwrap(), "default");
        assert_eq!(
            mock.generate("what is the weather like").await.unwrap(),
            "sunny [1]"
        );
        assert_eq!(mock.generate_call_count(), 2);
    }

    #[tokio::test]
    async fn test_failing_embedding() {
        let mock = MockInference::new().with_failing_embedding(true);
        let err = mock.embed("x").await.unwrap_err();
        assert!(matches!(err, Error::Timeout { op: "embed", .. }));
    }

    #[tokio::test]
    async fn test_failing_generation() {
        let mock = MockInference::new().with_failing_generation(true);
        let err = mock.generate("x").await.unwrap_err();
        assert!(matches!(err, Error::Timeout { op: "generate", .. }));
    }

    #[tokio::test]
    async fn test_embed_batch_logs_each_call() {
        let mock = MockInference::new();
        mock.embed_batch(&["a".to_string(), "b".to_string()])
            .await
            .unwrap();
        assert_eq!(mock.embed_call_count(), 2);
    }
}
