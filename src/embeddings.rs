//! Embedding providers.
//!
//! The embedding model is a black box behind [`EmbeddingProvider`]: the
//! pipeline hands it text, it hands back unit-length vectors. Production runs
//! use [`HttpEmbeddingProvider`] against an OpenAI-compatible `/embeddings`
//! endpoint; tests use [`MockEmbeddingProvider`] for determinism.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::types::RagError;

/// Batched text-to-vector embedding.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Identity tag recorded against persisted vectors.
    fn model_name(&self) -> &str;

    /// Output dimensionality.
    fn dimensions(&self) -> usize;

    /// Maximum input length in tokens; longer inputs are truncated by the
    /// model, so callers chunk to stay under this.
    fn max_sequence_length(&self) -> usize;

    /// Embeds a batch of texts, one unit-length vector per input, in order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError>;
}

/// Scales `vector` to unit L2 norm in place. Zero vectors are left unchanged.
pub fn normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for value in vector.iter_mut() {
            *value /= norm;
        }
    }
}

/// Deterministic mock provider: vectors derived from a rolling hash of the
/// input text, normalized to unit length. Equal texts always embed equally,
/// so similarity thresholds are exercisable without a model.
pub struct MockEmbeddingProvider {
    dimensions: usize,
}

impl MockEmbeddingProvider {
    pub fn new() -> Self {
        Self { dimensions: 384 }
    }

    pub fn with_dimensions(dimensions: usize) -> Self {
        Self { dimensions }
    }

    fn hash_to_vec(&self, text: &str) -> Vec<f32> {
        let mut state: u64 = 0xcbf2_9ce4_8422_2325;
        let mut vector = Vec::with_capacity(self.dimensions);
        for i in 0..self.dimensions {
            for byte in text.as_bytes() {
                state ^= u64::from(*byte).wrapping_add(i as u64);
                state = state.wrapping_mul(0x0000_0100_0000_01b3);
            }
            // Spread hash bits into [-1, 1).
            vector.push(((state >> 11) as f32 / (1u64 << 53) as f32) * 2.0 - 1.0);
        }
        normalize(&mut vector);
        vector
    }
}

impl Default for MockEmbeddingProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbeddingProvider {
    fn model_name(&self) -> &str {
        "mock-embedding"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn max_sequence_length(&self) -> usize {
        512
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        Ok(texts.iter().map(|text| self.hash_to_vec(text)).collect())
    }
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
}

/// Provider backed by an OpenAI-compatible `/embeddings` endpoint.
pub struct HttpEmbeddingProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model_name: String,
    dimensions: usize,
    max_sequence_length: usize,
}

impl HttpEmbeddingProvider {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        model_name: impl Into<String>,
        dimensions: usize,
        max_sequence_length: usize,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key,
            model_name: model_name.into(),
            dimensions,
            max_sequence_length,
        }
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingProvider {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn max_sequence_length(&self) -> usize {
        self.max_sequence_length
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        let url = format!("{}/embeddings", self.base_url.trim_end_matches('/'));
        let mut request = self.client.post(&url).json(&json!({
            "model": self.model_name,
            "input": texts,
        }));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?.error_for_status()?;
        let parsed: EmbeddingsResponse = response.json().await?;
        if parsed.data.len() != texts.len() {
            return Err(RagError::Embedding(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                parsed.data.len()
            )));
        }

        debug!(batch = texts.len(), model = %self.model_name, "embedded batch");
        let mut vectors = Vec::with_capacity(parsed.data.len());
        for datum in parsed.data {
            if datum.embedding.len() != self.dimensions {
                return Err(RagError::Embedding(format!(
                    "expected {}-dimensional vector, got {}",
                    self.dimensions,
                    datum.embedding.len()
                )));
            }
            let mut vector = datum.embedding;
            normalize(&mut vector);
            vectors.push(vector);
        }
        Ok(vectors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_embeddings_are_deterministic_unit_vectors() {
        let provider = MockEmbeddingProvider::new();
        let inputs = vec!["first text".to_string(), "second text".to_string()];

        let a = provider.embed_batch(&inputs).await.unwrap();
        let b = provider.embed_batch(&inputs).await.unwrap();
        assert_eq!(a, b);
        assert_ne!(a[0], a[1]);

        for vector in &a {
            assert_eq!(vector.len(), 384);
            let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
            assert!((norm - 1.0).abs() < 1e-5);
        }
    }

    #[tokio::test]
    async fn http_provider_parses_endpoint_response() {
        let server = httpmock::MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(httpmock::Method::POST).path("/v1/embeddings");
            then.status(200).json_body(serde_json::json!({
                "data": [
                    {"embedding": [3.0, 4.0]},
                ],
            }));
        });

        let provider =
            HttpEmbeddingProvider::new(server.url("/v1"), None, "test-model", 2, 512);
        let vectors = provider
            .embed_batch(&["hello".to_string()])
            .await
            .unwrap();

        mock.assert();
        assert_eq!(vectors.len(), 1);
        // 3-4-5 triangle normalizes to (0.6, 0.8).
        assert!((vectors[0][0] - 0.6).abs() < 1e-6);
        assert!((vectors[0][1] - 0.8).abs() < 1e-6);
    }
}
