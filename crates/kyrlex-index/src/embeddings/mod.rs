//! Embedding provider trait and an OpenAI-compatible HTTP implementation.
//!
//! Statute chunks and queries are embedded with the same multilingual model so that
//! Russian statute text can be matched against Kyrgyz, Russian or English questions.

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

/// Errors that can occur during embedding generation.
#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("API request failed ({status}): {body}")]
    ApiError { status: u16, body: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Rate limited after {0} retries")]
    RateLimited(u32),

    #[error("Network error: {0}")]
    NetworkError(String),
}

/// Trait for embedding providers.
///
/// Implementations should be Send + Sync to allow use in async contexts.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed multiple texts in a batch
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Get the number of dimensions
    fn dimensions(&self) -> usize;

    /// Get the model name
    fn model_name(&self) -> &str;
}

#[derive(Serialize)]
struct EmbeddingRequest {
    model: String,
    input: Vec<String>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

/// Embeddings served by any OpenAI-compatible `/embeddings` endpoint
/// (text-embeddings-inference, LM Studio, vLLM, OpenRouter).
pub struct OpenAiCompatibleEmbeddings {
    api_key: Option<String>,
    model: String,
    dimensions: usize,
    batch_size: usize,
    client: Client,
    base_url: String,
}

impl OpenAiCompatibleEmbeddings {
    pub fn new(
        base_url: String,
        model: String,
        dimensions: usize,
        api_key: Option<String>,
    ) -> Self {
        Self {
            api_key,
            model,
            dimensions,
            batch_size: 32,
            client: Client::new(),
            base_url,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Send embedding request with retry logic for rate limits.
    async fn send_request(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let expected = texts.len();
        let request_body = EmbeddingRequest {
            model: self.model.clone(),
            input: texts,
        };

        let mut retry_count = 0;
        let max_retries = 3;
        let mut backoff_secs = 1u64;

        loop {
            debug!(
                "Sending embedding request for {} texts to {}",
                expected, self.base_url
            );

            let mut req_builder = self.client.post(&self.base_url).json(&request_body);
            if let Some(key) = &self.api_key {
                req_builder = req_builder.bearer_auth(key);
            }

            let response = req_builder
                .send()
                .await
                .map_err(|e| EmbeddingError::NetworkError(e.to_string()))?;

            let status = response.status();

            if status.is_success() {
                let embedding_response: EmbeddingResponse = response
                    .json()
                    .await
                    .map_err(|e| EmbeddingError::InvalidResponse(e.to_string()))?;

                if embedding_response.data.len() != expected {
                    return Err(EmbeddingError::InvalidResponse(format!(
                        "expected {} embeddings, got {}",
                        expected,
                        embedding_response.data.len()
                    ))
                    .into());
                }

                // Sort by index to ensure correct order
                let mut embeddings: Vec<(usize, Vec<f32>)> = embedding_response
                    .data
                    .into_iter()
                    .map(|d| (d.index, d.embedding))
                    .collect();
                embeddings.sort_by_key(|(idx, _)| *idx);

                return Ok(embeddings.into_iter().map(|(_, emb)| emb).collect());
            }

            if status.as_u16() == 429 {
                retry_count += 1;
                if retry_count > max_retries {
                    return Err(EmbeddingError::RateLimited(max_retries).into());
                }

                let retry_after = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| s.parse::<u64>().ok())
                    .unwrap_or(backoff_secs);

                warn!(
                    "Rate limited, retrying after {} seconds (attempt {}/{})",
                    retry_after, retry_count, max_retries
                );

                tokio::time::sleep(tokio::time::Duration::from_secs(retry_after)).await;
                backoff_secs *= 2;
                continue;
            }

            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(EmbeddingError::ApiError {
                status: status.as_u16(),
                body,
            }
            .into());
        }
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiCompatibleEmbeddings {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let embeddings = self.embed_batch(&[text.to_string()]).await?;
        embeddings
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("No embedding returned"))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        debug!("Embedding batch of {} texts", texts.len());
        let mut all = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            all.extend(self.send_request(batch.to_vec()).await?);
        }
        Ok(all)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_creation() {
        let provider = OpenAiCompatibleEmbeddings::new(
            "http://localhost:8080/v1/embeddings".to_string(),
            "sentence-transformers/paraphrase-multilingual-MiniLM-L12-v2".to_string(),
            384,
            None,
        );
        assert_eq!(provider.dimensions(), 384);
        assert_eq!(
            provider.model_name(),
            "sentence-transformers/paraphrase-multilingual-MiniLM-L12-v2"
        );
        assert_eq!(provider.batch_size, 32);
    }

    #[test]
    fn test_batch_size_floor() {
        let provider = OpenAiCompatibleEmbeddings::new(
            "http://localhost:8080".to_string(),
            "m".to_string(),
            8,
            Some("key".to_string()),
        )
        .with_batch_size(0);
        assert_eq!(provider.batch_size, 1);
    }

    #[tokio::test]
    async fn test_empty_batch_skips_request() {
        let provider = OpenAiCompatibleEmbeddings::new(
            "http://127.0.0.1:9/unreachable".to_string(),
            "m".to_string(),
            8,
            None,
        );
        let result = provider.embed_batch(&[]).await.unwrap();
        assert!(result.is_empty());
    }
}
