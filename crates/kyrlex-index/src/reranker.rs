//! Cross-encoder reranking of the deduplicated candidate pool.
//!
//! A [`Reranker`] scores (query, document) pairs jointly. [`rerank_candidates`] applies it
//! to a bounded prefix of the pool and keeps the best `k`, falling back to pool order
//! whenever the scorer fails.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::chunk::Candidate;
use crate::search::RetrievalError;

/// A document to be reranked.
#[derive(Debug, Clone)]
pub struct RerankerDoc {
    pub content: String,
}

/// Trait for pairwise relevance scoring.
#[async_trait]
pub trait Reranker: Send + Sync {
    /// Score each document against the query; one score per document, in input order.
    async fn predict(&self, query: &str, documents: &[RerankerDoc]) -> Result<Vec<f32>>;
}

/// Client for a cross-encoder server exposing `POST /rerank`
/// (text-embeddings-inference and compatible servers).
pub struct CrossEncoderReranker {
    client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl CrossEncoderReranker {
    pub fn new(base_url: String, model: String, api_key: Option<String>) -> Self {
        Self {
            client: Client::new(),
            base_url,
            model,
            api_key,
        }
    }

    /// Map `[{index, score}]` entries back onto input order.
    fn scores_in_order(entries: Vec<RerankEntry>, expected: usize) -> Result<Vec<f32>> {
        let mut scores: Vec<Option<f32>> = vec![None; expected];
        for entry in entries {
            let slot = scores
                .get_mut(entry.index)
                .ok_or_else(|| anyhow!("Reranker returned out-of-range index {}", entry.index))?;
            *slot = Some(entry.score);
        }
        scores
            .into_iter()
            .enumerate()
            .map(|(i, s)| s.ok_or_else(|| anyhow!("Reranker returned no score for document {}", i)))
            .collect()
    }
}

#[derive(Serialize)]
struct RerankRequest<'a> {
    model: &'a str,
    query: &'a str,
    texts: Vec<&'a str>,
    raw_scores: bool,
}

#[derive(Deserialize)]
struct RerankEntry {
    index: usize,
    score: f32,
}

#[async_trait]
impl Reranker for CrossEncoderReranker {
    async fn predict(&self, query: &str, documents: &[RerankerDoc]) -> Result<Vec<f32>> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/rerank", self.base_url.trim_end_matches('/'));
        let request = RerankRequest {
            model: &self.model,
            query,
            texts: documents.iter().map(|d| d.content.as_str()).collect(),
            raw_scores: false,
        };

        let mut req_builder = self.client.post(&url).json(&request);
        if let Some(key) = &self.api_key {
            req_builder = req_builder.bearer_auth(key);
        }

        let response = req_builder
            .send()
            .await
            .map_err(|e| anyhow!("Reranker request failed: {}", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(anyhow!("Reranker API error {}: {}", status, body));
        }

        let entries: Vec<RerankEntry> = response
            .json()
            .await
            .map_err(|e| anyhow!("Failed to parse reranker response: {}", e))?;

        debug!(documents = documents.len(), "Reranker scored documents");
        Self::scores_in_order(entries, documents.len())
    }
}

/// Select the `k` most relevant candidates.
///
/// Reranking only happens when a reranker is supplied and the pool is larger than `k`.
/// At most `top_n` leading pool entries are scored. Ties keep pool order. If scoring
/// fails, the first `k` pool entries are returned unchanged.
pub async fn rerank_candidates(
    reranker: Option<&dyn Reranker>,
    query: &str,
    mut pool: Vec<Candidate>,
    k: usize,
    top_n: usize,
) -> Vec<Candidate> {
    let reranker = match reranker {
        Some(r) if pool.len() > k => r,
        _ => {
            pool.truncate(k);
            return pool;
        }
    };

    let considered = top_n.min(pool.len());
    let docs: Vec<RerankerDoc> = pool[..considered]
        .iter()
        .map(|c| RerankerDoc {
            content: c.chunk.content.clone(),
        })
        .collect();

    let scores = match reranker.predict(query, &docs).await {
        Ok(scores) if scores.len() == considered => scores,
        Ok(scores) => {
            warn!(
                expected = considered,
                got = scores.len(),
                "Reranker returned wrong number of scores, using original order"
            );
            pool.truncate(k);
            return pool;
        }
        Err(e) => {
            warn!("{}, using original order", RetrievalError::Rerank(e.to_string()));
            pool.truncate(k);
            return pool;
        }
    };

    let mut ranked: Vec<usize> = (0..considered).collect();
    // Stable sort: equal scores keep pool order
    ranked.sort_by(|&a, &b| {
        scores[b]
            .partial_cmp(&scores[a])
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    ranked.truncate(k);

    debug!("Reranked {} docs to top {}", pool.len(), ranked.len());

    let mut slots: Vec<Option<Candidate>> = pool.into_iter().map(Some).collect();
    ranked
        .into_iter()
        .filter_map(|i| slots[i].take())
        .collect()
}
