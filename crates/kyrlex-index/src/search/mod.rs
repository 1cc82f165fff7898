//! Hybrid retrieval combining dense and BM25 keyword search.
//!
//! Every expanded query variant runs a diversity-aware (MMR) dense search, falling back
//! to plain nearest-neighbour search if MMR fails. The original question additionally
//! runs once through the BM25 channel, capped at `k / 3` results. Channel outputs are
//! concatenated, dense first; there is no score fusion at this stage.

pub mod bm25;

pub use bm25::BM25Index;

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::chunk::{Candidate, Chunk};
use crate::store::ChunkStore;

/// Failures of a single retrieval channel. None of these abort retrieval.
#[derive(Error, Debug)]
pub enum RetrievalError {
    #[error("diversity search failed: {0}")]
    DiversitySearch(String),

    #[error("similarity search failed: {0}")]
    SimilaritySearch(String),

    #[error("keyword index unavailable: {0}")]
    KeywordIndex(String),

    #[error("reranking failed: {0}")]
    Rerank(String),
}

/// Configuration for hybrid search.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// Enable the BM25 keyword channel
    pub use_bm25: bool,
    /// Dense MMR candidates fetched per selected result
    pub fetch_multiplier: usize,
    /// Keyword results are capped at k / sparse_divisor
    pub sparse_divisor: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            use_bm25: true,
            fetch_multiplier: 2,
            sparse_divisor: 3,
        }
    }
}

/// The BM25 index together with the corpus it was built from.
struct KeywordCorpus {
    index: BM25Index,
    chunks: Vec<Chunk>,
}

/// Hybrid retriever over a [`ChunkStore`].
pub struct HybridRetriever<S: ChunkStore + ?Sized> {
    config: SearchConfig,
    store: Arc<S>,
    /// Built on first keyword search, then shared read-only
    keyword: OnceCell<KeywordCorpus>,
}

impl<S: ChunkStore + ?Sized> HybridRetriever<S> {
    pub fn new(config: SearchConfig, store: Arc<S>) -> Self {
        Self {
            config,
            store,
            keyword: OnceCell::new(),
        }
    }

    /// Gather candidates for `query` and its expanded `variants`.
    ///
    /// `variants` should contain the original query first. Channel failures are
    /// logged and skipped, so this never fails.
    pub async fn retrieve(&self, query: &str, variants: &[String], k: usize) -> Vec<Candidate> {
        let mut pool = Vec::new();

        for variant in variants {
            pool.extend(self.dense(variant, k).await);
        }

        if self.config.use_bm25 {
            match self.sparse(query, k).await {
                Ok(candidates) => {
                    debug!("BM25 contributed {} candidates", candidates.len());
                    pool.extend(candidates);
                }
                Err(e) => warn!("BM25 search failed: {}", e),
            }
        }

        pool
    }

    /// Dense search for one query string: MMR first, plain top-k as fallback.
    pub async fn dense(&self, query: &str, k: usize) -> Vec<Candidate> {
        let fetch_k = k * self.config.fetch_multiplier;

        let chunks = match self.store.diversity_search(query, k, fetch_k).await {
            Ok(chunks) => chunks,
            Err(e) => {
                warn!(
                    "{}, falling back to similarity search",
                    RetrievalError::DiversitySearch(e.to_string())
                );
                match self.store.similarity_search(query, k).await {
                    Ok(chunks) => chunks,
                    Err(e) => {
                        warn!("{}", RetrievalError::SimilaritySearch(e.to_string()));
                        Vec::new()
                    }
                }
            }
        };

        chunks.into_iter().map(Candidate::dense).collect()
    }

    /// BM25 search for the original question, top `k / sparse_divisor`.
    pub async fn sparse(&self, query: &str, k: usize) -> Result<Vec<Candidate>, RetrievalError> {
        let limit = k / self.config.sparse_divisor.max(1);
        if limit == 0 {
            return Ok(Vec::new());
        }

        let corpus = self.keyword_corpus().await?;
        Ok(corpus
            .index
            .top_n(query, limit)
            .into_iter()
            .map(|(pos, score)| Candidate::sparse(corpus.chunks[pos].clone(), score))
            .collect())
    }

    async fn keyword_corpus(&self) -> Result<&KeywordCorpus, RetrievalError> {
        self.keyword
            .get_or_try_init(|| async {
                let chunks = self
                    .store
                    .corpus()
                    .await
                    .map_err(|e| RetrievalError::KeywordIndex(e.to_string()))?;
                let index = BM25Index::from_corpus(chunks.iter().map(|c| c.content.as_str()));
                info!("Built BM25 index over {} chunks", index.len());
                Ok(KeywordCorpus { index, chunks })
            })
            .await
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }
}
