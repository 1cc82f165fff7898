//! End-to-end context retrieval for one question.
//!
//! cache → expansion → hybrid search → dedup → rerank → assembly → cache write

use std::sync::Arc;

use tracing::{debug, info};

use crate::cache::ResultCache;
use crate::context::ContextAssembler;
use crate::dedup::deduplicate;
use crate::expansion::expand_query;
use crate::reranker::{rerank_candidates, Reranker};
use crate::search::HybridRetriever;
use crate::store::ChunkStore;

/// Default number of pool entries the reranker scores.
pub const DEFAULT_RERANK_TOP_N: usize = 15;

/// Context produced for a question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrievedContext {
    pub text: String,
    /// True when served from the result cache
    pub cached: bool,
    /// Distinct source laws in the context; 0 on cache hits
    pub sources: usize,
    /// Chunks rendered into the context; 0 on cache hits
    pub chunks: usize,
}

pub struct ContextPipeline {
    retriever: HybridRetriever<dyn ChunkStore>,
    reranker: Option<Arc<dyn Reranker>>,
    assembler: ContextAssembler,
    cache: Arc<ResultCache>,
    rerank_top_n: usize,
}

impl ContextPipeline {
    pub fn new(retriever: HybridRetriever<dyn ChunkStore>, cache: Arc<ResultCache>) -> Self {
        Self {
            retriever,
            reranker: None,
            assembler: ContextAssembler::default(),
            cache,
            rerank_top_n: DEFAULT_RERANK_TOP_N,
        }
    }

    /// Enable cross-encoder reranking of the first `top_n` pool entries.
    pub fn with_reranker(mut self, reranker: Arc<dyn Reranker>, top_n: usize) -> Self {
        self.reranker = Some(reranker);
        self.rerank_top_n = top_n;
        self
    }

    pub fn with_assembler(mut self, assembler: ContextAssembler) -> Self {
        self.assembler = assembler;
        self
    }

    pub fn cache(&self) -> &Arc<ResultCache> {
        &self.cache
    }

    /// Build the prompt context for `query` from at most `k` chunks.
    ///
    /// Never fails: degraded channels shrink the candidate pool, and an empty pool
    /// yields an empty context.
    pub async fn retrieve(&self, query: &str, k: usize) -> RetrievedContext {
        if let Some(text) = self.cache.get(query, k) {
            debug!("Context cache hit");
            return RetrievedContext {
                text,
                cached: true,
                sources: 0,
                chunks: 0,
            };
        }

        let variants = expand_query(query);
        debug!("Expanded query into {} variants", variants.len());

        let pool = self.retriever.retrieve(query, &variants, k).await;
        let pool_size = pool.len();
        let unique = deduplicate(pool);
        debug!("Deduplicated {} candidates to {}", pool_size, unique.len());

        let selected = rerank_candidates(
            self.reranker.as_deref(),
            query,
            unique,
            k,
            self.rerank_top_n,
        )
        .await;

        let chunks: Vec<_> = selected.into_iter().map(|c| c.chunk).collect();
        let context = self.assembler.assemble(&chunks);
        info!(
            "Relevant sources: {}, Total chunks: {}",
            context.sources, context.chunks
        );

        self.cache.insert(query, k, context.text.clone());

        RetrievedContext {
            text: context.text,
            cached: false,
            sources: context.sources,
            chunks: context.chunks,
        }
    }
}
