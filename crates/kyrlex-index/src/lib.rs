//! Statute retrieval for kyrlex.
//!
//! This crate provides:
//! - The chunk model and the [`ChunkStore`] seam, with an in-memory embedding store (cosine + MMR)
//! - Embedding generation via OpenAI-compatible `/embeddings` endpoints
//! - BM25 keyword search and hybrid (dense + keyword) candidate gathering
//! - Legal synonym query expansion
//! - Prefix-fingerprint deduplication and cross-encoder reranking
//! - Context assembly grouped by source law, memoized in a bounded result cache

pub mod cache;
pub mod chunk;
pub mod context;
pub mod dedup;
pub mod embeddings;
pub mod expansion;
pub mod pipeline;
pub mod reranker;
pub mod search;
pub mod store;

// Re-exports
pub use cache::ResultCache;
pub use chunk::{Candidate, Channel, Chunk};
pub use context::{AssembledContext, ContextAssembler};
pub use dedup::{deduplicate, fingerprint};
pub use embeddings::{EmbeddingProvider, OpenAiCompatibleEmbeddings};
pub use expansion::expand_query;
pub use pipeline::{ContextPipeline, RetrievedContext};
pub use reranker::{rerank_candidates, CrossEncoderReranker, Reranker, RerankerDoc};
pub use search::{BM25Index, HybridRetriever, RetrievalError, SearchConfig};
pub use store::{ChunkStore, InMemoryChunkStore};

/// Default retrieval breadth
pub const DEFAULT_K: usize = 8;
