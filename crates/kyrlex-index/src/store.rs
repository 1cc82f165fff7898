//! The chunk store: dense search over embedded statute chunks.
//!
//! [`ChunkStore`] is the seam the retriever talks to. [`InMemoryChunkStore`] is the
//! bundled implementation: it keeps every chunk with its embedding in memory and
//! answers plain top-k cosine queries and Maximal Marginal Relevance (MMR) queries:
//!
//! MMR = λ × sim(query, doc) - (1-λ) × max sim(doc, selected)

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

use crate::chunk::{article_number_in, law_name_from_file, Chunk};
use crate::embeddings::EmbeddingProvider;

/// Read access to an immutable, pre-chunked statute corpus.
///
/// Implementations must be safe for concurrent reads.
#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// The `k` chunks nearest to the query in embedding space.
    async fn similarity_search(&self, query: &str, k: usize) -> Result<Vec<Chunk>>;

    /// Fetch `fetch_k` nearest neighbours and pick `k` of them balancing relevance
    /// against mutual diversity.
    async fn diversity_search(&self, query: &str, k: usize, fetch_k: usize) -> Result<Vec<Chunk>>;

    /// Every chunk in corpus order.
    async fn corpus(&self) -> Result<Vec<Chunk>>;
}

/// One line of a chunks file.
#[derive(Debug, Deserialize)]
struct ChunkRecord {
    source_file: String,
    content: String,
    #[serde(default)]
    law_name: Option<String>,
    #[serde(default)]
    article_number: Option<String>,
}

impl From<ChunkRecord> for Chunk {
    fn from(record: ChunkRecord) -> Self {
        let law_name = record
            .law_name
            .unwrap_or_else(|| law_name_from_file(&record.source_file));
        let article_number = record
            .article_number
            .or_else(|| article_number_in(&record.content));
        Chunk {
            content: record.content,
            source_file: record.source_file,
            law_name,
            article_number,
        }
    }
}

/// In-memory chunk store with cosine similarity and MMR search.
pub struct InMemoryChunkStore<E: EmbeddingProvider + ?Sized> {
    embeddings: Arc<E>,
    chunks: Vec<Chunk>,
    vectors: Vec<Vec<f32>>,
    /// MMR trade-off: 1.0 is pure relevance, 0.0 is pure diversity
    lambda: f32,
}

impl<E: EmbeddingProvider + ?Sized> InMemoryChunkStore<E> {
    /// Build a store from already-embedded chunks.
    pub fn from_parts(
        embeddings: Arc<E>,
        chunks: Vec<Chunk>,
        vectors: Vec<Vec<f32>>,
        lambda: f32,
    ) -> Result<Self> {
        if chunks.len() != vectors.len() {
            return Err(anyhow!(
                "chunk/vector count mismatch: {} chunks, {} vectors",
                chunks.len(),
                vectors.len()
            ));
        }
        if !(0.0..=1.0).contains(&lambda) {
            return Err(anyhow!("MMR lambda must be in [0, 1], got {}", lambda));
        }
        Ok(Self {
            embeddings,
            chunks,
            vectors,
            lambda,
        })
    }

    /// Embed the given chunks and build a store from them.
    pub async fn from_chunks(embeddings: Arc<E>, chunks: Vec<Chunk>, lambda: f32) -> Result<Self> {
        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let vectors = embeddings
            .embed_batch(&texts)
            .await
            .context("Failed to embed statute chunks")?;
        debug!(
            "Embedded {} chunks with {}",
            chunks.len(),
            embeddings.model_name()
        );
        Self::from_parts(embeddings, chunks, vectors, lambda)
    }

    /// Load a JSON-lines chunks file (`{"source_file", "content", "law_name"?, "article_number"?}`)
    /// and embed every chunk.
    pub async fn load_jsonl(embeddings: Arc<E>, path: &Path, lambda: f32) -> Result<Self> {
        let chunks = read_chunks_file(path)?;
        info!("Loaded {} chunks from {}", chunks.len(), path.display());
        Self::from_chunks(embeddings, chunks, lambda).await
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Indices of the `n` most similar chunks, most similar first.
    fn nearest(&self, query_vector: &[f32], n: usize) -> Vec<(usize, f32)> {
        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(idx, v)| (idx, cosine_similarity(query_vector, v)))
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(n);
        scored
    }
}

#[async_trait]
impl<E: EmbeddingProvider + ?Sized> ChunkStore for InMemoryChunkStore<E> {
    async fn similarity_search(&self, query: &str, k: usize) -> Result<Vec<Chunk>> {
        let query_vector = self.embeddings.embed(query).await?;
        Ok(self
            .nearest(&query_vector, k)
            .into_iter()
            .map(|(idx, _)| self.chunks[idx].clone())
            .collect())
    }

    async fn diversity_search(&self, query: &str, k: usize, fetch_k: usize) -> Result<Vec<Chunk>> {
        let query_vector = self.embeddings.embed(query).await?;
        let candidates = self.nearest(&query_vector, fetch_k.max(k));
        let selected = mmr_select(&candidates, &self.vectors, k, self.lambda);
        Ok(selected
            .into_iter()
            .map(|idx| self.chunks[idx].clone())
            .collect())
    }

    async fn corpus(&self) -> Result<Vec<Chunk>> {
        Ok(self.chunks.clone())
    }
}

/// Parse a JSON-lines chunks file. Blank lines are skipped.
pub fn read_chunks_file(path: &Path) -> Result<Vec<Chunk>> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open chunks file {}", path.display()))?;
    let mut chunks = Vec::new();
    for (line_no, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record: ChunkRecord = serde_json::from_str(&line)
            .with_context(|| format!("Invalid chunk record at line {}", line_no + 1))?;
        chunks.push(record.into());
    }
    Ok(chunks)
}

/// Greedy MMR selection over `candidates` (index, query similarity), most relevant first.
///
/// Returns indices into `vectors` in selection order.
pub fn mmr_select(
    candidates: &[(usize, f32)],
    vectors: &[Vec<f32>],
    k: usize,
    lambda: f32,
) -> Vec<usize> {
    if k == 0 || candidates.is_empty() {
        return Vec::new();
    }

    let mut remaining: Vec<(usize, f32)> = candidates.to_vec();
    let mut selected: Vec<usize> = Vec::with_capacity(k.min(candidates.len()));

    while selected.len() < k && !remaining.is_empty() {
        let mut best_pos = 0;
        let mut best_score = f32::NEG_INFINITY;

        for (pos, (idx, relevance)) in remaining.iter().enumerate() {
            let redundancy = selected
                .iter()
                .map(|&s| cosine_similarity(&vectors[*idx], &vectors[s]))
                .fold(f32::NEG_INFINITY, f32::max);
            let redundancy = if selected.is_empty() { 0.0 } else { redundancy };
            let score = lambda * relevance - (1.0 - lambda) * redundancy;
            if score > best_score {
                best_score = score;
                best_pos = pos;
            }
        }

        let (idx, _) = remaining.remove(best_pos);
        selected.push(idx);
    }

    selected
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}
