//! Integration tests for kyrlex-index.
//!
//! These tests drive the public retrieval API end to end: a chunks file on disk, the
//! in-memory store, hybrid search, reranking and context assembly.

use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tempfile::tempdir;

use kyrlex_index::store::read_chunks_file;
use kyrlex_index::{
    Chunk, ChunkStore, ContextPipeline, EmbeddingProvider, HybridRetriever, InMemoryChunkStore,
    Reranker, RerankerDoc, ResultCache, SearchConfig,
};

const CHUNKS: &str = r#"{"source_file": "Гражданский_кодекс.txt", "content": "Статья 87. Общество с ограниченной ответственностью создается одним или несколькими лицами."}
{"source_file": "Гражданский_кодекс.txt", "content": "Статья 88. Участники несут риск убытков в пределах стоимости вкладов."}

{"source_file": "Трудовой_кодекс.txt", "content": "Статья 20. Трудовой договор заключается в письменной форме."}
{"source_file": "Трудовой_кодекс.txt", "content": "Статья 21. Работник имеет право на ежегодный оплачиваемый отпуск."}
{"source_file": "Налоговый_кодекс.txt", "content": "Статья 5. Налог уплачивается ежегодно.", "law_name": "Налоговый кодекс Кыргызской Республики"}
{"source_file": "Налоговый_кодекс.txt", "content": "Налоговая декларация подается в установленный срок."}
"#;

/// Topic-marker embeddings: one dimension per marker plus a constant bias.
struct TopicEmbeddings;

#[async_trait]
impl EmbeddingProvider for TopicEmbeddings {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let lower = text.to_lowercase();
        let mut vector: Vec<f32> = ["обществ", "труд", "налог"]
            .iter()
            .map(|m| if lower.contains(m) { 1.0 } else { 0.0 })
            .collect();
        vector.push(0.1);
        Ok(vector)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }

    fn dimensions(&self) -> usize {
        4
    }

    fn model_name(&self) -> &str {
        "topic-markers"
    }
}

async fn load_store() -> Arc<dyn ChunkStore> {
    let dir = tempdir().unwrap();
    let path = dir.path().join("chunks.jsonl");
    fs::write(&path, CHUNKS).unwrap();

    let store = InMemoryChunkStore::load_jsonl(Arc::new(TopicEmbeddings), &path, 0.5)
        .await
        .unwrap();
    assert_eq!(store.len(), 6);
    Arc::new(store)
}

fn pipeline(store: Arc<dyn ChunkStore>) -> ContextPipeline {
    ContextPipeline::new(
        HybridRetriever::new(SearchConfig::default(), store),
        Arc::new(ResultCache::default()),
    )
}

#[test]
fn test_chunks_file_provenance() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("chunks.jsonl");
    fs::write(&path, CHUNKS).unwrap();

    let chunks = read_chunks_file(&path).unwrap();
    assert_eq!(chunks.len(), 6);

    assert_eq!(chunks[0].law_name, "Гражданский кодекс");
    assert_eq!(chunks[0].article_number.as_deref(), Some("87"));
    // Explicit law name wins over the file-derived one
    assert_eq!(chunks[4].law_name, "Налоговый кодекс Кыргызской Республики");
    assert!(chunks[5].article_number.is_none());
}

#[test]
fn test_malformed_chunks_file_is_rejected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("chunks.jsonl");
    fs::write(&path, "{\"source_file\": \"a.txt\"}\n").unwrap();

    let err = read_chunks_file(&path).unwrap_err();
    assert!(err.to_string().contains("line 1"));
}

#[tokio::test]
async fn test_llc_question_cites_civil_code() {
    let pipeline = pipeline(load_store().await);

    let ctx = pipeline
        .retrieve("общество с ограниченной ответственностью", 3)
        .await;

    assert!(!ctx.cached);
    assert!(ctx.text.starts_with("=== Гражданский кодекс ==="));
    assert!(ctx.text.contains("[Статья 87] Статья 87. Общество с ограниченной"));
    assert!(ctx.chunks <= 3);
}

#[tokio::test]
async fn test_repeat_question_served_from_cache() {
    let pipeline = pipeline(load_store().await);

    let first = pipeline.retrieve("трудовой договор", 4).await;
    let second = pipeline.retrieve("трудовой договор", 4).await;

    assert!(second.cached);
    assert_eq!(first.text, second.text);
    assert_eq!(pipeline.cache().len(), 1);
}

#[tokio::test]
async fn test_context_lines_are_single_spaced() {
    let pipeline = pipeline(load_store().await);
    let ctx = pipeline.retrieve("права работника", 8).await;

    for line in ctx.text.lines() {
        assert!(!line.contains("  "), "double space in {line:?}");
    }
    // No source contributes more than three chunks
    for block in ctx.text.split("=== ").filter(|b| !b.is_empty()) {
        let chunk_lines = block.lines().skip(1).filter(|l| !l.is_empty()).count();
        assert!(chunk_lines <= 3);
    }
}

/// Store with fixed dense results and a corpus holding one extra keyword match.
struct StaticStore;

fn labor(content: &str) -> Chunk {
    Chunk::from_source("Трудовой_кодекс.txt", content)
}

fn civil(content: &str) -> Chunk {
    Chunk::from_source("Гражданский_кодекс.txt", content)
}

#[async_trait]
impl ChunkStore for StaticStore {
    async fn similarity_search(&self, query: &str, k: usize) -> Result<Vec<Chunk>> {
        self.diversity_search(query, k, 2 * k).await
    }

    async fn diversity_search(&self, _query: &str, k: usize, _fetch_k: usize) -> Result<Vec<Chunk>> {
        let dense = vec![
            civil("Статья 1. Гражданское законодательство."),
            civil("Статья 2. Отношения, регулируемые гражданским законодательством."),
            labor("Статья 20. Трудовой договор заключается в письменной форме."),
        ];
        Ok(dense.into_iter().take(k).collect())
    }

    async fn corpus(&self) -> Result<Vec<Chunk>> {
        Ok(vec![
            civil("Статья 1. Гражданское законодательство."),
            labor("Статья 95. Отпуск предоставляется ежегодно."),
            labor("Статья 20. Трудовой договор заключается в письменной форме."),
        ])
    }
}

/// Prefers labor-code text and records how many documents it saw.
#[derive(Default)]
struct LaborFirst {
    seen: AtomicUsize,
}

#[async_trait]
impl Reranker for LaborFirst {
    async fn predict(&self, _query: &str, documents: &[RerankerDoc]) -> Result<Vec<f32>> {
        self.seen.fetch_add(documents.len(), Ordering::SeqCst);
        Ok(documents
            .iter()
            .map(|d| if d.content.contains("Отпуск") { 2.0 } else if d.content.contains("Трудовой") { 1.0 } else { 0.0 })
            .collect())
    }
}

#[tokio::test]
async fn test_reranker_reorders_merged_pool() {
    let reranker = Arc::new(LaborFirst::default());
    let store: Arc<dyn ChunkStore> = Arc::new(StaticStore);
    let pipeline = ContextPipeline::new(
        HybridRetriever::new(SearchConfig::default(), store),
        Arc::new(ResultCache::default()),
    )
    .with_reranker(reranker.clone(), 15);

    // Three dense hits plus the keyword-only "отпуск" chunk exceed k = 3
    let ctx = pipeline.retrieve("отпуск", 3).await;

    assert_eq!(reranker.seen.load(Ordering::SeqCst), 4);
    assert!(ctx.text.starts_with("=== Трудовой кодекс ===\n[Статья 95]"));
    assert!(ctx.text.contains("[Статья 20]"));
    assert!(ctx.text.contains("[Статья 1]"));
    assert!(!ctx.text.contains("[Статья 2]"));
}
