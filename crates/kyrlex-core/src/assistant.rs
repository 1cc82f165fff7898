//! The legal assistant: retrieval and answer synthesis behind one call.

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use kyrlex_config::{resolve_api_key, Config, GenerationConfig};
use kyrlex_index::{
    ChunkStore, ContextAssembler, ContextPipeline, CrossEncoderReranker, HybridRetriever,
    InMemoryChunkStore, OpenAiCompatibleEmbeddings, ResultCache, SearchConfig, DEFAULT_K,
};
use kyrlex_providers::{GeminiProvider, GenerationService, ProviderPool};
use tracing::{debug, info};

use crate::generator::AnswerGenerator;
use crate::history::ConversationHistory;
use crate::streaming::{AnswerStream, StreamingAnswerer};

/// Answer to one question plus how its context was obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssistantReply {
    pub answer: String,
    /// Statute context the answer was generated from
    pub context: String,
    pub cached: bool,
    pub sources: usize,
    pub chunks: usize,
}

/// Streamed answer to one question.
pub struct StreamingReply {
    pub fragments: AnswerStream,
    pub cached: bool,
    pub sources: usize,
    pub chunks: usize,
}

pub struct LegalAssistant {
    pipeline: ContextPipeline,
    generator: AnswerGenerator,
    streamer: StreamingAnswerer,
    k: usize,
}

impl LegalAssistant {
    pub fn new(
        pipeline: ContextPipeline,
        generator: AnswerGenerator,
        streamer: StreamingAnswerer,
    ) -> Self {
        Self {
            pipeline,
            generator,
            streamer,
            k: DEFAULT_K,
        }
    }

    pub fn with_k(mut self, k: usize) -> Self {
        self.k = k;
        self
    }

    pub fn k(&self) -> usize {
        self.k
    }

    /// Wire up the full assistant from configuration.
    ///
    /// Loads and embeds the chunks file, so this performs network calls.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let embeddings = Arc::new(
            OpenAiCompatibleEmbeddings::new(
                config.embeddings.base_url.clone(),
                config.embeddings.model.clone(),
                config.embeddings.dimensions,
                resolve_api_key(&config.embeddings.api_key),
            )
            .with_batch_size(config.embeddings.batch_size),
        );

        let chunks_path = config.store.resolved_chunks_path();
        let store = InMemoryChunkStore::load_jsonl(embeddings, &chunks_path, config.retrieval.mmr_lambda)
            .await
            .with_context(|| format!("Failed to load chunk store from {}", chunks_path.display()))?;
        info!("Chunk store ready with {} chunks", store.len());
        let store: Arc<dyn ChunkStore> = Arc::new(store);

        let search = SearchConfig {
            use_bm25: config.retrieval.use_bm25,
            ..SearchConfig::default()
        };
        let mut pipeline = ContextPipeline::new(
            HybridRetriever::new(search, store),
            Arc::new(ResultCache::new(config.retrieval.cache_capacity)),
        )
        .with_assembler(ContextAssembler::new(config.retrieval.max_chunks_per_source));

        if config.retrieval.use_reranking {
            debug!("Reranking enabled with {}", config.reranker.model);
            let reranker = CrossEncoderReranker::new(
                config.reranker.base_url.clone(),
                config.reranker.model.clone(),
                resolve_api_key(&config.reranker.api_key),
            );
            pipeline = pipeline.with_reranker(Arc::new(reranker), config.retrieval.rerank_top_n);
        }

        let pool = Arc::new(gemini_pool(&config.generation)?);
        let generator = AnswerGenerator::from_config(Arc::clone(&pool), &config.generation, &config.validation);
        let streamer = StreamingAnswerer::from_config(pool, &config.generation, &config.validation);

        Ok(Self::new(pipeline, generator, streamer).with_k(config.retrieval.k))
    }

    /// Retrieve context for `question` and generate an answer.
    ///
    /// Generation failures surface as an apology in the answer text, never as an error.
    pub async fn ask(&self, question: &str, history: &ConversationHistory) -> AssistantReply {
        let context = self.pipeline.retrieve(question, self.k).await;
        let answer = self
            .generator
            .answer(question, &context.text, &history.render())
            .await;

        AssistantReply {
            answer,
            context: context.text,
            cached: context.cached,
            sources: context.sources,
            chunks: context.chunks,
        }
    }

    /// Answer text only.
    pub async fn answer(&self, question: &str, history: &ConversationHistory) -> String {
        self.ask(question, history).await.answer
    }

    /// Retrieve context, then stream the answer as it is generated.
    pub async fn ask_stream(&self, question: &str, history: &ConversationHistory) -> StreamingReply {
        let context = self.pipeline.retrieve(question, self.k).await;
        let fragments = self
            .streamer
            .answer_stream(question, &context.text, &history.render());

        StreamingReply {
            fragments,
            cached: context.cached,
            sources: context.sources,
            chunks: context.chunks,
        }
    }
}

/// Provider pool creating one Gemini client per requested temperature.
fn gemini_pool(config: &GenerationConfig) -> Result<ProviderPool> {
    let api_key = resolve_api_key(&config.api_key)
        .ok_or_else(|| anyhow!("Gemini API key is not configured (set GEMINI_API_KEY or generation.api_key)"))?;
    let config = config.clone();

    Ok(ProviderPool::new(move |temperature| {
        let provider = GeminiProvider::new(
            api_key.clone(),
            Some(config.model.clone()),
            config.base_url.clone(),
            Some(config.max_output_tokens),
            Some(temperature),
        )?
        .with_sampling(config.top_p, config.top_k);
        Ok(Arc::new(provider) as Arc<dyn GenerationService>)
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_pool_requires_api_key() {
        std::env::remove_var("KYRLEX_TEST_MISSING_KEY");
        let config = GenerationConfig {
            api_key: Some("${KYRLEX_TEST_MISSING_KEY}".to_string()),
            ..GenerationConfig::default()
        };
        let err = gemini_pool(&config).unwrap_err();
        assert!(err.to_string().contains("API key"));
    }

    #[test]
    #[serial]
    fn test_pool_builds_provider_per_temperature() {
        let config = GenerationConfig {
            api_key: Some("literal-key".to_string()),
            ..GenerationConfig::default()
        };
        let pool = gemini_pool(&config).unwrap();

        let cold = pool.get(0.1).unwrap();
        let warm = pool.get(0.2).unwrap();
        assert_eq!(cold.temperature(), 0.1);
        assert_eq!(warm.temperature(), 0.2);
        assert_eq!(cold.model(), config.model);
        assert_eq!(pool.len(), 2);
    }
}
