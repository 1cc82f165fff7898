//! Incremental answer delivery.
//!
//! Fragments are forwarded as soon as the provider yields them, through a bounded
//! channel so a slow consumer paces the producer. A failed or empty attempt is
//! restarted from scratch; fragments already delivered stay delivered. The full text
//! is validated once at the end, for the logs only.

use std::sync::Arc;

use futures_util::StreamExt;
use kyrlex_config::{GenerationConfig, ValidationConfig};
use kyrlex_providers::{GenerationError, GenerationService, ProviderPool};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, info, warn};

use crate::generator::Sampling;
use crate::language::detect_language;
use crate::prompts::build_prompt;
use crate::validator::AnswerValidator;

pub const NO_CONTENT_MESSAGE: &str =
    "I couldn't generate a response. Please try rephrasing your question.";

pub const STREAM_ERROR_MESSAGE: &str =
    "Sorry, an error occurred while processing your request. Please try again.";

/// Fragments buffered ahead of the consumer
const FRAGMENT_BUFFER: usize = 16;

pub type AnswerStream = ReceiverStream<String>;

enum AttemptOutcome {
    Finished,
    ReceiverGone,
}

#[derive(Clone)]
pub struct StreamingAnswerer {
    pool: Arc<ProviderPool>,
    validator: AnswerValidator,
    sampling: Sampling,
    temperature: f32,
    max_attempts: u32,
}

impl StreamingAnswerer {
    pub fn new(pool: Arc<ProviderPool>, temperature: f32) -> Self {
        Self {
            pool,
            validator: AnswerValidator::default(),
            sampling: Sampling::default(),
            temperature,
            max_attempts: 2,
        }
    }

    pub fn from_config(
        pool: Arc<ProviderPool>,
        generation: &GenerationConfig,
        validation: &ValidationConfig,
    ) -> Self {
        Self {
            pool,
            validator: AnswerValidator::from_config(validation),
            sampling: Sampling::from_config(generation),
            temperature: generation.streaming_temperature,
            max_attempts: generation.stream_attempts.max(1),
        }
    }

    /// Start answering in the background and return the fragment stream.
    ///
    /// Dropping the returned stream cancels generation at the next fragment.
    pub fn answer_stream(&self, question: &str, context: &str, history: &str) -> AnswerStream {
        let (tx, rx) = mpsc::channel(FRAGMENT_BUFFER);
        let this = self.clone();
        let question = question.to_string();
        let context = context.to_string();
        let history = history.to_string();

        tokio::spawn(async move {
            this.run(&question, &context, &history, tx).await;
        });

        ReceiverStream::new(rx)
    }

    async fn run(&self, question: &str, context: &str, history: &str, tx: mpsc::Sender<String>) {
        let language = detect_language(question);
        info!("Detected question language: {}", language);
        let prompt = build_prompt(context, question, history, language);

        let provider = match self.pool.get(self.temperature) {
            Ok(provider) => provider,
            Err(e) => {
                error!("Error getting model response: {}", e);
                let _ = tx.send(STREAM_ERROR_MESSAGE.to_string()).await;
                return;
            }
        };

        for attempt in 1..=self.max_attempts {
            let mut accumulated = String::new();
            let outcome = self
                .stream_attempt(provider.as_ref(), &prompt, &tx, &mut accumulated)
                .await;
            let last_attempt = attempt == self.max_attempts;

            match outcome {
                Ok(AttemptOutcome::ReceiverGone) => {
                    debug!("Answer stream dropped by consumer");
                    return;
                }
                Ok(AttemptOutcome::Finished) if !accumulated.is_empty() => {
                    let verdict = self.validator.validate(&accumulated, question, context);
                    if !verdict.accepted {
                        warn!("Streamed answer validation failed: {}", verdict.reason);
                    }
                    return;
                }
                Ok(AttemptOutcome::Finished) => {
                    if last_attempt {
                        let _ = tx.send(NO_CONTENT_MESSAGE.to_string()).await;
                        return;
                    }
                    warn!("No content generated, retrying...");
                }
                Err(e) => {
                    error!(
                        "Error getting model response (attempt {}/{}): {}",
                        attempt, self.max_attempts, e
                    );
                    if last_attempt {
                        let _ = tx.send(STREAM_ERROR_MESSAGE.to_string()).await;
                        return;
                    }
                    info!("Retrying...");
                }
            }
        }
    }

    async fn stream_attempt(
        &self,
        provider: &dyn GenerationService,
        prompt: &str,
        tx: &mpsc::Sender<String>,
        accumulated: &mut String,
    ) -> Result<AttemptOutcome, GenerationError> {
        let mut fragments = provider
            .stream(self.sampling.request(prompt, self.temperature))
            .await?;

        while let Some(fragment) = fragments.next().await {
            let fragment = fragment?;
            if fragment.is_empty() {
                continue;
            }
            accumulated.push_str(&fragment);
            if tx.send(fragment).await.is_err() {
                return Ok(AttemptOutcome::ReceiverGone);
            }
        }

        Ok(AttemptOutcome::Finished)
    }
}
