//! Answer synthesis over an assembled context.
//!
//! Two modes:
//! - single-shot: one generation at the base temperature, validated, with one repair
//!   attempt when the validator rejects it
//! - self-consistency: one generation per configured temperature, then a majority vote
//!
//! Every provider call goes through [`retry_with_backoff`].

use std::sync::Arc;

use kyrlex_config::{GenerationConfig, ValidationConfig};
use kyrlex_providers::{GenerationError, GenerationRequest, ProviderPool};
use tracing::{debug, error, info, warn};

use crate::language::{detect_language, Language};
use crate::postprocess::post_process;
use crate::prompts::{build_prompt, repair_note};
use crate::retry::{retry_with_backoff, BackoffPolicy};
use crate::validator::AnswerValidator;
use crate::vote::majority_vote;

/// Returned to the user whenever generation fails outright.
pub const APOLOGY: &str = "Sorry, an error occurred while processing your request.";

/// Sampling settings shared by every request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sampling {
    pub max_tokens: u32,
    pub top_p: f32,
    pub top_k: u32,
}

impl Sampling {
    pub fn from_config(config: &GenerationConfig) -> Self {
        Self {
            max_tokens: config.max_output_tokens,
            top_p: config.top_p,
            top_k: config.top_k,
        }
    }

    pub fn request(&self, prompt: impl Into<String>, temperature: f32) -> GenerationRequest {
        GenerationRequest {
            prompt: prompt.into(),
            temperature: Some(temperature),
            max_tokens: Some(self.max_tokens),
            top_p: Some(self.top_p),
            top_k: Some(self.top_k),
        }
    }
}

impl Default for Sampling {
    fn default() -> Self {
        Self::from_config(&GenerationConfig::default())
    }
}

/// One generation call and how its output fared.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationAttempt {
    pub temperature: f32,
    pub prompt: String,
    pub result_text: String,
    pub valid: bool,
    pub reason: &'static str,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedAnswer {
    pub text: String,
    pub language: Language,
    pub attempts: Vec<GenerationAttempt>,
}

pub struct AnswerGenerator {
    pool: Arc<ProviderPool>,
    validator: AnswerValidator,
    policy: BackoffPolicy,
    sampling: Sampling,
    temperatures: Vec<f32>,
    self_consistency: bool,
}

impl AnswerGenerator {
    pub fn new(pool: Arc<ProviderPool>, temperatures: Vec<f32>) -> Self {
        Self {
            pool,
            validator: AnswerValidator::default(),
            policy: BackoffPolicy::default(),
            sampling: Sampling::default(),
            temperatures,
            self_consistency: false,
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
            policy: BackoffPolicy::from_config(generation),
            sampling: Sampling::from_config(generation),
            temperatures: generation.temperatures.clone(),
            self_consistency: generation.self_consistency,
        }
    }

    pub fn with_self_consistency(mut self, enabled: bool) -> Self {
        self.self_consistency = enabled;
        self
    }

    pub fn with_policy(mut self, policy: BackoffPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_validator(mut self, validator: AnswerValidator) -> Self {
        self.validator = validator;
        self
    }

    /// Answer `question` from `context`, never failing: any fatal error becomes [`APOLOGY`].
    pub async fn answer(&self, question: &str, context: &str, history: &str) -> String {
        match self.generate(question, context, history).await {
            Ok(answer) => answer.text,
            Err(e) => {
                error!("Error generating response: {}", e);
                APOLOGY.to_string()
            }
        }
    }

    /// Answer with the full attempt trail, propagating fatal errors.
    pub async fn generate(
        &self,
        question: &str,
        context: &str,
        history: &str,
    ) -> Result<GeneratedAnswer, GenerationError> {
        let language = detect_language(question);
        info!("Detected question language: {}", language);

        let prompt = build_prompt(context, question, history, language);

        if self.self_consistency {
            self.self_consistent(question, context, &prompt, language).await
        } else {
            self.single_shot(question, context, &prompt, language).await
        }
    }

    fn base_temperature(&self) -> Result<f32, GenerationError> {
        self.temperatures
            .first()
            .copied()
            .ok_or_else(|| GenerationError::Unavailable("no temperatures configured".to_string()))
    }

    async fn single_shot(
        &self,
        question: &str,
        context: &str,
        prompt: &str,
        language: Language,
    ) -> Result<GeneratedAnswer, GenerationError> {
        let temperature = self.base_temperature()?;
        let mut attempts = Vec::with_capacity(2);

        let answer = self.attempt(temperature, prompt, question, context, &mut attempts).await?;
        let verdict = attempts.last().map(|a| (a.valid, a.reason));

        let text = match verdict {
            Some((false, reason)) => {
                warn!(
                    "Answer validation failed: {}, retrying with adjusted prompt",
                    reason
                );
                let repaired = format!("{}{}", prompt, repair_note(language));
                self.attempt(temperature, &repaired, question, context, &mut attempts)
                    .await?
            }
            _ => answer,
        };

        Ok(GeneratedAnswer {
            text,
            language,
            attempts,
        })
    }

    async fn self_consistent(
        &self,
        question: &str,
        context: &str,
        prompt: &str,
        language: Language,
    ) -> Result<GeneratedAnswer, GenerationError> {
        let mut attempts = Vec::with_capacity(self.temperatures.len());
        let mut answers = Vec::with_capacity(self.temperatures.len());
        let mut last_error = None;

        for &temperature in &self.temperatures {
            match self.attempt(temperature, prompt, question, context, &mut attempts).await {
                Ok(answer) => answers.push(answer),
                Err(e) => {
                    error!("Error at temp {}: {}", temperature, e);
                    last_error = Some(e);
                }
            }
        }

        match majority_vote(&answers) {
            Some(text) => {
                debug!("Selected answer from {} candidates", answers.len());
                Ok(GeneratedAnswer {
                    text,
                    language,
                    attempts,
                })
            }
            None => Err(last_error.unwrap_or_else(|| {
                GenerationError::Unavailable("no temperatures configured".to_string())
            })),
        }
    }

    /// Generate, post-process and validate once, recording the attempt.
    async fn attempt(
        &self,
        temperature: f32,
        prompt: &str,
        question: &str,
        context: &str,
        attempts: &mut Vec<GenerationAttempt>,
    ) -> Result<String, GenerationError> {
        let raw = self.generate_text(temperature, prompt).await?;
        let text = post_process(&raw);
        let verdict = self.validator.validate(&text, question, context);

        attempts.push(GenerationAttempt {
            temperature,
            prompt: prompt.to_string(),
            result_text: text.clone(),
            valid: verdict.accepted,
            reason: verdict.reason,
        });

        Ok(text)
    }

    async fn generate_text(&self, temperature: f32, prompt: &str) -> Result<String, GenerationError> {
        let provider = self
            .pool
            .get(temperature)
            .map_err(|e| GenerationError::Unavailable(e.to_string()))?;

        retry_with_backoff(&self.policy, || {
            let provider = Arc::clone(&provider);
            let request = self.sampling.request(prompt, temperature);
            async move {
                let text = provider.complete(request).await?;
                if text.trim().is_empty() {
                    Err(GenerationError::EmptyResponse)
                } else {
                    Ok(text)
                }
            }
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use async_trait::async_trait;
    use kyrlex_providers::{FragmentStream, GenerationService};
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    const CONTEXT: &str = "=== Трудовой кодекс ===\n[Статья 95] Работникам предоставляются ежегодные оплачиваемые отпуска продолжительностью не менее двадцати восьми календарных дней с сохранением места работы и среднего заработка.";

    /// Replays scripted results; records prompts and temperatures it was called with.
    struct Scripted {
        temperature: f32,
        replies: Arc<Mutex<VecDeque<Result<String, GenerationError>>>>,
        calls: Arc<Mutex<Vec<(f32, String)>>>,
    }

    #[async_trait]
    impl GenerationService for Scripted {
        async fn complete(&self, request: GenerationRequest) -> Result<String, GenerationError> {
            self.calls
                .lock()
                .unwrap()
                .push((request.temperature.unwrap_or(self.temperature), request.prompt));
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(GenerationError::Api {
                    status: 400,
                    body: "script exhausted".into(),
                }))
        }

        async fn stream(&self, _request: GenerationRequest) -> Result<FragmentStream, GenerationError> {
            Err(GenerationError::Unavailable("not scripted".into()))
        }

        fn name(&self) -> &str {
            "scripted"
        }

        fn model(&self) -> &str {
            "scripted"
        }

        fn temperature(&self) -> f32 {
            self.temperature
        }
    }

    struct Harness {
        generator: AnswerGenerator,
        calls: Arc<Mutex<Vec<(f32, String)>>>,
    }

    fn harness(replies: Vec<Result<&str, GenerationError>>, temperatures: Vec<f32>) -> Harness {
        let replies: VecDeque<_> = replies
            .into_iter()
            .map(|r| r.map(str::to_string))
            .collect();
        let replies = Arc::new(Mutex::new(replies));
        let calls = Arc::new(Mutex::new(Vec::new()));

        let (r, c) = (Arc::clone(&replies), Arc::clone(&calls));
        let pool = ProviderPool::new(move |temperature| {
            Ok(Arc::new(Scripted {
                temperature,
                replies: Arc::clone(&r),
                calls: Arc::clone(&c),
            }) as Arc<dyn GenerationService>)
        });

        let generator = AnswerGenerator::new(Arc::new(pool), temperatures).with_policy(BackoffPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            multiplier: 2.0,
        });
        Harness { generator, calls }
    }

    const GOOD: &str = "Работник имеет право на ежегодный отпуск не менее 28 дней. Это закреплено в Статья 95 Трудового кодекса.";

    #[tokio::test]
    async fn test_single_shot_accepts_valid_answer() {
        let h = harness(vec![Ok(GOOD)], vec![0.1, 0.2, 0.15]);
        let answer = h
            .generator
            .generate("Какой отпуск положен работнику?", CONTEXT, "")
            .await
            .unwrap();

        assert_eq!(answer.text, GOOD);
        assert_eq!(answer.language, Language::Russian);
        assert_eq!(answer.attempts.len(), 1);
        assert!(answer.attempts[0].valid);

        let calls = h.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, 0.1);
        assert!(calls[0].1.contains("The question is asked in: Russian"));
    }

    #[tokio::test]
    async fn test_single_shot_repairs_rejected_answer() {
        let h = harness(vec![Ok("Да."), Ok(GOOD)], vec![0.1]);
        let answer = h
            .generator
            .generate("Какой отпуск положен работнику?", CONTEXT, "")
            .await
            .unwrap();

        assert_eq!(answer.text, GOOD);
        assert_eq!(answer.attempts.len(), 2);
        assert_eq!(answer.attempts[0].reason, "Answer too short");

        let calls = h.calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert!(calls[1].1.ends_with(
            "Note: Please provide a detailed response in Russian with specific article references from the context."
        ));
    }

    #[tokio::test]
    async fn test_repaired_answer_returned_even_if_still_invalid() {
        let h = harness(vec![Ok("Да."), Ok("Нет.")], vec![0.1]);
        let answer = h.generator.answer("Какой отпуск положен?", CONTEXT, "").await;
        assert_eq!(answer, "Нет.");
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let h = harness(
            vec![
                Err(GenerationError::Timeout),
                Err(GenerationError::Api { status: 429, body: "slow down".into() }),
                Ok(GOOD),
            ],
            vec![0.1],
        );
        let answer = h.generator.answer("Какой отпуск положен работнику?", CONTEXT, "").await;
        assert_eq!(answer, GOOD);
        assert_eq!(h.calls.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_blank_reply_counts_as_empty() {
        let h = harness(vec![Ok("   "), Ok(GOOD)], vec![0.1]);
        let answer = h.generator.answer("Какой отпуск положен работнику?", CONTEXT, "").await;
        assert_eq!(answer, GOOD);
    }

    #[tokio::test]
    async fn test_exhausted_retries_become_apology() {
        let h = harness(
            vec![
                Err(GenerationError::Network("reset".into())),
                Err(GenerationError::Network("reset".into())),
                Err(GenerationError::Network("reset".into())),
            ],
            vec![0.1],
        );
        assert_eq!(h.generator.answer("Какой отпуск?", CONTEXT, "").await, APOLOGY);

        let err = h.generator.generate("Какой отпуск?", CONTEXT, "").await.unwrap_err();
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_self_consistency_majority() {
        let h = harness(vec![Ok("A"), Ok("B"), Ok("A")], vec![0.1, 0.2, 0.15]);
        let generator = h.generator.with_self_consistency(true);
        let answer = generator.generate("What is leave?", CONTEXT, "").await.unwrap();

        assert_eq!(answer.text, "A");
        assert_eq!(answer.attempts.len(), 3);
        let temperatures: Vec<f32> = h.calls.lock().unwrap().iter().map(|c| c.0).collect();
        assert_eq!(temperatures, vec![0.1, 0.2, 0.15]);
    }

    #[tokio::test]
    async fn test_self_consistency_no_majority_returns_first() {
        let h = harness(vec![Ok("A"), Ok("B"), Ok("C")], vec![0.1, 0.2, 0.15]);
        let generator = h.generator.with_self_consistency(true);
        assert_eq!(generator.answer("What is leave?", CONTEXT, "").await, "A");
    }

    #[tokio::test]
    async fn test_self_consistency_skips_failed_temperature() {
        let h = harness(
            vec![
                Err(GenerationError::Parse("garbled".into())),
                Ok("B"),
                Ok("C"),
            ],
            vec![0.1, 0.2, 0.15],
        );
        let generator = h.generator.with_self_consistency(true);
        assert_eq!(generator.answer("What is leave?", CONTEXT, "").await, "B");
    }

    #[tokio::test]
    async fn test_self_consistency_all_failed_is_apology() {
        let h = harness(
            vec![
                Err(GenerationError::Parse("x".into())),
                Err(GenerationError::Parse("y".into())),
            ],
            vec![0.1, 0.2],
        );
        let generator = h.generator.with_self_consistency(true);
        assert_eq!(generator.answer("What is leave?", CONTEXT, "").await, APOLOGY);
    }

    #[tokio::test]
    async fn test_post_processing_applied() {
        let h = harness(vec![Ok("## **Отпуск**.Работник имеет право на отпуск по Статья 95.")], vec![0.1]);
        let answer = h.generator.answer("Какой отпуск положен работнику?", CONTEXT, "").await;
        assert_eq!(answer, "Отпуск. Работник имеет право на отпуск по Статья 95.");
    }

    #[tokio::test]
    async fn test_provider_construction_failure_is_apology() {
        let pool = ProviderPool::new(|_| Err(anyhow!("GEMINI_API_KEY not set")));
        let generator = AnswerGenerator::new(Arc::new(pool), vec![0.1]);
        assert_eq!(generator.answer("Какой отпуск?", CONTEXT, "").await, APOLOGY);
    }
}
