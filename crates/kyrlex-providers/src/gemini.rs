//! Google Gemini provider.
//!
//! Talks to the Generative Language REST API:
//!
//! - Completion: `POST {base}/models/{model}:generateContent`
//! - Streaming: `POST {base}/models/{model}:streamGenerateContent?alt=sse`
//!
//! Statute text regularly mentions crimes and punishments, so every request disables
//! the harassment, hate speech, sexually explicit and dangerous content filters.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::StreamExt;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

use crate::streaming::SseDecoder;
use crate::{FragmentStream, GenerationError, GenerationRequest, GenerationService};

/// Default base URL for the Generative Language API
pub const GEMINI_DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Default model
pub const GEMINI_DEFAULT_MODEL: &str = "gemini-flash-latest";

const DEFAULT_MAX_TOKENS: u32 = 2048;
const DEFAULT_TEMPERATURE: f32 = 0.1;
const DEFAULT_TOP_P: f32 = 0.95;
const DEFAULT_TOP_K: u32 = 40;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Fragments buffered between the HTTP reader task and the consumer
const STREAM_BUFFER: usize = 100;

const SAFETY_CATEGORIES: [&str; 4] = [
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
];

#[derive(Clone)]
pub struct GeminiProvider {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
    max_tokens: u32,
    temperature: f32,
    top_p: f32,
    top_k: u32,
    name: String,
}

impl GeminiProvider {
    pub fn new(
        api_key: String,
        model: Option<String>,
        base_url: Option<String>,
        max_tokens: Option<u32>,
        temperature: Option<f32>,
    ) -> Result<Self> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        let model = model.unwrap_or_else(|| GEMINI_DEFAULT_MODEL.to_string());
        let base_url = base_url
            .unwrap_or_else(|| GEMINI_DEFAULT_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            client,
            api_key,
            name: format!("gemini.{}", model),
            model,
            base_url,
            max_tokens: max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            temperature: temperature.unwrap_or(DEFAULT_TEMPERATURE),
            top_p: DEFAULT_TOP_P,
            top_k: DEFAULT_TOP_K,
        })
    }

    /// Override nucleus and top-k sampling defaults.
    pub fn with_sampling(mut self, top_p: f32, top_k: u32) -> Self {
        self.top_p = top_p;
        self.top_k = top_k;
        self
    }

    fn endpoint(&self, streaming: bool) -> String {
        if streaming {
            format!(
                "{}/models/{}:streamGenerateContent?alt=sse",
                self.base_url, self.model
            )
        } else {
            format!("{}/models/{}:generateContent", self.base_url, self.model)
        }
    }

    fn create_request_body(&self, request: &GenerationRequest) -> serde_json::Value {
        let safety_settings: Vec<serde_json::Value> = SAFETY_CATEGORIES
            .iter()
            .map(|category| json!({ "category": category, "threshold": "BLOCK_NONE" }))
            .collect();

        json!({
            "contents": [{
                "role": "user",
                "parts": [{ "text": request.prompt }]
            }],
            "generationConfig": {
                "temperature": request.temperature.unwrap_or(self.temperature),
                "maxOutputTokens": request.max_tokens.unwrap_or(self.max_tokens),
                "topP": request.top_p.unwrap_or(self.top_p),
                "topK": request.top_k.unwrap_or(self.top_k),
            },
            "safetySettings": safety_settings,
        })
    }

    async fn send(
        &self,
        request: &GenerationRequest,
        streaming: bool,
    ) -> Result<reqwest::Response, GenerationError> {
        let body = self.create_request_body(request);

        debug!(
            "Sending request to Gemini API: model={}, streaming={}",
            self.model, streaming
        );

        let response = self
            .client
            .post(self.endpoint(streaming))
            .header("x-goog-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(GenerationError::Api {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response)
    }

    /// Forward text fragments from an SSE byte stream until it ends or the receiver
    /// goes away.
    async fn forward_stream(
        mut stream: impl futures_util::Stream<Item = reqwest::Result<Bytes>> + Unpin,
        tx: mpsc::Sender<Result<String, GenerationError>>,
    ) {
        let mut decoder = SseDecoder::new();
        let mut fragments = 0usize;

        while let Some(chunk) = stream.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    let _ = tx.send(Err(e.into())).await;
                    return;
                }
            };

            for payload in decoder.push(&chunk) {
                match parse_fragment(&payload) {
                    Ok(Some(text)) => {
                        fragments += 1;
                        if tx.send(Ok(text)).await.is_err() {
                            debug!("Stream receiver dropped, stopping");
                            return;
                        }
                    }
                    Ok(None) => {}
                    Err(e) => {
                        let _ = tx.send(Err(e)).await;
                        return;
                    }
                }
            }
        }

        if let Some(payload) = decoder.finish() {
            match parse_fragment(&payload) {
                Ok(Some(text)) => {
                    fragments += 1;
                    let _ = tx.send(Ok(text)).await;
                }
                Ok(None) => {}
                Err(e) => {
                    let _ = tx.send(Err(e)).await;
                }
            }
        }

        debug!("Gemini stream completed with {} fragments", fragments);
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    #[serde(default)]
    content: Option<GeminiContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Deserialize)]
struct GeminiPart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
}

impl GeminiResponse {
    /// Concatenated text parts of the first candidate.
    fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter_map(|p| p.text.as_deref())
                    .collect::<String>()
            })
            .unwrap_or_default()
    }

    fn log_diagnostics(&self) {
        if let Some(reason) = self
            .prompt_feedback
            .as_ref()
            .and_then(|f| f.block_reason.as_deref())
        {
            warn!("Gemini blocked the prompt: {}", reason);
        }
        if let Some(reason) = self
            .candidates
            .first()
            .and_then(|c| c.finish_reason.as_deref())
        {
            if reason != "STOP" && reason != "MAX_TOKENS" {
                warn!("Gemini finished with reason {}", reason);
            }
        }
    }
}

/// Text carried by one streamed payload, `None` for payloads without text.
fn parse_fragment(payload: &str) -> Result<Option<String>, GenerationError> {
    let response: GeminiResponse =
        serde_json::from_str(payload).map_err(|e| GenerationError::Parse(e.to_string()))?;
    response.log_diagnostics();
    let text = response.text();
    Ok(if text.is_empty() { None } else { Some(text) })
}

#[async_trait]
impl GenerationService for GeminiProvider {
    async fn complete(&self, request: GenerationRequest) -> Result<String, GenerationError> {
        let response = self.send(&request, false).await?;

        let gemini_response: GeminiResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::Parse(e.to_string()))?;
        gemini_response.log_diagnostics();

        if let Some(usage) = &gemini_response.usage_metadata {
            debug!(
                "Gemini completion successful: {} prompt tokens, {} completion tokens",
                usage.prompt_token_count, usage.candidates_token_count
            );
        }

        let text = gemini_response.text();
        if text.trim().is_empty() {
            return Err(GenerationError::EmptyResponse);
        }
        Ok(text)
    }

    async fn stream(&self, request: GenerationRequest) -> Result<FragmentStream, GenerationError> {
        let response = self.send(&request, true).await?;

        let stream = response.bytes_stream();
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);

        tokio::spawn(async move {
            Self::forward_stream(stream, tx).await;
        });

        Ok(ReceiverStream::new(rx))
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn temperature(&self) -> f32 {
        self.temperature
    }
}
