//! LLM generation providers for kyrlex.
//!
//! A [`GenerationService`] turns a fully rendered prompt into answer text, either in one
//! piece ([`GenerationService::complete`]) or as a stream of text fragments
//! ([`GenerationService::stream`]). Failures are reported as [`GenerationError`], which
//! knows whether a failure is worth retrying.

use async_trait::async_trait;
use thiserror::Error;
use tokio_stream::wrappers::ReceiverStream;

pub mod gemini;
pub mod pool;
pub mod streaming;

pub use gemini::GeminiProvider;
pub use pool::ProviderPool;

/// A single generation call.
///
/// Sampling fields left as `None` use the provider's configured defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub top_p: Option<f32>,
    pub top_k: Option<u32>,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            temperature: None,
            max_tokens: None,
            top_p: None,
            top_k: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// Errors from a generation service.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GenerationError {
    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out")]
    Timeout,

    #[error("model returned no content")]
    EmptyResponse,

    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("failed to parse response: {0}")]
    Parse(String),

    #[error("provider unavailable: {0}")]
    Unavailable(String),

    #[error("gave up after {attempts} attempts: {last}")]
    ExhaustedRetries {
        attempts: u32,
        last: Box<GenerationError>,
    },
}

impl GenerationError {
    /// Whether repeating the same call may succeed: network failures, timeouts, empty
    /// responses, rate limiting (429) and server errors (5xx).
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout | Self::EmptyResponse => true,
            Self::Api { status, .. } => *status == 429 || (500..600).contains(status),
            Self::Parse(_) | Self::Unavailable(_) | Self::ExhaustedRetries { .. } => false,
        }
    }
}

impl From<reqwest::Error> for GenerationError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if e.is_decode() {
            Self::Parse(e.to_string())
        } else {
            Self::Network(e.to_string())
        }
    }
}

/// Text fragments in arrival order. Dropping the stream stops the producer.
pub type FragmentStream = ReceiverStream<Result<String, GenerationError>>;

#[async_trait]
pub trait GenerationService: Send + Sync {
    /// Generate the whole answer in one call.
    async fn complete(&self, request: GenerationRequest) -> Result<String, GenerationError>;

    /// Generate incrementally. Errors before the first byte are returned directly;
    /// later failures arrive as an `Err` item on the stream.
    async fn stream(&self, request: GenerationRequest) -> Result<FragmentStream, GenerationError>;

    fn name(&self) -> &str;

    fn model(&self) -> &str;

    /// Default sampling temperature for requests that don't set one.
    fn temperature(&self) -> f32;
}
