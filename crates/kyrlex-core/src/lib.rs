//! Answer synthesis for the kyrlex legal assistant.
//!
//! Takes the context assembled by `kyrlex-index` and turns it into a plain-language
//! answer in the question's language: prompt construction, generation with retry and
//! backoff, quality validation with a repair attempt, optional self-consistency voting
//! and incremental streaming.

pub mod assistant;
pub mod generator;
pub mod history;
pub mod language;
pub mod postprocess;
pub mod prompts;
pub mod retry;
pub mod streaming;
pub mod validator;
pub mod vote;

pub use assistant::{AssistantReply, LegalAssistant, StreamingReply};
pub use generator::{AnswerGenerator, GeneratedAnswer, GenerationAttempt, Sampling, APOLOGY};
pub use history::{truncate_at_sentence, ConversationHistory, Role, Turn};
pub use language::{detect_language, Language};
pub use postprocess::post_process;
pub use prompts::{build_prompt, repair_note};
pub use retry::{retry_with_backoff, BackoffPolicy};
pub use streaming::{AnswerStream, StreamingAnswerer, NO_CONTENT_MESSAGE, STREAM_ERROR_MESSAGE};
pub use validator::{AnswerValidator, Verdict};
pub use vote::majority_vote;
