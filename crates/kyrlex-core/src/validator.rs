//! Heuristic quality gate for generated answers.
//!
//! Rules run in a fixed order and the first failing rule decides the verdict. A
//! rejection is a value, not an error: callers decide whether to retry or just log.

use std::collections::HashSet;

use kyrlex_config::ValidationConfig;
use once_cell::sync::Lazy;
use regex::Regex;

pub const REASON_OK: &str = "OK";
pub const REASON_TOO_SHORT: &str = "Answer too short";
pub const REASON_TOO_LONG: &str = "Answer too long (possible context dump)";
pub const REASON_ERROR_RESPONSE: &str = "Error response";
pub const REASON_EVASIVE: &str = "Evasive or insufficient answer";
pub const REASON_UNRELATED: &str = "Answer doesn't seem related to question";
pub const REASON_NO_LEGAL_GROUNDING: &str = "Answer lacks legal references or terminology";
pub const REASON_NO_SENTENCES: &str = "Answer lacks proper sentence structure";

static EVASIVE_RES: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"i (do not|don't) have (enough )?information",
        r"the context (does not|doesn't) provide",
        r"без дополнительной информации",
        r"я не могу ответить",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

static WORD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\w{3,}").unwrap());

static CITATION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(article|статья|статьи|law|закон|кодекс|codex)\s*(№|#|\d+)").unwrap()
});

static LEGAL_TERM_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(права|обязанност|ответственност|наказан|штраф|санкц|right|duty|obligation|penalty|fine|liable)",
    )
    .unwrap()
});

static SENTENCE_SPLIT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[.!?]+").unwrap());

/// Words that never count as topical overlap between question and answer.
const STOPWORDS: &[&str] = &[
    "the", "a", "an", "is", "are", "was", "were", "what", "how", "can", "could", "should",
    "would", "i", "you", "in", "on", "at", "for", "with", "from", "about", "this", "that",
    "these", "those", "и", "в", "на", "что", "как", "или", "для", "это", "был", "была", "были",
    "быть", "можно", "который", "которая", "которое", "может", "также", "если", "при", "где",
    "когда",
];

/// Outcome of validating one answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict {
    pub accepted: bool,
    pub reason: &'static str,
}

impl Verdict {
    fn accept() -> Self {
        Self {
            accepted: true,
            reason: REASON_OK,
        }
    }

    fn reject(reason: &'static str) -> Self {
        Self {
            accepted: false,
            reason,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AnswerValidator {
    min_length: usize,
    max_length: usize,
    reference_context_threshold: usize,
}

impl Default for AnswerValidator {
    fn default() -> Self {
        Self::from_config(&ValidationConfig::default())
    }
}

impl AnswerValidator {
    pub fn from_config(config: &ValidationConfig) -> Self {
        Self {
            min_length: config.min_answer_length,
            max_length: config.max_answer_length,
            reference_context_threshold: config.reference_context_threshold,
        }
    }

    pub fn validate(&self, answer: &str, question: &str, context: &str) -> Verdict {
        if answer.trim().chars().count() < self.min_length {
            return Verdict::reject(REASON_TOO_SHORT);
        }

        if answer.chars().count() > self.max_length {
            return Verdict::reject(REASON_TOO_LONG);
        }

        let lower = answer.to_lowercase();

        if lower.contains("sorry") && lower.contains("error") {
            return Verdict::reject(REASON_ERROR_RESPONSE);
        }

        if EVASIVE_RES.iter().any(|re| re.is_match(&lower)) {
            return Verdict::reject(REASON_EVASIVE);
        }

        if !shares_topic_word(question, &lower) {
            return Verdict::reject(REASON_UNRELATED);
        }

        if context.chars().count() > self.reference_context_threshold
            && !CITATION_RE.is_match(&lower)
            && !LEGAL_TERM_RE.is_match(&lower)
        {
            return Verdict::reject(REASON_NO_LEGAL_GROUNDING);
        }

        let has_sentence = SENTENCE_SPLIT_RE
            .split(answer)
            .any(|s| s.split_whitespace().count() > 3);
        if !has_sentence {
            return Verdict::reject(REASON_NO_SENTENCES);
        }

        Verdict::accept()
    }
}

fn shares_topic_word(question: &str, lowered_answer: &str) -> bool {
    let question = question.to_lowercase();
    let question_words: HashSet<&str> = WORD_RE.find_iter(&question).map(|m| m.as_str()).collect();
    WORD_RE
        .find_iter(lowered_answer)
        .map(|m| m.as_str())
        .any(|w| question_words.contains(w) && !STOPWORDS.contains(&w))
}
