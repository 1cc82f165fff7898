//! Statute chunks and retrieval candidates.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static ARTICLE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"Статья\s+(\d+)").unwrap());

/// An immutable span of statute text with its provenance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// The statute text
    pub content: String,
    /// File the chunk was cut from (e.g. "Трудовой_кодекс.txt")
    pub source_file: String,
    /// Human-readable law name used in context headers
    pub law_name: String,
    /// Article number, when the chunk belongs to a numbered article
    #[serde(default)]
    pub article_number: Option<String>,
}

impl Chunk {
    pub fn new(
        content: impl Into<String>,
        source_file: impl Into<String>,
        law_name: impl Into<String>,
        article_number: Option<String>,
    ) -> Self {
        Self {
            content: content.into(),
            source_file: source_file.into(),
            law_name: law_name.into(),
            article_number,
        }
    }

    /// Build a chunk deriving its provenance from the source file name and content.
    ///
    /// The law name is the file name without `.txt` and with underscores as spaces.
    /// The article number is taken from the first `Статья N` in the content.
    pub fn from_source(source_file: impl Into<String>, content: impl Into<String>) -> Self {
        let source_file = source_file.into();
        let content = content.into();
        let law_name = law_name_from_file(&source_file);
        let article_number = article_number_in(&content);
        Self {
            content,
            source_file,
            law_name,
            article_number,
        }
    }
}

pub fn law_name_from_file(source_file: &str) -> String {
    source_file.replace(".txt", "").replace('_', " ")
}

pub fn article_number_in(content: &str) -> Option<String> {
    ARTICLE_RE
        .captures(content)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Which retrieval channel produced a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Channel {
    /// Embedding-similarity search (plain or MMR)
    Dense,
    /// BM25 keyword search
    Sparse,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dense => "dense",
            Self::Sparse => "sparse",
        }
    }
}

/// A chunk as it flows through retrieval, tagged with its origin.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub chunk: Chunk,
    pub channel: Channel,
    /// Channel-specific score; dense search does not report one
    pub score: Option<f64>,
}

impl Candidate {
    pub fn dense(chunk: Chunk) -> Self {
        Self {
            chunk,
            channel: Channel::Dense,
            score: None,
        }
    }

    pub fn sparse(chunk: Chunk, score: f64) -> Self {
        Self {
            chunk,
            channel: Channel::Sparse,
            score: Some(score),
        }
    }
}
