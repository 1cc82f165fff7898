//! Prompt context assembly.
//!
//! Selected chunks are grouped by source law (first-seen order), capped per source,
//! whitespace-normalized and rendered under a `=== Law name ===` header.

use serde::{Deserialize, Serialize};

use crate::chunk::Chunk;

/// Default per-source cap.
pub const DEFAULT_MAX_CHUNKS_PER_SOURCE: usize = 3;

/// The bounded context handed to generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssembledContext {
    pub text: String,
    /// Number of distinct source laws
    pub sources: usize,
    /// Number of chunks actually rendered
    pub chunks: usize,
}

#[derive(Debug, Clone)]
pub struct ContextAssembler {
    max_chunks_per_source: usize,
}

impl Default for ContextAssembler {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CHUNKS_PER_SOURCE)
    }
}

struct SourceGroup<'a> {
    source_file: &'a str,
    law_name: &'a str,
    chunks: Vec<&'a Chunk>,
}

impl ContextAssembler {
    pub fn new(max_chunks_per_source: usize) -> Self {
        Self {
            max_chunks_per_source,
        }
    }

    pub fn assemble(&self, chunks: &[Chunk]) -> AssembledContext {
        let mut groups: Vec<SourceGroup<'_>> = Vec::new();

        for chunk in chunks {
            match groups
                .iter_mut()
                .find(|g| g.source_file == chunk.source_file)
            {
                Some(group) => group.chunks.push(chunk),
                None => groups.push(SourceGroup {
                    source_file: &chunk.source_file,
                    law_name: &chunk.law_name,
                    chunks: vec![chunk],
                }),
            }
        }

        let mut text = String::new();
        let mut rendered = 0;

        for group in &groups {
            text.push_str(&format!("\n=== {} ===\n", group.law_name));
            for chunk in group.chunks.iter().take(self.max_chunks_per_source) {
                text.push_str(&render_chunk(chunk));
                text.push('\n');
                rendered += 1;
            }
            text.push('\n');
        }

        AssembledContext {
            text: text.trim().to_string(),
            sources: groups.len(),
            chunks: rendered,
        }
    }
}

/// `[Статья N] ` prefix when known, all whitespace runs collapsed to one space.
fn render_chunk(chunk: &Chunk) -> String {
    let body = normalize_whitespace(&chunk.content);
    match &chunk.article_number {
        Some(article) if !article.is_empty() => format!("[Статья {}] {}", article, body),
        _ => body,
    }
}

pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
