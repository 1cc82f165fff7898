//! Candidate deduplication across retrieval channels.
//!
//! Two candidates are considered duplicates when the first [`FINGERPRINT_CHARS`]
//! characters of their content are identical. This is a prefix approximation:
//! chunks sharing an opening are merged even if they diverge later, and chunks
//! differing only at the start are kept apart.

use std::collections::HashSet;

use sha2::{Digest, Sha256};

use crate::chunk::Candidate;

/// Number of leading characters that identify a chunk.
pub const FINGERPRINT_CHARS: usize = 100;

/// SHA256 of the first [`FINGERPRINT_CHARS`] characters of `content`.
pub fn fingerprint(content: &str) -> String {
    let prefix: String = content.chars().take(FINGERPRINT_CHARS).collect();
    let mut hasher = Sha256::new();
    hasher.update(prefix.as_bytes());
    hex::encode(hasher.finalize())
}

/// Keep the first occurrence of each fingerprint, preserving arrival order.
pub fn deduplicate(candidates: Vec<Candidate>) -> Vec<Candidate> {
    let mut seen = HashSet::with_capacity(candidates.len());
    candidates
        .into_iter()
        .filter(|c| seen.insert(fingerprint(&c.chunk.content)))
        .collect()
}
