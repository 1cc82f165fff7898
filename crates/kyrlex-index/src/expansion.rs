//! Query expansion with legal-domain synonyms.
//!
//! Produces lexical variants of a question to widen dense-search recall, e.g.
//! "права работника" → "право работника", "правомочия работника".

/// Maximum number of query strings returned, the original included.
pub const MAX_VARIANTS: usize = 3;

/// Bilingual legal synonym table, applied in order.
const LEGAL_SYNONYMS: &[(&str, &[&str])] = &[
    ("права", &["право", "правомочия"]),
    ("обязанности", &["обязанность", "долг"]),
    ("ответственность", &["наказание", "санкция"]),
    ("rights", &["right", "entitlement"]),
    ("duties", &["duty", "obligation"]),
];

/// Interrogative swaps, applied case-sensitively to the original text when a trigger
/// is present in any case.
const INTERROGATIVE_SWAPS: &[(&str, &str)] = &[("что", "какие"), ("what", "which")];

/// Expand a question into at most [`MAX_VARIANTS`] query strings, original first.
///
/// Deterministic; variants identical to an earlier one are dropped.
pub fn expand_query(query: &str) -> Vec<String> {
    let mut expansions = vec![query.to_string()];
    let lower = query.to_lowercase();

    if lower.contains("что") || lower.contains("what") {
        let swapped = INTERROGATIVE_SWAPS
            .iter()
            .fold(query.to_string(), |acc, (from, to)| acc.replace(from, to));
        push_unique(&mut expansions, swapped);
    }

    for (term, synonyms) in LEGAL_SYNONYMS {
        if lower.contains(term) {
            for synonym in *synonyms {
                push_unique(&mut expansions, lower.replace(term, synonym));
            }
        }
    }

    expansions.truncate(MAX_VARIANTS);
    expansions
}

fn push_unique(expansions: &mut Vec<String>, candidate: String) {
    if !expansions.contains(&candidate) {
        expansions.push(candidate);
    }
}
