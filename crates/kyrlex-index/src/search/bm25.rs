//! Okapi BM25 keyword index over the statute corpus.
//!
//! Documents are addressed by their position in the corpus, so scores line up with
//! [`ChunkStore::corpus`](crate::store::ChunkStore::corpus) order.

use std::collections::{HashMap, HashSet};

/// BM25 parameters
const K1: f64 = 1.5; // Term frequency saturation
const B: f64 = 0.75; // Length normalization
const EPSILON: f64 = 0.25; // Floor for negative IDF, as a fraction of the average IDF

/// BM25 search index
#[derive(Debug, Clone, Default)]
pub struct BM25Index {
    /// Term frequencies per document, in corpus order
    term_freqs: Vec<HashMap<String, usize>>,
    /// Document lengths (in tokens)
    doc_lengths: Vec<usize>,
    /// Inverse document frequency for each term
    idf: HashMap<String, f64>,
    /// Average document length
    avg_doc_length: f64,
}

impl BM25Index {
    /// Lowercase whitespace tokenization, matching how the corpus is indexed.
    pub fn tokenize(text: &str) -> Vec<String> {
        text.to_lowercase()
            .split_whitespace()
            .map(String::from)
            .collect()
    }

    /// Build the index from document texts in corpus order.
    pub fn from_corpus<I, S>(documents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut term_freqs = Vec::new();
        let mut doc_lengths = Vec::new();
        let mut doc_freqs: HashMap<String, usize> = HashMap::new();

        for doc in documents {
            let tokens = Self::tokenize(doc.as_ref());
            doc_lengths.push(tokens.len());

            let mut freqs: HashMap<String, usize> = HashMap::new();
            for token in &tokens {
                *freqs.entry(token.clone()).or_insert(0) += 1;
            }

            let unique_terms: HashSet<&String> = tokens.iter().collect();
            for term in unique_terms {
                *doc_freqs.entry(term.clone()).or_insert(0) += 1;
            }

            term_freqs.push(freqs);
        }

        let doc_count = doc_lengths.len();
        let avg_doc_length = if doc_count == 0 {
            0.0
        } else {
            doc_lengths.iter().sum::<usize>() as f64 / doc_count as f64
        };

        let idf = Self::calculate_idf(&doc_freqs, doc_count);

        Self {
            term_freqs,
            doc_lengths,
            idf,
            avg_doc_length,
        }
    }

    /// Okapi IDF; terms in more than half of the corpus get a small positive floor
    /// instead of a negative weight.
    fn calculate_idf(doc_freqs: &HashMap<String, usize>, doc_count: usize) -> HashMap<String, f64> {
        let n = doc_count as f64;
        let mut idf = HashMap::with_capacity(doc_freqs.len());
        let mut idf_sum = 0.0;
        let mut negative = Vec::new();

        for (term, &freq) in doc_freqs {
            let freq = freq as f64;
            let value = (n - freq + 0.5).ln() - (freq + 0.5).ln();
            idf_sum += value;
            if value < 0.0 {
                negative.push(term.clone());
            }
            idf.insert(term.clone(), value);
        }

        if !idf.is_empty() {
            let floor = (EPSILON * idf_sum / idf.len() as f64).max(0.0);
            for term in negative {
                idf.insert(term, floor);
            }
        }

        idf
    }

    /// BM25 score of every document for the query tokens, aligned to corpus order.
    pub fn scores(&self, query_tokens: &[String]) -> Vec<f64> {
        self.term_freqs
            .iter()
            .zip(&self.doc_lengths)
            .map(|(freqs, &len)| {
                let norm = if self.avg_doc_length > 0.0 {
                    len as f64 / self.avg_doc_length
                } else {
                    0.0
                };
                query_tokens
                    .iter()
                    .map(|term| {
                        let idf = self.idf.get(term).copied().unwrap_or(0.0);
                        let tf = freqs.get(term).copied().unwrap_or(0) as f64;
                        if tf == 0.0 {
                            return 0.0;
                        }
                        idf * (tf * (K1 + 1.0)) / (tf + K1 * (1.0 - B + B * norm))
                    })
                    .sum()
            })
            .collect()
    }

    /// The `limit` best documents as (corpus position, score), highest score first.
    /// Equal scores keep corpus order.
    pub fn top_n(&self, query: &str, limit: usize) -> Vec<(usize, f64)> {
        let query_terms = Self::tokenize(query);
        if query_terms.is_empty() || limit == 0 {
            return Vec::new();
        }

        let mut ranked: Vec<(usize, f64)> =
            self.scores(&query_terms).into_iter().enumerate().collect();

        // sort_by is stable, so ties stay in corpus order
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        ranked.truncate(limit);
        ranked
    }

    /// Get the number of documents in the index
    pub fn len(&self) -> usize {
        self.doc_lengths.len()
    }

    /// Check if the index is empty
    pub fn is_empty(&self) -> bool {
        self.doc_lengths.is_empty()
    }
}
