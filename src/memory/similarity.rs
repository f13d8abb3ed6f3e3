//! Text-overlap relevance for `find_similar`.
//!
//! Deliberately lexical: no embeddings, so paraphrases with no shared words
//! score zero.

use rustc_hash::FxHashSet;

/// Tokens shorter than this carry no signal ("a", "I", single digits).
const MIN_TOKEN_LEN: usize = 2;

/// Lowercase, collapse whitespace runs, trim.
pub fn normalize(text: &str) -> String {
    text.split_whitespace()
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Distinct lowercase alphanumeric runs, in first-seen order.
pub fn tokens(text: &str) -> Vec<String> {
    let mut seen = FxHashSet::default();
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() >= MIN_TOKEN_LEN)
        .map(|t| t.to_lowercase())
        .filter(|t| seen.insert(t.clone()))
        .collect()
}

/// Precomputed form of the query side so candidates can be scored cheaply.
#[derive(Debug, Clone)]
pub struct SimilarityQuery {
    normalized: String,
    tokens: Vec<String>,
}

impl SimilarityQuery {
    pub fn new(query: &str) -> Self {
        let normalized = normalize(query);
        let tokens = tokens(&normalized);
        Self { normalized, tokens }
    }

    pub fn normalized(&self) -> &str {
        &self.normalized
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    /// Relevance in `[0.0, 1.0]`: the better of substring containment and
    /// the share of query tokens found in the candidate.
    pub fn score(&self, candidate: &str) -> f64 {
        if self.normalized.is_empty() {
            return 0.0;
        }
        let cand = normalize(candidate);
        substring_score(&self.normalized, &cand).max(self.token_score(&cand))
    }

    fn token_score(&self, normalized_candidate: &str) -> f64 {
        if self.tokens.is_empty() {
            return 0.0;
        }
        let cand: FxHashSet<String> = tokens(normalized_candidate).into_iter().collect();
        let shared = self.tokens.iter().filter(|t| cand.contains(*t)).count();
        shared as f64 / self.tokens.len() as f64
    }
}

fn substring_score(query: &str, candidate: &str) -> f64 {
    if candidate.is_empty() {
        return 0.0;
    }
    if candidate.contains(query) {
        1.0
    } else if query.contains(candidate) {
        candidate.chars().count() as f64 / query.chars().count() as f64
    } else {
        0.0
    }
}
