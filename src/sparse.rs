//! Sparse lexical index backed by TF-IDF.
//!
//! [`SparseIndex`] builds a term-weighted representation of a chunk corpus at
//! construction time and answers top-k lexical similarity queries. The
//! vocabulary covers unigrams and bigrams with English stop words removed;
//! rows use smoothed IDF weighting and are L2-normalized, so a query's dot
//! product against a row is a cosine score in `[0, 1]`.
//!
//! The index is immutable once built. Growing the corpus means building a new
//! index and swapping it in via
//! [`RetrievalEngine::rebuild_sparse_index`](crate::engine::RetrievalEngine::rebuild_sparse_index).

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info};

use crate::document::{Candidate, Chunk};

/// English stop words excluded from the vocabulary.
const STOP_WORDS: &[&str] = &[
    "about", "above", "after", "again", "against", "all", "am", "an", "and", "any", "are",
    "as", "at", "be", "because", "been", "before", "being", "below", "between", "both", "but",
    "by", "can", "cannot", "could", "did", "do", "does", "doing", "down", "during", "each",
    "few", "for", "from", "further", "had", "has", "have", "having", "he", "her", "here",
    "hers", "herself", "him", "himself", "his", "how", "if", "in", "into", "is", "it", "its",
    "itself", "just", "me", "more", "most", "my", "myself", "no", "nor", "not", "now", "of",
    "off", "on", "once", "only", "or", "other", "our", "ours", "ourselves", "out", "over",
    "own", "same", "she", "should", "so", "some", "such", "than", "that", "the", "their",
    "theirs", "them", "themselves", "then", "there", "these", "they", "this", "those",
    "through", "to", "too", "under", "until", "up", "very", "was", "we", "were", "what",
    "when", "where", "which", "while", "who", "whom", "why", "will", "with", "would", "you",
    "your", "yours", "yourself", "yourselves",
];

/// A TF-IDF index over a chunk corpus.
///
/// Building never fails: an empty corpus, or one where every chunk text is
/// empty or all stop words, produces an *inactive* index whose queries return
/// an empty result.
pub struct SparseIndex {
    chunks: Vec<Arc<Chunk>>,
    vocabulary: HashMap<String, usize>,
    idf: Vec<f32>,
    /// Per-chunk sparse rows: (term index, weight), sorted by term index,
    /// L2-normalized. Chunks with no vocabulary terms have an empty row.
    rows: Vec<Vec<(usize, f32)>>,
}

impl SparseIndex {
    /// Build an index over `corpus`, in corpus order.
    pub fn build(corpus: &[Arc<Chunk>]) -> Self {
        let tokenized: Vec<Vec<String>> = corpus.iter().map(|c| extract_terms(&c.text)).collect();

        let mut vocabulary: HashMap<String, usize> = HashMap::new();
        for terms in &tokenized {
            for term in terms {
                if !vocabulary.contains_key(term) {
                    vocabulary.insert(term.clone(), vocabulary.len());
                }
            }
        }

        if vocabulary.is_empty() {
            info!(chunks = corpus.len(), "sparse index inactive: no indexable terms");
            return Self {
                chunks: Vec::new(),
                vocabulary,
                idf: Vec::new(),
                rows: Vec::new(),
            };
        }

        let n_docs = corpus.len() as f32;
        let mut df = vec![0usize; vocabulary.len()];
        let mut counts_per_doc: Vec<HashMap<usize, f32>> = Vec::with_capacity(corpus.len());
        for terms in &tokenized {
            let mut counts: HashMap<usize, f32> = HashMap::new();
            for term in terms {
                *counts.entry(vocabulary[term]).or_insert(0.0) += 1.0;
            }
            for &idx in counts.keys() {
                df[idx] += 1;
            }
            counts_per_doc.push(counts);
        }

        // Smoothed IDF: ln((1 + n) / (1 + df)) + 1.
        let idf: Vec<f32> =
            df.iter().map(|&d| ((1.0 + n_docs) / (1.0 + d as f32)).ln() + 1.0).collect();

        let rows = counts_per_doc
            .into_iter()
            .map(|counts| {
                let mut row: Vec<(usize, f32)> =
                    counts.into_iter().map(|(idx, count)| (idx, count * idf[idx])).collect();
                row.sort_unstable_by_key(|&(idx, _)| idx);
                l2_normalize(&mut row);
                row
            })
            .collect();

        info!(chunks = corpus.len(), terms = vocabulary.len(), "built sparse index");
        Self { chunks: corpus.to_vec(), vocabulary, idf, rows }
    }

    /// Whether the index holds any indexable terms.
    pub fn is_active(&self) -> bool {
        !self.vocabulary.is_empty()
    }

    /// Number of chunks in the indexed corpus.
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Whether the indexed corpus is empty.
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Top-k lexical query against the corpus.
    ///
    /// Projects `text` into the vocabulary space and scores every chunk by
    /// cosine similarity. Only strictly positive scores are returned, sorted
    /// descending with corpus order breaking ties. An inactive index, or a
    /// query with no vocabulary terms, returns an empty result.
    pub fn query(&self, text: &str, top_k: usize) -> Vec<Candidate> {
        if !self.is_active() {
            return Vec::new();
        }

        let mut counts: HashMap<usize, f32> = HashMap::new();
        for term in extract_terms(text) {
            if let Some(&idx) = self.vocabulary.get(&term) {
                *counts.entry(idx).or_insert(0.0) += 1.0;
            }
        }
        if counts.is_empty() {
            debug!("sparse query has no indexable terms");
            return Vec::new();
        }

        let mut query_vec: Vec<(usize, f32)> =
            counts.into_iter().map(|(idx, count)| (idx, count * self.idf[idx])).collect();
        query_vec.sort_unstable_by_key(|&(idx, _)| idx);
        l2_normalize(&mut query_vec);

        let mut hits: Vec<Candidate> = self
            .rows
            .iter()
            .enumerate()
            .filter_map(|(doc_idx, row)| {
                let score = sparse_dot(row, &query_vec);
                (score > 0.0).then(|| Candidate::new(Arc::clone(&self.chunks[doc_idx]), score))
            })
            .collect();

        // Stable sort: ties keep corpus order.
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(top_k);
        hits
    }
}

/// Lowercased unigrams and bigrams with stop words removed.
///
/// Tokens are maximal alphanumeric runs of length >= 2; bigrams join
/// consecutive surviving tokens with a space.
fn extract_terms(text: &str) -> Vec<String> {
    let tokens: Vec<String> = text
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() >= 2 && !STOP_WORDS.contains(t))
        .map(str::to_string)
        .collect();

    let mut terms = tokens.clone();
    for pair in tokens.windows(2) {
        terms.push(format!("{} {}", pair[0], pair[1]));
    }
    terms
}

fn l2_normalize(vector: &mut [(usize, f32)]) {
    let norm = vector.iter().map(|&(_, w)| w * w).sum::<f32>().sqrt();
    if norm > 0.0 {
        for (_, w) in vector.iter_mut() {
            *w /= norm;
        }
    }
}

/// Dot product of two index-sorted sparse vectors.
fn sparse_dot(a: &[(usize, f32)], b: &[(usize, f32)]) -> f32 {
    let (mut i, mut j) = (0, 0);
    let mut sum = 0.0;
    while i < a.len() && j < b.len() {
        match a[i].0.cmp(&b[j].0) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                sum += a[i].1 * b[j].1;
                i += 1;
                j += 1;
            }
        }
    }
    sum
}
