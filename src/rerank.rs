//! Relevance reranking against an injected pairwise oracle.

use std::sync::Arc;

use async_trait::async_trait;

use crate::document::Chunk;
use crate::error::{Result, RetrievalError};
use crate::fusion::FusedEntry;

/// An external pairwise relevance scorer (e.g. a cross-encoder scoring
/// service).
///
/// The oracle is an explicitly constructed capability owned by the caller;
/// the core never instantiates one. Scoring is typically expensive, so the
/// engine bounds how many candidates reach it.
#[async_trait]
pub trait RelevanceOracle: Send + Sync {
    /// Score each passage against the query.
    ///
    /// Must return exactly one score per passage, in input order, with no
    /// side effects.
    async fn score_batch(&self, query: &str, passages: &[String]) -> Result<Vec<f32>>;
}

/// A fusion candidate, optionally refined with an oracle score.
#[derive(Debug, Clone)]
pub struct RankedEntry {
    /// The ranked chunk.
    pub chunk: Arc<Chunk>,
    /// The fused dense/sparse score.
    pub fused_score: f32,
    /// The oracle's relevance score, when reranking ran.
    pub rerank_score: Option<f32>,
}

impl RankedEntry {
    /// Score used for ordering: the oracle score when present, else the
    /// fused score.
    pub fn ordering_score(&self) -> f32 {
        self.rerank_score.unwrap_or(self.fused_score)
    }
}

impl From<FusedEntry> for RankedEntry {
    fn from(entry: FusedEntry) -> Self {
        Self { chunk: entry.chunk, fused_score: entry.fused_score, rerank_score: None }
    }
}

/// Rerank the top slice of `candidates` with the oracle.
///
/// At most `input_k` candidates (by fused order) are scored, in one batch
/// call. Results are stable-sorted descending by oracle score — ties keep
/// their fused-score order — and truncated to `top_k`. An empty candidate
/// list returns empty without invoking the oracle.
///
/// # Errors
///
/// Returns [`RetrievalError::Oracle`] if the oracle fails or returns the
/// wrong number of scores.
pub async fn rerank(
    oracle: &dyn RelevanceOracle,
    query: &str,
    candidates: Vec<FusedEntry>,
    input_k: usize,
    top_k: usize,
) -> Result<Vec<RankedEntry>> {
    if candidates.is_empty() {
        return Ok(Vec::new());
    }

    let mut limited: Vec<RankedEntry> =
        candidates.into_iter().take(input_k).map(RankedEntry::from).collect();

    let passages: Vec<String> = limited.iter().map(|e| e.chunk.text.clone()).collect();
    let scores = oracle.score_batch(query, &passages).await?;
    if scores.len() != limited.len() {
        return Err(RetrievalError::Oracle(format!(
            "oracle returned {} scores for {} passages",
            scores.len(),
            limited.len()
        )));
    }

    for (entry, score) in limited.iter_mut().zip(scores) {
        entry.rerank_score = Some(score);
    }
    limited.sort_by(|a, b| {
        b.ordering_score().partial_cmp(&a.ordering_score()).unwrap_or(std::cmp::Ordering::Equal)
    });
    limited.truncate(top_k);
    Ok(limited)
}
