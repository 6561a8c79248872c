//! Configuration for the retrieval engine.

use serde::{Deserialize, Serialize};

use crate::error::{Result, RetrievalError};

/// Configuration parameters for retrieval ranking and context assembly.
///
/// The defaults reproduce the reference tuning: dense/sparse fusion weights
/// of 0.7/0.3, a rerank ceiling of 30 candidates narrowed to a top 7, five
/// context chunks under a 1400-token budget in semantic mode, and looser
/// deduplication (0.90) with up to 100 chunks in exhaustive mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Weight of the normalized dense score in fusion.
    pub dense_weight: f32,
    /// Weight of the normalized sparse score in fusion.
    pub sparse_weight: f32,
    /// Dense candidates requested per query variant.
    pub dense_k: usize,
    /// Sparse candidates requested from the lexical index.
    pub sparse_k: usize,
    /// Fused candidates passed to the relevance oracle (cost ceiling).
    pub rerank_input_k: usize,
    /// Reranked candidates kept after oracle scoring.
    pub rerank_top_k: usize,
    /// Maximum context entries assembled in semantic mode.
    pub max_context_chunks: usize,
    /// Maximum context entries assembled in exhaustive mode.
    pub exhaustive_max_chunks: usize,
    /// Token budget for the assembled context (tripled in broad/exhaustive
    /// selection).
    pub token_budget: usize,
    /// Near-duplicate similarity threshold in semantic mode; candidates more
    /// similar than this to an accepted entry are dropped.
    pub similarity_threshold: f32,
    /// Looser near-duplicate threshold used in exhaustive mode.
    pub exhaustive_similarity_threshold: f32,
    /// Hard cap on the duplicate filter's accepted set, bounding its
    /// O(accepted x candidates) comparison cost.
    pub dedup_max_accepted: usize,
    /// In exhaustive mode, fall back to the unfiltered corpus when a document
    /// filter matches nothing (logged as a warning). `false` returns the
    /// honest empty set instead.
    pub widen_empty_filter: bool,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            dense_weight: 0.7,
            sparse_weight: 0.3,
            dense_k: 50,
            sparse_k: 40,
            rerank_input_k: 30,
            rerank_top_k: 7,
            max_context_chunks: 5,
            exhaustive_max_chunks: 100,
            token_budget: 1400,
            similarity_threshold: 0.82,
            exhaustive_similarity_threshold: 0.90,
            dedup_max_accepted: 256,
            widen_empty_filter: true,
        }
    }
}

impl RetrievalConfig {
    /// Create a new builder for constructing a [`RetrievalConfig`].
    pub fn builder() -> RetrievalConfigBuilder {
        RetrievalConfigBuilder::default()
    }
}

/// Builder for constructing a validated [`RetrievalConfig`].
#[derive(Debug, Clone, Default)]
pub struct RetrievalConfigBuilder {
    config: RetrievalConfig,
}

impl RetrievalConfigBuilder {
    /// Set the fusion weights for the dense and sparse channels.
    ///
    /// The weights need not sum to 1; they only need to be finite,
    /// non-negative, and not both zero.
    pub fn fusion_weights(mut self, dense: f32, sparse: f32) -> Self {
        self.config.dense_weight = dense;
        self.config.sparse_weight = sparse;
        self
    }

    /// Set the number of dense candidates requested per query variant.
    pub fn dense_k(mut self, k: usize) -> Self {
        self.config.dense_k = k;
        self
    }

    /// Set the number of sparse candidates requested from the lexical index.
    pub fn sparse_k(mut self, k: usize) -> Self {
        self.config.sparse_k = k;
        self
    }

    /// Set the ceiling on candidates passed to the relevance oracle.
    pub fn rerank_input_k(mut self, k: usize) -> Self {
        self.config.rerank_input_k = k;
        self
    }

    /// Set the number of candidates kept after oracle reranking.
    pub fn rerank_top_k(mut self, k: usize) -> Self {
        self.config.rerank_top_k = k;
        self
    }

    /// Set the maximum context entries assembled in semantic mode.
    pub fn max_context_chunks(mut self, max: usize) -> Self {
        self.config.max_context_chunks = max;
        self
    }

    /// Set the maximum context entries assembled in exhaustive mode.
    pub fn exhaustive_max_chunks(mut self, max: usize) -> Self {
        self.config.exhaustive_max_chunks = max;
        self
    }

    /// Set the token budget for the assembled context.
    pub fn token_budget(mut self, budget: usize) -> Self {
        self.config.token_budget = budget;
        self
    }

    /// Set the near-duplicate similarity thresholds for semantic and
    /// exhaustive mode.
    pub fn similarity_thresholds(mut self, semantic: f32, exhaustive: f32) -> Self {
        self.config.similarity_threshold = semantic;
        self.config.exhaustive_similarity_threshold = exhaustive;
        self
    }

    /// Set the cap on the duplicate filter's accepted set.
    pub fn dedup_max_accepted(mut self, max: usize) -> Self {
        self.config.dedup_max_accepted = max;
        self
    }

    /// Set whether an exhaustive-mode document filter that matches nothing
    /// widens to the full corpus (`true`) or returns an empty set (`false`).
    pub fn widen_empty_filter(mut self, widen: bool) -> Self {
        self.config.widen_empty_filter = widen;
        self
    }

    /// Build the [`RetrievalConfig`], validating that parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError::Config`] if:
    /// - either fusion weight is negative or non-finite, or both are zero
    /// - either similarity threshold is outside `(0, 1]`
    /// - `max_context_chunks` or `exhaustive_max_chunks` is zero
    /// - `rerank_top_k` is zero
    pub fn build(self) -> Result<RetrievalConfig> {
        let c = &self.config;
        if !c.dense_weight.is_finite()
            || !c.sparse_weight.is_finite()
            || c.dense_weight < 0.0
            || c.sparse_weight < 0.0
        {
            return Err(RetrievalError::Config(format!(
                "fusion weights must be finite and non-negative (dense={}, sparse={})",
                c.dense_weight, c.sparse_weight
            )));
        }
        if c.dense_weight == 0.0 && c.sparse_weight == 0.0 {
            return Err(RetrievalError::Config(
                "at least one fusion weight must be positive".to_string(),
            ));
        }
        for (name, threshold) in [
            ("similarity_threshold", c.similarity_threshold),
            ("exhaustive_similarity_threshold", c.exhaustive_similarity_threshold),
        ] {
            if !(threshold > 0.0 && threshold <= 1.0) {
                return Err(RetrievalError::Config(format!(
                    "{name} must be in (0, 1], got {threshold}"
                )));
            }
        }
        if c.max_context_chunks == 0 || c.exhaustive_max_chunks == 0 {
            return Err(RetrievalError::Config(
                "context chunk limits must be greater than zero".to_string(),
            ));
        }
        if c.rerank_top_k == 0 {
            return Err(RetrievalError::Config("rerank_top_k must be greater than zero".to_string()));
        }
        Ok(self.config)
    }
}
