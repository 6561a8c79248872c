//! Retrieval orchestration.
//!
//! [`RetrievalEngine`] wires the sparse index, the corpus store, and the
//! optional relevance oracle into a single `retrieve` call per request:
//! dense + sparse candidate collection, score fusion, oracle reranking,
//! near-duplicate filtering, and context assembly. The engine holds no
//! per-request state; every call is a pure transformation of its inputs and
//! the collaborators' responses.

use std::collections::HashSet;
use std::sync::Arc;

use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use crate::assemble::{
    AssemblyParams, ContextEntry, QuestionKind, SourceRef, assemble_context, extract_sources,
    format_context,
};
use crate::config::RetrievalConfig;
use crate::dedup::filter_near_duplicates;
use crate::document::Candidate;
use crate::error::{Result, RetrievalError};
use crate::fusion::{chunk_key, fuse_candidates};
use crate::rerank::{RankedEntry, RelevanceOracle, rerank};
use crate::sparse::SparseIndex;
use crate::store::{CorpusStore, DocumentFilter};

/// How candidates are gathered for a request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalMode {
    /// Top-k dense + sparse search, fused and reranked.
    #[default]
    Semantic,
    /// The whole corpus, deduplicated and assembled broadly. Used for
    /// counting/enumeration questions that must not miss chunks.
    Exhaustive,
}

/// One retrieval request, as resolved by the upstream reasoning layer.
#[derive(Debug, Clone)]
pub struct RetrievalRequest {
    /// The resolved query string.
    pub query: String,
    /// Additional query variants, searched alongside `query` against the
    /// dense channel.
    pub variants: Vec<String>,
    /// Candidate-gathering mode.
    pub mode: RetrievalMode,
    /// Optional document-name filter.
    pub document_filter: Option<DocumentFilter>,
    /// Question shape; enumeration kinds select broad assembly.
    pub question_kind: QuestionKind,
}

impl RetrievalRequest {
    /// A semantic request for `query` with no variants, filter, or kind tag.
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            variants: Vec::new(),
            mode: RetrievalMode::default(),
            document_filter: None,
            question_kind: QuestionKind::default(),
        }
    }

    /// Add dense-channel query variants.
    pub fn with_variants(mut self, variants: Vec<String>) -> Self {
        self.variants = variants;
        self
    }

    /// Set the retrieval mode.
    pub fn with_mode(mut self, mode: RetrievalMode) -> Self {
        self.mode = mode;
        self
    }

    /// Restrict retrieval to one document.
    pub fn with_document_filter(mut self, filter: DocumentFilter) -> Self {
        self.document_filter = Some(filter);
        self
    }

    /// Tag the question kind.
    pub fn with_question_kind(mut self, kind: QuestionKind) -> Self {
        self.question_kind = kind;
        self
    }
}

/// Assembled context plus citation metadata for one request.
#[derive(Debug, Clone)]
pub struct RetrievalOutput {
    /// Selected context entries, in acceptance order.
    pub entries: Vec<ContextEntry>,
    /// Unique source citations, in first-seen order.
    pub sources: Vec<SourceRef>,
}

impl RetrievalOutput {
    /// Whether no context was selected.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Render the entries for the downstream generator.
    pub fn format_context(&self) -> String {
        format_context(&self.entries)
    }
}

/// The retrieval engine.
///
/// Construct one via [`RetrievalEngine::builder()`]. The engine is cheap to
/// share behind an `Arc`; `retrieve` takes `&self` and holds the sparse-index
/// lock only while querying it.
pub struct RetrievalEngine {
    config: RetrievalConfig,
    store: Arc<dyn CorpusStore>,
    oracle: Option<Arc<dyn RelevanceOracle>>,
    sparse: RwLock<Arc<SparseIndex>>,
}

impl RetrievalEngine {
    /// Create a new [`RetrievalEngineBuilder`].
    pub fn builder() -> RetrievalEngineBuilder {
        RetrievalEngineBuilder::default()
    }

    /// Return a reference to the engine configuration.
    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Rebuild the sparse index over the current corpus and swap it in.
    ///
    /// The new index is fully constructed before the swap, so concurrent
    /// `retrieve` calls never observe a partially-built index.
    pub async fn rebuild_sparse_index(&self, corpus: &[Arc<crate::document::Chunk>]) {
        let index = Arc::new(SparseIndex::build(corpus));
        *self.sparse.write().await = index;
        info!(chunks = corpus.len(), "sparse index rebuilt");
    }

    /// Retrieve and assemble context for one request.
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError::Store`] or [`RetrievalError::Oracle`] when a
    /// collaborator fails. Empty inputs (blank query, empty corpus, no
    /// candidates) produce an empty output, never an error.
    pub async fn retrieve(&self, request: &RetrievalRequest) -> Result<RetrievalOutput> {
        match request.mode {
            RetrievalMode::Semantic => self.retrieve_semantic(request).await,
            RetrievalMode::Exhaustive => self.retrieve_exhaustive(request).await,
        }
    }

    async fn retrieve_semantic(&self, request: &RetrievalRequest) -> Result<RetrievalOutput> {
        if request.query.trim().is_empty() {
            return Ok(RetrievalOutput { entries: Vec::new(), sources: Vec::new() });
        }
        let filter = request.document_filter.as_ref();

        // One dense search per query variant, dispatched concurrently. All
        // must complete before fusion: normalization needs the full set.
        let mut queries: Vec<&str> = vec![request.query.as_str()];
        for variant in &request.variants {
            if !variant.trim().is_empty() && !queries.contains(&variant.as_str()) {
                queries.push(variant);
            }
        }
        let searches =
            queries.iter().map(|q| self.store.similarity_search(q, self.config.dense_k, filter));
        let per_variant = try_join_all(searches).await.map_err(|e| {
            error!(error = %e, "dense search failed");
            e
        })?;

        // Union across variants, first hit per chunk wins.
        let mut dense: Vec<Candidate> = Vec::new();
        let mut seen = HashSet::new();
        for candidate in per_variant.into_iter().flatten() {
            if let Some(filter) = filter {
                if !filter.matches(&candidate.chunk.metadata.document_name) {
                    continue;
                }
            }
            if seen.insert(chunk_key(&candidate.chunk)) {
                dense.push(candidate);
            }
        }
        info!(dense = dense.len(), queries = queries.len(), "collected dense candidates");

        let sparse_index = Arc::clone(&*self.sparse.read().await);
        let mut sparse = sparse_index.query(&request.query, self.config.sparse_k);
        if let Some(filter) = filter {
            sparse.retain(|c| filter.matches(&c.chunk.metadata.document_name));
        }
        info!(sparse = sparse.len(), "collected sparse candidates");

        let fused =
            fuse_candidates(&dense, &sparse, self.config.dense_weight, self.config.sparse_weight);

        let ranked: Vec<RankedEntry> = match &self.oracle {
            Some(oracle) => {
                rerank(
                    oracle.as_ref(),
                    &request.query,
                    fused,
                    self.config.rerank_input_k,
                    self.config.rerank_top_k,
                )
                .await
                .map_err(|e| {
                    error!(error = %e, "reranking failed");
                    e
                })?
            }
            // No oracle configured: the fused order stands.
            None => fused.into_iter().map(RankedEntry::from).collect(),
        };

        let unique = filter_near_duplicates(
            ranked,
            self.config.similarity_threshold,
            self.config.dedup_max_accepted,
        );
        let params = AssemblyParams {
            max_chunks: self.config.max_context_chunks,
            token_budget: self.config.token_budget,
            broad: request.question_kind.is_enumeration(),
        };
        let entries = assemble_context(unique, &params);
        let sources = extract_sources(&entries);
        info!(entries = entries.len(), sources = sources.len(), "semantic retrieval complete");
        Ok(RetrievalOutput { entries, sources })
    }

    async fn retrieve_exhaustive(&self, request: &RetrievalRequest) -> Result<RetrievalOutput> {
        let all = self.store.get_all(None).await.map_err(|e| {
            error!(error = %e, "exhaustive retrieval failed");
            e
        })?;
        info!(candidates = all.len(), "exhaustive retrieval");

        let candidates = match request.document_filter.as_ref() {
            Some(filter) => {
                let filtered: Vec<Candidate> = all
                    .iter()
                    .filter(|c| filter.matches(&c.chunk.metadata.document_name))
                    .cloned()
                    .collect();
                if filtered.is_empty() {
                    if self.config.widen_empty_filter {
                        warn!(
                            filter = %filter.name(),
                            "document filter matched nothing, widening to the full corpus"
                        );
                        all
                    } else {
                        warn!(filter = %filter.name(), "document filter matched nothing");
                        filtered
                    }
                } else {
                    info!(
                        filter = %filter.name(),
                        kept = filtered.len(),
                        total = all.len(),
                        "applied document filter"
                    );
                    filtered
                }
            }
            None => all,
        };

        // No fusion or reranking here: every chunk matters for
        // counting/enumeration, and the uniform get_all scores carry no order.
        let ranked: Vec<RankedEntry> = candidates
            .into_iter()
            .map(|c| RankedEntry { chunk: c.chunk, fused_score: c.score, rerank_score: None })
            .collect();
        let unique = filter_near_duplicates(
            ranked,
            self.config.exhaustive_similarity_threshold,
            self.config.dedup_max_accepted,
        );
        let params = AssemblyParams {
            max_chunks: self.config.exhaustive_max_chunks,
            token_budget: self.config.token_budget,
            broad: true,
        };
        let entries = assemble_context(unique, &params);
        if entries.is_empty() {
            warn!("exhaustive retrieval selected no context entries");
        }
        let sources = extract_sources(&entries);
        info!(entries = entries.len(), sources = sources.len(), "exhaustive retrieval complete");
        Ok(RetrievalOutput { entries, sources })
    }
}

/// Builder for constructing a [`RetrievalEngine`].
///
/// The corpus store is required; the oracle and sparse index are optional.
/// Without an oracle the fused order stands, and without a sparse index the
/// lexical channel contributes nothing until
/// [`rebuild_sparse_index`](RetrievalEngine::rebuild_sparse_index) is called.
#[derive(Default)]
pub struct RetrievalEngineBuilder {
    config: Option<RetrievalConfig>,
    store: Option<Arc<dyn CorpusStore>>,
    oracle: Option<Arc<dyn RelevanceOracle>>,
    sparse_index: Option<SparseIndex>,
}

impl RetrievalEngineBuilder {
    /// Set the engine configuration (defaults to [`RetrievalConfig::default`]).
    pub fn config(mut self, config: RetrievalConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the corpus store backend.
    pub fn store(mut self, store: Arc<dyn CorpusStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the relevance oracle used for reranking.
    pub fn oracle(mut self, oracle: Arc<dyn RelevanceOracle>) -> Self {
        self.oracle = Some(oracle);
        self
    }

    /// Set the sparse lexical index over the current corpus.
    pub fn sparse_index(mut self, index: SparseIndex) -> Self {
        self.sparse_index = Some(index);
        self
    }

    /// Build the [`RetrievalEngine`].
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError::Config`] if the store is missing.
    pub fn build(self) -> Result<RetrievalEngine> {
        let store =
            self.store.ok_or_else(|| RetrievalError::Config("store is required".to_string()))?;
        let sparse = self.sparse_index.unwrap_or_else(|| SparseIndex::build(&[]));
        Ok(RetrievalEngine {
            config: self.config.unwrap_or_default(),
            store,
            oracle: self.oracle,
            sparse: RwLock::new(Arc::new(sparse)),
        })
    }
}
