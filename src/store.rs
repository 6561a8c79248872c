//! The corpus store collaborator interface.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::document::{Candidate, Chunk};
use crate::error::Result;

/// A document-name filter with flexible matching.
///
/// Matching is case-insensitive; common file extensions (`.pdf`, `.docx`,
/// `.xlsx`) are stripped and `_`/`-` normalized to spaces before comparing,
/// and containment in either direction counts. "q3 report" matches
/// "Q3_Report.pdf".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentFilter {
    name: String,
}

impl DocumentFilter {
    /// Create a filter for the given document name.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// The requested document name, as given.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether `document_name` matches this filter.
    pub fn matches(&self, document_name: &str) -> bool {
        let filter = self.name.to_lowercase();
        let name = document_name.to_lowercase();
        if filter == name || filter.contains(&name) || name.contains(&filter) {
            return true;
        }
        let filter_base = base_form(&filter);
        let name_base = base_form(&name);
        filter_base == name_base
            || (!filter_base.is_empty()
                && !name_base.is_empty()
                && (filter_base.contains(&name_base) || name_base.contains(&filter_base)))
    }
}

/// Lowercased name with known extensions stripped and separators normalized
/// to spaces.
fn base_form(name: &str) -> String {
    name.replace(".pdf", "")
        .replace(".docx", "")
        .replace(".xlsx", "")
        .replace(['_', '-'], " ")
}

/// The external corpus/vector-store collaborator.
///
/// Implementations own chunk storage, embeddings, and dense similarity
/// search; this crate never computes embeddings itself and holds no durable
/// state of its own.
#[async_trait]
pub trait CorpusStore: Send + Sync {
    /// Dense similarity search: the `k` chunks most similar to `query`, best
    /// first, with channel-native scores.
    ///
    /// Implementations may apply `filter` natively or ignore it; the engine
    /// re-applies document filters in post-processing either way.
    async fn similarity_search(
        &self,
        query: &str,
        k: usize,
        filter: Option<&DocumentFilter>,
    ) -> Result<Vec<Candidate>>;

    /// Every chunk in the corpus, for exhaustive retrieval.
    ///
    /// Stores without a similarity signal here should report a uniform score
    /// of 1.0 per candidate.
    async fn get_all(&self, filter: Option<&DocumentFilter>) -> Result<Vec<Candidate>>;

    /// Add chunks to the corpus. Reindexing is the caller's responsibility:
    /// dense on the store's side, sparse via
    /// [`RetrievalEngine::rebuild_sparse_index`](crate::engine::RetrievalEngine::rebuild_sparse_index).
    async fn add_chunks(&self, chunks: Vec<Arc<Chunk>>) -> Result<()>;
}
