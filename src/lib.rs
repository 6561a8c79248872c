//! Hybrid retrieval ranking and context assembly for RAG pipelines.
//!
//! `contextrank` combines dense (vector) and sparse (TF-IDF) relevance
//! signals into a single ranked candidate list, refines the top slice with an
//! injected relevance oracle, strips near-duplicate passages, and packs a
//! token-budgeted, document-diverse context window with citation metadata.
//! It never sees the generated answer.
//!
//! The crate is a pure scoring/assembly library invoked once per retrieval
//! request. Embedding computation, generation, query rewriting, chunking
//! policy, and storage belong to collaborators behind the [`CorpusStore`] and
//! [`RelevanceOracle`] traits.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use contextrank::{RetrievalConfig, RetrievalEngine, RetrievalRequest, SparseIndex};
//!
//! let engine = RetrievalEngine::builder()
//!     .config(RetrievalConfig::default())
//!     .store(Arc::new(my_store))
//!     .oracle(Arc::new(my_cross_encoder)) // optional
//!     .sparse_index(SparseIndex::build(&corpus))
//!     .build()?;
//!
//! let output = engine.retrieve(&RetrievalRequest::new("what changed in Q3?")).await?;
//! println!("{}", output.format_context());
//! for source in &output.sources {
//!     println!("cited: {}", source.name);
//! }
//! ```

pub mod assemble;
pub mod config;
pub mod dedup;
pub mod document;
pub mod engine;
pub mod error;
pub mod fusion;
pub mod rerank;
pub mod sparse;
pub mod store;

pub use assemble::{
    AssemblyParams, ContextEntry, QuestionKind, SourceRef, assemble_context, count_tokens,
    extract_sources, format_context,
};
pub use config::{RetrievalConfig, RetrievalConfigBuilder};
pub use dedup::{filter_near_duplicates, normalize_text, similarity_ratio};
pub use document::{Candidate, Chunk, ChunkMetadata, SourceType};
pub use engine::{
    RetrievalEngine, RetrievalEngineBuilder, RetrievalMode, RetrievalOutput, RetrievalRequest,
};
pub use error::{Result, RetrievalError};
pub use fusion::{FusedEntry, fuse_candidates, normalize_scores};
pub use rerank::{RankedEntry, RelevanceOracle, rerank};
pub use sparse::SparseIndex;
pub use store::{CorpusStore, DocumentFilter};
