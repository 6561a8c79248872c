//! Error types for the `contextrank` crate.

use thiserror::Error;

/// Errors that can occur during retrieval ranking and context assembly.
///
/// Empty inputs are never errors: every stage returns an empty result for an
/// empty corpus, candidate list, or query. Errors are reserved for failing
/// collaborators and invalid configuration.
#[derive(Debug, Error)]
pub enum RetrievalError {
    /// The corpus store collaborator failed.
    #[error("Corpus store error ({backend}): {message}")]
    Store {
        /// The store backend that produced the error.
        backend: String,
        /// A description of the failure.
        message: String,
    },

    /// The relevance oracle failed or was unavailable.
    #[error("Relevance oracle error: {0}")]
    Oracle(String),

    /// A configuration validation error.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// A convenience result type for retrieval operations.
pub type Result<T> = std::result::Result<T, RetrievalError>;
