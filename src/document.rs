//! Data types for chunks, chunk metadata, and retrieval candidates.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Whether a chunk carries original document text or a generated section summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    /// Raw text split from the source document.
    #[default]
    Chunk,
    /// A summary standing in for a longer section.
    Summary,
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceType::Chunk => f.write_str("chunk"),
            SourceType::Summary => f.write_str("summary"),
        }
    }
}

/// Metadata attached to every [`Chunk`].
///
/// The fields the retrieval core depends on for identity and grouping are
/// typed and required; anything else a chunking or ingestion stage wants to
/// carry rides in the open `extra` map, which the core never interprets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Unique chunk identifier. Fusion and deduplication key on this.
    pub chunk_id: String,
    /// Name of the source document that owns this chunk.
    pub document_name: String,
    /// Whether this is raw document text or a section summary.
    #[serde(default)]
    pub source_type: SourceType,
    /// Page number within the source document, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    /// For summary chunks, the section the summary covers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary_of_section: Option<String>,
    /// Display name overriding `document_name` in citations (e.g. a URL path).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_source: Option<String>,
    /// URL of the original source, for documents ingested from the web.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    /// Open side-channel for extension fields the core does not interpret.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl ChunkMetadata {
    /// Create metadata with the required identity fields; everything else
    /// starts empty.
    pub fn new(chunk_id: impl Into<String>, document_name: impl Into<String>) -> Self {
        Self {
            chunk_id: chunk_id.into(),
            document_name: document_name.into(),
            source_type: SourceType::default(),
            page: None,
            summary_of_section: None,
            display_source: None,
            source_url: None,
            extra: BTreeMap::new(),
        }
    }

    /// Display name used in citations: `display_source` when set, else
    /// `document_name`, else `"unknown"`.
    pub fn display_name(&self) -> &str {
        if let Some(display) = self.display_source.as_deref() {
            if !display.is_empty() {
                return display;
            }
        }
        if self.document_name.is_empty() { "unknown" } else { &self.document_name }
    }
}

/// An immutable unit of retrievable text.
///
/// Chunks are created once by the (external) chunking stage, owned by the
/// corpus for its lifetime, and shared by reference (`Arc<Chunk>`) through
/// every retrieval stage. The core never mutates them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// The chunk text.
    pub text: String,
    /// Identity, grouping, and citation metadata.
    pub metadata: ChunkMetadata,
}

impl Chunk {
    /// Create a chunk from text and metadata.
    pub fn new(text: impl Into<String>, metadata: ChunkMetadata) -> Self {
        Self { text: text.into(), metadata }
    }
}

/// A (chunk, score) hit from a single retrieval channel (dense or sparse).
///
/// Transient, created per query. Scores are channel-native and not comparable
/// across channels until fusion normalizes them.
#[derive(Debug, Clone)]
pub struct Candidate {
    /// The retrieved chunk.
    pub chunk: Arc<Chunk>,
    /// The channel's relevance score (higher is more relevant).
    pub score: f32,
}

impl Candidate {
    /// Pair a chunk with a channel score.
    pub fn new(chunk: Arc<Chunk>, score: f32) -> Self {
        Self { chunk, score }
    }
}
