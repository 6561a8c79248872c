//! Dense/sparse score fusion.
//!
//! Merges candidate lists from the dense (vector) and sparse (lexical)
//! channels into one ranked list: duplicates collapse by keeping the maximum
//! score per channel, each channel's scores are min-max normalized
//! independently, and the two normalized signals combine as a weighted sum.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::document::{Candidate, Chunk};

/// A candidate after fusion, carrying both per-channel scores and the
/// combined score.
#[derive(Debug, Clone)]
pub struct FusedEntry {
    /// The fused chunk.
    pub chunk: Arc<Chunk>,
    /// Maximum dense score seen for this chunk (0.0 if dense never saw it).
    pub dense_score: f32,
    /// Maximum sparse score seen for this chunk (0.0 if sparse never saw it).
    pub sparse_score: f32,
    /// Weighted sum of the normalized channel scores (higher is better).
    pub fused_score: f32,
}

/// Identity key for aggregation: the chunk id, or pointer identity when the
/// id is empty (degraded but safe).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum ChunkKey {
    Id(String),
    Identity(usize),
}

pub(crate) fn chunk_key(chunk: &Arc<Chunk>) -> ChunkKey {
    if chunk.metadata.chunk_id.is_empty() {
        warn!(
            document = %chunk.metadata.document_name,
            "chunk has no chunk_id, falling back to pointer identity"
        );
        ChunkKey::Identity(Arc::as_ptr(chunk) as usize)
    } else {
        ChunkKey::Id(chunk.metadata.chunk_id.clone())
    }
}

/// Min-max normalize `values` into `[0, 1]`.
///
/// A list of equal values (including all zeros) normalizes to 1.0 for every
/// entry: a uniform signal carries no ordering information and must not be
/// zeroed out, and this also keeps the division well-defined.
pub fn normalize_scores(values: &[f32]) -> Vec<f32> {
    if values.is_empty() {
        return Vec::new();
    }
    let min = values.iter().copied().fold(f32::INFINITY, f32::min);
    let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    if (max - min).abs() < 1e-9 {
        return vec![1.0; values.len()];
    }
    values.iter().map(|v| (v - min) / (max - min)).collect()
}

/// Fuse dense and sparse candidate lists into one ranked list.
///
/// Candidates aggregate by chunk id, keeping the maximum score per channel;
/// a chunk seen by only one channel scores 0.0 on the other. Aggregation
/// preserves first-seen order (dense list first), and the final descending
/// sort is stable, so identical inputs always produce identical output
/// ordering. Returns an empty list only when both inputs are empty.
pub fn fuse_candidates(
    dense: &[Candidate],
    sparse: &[Candidate],
    dense_weight: f32,
    sparse_weight: f32,
) -> Vec<FusedEntry> {
    struct Aggregate {
        chunk: Arc<Chunk>,
        dense_score: f32,
        sparse_score: f32,
    }

    let mut entries: Vec<Aggregate> = Vec::new();
    let mut index: HashMap<ChunkKey, usize> = HashMap::new();

    let mut merge = |candidate: &Candidate, is_dense: bool| {
        let slot = *index.entry(chunk_key(&candidate.chunk)).or_insert_with(|| {
            entries.push(Aggregate {
                chunk: Arc::clone(&candidate.chunk),
                dense_score: 0.0,
                sparse_score: 0.0,
            });
            entries.len() - 1
        });
        let entry = &mut entries[slot];
        if is_dense {
            entry.dense_score = entry.dense_score.max(candidate.score);
        } else {
            entry.sparse_score = entry.sparse_score.max(candidate.score);
        }
    };

    for candidate in dense {
        merge(candidate, true);
    }
    for candidate in sparse {
        merge(candidate, false);
    }

    if entries.is_empty() {
        return Vec::new();
    }

    let dense_norm = normalize_scores(&entries.iter().map(|e| e.dense_score).collect::<Vec<_>>());
    let sparse_norm = normalize_scores(&entries.iter().map(|e| e.sparse_score).collect::<Vec<_>>());

    let mut fused: Vec<FusedEntry> = entries
        .into_iter()
        .zip(dense_norm.iter().zip(sparse_norm.iter()))
        .map(|(entry, (&dn, &sn))| FusedEntry {
            chunk: entry.chunk,
            dense_score: entry.dense_score,
            sparse_score: entry.sparse_score,
            fused_score: dense_weight * dn + sparse_weight * sn,
        })
        .collect();

    fused.sort_by(|a, b| {
        b.fused_score.partial_cmp(&a.fused_score).unwrap_or(std::cmp::Ordering::Equal)
    });

    debug!(dense = dense.len(), sparse = sparse.len(), fused = fused.len(), "fused candidates");
    fused
}
