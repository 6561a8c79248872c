//! Near-duplicate filtering.
//!
//! Removes passages that are close textual copies of already-accepted
//! entries, so the assembled context is not wasted on repeated content. The
//! filter is intentionally greedy and order-dependent: each candidate is
//! compared only against the entries accepted before it, and input order is
//! preserved for reproducibility.

use tracing::debug;

use crate::rerank::RankedEntry;

/// Collapse whitespace runs to single spaces and trim.
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Ratcliff/Obershelp similarity ratio over characters, in `[0, 1]`.
///
/// `2 * M / T`, where `M` is the total length of matching blocks found by
/// recursively locating the longest common substring, and `T` is the
/// combined length of both inputs. Two empty strings are identical (1.0).
pub fn similarity_ratio(a: &str, b: &str) -> f32 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    let matched = matching_chars(&a, &b);
    2.0 * matched as f32 / total as f32
}

fn matching_chars(a: &[char], b: &[char]) -> usize {
    if a.is_empty() || b.is_empty() {
        return 0;
    }
    let (a_start, b_start, len) = longest_common_block(a, b);
    if len == 0 {
        return 0;
    }
    len + matching_chars(&a[..a_start], &b[..b_start])
        + matching_chars(&a[a_start + len..], &b[b_start + len..])
}

/// Longest common contiguous block, earliest occurrence on ties.
fn longest_common_block(a: &[char], b: &[char]) -> (usize, usize, usize) {
    let mut b_positions: std::collections::HashMap<char, Vec<usize>> =
        std::collections::HashMap::new();
    for (j, &ch) in b.iter().enumerate() {
        b_positions.entry(ch).or_default().push(j);
    }

    let (mut best_a, mut best_b, mut best_len) = (0, 0, 0);
    // lengths[j] = length of the common block ending at a[i], b[j].
    let mut lengths: std::collections::HashMap<usize, usize> = std::collections::HashMap::new();
    for (i, &ch) in a.iter().enumerate() {
        let mut next_lengths = std::collections::HashMap::new();
        if let Some(positions) = b_positions.get(&ch) {
            for &j in positions {
                let len = if j > 0 { lengths.get(&(j - 1)).copied().unwrap_or(0) } else { 0 } + 1;
                next_lengths.insert(j, len);
                if len > best_len {
                    best_a = i + 1 - len;
                    best_b = j + 1 - len;
                    best_len = len;
                }
            }
        }
        lengths = next_lengths;
    }
    (best_a, best_b, best_len)
}

/// Filter near-duplicates out of a best-first ranked list.
///
/// Entries are visited in order. An entry is dropped when its normalized
/// text is empty, or when its similarity ratio against *any* already-accepted
/// entry exceeds `threshold`. `max_accepted` caps the accepted set, bounding
/// the O(accepted x candidates) comparison cost.
///
/// Only the accepted set is consulted, never the full candidate set, so a
/// later near-duplicate of a not-yet-accepted entry can survive; callers that
/// need reproducibility must preserve input order.
pub fn filter_near_duplicates(
    entries: Vec<RankedEntry>,
    threshold: f32,
    max_accepted: usize,
) -> Vec<RankedEntry> {
    let mut accepted: Vec<RankedEntry> = Vec::new();
    let mut accepted_texts: Vec<String> = Vec::new();

    for entry in entries {
        if accepted.len() >= max_accepted {
            break;
        }
        let text = normalize_text(&entry.chunk.text);
        if text.is_empty() {
            debug!(chunk_id = %entry.chunk.metadata.chunk_id, "dropped empty chunk");
            continue;
        }
        if accepted_texts.iter().any(|existing| similarity_ratio(&text, existing) > threshold) {
            debug!(chunk_id = %entry.chunk.metadata.chunk_id, "dropped near-duplicate chunk");
            continue;
        }
        accepted_texts.push(text);
        accepted.push(entry);
    }

    accepted
}
