//! Token-budgeted, document-diverse context assembly.
//!
//! Selects the final context from a deduplicated ranked list. Entries are
//! grouped into per-document clusters, each cluster is guaranteed a minimum
//! quota, and remaining slots fill round-robin across clusters so that the
//! assembled context draws from every source document rather than
//! concentrating on one. Output order is acceptance order and is significant:
//! downstream citation numbering depends on it.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt::Write as _;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::document::Chunk;
use crate::rerank::RankedEntry;

/// Fallback cluster label for chunks without a document name.
const UNKNOWN_SOURCE: &str = "unknown-source";

/// The shape of the question, as tagged by the upstream reasoning layer.
///
/// Enumeration-style questions (count, list) select the broad assembly
/// policy: more documents touched, fewer entries guaranteed each.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionKind {
    /// A specific-fact or open question.
    #[default]
    General,
    /// "How many..." questions needing complete coverage.
    Count,
    /// "List all..." questions needing complete coverage.
    List,
    /// Questions about ordering of events.
    Timeline,
}

impl QuestionKind {
    /// Whether this kind needs breadth across documents over per-document
    /// depth.
    pub fn is_enumeration(self) -> bool {
        matches!(self, QuestionKind::Count | QuestionKind::List)
    }
}

/// Selection parameters for one assembly run.
#[derive(Debug, Clone, Copy)]
pub struct AssemblyParams {
    /// Maximum number of entries in the assembled context.
    pub max_chunks: usize,
    /// Base token budget for the assembled context.
    pub token_budget: usize,
    /// Broad selection: exhaustive retrieval or an enumeration-style
    /// question. Triples the effective budget, lowers per-cluster quotas, and
    /// permits (logged) budget overflow instead of starving the result.
    pub broad: bool,
}

/// A ranked entry selected into the final context.
#[derive(Debug, Clone)]
pub struct ContextEntry {
    /// The selected chunk.
    pub chunk: Arc<Chunk>,
    /// The fused dense/sparse score.
    pub fused_score: f32,
    /// The oracle's relevance score, when reranking ran.
    pub rerank_score: Option<f32>,
}

impl ContextEntry {
    /// The relevance score shown in citations: oracle score when present,
    /// else the fused score.
    pub fn relevance(&self) -> f32 {
        self.rerank_score.unwrap_or(self.fused_score)
    }
}

impl From<RankedEntry> for ContextEntry {
    fn from(entry: RankedEntry) -> Self {
        Self { chunk: entry.chunk, fused_score: entry.fused_score, rerank_score: entry.rerank_score }
    }
}

/// A unique (display name, optional source URL) citation pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRef {
    /// Display name of the source document.
    pub name: String,
    /// URL of the original source, when the document came from the web.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Approximate token count of a text: its whitespace-delimited word count.
pub fn count_tokens(text: &str) -> usize {
    text.split_whitespace().count()
}

fn cluster_label(chunk: &Chunk) -> &str {
    let name = chunk.metadata.document_name.as_str();
    if name.is_empty() { UNKNOWN_SOURCE } else { name }
}

/// Assemble the final context from a deduplicated, best-first ranked list.
///
/// Entries are clustered by document name; clusters sort by their best
/// entry's score and entries within a cluster by their own score (stable,
/// descending). Pass 1 takes each cluster's minimum quota in cluster order;
/// pass 2 fills remaining slots round-robin from the entries beyond each
/// cluster's quota. The token budget applies to both passes; in default mode
/// the very first accepted entry may exceed it (forward progress), while in
/// broad mode overflow is kept and logged rather than rejected.
///
/// Zero input entries produce an empty output, not an error. Output order is
/// acceptance order and deterministic for identical inputs.
pub fn assemble_context(entries: Vec<RankedEntry>, params: &AssemblyParams) -> Vec<ContextEntry> {
    if entries.is_empty() {
        return Vec::new();
    }

    // Group by document, preserving first-seen cluster order.
    let mut clusters: Vec<(String, Vec<RankedEntry>)> = Vec::new();
    let mut cluster_index: HashMap<String, usize> = HashMap::new();
    for entry in entries {
        let label = cluster_label(&entry.chunk).to_string();
        match cluster_index.get(&label) {
            Some(&idx) => clusters[idx].1.push(entry),
            None => {
                cluster_index.insert(label.clone(), clusters.len());
                clusters.push((label, vec![entry]));
            }
        }
    }

    for (_, cluster) in &mut clusters {
        cluster.sort_by(|a, b| {
            b.ordering_score().partial_cmp(&a.ordering_score()).unwrap_or(std::cmp::Ordering::Equal)
        });
    }
    clusters.sort_by(|a, b| {
        let best_a = a.1[0].ordering_score();
        let best_b = b.1[0].ordering_score();
        best_b.partial_cmp(&best_a).unwrap_or(std::cmp::Ordering::Equal)
    });

    info!(clusters = clusters.len(), "grouped candidates by document");
    for (name, cluster) in &clusters {
        debug!(document = %name, chunks = cluster.len(), "document cluster");
    }

    let effective_budget =
        if params.broad { params.token_budget * 3 } else { params.token_budget };
    let min_per_cluster = if params.broad {
        (params.max_chunks / (2 * clusters.len())).max(1)
    } else {
        (params.max_chunks / clusters.len()).max(2)
    };
    debug!(
        budget = effective_budget,
        quota = min_per_cluster,
        broad = params.broad,
        "assembly parameters"
    );

    let mut selected: Vec<ContextEntry> = Vec::new();
    let mut token_count = 0usize;

    // Pass 1: per-cluster minimum quota, cluster by cluster.
    'clusters: for (_, cluster) in &clusters {
        let mut added = 0;
        for entry in cluster {
            if selected.len() >= params.max_chunks {
                break 'clusters;
            }
            let tokens = count_tokens(&entry.chunk.text);
            if !params.broad && token_count + tokens > effective_budget && !selected.is_empty() {
                continue;
            }
            if params.broad && token_count + tokens > effective_budget {
                warn!(
                    tokens = token_count + tokens,
                    budget = effective_budget,
                    chunk_id = %entry.chunk.metadata.chunk_id,
                    "token budget exceeded in broad mode, keeping chunk"
                );
            }
            selected.push(entry.clone().into());
            token_count += tokens;
            added += 1;
            if added >= min_per_cluster {
                break;
            }
        }
    }

    // Pass 2: round-robin over entries beyond each cluster's quota. The
    // slice assumes Pass 1 accepted exactly the first `min_per_cluster`
    // entries of each cluster; a budget skip there shifts acceptance, so an
    // entry accepted late in Pass 1 can be selected a second time here.
    if selected.len() < params.max_chunks {
        let mut remaining: Vec<std::slice::Iter<'_, RankedEntry>> = clusters
            .iter()
            .map(|(_, cluster)| cluster.get(min_per_cluster..).unwrap_or(&[]).iter())
            .collect();
        let mut active = remaining.len();
        while active > 0 && selected.len() < params.max_chunks {
            active = 0;
            for iter in &mut remaining {
                let Some(entry) = iter.next() else { continue };
                active += 1;
                if selected.len() >= params.max_chunks {
                    break;
                }
                let tokens = count_tokens(&entry.chunk.text);
                if !params.broad && token_count + tokens > effective_budget {
                    continue;
                }
                if params.broad && token_count + tokens > effective_budget {
                    warn!(
                        tokens = token_count + tokens,
                        budget = effective_budget,
                        chunk_id = %entry.chunk.metadata.chunk_id,
                        "token budget exceeded in broad mode, keeping chunk"
                    );
                }
                selected.push(entry.clone().into());
                token_count += tokens;
            }
        }
    }

    let mut distribution: BTreeMap<&str, usize> = BTreeMap::new();
    for entry in &selected {
        *distribution.entry(cluster_label(&entry.chunk)).or_default() += 1;
    }
    info!(
        selected = selected.len(),
        tokens = token_count,
        documents = distribution.len(),
        ?distribution,
        "assembled context entries"
    );

    selected
}

/// Render assembled entries for the downstream generator, grouped by
/// document, with a per-entry metadata line for attribution.
///
/// Entries are numbered in acceptance order; citation numbering downstream
/// relies on that order.
pub fn format_context(entries: &[ContextEntry]) -> String {
    if entries.is_empty() {
        return "No relevant context found in the uploaded documents.".to_string();
    }

    // Group by document, preserving first-seen order.
    let mut groups: Vec<(&str, Vec<&ContextEntry>)> = Vec::new();
    let mut group_index: HashMap<&str, usize> = HashMap::new();
    for entry in entries {
        let label = cluster_label(&entry.chunk);
        match group_index.get(label) {
            Some(&idx) => groups[idx].1.push(entry),
            None => {
                group_index.insert(label, groups.len());
                groups.push((label, vec![entry]));
            }
        }
    }

    let mut sections: Vec<String> = Vec::new();
    sections.push(format!("=== INFORMATION FROM {} DOCUMENT(S) ===\n", groups.len()));

    let mut context_num = 1;
    for (name, group) in &groups {
        sections.push(format!("--- DOCUMENT: {name} ---"));
        for entry in group {
            let metadata = &entry.chunk.metadata;
            let mut line = String::new();
            if let Some(page) = metadata.page {
                let _ = write!(line, "Page: {page} | ");
            }
            let _ = write!(
                line,
                "Chunk: {} | Type: {} | Relevance: {:.3}",
                if metadata.chunk_id.is_empty() { "unknown-chunk" } else { &metadata.chunk_id },
                metadata.source_type,
                entry.relevance()
            );
            if let Some(summary) = &metadata.summary_of_section {
                let _ = write!(line, " | Summary: {summary}");
            }
            let text = crate::dedup::normalize_text(&entry.chunk.text);
            sections.push(format!("Context {context_num} ({line}):\n{text}"));
            context_num += 1;
        }
        sections.push(String::new());
    }

    sections.join("\n")
}

/// Extract unique source citations from assembled entries, in first-seen
/// order.
///
/// The display name is `display_source` when set, else the document name;
/// the uniqueness key includes the URL when one is present, so the same
/// display name with different URLs yields separate citations.
pub fn extract_sources(entries: &[ContextEntry]) -> Vec<SourceRef> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut sources: Vec<SourceRef> = Vec::new();

    for entry in entries {
        let metadata = &entry.chunk.metadata;
        let name = metadata.display_name();
        let url = metadata.source_url.clone();
        let key = match &url {
            Some(url) => format!("{name}|{url}"),
            None => name.to_string(),
        };
        if seen.insert(key) {
            sources.push(SourceRef { name: name.to_string(), url });
        }
    }

    sources
}
