//! End-to-end engine orchestration against stub collaborators.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use contextrank::config::RetrievalConfig;
use contextrank::document::{Candidate, Chunk, ChunkMetadata};
use contextrank::engine::{RetrievalEngine, RetrievalMode, RetrievalRequest};
use contextrank::error::{Result, RetrievalError};
use contextrank::rerank::RelevanceOracle;
use contextrank::store::{CorpusStore, DocumentFilter};

fn chunk(doc: &str, id: &str, text: &str) -> Arc<Chunk> {
    Arc::new(Chunk::new(text, ChunkMetadata::new(id, doc)))
}

/// A store with canned dense results per query string and a fixed corpus
/// for exhaustive retrieval.
#[derive(Default)]
struct StubStore {
    dense: HashMap<String, Vec<Candidate>>,
    corpus: Vec<Arc<Chunk>>,
}

#[async_trait]
impl CorpusStore for StubStore {
    async fn similarity_search(
        &self,
        query: &str,
        _k: usize,
        _filter: Option<&DocumentFilter>,
    ) -> Result<Vec<Candidate>> {
        Ok(self.dense.get(query).cloned().unwrap_or_default())
    }

    async fn get_all(&self, _filter: Option<&DocumentFilter>) -> Result<Vec<Candidate>> {
        Ok(self.corpus.iter().map(|c| Candidate::new(Arc::clone(c), 1.0)).collect())
    }

    async fn add_chunks(&self, _chunks: Vec<Arc<Chunk>>) -> Result<()> {
        Ok(())
    }
}

struct FailingStore;

#[async_trait]
impl CorpusStore for FailingStore {
    async fn similarity_search(
        &self,
        _query: &str,
        _k: usize,
        _filter: Option<&DocumentFilter>,
    ) -> Result<Vec<Candidate>> {
        Err(RetrievalError::Store {
            backend: "stub".to_string(),
            message: "connection refused".to_string(),
        })
    }

    async fn get_all(&self, _filter: Option<&DocumentFilter>) -> Result<Vec<Candidate>> {
        Err(RetrievalError::Store {
            backend: "stub".to_string(),
            message: "connection refused".to_string(),
        })
    }

    async fn add_chunks(&self, _chunks: Vec<Arc<Chunk>>) -> Result<()> {
        Ok(())
    }
}

/// An oracle that scores each passage from a text-keyed table and records
/// how it was called.
#[derive(Default)]
struct ScoredOracle {
    scores: HashMap<String, f32>,
    calls: AtomicUsize,
    last_batch_len: AtomicUsize,
}

impl ScoredOracle {
    fn new(scores: &[(&str, f32)]) -> Self {
        Self {
            scores: scores.iter().map(|(t, s)| (t.to_string(), *s)).collect(),
            calls: AtomicUsize::new(0),
            last_batch_len: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl RelevanceOracle for ScoredOracle {
    async fn score_batch(&self, _query: &str, passages: &[String]) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.last_batch_len.store(passages.len(), Ordering::SeqCst);
        Ok(passages.iter().map(|p| self.scores.get(p).copied().unwrap_or(0.0)).collect())
    }
}

struct FailingOracle;

#[async_trait]
impl RelevanceOracle for FailingOracle {
    async fn score_batch(&self, _query: &str, _passages: &[String]) -> Result<Vec<f32>> {
        Err(RetrievalError::Oracle("scorer offline".to_string()))
    }
}

fn entry_ids(output: &contextrank::engine::RetrievalOutput) -> Vec<&str> {
    output.entries.iter().map(|e| e.chunk.metadata.chunk_id.as_str()).collect()
}

/// Twelve chunks across three documents, with distinct texts so the
/// duplicate filter never collapses them.
fn three_document_store() -> StubStore {
    let rows: [(&str, &str, &str, f32); 12] = [
        ("alpha.pdf", "a0", "glacier ice sheets retreat", 0.96),
        ("alpha.pdf", "a1", "volcanic eruption plume study", 0.92),
        ("alpha.pdf", "a2", "desert dune wind patterns", 0.88),
        ("alpha.pdf", "a3", "rainforest canopy bird census", 0.84),
        ("beta.pdf", "b0", "quarterly revenue grew overall", 0.80),
        ("beta.pdf", "b1", "hiring plan for engineering", 0.76),
        ("beta.pdf", "b2", "marketing budget allocation memo", 0.72),
        ("beta.pdf", "b3", "office relocation timeline draft", 0.68),
        ("gamma.pdf", "c0", "patient intake workflow notes", 0.64),
        ("gamma.pdf", "c1", "lab result processing queue", 0.60),
        ("gamma.pdf", "c2", "surgery scheduling conflicts", 0.56),
        ("gamma.pdf", "c3", "pharmacy stock audit findings", 0.52),
    ];
    let candidates: Vec<Candidate> = rows
        .into_iter()
        .map(|(doc, id, text, score)| Candidate::new(chunk(doc, id, text), score))
        .collect();
    let corpus = candidates.iter().map(|c| Arc::clone(&c.chunk)).collect();
    StubStore { dense: HashMap::from([("zebra".to_string(), candidates)]), corpus }
}

#[tokio::test]
async fn semantic_retrieval_spreads_across_documents() {
    let config =
        RetrievalConfig::builder().max_context_chunks(6).build().expect("valid config");
    let engine = RetrievalEngine::builder()
        .config(config)
        .store(Arc::new(three_document_store()))
        .build()
        .expect("engine builds");

    let output = engine.retrieve(&RetrievalRequest::new("zebra")).await.expect("retrieval");

    // Two entries per document: each cluster's quota of max(2, 6/3) fills
    // before the round-robin pass would run.
    assert_eq!(entry_ids(&output), vec!["a0", "a1", "b0", "b1", "c0", "c1"]);
    let sources: Vec<&str> = output.sources.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(sources, vec!["alpha.pdf", "beta.pdf", "gamma.pdf"]);
}

#[tokio::test]
async fn repeated_requests_are_deterministic() {
    let engine = RetrievalEngine::builder()
        .store(Arc::new(three_document_store()))
        .build()
        .expect("engine builds");

    let request = RetrievalRequest::new("zebra");
    let first = engine.retrieve(&request).await.expect("first retrieval");
    let second = engine.retrieve(&request).await.expect("second retrieval");
    assert_eq!(entry_ids(&first), entry_ids(&second));
}

#[tokio::test]
async fn oracle_scores_override_fused_order() {
    let candidates = vec![
        Candidate::new(chunk("notes.pdf", "x1", "glacier ice sheets retreat"), 0.9),
        Candidate::new(chunk("notes.pdf", "x2", "quarterly revenue grew overall"), 0.6),
        Candidate::new(chunk("notes.pdf", "x3", "patient intake workflow notes"), 0.3),
    ];
    let store = StubStore {
        dense: HashMap::from([("ledger".to_string(), candidates)]),
        corpus: Vec::new(),
    };
    let oracle = Arc::new(ScoredOracle::new(&[
        ("glacier ice sheets retreat", 0.1),
        ("quarterly revenue grew overall", 0.5),
        ("patient intake workflow notes", 0.9),
    ]));

    let engine = RetrievalEngine::builder()
        .store(Arc::new(store))
        .oracle(Arc::clone(&oracle) as Arc<dyn RelevanceOracle>)
        .build()
        .expect("engine builds");

    let output = engine.retrieve(&RetrievalRequest::new("ledger")).await.expect("retrieval");

    assert_eq!(entry_ids(&output), vec!["x3", "x2", "x1"]);
    assert_eq!(output.entries[0].rerank_score, Some(0.9));
    assert_eq!(oracle.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn rerank_input_k_bounds_the_oracle_batch() {
    let candidates = vec![
        Candidate::new(chunk("notes.pdf", "x1", "glacier ice sheets retreat"), 0.9),
        Candidate::new(chunk("notes.pdf", "x2", "quarterly revenue grew overall"), 0.6),
        Candidate::new(chunk("notes.pdf", "x3", "patient intake workflow notes"), 0.3),
    ];
    let store = StubStore {
        dense: HashMap::from([("ledger".to_string(), candidates)]),
        corpus: Vec::new(),
    };
    let oracle = Arc::new(ScoredOracle::new(&[
        ("glacier ice sheets retreat", 0.2),
        ("quarterly revenue grew overall", 0.8),
    ]));
    let config = RetrievalConfig::builder()
        .rerank_input_k(2)
        .rerank_top_k(2)
        .build()
        .expect("valid config");

    let engine = RetrievalEngine::builder()
        .config(config)
        .store(Arc::new(store))
        .oracle(Arc::clone(&oracle) as Arc<dyn RelevanceOracle>)
        .build()
        .expect("engine builds");

    let output = engine.retrieve(&RetrievalRequest::new("ledger")).await.expect("retrieval");

    // Only the top two fused candidates reach the oracle; x3 never does.
    assert_eq!(oracle.last_batch_len.load(Ordering::SeqCst), 2);
    assert_eq!(entry_ids(&output), vec!["x2", "x1"]);
}

#[tokio::test]
async fn blank_query_returns_empty_without_calling_the_oracle() {
    let oracle = Arc::new(ScoredOracle::default());
    let engine = RetrievalEngine::builder()
        .store(Arc::new(StubStore::default()))
        .oracle(Arc::clone(&oracle) as Arc<dyn RelevanceOracle>)
        .build()
        .expect("engine builds");

    let output = engine.retrieve(&RetrievalRequest::new("   ")).await.expect("retrieval");
    assert!(output.is_empty());
    assert_eq!(oracle.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn no_candidates_returns_empty_without_calling_the_oracle() {
    let oracle = Arc::new(ScoredOracle::default());
    let engine = RetrievalEngine::builder()
        .store(Arc::new(StubStore::default()))
        .oracle(Arc::clone(&oracle) as Arc<dyn RelevanceOracle>)
        .build()
        .expect("engine builds");

    let output =
        engine.retrieve(&RetrievalRequest::new("unmatched query")).await.expect("retrieval");
    assert!(output.is_empty());
    assert_eq!(
        output.format_context(),
        "No relevant context found in the uploaded documents."
    );
    assert_eq!(oracle.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn oracle_failure_propagates() {
    let engine = RetrievalEngine::builder()
        .store(Arc::new(three_document_store()))
        .oracle(Arc::new(FailingOracle))
        .build()
        .expect("engine builds");

    let result = engine.retrieve(&RetrievalRequest::new("zebra")).await;
    assert!(matches!(result, Err(RetrievalError::Oracle(_))));
}

#[tokio::test]
async fn store_failure_propagates() {
    let engine =
        RetrievalEngine::builder().store(Arc::new(FailingStore)).build().expect("engine builds");

    let semantic = engine.retrieve(&RetrievalRequest::new("anything")).await;
    assert!(matches!(semantic, Err(RetrievalError::Store { .. })));

    let exhaustive = engine
        .retrieve(&RetrievalRequest::new("anything").with_mode(RetrievalMode::Exhaustive))
        .await;
    assert!(matches!(exhaustive, Err(RetrievalError::Store { .. })));
}

#[tokio::test]
async fn missing_store_is_a_config_error() {
    let result = RetrievalEngine::builder().build();
    assert!(matches!(result, Err(RetrievalError::Config(_))));
}

#[tokio::test]
async fn query_variants_union_dense_results() {
    let s1 = chunk("sun.pdf", "s1", "glacier ice sheets retreat");
    let s2 = chunk("panel.pdf", "s2", "quarterly revenue grew overall");
    let store = StubStore {
        dense: HashMap::from([
            ("solar".to_string(), vec![Candidate::new(Arc::clone(&s1), 0.9)]),
            (
                "photovoltaic panels".to_string(),
                vec![Candidate::new(Arc::clone(&s2), 0.8), Candidate::new(Arc::clone(&s1), 0.9)],
            ),
        ]),
        corpus: Vec::new(),
    };
    let engine =
        RetrievalEngine::builder().store(Arc::new(store)).build().expect("engine builds");

    // Blank and duplicate variants are skipped; s1 appears once despite
    // hitting on both queries.
    let request = RetrievalRequest::new("solar").with_variants(vec![
        "photovoltaic panels".to_string(),
        "  ".to_string(),
        "solar".to_string(),
    ]);
    let output = engine.retrieve(&request).await.expect("retrieval");
    assert_eq!(entry_ids(&output), vec!["s1", "s2"]);
}

#[tokio::test]
async fn exhaustive_mode_honors_the_document_filter() {
    let engine = RetrievalEngine::builder()
        .store(Arc::new(three_document_store()))
        .build()
        .expect("engine builds");

    let request = RetrievalRequest::new("how many studies")
        .with_mode(RetrievalMode::Exhaustive)
        .with_document_filter(DocumentFilter::new("alpha"));
    let output = engine.retrieve(&request).await.expect("retrieval");

    assert_eq!(output.entries.len(), 4);
    assert!(output.entries.iter().all(|e| e.chunk.metadata.document_name == "alpha.pdf"));
    let sources: Vec<&str> = output.sources.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(sources, vec!["alpha.pdf"]);
}

#[tokio::test]
async fn exhaustive_filter_widens_when_nothing_matches() {
    let engine = RetrievalEngine::builder()
        .store(Arc::new(three_document_store()))
        .build()
        .expect("engine builds");

    let request = RetrievalRequest::new("how many studies")
        .with_mode(RetrievalMode::Exhaustive)
        .with_document_filter(DocumentFilter::new("delta"));
    let output = engine.retrieve(&request).await.expect("retrieval");

    // The filter matched nothing, so the whole corpus comes back.
    assert_eq!(output.entries.len(), 12);
}

#[tokio::test]
async fn exhaustive_widening_can_be_disabled() {
    let config =
        RetrievalConfig::builder().widen_empty_filter(false).build().expect("valid config");
    let engine = RetrievalEngine::builder()
        .config(config)
        .store(Arc::new(three_document_store()))
        .build()
        .expect("engine builds");

    let request = RetrievalRequest::new("how many studies")
        .with_mode(RetrievalMode::Exhaustive)
        .with_document_filter(DocumentFilter::new("delta"));
    let output = engine.retrieve(&request).await.expect("retrieval");
    assert!(output.is_empty());
}

#[tokio::test]
async fn semantic_filter_drops_foreign_documents() {
    let engine = RetrievalEngine::builder()
        .store(Arc::new(three_document_store()))
        .build()
        .expect("engine builds");

    let request =
        RetrievalRequest::new("zebra").with_document_filter(DocumentFilter::new("beta.pdf"));
    let output = engine.retrieve(&request).await.expect("retrieval");

    assert!(!output.is_empty());
    assert!(output.entries.iter().all(|e| e.chunk.metadata.document_name == "beta.pdf"));
}

#[tokio::test]
async fn rebuilding_the_sparse_index_enables_lexical_retrieval() {
    let engine = RetrievalEngine::builder()
        .store(Arc::new(StubStore::default()))
        .build()
        .expect("engine builds");

    let request = RetrievalRequest::new("banana smoothie");
    let before = engine.retrieve(&request).await.expect("retrieval");
    assert!(before.is_empty());

    let corpus = vec![
        chunk("recipes.pdf", "k1", "banana smoothie recipe with yogurt"),
        chunk("cars.pdf", "k2", "engine maintenance checklist"),
    ];
    engine.rebuild_sparse_index(&corpus).await;

    let after = engine.retrieve(&request).await.expect("retrieval");
    assert_eq!(entry_ids(&after), vec!["k1"]);
}

#[test]
fn document_filter_matches_flexibly() {
    let filter = DocumentFilter::new("q3 report");
    assert!(filter.matches("Q3_Report.pdf"));
    assert!(filter.matches("q3 report"));
    assert!(!filter.matches("annual-review.docx"));

    let by_fragment = DocumentFilter::new("annual");
    assert!(by_fragment.matches("Annual-Review.docx"));

    let exact = DocumentFilter::new("Notes.docx");
    assert!(exact.matches("notes.docx"));
}
