//! Vector similarity index — trait and in-memory reference implementation.
//!
//! The production index is an external collaborator; the retriever and the
//! knowledge indexer only see the `VectorIndex` trait. `MemoryIndex` does
//! brute-force cosine similarity and backs tests and local runs.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::IndexError;
use crate::models::{ChunkMetadata, Language};

/// One indexed chunk: deterministic id, embedding, source text, and a
/// metadata copy of the parent document's routing fields.
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub id: String,
    pub vector: Vec<f32>,
    pub text: String,
    pub metadata: ChunkMetadata,
}

/// Retrieval filter: audience must match the agent persona, language must
/// match the detected message language (each including `both`).
#[derive(Debug, Clone, Copy)]
pub struct ChunkFilter {
    pub agent: crate::models::AgentType,
    pub language: Language,
}

/// A retrieved chunk with its similarity score.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub id: String,
    pub score: f32,
    pub text: String,
    pub metadata: ChunkMetadata,
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Insert or overwrite entries keyed by id. Deterministic chunk ids mean
    /// re-indexing an updated document replaces its chunks.
    async fn upsert(&self, entries: Vec<IndexEntry>) -> Result<(), IndexError>;

    /// Remove every chunk belonging to a document. A document that shrinks
    /// on re-index would otherwise leave its trailing chunks behind.
    async fn delete_document(&self, document_id: &str) -> Result<(), IndexError>;

    /// Top-k most similar entries passing the filter. Empty results are valid.
    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: &ChunkFilter,
    ) -> Result<Vec<ScoredChunk>, IndexError>;
}

/// Brute-force cosine-similarity index.
#[derive(Default)]
pub struct MemoryIndex {
    entries: RwLock<HashMap<String, IndexEntry>>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries (test helper).
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    async fn upsert(&self, entries: Vec<IndexEntry>) -> Result<(), IndexError> {
        let mut store = self.entries.write().await;
        if let Some(existing) = store.values().next() {
            let expected = existing.vector.len();
            if let Some(bad) = entries.iter().find(|e| e.vector.len() != expected) {
                return Err(IndexError::DimensionMismatch {
                    expected,
                    got: bad.vector.len(),
                });
            }
        }
        for entry in entries {
            store.insert(entry.id.clone(), entry);
        }
        Ok(())
    }

    async fn delete_document(&self, document_id: &str) -> Result<(), IndexError> {
        let mut store = self.entries.write().await;
        store.retain(|_, e| e.metadata.document_id != document_id);
        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: &ChunkFilter,
    ) -> Result<Vec<ScoredChunk>, IndexError> {
        let store = self.entries.read().await;
        let mut scored: Vec<ScoredChunk> = store
            .values()
            .filter(|e| {
                e.metadata.audience.matches(filter.agent)
                    && e.metadata.language.matches(filter.language)
            })
            .map(|e| ScoredChunk {
                id: e.id.clone(),
                score: cosine(vector, &e.vector),
                text: e.text.clone(),
                metadata: e.metadata.clone(),
            })
            .collect();
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);
        Ok(scored)
    }
}
