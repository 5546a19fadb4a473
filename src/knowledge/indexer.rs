//! Knowledge indexer — embeds document chunks and upserts them into the
//! vector index.

use std::sync::Arc;

use tracing::{debug, info};

use crate::error::Error;
use crate::index::{IndexEntry, VectorIndex};
use crate::knowledge::chunker::{CHUNK_CHAR_BUDGET, chunk_paragraphs};
use crate::llm::EmbeddingClient;
use crate::models::{ChunkMetadata, KnowledgeDocument};

/// Outcome of an indexing run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexOutcome {
    /// Document was chunked, embedded, and upserted.
    Indexed { chunks: usize },
    /// Document is inactive — nothing was written. Not an error.
    SkippedInactive,
}

/// Splits a document into chunks, embeds each, and upserts into the index.
///
/// Chunk ids are deterministic (`{document_id}_chunk_{n}`), and the
/// document's previous chunks are cleared before the new ones are written,
/// so a document that shrinks does not leave stale trailing chunks behind.
/// Embedding failures fail the whole call before the index is touched.
pub struct KnowledgeIndexer {
    embeddings: Arc<dyn EmbeddingClient>,
    index: Arc<dyn VectorIndex>,
    chunk_budget: usize,
}

impl KnowledgeIndexer {
    pub fn new(embeddings: Arc<dyn EmbeddingClient>, index: Arc<dyn VectorIndex>) -> Self {
        Self {
            embeddings,
            index,
            chunk_budget: CHUNK_CHAR_BUDGET,
        }
    }

    #[cfg(test)]
    pub fn with_chunk_budget(mut self, budget: usize) -> Self {
        self.chunk_budget = budget;
        self
    }

    /// Index a document. Inactive documents are skipped without touching
    /// the index.
    pub async fn index(&self, document: &KnowledgeDocument) -> Result<IndexOutcome, Error> {
        if !document.active {
            debug!(document_id = %document.id, "Skipping inactive document");
            return Ok(IndexOutcome::SkippedInactive);
        }

        let chunks = chunk_paragraphs(&document.content, self.chunk_budget);
        let mut entries = Vec::with_capacity(chunks.len());
        for (n, text) in chunks.into_iter().enumerate() {
            let vector = self.embeddings.embed(&text).await?;
            entries.push(IndexEntry {
                id: format!("{}_chunk_{}", document.id, n),
                vector,
                text,
                metadata: ChunkMetadata {
                    document_id: document.id.clone(),
                    title: document.title.clone(),
                    category: document.category.clone(),
                    language: document.language,
                    audience: document.audience,
                },
            });
        }

        let count = entries.len();
        self.index.delete_document(&document.id).await?;
        self.index.upsert(entries).await?;

        info!(
            document_id = %document.id,
            chunks = count,
            "Indexed knowledge document"
        );
        Ok(IndexOutcome::Indexed { chunks: count })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::error::LlmError;
    use crate::index::MemoryIndex;
    use crate::models::{Audience, LanguageScope};

    /// Embedding fake: vector derived from text length, call counter for
    /// failure injection.
    struct FakeEmbedder {
        calls: AtomicUsize,
        fail_after: Option<usize>,
    }

    impl FakeEmbedder {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail_after: None,
            }
        }

        fn failing_after(n: usize) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail_after: Some(n),
            }
        }
    }

    #[async_trait]
    impl EmbeddingClient for FakeEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(limit) = self.fail_after
                && n >= limit
            {
                return Err(LlmError::RequestFailed {
                    service: "embedding".into(),
                    reason: "injected failure".into(),
                });
            }
            Ok(vec![text.len() as f32, 1.0])
        }
    }

    fn document(id: &str, content: &str, active: bool) -> KnowledgeDocument {
        KnowledgeDocument {
            id: id.into(),
            title: "Returns policy".into(),
            category: "policies".into(),
            language: LanguageScope::Both,
            audience: Audience::Both,
            content: content.into(),
            active,
        }
    }

    #[tokio::test]
    async fn inactive_document_is_skipped() {
        let index = Arc::new(MemoryIndex::new());
        let indexer = KnowledgeIndexer::new(Arc::new(FakeEmbedder::new()), index.clone());

        let outcome = indexer
            .index(&document("doc1", "some content", false))
            .await
            .unwrap();
        assert_eq!(outcome, IndexOutcome::SkippedInactive);
        assert!(index.is_empty().await);
    }

    #[tokio::test]
    async fn chunk_ids_are_deterministic_across_reindex() {
        let index = Arc::new(MemoryIndex::new());
        let indexer = KnowledgeIndexer::new(Arc::new(FakeEmbedder::new()), index.clone())
            .with_chunk_budget(10);

        let doc = document("doc1", "aaaaaaaa\n\nbbbbbbbb\n\ncccccccc", true);
        let first = indexer.index(&doc).await.unwrap();
        assert_eq!(first, IndexOutcome::Indexed { chunks: 3 });
        assert_eq!(index.len().await, 3);

        // Re-indexing the same content must not accumulate duplicates.
        let second = indexer.index(&doc).await.unwrap();
        assert_eq!(second, IndexOutcome::Indexed { chunks: 3 });
        assert_eq!(index.len().await, 3);
    }

    #[tokio::test]
    async fn shrunk_document_drops_trailing_chunks() {
        let index = Arc::new(MemoryIndex::new());
        let indexer = KnowledgeIndexer::new(Arc::new(FakeEmbedder::new()), index.clone())
            .with_chunk_budget(10);

        let long = document("doc1", "aaaaaaaa\n\nbbbbbbbb\n\ncccccccc", true);
        indexer.index(&long).await.unwrap();
        assert_eq!(index.len().await, 3);

        // Content shrinks to one chunk: doc1_chunk_1 and doc1_chunk_2 must go.
        let short = document("doc1", "aaaaaaaa", true);
        let outcome = indexer.index(&short).await.unwrap();
        assert_eq!(outcome, IndexOutcome::Indexed { chunks: 1 });
        assert_eq!(index.len().await, 1);
    }

    #[tokio::test]
    async fn updated_document_metadata_replaces_stale_chunks() {
        let index = Arc::new(MemoryIndex::new());
        let indexer = KnowledgeIndexer::new(Arc::new(FakeEmbedder::new()), index.clone());

        let mut doc = document("doc1", "paragraph one", true);
        indexer.index(&doc).await.unwrap();

        doc.audience = Audience::Sales;
        indexer.index(&doc).await.unwrap();

        // The single chunk now carries the updated audience.
        let filter = crate::index::ChunkFilter {
            agent: crate::models::AgentType::Support,
            language: crate::models::Language::En,
        };
        let results = index.query(&[13.0, 1.0], 5, &filter).await.unwrap();
        assert!(results.is_empty(), "stale audience metadata survived update");
    }

    #[tokio::test]
    async fn embedding_failure_fails_whole_operation() {
        let index = Arc::new(MemoryIndex::new());
        let indexer = KnowledgeIndexer::new(Arc::new(FakeEmbedder::failing_after(1)), index.clone())
            .with_chunk_budget(10);

        let doc = document("doc1", "aaaaaaaa\n\nbbbbbbbb", true);
        let err = indexer.index(&doc).await.unwrap_err();
        assert!(matches!(err, Error::Llm(_)));
        // Nothing was upserted — embedding happens before the index write.
        assert!(index.is_empty().await);
    }
}
