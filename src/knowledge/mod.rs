//! Knowledge indexing — paragraph chunking and vector-index upserts.

mod chunker;
mod indexer;

pub use chunker::{CHUNK_CHAR_BUDGET, chunk_paragraphs};
pub use indexer::{IndexOutcome, KnowledgeIndexer};
