//! RAG pipeline: segmentation, embedding, vector storage, indexing and
//! batch ingestion workflows.

pub mod embedder;
pub mod indexer;
pub mod segmenter;
pub mod sqlite;
pub mod store;
pub mod workflow;

pub use embedder::EmbeddingService;
pub use indexer::{ChunkIdStyle, IndexedChunk, IndexedDocument, Indexer};
pub use segmenter::Segmenter;
pub use sqlite::SqliteVectorStore;
pub use store::{IndexedRecord, ScoredRecord, VectorStore};
pub use workflow::{
    DocumentInput, DocumentOutcome, ExtractionIndexingWorkflow, FileEntry, IngestionWorkflow,
    WebSearchIndexingWorkflow,
};
