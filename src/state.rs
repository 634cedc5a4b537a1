use std::sync::Arc;

use crate::chat::{ChatService, SessionStore};
use crate::core::config::AppConfig;
use crate::core::errors::ApiError;
use crate::core::paths::AppPaths;
use crate::llm::{GenerationEngine, OllamaEngine};
use crate::rag::{
    ChunkIdStyle, EmbeddingService, ExtractionIndexingWorkflow, IngestionWorkflow, Indexer,
    Segmenter, SqliteVectorStore, VectorStore, WebSearchIndexingWorkflow,
};
use crate::tools::extract::TextExtractor;
use crate::tools::search::DuckDuckGoSearch;

/// Global application state shared across all routes.
#[derive(Clone)]
pub struct AppState {
    pub paths: Arc<AppPaths>,
    pub config: AppConfig,
    pub engine: Arc<dyn GenerationEngine>,
    pub embedder: Arc<EmbeddingService>,
    pub store: Arc<dyn VectorStore>,
    pub ingestion: Arc<IngestionWorkflow>,
    pub extraction: Arc<ExtractionIndexingWorkflow>,
    pub chat: Arc<ChatService>,
}

impl AppState {
    pub async fn initialize() -> Result<Arc<Self>, ApiError> {
        let paths = Arc::new(AppPaths::new());
        let config = AppConfig::load(&paths.config_path)?;

        let engine: Arc<dyn GenerationEngine> =
            Arc::new(OllamaEngine::new(config.engine.base_url.clone()));

        let store: Arc<dyn VectorStore> =
            Arc::new(SqliteVectorStore::new(paths.index_db_path.clone()).await?);

        let embedder = Arc::new(EmbeddingService::new(engine.clone(), &config.embedding));
        if let Err(e) = embedder.verify_model().await {
            // The server still comes up; embedding calls fail until the
            // model shows up and a restart re-verifies it.
            tracing::warn!("embedding model verification failed: {}", e);
        }

        let collection = config.vector_store.collection.clone();
        let segmenter = || Segmenter::new(config.segmenter.min_tokens, config.segmenter.max_tokens);

        let doc_indexer = Arc::new(Indexer::new(
            segmenter(),
            embedder.clone(),
            store.clone(),
            collection.clone(),
            ChunkIdStyle::Document,
        ));
        let web_indexer = Arc::new(Indexer::new(
            segmenter(),
            embedder.clone(),
            store.clone(),
            collection.clone(),
            ChunkIdStyle::WebPseudo,
        ));

        let ingestion = Arc::new(IngestionWorkflow::new(doc_indexer.clone()));
        let extraction = Arc::new(ExtractionIndexingWorkflow::new(
            Arc::new(TextExtractor::new()),
            doc_indexer,
        ));
        let web_workflow = Arc::new(WebSearchIndexingWorkflow::new(
            Arc::new(DuckDuckGoSearch::new(&config.search)),
            web_indexer,
            config.retrieval.min_scraped_chars,
        ));

        let chat = Arc::new(ChatService::new(
            engine.clone(),
            embedder.clone(),
            store.clone(),
            web_workflow,
            SessionStore::new(config.history.capacity),
            collection,
            config.retrieval.top_k,
        ));

        Ok(Arc::new(AppState {
            paths,
            config,
            engine,
            embedder,
            store,
            ingestion,
            extraction,
            chat,
        }))
    }
}
