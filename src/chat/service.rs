//! Retrieval-augmented chat.
//!
//! Each request moves through retrieve → generate → commit. Retrieval
//! embeds the query and asks the vector store first; an empty result set
//! falls back to a live web search whose freshly indexed chunks become the
//! context. Generation streams increments to the caller as they arrive and
//! only commits the assistant turn when the stream ends cleanly. A stream
//! that dies mid-way leaves no assistant turn behind, even though the
//! client may have seen partial text.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;

use crate::core::errors::ApiError;
use crate::llm::{GenerationEngine, GenerationStream};
use crate::rag::embedder::EmbeddingService;
use crate::rag::store::VectorStore;
use crate::rag::workflow::WebSearchIndexingWorkflow;

use super::session::{ContextSource, RetrievedContext, Role, SessionStore};

/// Non-streaming chat result.
#[derive(Debug, Clone, Serialize)]
pub struct ChatAnswer {
    pub content: String,
    pub source: ContextSource,
}

pub struct ChatService {
    engine: Arc<dyn GenerationEngine>,
    embedder: Arc<EmbeddingService>,
    store: Arc<dyn VectorStore>,
    web_workflow: Arc<WebSearchIndexingWorkflow>,
    sessions: SessionStore,
    collection: String,
    top_k: usize,
}

impl ChatService {
    pub fn new(
        engine: Arc<dyn GenerationEngine>,
        embedder: Arc<EmbeddingService>,
        store: Arc<dyn VectorStore>,
        web_workflow: Arc<WebSearchIndexingWorkflow>,
        sessions: SessionStore,
        collection: String,
        top_k: usize,
    ) -> Self {
        Self {
            engine,
            embedder,
            store,
            web_workflow,
            sessions,
            collection,
            top_k,
        }
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Start a retrieval-augmented generation for `user_message`.
    ///
    /// Returns the context source chosen during retrieval and the increment
    /// stream. Increments are forwarded as soon as the engine produces them;
    /// a mid-stream failure surfaces as one final `Err` increment and the
    /// partial answer is discarded instead of being committed to the log.
    pub async fn stream_chat(
        &self,
        session_id: &str,
        model: &str,
        user_message: &str,
    ) -> Result<(ContextSource, GenerationStream), ApiError> {
        // Fail fast before touching any state.
        let models = self.engine.list_models().await?;
        if !models.iter().any(|m| m == model) {
            return Err(ApiError::NotFound(format!(
                "model '{}' not found; available: {}",
                model,
                models.join(", ")
            )));
        }

        let context = self.retrieve_context(session_id, user_message).await?;
        let source = context.source;

        // Prompt carries the conversation as it stood before this turn.
        let history = self.sessions.history(session_id);
        let prompt = build_prompt(&context, &history, user_message);
        self.sessions
            .append_turn(session_id, Role::User, user_message.to_string());

        let mut upstream = self.engine.generate_stream(model, &prompt).await?;

        let (tx, rx) = mpsc::channel(32);
        let sessions = self.sessions.clone();
        let session_id = session_id.to_string();

        tokio::spawn(async move {
            let mut accumulated = String::new();

            while let Some(increment) = upstream.recv().await {
                match increment {
                    Ok(text) => {
                        accumulated.push_str(&text);
                        if tx.send(Ok(text)).await.is_err() {
                            // Caller went away; nothing stops the engine,
                            // and nothing gets committed.
                            return;
                        }
                    }
                    Err(e) => {
                        tracing::error!("generation failed mid-stream: {}", e);
                        let _ = tx.send(Err(e)).await;
                        // Partial answer is discarded, not committed.
                        return;
                    }
                }
            }

            sessions.append_turn(&session_id, Role::Assistant, accumulated);
        });

        Ok((source, rx))
    }

    /// Non-streaming chat: drains the increment stream internally and
    /// returns the assembled answer with its source attribution.
    pub async fn answer(
        &self,
        session_id: &str,
        model: &str,
        user_message: &str,
    ) -> Result<ChatAnswer, ApiError> {
        let (source, mut stream) = self.stream_chat(session_id, model, user_message).await?;

        let mut content = String::new();
        while let Some(increment) = stream.recv().await {
            content.push_str(&increment?);
        }

        Ok(ChatAnswer { content, source })
    }

    /// Embed the query and pick the context: stored documents when the
    /// index has matches, otherwise a live web search. The chosen context
    /// is recorded in the session slot, overwriting the previous one.
    async fn retrieve_context(
        &self,
        session_id: &str,
        query: &str,
    ) -> Result<RetrievedContext, ApiError> {
        let embeddings = self.embedder.embed(&[query.to_string()]).await?;
        let Some(query_embedding) = embeddings.first() else {
            return Err(ApiError::BadRequest("empty query".to_string()));
        };

        let matches = self
            .store
            .query(&self.collection, query_embedding, self.top_k)
            .await?;

        let context = if !matches.is_empty() {
            RetrievedContext {
                source: ContextSource::Documents,
                chunks: matches.into_iter().map(|m| m.content).collect(),
            }
        } else {
            tracing::info!("no stored matches, falling back to web search");
            let outcomes = self.web_workflow.search_and_index(query).await?;
            let chunks = outcomes
                .iter()
                .filter(|o| o.error.is_none())
                .flat_map(|o| o.chunks.iter().map(|c| c.content.clone()))
                .collect();

            RetrievedContext {
                source: ContextSource::WebSearch,
                chunks,
            }
        };

        self.sessions.set_context(session_id, context.clone());
        Ok(context)
    }
}

fn build_prompt(
    context: &RetrievedContext,
    history: &[super::session::ConversationTurn],
    user_message: &str,
) -> String {
    let mut prompt = String::new();

    if !context.chunks.is_empty() {
        prompt.push_str("Context:\n");
        prompt.push_str(&context.chunks.join("\n"));
        prompt.push_str("\n\n");
    }

    for turn in history {
        let role = match turn.role {
            Role::User => "User",
            Role::Assistant => "Assistant",
        };
        prompt.push_str(&format!("{}: {}\n", role, turn.content));
    }

    prompt.push_str(&format!("User: {}\nAssistant:", user_message));
    prompt
}
