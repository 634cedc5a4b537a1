use std::sync::Arc;

use serde_json::json;

use crate::chat::service::ChatService;
use crate::chat::session::{ContextSource, Role, SessionStore};
use crate::core::config::EmbeddingConfig;
use crate::core::errors::ApiError;
use crate::rag::embedder::EmbeddingService;
use crate::rag::indexer::{ChunkIdStyle, Indexer};
use crate::rag::segmenter::Segmenter;
use crate::rag::store::{IndexedRecord, VectorStore};
use crate::rag::workflow::WebSearchIndexingWorkflow;
use crate::testing::{CountingStore, MockEngine, ScriptedSearch, StreamScript};
use crate::tools::search::SearchHit;

const COLLECTION: &str = "test_collection";

async fn build_service(
    engine: Arc<MockEngine>,
    store: Arc<CountingStore>,
    hits: Vec<SearchHit>,
) -> ChatService {
    let dyn_engine: Arc<dyn crate::llm::GenerationEngine> = engine;
    let embedder = Arc::new(EmbeddingService::new(
        dyn_engine.clone(),
        &EmbeddingConfig {
            model: "mock-embed".to_string(),
            dimension: 3,
            workers: 2,
        },
    ));
    embedder.verify_model().await.unwrap();

    let dyn_store: Arc<dyn VectorStore> = store;
    let web_indexer = Arc::new(Indexer::new(
        Segmenter::new(2, 50),
        embedder.clone(),
        dyn_store.clone(),
        COLLECTION.to_string(),
        ChunkIdStyle::WebPseudo,
    ));
    let web_workflow = Arc::new(WebSearchIndexingWorkflow::new(
        Arc::new(ScriptedSearch::new(hits)),
        web_indexer,
        10,
    ));

    ChatService::new(
        dyn_engine,
        embedder,
        dyn_store,
        web_workflow,
        SessionStore::new(50),
        COLLECTION.to_string(),
        3,
    )
}

fn seeded_record(id: &str, content: &str) -> IndexedRecord {
    IndexedRecord {
        id: id.to_string(),
        content: content.to_string(),
        embedding: vec![1.0, 1.0, 1.0],
        metadata: json!({ "source": "seed" }),
    }
}

fn web_hit(raw_text: &str) -> SearchHit {
    SearchHit {
        title: "A page".to_string(),
        url: "https://example.com/page".to_string(),
        snippet: "snippet".to_string(),
        raw_text: raw_text.to_string(),
    }
}

#[tokio::test]
async fn unknown_model_fails_fast() {
    let engine = Arc::new(MockEngine::new(&["mock-embed", "mock-llm"]));
    let store = Arc::new(CountingStore::default());
    let service = build_service(engine, store, vec![]).await;

    let err = service
        .stream_chat("s1", "no-such-model", "hello")
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::NotFound(_)));

    // Nothing was recorded for the failed request.
    assert!(service.sessions().history("s1").is_empty());
}

#[tokio::test]
async fn completed_stream_commits_assistant_turn() {
    let engine = Arc::new(MockEngine::new(&["mock-embed", "mock-llm"]).with_stream(
        StreamScript::Complete(vec![
            "Hello".to_string(),
            " ".to_string(),
            "world".to_string(),
        ]),
    ));
    let store = Arc::new(CountingStore::default());
    store
        .upsert(COLLECTION, &[seeded_record("doc_0", "stored chunk text")])
        .await
        .unwrap();
    let service = build_service(engine, store, vec![]).await;

    let (source, mut stream) = service
        .stream_chat("s1", "mock-llm", "what is stored?")
        .await
        .unwrap();
    assert_eq!(source, ContextSource::Documents);

    let mut increments = Vec::new();
    while let Some(item) = stream.recv().await {
        increments.push(item.unwrap());
    }
    assert_eq!(increments, vec!["Hello", " ", "world"]);

    let history = service.sessions().history("s1");
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].role, Role::User);
    assert_eq!(history[1].role, Role::Assistant);
    assert_eq!(history[1].content, "Hello world");
}

// Streaming failure scenario: three increments then an error. The client
// sees all three plus the error marker; the log gains no assistant turn.
#[tokio::test]
async fn failed_stream_discards_partial_answer() {
    let engine = Arc::new(MockEngine::new(&["mock-embed", "mock-llm"]).with_stream(
        StreamScript::FailAfter(
            vec!["one ".to_string(), "two ".to_string(), "three".to_string()],
            "engine died".to_string(),
        ),
    ));
    let store = Arc::new(CountingStore::default());
    store
        .upsert(COLLECTION, &[seeded_record("doc_0", "stored chunk text")])
        .await
        .unwrap();
    let service = build_service(engine, store, vec![]).await;

    let (_, mut stream) = service
        .stream_chat("s1", "mock-llm", "tell me things")
        .await
        .unwrap();

    let mut ok_count = 0;
    let mut saw_error = false;
    while let Some(item) = stream.recv().await {
        match item {
            Ok(_) => ok_count += 1,
            Err(e) => {
                saw_error = true;
                assert!(matches!(e, ApiError::Unavailable(_)));
            }
        }
    }
    assert_eq!(ok_count, 3);
    assert!(saw_error);

    // The user turn is recorded; the partial answer is not.
    let history = service.sessions().history("s1");
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].role, Role::User);
}

#[tokio::test]
async fn empty_index_falls_back_to_web_search() {
    let engine = Arc::new(
        MockEngine::new(&["mock-embed", "mock-llm"])
            .with_stream(StreamScript::Complete(vec!["answer".to_string()])),
    );
    let store = Arc::new(CountingStore::default());
    let hits = vec![web_hit("plenty of scraped text that is well above the threshold")];
    let service = build_service(engine, store.clone(), hits).await;

    let answer = service.answer("s1", "mock-llm", "fresh question").await.unwrap();
    assert_eq!(answer.source, ContextSource::WebSearch);
    assert_eq!(answer.content, "answer");

    // The fallback indexed the scraped page under web pseudo-document ids.
    assert!(!store.records().is_empty());
    assert!(store.records().iter().all(|r| r.id.starts_with("web-")));

    let context = service.sessions().context("s1").unwrap();
    assert_eq!(context.source, ContextSource::WebSearch);
    assert!(!context.chunks.is_empty());
}

#[tokio::test]
async fn stored_documents_win_over_web() {
    let engine = Arc::new(
        MockEngine::new(&["mock-embed", "mock-llm"])
            .with_stream(StreamScript::Complete(vec!["from docs".to_string()])),
    );
    let store = Arc::new(CountingStore::default());
    store
        .upsert(
            COLLECTION,
            &[seeded_record("doc_0", "the relevant stored passage")],
        )
        .await
        .unwrap();
    let engine_handle = engine.clone();
    let service = build_service(engine, store, vec![web_hit("should never be used")]).await;

    let answer = service.answer("s1", "mock-llm", "question").await.unwrap();
    assert_eq!(answer.source, ContextSource::Documents);

    // The stored chunk made it into the prompt, ahead of the conversation.
    let prompt = engine_handle.last_prompt().unwrap();
    assert!(prompt.contains("Context:"));
    assert!(prompt.contains("the relevant stored passage"));
    assert!(prompt.trim_end().ends_with("Assistant:"));
}

#[tokio::test]
async fn conversation_carries_into_later_prompts() {
    let engine = Arc::new(
        MockEngine::new(&["mock-embed", "mock-llm"])
            .with_stream(StreamScript::Complete(vec!["first answer".to_string()]))
            .with_stream(StreamScript::Complete(vec!["second answer".to_string()])),
    );
    let store = Arc::new(CountingStore::default());
    store
        .upsert(COLLECTION, &[seeded_record("doc_0", "context text")])
        .await
        .unwrap();
    let engine_handle = engine.clone();
    let service = build_service(engine, store, vec![]).await;

    service.answer("s1", "mock-llm", "first question").await.unwrap();
    service.answer("s1", "mock-llm", "second question").await.unwrap();

    let prompt = engine_handle.last_prompt().unwrap();
    assert!(prompt.contains("User: first question"));
    assert!(prompt.contains("Assistant: first answer"));
    assert!(prompt.contains("User: second question"));
}

// Two concurrent chats against one session interleave without isolation:
// all four turns land in the log, in whichever order the tasks finished.
#[tokio::test]
async fn concurrent_chats_interleave_on_one_session() {
    let engine = Arc::new(
        MockEngine::new(&["mock-embed", "mock-llm"])
            .with_stream(StreamScript::Complete(vec!["answer a".to_string()]))
            .with_stream(StreamScript::Complete(vec!["answer b".to_string()])),
    );
    let store = Arc::new(CountingStore::default());
    store
        .upsert(COLLECTION, &[seeded_record("doc_0", "context text")])
        .await
        .unwrap();
    let service = Arc::new(build_service(engine, store, vec![]).await);

    let first = {
        let service = service.clone();
        tokio::spawn(async move { service.answer("shared", "mock-llm", "question a").await })
    };
    let second = {
        let service = service.clone();
        tokio::spawn(async move { service.answer("shared", "mock-llm", "question b").await })
    };

    first.await.unwrap().unwrap();
    second.await.unwrap().unwrap();

    let history = service.sessions().history("shared");
    assert_eq!(history.len(), 4);
    assert_eq!(
        history.iter().filter(|t| t.role == Role::User).count(),
        2
    );
    assert_eq!(
        history.iter().filter(|t| t.role == Role::Assistant).count(),
        2
    );
    let contents: Vec<&str> = history.iter().map(|t| t.content.as_str()).collect();
    assert!(contents.contains(&"question a"));
    assert!(contents.contains(&"question b"));
}
