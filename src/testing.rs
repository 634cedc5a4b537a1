//! Hand-written test doubles shared across unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::core::errors::ApiError;
use crate::llm::provider::{GenerationEngine, GenerationStream};
use crate::rag::store::{IndexedRecord, ScoredRecord, VectorStore};
use crate::tools::search::{SearchHit, SearchProvider};

/// Tracks how many calls run at once and the maximum ever seen.
#[derive(Default)]
pub struct ConcurrencyTracker {
    current: AtomicUsize,
    max: AtomicUsize,
}

impl ConcurrencyTracker {
    pub fn max_seen(&self) -> usize {
        self.max.load(Ordering::SeqCst)
    }
}

fn track(tracker: &Arc<ConcurrencyTracker>) -> TrackerGuard {
    let now = tracker.current.fetch_add(1, Ordering::SeqCst) + 1;
    tracker.max.fetch_max(now, Ordering::SeqCst);
    TrackerGuard(tracker.clone())
}

pub struct TrackerGuard(Arc<ConcurrencyTracker>);

impl Drop for TrackerGuard {
    fn drop(&mut self) {
        self.0.current.fetch_sub(1, Ordering::SeqCst);
    }
}

/// One scripted generation stream.
#[derive(Debug, Clone)]
pub enum StreamScript {
    /// Emit these increments, then end cleanly.
    Complete(Vec<String>),
    /// Emit these increments, then fail with the given message.
    FailAfter(Vec<String>, String),
}

pub struct MockEngine {
    models: Vec<String>,
    embed_delay_ms: u64,
    embed_failure: Option<String>,
    tracker: Arc<ConcurrencyTracker>,
    scripts: Mutex<VecDeque<StreamScript>>,
    last_prompt: Mutex<Option<String>>,
}

impl MockEngine {
    pub fn new(models: &[&str]) -> Self {
        Self {
            models: models.iter().map(|m| m.to_string()).collect(),
            embed_delay_ms: 0,
            embed_failure: None,
            tracker: Arc::new(ConcurrencyTracker::default()),
            scripts: Mutex::new(VecDeque::new()),
            last_prompt: Mutex::new(None),
        }
    }

    pub fn with_embed_delay_ms(mut self, ms: u64) -> Self {
        self.embed_delay_ms = ms;
        self
    }

    /// Make `embed` fail for any input containing `needle`.
    pub fn with_embed_failure(mut self, needle: &str) -> Self {
        self.embed_failure = Some(needle.to_string());
        self
    }

    pub fn with_stream(self, script: StreamScript) -> Self {
        self.scripts.lock().unwrap().push_back(script);
        self
    }

    pub fn concurrency_tracker(&self) -> Arc<ConcurrencyTracker> {
        self.tracker.clone()
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.last_prompt.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerationEngine for MockEngine {
    fn name(&self) -> &str {
        "mock"
    }

    async fn health_check(&self) -> Result<bool, ApiError> {
        Ok(true)
    }

    async fn list_models(&self) -> Result<Vec<String>, ApiError> {
        Ok(self.models.clone())
    }

    async fn generate_stream(
        &self,
        _model: &str,
        prompt: &str,
    ) -> Result<GenerationStream, ApiError> {
        *self.last_prompt.lock().unwrap() = Some(prompt.to_string());

        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(StreamScript::Complete(Vec::new()));

        let (tx, rx) = mpsc::channel(32);
        tokio::spawn(async move {
            match script {
                StreamScript::Complete(increments) => {
                    for increment in increments {
                        if tx.send(Ok(increment)).await.is_err() {
                            return;
                        }
                    }
                }
                StreamScript::FailAfter(increments, message) => {
                    for increment in increments {
                        if tx.send(Ok(increment)).await.is_err() {
                            return;
                        }
                    }
                    let _ = tx.send(Err(ApiError::Unavailable(message))).await;
                }
            }
        });

        Ok(rx)
    }

    async fn embed(&self, _model: &str, inputs: &[String]) -> Result<Vec<Vec<f32>>, ApiError> {
        let _guard = track(&self.tracker);
        if self.embed_delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.embed_delay_ms)).await;
        }

        let mut vectors = Vec::new();
        for input in inputs {
            if let Some(needle) = &self.embed_failure {
                if input.contains(needle.as_str()) {
                    return Err(ApiError::Internal("mock embed failure".to_string()));
                }
            }
            // Deterministic 3-dim vector keyed on the input text.
            vectors.push(vec![
                input.len() as f32,
                input.split_whitespace().count() as f32,
                1.0,
            ]);
        }

        Ok(vectors)
    }
}

/// Search provider that returns a fixed hit list.
pub struct ScriptedSearch {
    hits: Vec<SearchHit>,
}

impl ScriptedSearch {
    pub fn new(hits: Vec<SearchHit>) -> Self {
        Self { hits }
    }
}

#[async_trait]
impl SearchProvider for ScriptedSearch {
    async fn search_and_scrape(&self, _query: &str) -> Result<Vec<SearchHit>, ApiError> {
        Ok(self.hits.clone())
    }
}

/// In-memory VectorStore that records calls; dedup-by-id like the real one.
#[derive(Default)]
pub struct CountingStore {
    records: Mutex<Vec<IndexedRecord>>,
    upserts: AtomicUsize,
}

impl CountingStore {
    pub fn upsert_calls(&self) -> usize {
        self.upserts.load(Ordering::SeqCst)
    }

    pub fn records(&self) -> Vec<IndexedRecord> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl VectorStore for CountingStore {
    async fn upsert(&self, _collection: &str, records: &[IndexedRecord]) -> Result<(), ApiError> {
        self.upserts.fetch_add(1, Ordering::SeqCst);
        let mut stored = self.records.lock().unwrap();
        for record in records {
            stored.retain(|r| r.id != record.id);
            stored.push(record.clone());
        }
        Ok(())
    }

    async fn query(
        &self,
        _collection: &str,
        _embedding: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredRecord>, ApiError> {
        let stored = self.records.lock().unwrap();
        Ok(stored
            .iter()
            .take(k)
            .map(|r| ScoredRecord {
                id: r.id.clone(),
                content: r.content.clone(),
                metadata: r.metadata.clone(),
                score: 1.0,
            })
            .collect())
    }

    async fn delete(&self, _collection: &str, ids: &[String]) -> Result<usize, ApiError> {
        let mut stored = self.records.lock().unwrap();
        let before = stored.len();
        stored.retain(|r| !ids.contains(&r.id));
        Ok(before - stored.len())
    }

    async fn list_metadata(&self, _collection: &str) -> Result<Vec<(String, Value)>, ApiError> {
        let stored = self.records.lock().unwrap();
        Ok(stored
            .iter()
            .map(|r| (r.id.clone(), r.metadata.clone()))
            .collect())
    }

    async fn clear(&self, _collection: &str) -> Result<usize, ApiError> {
        let mut stored = self.records.lock().unwrap();
        let removed = stored.len();
        stored.clear();
        Ok(removed)
    }
}
