//! Embedding service.
//!
//! Wraps the generation engine's embedding endpoint behind a fixed-size
//! worker pool so inference is never oversubscribed, no matter how many
//! callers fan in concurrently. Output order always matches input order.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_util::future::try_join_all;
use tokio::sync::Semaphore;

use crate::core::config::EmbeddingConfig;
use crate::core::errors::ApiError;
use crate::llm::GenerationEngine;

pub struct EmbeddingService {
    engine: Arc<dyn GenerationEngine>,
    model: String,
    dimension: usize,
    permits: Arc<Semaphore>,
    available: AtomicBool,
}

impl EmbeddingService {
    pub fn new(engine: Arc<dyn GenerationEngine>, config: &EmbeddingConfig) -> Self {
        Self {
            engine,
            model: config.model.clone(),
            dimension: config.dimension,
            permits: Arc::new(Semaphore::new(config.workers.max(1))),
            available: AtomicBool::new(false),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Check that the engine actually exposes the configured model. Called
    /// once at startup; until it succeeds every `embed` fails with
    /// `ModelUnavailable`.
    pub async fn verify_model(&self) -> Result<(), ApiError> {
        let models = self.engine.list_models().await?;
        if models.iter().any(|m| m == &self.model) {
            self.available.store(true, Ordering::SeqCst);
            tracing::info!("embedding model {} available", self.model);
            Ok(())
        } else {
            self.available.store(false, Ordering::SeqCst);
            Err(ApiError::ModelUnavailable(self.model.clone()))
        }
    }

    /// Embed `texts`, one vector per input, in input order.
    ///
    /// An empty batch, or a batch containing any blank entry, short-circuits
    /// to an empty result without touching the engine.
    pub async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ApiError> {
        if texts.is_empty() || texts.iter().any(|t| t.trim().is_empty()) {
            return Ok(Vec::new());
        }

        if !self.available.load(Ordering::SeqCst) {
            return Err(ApiError::ModelUnavailable(self.model.clone()));
        }

        let tasks = texts.iter().map(|text| {
            let engine = self.engine.clone();
            let permits = self.permits.clone();
            let model = self.model.clone();
            let input = vec![text.clone()];

            async move {
                let _permit = permits
                    .acquire()
                    .await
                    .map_err(|_| ApiError::internal("embedding pool closed"))?;
                let mut vectors = engine.embed(&model, &input).await?;
                if vectors.len() != 1 {
                    return Err(ApiError::Internal(format!(
                        "engine returned {} vectors for one input",
                        vectors.len()
                    )));
                }
                Ok::<Vec<f32>, ApiError>(vectors.remove(0))
            }
        });

        let vectors = try_join_all(tasks).await?;

        for vector in &vectors {
            if vector.len() != self.dimension {
                return Err(ApiError::Internal(format!(
                    "embedding dimension mismatch: expected {}, got {}",
                    self.dimension,
                    vector.len()
                )));
            }
        }

        Ok(vectors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockEngine;

    fn service(engine: MockEngine, workers: usize, dimension: usize) -> EmbeddingService {
        EmbeddingService::new(
            Arc::new(engine),
            &EmbeddingConfig {
                model: "mock-embed".to_string(),
                dimension,
                workers,
            },
        )
    }

    #[tokio::test]
    async fn preserves_input_order() {
        let svc = service(MockEngine::new(&["mock-embed"]), 2, 3);
        svc.verify_model().await.unwrap();

        // Distinct lengths so the mock vectors identify their input.
        let texts: Vec<String> = (0..8).map(|i| "x".repeat(i + 1)).collect();
        let vectors = svc.embed(&texts).await.unwrap();

        assert_eq!(vectors.len(), texts.len());
        for (i, vector) in vectors.iter().enumerate() {
            // MockEngine encodes the input length in the first component.
            assert_eq!(vector[0], texts[i].len() as f32);
        }
    }

    #[tokio::test]
    async fn blank_input_short_circuits() {
        let svc = service(MockEngine::new(&["mock-embed"]), 2, 3);
        svc.verify_model().await.unwrap();

        assert!(svc.embed(&[]).await.unwrap().is_empty());
        assert!(svc
            .embed(&["valid".to_string(), "   ".to_string()])
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn missing_model_is_unavailable() {
        let svc = service(MockEngine::new(&["some-other-model"]), 2, 3);

        let err = svc.verify_model().await.unwrap_err();
        assert!(matches!(err, ApiError::ModelUnavailable(_)));

        let err = svc.embed(&["hello there".to_string()]).await.unwrap_err();
        assert!(matches!(err, ApiError::ModelUnavailable(_)));
    }

    #[tokio::test]
    async fn pool_bounds_concurrent_engine_calls() {
        let engine = MockEngine::new(&["mock-embed"]).with_embed_delay_ms(20);
        let tracker = engine.concurrency_tracker();
        let svc = service(engine, 2, 3);
        svc.verify_model().await.unwrap();

        let texts: Vec<String> = (0..10).map(|i| format!("text {}", i)).collect();
        svc.embed(&texts).await.unwrap();

        assert!(
            tracker.max_seen() <= 2,
            "pool leaked: {} concurrent calls",
            tracker.max_seen()
        );
    }

    #[tokio::test]
    async fn dimension_mismatch_is_rejected() {
        // MockEngine emits 3-component vectors; expecting 4 must fail.
        let svc = service(MockEngine::new(&["mock-embed"]), 2, 4);
        svc.verify_model().await.unwrap();

        let err = svc.embed(&["hello".to_string()]).await.unwrap_err();
        assert!(matches!(err, ApiError::Internal(_)));
    }
}
