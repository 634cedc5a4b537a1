use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::core::errors::ApiError;

/// A text increment from the generation stream. The receiver yields `Ok`
/// increments until the stream ends; a mid-stream failure arrives as one
/// final `Err` and nothing after it.
pub type GenerationStream = mpsc::Receiver<Result<String, ApiError>>;

#[async_trait]
pub trait GenerationEngine: Send + Sync {
    /// return the engine name (e.g. "ollama")
    fn name(&self) -> &str;

    /// check if the engine is reachable
    async fn health_check(&self) -> Result<bool, ApiError>;

    /// list the model names registered with the engine
    async fn list_models(&self) -> Result<Vec<String>, ApiError>;

    /// stream a generation for `prompt`. The returned sequence is lazy,
    /// finite and not restartable.
    async fn generate_stream(
        &self,
        model: &str,
        prompt: &str,
    ) -> Result<GenerationStream, ApiError>;

    /// generate one embedding vector per input, in input order
    async fn embed(&self, model: &str, inputs: &[String]) -> Result<Vec<Vec<f32>>, ApiError>;
}
