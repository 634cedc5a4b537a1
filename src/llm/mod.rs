pub mod ollama;
pub mod provider;

pub use ollama::OllamaEngine;
pub use provider::{GenerationEngine, GenerationStream};
