//! Ollama generation engine client.
//!
//! Talks to a local Ollama server: `/api/tags` for the model registry,
//! `/api/generate` with streaming enabled (one JSON object per line) and
//! `/api/embed` for batch embeddings.

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use super::provider::{GenerationEngine, GenerationStream};
use crate::core::errors::ApiError;

#[derive(Clone)]
pub struct OllamaEngine {
    base_url: String,
    client: Client,
}

impl OllamaEngine {
    pub fn new(base_url: String) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: Client::new(),
        }
    }
}

#[async_trait]
impl GenerationEngine for OllamaEngine {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn health_check(&self) -> Result<bool, ApiError> {
        let url = format!("{}/api/tags", self.base_url);
        match self.client.get(&url).send().await {
            Ok(resp) => Ok(resp.status().is_success()),
            Err(_) => Ok(false),
        }
    }

    async fn list_models(&self) -> Result<Vec<String>, ApiError> {
        let url = format!("{}/api/tags", self.base_url);
        let res = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ApiError::unavailable(format!("failed to reach ollama: {}", e)))?;

        if !res.status().is_success() {
            return Err(ApiError::Unavailable(format!(
                "ollama model listing failed: {}",
                res.status()
            )));
        }

        let payload: Value = res.json().await.map_err(ApiError::internal)?;
        let models = payload
            .get("models")
            .and_then(|v| v.as_array())
            .map(|models| {
                models
                    .iter()
                    .filter_map(|m| m.get("name").and_then(|n| n.as_str()))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Ok(models)
    }

    async fn generate_stream(
        &self,
        model: &str,
        prompt: &str,
    ) -> Result<GenerationStream, ApiError> {
        let url = format!("{}/api/generate", self.base_url);
        let body = json!({
            "model": model,
            "prompt": prompt,
            "stream": true,
        });

        let res = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ApiError::unavailable(format!("failed to reach ollama: {}", e)))?;

        if !res.status().is_success() {
            let text = res.text().await.unwrap_or_default();
            return Err(ApiError::Unavailable(format!(
                "ollama generate error: {}",
                text
            )));
        }

        let (tx, rx) = mpsc::channel(32);
        let mut stream = res.bytes_stream();

        tokio::spawn(async move {
            // Ollama streams NDJSON; a chunk can carry several lines or a
            // partial one, so buffer until a newline.
            let mut buffer = String::new();

            while let Some(item) = stream.next().await {
                match item {
                    Ok(bytes) => {
                        buffer.push_str(&String::from_utf8_lossy(&bytes));

                        while let Some(pos) = buffer.find('\n') {
                            let line = buffer[..pos].trim().to_string();
                            buffer.drain(..=pos);
                            if line.is_empty() {
                                continue;
                            }

                            let Ok(value) = serde_json::from_str::<Value>(&line) else {
                                continue;
                            };

                            if let Some(text) = value.get("response").and_then(|v| v.as_str()) {
                                if !text.is_empty()
                                    && tx.send(Ok(text.to_string())).await.is_err()
                                {
                                    return;
                                }
                            }

                            if value.get("done").and_then(|v| v.as_bool()).unwrap_or(false) {
                                return;
                            }
                        }
                    }
                    Err(e) => {
                        let _ = tx
                            .send(Err(ApiError::unavailable(format!(
                                "ollama stream interrupted: {}",
                                e
                            ))))
                            .await;
                        return;
                    }
                }
            }
        });

        Ok(rx)
    }

    async fn embed(&self, model: &str, inputs: &[String]) -> Result<Vec<Vec<f32>>, ApiError> {
        let url = format!("{}/api/embed", self.base_url);
        let body = json!({
            "model": model,
            "input": inputs,
        });

        let res = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ApiError::unavailable(format!("failed to reach ollama: {}", e)))?;

        if !res.status().is_success() {
            let text = res.text().await.unwrap_or_default();
            return Err(ApiError::Unavailable(format!("ollama embed error: {}", text)));
        }

        let payload: Value = res.json().await.map_err(ApiError::internal)?;

        let mut embeddings = Vec::new();
        if let Some(rows) = payload.get("embeddings").and_then(|v| v.as_array()) {
            for row in rows {
                if let Some(vals) = row.as_array() {
                    let vec: Vec<f32> = vals
                        .iter()
                        .filter_map(|v| v.as_f64().map(|f| f as f32))
                        .collect();
                    embeddings.push(vec);
                }
            }
        }

        Ok(embeddings)
    }
}
