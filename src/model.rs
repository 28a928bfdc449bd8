//! Text-generation model client.

use std::env;
use std::pin::Pin;

use anyhow::Result;
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use ollama_rs::generation::completion::request::GenerationRequest;
use ollama_rs::Ollama;
use tracing::info;

/// Model identifier used by both generation stages.
pub const MODEL_NAME: &str = "llama3.2:latest";

/// One-shot, finite stream of answer fragments. Draining it to the end
/// yields the complete answer; there is no way to restart it.
pub type TokenStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

#[async_trait]
pub trait TextModel: Send + Sync {
    /// Single completion; returns the model's raw text.
    async fn complete(&self, prompt: String) -> Result<String>;

    /// Streamed completion. Each item is a fragment of the final text.
    async fn stream(&self, prompt: String) -> Result<TokenStream>;
}

pub struct OllamaModel {
    client: Ollama,
    model: String,
}

impl OllamaModel {
    /// Builds a client from `OLLAMA_HOST`, falling back to the local
    /// daemon when the variable is unset.
    pub fn from_env() -> Result<Self> {
        let client = match env::var("OLLAMA_HOST") {
            Ok(url) => {
                info!(%url, "using text model endpoint from environment");
                Ollama::try_new(url)?
            }
            Err(_) => Ollama::default(),
        };

        Ok(Self {
            client,
            model: MODEL_NAME.to_string(),
        })
    }
}

#[async_trait]
impl TextModel for OllamaModel {
    async fn complete(&self, prompt: String) -> Result<String> {
        let request = GenerationRequest::new(self.model.clone(), prompt);
        let response = self.client.generate(request).await?;

        Ok(response.response)
    }

    async fn stream(&self, prompt: String) -> Result<TokenStream> {
        let request = GenerationRequest::new(self.model.clone(), prompt);
        let stream = self.client.generate_stream(request).await?;

        // The client batches fragments; flatten each batch to one chunk.
        let chunks = stream.map(|item| -> Result<String> {
            let batch = item?;
            Ok(batch.into_iter().map(|part| part.response).collect())
        });

        Ok(Box::pin(chunks))
    }
}
