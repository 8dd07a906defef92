//! OpenAI embedding and chat-completion adapters.

use super::{AnalysisTask, Analyzer, Embedder, ProviderError, build_task_prompt};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";
const DEFAULT_CHAT_MODEL: &str = "gpt-4o-mini";

/// Embedding client for the OpenAI `/v1/embeddings` endpoint.
pub struct OpenAiEmbedder {
    client: Client,
    api_key: String,
    default_model: String,
    base_url: String,
}

impl OpenAiEmbedder {
    /// Construct an embedder with the given key and optional default model override.
    pub fn new(api_key: String, default_model: Option<String>) -> Self {
        Self {
            client: Client::new(),
            api_key,
            default_model: default_model.unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string()),
            base_url: OPENAI_BASE_URL.to_string(),
        }
    }

    #[cfg(test)]
    pub(crate) fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingEntry>,
}

#[derive(Deserialize)]
struct EmbeddingEntry {
    embedding: Vec<f32>,
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn default_model(&self) -> &str {
        &self.default_model
    }

    async fn embed(&self, text: &str, model: Option<&str>) -> Result<Vec<f32>, ProviderError> {
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }
        let model = model.unwrap_or(&self.default_model);
        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&json!({ "input": text, "model": model }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::UnexpectedStatus { status, body });
        }

        let payload: EmbeddingsResponse = response.json().await?;
        payload
            .data
            .into_iter()
            .next()
            .map(|entry| entry.embedding)
            .ok_or_else(|| ProviderError::MalformedResponse("empty embeddings data".into()))
    }
}

/// Chat-completion analyzer for OpenAI models.
pub struct OpenAiAnalyzer {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenAiAnalyzer {
    /// Construct an analyzer using the default chat model.
    pub fn new(api_key: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            model: DEFAULT_CHAT_MODEL.to_string(),
            base_url: OPENAI_BASE_URL.to_string(),
        }
    }
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[async_trait]
impl Analyzer for OpenAiAnalyzer {
    async fn analyze(&self, text: &str, task: AnalysisTask) -> Result<String, ProviderError> {
        let prompt = build_task_prompt(task, text);
        tracing::debug!(task = task.as_str(), model = %self.model, "OpenAI analysis request");
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&json!({
                "model": self.model,
                "messages": [{ "role": "user", "content": prompt }],
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::UnexpectedStatus { status, body });
        }

        let payload: ChatResponse = response.json().await?;
        Ok(payload
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::POST, MockServer};

    #[tokio::test]
    async fn embed_parses_first_vector() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/embeddings");
                then.status(200)
                    .json_body(serde_json::json!({ "data": [{ "embedding": [0.1, 0.2] }] }));
            })
            .await;

        let embedder =
            OpenAiEmbedder::new("key".into(), None).with_base_url(server.base_url());
        let vector = embedder.embed("hello", None).await.expect("embed");
        assert_eq!(vector, vec![0.1, 0.2]);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn embed_skips_blank_input() {
        let embedder = OpenAiEmbedder::new("key".into(), None);
        let vector = embedder.embed("   ", None).await.expect("embed");
        assert!(vector.is_empty());
    }
}
