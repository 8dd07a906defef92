//! DashScope (Tongyi Qianwen) adapters speaking the OpenAI-compatible surface.

use super::{AnalysisTask, Analyzer, Embedder, ProviderError, build_task_prompt};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

const DASHSCOPE_BASE_URL: &str = "https://dashscope.aliyuncs.com/compatible-mode/v1";
const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-v4";
const DEFAULT_CHAT_MODEL: &str = "qwen-plus";

/// Embedding client for DashScope's OpenAI-compatible embeddings endpoint.
pub struct AliEmbedder {
    client: Client,
    api_key: String,
    default_model: String,
}

impl AliEmbedder {
    /// Construct an embedder with the given key and optional default model override.
    pub fn new(api_key: String, default_model: Option<String>) -> Self {
        Self {
            client: Client::new(),
            api_key,
            default_model: default_model.unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string()),
        }
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
impl Embedder for AliEmbedder {
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
            .post(format!("{DASHSCOPE_BASE_URL}/embeddings"))
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

/// Chat analyzer backed by Qwen models on DashScope.
pub struct AliAnalyzer {
    client: Client,
    api_key: String,
    model: String,
}

impl AliAnalyzer {
    /// Construct an analyzer using the default Qwen chat model.
    pub fn new(api_key: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            model: DEFAULT_CHAT_MODEL.to_string(),
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
impl Analyzer for AliAnalyzer {
    async fn analyze(&self, text: &str, task: AnalysisTask) -> Result<String, ProviderError> {
        let prompt = build_task_prompt(task, text);
        tracing::debug!(task = task.as_str(), model = %self.model, "DashScope analysis request");
        let response = self
            .client
            .post(format!("{DASHSCOPE_BASE_URL}/chat/completions"))
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
