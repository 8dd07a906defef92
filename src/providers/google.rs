//! Google Generative Language adapters (embedContent / generateContent).

use super::{AnalysisTask, Analyzer, Embedder, ProviderError, build_task_prompt};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

const GOOGLE_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-004";
const DEFAULT_GENERATION_MODEL: &str = "gemini-1.5-flash";

/// Embedding client for the Generative Language `embedContent` endpoint.
pub struct GoogleEmbedder {
    client: Client,
    api_key: String,
    default_model: String,
}

impl GoogleEmbedder {
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
struct EmbedContentResponse {
    embedding: EmbeddingValues,
}

#[derive(Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}

#[async_trait]
impl Embedder for GoogleEmbedder {
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
            .post(format!(
                "{GOOGLE_BASE_URL}/models/{model}:embedContent?key={}",
                self.api_key
            ))
            .json(&json!({ "content": { "parts": [{ "text": text }] } }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::UnexpectedStatus { status, body });
        }

        let payload: EmbedContentResponse = response.json().await?;
        Ok(payload.embedding.values)
    }
}

/// Generation analyzer backed by Gemini models.
pub struct GoogleAnalyzer {
    client: Client,
    api_key: String,
    model: String,
}

impl GoogleAnalyzer {
    /// Construct an analyzer using the default generation model.
    pub fn new(api_key: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            model: DEFAULT_GENERATION_MODEL.to_string(),
        }
    }
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Deserialize)]
struct CandidateContent {
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[async_trait]
impl Analyzer for GoogleAnalyzer {
    async fn analyze(&self, text: &str, task: AnalysisTask) -> Result<String, ProviderError> {
        let prompt = build_task_prompt(task, text);
        tracing::debug!(task = task.as_str(), model = %self.model, "Google analysis request");
        let response = self
            .client
            .post(format!(
                "{GOOGLE_BASE_URL}/models/{}:generateContent?key={}",
                self.model, self.api_key
            ))
            .json(&json!({
                "contents": [{ "parts": [{ "text": prompt }] }],
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::UnexpectedStatus { status, body });
        }

        let payload: GenerateContentResponse = response.json().await?;
        Ok(payload
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content.parts.into_iter().next())
            .and_then(|part| part.text)
            .unwrap_or_default())
    }
}
