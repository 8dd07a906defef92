//! Embedding and analysis capabilities injected into the pipeline.
//!
//! Providers are narrow interfaces: an [`Embedder`] turns text into a vector, an
//! [`Analyzer`] runs a named analysis task over text. Concrete adapters wrap the
//! OpenAI, DashScope, and Google REST APIs; which pair is built depends on the
//! `provider` request parameter and the configured credentials.

pub mod ali;
pub mod google;
pub mod openai;

use crate::config::get_config;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

pub use ali::{AliAnalyzer, AliEmbedder};
pub use google::{GoogleAnalyzer, GoogleEmbedder};
pub use openai::{OpenAiAnalyzer, OpenAiEmbedder};

/// Errors raised by provider adapters.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// HTTP layer failed before receiving a response.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Provider responded with an unexpected status code.
    #[error("unexpected provider response ({status}): {body}")]
    UnexpectedStatus {
        /// HTTP status returned by the provider.
        status: reqwest::StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
    /// Provider response did not contain the expected payload.
    #[error("malformed provider response: {0}")]
    MalformedResponse(String),
}

/// Errors raised while selecting a provider for a request.
#[derive(Debug, Error)]
pub enum ProviderSelectionError {
    /// The request named a provider this service does not know.
    #[error("unknown provider: {0}")]
    Unknown(String),
    /// The provider is known but its API key is not configured.
    #[error("provider {0} requested but its API key is not configured")]
    NotConfigured(&'static str),
}

/// Embedding capability: text in, vector out.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Model used when the caller does not specify one.
    fn default_model(&self) -> &str;

    /// Produce an embedding vector for the supplied text.
    async fn embed(&self, text: &str, model: Option<&str>) -> Result<Vec<f32>, ProviderError>;
}

/// Analysis capability: run a named task over text and return the raw model output.
#[async_trait]
pub trait Analyzer: Send + Sync {
    /// Execute the analysis task.
    async fn analyze(&self, text: &str, task: AnalysisTask) -> Result<String, ProviderError>;
}

/// Analysis tasks understood by every analyzer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisTask {
    /// Concise abstractive summary.
    Summary,
    /// Keyword extraction, JSON array output.
    Keywords,
    /// Business glossary extraction, JSON object output.
    BusinessGlossary,
}

impl AnalysisTask {
    /// Stable label used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Summary => "summary",
            Self::Keywords => "keywords",
            Self::BusinessGlossary => "business_glossary",
        }
    }
}

/// Build the task-specific prompt shared by every analyzer adapter.
pub(crate) fn build_task_prompt(task: AnalysisTask, text: &str) -> String {
    match task {
        AnalysisTask::Summary => format!(
            "你是一个中文文档摘要助手。\n请对下面的文本生成简洁、准确的摘要：\n\n{text}"
        ),
        AnalysisTask::Keywords => format!(
            "请从下面的文本中抽取 3~10 个关键词，并用 JSON 数组返回，例如 [\"关键词A\", \"关键词B\"]：\n\n{text}"
        ),
        AnalysisTask::BusinessGlossary => format!(
            "你是一个企业术语抽取专家。\n请从下面文本中抽取“业务术语”：要求格式为 JSON，例如：\n{{\n   \"供应链\": \"企业中用于管理货物流转的系统\",\n   \"库存周转率\": \"衡量库存效率的财务指标\"\n}}\n\n下面是文本：\n\n{text}"
        ),
    }
}

/// Embedder/analyzer pair selected for one request.
#[derive(Clone)]
pub struct ProviderClients {
    /// Embedding capability.
    pub embedder: Arc<dyn Embedder>,
    /// Analysis capability.
    pub analyzer: Arc<dyn Analyzer>,
}

impl std::fmt::Debug for ProviderClients {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderClients").finish_non_exhaustive()
    }
}

/// Resolve the optional `provider` request parameter into a capability pair.
///
/// `None` (no provider requested) yields `Ok(None)`: the pipeline then runs without
/// embeddings and without the analyze processor.
pub fn build_provider_clients(
    provider: Option<&str>,
) -> Result<Option<ProviderClients>, ProviderSelectionError> {
    let Some(name) = provider.map(str::trim).filter(|name| !name.is_empty()) else {
        return Ok(None);
    };

    let config = get_config();
    let clients = match name.to_lowercase().as_str() {
        "openai" => {
            let key = config
                .openai_api_key
                .clone()
                .ok_or(ProviderSelectionError::NotConfigured("openai"))?;
            ProviderClients {
                embedder: Arc::new(OpenAiEmbedder::new(
                    key.clone(),
                    config.openai_embedding_model.clone(),
                )),
                analyzer: Arc::new(OpenAiAnalyzer::new(key)),
            }
        }
        "ali" => {
            let key = config
                .ali_api_key
                .clone()
                .ok_or(ProviderSelectionError::NotConfigured("ali"))?;
            ProviderClients {
                embedder: Arc::new(AliEmbedder::new(
                    key.clone(),
                    config.ali_embedding_model.clone(),
                )),
                analyzer: Arc::new(AliAnalyzer::new(key)),
            }
        }
        "google" => {
            let key = config
                .google_api_key
                .clone()
                .ok_or(ProviderSelectionError::NotConfigured("google"))?;
            ProviderClients {
                embedder: Arc::new(GoogleEmbedder::new(
                    key.clone(),
                    config.google_embedding_model.clone(),
                )),
                analyzer: Arc::new(GoogleAnalyzer::new(key)),
            }
        }
        other => return Err(ProviderSelectionError::Unknown(other.to_string())),
    };

    tracing::info!(provider = name, "Provider clients initialized");
    Ok(Some(clients))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CONFIG, Config};

    #[test]
    fn no_provider_yields_none() {
        let _ = CONFIG.set(Config::default());
        assert!(build_provider_clients(None).expect("ok").is_none());
        assert!(build_provider_clients(Some("  ")).expect("ok").is_none());
    }

    #[test]
    fn unknown_provider_is_rejected() {
        let _ = CONFIG.set(Config::default());
        let err = build_provider_clients(Some("claudette")).unwrap_err();
        assert!(matches!(err, ProviderSelectionError::Unknown(_)));
    }

    #[test]
    fn missing_key_is_not_configured() {
        let _ = CONFIG.set(Config::default());
        let err = build_provider_clients(Some("openai")).unwrap_err();
        assert!(matches!(err, ProviderSelectionError::NotConfigured("openai")));
    }

    #[test]
    fn glossary_prompt_requests_json() {
        let prompt = build_task_prompt(AnalysisTask::BusinessGlossary, "正文");
        assert!(prompt.contains("JSON"));
        assert!(prompt.ends_with("正文"));
    }
}
