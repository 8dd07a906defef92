//! Request-to-pipeline assembly.
//!
//! Both the HTTP surface and the async worker funnel through [`run_ingest`]: a request
//! names a source and optional provider/metadata, and this module wires the source, the
//! processor registry, and the configured sinks into one [`PipelineRunner`].

use crate::config::get_config;
use crate::pipeline::{
    Capabilities, PipelineError, PipelineRunner, RunReport, build_processors,
};
use crate::providers::{ProviderSelectionError, build_provider_clients};
use crate::sinks::{Sink, SolrSink, VectorSink};
use crate::sources::email::EmailConfig;
use crate::sources::web::WebCrawlerConfig;
use crate::sources::{
    Base64Source, EmailSource, FileSource, Source, TextSource, UriSource, WebCrawlerSource,
};
use serde_json::{Map, Value, json};
use std::sync::Arc;
use thiserror::Error;

/// Errors surfaced to API callers.
#[derive(Debug, Error)]
pub enum IngestError {
    /// Caller error: bad parameters, malformed metadata, unknown provider.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// A requested feature lacks its configuration.
    #[error("not configured: {0}")]
    NotConfigured(String),
    /// The pipeline run failed before producing any item summaries.
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

impl From<ProviderSelectionError> for IngestError {
    fn from(err: ProviderSelectionError) -> Self {
        match err {
            ProviderSelectionError::Unknown(_) => Self::InvalidInput(err.to_string()),
            ProviderSelectionError::NotConfigured(_) => Self::NotConfigured(err.to_string()),
        }
    }
}

/// The origin a request asks the service to ingest.
pub enum IngestSource {
    /// Uploaded file bytes.
    File {
        /// Original file name.
        file_name: String,
        /// Raw bytes.
        content: Vec<u8>,
    },
    /// Inline text.
    Text {
        /// The text to ingest.
        text: String,
    },
    /// Local path or remote URL.
    Uri {
        /// The URI to expand.
        uri: String,
    },
    /// Base64-encoded upload.
    Base64 {
        /// Item label.
        file_name: String,
        /// Base64 payload.
        content: String,
    },
    /// Recursive web crawl.
    Web {
        /// Seed URL.
        start_url: String,
        /// Optional depth override.
        max_depth: Option<u32>,
        /// Optional binary extension allowlist.
        allowed_extensions: Option<Vec<String>>,
    },
    /// IMAP mailbox crawl.
    Email(EmailConfig),
}

/// One ingestion request: a source plus provider and metadata options.
pub struct IngestRequest {
    /// The origin to ingest.
    pub source: IngestSource,
    /// Caller-supplied business metadata.
    pub metadata: Option<Map<String, Value>>,
    /// Provider selection (`openai` | `ali` | `google`).
    pub provider: Option<String>,
    /// Source-system tag folded into document identity.
    pub source_system: Option<String>,
}

/// Execute one ingestion request through the full pipeline.
pub async fn run_ingest(request: IngestRequest) -> Result<RunReport, IngestError> {
    let runner = build_runner(request)?;
    Ok(runner.run().await?)
}

/// Wire a request into a runner: source, processors with capabilities, and sinks.
pub fn build_runner(request: IngestRequest) -> Result<PipelineRunner, IngestError> {
    let config = get_config();

    let mut user_metadata = request.metadata.unwrap_or_default();
    if let Some(system) = request
        .source_system
        .as_deref()
        .map(str::trim)
        .filter(|system| !system.is_empty())
    {
        user_metadata.insert("source_system".into(), json!(system));
    }

    let clients = build_provider_clients(request.provider.as_deref())?;
    let capabilities = match clients {
        Some(clients) => Capabilities {
            embedder: Some(clients.embedder),
            analyzer: Some(clients.analyzer),
        },
        None => Capabilities::default(),
    };
    let processors = build_processors(&capabilities);

    let source: Arc<dyn Source> = match request.source {
        IngestSource::File { file_name, content } => Arc::new(
            FileSource::new(file_name, content).with_user_metadata(user_metadata),
        ),
        IngestSource::Text { text } => {
            Arc::new(TextSource::new(text).with_user_metadata(user_metadata))
        }
        IngestSource::Uri { uri } => {
            Arc::new(UriSource::new(uri).with_user_metadata(user_metadata))
        }
        IngestSource::Base64 { file_name, content } => Arc::new(
            Base64Source::new(file_name, content).with_user_metadata(user_metadata),
        ),
        IngestSource::Web {
            start_url,
            max_depth,
            allowed_extensions,
        } => {
            let mut crawl = WebCrawlerConfig::new(start_url);
            if let Some(depth) = max_depth {
                crawl.max_depth = depth;
            }
            if let Some(extensions) = allowed_extensions {
                crawl.allowed_extensions = extensions;
            }
            Arc::new(WebCrawlerSource::new(crawl).with_user_metadata(user_metadata))
        }
        IngestSource::Email(email) => {
            Arc::new(EmailSource::new(email).with_user_metadata(user_metadata))
        }
    };

    Ok(PipelineRunner::new(source, processors, default_sinks()).with_max_workers(config.max_workers))
}

/// Sinks constructed from configuration; unconfigured backends are simply absent.
pub fn default_sinks() -> Vec<Arc<dyn Sink>> {
    let config = get_config();
    let mut sinks: Vec<Arc<dyn Sink>> = Vec::new();
    if let Some(solr_url) = &config.solr_url {
        sinks.push(Arc::new(SolrSink::new(solr_url, &config.solr_collection)));
    }
    if let Some(vector_url) = &config.vector_url {
        sinks.push(Arc::new(VectorSink::new(
            vector_url,
            &config.vector_collection,
        )));
    }
    if sinks.is_empty() {
        tracing::warn!("No sinks configured; pipeline output will not be persisted");
    }
    sinks
}
