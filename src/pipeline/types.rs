//! Shared pipeline types and the error taxonomy.

use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

/// Errors raised by sources while producing items.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Caller error: bad base64, malformed parameters, missing content.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// URI scheme or content the service does not handle.
    #[error("unsupported input: {0}")]
    UnsupportedInput(String),
    /// Connect/login/read failure against the external origin.
    #[error("source failure: {0}")]
    Failure(String),
    /// Local filesystem access failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Outbound HTTP request failed before yielding a response.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Errors raised by processors; any of these aborts the current item.
#[derive(Debug, Error)]
pub enum ProcessorError {
    /// Extractor/provider returned a non-2xx response or timed out.
    #[error("{processor}: upstream unavailable: {message}")]
    Upstream {
        /// Name of the failing processor.
        processor: &'static str,
        /// Diagnostic captured from the upstream response.
        message: String,
    },
    /// A required field was missing or a processor produced an unusable result.
    #[error("{processor}: contract violated: {message}")]
    Contract {
        /// Name of the failing processor.
        processor: &'static str,
        /// Description of the violated expectation.
        message: String,
    },
}

/// Errors raised by sinks; a sink failure aborts the current item.
#[derive(Debug, Error)]
pub enum SinkError {
    /// HTTP layer failed before receiving a response.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Sink responded with an unexpected status code.
    #[error("unexpected {sink} response ({status}): {body}")]
    UnexpectedStatus {
        /// Sink that produced the response.
        sink: &'static str,
        /// HTTP status returned.
        status: reqwest::StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
    /// The item reached the sink without its assembled records.
    #[error("{sink}: missing assembled records")]
    MissingRecords {
        /// Sink that was invoked.
        sink: &'static str,
    },
}

/// Errors that abort an entire pipeline run rather than a single item.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The source failed before yielding any item.
    #[error(transparent)]
    Source(#[from] SourceError),
}

/// Per-run context handed to sources, processors, and sinks.
#[derive(Debug, Clone)]
pub struct RunContext {
    /// Identifier correlating log lines across one pipeline run.
    pub run_id: Uuid,
}

impl RunContext {
    /// Create a context with a fresh run identifier.
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
        }
    }
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-item outcome surfaced to callers.
///
/// The report never carries raw text, bytes, or embedding vectors; only counters
/// and identity.
#[derive(Debug, Clone, Serialize)]
pub struct ItemReport {
    /// Stable label of the item within this run.
    pub file_name: String,
    /// Document identity, when the pipeline got far enough to assign one.
    pub doc_id: String,
    /// `"ok"` or `"failed"`.
    pub status: &'static str,
    /// Number of chunks produced.
    pub chunk_count: usize,
    /// Number of embeddings produced.
    pub embedding_count: usize,
    /// Dimensionality of the produced vectors, 0 when none were produced.
    pub embedding_dim: usize,
    /// Origin of the item (path, URL, or source type).
    pub source: String,
    /// Wall-clock duration of this item's pipeline in milliseconds.
    pub elapsed_ms: u64,
    /// Failure diagnostic, present only for failed items.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Outcome of a full pipeline run, one entry per item in completion order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    /// Per-item summaries.
    pub items: Vec<ItemReport>,
}

impl RunReport {
    /// Count of items that completed successfully.
    pub fn ok_count(&self) -> usize {
        self.items.iter().filter(|item| item.status == "ok").count()
    }

    /// Count of items that failed mid-pipeline.
    pub fn failed_count(&self) -> usize {
        self.items.len() - self.ok_count()
    }
}
