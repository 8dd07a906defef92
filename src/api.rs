//! HTTP surface for the ingestion service.
//!
//! This module exposes a compact Axum router with a handful of endpoints:
//!
//! - `POST /upload` – Multipart file upload; runs the full pipeline synchronously and
//!   returns the per-item run summary.
//! - `POST /upload_async` – Same upload contract, but enqueued on the background queue;
//!   returns `{status: "queued", task_id}`.
//! - `POST /ingest` – Structured JSON ingestion (single object or array) for `text`,
//!   `uri`, `base64`, and `web` sources.
//! - `POST /email/ingest_email` – IMAP mailbox crawl with full/incremental state.
//! - `GET /metrics` – Ingestion counters for observability.
//! - `GET /` – Health and identity.
//!
//! Responses carry run summaries only: counters, identities, statuses. Raw bytes,
//! extracted text, and embedding vectors never leave the pipeline through this surface.

use crate::config::get_config;
use crate::metrics::{MetricsSnapshot, global_metrics};
use crate::pipeline::{PipelineError, RunReport, SourceError};
use crate::service::{IngestError, IngestRequest, IngestSource, run_ingest};
use crate::sources::email::EmailConfig;
use crate::worker;
use axum::{
    Json, Router,
    extract::{Multipart, Query},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use std::path::PathBuf;

/// Build the HTTP router exposing the ingestion API surface.
pub fn create_router() -> Router {
    Router::new()
        .route("/", get(health))
        .route("/upload", post(upload))
        .route("/upload_async", post(upload_async))
        .route("/ingest", post(ingest_structured))
        .route("/email/ingest_email", post(ingest_email))
        .route("/metrics", get(metrics))
}

/// Root health check with application identity.
async fn health() -> Json<Value> {
    let config = get_config();
    Json(json!({
        "app_name": config.app_name,
        "version": config.version,
        "status": "online",
    }))
}

/// Metrics snapshot for dashboards.
async fn metrics() -> Json<MetricsSnapshot> {
    Json(global_metrics().snapshot())
}

/// Query parameters shared by the upload endpoints.
#[derive(Deserialize)]
struct UploadParams {
    #[serde(default)]
    provider: Option<String>,
    #[serde(default)]
    source_system: Option<String>,
}

/// Synchronous multipart upload.
async fn upload(
    Query(params): Query<UploadParams>,
    multipart: Multipart,
) -> Result<Json<Value>, AppError> {
    let (file_name, content, metadata) = read_upload_fields(multipart).await?;
    let report = run_ingest(IngestRequest {
        source: IngestSource::File { file_name, content },
        metadata,
        provider: params.provider,
        source_system: params.source_system,
    })
    .await?;

    fail_on_single_item_error(&report)?;
    Ok(Json(json!({ "status": "ok", "result": report })))
}

/// Asynchronous multipart upload: queue the identical pipeline invocation.
async fn upload_async(
    Query(params): Query<UploadParams>,
    multipart: Multipart,
) -> Result<Json<Value>, AppError> {
    let (file_name, content, metadata) = read_upload_fields(multipart).await?;
    let task_id = worker::enqueue(IngestRequest {
        source: IngestSource::File { file_name, content },
        metadata,
        provider: params.provider,
        source_system: params.source_system,
    })?;
    Ok(Json(json!({ "status": "queued", "task_id": task_id })))
}

async fn read_upload_fields(
    mut multipart: Multipart,
) -> Result<(String, Vec<u8>, Option<Map<String, Value>>), AppError> {
    let mut file: Option<(String, Vec<u8>)> = None;
    let mut metadata_raw: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| invalid(format!("malformed multipart body: {err}")))?
    {
        match field.name() {
            Some("file") => {
                let name = field
                    .file_name()
                    .filter(|name| !name.is_empty())
                    .unwrap_or("uploaded_file")
                    .to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|err| invalid(format!("failed reading file field: {err}")))?;
                file = Some((name, bytes.to_vec()));
            }
            Some("metadata") => {
                metadata_raw = Some(
                    field
                        .text()
                        .await
                        .map_err(|err| invalid(format!("failed reading metadata field: {err}")))?,
                );
            }
            _ => {}
        }
    }

    let (file_name, content) = file.ok_or_else(|| invalid("multipart field 'file' is required"))?;
    let metadata = parse_metadata(metadata_raw)?;
    Ok((file_name, content, metadata))
}

fn parse_metadata(raw: Option<String>) -> Result<Option<Map<String, Value>>, AppError> {
    let Some(raw) = raw.filter(|raw| !raw.trim().is_empty()) else {
        return Ok(None);
    };
    serde_json::from_str::<Map<String, Value>>(&raw)
        .map(Some)
        .map_err(|err| invalid(format!("metadata must be valid JSON: {err}")))
}

/// One entry of the structured ingestion body.
#[derive(Deserialize)]
struct IngestStructuredRequest {
    source_type: String,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    uri: Option<String>,
    #[serde(default)]
    base64_content: Option<String>,
    #[serde(default)]
    metadata: Option<Map<String, Value>>,
    #[serde(default)]
    provider: Option<String>,
    #[serde(default)]
    source_system: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(IngestStructuredRequest),
    Many(Vec<IngestStructuredRequest>),
}

/// Structured ingestion: each entry runs its own pipeline; failures stay per-entry.
async fn ingest_structured(Json(body): Json<OneOrMany>) -> Result<Json<Value>, AppError> {
    let requests = match body {
        OneOrMany::One(request) => vec![request],
        OneOrMany::Many(requests) => requests,
    };
    let total_requests = requests.len();

    let mut results = Vec::with_capacity(total_requests);
    for request in requests {
        let source_type = request.source_type.clone();
        match run_structured_entry(request).await {
            Ok(report) => results.push(json!({
                "status": "ok",
                "source_type": source_type,
                "result": report,
            })),
            Err(err) => results.push(json!({
                "status": "failed",
                "source_type": source_type,
                "error": err.to_string(),
            })),
        }
    }

    Ok(Json(json!({
        "status": "completed",
        "total_requests": total_requests,
        "results": results,
    })))
}

async fn run_structured_entry(request: IngestStructuredRequest) -> Result<RunReport, IngestError> {
    let source = match request.source_type.as_str() {
        "text" => IngestSource::Text {
            text: require(request.text, "text", "text")?,
        },
        "uri" => IngestSource::Uri {
            uri: require(request.uri, "uri", "uri")?,
        },
        "base64" => IngestSource::Base64 {
            file_name: "base64_input".into(),
            content: require(request.base64_content, "base64_content", "base64")?,
        },
        "web" => {
            let start_url = require(request.uri, "uri", "web")?;
            let max_depth = request
                .metadata
                .as_ref()
                .and_then(|metadata| metadata.get("max_depth"))
                .and_then(Value::as_u64)
                .map(|depth| depth as u32);
            let allowed_extensions = request
                .metadata
                .as_ref()
                .and_then(|metadata| metadata.get("allowed_extensions"))
                .and_then(Value::as_array)
                .map(|extensions| {
                    extensions
                        .iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect()
                });
            IngestSource::Web {
                start_url,
                max_depth,
                allowed_extensions,
            }
        }
        other => {
            return Err(IngestError::InvalidInput(format!(
                "unsupported source_type: {other}"
            )));
        }
    };

    run_ingest(IngestRequest {
        source,
        metadata: request.metadata,
        provider: request.provider,
        source_system: request.source_system,
    })
    .await
}

fn require(value: Option<String>, field: &str, source_type: &str) -> Result<String, IngestError> {
    value
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| {
            IngestError::InvalidInput(format!(
                "{field} is required when source_type is '{source_type}'"
            ))
        })
}

/// Request body for the mailbox crawl endpoint.
#[derive(Deserialize)]
struct EmailIngestRequest {
    host: String,
    #[serde(default = "default_imap_port")]
    port: u16,
    username: String,
    password: String,
    #[serde(default = "default_mailbox")]
    mailbox: String,
    #[serde(default = "default_max_emails")]
    max_emails: usize,
    #[serde(default)]
    provider: Option<String>,
    #[serde(default)]
    source_system: Option<String>,
    #[serde(default)]
    metadata: Option<Map<String, Value>>,
    #[serde(default)]
    reset_state: bool,
}

fn default_imap_port() -> u16 {
    993
}

fn default_mailbox() -> String {
    "INBOX".into()
}

fn default_max_emails() -> usize {
    50
}

/// Crawl a mailbox and ingest every new message and attachment.
async fn ingest_email(Json(body): Json<EmailIngestRequest>) -> Result<Json<Value>, AppError> {
    let config = get_config();
    let email = EmailConfig {
        port: body.port,
        mailbox: body.mailbox,
        max_emails: body.max_emails,
        state_file: PathBuf::from(&config.email_state_file),
        reset_state: body.reset_state,
        ..EmailConfig::new(body.host, body.username, body.password)
    };

    let report = run_ingest(IngestRequest {
        source: IngestSource::Email(email),
        metadata: body.metadata,
        provider: body.provider,
        source_system: body.source_system,
    })
    .await?;

    Ok(Json(json!({
        "status": "ok",
        "total_emails": report.items.len(),
        "result": report,
    })))
}

/// Single-item pipelines surface their processor failure as a server error.
fn fail_on_single_item_error(report: &RunReport) -> Result<(), AppError> {
    if report.items.len() == 1 {
        if let Some(error) = report.items[0].error.as_deref() {
            return Err(AppError {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                message: format!("pipeline failed: {error}"),
            });
        }
    }
    Ok(())
}

fn invalid(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        message: message.into(),
    }
}

/// Error wrapper mapping the ingestion taxonomy onto HTTP statuses.
struct AppError {
    status: StatusCode,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "detail": self.message }))).into_response()
    }
}

impl From<IngestError> for AppError {
    fn from(err: IngestError) -> Self {
        let status = match &err {
            IngestError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            IngestError::NotConfigured(_) => StatusCode::BAD_REQUEST,
            IngestError::Pipeline(PipelineError::Source(source)) => match source {
                SourceError::InvalidInput(_) | SourceError::UnsupportedInput(_) => {
                    StatusCode::BAD_REQUEST
                }
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}
