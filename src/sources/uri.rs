//! URI source: local files and directories, `file:///` URIs, and HTTP downloads.
//!
//! A directory expands into one item per contained file (recursive walk); every other
//! accepted shape yields exactly one item. Unrecognized schemes are rejected as
//! unsupported input.

use crate::pipeline::{Item, RunContext, SourceError, SourceType};
use crate::sources::{Source, SourceBatch};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::time::Duration;
use walkdir::WalkDir;

const HTTP_TIMEOUT: Duration = Duration::from_secs(20);

/// Expands a URI into one or more file-backed pipeline items.
pub struct UriSource {
    uri: String,
    user_metadata: Map<String, Value>,
}

impl UriSource {
    /// Build the source; surrounding quotes (as pasted from API consoles) are stripped.
    pub fn new(uri: impl Into<String>) -> Self {
        let uri = uri.into();
        Self {
            uri: uri.trim().trim_matches(['"', '\'']).to_string(),
            user_metadata: Map::new(),
        }
    }

    /// Attach caller-supplied business metadata, injected into every produced item.
    pub fn with_user_metadata(mut self, user_metadata: Map<String, Value>) -> Self {
        self.user_metadata = user_metadata;
        self
    }

    async fn read_local(&self, path: &Path) -> Result<Vec<Item>, SourceError> {
        if !path.exists() {
            return Err(SourceError::InvalidInput(format!(
                "local path does not exist: {}",
                path.display()
            )));
        }

        if path.is_file() {
            return Ok(vec![self.load_local_file(path.to_path_buf()).await?]);
        }

        if !path.is_dir() {
            return Err(SourceError::InvalidInput(format!(
                "path is neither file nor directory: {}",
                path.display()
            )));
        }

        let root = path.to_path_buf();
        let files = tokio::task::spawn_blocking(move || {
            WalkDir::new(root)
                .into_iter()
                .filter_map(Result::ok)
                .filter(|entry| entry.file_type().is_file())
                .map(|entry| entry.into_path())
                .collect::<Vec<PathBuf>>()
        })
        .await
        .map_err(|err| SourceError::Failure(format!("directory walk failed: {err}")))?;

        let mut items = Vec::with_capacity(files.len());
        for file in files {
            match self.load_local_file(file.clone()).await {
                Ok(item) => items.push(item),
                Err(err) => {
                    tracing::error!(path = %file.display(), error = %err, "Failed to read file");
                }
            }
        }
        Ok(items)
    }

    async fn load_local_file(&self, path: PathBuf) -> Result<Item, SourceError> {
        let binary = tokio::fs::read(&path).await?;
        let absolute = std::path::absolute(&path).unwrap_or(path);
        let file_name = absolute
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("unnamed_file")
            .to_string();
        tracing::debug!(file_name = %file_name, "Loaded local file");

        Ok(Item {
            file_name,
            binary: Some(binary),
            source_path: Some(absolute.display().to_string()),
            source_type: Some(SourceType::Uri),
            user_metadata: self.user_metadata.clone(),
            ..Item::default()
        })
    }

    async fn download(&self, url: &str) -> Result<Item, SourceError> {
        tracing::info!(url, "Downloading remote resource");
        let response = reqwest::Client::new()
            .get(url)
            .timeout(HTTP_TIMEOUT)
            .send()
            .await?
            .error_for_status()
            .map_err(SourceError::Http)?;
        let bytes = response.bytes().await?;

        Ok(Item {
            file_name: remote_file_name(url),
            binary: Some(bytes.to_vec()),
            source_path: Some(url.to_string()),
            source_type: Some(SourceType::Uri),
            user_metadata: self.user_metadata.clone(),
            ..Item::default()
        })
    }
}

/// Derive a safe file name from the last URL path segment.
pub(crate) fn remote_file_name(url: &str) -> String {
    let tail = url
        .split('/')
        .next_back()
        .unwrap_or_default()
        .split(['?', '#'])
        .next()
        .unwrap_or_default();

    let mut sanitized = String::with_capacity(tail.len());
    let mut last_was_replacement = false;
    for c in tail.chars() {
        if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') {
            sanitized.push(c);
            last_was_replacement = false;
        } else if !last_was_replacement {
            sanitized.push('_');
            last_was_replacement = true;
        }
    }

    let trimmed = sanitized.trim_matches('_');
    if trimmed.is_empty() {
        "remote_file".to_string()
    } else {
        trimmed.to_string()
    }
}

fn is_windows_path(uri: &str) -> bool {
    let bytes = uri.as_bytes();
    bytes.len() > 2
        && bytes[0].is_ascii_alphabetic()
        && bytes[1] == b':'
        && (bytes[2] == b'\\' || bytes[2] == b'/')
}

#[async_trait]
impl Source for UriSource {
    fn name(&self) -> &'static str {
        "uri"
    }

    async fn read(&self, _ctx: &RunContext) -> Result<SourceBatch, SourceError> {
        let uri = self.uri.as_str();
        tracing::info!(uri, "Reading URI source");

        let items = if let Some(path) = uri.strip_prefix("file:///") {
            // file:///C:/x stays relative to the drive; POSIX paths regain their root.
            let path = if is_windows_path(path) {
                PathBuf::from(path)
            } else {
                PathBuf::from(format!("/{path}"))
            };
            self.read_local(&path).await?
        } else if uri.starts_with("http://") || uri.starts_with("https://") {
            vec![self.download(uri).await?]
        } else if is_windows_path(uri) || uri.starts_with('/') {
            self.read_local(Path::new(uri)).await?
        } else {
            return Err(SourceError::UnsupportedInput(format!(
                "unsupported URI scheme: {uri}"
            )));
        };

        Ok(SourceBatch::Many(items))
    }
}
