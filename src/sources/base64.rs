//! Base64 source: decodes a caller-supplied blob into file bytes.

use crate::pipeline::{Item, RunContext, SourceError, SourceType};
use crate::sources::{Source, SourceBatch};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::{Map, Value};

/// Decodes a base64 payload; equivalent to [`crate::sources::FileSource`] afterwards.
pub struct Base64Source {
    file_name: String,
    encoded: String,
    user_metadata: Map<String, Value>,
}

impl Base64Source {
    /// Build the source from the item label and the base64 payload.
    pub fn new(file_name: impl Into<String>, encoded: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            encoded: encoded.into(),
            user_metadata: Map::new(),
        }
    }

    /// Attach caller-supplied business metadata.
    pub fn with_user_metadata(mut self, user_metadata: Map<String, Value>) -> Self {
        self.user_metadata = user_metadata;
        self
    }
}

#[async_trait]
impl Source for Base64Source {
    fn name(&self) -> &'static str {
        "base64"
    }

    async fn read(&self, _ctx: &RunContext) -> Result<SourceBatch, SourceError> {
        let content = STANDARD
            .decode(self.encoded.trim())
            .map_err(|err| SourceError::InvalidInput(format!("invalid base64 content: {err}")))?;

        Ok(SourceBatch::Single(Item {
            file_name: self.file_name.clone(),
            binary: Some(content),
            source_type: Some(SourceType::Base64),
            user_metadata: self.user_metadata.clone(),
            ..Item::default()
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn decodes_valid_payloads() {
        let encoded = STANDARD.encode("hello world");
        let source = Base64Source::new("base64_input", encoded);
        let batch = source.read(&RunContext::new()).await.unwrap();
        let SourceBatch::Single(item) = batch else {
            panic!("expected single item");
        };
        assert_eq!(item.binary.as_deref(), Some(&b"hello world"[..]));
        assert_eq!(item.source_type, Some(SourceType::Base64));
    }

    #[tokio::test]
    async fn rejects_malformed_payloads() {
        let source = Base64Source::new("bad", "!!!not-base64!!!");
        let err = source.read(&RunContext::new()).await.unwrap_err();
        assert!(matches!(err, SourceError::InvalidInput(_)));
    }
}
