//! Inline-text source: the caller supplies the text directly.

use crate::pipeline::{Item, RunContext, SourceError, SourceType};
use crate::sources::{Source, SourceBatch};
use async_trait::async_trait;
use serde_json::{Map, Value};

/// Wraps caller-supplied text into a single pipeline item with authoritative `raw_text`.
pub struct TextSource {
    text: String,
    file_name: String,
    user_metadata: Map<String, Value>,
}

impl TextSource {
    /// Build the source from inline text; the item label defaults to `inline_text`.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            file_name: "inline_text".into(),
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
impl Source for TextSource {
    fn name(&self) -> &'static str {
        "text"
    }

    async fn read(&self, _ctx: &RunContext) -> Result<SourceBatch, SourceError> {
        Ok(SourceBatch::Single(Item {
            file_name: self.file_name.clone(),
            raw_text: Some(self.text.clone()),
            source_type: Some(SourceType::Text),
            user_metadata: self.user_metadata.clone(),
            ..Item::default()
        }))
    }
}
