//! Uploaded-file source: a name and raw bytes supplied by the caller.

use crate::pipeline::{Item, RunContext, SourceError, SourceType};
use crate::sources::{Source, SourceBatch};
use async_trait::async_trait;
use serde_json::{Map, Value};

/// Wraps an uploaded file into a single pipeline item.
pub struct FileSource {
    file_name: String,
    content: Vec<u8>,
    user_metadata: Map<String, Value>,
}

impl FileSource {
    /// Build the source from the uploaded name and bytes.
    pub fn new(file_name: impl Into<String>, content: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            content,
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
impl Source for FileSource {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn read(&self, _ctx: &RunContext) -> Result<SourceBatch, SourceError> {
        Ok(SourceBatch::Single(Item {
            file_name: self.file_name.clone(),
            binary: Some(self.content.clone()),
            source_type: Some(SourceType::File),
            user_metadata: self.user_metadata.clone(),
            ..Item::default()
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn yields_one_item_with_bytes() {
        let mut metadata = Map::new();
        metadata.insert("department".into(), json!("sales"));
        let source =
            FileSource::new("report.pdf", b"%PDF".to_vec()).with_user_metadata(metadata);

        let batch = source.read(&RunContext::new()).await.unwrap();
        let SourceBatch::Single(item) = batch else {
            panic!("expected single item");
        };
        assert_eq!(item.file_name, "report.pdf");
        assert_eq!(item.binary.as_deref(), Some(&b"%PDF"[..]));
        assert_eq!(item.source_type, Some(SourceType::File));
        assert_eq!(item.user_metadata["department"], "sales");
    }
}
