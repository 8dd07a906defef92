//! Stable document identity.
//!
//! Identity must run before any processor that references `doc_id`. The identifier is
//! either caller-supplied (used verbatim, trimmed) or derived from the cleaned file name
//! and the content bytes, so byte-identical content under the same name hashes to the
//! same id across runs.

use crate::pipeline::{Item, ItemPatch, ProcessorError, RunContext};
use crate::processors::Processor;
use async_trait::async_trait;
use serde_json::Value;
use sha2::{Digest, Sha256};

const DEFAULT_SOURCE_SYSTEM: &str = "rag_upload";
const PREFERRED_ID_KEYS: [&str; 4] = ["doc_id", "business_id", "archive_no", "id"];

/// Assigns `doc_id` to the item root and to `metadata.doc_id`.
pub struct IdentityProcessor {
    default_source_system: Option<String>,
}

impl IdentityProcessor {
    /// Build the processor with an optional service-wide source-system default.
    pub fn new(default_source_system: Option<String>) -> Self {
        Self {
            default_source_system,
        }
    }

    fn preferred_id(&self, item: &Item) -> Option<String> {
        if let Some(value) = metadata_string(item, "doc_id") {
            return Some(value);
        }
        if let Some(value) = item.doc_id.as_deref() {
            let trimmed = value.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
        PREFERRED_ID_KEYS[1..]
            .iter()
            .find_map(|key| metadata_string(item, key))
    }

    fn source_system(&self, item: &Item) -> String {
        metadata_string(item, "source_system")
            .or_else(|| self.default_source_system.clone())
            .unwrap_or_else(|| DEFAULT_SOURCE_SYSTEM.to_string())
    }
}

fn metadata_string(item: &Item, key: &str) -> Option<String> {
    item.user_metadata
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// Strip garbage symbols from a file name, keeping CJK ideographs, ASCII alphanumerics,
/// underscore, dot, and hyphen.
pub(crate) fn clean_filename(name: &str) -> String {
    name.chars()
        .filter(|c| {
            ('\u{4e00}'..='\u{9fff}').contains(c)
                || c.is_ascii_alphanumeric()
                || matches!(c, '_' | '.' | '-')
        })
        .collect()
}

/// Derive the content hash half of a stable document id.
pub(crate) fn stable_content_hash(file_name: &str, content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(clean_filename(file_name).as_bytes());
    hasher.update([0u8, 0u8]);
    hasher.update(content);
    hex::encode(hasher.finalize())[..16].to_string()
}

#[async_trait]
impl Processor for IdentityProcessor {
    fn name(&self) -> &'static str {
        "identity"
    }

    fn order(&self) -> i32 {
        5
    }

    async fn process(&self, item: &Item, _ctx: &RunContext) -> Result<ItemPatch, ProcessorError> {
        let doc_id = match self.preferred_id(item) {
            Some(preferred) => preferred,
            None => {
                // Hash priority mirrors the content the source actually carries:
                // bytes for file/base64, text for text, the URI string for uri.
                let content: &[u8] = if let Some(binary) = item.binary.as_deref() {
                    binary
                } else if let Some(text) = item.raw_text.as_deref() {
                    text.as_bytes()
                } else if let Some(path) = item.source_path.as_deref() {
                    path.as_bytes()
                } else {
                    tracing::error!(
                        file_name = %item.file_name,
                        "No content available for identity hash"
                    );
                    b"no_content"
                };
                format!(
                    "{}_{}",
                    self.source_system(item),
                    stable_content_hash(&item.file_name, content)
                )
            }
        };

        tracing::info!(doc_id = %doc_id, file_name = %item.file_name, "Assigned document identity");

        let mut metadata = item.metadata.clone();
        metadata.insert("doc_id".into(), Value::String(doc_id.clone()));

        Ok(ItemPatch {
            doc_id: Some(doc_id),
            metadata: Some(metadata),
            ..ItemPatch::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::SourceType;
    use serde_json::json;

    fn file_item(name: &str, bytes: &[u8]) -> Item {
        Item {
            file_name: name.into(),
            binary: Some(bytes.to_vec()),
            source_type: Some(SourceType::File),
            ..Item::default()
        }
    }

    #[tokio::test]
    async fn identical_content_hashes_identically() {
        let processor = IdentityProcessor::new(None);
        let ctx = RunContext::new();

        let first = processor
            .process(&file_item("report.pdf", b"bytes"), &ctx)
            .await
            .unwrap();
        let second = processor
            .process(&file_item("report.pdf", b"bytes"), &ctx)
            .await
            .unwrap();
        assert_eq!(first.doc_id, second.doc_id);

        let id = first.doc_id.unwrap();
        assert!(id.starts_with("rag_upload_"));
        assert_eq!(id.len(), "rag_upload_".len() + 16);
    }

    #[tokio::test]
    async fn renaming_changes_the_id() {
        let processor = IdentityProcessor::new(None);
        let ctx = RunContext::new();

        let a = processor
            .process(&file_item("a.pdf", b"bytes"), &ctx)
            .await
            .unwrap();
        let b = processor
            .process(&file_item("b.pdf", b"bytes"), &ctx)
            .await
            .unwrap();
        assert_ne!(a.doc_id, b.doc_id);
    }

    #[tokio::test]
    async fn caller_supplied_id_wins_verbatim() {
        let processor = IdentityProcessor::new(None);
        let ctx = RunContext::new();

        let mut item = file_item("report.pdf", b"bytes");
        item.user_metadata
            .insert("doc_id".into(), json!("  EXT-42  "));
        let patch = processor.process(&item, &ctx).await.unwrap();
        assert_eq!(patch.doc_id.as_deref(), Some("EXT-42"));
    }

    #[tokio::test]
    async fn source_system_prefixes_the_hash() {
        let processor = IdentityProcessor::new(None);
        let ctx = RunContext::new();

        let mut item = file_item("report.pdf", b"bytes");
        item.user_metadata
            .insert("source_system".into(), json!("corp"));
        let patch = processor.process(&item, &ctx).await.unwrap();
        assert!(patch.doc_id.unwrap().starts_with("corp_"));
    }

    #[tokio::test]
    async fn text_items_hash_their_text() {
        let processor = IdentityProcessor::new(None);
        let ctx = RunContext::new();

        let item = Item {
            file_name: "inline_text".into(),
            raw_text: Some("hello".into()),
            source_type: Some(SourceType::Text),
            ..Item::default()
        };
        let patch = processor.process(&item, &ctx).await.unwrap();
        let expected = stable_content_hash("inline_text", b"hello");
        assert_eq!(patch.doc_id.unwrap(), format!("rag_upload_{expected}"));
    }

    #[tokio::test]
    async fn metadata_mirrors_the_id() {
        let processor = IdentityProcessor::new(None);
        let ctx = RunContext::new();
        let patch = processor
            .process(&file_item("x.txt", b"x"), &ctx)
            .await
            .unwrap();
        let metadata = patch.metadata.unwrap();
        assert_eq!(
            metadata.get("doc_id").and_then(Value::as_str),
            patch.doc_id.as_deref()
        );
    }

    #[test]
    fn clean_filename_keeps_cjk_and_ascii() {
        assert_eq!(clean_filename("年度 报告(final)!.pdf"), "年度报告final.pdf");
        assert_eq!(clean_filename("a b/c:d.txt"), "abcd.txt");
    }
}
