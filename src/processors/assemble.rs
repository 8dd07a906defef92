//! Final record assembly: one parent document plus one record per chunk.
//!
//! Record identifiers are deterministic UUIDv5 values in the DNS namespace, seeded with
//! a configurable namespace string, so re-ingesting the same `doc_id` overwrites the same
//! records downstream.

use crate::pipeline::{Item, ItemPatch, ProcessorError, RunContext};
use crate::processors::Processor;
use async_trait::async_trait;
use serde_json::{Map, Value, json};
use time::OffsetDateTime;
use time::format_description::FormatItem;
use time::macros::format_description;
use uuid::Uuid;

/// Metadata keys already represented as explicit parent fields.
const EXCLUDED_METADATA_KEYS: [&str; 4] = ["title", "author", "filename", "filetype"];

const TIMESTAMP_FORMAT: &[FormatItem<'static>] = format_description!(
    "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]Z"
);

/// Builds `solr_docs` and `vector_docs` from the processed item.
pub struct AssembleProcessor {
    namespace_seed: String,
}

impl AssembleProcessor {
    /// Build the processor with the UUIDv5 namespace seed.
    pub fn new(namespace_seed: String) -> Self {
        Self { namespace_seed }
    }

    fn record_id(&self, doc_id: &str) -> String {
        Uuid::new_v5(
            &Uuid::NAMESPACE_DNS,
            format!("{}:{doc_id}", self.namespace_seed).as_bytes(),
        )
        .to_string()
    }
}

/// Current UTC timestamp with millisecond precision.
fn current_timestamp_millis() -> String {
    OffsetDateTime::now_utc()
        .format(TIMESTAMP_FORMAT)
        .unwrap_or_else(|_| "1970-01-01T00:00:00.000Z".to_string())
}

fn metadata_str(item: &Item, key: &str) -> String {
    item.metadata
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

#[async_trait]
impl Processor for AssembleProcessor {
    fn name(&self) -> &'static str {
        "assemble"
    }

    fn order(&self) -> i32 {
        100
    }

    async fn process(&self, item: &Item, _ctx: &RunContext) -> Result<ItemPatch, ProcessorError> {
        let doc_id = item
            .doc_id
            .clone()
            .filter(|id| !id.is_empty())
            .ok_or(ProcessorError::Contract {
                processor: "assemble",
                message: "doc_id missing; identity must run first".into(),
            })?;

        let chunks = item.chunks.clone().unwrap_or_default();
        let embeddings = item.embeddings.as_deref().unwrap_or_default();
        let timestamp = current_timestamp_millis();
        let parent_id = self.record_id(&doc_id);

        let title = metadata_str(item, "title");
        let author = metadata_str(item, "author");
        let source_name = if item.file_name.is_empty() {
            metadata_str(item, "source_name")
        } else {
            item.file_name.clone()
        };
        let source_type = item
            .source_type
            .map(|t| t.as_str().to_string())
            .unwrap_or_default();
        let source_path = item.source_path.clone().unwrap_or_default();
        let source_system = item
            .user_metadata
            .get("source_system")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let mut parent = Map::new();
        parent.insert("doc_type".into(), json!("document"));
        parent.insert("id".into(), json!(parent_id));
        parent.insert("doc_id".into(), json!(doc_id));
        parent.insert(
            "raw_content".into(),
            json!(item.raw_text.clone().unwrap_or_default()),
        );
        parent.insert(
            "content".into(),
            json!(item.clean_text.clone().unwrap_or_default()),
        );
        parent.insert("title".into(), json!(title));
        parent.insert("author".into(), json!(author));
        parent.insert("source_name".into(), json!(source_name));
        parent.insert("source_type".into(), json!(source_type));
        parent.insert("source_path".into(), json!(source_path));
        parent.insert("source".into(), json!(source_system));
        parent.insert("created_at".into(), json!(metadata_str(item, "created_at")));
        parent.insert(
            "modified_at".into(),
            json!(metadata_str(item, "modified_at")),
        );
        parent.insert(
            "keywords".into(),
            item.metadata
                .get("keywords")
                .cloned()
                .unwrap_or_else(|| json!([])),
        );
        parent.insert(
            "summary".into(),
            json!(item.business_glossary.clone().unwrap_or_default()),
        );
        parent.insert("section_title".into(), json!(""));
        parent.insert("language".into(), json!(metadata_str(item, "language")));
        parent.insert("chunk_count".into(), json!(chunks.len()));
        parent.insert("timestamp".into(), json!(timestamp));

        for (key, value) in &item.metadata {
            if EXCLUDED_METADATA_KEYS.contains(&key.as_str()) || parent.contains_key(key) {
                continue;
            }
            parent.insert(key.clone(), value.clone());
        }

        let mut chunk_docs = Vec::with_capacity(chunks.len());
        for (index, chunk) in chunks.iter().enumerate() {
            let chunk_doc_id = format!("{doc_id}_chunk_{index:06}");
            let mut record = Map::new();
            record.insert("doc_type".into(), json!("chunk"));
            record.insert(
                "id".into(),
                json!(self.record_id(&chunk_doc_id)),
            );
            record.insert("doc_id".into(), json!(chunk_doc_id));
            record.insert("parent_id".into(), json!(parent_id));
            record.insert("chunk_index".into(), json!(index));
            record.insert("chunk_content".into(), json!(chunk));
            if let Some(embedding) = embeddings.get(index) {
                record.insert("_gl_vector".into(), json!(embedding.vector));
            }
            record.insert("title".into(), json!(title));
            record.insert("author".into(), json!(author));
            record.insert("source_name".into(), json!(source_name));
            record.insert("source_type".into(), json!(source_type));
            record.insert("source_path".into(), json!(source_path));
            record.insert("timestamp".into(), json!(timestamp));
            chunk_docs.push(Value::Object(record));
        }

        let mut solr_docs = Vec::with_capacity(chunk_docs.len() + 1);
        solr_docs.push(Value::Object(parent));
        solr_docs.extend(chunk_docs.iter().cloned());

        tracing::debug!(
            doc_id = %doc_id,
            records = solr_docs.len(),
            chunks = chunk_docs.len(),
            "Persistence records assembled"
        );

        Ok(ItemPatch {
            doc_id: Some(doc_id),
            solr_docs: Some(solr_docs),
            vector_docs: Some(chunk_docs),
            clear_binary: true,
            ..ItemPatch::default()
        })
    }
}
