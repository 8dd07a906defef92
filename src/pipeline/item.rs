//! The mutable envelope flowing through the pipeline.
//!
//! An [`Item`] is created by a source, mutated only by the runner applying processor
//! patches, and terminal after all sinks return. Processors never touch the item
//! directly; they return an [`ItemPatch`] and the runner merges it by field
//! replacement. `binary` in particular is never mutated in place.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Coarse origin label carried by every item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    /// Uploaded file bytes.
    File,
    /// Inline caller-supplied text.
    Text,
    /// Local path or remote URL.
    Uri,
    /// Base64-encoded upload.
    Base64,
    /// Mail message body.
    Email,
    /// Mail attachment.
    EmailAttachment,
    /// Crawled web page or resource.
    Web,
}

impl SourceType {
    /// Stable string form used in metadata and persistence records.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Text => "text",
            Self::Uri => "uri",
            Self::Base64 => "base64",
            Self::Email => "email",
            Self::EmailAttachment => "email_attachment",
            Self::Web => "web",
        }
    }
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A chunk paired with its embedding vector, aligned 1:1 with `chunks`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    /// Chunk text that was embedded.
    pub text: String,
    /// Embedding vector returned by the provider.
    pub vector: Vec<f32>,
}

/// The document envelope traversing the pipeline exactly once.
#[derive(Debug, Clone, Default)]
pub struct Item {
    /// Human-readable label; may be synthesized (`inline_text`, `base64_input`, `remote_file`).
    pub file_name: String,
    /// Raw bytes to be extracted.
    pub binary: Option<Vec<u8>>,
    /// Pre-extracted text; bypasses the extractor when the source declares it authoritative.
    pub raw_text: Option<String>,
    /// Canonical origin: absolute path, URL, or `imap://user@host/mbox/uid`.
    pub source_path: Option<String>,
    /// Coarse origin label.
    pub source_type: Option<SourceType>,
    /// Caller-supplied business metadata; its keys win over extractor-derived keys.
    pub user_metadata: Map<String, Value>,
    /// Stable document identity assigned by the identity processor.
    pub doc_id: Option<String>,
    /// Normalized extracted metadata merged with `user_metadata`.
    pub metadata: Map<String, Value>,
    /// Post-cleaning canonical text.
    pub clean_text: Option<String>,
    /// Ordered chunk texts.
    pub chunks: Option<Vec<String>>,
    /// Per-chunk embeddings, aligned with `chunks`.
    pub embeddings: Option<Vec<Embedding>>,
    /// Glossary text produced by the analyze processor.
    pub business_glossary: Option<String>,
    /// Content quality score attached by the web crawler.
    pub score: Option<f64>,
    /// Assembled full-text records (parent first, then chunks).
    pub solr_docs: Option<Vec<Value>>,
    /// Assembled vector records (one per chunk).
    pub vector_docs: Option<Vec<Value>>,
}

impl Item {
    /// Stable source label for run summaries: the origin path when known, else the type.
    pub fn source_label(&self) -> String {
        self.source_path.clone().unwrap_or_else(|| {
            self.source_type
                .map(|t| t.as_str().to_string())
                .unwrap_or_default()
        })
    }

    /// Merge a processor patch into the item by field replacement.
    pub fn apply(&mut self, patch: ItemPatch) {
        let ItemPatch {
            doc_id,
            raw_text,
            metadata,
            clean_text,
            chunks,
            embeddings,
            business_glossary,
            solr_docs,
            vector_docs,
            clear_binary,
        } = patch;

        if let Some(value) = doc_id {
            self.doc_id = Some(value);
        }
        if let Some(value) = raw_text {
            self.raw_text = Some(value);
        }
        if let Some(value) = metadata {
            self.metadata = value;
        }
        if let Some(value) = clean_text {
            self.clean_text = Some(value);
        }
        if let Some(value) = chunks {
            self.chunks = Some(value);
        }
        if let Some(value) = embeddings {
            self.embeddings = Some(value);
        }
        if let Some(value) = business_glossary {
            self.business_glossary = Some(value);
        }
        if let Some(value) = solr_docs {
            self.solr_docs = Some(value);
        }
        if let Some(value) = vector_docs {
            self.vector_docs = Some(value);
        }
        if clear_binary {
            self.binary = None;
        }
    }
}

/// Partial field update returned by a processor.
///
/// Only the fields a processor is responsible for are ever set; everything else stays
/// `None` and leaves the item untouched at merge time.
#[derive(Debug, Clone, Default)]
pub struct ItemPatch {
    /// New stable document identity.
    pub doc_id: Option<String>,
    /// Extracted raw text.
    pub raw_text: Option<String>,
    /// Replacement for the normalized metadata map.
    pub metadata: Option<Map<String, Value>>,
    /// Cleaned canonical text.
    pub clean_text: Option<String>,
    /// Chunked text segments.
    pub chunks: Option<Vec<String>>,
    /// Per-chunk embeddings.
    pub embeddings: Option<Vec<Embedding>>,
    /// Glossary text.
    pub business_glossary: Option<String>,
    /// Assembled full-text records.
    pub solr_docs: Option<Vec<Value>>,
    /// Assembled vector records.
    pub vector_docs: Option<Vec<Value>>,
    /// Drop the raw bytes from the item (set by the assemble processor).
    pub clear_binary: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_replaces_only_patched_fields() {
        let mut item = Item {
            file_name: "report.pdf".into(),
            binary: Some(vec![1, 2, 3]),
            raw_text: Some("raw".into()),
            ..Item::default()
        };

        item.apply(ItemPatch {
            clean_text: Some("clean".into()),
            ..ItemPatch::default()
        });

        assert_eq!(item.clean_text.as_deref(), Some("clean"));
        assert_eq!(item.raw_text.as_deref(), Some("raw"));
        assert_eq!(item.binary.as_deref(), Some(&[1u8, 2, 3][..]));
    }

    #[test]
    fn apply_clears_binary_on_request() {
        let mut item = Item {
            binary: Some(vec![0u8; 16]),
            ..Item::default()
        };
        item.apply(ItemPatch {
            clear_binary: true,
            ..ItemPatch::default()
        });
        assert!(item.binary.is_none());
    }

    #[test]
    fn source_label_prefers_path() {
        let item = Item {
            source_path: Some("/data/a.txt".into()),
            source_type: Some(SourceType::Uri),
            ..Item::default()
        };
        assert_eq!(item.source_label(), "/data/a.txt");

        let item = Item {
            source_type: Some(SourceType::Text),
            ..Item::default()
        };
        assert_eq!(item.source_label(), "text");
    }
}
