//! Text and metadata extraction via the external extractor service.
//!
//! Binary content is PUT to the extractor twice: once for plain text, once for the
//! metadata JSON. The flat extractor mapping is then normalized into the stable set of
//! metadata fields the rest of the pipeline relies on, and caller-supplied
//! `user_metadata` keys overwrite extractor-derived keys of the same name.

use crate::pipeline::{Item, ItemPatch, ProcessorError, RunContext, SourceType};
use crate::processors::Processor;
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use md5::Md5;
use reqwest::Client;
use reqwest::header::{ACCEPT, HeaderValue};
use serde_json::{Map, Value, json};
use sha2::{Digest, Sha256};
use std::time::Duration;

/// Producer substrings that identify scanner-generated PDFs.
const SCANNER_PRODUCERS: [&str; 11] = [
    "scan", "image", "mfp", "scanner", "canon", "fujitsu", "kodak", "hp", "ricoh", "epson",
    "pdfscan",
];

/// Delegates binary-to-text extraction to the extractor service and normalizes metadata.
pub struct ExtractProcessor {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl ExtractProcessor {
    /// Build the processor against the extractor base URL with a request timeout.
    pub fn new(base_url: String, timeout_secs: u64) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    async fn extract_text(&self, item: &Item, binary: &[u8]) -> Result<String, ProcessorError> {
        let response = self
            .client
            .put(format!("{}/tika", self.base_url))
            .header(ACCEPT, "text/plain")
            .header("File-Name", header_safe(&item.file_name))
            .timeout(self.timeout)
            .body(binary.to_vec())
            .send()
            .await
            .map_err(|err| upstream(format!("text extraction request failed: {err}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(upstream(format!("text extraction returned {status}: {body}")));
        }

        // The extractor emits UTF-8; decode bytes directly so a missing or wrong
        // charset header cannot mangle the text.
        let bytes = response
            .bytes()
            .await
            .map_err(|err| upstream(format!("text extraction body read failed: {err}")))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    async fn extract_metadata(
        &self,
        item: &Item,
        binary: &[u8],
    ) -> Result<Map<String, Value>, ProcessorError> {
        let response = self
            .client
            .put(format!("{}/meta", self.base_url))
            .header(ACCEPT, "application/json")
            .header("File-Name", header_safe(&item.file_name))
            .timeout(self.timeout)
            .body(binary.to_vec())
            .send()
            .await
            .map_err(|err| upstream(format!("metadata extraction request failed: {err}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(upstream(format!(
                "metadata extraction returned {status}: {body}"
            )));
        }

        response
            .json::<Map<String, Value>>()
            .await
            .map_err(|err| upstream(format!("metadata JSON parse failed: {err}")))
    }
}

fn upstream(message: String) -> ProcessorError {
    ProcessorError::Upstream {
        processor: "extract",
        message,
    }
}

fn header_safe(value: &str) -> HeaderValue {
    HeaderValue::from_str(value).unwrap_or_else(|_| {
        let ascii: String = value
            .chars()
            .filter(|c| c.is_ascii_graphic() || *c == ' ')
            .collect();
        HeaderValue::from_str(&ascii).unwrap_or(HeaderValue::from_static("upload"))
    })
}

#[async_trait]
impl Processor for ExtractProcessor {
    fn name(&self) -> &'static str {
        "extract"
    }

    fn order(&self) -> i32 {
        10
    }

    async fn process(&self, item: &Item, _ctx: &RunContext) -> Result<ItemPatch, ProcessorError> {
        // Web pages arrive with authoritative pre-extracted text.
        if item.source_type == Some(SourceType::Web) && item.raw_text.is_some() {
            let raw_text = item.raw_text.clone().unwrap_or_default();
            let metadata = normalize_metadata(item, &Map::new(), &raw_text, "direct");
            return Ok(ItemPatch {
                raw_text: Some(raw_text),
                metadata: Some(metadata),
                ..ItemPatch::default()
            });
        }

        let Some(binary) = item.binary.as_deref() else {
            let raw_text = item.raw_text.clone().unwrap_or_default();
            let metadata = normalize_metadata(item, &Map::new(), &raw_text, "direct");
            return Ok(ItemPatch {
                raw_text: Some(raw_text),
                metadata: Some(metadata),
                ..ItemPatch::default()
            });
        };

        let text = self.extract_text(item, binary).await?;
        let extractor_meta = self.extract_metadata(item, binary).await?;
        tracing::info!(
            file_name = %item.file_name,
            text_length = text.len(),
            "Extractor returned text"
        );

        let metadata = normalize_metadata(item, &extractor_meta, &text, "tika");
        Ok(ItemPatch {
            raw_text: Some(text),
            metadata: Some(metadata),
            ..ItemPatch::default()
        })
    }
}

/// Normalize the flat extractor mapping into the stable metadata shape.
fn normalize_metadata(
    item: &Item,
    extractor_meta: &Map<String, Value>,
    text: &str,
    ingestion_method: &str,
) -> Map<String, Value> {
    let binary = item.binary.as_deref();
    let hash_input: &[u8] = binary.unwrap_or_else(|| text.as_bytes());

    let producer = meta_first(extractor_meta, &["pdf:docinfo:producer", "pdf:producer", "producer"]);
    let page_count = meta_first(
        extractor_meta,
        &["xmpTPg:NPages", "meta:page-count", "Page-Count"],
    )
    .parse::<i64>()
    .unwrap_or(0);

    let mut metadata = item.metadata.clone();
    metadata.insert(
        "doc_id".into(),
        json!(item.doc_id.clone().unwrap_or_default()),
    );
    metadata.insert("source_name".into(), json!(item.file_name));
    metadata.insert(
        "source_type".into(),
        json!(
            item.source_type
                .map(|t| t.as_str().to_string())
                .unwrap_or_default()
        ),
    );
    metadata.insert(
        "source_size".into(),
        json!(binary.map(<[u8]>::len).unwrap_or(0)),
    );
    metadata.insert("content_md5".into(), json!(md5_hex(hash_input)));
    metadata.insert("content_sha256".into(), json!(sha256_hex(hash_input)));
    metadata.insert(
        "ingest_at".into(),
        json!(Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)),
    );
    metadata.insert(
        "title".into(),
        json!(meta_first(extractor_meta, &["dc:title", "title"])),
    );
    metadata.insert(
        "author".into(),
        json!(meta_first(
            extractor_meta,
            &["dc:creator", "meta:author", "Author"]
        )),
    );
    metadata.insert(
        "created_at".into(),
        json!(normalize_datetime(&meta_first(
            extractor_meta,
            &["dcterms:created", "meta:creation-date", "Creation-Date"]
        ))),
    );
    metadata.insert(
        "modified_at".into(),
        json!(normalize_datetime(&meta_first(
            extractor_meta,
            &["dcterms:modified", "Last-Modified", "Last-Save-Date"]
        ))),
    );
    let language = meta_first(extractor_meta, &["dc:language", "language"]);
    metadata.insert(
        "language".into(),
        json!(if language.is_empty() {
            "zh-CN".to_string()
        } else {
            language
        }),
    );
    metadata.insert("page_count".into(), json!(page_count));
    metadata.insert(
        "keywords".into(),
        json!(split_keywords(&meta_first(
            extractor_meta,
            &["meta:keyword", "Keywords", "subject"]
        ))),
    );
    metadata.insert(
        "company".into(),
        json!(meta_first(
            extractor_meta,
            &["extended-properties:Company", "Company"]
        )),
    );
    metadata.insert(
        "category".into(),
        json!(meta_first(extractor_meta, &["category", "cp:category"])),
    );
    metadata.insert("producer".into(), json!(producer));
    metadata.insert(
        "is_encrypted".into(),
        json!(
            meta_first(extractor_meta, &["pdf:encrypted", "X-TIKA:encrypted"])
                .eq_ignore_ascii_case("true")
        ),
    );
    metadata.insert(
        "is_scanned_pdf".into(),
        json!(is_scanned_pdf(&producer, text, page_count)),
    );
    metadata.insert("raw_text_length".into(), json!(text.chars().count()));
    metadata.insert("ingestion_method".into(), json!(ingestion_method));

    // Caller-supplied keys win over everything derived above.
    for (key, value) in &item.user_metadata {
        metadata.insert(key.clone(), value.clone());
    }

    metadata
}

/// First non-empty value among the candidate keys; array values yield their first entry.
fn meta_first(meta: &Map<String, Value>, keys: &[&str]) -> String {
    for key in keys {
        let Some(value) = meta.get(*key) else {
            continue;
        };
        let text = match value {
            Value::String(s) => s.trim().to_string(),
            Value::Array(values) => values
                .first()
                .and_then(Value::as_str)
                .unwrap_or_default()
                .trim()
                .to_string(),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            _ => String::new(),
        };
        if !text.is_empty() {
            return text;
        }
    }
    String::new()
}

/// Parse common extractor date shapes into `%Y-%m-%dT%H:%M:%S`, keeping the original on failure.
fn normalize_datetime(raw: &str) -> String {
    let raw = raw.trim();
    if raw.is_empty() {
        return String::new();
    }

    let stripped = strip_timezone_suffix(raw);
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(stripped, format) {
            return parsed.format("%Y-%m-%dT%H:%M:%S").to_string();
        }
    }
    if let Ok(parsed) = NaiveDate::parse_from_str(stripped, "%Y-%m-%d") {
        return parsed
            .and_hms_opt(0, 0, 0)
            .map(|dt| dt.format("%Y-%m-%dT%H:%M:%S").to_string())
            .unwrap_or_else(|| raw.to_string());
    }
    raw.to_string()
}

fn strip_timezone_suffix(raw: &str) -> &str {
    if let Some(stripped) = raw.strip_suffix('Z') {
        return stripped;
    }
    // Offsets like +08:00 only appear after a time component.
    if raw.len() > 6 && raw.contains('T') && raw.is_char_boundary(raw.len() - 6) {
        let tail = &raw[raw.len() - 6..];
        if (tail.starts_with('+') || tail.starts_with('-')) && tail[1..].contains(':') {
            return &raw[..raw.len() - 6];
        }
    }
    raw
}

fn split_keywords(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|keyword| !keyword.is_empty())
        .map(str::to_string)
        .collect()
}

fn is_scanned_pdf(producer: &str, text: &str, page_count: i64) -> bool {
    let producer = producer.to_lowercase();
    if SCANNER_PRODUCERS
        .iter()
        .any(|marker| producer.contains(marker))
    {
        return true;
    }
    text.trim().chars().count() < 600 && page_count > 3
}

fn md5_hex(bytes: &[u8]) -> String {
    let mut hasher = Md5::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::PUT, MockServer};

    #[tokio::test]
    async fn extracts_text_and_normalizes_metadata() {
        let server = MockServer::start_async().await;
        let text_mock = server
            .mock_async(|when, then| {
                when.method(PUT).path("/tika");
                then.status(200).body("extracted body text");
            })
            .await;
        let meta_mock = server
            .mock_async(|when, then| {
                when.method(PUT).path("/meta");
                then.status(200).json_body(serde_json::json!({
                    "dc:title": "Quarterly Report",
                    "dc:creator": ["J. Doe"],
                    "dcterms:created": "2024-03-01T08:30:00Z",
                    "xmpTPg:NPages": "2",
                    "Keywords": "finance, quarterly , report",
                    "pdf:producer": "LibreOffice"
                }));
            })
            .await;

        let processor = ExtractProcessor::new(server.base_url(), 5);
        let item = Item {
            file_name: "report.pdf".into(),
            binary: Some(b"%PDF-1.4".to_vec()),
            doc_id: Some("corp_abc".into()),
            source_type: Some(SourceType::File),
            ..Item::default()
        };

        let patch = processor.process(&item, &RunContext::new()).await.unwrap();
        assert_eq!(patch.raw_text.as_deref(), Some("extracted body text"));

        let metadata = patch.metadata.unwrap();
        assert_eq!(metadata["title"], "Quarterly Report");
        assert_eq!(metadata["author"], "J. Doe");
        assert_eq!(metadata["created_at"], "2024-03-01T08:30:00");
        assert_eq!(metadata["page_count"], 2);
        assert_eq!(
            metadata["keywords"],
            serde_json::json!(["finance", "quarterly", "report"])
        );
        assert_eq!(metadata["language"], "zh-CN");
        assert_eq!(metadata["ingestion_method"], "tika");
        assert_eq!(metadata["doc_id"], "corp_abc");
        assert_eq!(metadata["is_scanned_pdf"], false);

        text_mock.assert_async().await;
        meta_mock.assert_async().await;
    }

    #[tokio::test]
    async fn extractor_error_aborts_the_item() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(PUT).path("/tika");
                then.status(500).body("boom");
            })
            .await;

        let processor = ExtractProcessor::new(server.base_url(), 5);
        let item = Item {
            file_name: "x.bin".into(),
            binary: Some(vec![0u8; 4]),
            ..Item::default()
        };
        let err = processor
            .process(&item, &RunContext::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessorError::Upstream { processor: "extract", .. }));
    }

    #[tokio::test]
    async fn missing_binary_passes_text_through() {
        let processor = ExtractProcessor::new("http://127.0.0.1:1".into(), 1);
        let mut item = Item {
            file_name: "inline_text".into(),
            raw_text: Some("hello world".into()),
            source_type: Some(SourceType::Text),
            ..Item::default()
        };
        item.user_metadata
            .insert("department".into(), serde_json::json!("sales"));
        item.user_metadata
            .insert("title".into(), serde_json::json!("Caller Title"));

        let patch = processor.process(&item, &RunContext::new()).await.unwrap();
        assert_eq!(patch.raw_text.as_deref(), Some("hello world"));

        let metadata = patch.metadata.unwrap();
        assert_eq!(metadata["ingestion_method"], "direct");
        assert_eq!(metadata["department"], "sales");
        // Caller metadata overwrites the derived (empty) title.
        assert_eq!(metadata["title"], "Caller Title");
        assert_eq!(metadata["raw_text_length"], 11);
    }

    #[tokio::test]
    async fn web_items_with_text_skip_extraction() {
        let processor = ExtractProcessor::new("http://127.0.0.1:1".into(), 1);
        let item = Item {
            file_name: "index.html".into(),
            binary: Some(b"<html>ignored</html>".to_vec()),
            raw_text: Some("already extracted".into()),
            source_type: Some(SourceType::Web),
            ..Item::default()
        };
        let patch = processor.process(&item, &RunContext::new()).await.unwrap();
        assert_eq!(patch.raw_text.as_deref(), Some("already extracted"));
        assert_eq!(patch.metadata.unwrap()["ingestion_method"], "direct");
    }

    #[test]
    fn datetime_normalization_tries_known_shapes() {
        assert_eq!(
            normalize_datetime("2024-03-01T08:30:00Z"),
            "2024-03-01T08:30:00"
        );
        assert_eq!(
            normalize_datetime("2024-03-01 08:30:00"),
            "2024-03-01T08:30:00"
        );
        assert_eq!(normalize_datetime("2024-03-01"), "2024-03-01T00:00:00");
        assert_eq!(
            normalize_datetime("2024-03-01T08:30:00+08:00"),
            "2024-03-01T08:30:00"
        );
        assert_eq!(normalize_datetime("March 1, 2024"), "March 1, 2024");
        assert_eq!(normalize_datetime(""), "");
    }

    #[test]
    fn scanned_pdf_heuristic() {
        assert!(is_scanned_pdf("Canon iR-ADV", "plenty of text", 1));
        assert!(is_scanned_pdf("", "short", 4));
        assert!(!is_scanned_pdf("LibreOffice", "short", 2));
        assert!(!is_scanned_pdf("LibreOffice", &"x".repeat(700), 10));
    }
}
