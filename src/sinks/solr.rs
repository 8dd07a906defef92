//! Full-text sink: posts assembled records to a Solr update endpoint.

use crate::pipeline::{Item, RunContext, SinkError};
use crate::sinks::Sink;
use async_trait::async_trait;
use reqwest::Client;

/// Posts `solr_docs` to `{base}/solr/{collection}/update?commit=true` as a JSON array.
pub struct SolrSink {
    client: Client,
    base_url: String,
    collection: String,
}

impl SolrSink {
    /// Build the sink for a Solr base URL and collection.
    pub fn new(base_url: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            collection: collection.into(),
        }
    }
}

#[async_trait]
impl Sink for SolrSink {
    fn name(&self) -> &'static str {
        "solr"
    }

    async fn write(&self, item: &Item, ctx: &RunContext) -> Result<(), SinkError> {
        let docs = item
            .solr_docs
            .as_ref()
            .filter(|docs| !docs.is_empty())
            .ok_or(SinkError::MissingRecords { sink: "solr" })?;

        let url = format!(
            "{}/solr/{}/update?commit=true",
            self.base_url, self.collection
        );
        let response = self.client.post(&url).json(docs).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SinkError::UnexpectedStatus {
                sink: "solr",
                status,
                body,
            });
        }

        tracing::info!(
            run_id = %ctx.run_id,
            collection = %self.collection,
            docs = docs.len(),
            doc_id = item.doc_id.as_deref().unwrap_or_default(),
            "Documents committed to Solr"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::Item;
    use httpmock::{Method::POST, MockServer};
    use serde_json::json;

    fn assembled_item() -> Item {
        Item {
            doc_id: Some("corp_abc".into()),
            solr_docs: Some(vec![json!({"id": "p", "doc_type": "document"})]),
            ..Item::default()
        }
    }

    #[tokio::test]
    async fn posts_records_to_the_update_endpoint() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/solr/documents/update")
                    .query_param("commit", "true")
                    .json_body(json!([{"id": "p", "doc_type": "document"}]));
                then.status(200).json_body(json!({"responseHeader": {"status": 0}}));
            })
            .await;

        let sink = SolrSink::new(server.base_url(), "documents");
        sink.write(&assembled_item(), &RunContext::new())
            .await
            .expect("write");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn non_2xx_responses_fail_the_write() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/solr/documents/update");
                then.status(500).body("solr exploded");
            })
            .await;

        let sink = SolrSink::new(server.base_url(), "documents");
        let err = sink
            .write(&assembled_item(), &RunContext::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SinkError::UnexpectedStatus { sink: "solr", .. }));
    }

    #[tokio::test]
    async fn missing_records_fail_fast() {
        let sink = SolrSink::new("http://127.0.0.1:1", "documents");
        let err = sink
            .write(&Item::default(), &RunContext::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SinkError::MissingRecords { sink: "solr" }));
    }
}
