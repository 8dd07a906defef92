//! Vector sink: upserts chunk records into a named vector store collection.
//!
//! Speaks the qdrant-style REST surface: the collection is created on first use with
//! the dimensionality of the incoming vectors, then chunk records are upserted as
//! points whose payload is the record minus its vector.

use crate::pipeline::{Item, RunContext, SinkError};
use crate::sinks::Sink;
use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde_json::{Value, json};
use tokio::sync::OnceCell;

/// Upserts `vector_docs` into the configured collection.
pub struct VectorSink {
    client: Client,
    base_url: String,
    collection: String,
    collection_ready: OnceCell<()>,
}

impl VectorSink {
    /// Build the sink for a vector store base URL and collection.
    pub fn new(base_url: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            collection: collection.into(),
            collection_ready: OnceCell::new(),
        }
    }

    async fn ensure_collection(&self, vector_size: usize) -> Result<(), SinkError> {
        self.collection_ready
            .get_or_try_init(|| async {
                let url = format!("{}/collections/{}", self.base_url, self.collection);
                let exists = self.client.get(&url).send().await?;
                if exists.status() == StatusCode::OK {
                    return Ok(());
                }

                let response = self
                    .client
                    .request(Method::PUT, &url)
                    .json(&json!({
                        "vectors": { "size": vector_size, "distance": "Cosine" }
                    }))
                    .send()
                    .await?;
                if !response.status().is_success() {
                    let status = response.status();
                    let body = response.text().await.unwrap_or_default();
                    return Err(SinkError::UnexpectedStatus {
                        sink: "vector",
                        status,
                        body,
                    });
                }
                tracing::debug!(collection = %self.collection, vector_size, "Collection created");
                Ok(())
            })
            .await
            .map(|_| ())
    }
}

#[async_trait]
impl Sink for VectorSink {
    fn name(&self) -> &'static str {
        "vector"
    }

    async fn write(&self, item: &Item, ctx: &RunContext) -> Result<(), SinkError> {
        let docs = item
            .vector_docs
            .as_ref()
            .ok_or(SinkError::MissingRecords { sink: "vector" })?;

        let points: Vec<Value> = docs
            .iter()
            .filter_map(|doc| {
                let object = doc.as_object()?;
                let vector = object.get("_gl_vector")?.as_array()?.clone();
                let id = object.get("id")?.as_str()?.to_string();
                let mut payload = object.clone();
                payload.remove("_gl_vector");
                Some(json!({ "id": id, "vector": vector, "payload": payload }))
            })
            .collect();

        if points.is_empty() {
            tracing::debug!(
                doc_id = item.doc_id.as_deref().unwrap_or_default(),
                "No vectors to upsert; skipping vector sink"
            );
            return Ok(());
        }

        let vector_size = points
            .first()
            .and_then(|point| point["vector"].as_array().map(Vec::len))
            .unwrap_or(0);
        self.ensure_collection(vector_size).await?;

        let url = format!(
            "{}/collections/{}/points?wait=true",
            self.base_url, self.collection
        );
        let point_count = points.len();
        let response = self
            .client
            .request(Method::PUT, &url)
            .json(&json!({ "points": points }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SinkError::UnexpectedStatus {
                sink: "vector",
                status,
                body,
            });
        }

        tracing::info!(
            run_id = %ctx.run_id,
            collection = %self.collection,
            points = point_count,
            doc_id = item.doc_id.as_deref().unwrap_or_default(),
            "Vectors upserted"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::Item;
    use httpmock::{Method::GET, Method::PUT, MockServer};

    fn assembled_item() -> Item {
        Item {
            doc_id: Some("corp_abc".into()),
            vector_docs: Some(vec![json!({
                "id": "chunk-uuid-0",
                "doc_id": "corp_abc_chunk_000000",
                "chunk_content": "text",
                "_gl_vector": [0.1, 0.2, 0.3]
            })]),
            ..Item::default()
        }
    }

    #[tokio::test]
    async fn upserts_points_without_their_vectors_in_payload() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/collections/documents");
                then.status(404);
            })
            .await;
        let create = server
            .mock_async(|when, then| {
                when.method(PUT).path("/collections/documents");
                then.status(200).json_body(json!({"result": true}));
            })
            .await;
        let upsert = server
            .mock_async(|when, then| {
                when.method(PUT)
                    .path("/collections/documents/points")
                    .query_param("wait", "true")
                    .json_body_partial(
                        r#"{"points": [{"id": "chunk-uuid-0", "vector": [0.1, 0.2, 0.3]}]}"#,
                    );
                then.status(200).json_body(json!({"result": {"status": "ok"}}));
            })
            .await;

        let sink = VectorSink::new(server.base_url(), "documents");
        sink.write(&assembled_item(), &RunContext::new())
            .await
            .expect("write");
        create.assert_async().await;
        upsert.assert_async().await;
    }

    #[tokio::test]
    async fn vectorless_records_are_skipped() {
        let sink = VectorSink::new("http://127.0.0.1:1", "documents");
        let item = Item {
            vector_docs: Some(vec![json!({"id": "x", "chunk_content": "no vector"})]),
            ..Item::default()
        };
        // No vectors, so no HTTP call is attempted against the dead address.
        sink.write(&item, &RunContext::new()).await.expect("write");
    }

    #[tokio::test]
    async fn missing_records_fail_fast() {
        let sink = VectorSink::new("http://127.0.0.1:1", "documents");
        let err = sink
            .write(&Item::default(), &RunContext::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SinkError::MissingRecords { sink: "vector" }));
    }
}
