//! End-to-end tests driving the HTTP surface with a mocked extractor and sink.

use axum::body::{Body, to_bytes};
use axum::http::{Method, Request, StatusCode};
use httpmock::{Method::POST, Method::PUT, MockServer};
use ingestd::api::create_router;
use ingestd::config::{CONFIG, Config};
use serde_json::{Value, json};
use tokio::sync::OnceCell;
use tower::ServiceExt;

static MOCK_SERVER: OnceCell<&'static MockServer> = OnceCell::const_new();

fn set_env(key: &str, value: &str) {
    // SAFETY: Tests configure the environment once, before any reader thread exists.
    unsafe { std::env::set_var(key, value) }
}

async fn harness() -> &'static MockServer {
    MOCK_SERVER
        .get_or_init(|| async {
            let server: &'static MockServer = Box::leak(Box::new(MockServer::start_async().await));
            let base_url = server.base_url();

            set_env("TIKA_SERVICE_URL", &base_url);
            set_env("SOLR_URL", &base_url);
            set_env("SOLR_COLLECTION", "documents");
            let _ = CONFIG.set(Config::from_env().expect("test config"));

            // Extractor: plain text and empty metadata for any payload.
            server
                .mock_async(|when, then| {
                    when.method(PUT).path("/tika");
                    then.status(200).body("hello world");
                })
                .await;
            server
                .mock_async(|when, then| {
                    when.method(PUT).path("/meta");
                    then.status(200).json_body(json!({}));
                })
                .await;
            // Solr accepts every commit.
            server
                .mock_async(|when, then| {
                    when.method(POST).path("/solr/documents/update");
                    then.status(200).json_body(json!({"responseHeader": {"status": 0}}));
                })
                .await;

            server
        })
        .await
}

async fn response_json(response: axum::response::Response) -> Value {
    let body = to_bytes(response.into_body(), usize::MAX).await.expect("body");
    serde_json::from_slice(&body).expect("json body")
}

async fn post_json(uri: &str, payload: Value) -> axum::response::Response {
    create_router()
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(payload.to_string()))
                .expect("request"),
        )
        .await
        .expect("router response")
}

fn multipart_upload(uri: &str, file_name: &str, body: &[u8], metadata: Option<&str>) -> Request<Body> {
    let mut payload = Vec::new();
    payload.extend_from_slice(
        format!(
            "--boundary\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\n\
             Content-Type: application/octet-stream\r\n\r\n"
        )
        .as_bytes(),
    );
    payload.extend_from_slice(body);
    payload.extend_from_slice(b"\r\n");
    if let Some(metadata) = metadata {
        payload.extend_from_slice(
            format!(
                "--boundary\r\nContent-Disposition: form-data; name=\"metadata\"\r\n\r\n{metadata}\r\n"
            )
            .as_bytes(),
        );
    }
    payload.extend_from_slice(b"--boundary--\r\n");

    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "multipart/form-data; boundary=boundary")
        .body(Body::from(payload))
        .expect("request")
}

#[tokio::test]
async fn base64_round_trip_without_provider() {
    harness().await;

    let encoded = "aGVsbG8gd29ybGQ="; // "hello world"
    let response = post_json(
        "/ingest",
        json!({ "source_type": "base64", "base64_content": encoded }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = response_json(response).await;
    assert_eq!(body["status"], "completed");
    assert_eq!(body["total_requests"], 1);
    assert_eq!(body["results"][0]["status"], "ok");

    let item = &body["results"][0]["result"]["items"][0];
    assert_eq!(item["status"], "ok");
    assert_eq!(item["file_name"], "base64_input");
    assert_eq!(item["chunk_count"], 1);
    assert_eq!(item["embedding_count"], 0);
    assert_eq!(item["embedding_dim"], 0);
}

#[tokio::test]
async fn malformed_base64_fails_the_entry() {
    harness().await;

    let response = post_json(
        "/ingest",
        json!({ "source_type": "base64", "base64_content": "!!!definitely not base64!!!" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = response_json(response).await;
    assert_eq!(body["results"][0]["status"], "failed");
    assert!(
        body["results"][0]["error"]
            .as_str()
            .unwrap()
            .contains("invalid base64")
    );
}

#[tokio::test]
async fn upload_assigns_stable_identity() {
    harness().await;
    let app_request = || {
        multipart_upload(
            "/upload?source_system=corp",
            "report.pdf",
            b"identical file bytes",
            None,
        )
    };

    let first = create_router().oneshot(app_request()).await.expect("first");
    assert_eq!(first.status(), StatusCode::OK);
    let first = response_json(first).await;
    let first_id = first["result"]["items"][0]["doc_id"].as_str().unwrap().to_string();

    let second = create_router().oneshot(app_request()).await.expect("second");
    let second = response_json(second).await;
    let second_id = second["result"]["items"][0]["doc_id"].as_str().unwrap();

    assert_eq!(first_id, second_id);
    assert!(first_id.starts_with("corp_"));
    assert_eq!(first_id.len(), "corp_".len() + 16);
}

#[tokio::test]
async fn caller_supplied_doc_id_wins() {
    harness().await;
    let response = create_router()
        .oneshot(multipart_upload(
            "/upload",
            "report.pdf",
            b"some bytes",
            Some(r#"{"doc_id": " EXT-42 "}"#),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let body = response_json(response).await;
    assert_eq!(body["result"]["items"][0]["doc_id"], "EXT-42");
}

#[tokio::test]
async fn upload_without_file_field_is_rejected() {
    harness().await;
    let request = Request::builder()
        .method(Method::POST)
        .uri("/upload")
        .header("content-type", "multipart/form-data; boundary=boundary")
        .body(Body::from("--boundary--\r\n"))
        .expect("request");
    let response = create_router().oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unsupported_uri_scheme_fails_the_entry() {
    harness().await;
    let response = post_json(
        "/ingest",
        json!({ "source_type": "uri", "uri": "gopher://old.test/doc" }),
    )
    .await;
    let body = response_json(response).await;
    assert_eq!(body["results"][0]["status"], "failed");
    assert!(
        body["results"][0]["error"]
            .as_str()
            .unwrap()
            .contains("unsupported")
    );
}
