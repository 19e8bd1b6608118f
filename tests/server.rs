mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use tower::ServiceExt;

use common::{harness, legal_corpus, Harness, RecordingModel, MOCK_ANSWER};
use nyaysetu::server::{router, SESSION_HEADER};

const BOUNDARY: &str = "nyaysetu-test-boundary";

enum Part<'a> {
    Text(&'a str, &'a str),
    File(&'a str, &'a str, &'a [u8]),
}

fn multipart_body(parts: &[Part]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        match part {
            Part::Text(name, value) => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name).as_bytes(),
                );
                body.extend_from_slice(value.as_bytes());
            }
            Part::File(name, file_name, bytes) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n\
                         Content-Type: application/octet-stream\r\n\r\n",
                        name, file_name
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(bytes);
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

async fn post_multipart(h: &Harness, parts: &[Part<'_>]) -> Response {
    let request = Request::builder()
        .method("POST")
        .uri("/ask")
        .header(
            "content-type",
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(multipart_body(parts)))
        .unwrap();
    router(h.services.clone()).oneshot(request).await.unwrap()
}

async fn post_json(h: &Harness, body: &str) -> Response {
    let request = Request::builder()
        .method("POST")
        .uri("/ask/json")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    router(h.services.clone()).oneshot(request).await.unwrap()
}

async fn json_of(response: Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn root_reports_running() {
    let h = harness(&[], RecordingModel::answering(MOCK_ANSWER)).await;
    let response = router(h.services.clone())
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        json_of(response).await["message"],
        "Legal AI Assistant is running"
    );
}

#[tokio::test]
async fn health_reports_base_index() {
    let h = harness(&legal_corpus(), RecordingModel::answering(MOCK_ANSWER)).await;
    let response = router(h.services.clone())
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let json = json_of(response).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["base_index_loaded"], true);
    assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn json_greeting() {
    let h = harness(&[], RecordingModel::answering(MOCK_ANSWER)).await;
    let response = post_json(&h, r#"{"question": "hi"}"#).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get(SESSION_HEADER).is_none());

    let json = json_of(response).await;
    assert_eq!(json["mode"], "greeting");
    assert_eq!(json["confidence"], 100);
    assert_eq!(json["context"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn json_empty_question_is_bad_request() {
    let h = harness(&[], RecordingModel::answering(MOCK_ANSWER)).await;
    let response = post_json(&h, r#"{"question": "   "}"#).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_of(response).await["error"]["code"], "bad_request");
}

#[tokio::test]
async fn json_malformed_body_is_bad_request() {
    let h = harness(&[], RecordingModel::answering(MOCK_ANSWER)).await;
    let response = post_json(&h, "{not json").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_of(response).await["error"]["code"], "bad_request");
}

#[tokio::test]
async fn multipart_missing_question_is_bad_request() {
    let h = harness(&[], RecordingModel::answering(MOCK_ANSWER)).await;
    let response = post_multipart(&h, &[Part::Text("session_id", "abc")]).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_of(response).await["error"]["code"], "bad_request");
    assert_eq!(h.model.calls(), 0);
}

#[tokio::test]
async fn unsupported_upload_is_415() {
    let h = harness(&[], RecordingModel::answering(MOCK_ANSWER)).await;
    let response = post_multipart(
        &h,
        &[
            Part::Text("question", "What does this contract say?"),
            Part::File("file", "contract.docx", b"PK\x03\x04"),
        ],
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    let json = json_of(response).await;
    assert_eq!(json["error"]["code"], "unsupported_file_type");
    assert_eq!(h.model.calls(), 0);
}

#[tokio::test]
async fn empty_upload_is_rejected() {
    let h = harness(&[], RecordingModel::answering(MOCK_ANSWER)).await;
    let response = post_multipart(
        &h,
        &[
            Part::Text("question", "What does this say?"),
            Part::File("file", "blank.txt", b""),
        ],
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_of(response).await["error"]["code"], "empty_file");
}

#[tokio::test]
async fn unreadable_pdf_is_422() {
    let h = harness(&[], RecordingModel::answering(MOCK_ANSWER)).await;
    let response = post_multipart(
        &h,
        &[
            Part::Text("question", "Summarise this judgment"),
            Part::File("file", "judgment.pdf", b"this is not a pdf"),
        ],
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json_of(response).await["error"]["code"], "extraction_failed");
}

#[tokio::test]
async fn invalid_session_id_is_rejected() {
    let h = harness(&[], RecordingModel::answering(MOCK_ANSWER)).await;
    let response = post_json(&h, r#"{"question": "What is bail?", "session_id": "../x"}"#).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_of(response).await["error"]["code"], "invalid_session");
}

#[tokio::test]
async fn text_upload_answers_from_document_and_starts_session() {
    let h = harness(&legal_corpus(), RecordingModel::answering(MOCK_ANSWER)).await;
    let lease = b"The tenant must pay rent to the landlord monthly. Eviction needs notice.";

    let response = post_multipart(
        &h,
        &[
            Part::Text("question", "How often is rent due for the tenant?"),
            Part::File("file", "lease.txt", lease),
        ],
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let session = response
        .headers()
        .get(SESSION_HEADER)
        .expect("session header")
        .to_str()
        .unwrap()
        .to_string();

    let json = json_of(response).await;
    assert_eq!(json["mode"], "uploaded");
    assert_eq!(json["confidence"], 95);
    assert_eq!(json["answer"], MOCK_ANSWER);
    assert_eq!(json["context"][0]["label"], "uploaded-document");

    // Follow-up in the same session, no file attached.
    let body = format!(
        r#"{{"question": "Can the landlord begin eviction?", "session_id": "{}"}}"#,
        session
    );
    let response = post_json(&h, &body).await;
    assert_eq!(
        response.headers().get(SESSION_HEADER).unwrap().to_str().unwrap(),
        session
    );
    assert_eq!(json_of(response).await["mode"], "uploaded");
}

#[tokio::test]
async fn generation_failure_is_not_an_http_error() {
    let h = harness(&[], RecordingModel::failing("connection refused")).await;
    let response = post_json(&h, r#"{"question": "What is an FIR?"}"#).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = json_of(response).await;
    assert_eq!(json["mode"], "static");
    assert_eq!(json["confidence"], 30);
    assert!(json["error"].as_str().unwrap().contains("connection refused"));
}
