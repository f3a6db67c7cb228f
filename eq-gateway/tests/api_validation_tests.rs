//! Endpoint validation tests
//!
//! Exercise the request-validation surface of the router: auth gating,
//! empty-text rejection, format and size gates, and tenant scoping that
//! short-circuits before any external call. None of these paths touch
//! the database or the network, so the pool is lazy and never connects.

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::util::ServiceExt;
use uuid::Uuid;

use eq_gateway::config::Config;
use eq_gateway::{build_router, AppState};

fn test_config(allow_legacy: bool) -> Config {
    Config {
        jwt_secret: Some("0123456789abcdef0123456789abcdef".to_string()),
        jwt_issuer: "eq-frontend".to_string(),
        jwt_audience: "eq-backend".to_string(),
        allow_legacy_header_auth: allow_legacy,
        mock_tenant_id: None,
        mock_user_id: None,
        upload_bucket: "test-bucket".to_string(),
        upload_region: "us-east-1".to_string(),
        aws_credentials: None,
        presigned_put_expiry_secs: 300,
        presigned_get_expiry_secs: 3600,
        kinesis_stream: "test-stream".to_string(),
        event_bus: "default".to_string(),
        event_source: "com.yourapp.transcription".to_string(),
        enable_stream_publishing: true,
        enable_bus_publishing: true,
        openai_api_key: "test-key".to_string(),
        llm_model: "gpt-4o".to_string(),
        deepgram_api_key: "test-key".to_string(),
        database_url: "postgres://localhost/unused".to_string(),
        session_buffer_ttl_secs: 86_400,
        bind_addr: "127.0.0.1:0".to_string(),
    }
}

/// Router with a lazy pool: nothing connects unless a handler reaches
/// for the database.
fn create_test_app(allow_legacy: bool) -> axum::Router {
    let pool = sqlx::postgres::PgPoolOptions::new()
        .connect_lazy("postgres://localhost/unused")
        .expect("lazy pool");
    build_router(AppState::new(pool, test_config(allow_legacy)))
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn legacy_headers(builder: axum::http::request::Builder, tenant: Uuid) -> axum::http::request::Builder {
    builder
        .header("x-tenant-id", tenant.to_string())
        .header("x-user-id", "test-user")
}

#[tokio::test]
async fn health_endpoint_answers_ok() {
    let app = create_test_app(false);
    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["service"], "eq-gateway");
}

#[tokio::test]
async fn demo_page_served_at_root() {
    let app = create_test_app(false);
    let response = app
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert!(std::str::from_utf8(&bytes).unwrap().contains("<!DOCTYPE html>"));
}

#[tokio::test]
async fn text_clean_requires_identity() {
    let app = create_test_app(false);
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/text/clean")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json!({"text": "hello"}).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let json = body_json(response).await;
    assert!(json["detail"].is_string());
}

#[tokio::test]
async fn text_clean_rejects_whitespace_only_text() {
    let app = create_test_app(true);
    let response = app
        .oneshot(
            legacy_headers(
                Request::builder().method("POST").uri("/text/clean"),
                Uuid::new_v4(),
            )
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json!({"text": "   \t\n"}).to_string()))
            .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert!(
        json["detail"].as_str().unwrap().contains("whitespace"),
        "detail should mention whitespace: {json}"
    );
}

#[tokio::test]
async fn text_clean_rejects_invalid_tenant_header() {
    let app = create_test_app(true);
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/text/clean")
                .header("x-tenant-id", "not-a-uuid")
                .header("x-user-id", "user")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json!({"text": "hello"}).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn batch_rejects_unsupported_extension_before_reading_audio() {
    let app = create_test_app(true);

    let boundary = "test-boundary";
    let body = format!(
        "--{boundary}\r\n\
         Content-Disposition: form-data; name=\"file\"; filename=\"notes.txt\"\r\n\
         Content-Type: text/plain\r\n\r\n\
         not audio\r\n\
         --{boundary}--\r\n"
    );

    let response = app
        .oneshot(
            legacy_headers(
                Request::builder().method("POST").uri("/batch/process"),
                Uuid::new_v4(),
            )
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={boundary}"),
            )
            .body(Body::from(body))
            .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert!(json["detail"]
        .as_str()
        .unwrap()
        .to_lowercase()
        .contains("format"));
}

#[tokio::test]
async fn batch_without_file_field_is_rejected() {
    let app = create_test_app(true);

    let boundary = "test-boundary";
    let body = format!(
        "--{boundary}\r\n\
         Content-Disposition: form-data; name=\"note\"\r\n\r\n\
         just a text field\r\n\
         --{boundary}--\r\n"
    );

    let response = app
        .oneshot(
            legacy_headers(
                Request::builder().method("POST").uri("/batch/process"),
                Uuid::new_v4(),
            )
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={boundary}"),
            )
            .body(Body::from(body))
            .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn upload_status_rejects_malformed_job_id() {
    let app = create_test_app(true);
    let response = app
        .oneshot(
            legacy_headers(
                Request::builder().uri("/upload/status/not-a-uuid"),
                Uuid::new_v4(),
            )
            .body(Body::empty())
            .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert!(json["detail"].as_str().unwrap().contains("job ID"));
}

#[tokio::test]
async fn upload_init_rejects_path_separators() {
    let app = create_test_app(true);
    let response = app
        .oneshot(
            legacy_headers(
                Request::builder().method("POST").uri("/upload/init"),
                Uuid::new_v4(),
            )
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(
                json!({"filename": "../escape.mp3", "mime_type": "audio/mpeg"}).to_string(),
            ))
            .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn upload_init_without_store_is_internal_error() {
    // Valid input but no object store credentials configured
    let app = create_test_app(true);
    let response = app
        .oneshot(
            legacy_headers(
                Request::builder().method("POST").uri("/upload/init"),
                Uuid::new_v4(),
            )
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(
                json!({"filename": "call.mp3", "mime_type": "audio/mpeg"}).to_string(),
            ))
            .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    // The body stays generic; no internal detail leaks
    let json = body_json(response).await;
    assert_eq!(json["detail"], "Internal server error");
}

#[tokio::test]
async fn upload_complete_outside_tenant_prefix_reads_as_missing() {
    let app = create_test_app(true);
    let other_tenant = Uuid::new_v4();
    let response = app
        .oneshot(
            legacy_headers(
                Request::builder().method("POST").uri("/upload/complete"),
                Uuid::new_v4(),
            )
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(
                json!({
                    "file_key": format!("tenant/{other_tenant}/uploads/x/call.mp3")
                })
                .to_string(),
            ))
            .unwrap(),
        )
        .await
        .unwrap();

    // 404, never 403: existence must not leak across tenants
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json = body_json(response).await;
    assert_eq!(json["detail"], "Job not found");
}

#[tokio::test]
async fn unknown_envelope_source_is_rejected() {
    let app = create_test_app(true);
    let response = app
        .oneshot(
            legacy_headers(
                Request::builder().method("POST").uri("/text/clean"),
                Uuid::new_v4(),
            )
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(
                json!({"text": "hello", "source": "carrier-pigeon"}).to_string(),
            ))
            .unwrap(),
        )
        .await
        .unwrap();

    assert!(response.status().is_client_error());
}
