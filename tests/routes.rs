mod common;

use std::sync::Arc;

use axum::Json;
use axum::body::{Bytes, to_bytes};
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::Response;
use serde_json::Value;
use thumbnail_pipeline::batch::BatchJob;
use thumbnail_pipeline::config::GeminiConfig;
use thumbnail_pipeline::routes::{
    AppState, GenerateBody, ROLE_HEADER, ResponsiveBody, batch_generate, generate_responsive, generate_thumbnail,
};
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{CountingContentStore, RecordingStore, build_pipeline, png_bytes, published};

fn state(content: Arc<CountingContentStore>) -> (AppState, Arc<RecordingStore>) {
    let store = Arc::new(RecordingStore::default());
    let pipeline = Arc::new(build_pipeline(store.clone(), content, GeminiConfig::default()));
    let batch = BatchJob::new(pipeline.clone());
    (AppState { pipeline, batch }, store)
}

async fn json_body(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn generate_returns_thumbnail_url_and_method() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(png_bytes(900, 600), "image/png"))
        .mount(&server)
        .await;
    let image_url = format!("{}/x/photo.jpg", server.uri());
    let content = Arc::new(CountingContentStore::default());
    content.inner.insert(published("abc", &image_url)).await;
    let (state, store) = state(content);

    let body = GenerateBody {
        content_id: Some("abc".into()),
        image_url: Some(image_url),
        method: Some("crop".into()),
        ..Default::default()
    };
    let response = generate_thumbnail(State(state), Ok::<_, JsonRejection>(Json(body))).await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["success"], true);
    assert_eq!(json["method"], "crop");
    let url = json["thumbnailUrl"].as_str().unwrap();
    assert_eq!(url, format!("https://storage.googleapis.com/test-bucket/thumbnails/{}", store.writes()[0].filename));
}

#[tokio::test]
async fn generate_rejects_bad_method_with_error_body() {
    let (state, store) = state(Arc::new(CountingContentStore::default()));
    let body = GenerateBody {
        image_url: Some("https://storage.googleapis.com/x/photo.jpg".into()),
        method: Some("stretch".into()),
        ..Default::default()
    };

    let response = generate_thumbnail(State(state), Ok::<_, JsonRejection>(Json(body))).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(json_body(response).await["error"].as_str().unwrap().contains("method"));
    assert!(store.writes().is_empty());
}

#[tokio::test]
async fn pipeline_failure_is_a_server_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;
    let (state, _store) = state(Arc::new(CountingContentStore::default()));
    let body = GenerateBody {
        content_id: Some("abc".into()),
        image_url: Some(format!("{}/x/photo.jpg", server.uri())),
        method: Some("crop".into()),
        ..Default::default()
    };

    let response = generate_thumbnail(State(state), Ok::<_, JsonRejection>(Json(body))).await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(json_body(response).await["error"].is_string());
}

#[tokio::test]
async fn responsive_requires_image_url() {
    let (state, _store) = state(Arc::new(CountingContentStore::default()));
    let body = ResponsiveBody {
        content_id: None,
        image_url: None,
    };

    let response = generate_responsive(State(state), Ok::<_, JsonRejection>(Json(body))).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"], "imageUrl is required");
}

#[tokio::test]
async fn batch_requires_elevated_role() {
    let (state, _store) = state(Arc::new(CountingContentStore::default()));
    let mut headers = HeaderMap::new();
    headers.insert(ROLE_HEADER, HeaderValue::from_static("editor"));

    let response = batch_generate(State(state), headers, Bytes::new()).await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(json_body(response).await["error"].is_string());
}

#[tokio::test]
async fn batch_returns_immediately_for_admin() {
    let (state, _store) = state(Arc::new(CountingContentStore::default()));
    let mut headers = HeaderMap::new();
    headers.insert(ROLE_HEADER, HeaderValue::from_static("admin"));

    let response = batch_generate(State(state), headers, Bytes::from_static(br#"{"limit": 5}"#)).await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["success"], true);
    assert!(json["message"].as_str().unwrap().contains('5'));
}
