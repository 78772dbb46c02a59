mod common;

use std::sync::Arc;

use thumbnail_pipeline::batch::BatchJob;
use thumbnail_pipeline::config::GeminiConfig;
use thumbnail_pipeline::content::{ContentStatus, ContentStore};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{CountingContentStore, RecordingStore, build_pipeline, png_bytes, published};

#[tokio::test]
async fn batch_processes_backlog_and_isolates_failures() {
    let server = MockServer::start().await;
    for name in ["one", "two", "three"] {
        Mock::given(method("GET"))
            .and(path(format!("/x/{name}.png")))
            .respond_with(ResponseTemplate::new(200).set_body_raw(png_bytes(320, 240), "image/png"))
            .mount(&server)
            .await;
    }
    Mock::given(method("GET"))
        .and(path("/x/gone.png"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let content = Arc::new(CountingContentStore::default());
    for name in ["one", "two", "three", "gone"] {
        content.inner.insert(published(name, &format!("{}/x/{name}.png", server.uri()))).await;
    }
    let mut draft = published("draft", &format!("{}/x/one.png", server.uri()));
    draft.status = ContentStatus::Draft;
    content.inner.insert(draft).await;

    let store = Arc::new(RecordingStore::default());
    let pipeline = Arc::new(build_pipeline(store.clone(), content.clone(), GeminiConfig::default()));
    let report = BatchJob::new(pipeline).run_batch(10).await.unwrap();

    assert_eq!(report.selected, 4);
    assert_eq!(report.succeeded, 3);
    assert_eq!(report.failed, 1);
    assert_eq!(report.remaining, 1);
    assert_eq!(store.writes().len(), 3);
    assert!(content.get("gone").await.unwrap().unwrap().thumbnail_url.is_none());
    assert!(content.get("draft").await.unwrap().unwrap().thumbnail_url.is_none());
}

#[tokio::test]
async fn batch_honours_limit_and_reports_remaining() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(png_bytes(64, 64), "image/png"))
        .mount(&server)
        .await;

    let content = Arc::new(CountingContentStore::default());
    for i in 0..5 {
        content.inner.insert(published(&format!("c{i}"), &format!("{}/x/{i}.png", server.uri()))).await;
    }
    let store = Arc::new(RecordingStore::default());
    let pipeline = Arc::new(build_pipeline(store, content.clone(), GeminiConfig::default()));
    let job = BatchJob::new(pipeline);

    let first = job.run_batch(2).await.unwrap();
    assert_eq!((first.selected, first.succeeded, first.remaining), (2, 2, 3));

    let second = job.run_batch(10).await.unwrap();
    assert_eq!((second.selected, second.succeeded, second.remaining), (3, 3, 0));
    assert_eq!(content.update_count(), 5);
}
