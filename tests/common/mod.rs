#![allow(dead_code)]

use std::io::Cursor;
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use image::{ImageFormat, Rgb, RgbImage};
use thumbnail_pipeline::config::GeminiConfig;
use thumbnail_pipeline::content::{
    ContentRecord, ContentStatus, ContentStore, InMemoryContentStore, ThumbnailUpdate,
};
use thumbnail_pipeline::error::{PipelineError, StorageError};
use thumbnail_pipeline::fetcher::ImageFetcher;
use thumbnail_pipeline::gemini::GeminiClient;
use thumbnail_pipeline::pipeline::ThumbnailPipeline;
use thumbnail_pipeline::retry::RetryPolicy;
use thumbnail_pipeline::smart_thumbnail::SmartThumbnailGenerator;
use thumbnail_pipeline::storage::ImageStore;
use thumbnail_pipeline::url_validation::UrlValidator;

pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let image = RgbImage::from_fn(width, height, |x, y| Rgb([(x % 256) as u8, (y % 256) as u8, 128]));
    let mut out = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
        .unwrap();
    out
}

#[derive(Debug, Clone)]
pub struct StoredObject {
    pub prefix: String,
    pub filename: String,
    pub content_type: String,
    pub bytes: Bytes,
}

/// Keeps every write in memory; filenames containing `fail_on` are refused.
#[derive(Default)]
pub struct RecordingStore {
    pub writes: Mutex<Vec<StoredObject>>,
    pub fail_on: Option<String>,
}

impl RecordingStore {
    pub fn failing_on(pattern: &str) -> Self {
        Self {
            writes: Mutex::new(Vec::new()),
            fail_on: Some(pattern.to_string()),
        }
    }

    pub fn writes(&self) -> Vec<StoredObject> {
        self.writes.lock().unwrap().clone()
    }
}

#[async_trait]
impl ImageStore for RecordingStore {
    async fn store(
        &self,
        prefix: &str,
        filename: &str,
        bytes: Bytes,
        content_type: &str,
    ) -> Result<String, StorageError> {
        if self.fail_on.as_deref().is_some_and(|pattern| filename.contains(pattern)) {
            return Err(StorageError::Upstream {
                status: 503,
                body: "bucket unavailable".into(),
            });
        }
        self.writes.lock().unwrap().push(StoredObject {
            prefix: prefix.to_string(),
            filename: filename.to_string(),
            content_type: content_type.to_string(),
            bytes,
        });
        Ok(format!("https://storage.googleapis.com/test-bucket/{prefix}/{filename}"))
    }

    fn backend_name(&self) -> &'static str {
        "recording"
    }
}

/// In-memory content store that counts reads and thumbnail updates.
#[derive(Default)]
pub struct CountingContentStore {
    pub inner: InMemoryContentStore,
    pub reads: AtomicUsize,
    pub updates: AtomicUsize,
}

impl CountingContentStore {
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn update_count(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentStore for CountingContentStore {
    async fn get(&self, id: &str) -> Result<Option<ContentRecord>, PipelineError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.get(id).await
    }

    async fn update_thumbnail(&self, id: &str, update: &ThumbnailUpdate) -> Result<(), PipelineError> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        self.inner.update_thumbnail(id, update).await
    }

    async fn list_backlog(&self, limit: usize) -> Result<Vec<ContentRecord>, PipelineError> {
        self.inner.list_backlog(limit).await
    }

    async fn count_backlog(&self) -> Result<u64, PipelineError> {
        self.inner.count_backlog().await
    }
}

pub fn published(id: &str, image_url: &str) -> ContentRecord {
    ContentRecord {
        id: id.to_string(),
        status: ContentStatus::Published,
        title: Some(format!("Title of {id}")),
        excerpt: Some(format!("Excerpt of {id}")),
        image_url: Some(image_url.to_string()),
        thumbnail_url: None,
        is_ai_generated_thumbnail: false,
        ai_thumbnail_model: None,
        ai_thumbnail_prompt: None,
    }
}

pub fn gemini_config(base_url: &str) -> GeminiConfig {
    GeminiConfig {
        api_key: Some("test-key".into()),
        base_url: base_url.to_string(),
        ..GeminiConfig::default()
    }
}

/// Same attempt budgets as production, with millisecond backoffs.
pub const FAST_DESCRIBE: RetryPolicy = RetryPolicy {
    initial_backoff: Duration::from_millis(5),
    max_backoff: Duration::from_millis(20),
    ..RetryPolicy::DESCRIBE
};

pub const FAST_GENERATE: RetryPolicy = RetryPolicy {
    initial_backoff: Duration::from_millis(5),
    max_backoff: Duration::from_millis(20),
    ..RetryPolicy::GENERATE
};

pub fn build_pipeline(
    store: Arc<dyn ImageStore>,
    content: Arc<dyn ContentStore>,
    gemini: GeminiConfig,
) -> ThumbnailPipeline {
    build_pipeline_with_client(store, content, GeminiClient::new(gemini).unwrap())
}

pub fn build_pipeline_with_client(
    store: Arc<dyn ImageStore>,
    content: Arc<dyn ContentStore>,
    gemini: GeminiClient,
) -> ThumbnailPipeline {
    let fetcher = ImageFetcher::new().unwrap();
    let smart = SmartThumbnailGenerator::new(Arc::new(gemini), fetcher.clone(), store.clone())
        .with_retry_policies(FAST_DESCRIBE, FAST_GENERATE);
    ThumbnailPipeline::new(UrlValidator::with_defaults(), fetcher, store, content, smart)
}
