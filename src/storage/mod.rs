//! Durable sink for derivative images.
//!
//! Two interchangeable backends sit behind [`ImageStore`]: Google Cloud
//! Storage when a bucket is configured, the local uploads directory otherwise.
//! The choice is made once in [`build_store`]; there is no runtime fallback
//! from one to the other.

pub mod gcs;
pub mod hash;
pub mod local;

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use tracing::info;

use crate::config::StorageConfig;
use crate::error::StorageError;

pub use gcs::GcsStorage;
pub use local::LocalFileStorage;

pub const THUMBNAIL_PREFIX: &str = "thumbnails";
pub const AI_THUMBNAIL_PREFIX: &str = "ai-thumbnails";

/// `cache-control` written with every object-storage upload.
pub const LONG_LIVED_CACHE_CONTROL: &str = "public, max-age=31536000";

#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Persists `bytes` as `<prefix>/<filename>` and returns the public URL.
    async fn store(
        &self,
        prefix: &str,
        filename: &str,
        bytes: Bytes,
        content_type: &str,
    ) -> Result<String, StorageError>;

    fn backend_name(&self) -> &'static str;
}

pub async fn build_store(config: &StorageConfig) -> Result<Arc<dyn ImageStore>, StorageError> {
    let store: Arc<dyn ImageStore> = match &config.gcs {
        Some(gcs) => Arc::new(GcsStorage::from_config(gcs).await?),
        None => Arc::new(LocalFileStorage::new(
            config.uploads_dir.clone(),
            config.public_base_url.clone(),
        )),
    };
    match &config.gcs {
        Some(gcs) => info!(backend = store.backend_name(), bucket = %gcs.bucket, "thumbnail storage ready"),
        None => info!(
            backend = store.backend_name(),
            dir = %config.uploads_dir.display(),
            "thumbnail storage ready"
        ),
    }
    Ok(store)
}

static LAST_TIMESTAMP_MS: AtomicI64 = AtomicI64::new(0);

/// Wall-clock milliseconds, bumped so that no two calls in this process
/// return the same value.
pub fn unique_timestamp_ms() -> i64 {
    let now = Utc::now().timestamp_millis();
    let mut last = LAST_TIMESTAMP_MS.load(Ordering::Relaxed);
    loop {
        let next = now.max(last + 1);
        match LAST_TIMESTAMP_MS.compare_exchange_weak(last, next, Ordering::Relaxed, Ordering::Relaxed) {
            Ok(_) => return next,
            Err(current) => last = current,
        }
    }
}

/// `<kind>_<unixMillis>[_<w>x<h>].<ext>`
pub fn derivative_filename(kind: &str, timestamp_ms: i64, size: Option<(u32, u32)>, ext: &str) -> String {
    match size {
        Some((width, height)) => format!("{kind}_{timestamp_ms}_{width}x{height}.{ext}"),
        None => format!("{kind}_{timestamp_ms}.{ext}"),
    }
}
