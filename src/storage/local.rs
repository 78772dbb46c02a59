use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::fs;
use tracing::info;

use super::ImageStore;
use crate::error::StorageError;

/// URL path the binary serves `base_dir` under.
pub const UPLOADS_ROUTE: &str = "/uploads";

#[derive(Clone, Debug)]
pub struct LocalFileStorage {
    base_dir: PathBuf,
    base_url: Option<String>,
}

impl LocalFileStorage {
    pub fn new(base_dir: PathBuf, base_url: Option<String>) -> Self {
        Self { base_dir, base_url }
    }

    pub async fn put(&self, key: &str, data: &[u8]) -> Result<(), StorageError> {
        let path = self.resolve_path(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(path, data).await?;
        Ok(())
    }

    /// Root-relative unless a public base URL was configured.
    pub fn get_public_url(&self, key: &str) -> String {
        let key = key.trim_start_matches('/');
        match self.base_url.as_deref() {
            Some(base) => format!("{}{UPLOADS_ROUTE}/{key}", base.trim_end_matches('/')),
            None => format!("{UPLOADS_ROUTE}/{key}"),
        }
    }

    pub fn resolve_path(&self, key: &str) -> PathBuf {
        let normalized = key.trim_start_matches('/');
        self.base_dir.join(Path::new(normalized))
    }
}

#[async_trait]
impl ImageStore for LocalFileStorage {
    async fn store(
        &self,
        prefix: &str,
        filename: &str,
        bytes: Bytes,
        _content_type: &str,
    ) -> Result<String, StorageError> {
        let key = format!("{prefix}/{filename}");
        self.put(&key, &bytes).await?;
        info!(key = %key, size = bytes.len(), "thumbnail written to uploads directory");
        Ok(self.get_public_url(&key))
    }

    fn backend_name(&self) -> &'static str {
        "filesystem"
    }
}
