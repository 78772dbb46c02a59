//! Backlog catch-up: one bounded batch of crop thumbnails per invocation.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::content::ContentStore;
use crate::error::PipelineError;
use crate::pipeline::{ThumbnailPipeline, ThumbnailRequest};

pub const BATCH_CONCURRENCY: usize = 3;
pub const DEFAULT_BATCH_LIMIT: usize = 10;
pub const MAX_BATCH_LIMIT: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub selected: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub remaining: u64,
}

#[derive(Clone)]
pub struct BatchJob {
    pipeline: Arc<ThumbnailPipeline>,
    content: Arc<dyn ContentStore>,
    concurrency: usize,
}

impl BatchJob {
    pub fn new(pipeline: Arc<ThumbnailPipeline>) -> Self {
        let content = pipeline.content_store().clone();
        Self {
            pipeline,
            content,
            concurrency: BATCH_CONCURRENCY,
        }
    }

    /// Clamps a caller-supplied limit into `1..=MAX_BATCH_LIMIT`.
    pub fn effective_limit(requested: Option<usize>) -> usize {
        requested.unwrap_or(DEFAULT_BATCH_LIMIT).clamp(1, MAX_BATCH_LIMIT)
    }

    pub async fn run_batch(&self, limit: usize) -> Result<BatchReport, PipelineError> {
        let records = self.content.list_backlog(limit).await?;
        let selected = records.len();
        info!(selected, limit, "thumbnail batch started");

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();
        for record in records {
            let Some(image_url) = record.image_url.clone() else {
                continue;
            };
            let pipeline = self.pipeline.clone();
            let semaphore = semaphore.clone();
            tasks.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|err| PipelineError::Record(format!("batch limiter closed: {err}")))?;
                pipeline
                    .generate(&ThumbnailRequest::crop(image_url, record.id.clone()))
                    .await
                    .map(|_| ())
                    .map_err(|err| {
                        warn!(content_id = %record.id, error = %err, "batch item failed");
                        err
                    })
            });
        }

        let mut succeeded = 0;
        let mut failed = 0;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(())) => succeeded += 1,
                Ok(Err(_)) => failed += 1,
                Err(err) => {
                    warn!(error = %err, "batch item task aborted");
                    failed += 1;
                }
            }
        }

        let remaining = self.content.count_backlog().await?;
        info!(selected, succeeded, failed, remaining, "thumbnail batch finished");
        Ok(BatchReport {
            selected,
            succeeded,
            failed,
            remaining,
        })
    }
}
