//! Content records owned by the CMS. The pipeline only reads a handful of
//! fields and writes the thumbnail columns.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{FromRow, Row};
use tokio::sync::RwLock;

use crate::error::PipelineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentStatus {
    Draft,
    Published,
    Archived,
}

impl ContentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ContentStatus::Draft => "draft",
            ContentStatus::Published => "published",
            ContentStatus::Archived => "archived",
        }
    }

    fn parse(raw: &str) -> Self {
        match raw {
            "published" => ContentStatus::Published,
            "archived" => ContentStatus::Archived,
            _ => ContentStatus::Draft,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentRecord {
    pub id: String,
    pub status: ContentStatus,
    pub title: Option<String>,
    pub excerpt: Option<String>,
    pub image_url: Option<String>,
    pub thumbnail_url: Option<String>,
    pub is_ai_generated_thumbnail: bool,
    pub ai_thumbnail_model: Option<String>,
    pub ai_thumbnail_prompt: Option<String>,
}

impl ContentRecord {
    /// Published, has a source image, has no thumbnail yet.
    pub fn in_backlog(&self) -> bool {
        self.status == ContentStatus::Published && self.image_url.is_some() && self.thumbnail_url.is_none()
    }
}

/// Thumbnail columns written after a successful run. Applying the same update
/// twice leaves the record unchanged.
#[derive(Debug, Clone, PartialEq)]
pub struct ThumbnailUpdate {
    pub thumbnail_url: String,
    pub is_ai_generated: bool,
    pub ai_model: Option<String>,
    pub ai_prompt: Option<String>,
}

#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<ContentRecord>, PipelineError>;

    async fn update_thumbnail(&self, id: &str, update: &ThumbnailUpdate) -> Result<(), PipelineError>;

    async fn list_backlog(&self, limit: usize) -> Result<Vec<ContentRecord>, PipelineError>;

    async fn count_backlog(&self) -> Result<u64, PipelineError>;
}

#[derive(Debug, Default)]
pub struct InMemoryContentStore {
    records: RwLock<BTreeMap<String, ContentRecord>>,
}

impl InMemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, record: ContentRecord) {
        self.records.write().await.insert(record.id.clone(), record);
    }
}

#[async_trait]
impl ContentStore for InMemoryContentStore {
    async fn get(&self, id: &str) -> Result<Option<ContentRecord>, PipelineError> {
        Ok(self.records.read().await.get(id).cloned())
    }

    async fn update_thumbnail(&self, id: &str, update: &ThumbnailUpdate) -> Result<(), PipelineError> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(id)
            .ok_or_else(|| PipelineError::NotFound(id.to_string()))?;
        record.thumbnail_url = Some(update.thumbnail_url.clone());
        record.is_ai_generated_thumbnail = update.is_ai_generated;
        record.ai_thumbnail_model = update.ai_model.clone();
        record.ai_thumbnail_prompt = update.ai_prompt.clone();
        Ok(())
    }

    async fn list_backlog(&self, limit: usize) -> Result<Vec<ContentRecord>, PipelineError> {
        Ok(self
            .records
            .read()
            .await
            .values()
            .filter(|record| record.in_backlog())
            .take(limit)
            .cloned()
            .collect())
    }

    async fn count_backlog(&self) -> Result<u64, PipelineError> {
        Ok(self.records.read().await.values().filter(|record| record.in_backlog()).count() as u64)
    }
}

const BACKLOG_PREDICATE: &str = "status = 'published' AND image_url IS NOT NULL AND thumbnail_url IS NULL";

#[derive(Debug, FromRow)]
struct ContentRow {
    id: String,
    status: String,
    title: Option<String>,
    excerpt: Option<String>,
    image_url: Option<String>,
    thumbnail_url: Option<String>,
    is_ai_generated_thumbnail: bool,
    ai_thumbnail_model: Option<String>,
    ai_thumbnail_prompt: Option<String>,
}

impl From<ContentRow> for ContentRecord {
    fn from(row: ContentRow) -> Self {
        ContentRecord {
            id: row.id,
            status: ContentStatus::parse(&row.status),
            title: row.title,
            excerpt: row.excerpt,
            image_url: row.image_url,
            thumbnail_url: row.thumbnail_url,
            is_ai_generated_thumbnail: row.is_ai_generated_thumbnail,
            ai_thumbnail_model: row.ai_thumbnail_model,
            ai_thumbnail_prompt: row.ai_thumbnail_prompt,
        }
    }
}

/// `content` table in the CMS database.
pub struct PgContentStore {
    pool: PgPool,
}

impl PgContentStore {
    pub async fn connect(database_url: &str) -> Result<Self, PipelineError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .map_err(|e| PipelineError::Record(format!("failed to connect to content DB: {e}")))?;
        Ok(Self { pool })
    }
}

fn db_error(err: sqlx::Error) -> PipelineError {
    PipelineError::Record(format!("DB query failed: {err}"))
}

#[async_trait]
impl ContentStore for PgContentStore {
    async fn get(&self, id: &str) -> Result<Option<ContentRecord>, PipelineError> {
        let row = sqlx::query_as::<_, ContentRow>(
            r#"
            SELECT id, status, title, excerpt, image_url, thumbnail_url,
                   is_ai_generated_thumbnail, ai_thumbnail_model, ai_thumbnail_prompt
            FROM content
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(row.map(ContentRecord::from))
    }

    async fn update_thumbnail(&self, id: &str, update: &ThumbnailUpdate) -> Result<(), PipelineError> {
        let result = sqlx::query(
            r#"
            UPDATE content
            SET thumbnail_url = $2,
                is_ai_generated_thumbnail = $3,
                ai_thumbnail_model = $4,
                ai_thumbnail_prompt = $5,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(&update.thumbnail_url)
        .bind(update.is_ai_generated)
        .bind(update.ai_model.as_deref())
        .bind(update.ai_prompt.as_deref())
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        if result.rows_affected() == 0 {
            return Err(PipelineError::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn list_backlog(&self, limit: usize) -> Result<Vec<ContentRecord>, PipelineError> {
        let sql = format!(
            "SELECT id, status, title, excerpt, image_url, thumbnail_url, \
             is_ai_generated_thumbnail, ai_thumbnail_model, ai_thumbnail_prompt \
             FROM content WHERE {BACKLOG_PREDICATE} LIMIT $1"
        );
        let rows = sqlx::query_as::<_, ContentRow>(&sql)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(rows.into_iter().map(ContentRecord::from).collect())
    }

    async fn count_backlog(&self) -> Result<u64, PipelineError> {
        let sql = format!("SELECT COUNT(*) AS remaining FROM content WHERE {BACKLOG_PREDICATE}");
        let row = sqlx::query(&sql).fetch_one(&self.pool).await.map_err(db_error)?;
        let remaining: i64 = row.try_get("remaining").map_err(db_error)?;
        Ok(remaining.max(0) as u64)
    }
}
