use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{State, rejection::JsonRejection},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::batch::BatchJob;
use crate::error::{PipelineError, json_error};
use crate::pipeline::{ResponsiveThumbnails, ThumbnailMethod, ThumbnailPipeline, ThumbnailRequest};

pub const ROLE_HEADER: &str = "x-user-role";
pub const ELEVATED_ROLE: &str = "admin";

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<ThumbnailPipeline>,
    pub batch: BatchJob,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/thumbnails/generate", post(generate_thumbnail))
        .route("/thumbnails/generate-responsive", post(generate_responsive))
        .route("/thumbnails/batch-generate", post(batch_generate))
        .with_state(state)
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateBody {
    pub content_id: Option<String>,
    pub image_url: Option<String>,
    pub method: Option<String>,
    pub style: Option<String>,
    pub title: Option<String>,
    pub excerpt: Option<String>,
    pub aspect_ratio: Option<String>,
    pub image_size: Option<String>,
}

impl GenerateBody {
    /// Checks the body shape. Nothing here touches the network.
    pub fn into_request(self) -> Result<ThumbnailRequest, PipelineError> {
        let image_url = self
            .image_url
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| PipelineError::validation("imageUrl is required"))?;
        let method: ThumbnailMethod = self
            .method
            .as_deref()
            .ok_or_else(|| PipelineError::validation("method is required"))?
            .parse()?;
        let content_id = self.content_id.filter(|id| !id.trim().is_empty());
        if method == ThumbnailMethod::Crop && content_id.is_none() {
            return Err(PipelineError::validation("contentId is required for the crop method"));
        }
        Ok(ThumbnailRequest {
            image_url,
            content_id,
            method,
            style: parse_or_default(self.style.as_deref())?,
            aspect_ratio: parse_or_default(self.aspect_ratio.as_deref())?,
            image_size: parse_or_default(self.image_size.as_deref())?,
            title: self.title,
            excerpt: self.excerpt,
        })
    }
}

fn parse_or_default<T>(raw: Option<&str>) -> Result<T, PipelineError>
where
    T: std::str::FromStr<Err = PipelineError> + Default,
{
    match raw {
        Some(value) => value.parse(),
        None => Ok(T::default()),
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    success: bool,
    thumbnail_url: String,
    method: ThumbnailMethod,
}

pub async fn generate_thumbnail(
    State(state): State<AppState>,
    body: Result<Json<GenerateBody>, JsonRejection>,
) -> Response {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => return json_error(StatusCode::BAD_REQUEST, &rejection.body_text()),
    };
    let request = match body.into_request() {
        Ok(request) => request,
        Err(err) => return err.into_response(),
    };
    match state.pipeline.generate(&request).await {
        Ok(derivative) => Json(GenerateResponse {
            success: true,
            thumbnail_url: derivative.stored_url,
            method: request.method,
        })
        .into_response(),
        Err(err) => err.into_response(),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponsiveBody {
    pub content_id: Option<String>,
    pub image_url: Option<String>,
}

#[derive(Serialize)]
struct ResponsiveResponse {
    success: bool,
    thumbnails: ResponsiveThumbnails,
}

pub async fn generate_responsive(
    State(state): State<AppState>,
    body: Result<Json<ResponsiveBody>, JsonRejection>,
) -> Response {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => return json_error(StatusCode::BAD_REQUEST, &rejection.body_text()),
    };
    let Some(image_url) = body.image_url.filter(|url| !url.trim().is_empty()) else {
        return json_error(StatusCode::BAD_REQUEST, "imageUrl is required");
    };
    let content_id = body.content_id.filter(|id| !id.trim().is_empty());
    match state.pipeline.generate_responsive(&image_url, content_id.as_deref()).await {
        Ok(thumbnails) => Json(ResponsiveResponse {
            success: true,
            thumbnails,
        })
        .into_response(),
        Err(err) => err.into_response(),
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct BatchBody {
    pub limit: Option<usize>,
}

#[derive(Serialize)]
struct BatchResponse {
    success: bool,
    message: String,
}

pub async fn batch_generate(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let role = headers.get(ROLE_HEADER).and_then(|value| value.to_str().ok());
    if role != Some(ELEVATED_ROLE) {
        return json_error(StatusCode::FORBIDDEN, "admin role required");
    }

    let body: BatchBody = if body.iter().all(u8::is_ascii_whitespace) {
        BatchBody::default()
    } else {
        match serde_json::from_slice(&body) {
            Ok(body) => body,
            Err(err) => return json_error(StatusCode::BAD_REQUEST, &format!("invalid batch body: {err}")),
        }
    };
    let limit = BatchJob::effective_limit(body.limit);

    let job = state.batch.clone();
    tokio::spawn(async move {
        match job.run_batch(limit).await {
            Ok(report) => info!(?report, "background thumbnail batch complete"),
            Err(err) => error!(error = %err, "background thumbnail batch failed"),
        }
    });

    Json(BatchResponse {
        success: true,
        message: format!("thumbnail batch started for up to {limit} items"),
    })
    .into_response()
}
