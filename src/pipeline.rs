//! Per-request orchestration: validate, fetch, derive, store, record.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use serde::Serialize;
use tracing::{debug, info, warn};
use url::Url;

use crate::content::{ContentStore, ThumbnailUpdate};
use crate::error::PipelineError;
use crate::fetcher::ImageFetcher;
use crate::image_processing::{self, DEFAULT_QUALITY, OutputFormat, RESPONSIVE_SIZES, ResponsiveSize};
use crate::smart_thumbnail::{
    AspectRatio, ImageSize, SmartThumbnailGenerator, SmartThumbnailRequest, ThumbnailStyle,
    resolve_prompt_context,
};
use crate::storage::{THUMBNAIL_PREFIX, ImageStore, derivative_filename, unique_timestamp_ms};
use crate::url_validation::UrlValidator;

/// Long edge of a crop thumbnail. At 16:9 this gives 640x360.
pub const CROP_LONG_EDGE: u32 = 640;

/// Largest box with the exact requested ratio whose long edge fits
/// `CROP_LONG_EDGE`.
pub fn crop_geometry(aspect_ratio: AspectRatio) -> (u32, u32) {
    let (ratio_w, ratio_h) = aspect_ratio.ratio();
    let unit = CROP_LONG_EDGE / ratio_w.max(ratio_h);
    (ratio_w * unit, ratio_h * unit)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ThumbnailMethod {
    #[serde(rename = "crop")]
    Crop,
    #[serde(rename = "ai-smart")]
    AiSmart,
}

impl ThumbnailMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            ThumbnailMethod::Crop => "crop",
            ThumbnailMethod::AiSmart => "ai-smart",
        }
    }
}

impl fmt::Display for ThumbnailMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ThumbnailMethod {
    type Err = PipelineError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim() {
            "crop" => Ok(ThumbnailMethod::Crop),
            "ai-smart" => Ok(ThumbnailMethod::AiSmart),
            other => Err(PipelineError::validation(format!(
                "invalid method {other:?}; expected crop or ai-smart"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Received,
    Validating,
    Fetching,
    Transforming,
    Generating,
    Storing,
    Recording,
    Done,
    Errored,
}

/// One request's walk through the stage machine. Only used for logging.
struct StageTrace {
    request_id: i64,
    stage: PipelineStage,
    started: Instant,
}

impl StageTrace {
    fn start(method: ThumbnailMethod) -> Self {
        let request_id = unique_timestamp_ms();
        debug!(request_id, %method, "thumbnail request received");
        Self {
            request_id,
            stage: PipelineStage::Received,
            started: Instant::now(),
        }
    }

    fn enter(&mut self, stage: PipelineStage) {
        debug!(request_id = self.request_id, from = ?self.stage, to = ?stage, "pipeline stage");
        self.stage = stage;
    }

    fn fail(&mut self, err: &PipelineError) {
        warn!(
            request_id = self.request_id,
            stage = ?self.stage,
            elapsed_ms = self.started.elapsed().as_millis() as u64,
            error = %err,
            "thumbnail request failed"
        );
        self.stage = PipelineStage::Errored;
    }

    fn finish(&mut self, stored_url: &str) {
        self.stage = PipelineStage::Done;
        info!(
            request_id = self.request_id,
            elapsed_ms = self.started.elapsed().as_millis() as u64,
            url = %stored_url,
            "thumbnail stored"
        );
    }
}

#[derive(Debug, Clone)]
pub struct ThumbnailRequest {
    pub image_url: String,
    pub content_id: Option<String>,
    pub method: ThumbnailMethod,
    pub style: ThumbnailStyle,
    pub aspect_ratio: AspectRatio,
    pub image_size: ImageSize,
    pub title: Option<String>,
    pub excerpt: Option<String>,
}

impl ThumbnailRequest {
    pub fn crop(image_url: impl Into<String>, content_id: impl Into<String>) -> Self {
        Self {
            image_url: image_url.into(),
            content_id: Some(content_id.into()),
            method: ThumbnailMethod::Crop,
            style: ThumbnailStyle::default(),
            aspect_ratio: AspectRatio::default(),
            image_size: ImageSize::default(),
            title: None,
            excerpt: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "generatedBy", rename_all = "camelCase")]
pub enum Provenance {
    Crop,
    #[serde(rename_all = "camelCase")]
    Generative {
        model: String,
        prompt_used: String,
        generation_time_ms: u64,
        estimated_cost: f64,
    },
}

/// A derivative that has already been written to storage.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DerivativeImage {
    pub stored_url: String,
    pub width: u32,
    pub height: u32,
    pub format: OutputFormat,
    #[serde(flatten)]
    pub provenance: Provenance,
}

impl DerivativeImage {
    fn thumbnail_update(&self) -> ThumbnailUpdate {
        match &self.provenance {
            Provenance::Crop => ThumbnailUpdate {
                thumbnail_url: self.stored_url.clone(),
                is_ai_generated: false,
                ai_model: None,
                ai_prompt: None,
            },
            Provenance::Generative {
                model, prompt_used, ..
            } => ThumbnailUpdate {
                thumbnail_url: self.stored_url.clone(),
                is_ai_generated: true,
                ai_model: Some(model.clone()),
                ai_prompt: Some(prompt_used.clone()),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResponsiveThumbnails {
    pub small: String,
    pub medium: String,
    pub large: String,
}

pub struct ThumbnailPipeline {
    validator: UrlValidator,
    fetcher: ImageFetcher,
    storage: Arc<dyn ImageStore>,
    content: Arc<dyn ContentStore>,
    smart: SmartThumbnailGenerator,
}

impl ThumbnailPipeline {
    pub fn new(
        validator: UrlValidator,
        fetcher: ImageFetcher,
        storage: Arc<dyn ImageStore>,
        content: Arc<dyn ContentStore>,
        smart: SmartThumbnailGenerator,
    ) -> Self {
        Self {
            validator,
            fetcher,
            storage,
            content,
            smart,
        }
    }

    pub fn content_store(&self) -> &Arc<dyn ContentStore> {
        &self.content
    }

    pub async fn generate(&self, request: &ThumbnailRequest) -> Result<DerivativeImage, PipelineError> {
        let mut trace = StageTrace::start(request.method);
        match self.run(request, &mut trace).await {
            Ok(derivative) => {
                trace.finish(&derivative.stored_url);
                Ok(derivative)
            }
            Err(err) => {
                trace.fail(&err);
                Err(err)
            }
        }
    }

    async fn run(&self, request: &ThumbnailRequest, trace: &mut StageTrace) -> Result<DerivativeImage, PipelineError> {
        trace.enter(PipelineStage::Validating);
        if request.method == ThumbnailMethod::Crop && request.content_id.is_none() {
            return Err(PipelineError::validation("contentId is required for the crop method"));
        }
        let source_url = self.validator.validate_source_url(&request.image_url)?;

        let derivative = match request.method {
            ThumbnailMethod::Crop => self.crop(&source_url, request.aspect_ratio, trace).await?,
            ThumbnailMethod::AiSmart => self.regenerate(source_url, request, trace).await?,
        };

        if let Some(content_id) = request.content_id.as_deref() {
            trace.enter(PipelineStage::Recording);
            self.record(content_id, &derivative.thumbnail_update()).await;
        }
        Ok(derivative)
    }

    async fn crop(
        &self,
        source_url: &Url,
        aspect_ratio: AspectRatio,
        trace: &mut StageTrace,
    ) -> Result<DerivativeImage, PipelineError> {
        trace.enter(PipelineStage::Fetching);
        let source = self.fetcher.fetch(source_url).await?;

        trace.enter(PipelineStage::Transforming);
        let (width, height) = crop_geometry(aspect_ratio);
        let format = OutputFormat::Jpeg;
        let encoded = transform_blocking(source.bytes, width, height, format).await?;

        trace.enter(PipelineStage::Storing);
        let filename = derivative_filename("thumbnail", unique_timestamp_ms(), Some((width, height)), format.extension());
        let stored_url = self
            .storage
            .store(THUMBNAIL_PREFIX, &filename, Bytes::from(encoded), format.mime_type())
            .await?;

        Ok(DerivativeImage {
            stored_url,
            width,
            height,
            format,
            provenance: Provenance::Crop,
        })
    }

    async fn regenerate(
        &self,
        source_url: Url,
        request: &ThumbnailRequest,
        trace: &mut StageTrace,
    ) -> Result<DerivativeImage, PipelineError> {
        // The record is only read for context the caller left out. A missing
        // record surfaces later as a logged update failure.
        let needs_context = request.title.is_none() || request.excerpt.is_none();
        let record = match request.content_id.as_deref() {
            Some(content_id) if needs_context => {
                let record = self.content.get(content_id).await?;
                if record.is_none() {
                    warn!(content_id, "content record not found, generating without its context");
                }
                record
            }
            _ => None,
        };
        let (title, excerpt) = resolve_prompt_context(record.as_ref(), request.title.clone(), request.excerpt.clone());

        // Fetching and storing happen inside the strategy.
        trace.enter(PipelineStage::Generating);
        let generated = self
            .smart
            .generate(&SmartThumbnailRequest {
                source_url,
                title,
                excerpt,
                style: request.style,
                aspect_ratio: request.aspect_ratio,
                image_size: request.image_size,
            })
            .await?;

        Ok(DerivativeImage {
            stored_url: generated.stored_url,
            width: generated.width,
            height: generated.height,
            format: generated.format,
            provenance: Provenance::Generative {
                model: generated.model,
                prompt_used: generated.prompt_used,
                generation_time_ms: generated.generation_time_ms,
                estimated_cost: generated.estimated_cost,
            },
        })
    }

    /// Small, medium and large crops of one source. A size that cannot be
    /// produced falls back to the source URL; only validation and fetch
    /// failures abort the whole call.
    pub async fn generate_responsive(
        &self,
        image_url: &str,
        content_id: Option<&str>,
    ) -> Result<ResponsiveThumbnails, PipelineError> {
        let source_url = self.validator.validate_source_url(image_url)?;
        let source = self.fetcher.fetch(&source_url).await?;
        let timestamp = unique_timestamp_ms();

        let [small, medium, large] = RESPONSIVE_SIZES;
        let (small, medium, large) = tokio::join!(
            self.responsive_variant(source.bytes.clone(), small, timestamp),
            self.responsive_variant(source.bytes.clone(), medium, timestamp),
            self.responsive_variant(source.bytes.clone(), large, timestamp),
        );

        if let (Some(content_id), Some(medium_url)) = (content_id, medium.as_ref()) {
            let update = ThumbnailUpdate {
                thumbnail_url: medium_url.clone(),
                is_ai_generated: false,
                ai_model: None,
                ai_prompt: None,
            };
            self.record(content_id, &update).await;
        }

        let original = source_url.to_string();
        Ok(ResponsiveThumbnails {
            small: small.unwrap_or_else(|| original.clone()),
            medium: medium.unwrap_or_else(|| original.clone()),
            large: large.unwrap_or(original),
        })
    }

    async fn responsive_variant(
        &self,
        source: Bytes,
        (size, width, height): (ResponsiveSize, u32, u32),
        timestamp: i64,
    ) -> Option<String> {
        let format = OutputFormat::Jpeg;
        let result = async {
            let encoded = transform_blocking(source, width, height, format).await?;
            let filename = derivative_filename("thumbnail", timestamp, Some((width, height)), format.extension());
            let url = self
                .storage
                .store(THUMBNAIL_PREFIX, &filename, Bytes::from(encoded), format.mime_type())
                .await?;
            Ok::<_, PipelineError>(url)
        }
        .await;

        match result {
            Ok(url) => Some(url),
            Err(err) => {
                warn!(size = ?size, error = %err, "responsive size failed, using source image");
                None
            }
        }
    }

    /// The stored derivative stays authoritative, so a failed write is only
    /// logged. Re-running the same update is harmless.
    async fn record(&self, content_id: &str, update: &ThumbnailUpdate) {
        match self.content.update_thumbnail(content_id, update).await {
            Ok(()) => debug!(content_id, url = %update.thumbnail_url, "content record updated"),
            Err(err) => warn!(content_id, error = %err, "content record update failed"),
        }
    }
}

async fn transform_blocking(
    source: Bytes,
    width: u32,
    height: u32,
    format: OutputFormat,
) -> Result<Vec<u8>, PipelineError> {
    tokio::task::spawn_blocking(move || image_processing::transform(&source, width, height, DEFAULT_QUALITY, format))
        .await
        .map_err(|err| PipelineError::Transform(format!("transform task failed: {err}")))?
}
