//! Generative thumbnail strategy: describe the source image, compose a styled
//! prompt, have the image model redraw it, extract the bytes and store them.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use url::Url;

use crate::content::ContentRecord;
use crate::error::PipelineError;
use crate::extract::extract_image;
use crate::fetcher::ImageFetcher;
use crate::gemini::GeminiClient;
use crate::image_processing::{self, OutputFormat};
use crate::retry::{RetryPolicy, with_retry};
use crate::storage::{AI_THUMBNAIL_PREFIX, ImageStore, derivative_filename, unique_timestamp_ms};

pub const FALLBACK_DESCRIPTION: &str = "professional news image with clear composition and strong visual impact";
const RAW_RESPONSE_DUMP_LIMIT: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThumbnailStyle {
    #[default]
    Professional,
    Vibrant,
    Minimal,
    News,
    Modern,
}

impl ThumbnailStyle {
    pub fn as_str(self) -> &'static str {
        match self {
            ThumbnailStyle::Professional => "professional",
            ThumbnailStyle::Vibrant => "vibrant",
            ThumbnailStyle::Minimal => "minimal",
            ThumbnailStyle::News => "news",
            ThumbnailStyle::Modern => "modern",
        }
    }

    pub fn phrase(self) -> &'static str {
        match self {
            ThumbnailStyle::Professional => {
                "clean, polished editorial photography with balanced lighting and a trustworthy tone"
            }
            ThumbnailStyle::Vibrant => "bold, saturated colors with high energy and dynamic contrast",
            ThumbnailStyle::Minimal => {
                "minimalist composition with generous negative space and a restrained color palette"
            }
            ThumbnailStyle::News => {
                "photojournalistic news style with documentary realism and sharp focus on the key subject"
            }
            ThumbnailStyle::Modern => "contemporary digital illustration with sleek gradients and a modern aesthetic",
        }
    }
}

impl FromStr for ThumbnailStyle {
    type Err = PipelineError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "professional" => Ok(ThumbnailStyle::Professional),
            "vibrant" => Ok(ThumbnailStyle::Vibrant),
            "minimal" => Ok(ThumbnailStyle::Minimal),
            "news" => Ok(ThumbnailStyle::News),
            "modern" => Ok(ThumbnailStyle::Modern),
            other => Err(PipelineError::validation(format!(
                "invalid style {other:?}; expected professional, vibrant, minimal, news or modern"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AspectRatio {
    #[default]
    Widescreen,
    Square,
    Standard,
    Portrait,
    Vertical,
    Classic,
    ClassicPortrait,
}

impl AspectRatio {
    pub fn as_str(self) -> &'static str {
        match self {
            AspectRatio::Widescreen => "16:9",
            AspectRatio::Square => "1:1",
            AspectRatio::Standard => "4:3",
            AspectRatio::Portrait => "3:4",
            AspectRatio::Vertical => "9:16",
            AspectRatio::Classic => "3:2",
            AspectRatio::ClassicPortrait => "2:3",
        }
    }

    pub fn ratio(self) -> (u32, u32) {
        match self {
            AspectRatio::Widescreen => (16, 9),
            AspectRatio::Square => (1, 1),
            AspectRatio::Standard => (4, 3),
            AspectRatio::Portrait => (3, 4),
            AspectRatio::Vertical => (9, 16),
            AspectRatio::Classic => (3, 2),
            AspectRatio::ClassicPortrait => (2, 3),
        }
    }
}

impl FromStr for AspectRatio {
    type Err = PipelineError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim() {
            "16:9" => Ok(AspectRatio::Widescreen),
            "1:1" => Ok(AspectRatio::Square),
            "4:3" => Ok(AspectRatio::Standard),
            "3:4" => Ok(AspectRatio::Portrait),
            "9:16" => Ok(AspectRatio::Vertical),
            "3:2" => Ok(AspectRatio::Classic),
            "2:3" => Ok(AspectRatio::ClassicPortrait),
            other => Err(PipelineError::validation(format!(
                "invalid aspectRatio {other:?}; expected one of 16:9, 1:1, 4:3, 3:4, 9:16, 3:2, 2:3"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImageSize {
    OneK,
    #[default]
    TwoK,
    FourK,
}

impl ImageSize {
    pub fn as_str(self) -> &'static str {
        match self {
            ImageSize::OneK => "1K",
            ImageSize::TwoK => "2K",
            ImageSize::FourK => "4K",
        }
    }

    /// Rough per-image price in USD. A planning figure, not billing data.
    pub fn estimated_cost_usd(self) -> f64 {
        match self {
            ImageSize::OneK => 0.039,
            ImageSize::TwoK => 0.134,
            ImageSize::FourK => 0.24,
        }
    }

    fn long_edge(self) -> u32 {
        match self {
            ImageSize::OneK => 1024,
            ImageSize::TwoK => 2048,
            ImageSize::FourK => 4096,
        }
    }
}

impl FromStr for ImageSize {
    type Err = PipelineError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "1K" => Ok(ImageSize::OneK),
            "2K" => Ok(ImageSize::TwoK),
            "4K" => Ok(ImageSize::FourK),
            other => Err(PipelineError::validation(format!(
                "invalid imageSize {other:?}; expected 1K, 2K or 4K"
            ))),
        }
    }
}

/// Geometry the model is asked for; used when the returned bytes have no readable header.
pub fn nominal_dimensions(aspect_ratio: AspectRatio, size: ImageSize) -> (u32, u32) {
    let (ratio_w, ratio_h) = aspect_ratio.ratio();
    let scale = size.long_edge() as f64 / ratio_w.max(ratio_h) as f64;
    (
        (ratio_w as f64 * scale).round() as u32,
        (ratio_h as f64 * scale).round() as u32,
    )
}

#[derive(Debug, Clone)]
pub struct SmartThumbnailRequest {
    pub source_url: Url,
    pub title: Option<String>,
    pub excerpt: Option<String>,
    pub style: ThumbnailStyle,
    pub aspect_ratio: AspectRatio,
    pub image_size: ImageSize,
}

#[derive(Debug, Clone)]
pub struct SmartThumbnail {
    pub stored_url: String,
    pub width: u32,
    pub height: u32,
    pub format: OutputFormat,
    pub model: String,
    pub prompt_used: String,
    pub generation_time_ms: u64,
    pub estimated_cost: f64,
}

/// Fills title/excerpt from the owning record only where the caller sent
/// nothing. An explicit empty string is kept.
pub fn resolve_prompt_context(
    record: Option<&ContentRecord>,
    title: Option<String>,
    excerpt: Option<String>,
) -> (Option<String>, Option<String>) {
    let title = title.or_else(|| record.and_then(|r| r.title.clone()));
    let excerpt = excerpt.or_else(|| record.and_then(|r| r.excerpt.clone()));
    (title, excerpt)
}

pub fn compose_prompt(
    description: &str,
    title: Option<&str>,
    excerpt: Option<&str>,
    style: ThumbnailStyle,
    aspect_ratio: AspectRatio,
) -> String {
    let mut prompt = format!(
        "Create a new article thumbnail based on this description of the original image:\n{description}\n\n"
    );

    let context: Vec<String> = [("Title", title), ("Summary", excerpt)]
        .into_iter()
        .filter_map(|(label, value)| {
            value
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(|value| format!("{label}: {value}"))
        })
        .collect();
    if !context.is_empty() {
        prompt.push_str("Article context:\n");
        prompt.push_str(&context.join("\n"));
        prompt.push_str("\n\n");
    }

    prompt.push_str(&format!("Visual style: {}.\n\n", style.phrase()));
    prompt.push_str(&format!(
        "Requirements:\n\
         - {} aspect ratio\n\
         - one strong focal point that reads at small sizes\n\
         - no embedded text, captions, logos or watermarks\n\
         - preserve the essence and subject of the original image\n\
         - composition suitable for a right-to-left reading context",
        aspect_ratio.as_str()
    ));
    prompt
}

pub struct SmartThumbnailGenerator {
    gemini: Arc<GeminiClient>,
    fetcher: ImageFetcher,
    storage: Arc<dyn ImageStore>,
    describe_policy: RetryPolicy,
    generate_policy: RetryPolicy,
}

impl SmartThumbnailGenerator {
    pub fn new(gemini: Arc<GeminiClient>, fetcher: ImageFetcher, storage: Arc<dyn ImageStore>) -> Self {
        Self {
            gemini,
            fetcher,
            storage,
            describe_policy: RetryPolicy::DESCRIBE,
            generate_policy: RetryPolicy::GENERATE,
        }
    }

    pub fn with_retry_policies(mut self, describe: RetryPolicy, generate: RetryPolicy) -> Self {
        self.describe_policy = describe;
        self.generate_policy = generate;
        self
    }

    pub async fn generate(&self, request: &SmartThumbnailRequest) -> Result<SmartThumbnail, PipelineError> {
        if !self.gemini.is_configured() {
            return Err(PipelineError::Generation("generative model not configured".into()));
        }
        let started = Instant::now();

        let description = self.describe(&request.source_url).await;
        let prompt = compose_prompt(
            &description,
            request.title.as_deref(),
            request.excerpt.as_deref(),
            request.style,
            request.aspect_ratio,
        );

        let response = with_retry("generate", self.generate_policy, || {
            self.gemini
                .generate_image(&prompt, request.aspect_ratio.as_str(), request.image_size.as_str())
        })
        .await
        .map_err(|err| PipelineError::Generation(err.to_string()))?;

        let extracted = match extract_image(&response) {
            Some(extracted) => extracted,
            None => {
                let raw = response.to_string();
                let dump: String = raw.chars().take(RAW_RESPONSE_DUMP_LIMIT).collect();
                warn!(response = %dump, "no image found in generation response");
                return Err(PipelineError::Generation(
                    "model response contained no image data".into(),
                ));
            }
        };
        info!(method = ?extracted.method, size = extracted.bytes.len(), "extracted generated image");

        let format = image_processing::detect_mime_type(&extracted.bytes)
            .and_then(OutputFormat::from_mime_type)
            .unwrap_or(OutputFormat::Jpeg);
        let (width, height) = image_processing::header_dimensions(&extracted.bytes)
            .unwrap_or_else(|| nominal_dimensions(request.aspect_ratio, request.image_size));

        let filename = derivative_filename("smart_thumbnail", unique_timestamp_ms(), None, "jpg");
        let stored_url = self
            .storage
            .store(AI_THUMBNAIL_PREFIX, &filename, Bytes::from(extracted.bytes), format.mime_type())
            .await?;

        Ok(SmartThumbnail {
            stored_url,
            width,
            height,
            format,
            model: self.gemini.image_model().to_string(),
            prompt_used: prompt,
            generation_time_ms: started.elapsed().as_millis() as u64,
            estimated_cost: request.image_size.estimated_cost_usd(),
        })
    }

    /// Never fails: any problem fetching or describing the source degrades to
    /// a generic description.
    async fn describe(&self, source_url: &Url) -> String {
        let source = match self.fetcher.fetch(source_url).await {
            Ok(source) => source,
            Err(err) => {
                warn!(url = %source_url, error = %err, "source fetch failed, using generic description");
                return FALLBACK_DESCRIPTION.to_string();
            }
        };
        let described = with_retry("describe", self.describe_policy, || {
            self.gemini.describe_image(&source.bytes, &source.mime_type)
        })
        .await;
        match described {
            Ok(description) => description,
            Err(err) => {
                warn!(url = %source_url, error = %err, "image description failed, using generic description");
                FALLBACK_DESCRIPTION.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::ContentStatus;

    fn record() -> ContentRecord {
        ContentRecord {
            id: "abc".into(),
            status: ContentStatus::Published,
            title: Some("Stored title".into()),
            excerpt: Some("Stored excerpt".into()),
            image_url: Some("https://storage.googleapis.com/x/photo.jpg".into()),
            thumbnail_url: None,
            is_ai_generated_thumbnail: false,
            ai_thumbnail_model: None,
            ai_thumbnail_prompt: None,
        }
    }

    #[test]
    fn missing_context_is_filled_from_record() {
        let record = record();
        let (title, excerpt) = resolve_prompt_context(Some(&record), None, Some("Caller excerpt".into()));
        assert_eq!(title.as_deref(), Some("Stored title"));
        assert_eq!(excerpt.as_deref(), Some("Caller excerpt"));
    }

    #[test]
    fn explicit_empty_string_is_not_overridden() {
        let record = record();
        let (title, _) = resolve_prompt_context(Some(&record), Some(String::new()), None);
        assert_eq!(title.as_deref(), Some(""));
    }

    #[test]
    fn prompt_carries_description_context_style_and_rules() {
        let prompt = compose_prompt(
            "a lighthouse at dusk",
            Some("Storm season"),
            None,
            ThumbnailStyle::News,
            AspectRatio::Widescreen,
        );
        assert!(prompt.contains("a lighthouse at dusk"));
        assert!(prompt.contains("Title: Storm season"));
        assert!(!prompt.contains("Summary:"));
        assert!(prompt.contains(ThumbnailStyle::News.phrase()));
        assert!(prompt.contains("16:9 aspect ratio"));
        assert!(prompt.contains("no embedded text"));
        assert!(prompt.contains("right-to-left"));
    }

    #[test]
    fn prompt_skips_context_block_when_empty() {
        let prompt = compose_prompt("x", Some(""), Some("  "), ThumbnailStyle::Minimal, AspectRatio::Square);
        assert!(!prompt.contains("Article context"));
    }

    #[test]
    fn style_parsing_rejects_unknown_values() {
        assert_eq!("Vibrant".parse::<ThumbnailStyle>().unwrap(), ThumbnailStyle::Vibrant);
        assert!(matches!(
            "grunge".parse::<ThumbnailStyle>(),
            Err(PipelineError::Validation(_))
        ));
    }

    #[test]
    fn nominal_dimensions_follow_ratio() {
        assert_eq!(nominal_dimensions(AspectRatio::Widescreen, ImageSize::TwoK), (2048, 1152));
        assert_eq!(nominal_dimensions(AspectRatio::Vertical, ImageSize::OneK), (576, 1024));
    }

    #[test]
    fn cost_lookup_is_by_size() {
        assert!(ImageSize::FourK.estimated_cost_usd() > ImageSize::TwoK.estimated_cost_usd());
        assert_eq!("4k".parse::<ImageSize>().unwrap(), ImageSize::FourK);
    }
}
