use rmcp::{ErrorData as McpError, handler::server::wrapper::Parameters, model::CallToolResult, schemars::JsonSchema};
use serde::Deserialize;

use crate::pipeline::{DerivativeImage, ThumbnailPipeline};
use crate::routes::GenerateBody;
use crate::tools::json_result;

#[derive(Debug, Deserialize, JsonSchema)]
pub struct GenerateThumbnailRequest {
    #[schemars(description = "Source image URL; the host must be on the trusted list")]
    pub image_url: String,
    #[schemars(description = "\"crop\" (center crop, 640px long edge, e.g. 640x360 at 16:9) or \"ai-smart\" (regenerated by the image model)")]
    pub method: String,
    #[schemars(description = "Content record to update. Required for crop; omit for an ai-smart preview")]
    pub content_id: Option<String>,
    #[schemars(description = "professional, vibrant, minimal, news or modern. Default professional")]
    pub style: Option<String>,
    #[schemars(description = "Article title used as prompt context (ai-smart only)")]
    pub title: Option<String>,
    #[schemars(description = "Article excerpt used as prompt context (ai-smart only)")]
    pub excerpt: Option<String>,
    #[schemars(description = "16:9, 1:1, 4:3, 3:4, 9:16, 3:2 or 2:3. Default 16:9")]
    pub aspect_ratio: Option<String>,
    #[schemars(description = "1K, 2K or 4K. Default 2K")]
    pub image_size: Option<String>,
}

pub async fn generate_thumbnail(
    pipeline: &ThumbnailPipeline,
    Parameters(request): Parameters<GenerateThumbnailRequest>,
) -> Result<CallToolResult, McpError> {
    let request = GenerateBody {
        content_id: request.content_id,
        image_url: Some(request.image_url),
        method: Some(request.method),
        style: request.style,
        title: request.title,
        excerpt: request.excerpt,
        aspect_ratio: request.aspect_ratio,
        image_size: request.image_size,
    }
    .into_request()?;
    let derivative: DerivativeImage = pipeline.generate(&request).await?;
    json_result(&derivative)
}
