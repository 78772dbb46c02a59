use rmcp::{ErrorData as McpError, handler::server::wrapper::Parameters, model::CallToolResult, schemars::JsonSchema};
use serde::Deserialize;

use crate::error::PipelineError;
use crate::pipeline::ThumbnailPipeline;
use crate::tools::json_result;

#[derive(Debug, Deserialize, JsonSchema)]
pub struct GenerateResponsiveRequest {
    #[schemars(description = "Source image URL; the host must be on the trusted list")]
    pub image_url: String,
    #[schemars(description = "Content record whose thumbnail is set to the medium size")]
    pub content_id: Option<String>,
}

pub async fn generate_responsive_thumbnails(
    pipeline: &ThumbnailPipeline,
    Parameters(request): Parameters<GenerateResponsiveRequest>,
) -> Result<CallToolResult, McpError> {
    if request.image_url.trim().is_empty() {
        return Err(PipelineError::validation("imageUrl is required").into());
    }
    let content_id = request.content_id.filter(|id| !id.trim().is_empty());
    let thumbnails = pipeline
        .generate_responsive(&request.image_url, content_id.as_deref())
        .await?;
    json_result(&thumbnails)
}
