use std::sync::Arc;

use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{CallToolResult, ServerCapabilities, ServerInfo},
    tool, tool_handler, tool_router,
};

use crate::batch::BatchJob;
use crate::pipeline::ThumbnailPipeline;
use crate::tools::{GenerateResponsiveRequest, GenerateThumbnailRequest, RunBatchRequest};

#[derive(Clone)]
pub struct ThumbnailServer {
    tool_router: ToolRouter<Self>,
    pipeline: Arc<ThumbnailPipeline>,
    batch: BatchJob,
}

impl ThumbnailServer {
    pub fn new(pipeline: Arc<ThumbnailPipeline>, batch: BatchJob) -> Self {
        Self {
            tool_router: Self::tool_router(),
            pipeline,
            batch,
        }
    }
}

#[tool_router]
impl ThumbnailServer {
    #[tool(
        description = "Generate an article thumbnail from an image URL. method=crop makes a center crop in the requested aspect ratio (640x360 by default); method=ai-smart redraws the image with the generative model and can take a minute"
    )]
    async fn generate_thumbnail(
        &self,
        Parameters(request): Parameters<GenerateThumbnailRequest>,
    ) -> Result<CallToolResult, McpError> {
        crate::tools::generate_thumbnail(&self.pipeline, Parameters(request)).await
    }

    #[tool(description = "Generate small (320x180), medium (640x360) and large (1280x720) crops of an image URL")]
    async fn generate_responsive_thumbnails(
        &self,
        Parameters(request): Parameters<GenerateResponsiveRequest>,
    ) -> Result<CallToolResult, McpError> {
        crate::tools::generate_responsive_thumbnails(&self.pipeline, Parameters(request)).await
    }

    #[tool(description = "Create crop thumbnails for published content that has an image but no thumbnail yet")]
    async fn run_thumbnail_batch(
        &self,
        Parameters(request): Parameters<RunBatchRequest>,
    ) -> Result<CallToolResult, McpError> {
        crate::tools::run_thumbnail_batch(&self.batch, Parameters(request)).await
    }
}

#[tool_handler]
impl ServerHandler for ThumbnailServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}
