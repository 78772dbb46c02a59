use rmcp::{ErrorData as McpError, handler::server::wrapper::Parameters, model::CallToolResult, schemars::JsonSchema};
use serde::Deserialize;

use crate::batch::BatchJob;
use crate::tools::json_result;

#[derive(Debug, Deserialize, JsonSchema)]
pub struct RunBatchRequest {
    #[schemars(description = "Maximum number of backlog records to process (1-100). Default 10")]
    pub limit: Option<usize>,
}

/// Unlike the HTTP endpoint this waits for the batch and returns its report.
pub async fn run_thumbnail_batch(
    batch: &BatchJob,
    Parameters(request): Parameters<RunBatchRequest>,
) -> Result<CallToolResult, McpError> {
    let report = batch.run_batch(BatchJob::effective_limit(request.limit)).await?;
    json_result(&report)
}
