pub mod generate_responsive;
pub mod generate_thumbnail;
pub mod run_batch;

use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use serde::Serialize;

pub use generate_responsive::{GenerateResponsiveRequest, generate_responsive_thumbnails};
pub use generate_thumbnail::{GenerateThumbnailRequest, generate_thumbnail};
pub use run_batch::{RunBatchRequest, run_thumbnail_batch};

/// Tool results are returned as a single JSON text block.
pub(crate) fn json_result<T: Serialize>(value: &T) -> Result<CallToolResult, McpError> {
    let json = serde_json::to_string(value).map_err(|err| {
        McpError::internal_error(
            "serialize tool response failed",
            Some(serde_json::Value::String(err.to_string())),
        )
    })?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}
