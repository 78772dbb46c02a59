pub mod batch;
pub mod config;
pub mod content;
pub mod error;
pub mod extract;
pub mod fetcher;
pub mod gemini;
pub mod image_processing;
pub mod mcp_server;
pub mod pipeline;
pub mod retry;
pub mod routes;
pub mod smart_thumbnail;
pub mod storage;
pub mod tools;
pub mod url_validation;
