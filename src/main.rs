use std::sync::Arc;

use anyhow::{Context, Result};
use rmcp::transport::streamable_http_server::{
    StreamableHttpService, session::local::LocalSessionManager,
};
use tower_http::services::ServeDir;
use tracing::info;
use tracing_subscriber::EnvFilter;

use thumbnail_pipeline::{
    batch::BatchJob,
    config::AppConfig,
    content::{ContentStore, InMemoryContentStore, PgContentStore},
    fetcher::ImageFetcher,
    gemini::GeminiClient,
    mcp_server::ThumbnailServer,
    pipeline::ThumbnailPipeline,
    routes::{self, AppState},
    smart_thumbnail::SmartThumbnailGenerator,
    storage::{self, local::UPLOADS_ROUTE},
    url_validation::UrlValidator,
};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = AppConfig::from_env();
    let bind_address = format!("0.0.0.0:{}", config.port);
    let mcp_path = match config.secret_key.as_deref() {
        Some(value) => format!("/{value}/mcp"),
        None => "/mcp".to_string(),
    };

    let storage = storage::build_store(&config.storage)
        .await
        .context("failed to initialise thumbnail storage")?;
    let content: Arc<dyn ContentStore> = match config.database_url.as_deref() {
        Some(url) => Arc::new(PgContentStore::connect(url).await?),
        None => {
            info!("DATABASE_URL not set, using in-memory content store");
            Arc::new(InMemoryContentStore::new())
        }
    };

    let gemini = Arc::new(GeminiClient::new(config.gemini.clone())?);
    if !gemini.is_configured() {
        info!("GEMINI_API_KEY not set, ai-smart thumbnails are disabled");
    }
    let fetcher = ImageFetcher::new()?;
    let smart = SmartThumbnailGenerator::new(gemini, fetcher.clone(), storage.clone());
    let pipeline = Arc::new(ThumbnailPipeline::new(
        UrlValidator::new(config.trusted_domains.clone()),
        fetcher,
        storage,
        content,
        smart,
    ));
    let batch = BatchJob::new(pipeline.clone());

    let mcp_pipeline = pipeline.clone();
    let mcp_batch = batch.clone();
    let service = StreamableHttpService::new(
        move || Ok(ThumbnailServer::new(mcp_pipeline.clone(), mcp_batch.clone())),
        LocalSessionManager::default().into(),
        Default::default(),
    );

    let router = routes::router(AppState { pipeline, batch })
        .nest_service(&mcp_path, service)
        .nest_service(UPLOADS_ROUTE, ServeDir::new(&config.storage.uploads_dir));
    let tcp_listener = tokio::net::TcpListener::bind(&bind_address).await?;

    info!(address = %bind_address, mcp = %mcp_path, "thumbnail service started");

    axum::serve(tcp_listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await?;
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|format| format.eq_ignore_ascii_case("json"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}
