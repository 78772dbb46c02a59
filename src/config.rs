//! Process configuration, resolved once at startup and passed by reference
//! into every pipeline component.

use std::env;
use std::path::PathBuf;

use crate::url_validation::DEFAULT_TRUSTED_DOMAINS;

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_UPLOADS_DIR: &str = "uploads";
const DEFAULT_GCS_HOST: &str = "storage.googleapis.com";
const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const DEFAULT_VISION_MODEL: &str = "gemini-2.5-flash";
const DEFAULT_IMAGE_MODEL: &str = "gemini-3-pro-image-preview";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub port: u16,
    pub secret_key: Option<String>,
    pub storage: StorageConfig,
    pub trusted_domains: Vec<String>,
    pub gemini: GeminiConfig,
    pub database_url: Option<String>,
}

#[derive(Clone, Debug)]
pub struct StorageConfig {
    pub uploads_dir: PathBuf,
    pub public_base_url: Option<String>,
    pub gcs: Option<GcsConfig>,
}

#[derive(Clone, Debug)]
pub struct GcsConfig {
    pub bucket: String,
    pub project_id: Option<String>,
    pub credentials_path: PathBuf,
    pub host: String,
}

#[derive(Clone, Debug)]
pub struct GeminiConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub vision_model: String,
    pub image_model: String,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
            vision_model: DEFAULT_VISION_MODEL.to_string(),
            image_model: DEFAULT_IMAGE_MODEL.to_string(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let port = non_empty("PORT")
            .and_then(|value| value.parse::<u16>().ok())
            .unwrap_or(DEFAULT_PORT);

        let gcs = non_empty("GCS_BUCKET").map(|bucket| GcsConfig {
            bucket,
            project_id: non_empty("GCP_PROJECT_ID"),
            credentials_path: non_empty("GOOGLE_APPLICATION_CREDENTIALS")
                .map(PathBuf::from)
                .unwrap_or_else(default_credentials_path),
            host: non_empty("GCS_HOST").unwrap_or_else(|| DEFAULT_GCS_HOST.to_string()),
        });

        let storage = StorageConfig {
            uploads_dir: non_empty("UPLOADS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_UPLOADS_DIR)),
            public_base_url: non_empty("PUBLIC_BASE_URL")
                .map(|value| value.trim_end_matches('/').to_string()),
            gcs,
        };

        let trusted_domains = non_empty("TRUSTED_IMAGE_DOMAINS")
            .map(|raw| parse_domain_list(&raw))
            .filter(|domains| !domains.is_empty())
            .unwrap_or_else(|| {
                DEFAULT_TRUSTED_DOMAINS
                    .iter()
                    .map(|domain| domain.to_string())
                    .collect()
            });

        let defaults = GeminiConfig::default();
        let gemini = GeminiConfig {
            api_key: non_empty("GEMINI_API_KEY"),
            base_url: non_empty("GEMINI_API_BASE")
                .map(|value| value.trim_end_matches('/').to_string())
                .unwrap_or(defaults.base_url),
            vision_model: non_empty("GEMINI_VISION_MODEL").unwrap_or(defaults.vision_model),
            image_model: non_empty("GEMINI_IMAGE_MODEL").unwrap_or(defaults.image_model),
        };

        Self {
            port,
            secret_key: non_empty("SECRET_KEY"),
            storage,
            trusted_domains,
            gemini,
            database_url: non_empty("DATABASE_URL"),
        }
    }
}

fn non_empty(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn default_credentials_path() -> PathBuf {
    let mut base = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
    base.push("gcloud");
    base.push("application_default_credentials.json");
    base
}

pub fn parse_domain_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|domain| domain.trim().trim_start_matches('.').to_ascii_lowercase())
        .filter(|domain| !domain.is_empty())
        .collect()
}
