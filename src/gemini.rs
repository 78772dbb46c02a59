use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use base64::Engine;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use crate::config::GeminiConfig;

const DESCRIBE_PROMPT: &str = concat!(
    "Describe this image for an illustrator who has to redraw it as an article thumbnail. ",
    "Cover the main subject, the composition, the dominant colors, the mood, and any details ",
    "that must be preserved. Answer in plain text only, in at most 120 words."
);

/// Per-request ceiling for model calls. Image generation at 4K is slow.
pub const MODEL_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

async fn assert_ok_response(response: reqwest::Response) -> Result<reqwest::Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    Err(anyhow!("Gemini request failed: {status} {text}"))
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    candidates: Option<Vec<Candidate>>,
    error: Option<GeminiError>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    parts: Option<Vec<TextPart>>,
}

#[derive(Debug, Deserialize)]
struct TextPart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiError {
    message: Option<String>,
}

/// Handle to the generative language API. Built once at startup and shared.
#[derive(Clone, Debug)]
pub struct GeminiClient {
    http: Client,
    config: GeminiConfig,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> Result<Self> {
        Self::with_timeout(config, MODEL_REQUEST_TIMEOUT)
    }

    pub fn with_timeout(config: GeminiConfig, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build Gemini HTTP client")?;
        Ok(Self { http, config })
    }

    pub fn is_configured(&self) -> bool {
        self.config.api_key.is_some()
    }

    pub fn image_model(&self) -> &str {
        &self.config.image_model
    }

    /// Plain-text visual description of the supplied image.
    pub async fn describe_image(&self, image: &[u8], mime_type: &str) -> Result<String> {
        let body = json!({
            "contents": [{
                "role": "user",
                "parts": [
                    {
                        "inlineData": {
                            "mimeType": mime_type,
                            "data": base64::engine::general_purpose::STANDARD.encode(image),
                        }
                    },
                    {"text": DESCRIBE_PROMPT}
                ]
            }]
        });
        let response = self.post_generate_content(&self.config.vision_model, &body).await?;
        let payload: GenerateContentResponse = response.json().await?;
        if let Some(error) = payload.error.and_then(|err| err.message) {
            return Err(anyhow!("Gemini returned an error: {error}"));
        }
        let text = payload
            .candidates
            .and_then(|candidates| candidates.into_iter().next())
            .and_then(|candidate| candidate.content)
            .and_then(|content| content.parts)
            .map(|parts| {
                parts
                    .into_iter()
                    .filter_map(|part| part.text)
                    .collect::<Vec<_>>()
                    .join("\n")
            })
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
            .ok_or_else(|| anyhow!("Gemini returned no image description"))?;
        Ok(text)
    }

    /// Raw response of an image generation call. Its shape is not stable, so
    /// it is handed back untyped for the extractor chain.
    pub async fn generate_image(&self, prompt: &str, aspect_ratio: &str, image_size: &str) -> Result<Value> {
        let body = json!({
            "contents": [{
                "role": "user",
                "parts": [{"text": prompt}]
            }],
            "generationConfig": {
                "responseModalities": ["TEXT", "IMAGE"],
                "imageConfig": {
                    "aspectRatio": aspect_ratio,
                    "imageSize": image_size,
                }
            }
        });
        let response = self.post_generate_content(&self.config.image_model, &body).await?;
        let payload: Value = response.json().await?;
        if let Some(message) = payload.pointer("/error/message").and_then(Value::as_str) {
            return Err(anyhow!("Gemini returned an error: {message}"));
        }
        Ok(payload)
    }

    async fn post_generate_content(&self, model: &str, body: &Value) -> Result<reqwest::Response> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or_else(|| anyhow!("GEMINI_API_KEY is not configured"))?;
        let endpoint = format!(
            "{}/v1beta/models/{model}:generateContent",
            self.config.base_url.trim_end_matches('/')
        );
        debug!(endpoint = %endpoint, "calling Gemini");
        let response = self
            .http
            .post(&endpoint)
            .header("x-goog-api-key", api_key)
            .json(body)
            .send()
            .await?;
        assert_ok_response(response).await
    }
}
