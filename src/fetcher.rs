use std::time::Duration;

use bytes::{Bytes, BytesMut};
use reqwest::{Client, header, redirect};
use tracing::debug;
use url::Url;

use crate::error::FetchError;

pub const FETCH_TIMEOUT: Duration = Duration::from_secs(10);
pub const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

/// Image payload that passed every fetch-time check.
#[derive(Debug, Clone)]
pub struct FetchedImage {
    pub bytes: Bytes,
    pub mime_type: String,
}

#[derive(Clone, Debug)]
pub struct ImageFetcher {
    client: Client,
    timeout: Duration,
    max_bytes: usize,
}

impl ImageFetcher {
    pub fn new() -> Result<Self, FetchError> {
        Self::with_limits(FETCH_TIMEOUT, MAX_IMAGE_BYTES)
    }

    pub fn with_limits(timeout: Duration, max_bytes: usize) -> Result<Self, FetchError> {
        // Redirect targets never went through the allow-list, so 3xx is
        // reported as a status failure instead of followed.
        let client = Client::builder()
            .timeout(timeout)
            .redirect(redirect::Policy::none())
            .build()
            .map_err(|err| FetchError::Request(err.to_string()))?;
        Ok(Self {
            client,
            timeout,
            max_bytes,
        })
    }

    /// Callers must have run the URL through `UrlValidator` first.
    pub async fn fetch(&self, url: &Url) -> Result<FetchedImage, FetchError> {
        let mut response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|err| self.request_error(err))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let mime_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.split(';').next().unwrap_or(value).trim().to_ascii_lowercase())
            .ok_or(FetchError::MissingContentType)?;
        if !mime_type.starts_with("image/") {
            return Err(FetchError::NotAnImage(mime_type));
        }

        if let Some(declared) = response.content_length() {
            if declared > self.max_bytes as u64 {
                return Err(FetchError::TooLarge {
                    limit: self.max_bytes,
                    actual: declared,
                });
            }
        }

        // Content-Length is advisory; count what actually arrives.
        let mut body = BytesMut::new();
        while let Some(chunk) = response.chunk().await.map_err(|err| self.request_error(err))? {
            body.extend_from_slice(&chunk);
            if body.len() > self.max_bytes {
                return Err(FetchError::TooLarge {
                    limit: self.max_bytes,
                    actual: body.len() as u64,
                });
            }
        }

        debug!(url = %url, size = body.len(), mime_type = %mime_type, "fetched source image");
        Ok(FetchedImage {
            bytes: body.freeze(),
            mime_type,
        })
    }

    fn request_error(&self, err: reqwest::Error) -> FetchError {
        if err.is_timeout() {
            FetchError::Timeout(self.timeout.as_secs())
        } else {
            FetchError::Request(err.to_string())
        }
    }
}
