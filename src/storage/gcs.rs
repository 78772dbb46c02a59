//! Google Cloud Storage backend over the XML API with V4 signed URLs.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use reqwest::Client;
use rsa::RsaPrivateKey;
use rsa::pkcs1v15::SigningKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::signature::{SignatureEncoding, Signer};
use sha2::Sha256;
use tracing::{debug, info};

use super::hash::compute_hash;
use super::{ImageStore, LONG_LIVED_CACHE_CONTROL};
use crate::config::GcsConfig;
use crate::error::StorageError;

const PATH_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'/')
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

const SIGNED_URL_TTL: Duration = Duration::from_secs(300);
const UPLOAD_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(serde::Deserialize)]
struct ServiceAccount {
    client_email: String,
    private_key: String,
}

pub struct GcsStorage {
    client_email: String,
    private_key: RsaPrivateKey,
    bucket: String,
    host: String,
    http_client: Client,
}

impl GcsStorage {
    pub fn new(service_account_json: &str, bucket: &str, host: &str) -> Result<Self, StorageError> {
        let sa: ServiceAccount = serde_json::from_str(service_account_json)
            .map_err(|e| StorageError::Credentials(format!("invalid service account JSON: {e}")))?;
        let private_key = RsaPrivateKey::from_pkcs8_pem(&sa.private_key)
            .map_err(|e| StorageError::Credentials(format!("unreadable service account key: {e}")))?;

        let http_client = Client::builder()
            .timeout(UPLOAD_TIMEOUT)
            .build()
            .map_err(|e| StorageError::Request(e.to_string()))?;

        Ok(Self {
            client_email: sa.client_email,
            private_key,
            bucket: bucket.to_string(),
            host: host.to_string(),
            http_client,
        })
    }

    pub async fn from_config(cfg: &GcsConfig) -> Result<Self, StorageError> {
        let raw_json = tokio::fs::read_to_string(&cfg.credentials_path).await.map_err(|e| {
            StorageError::Credentials(format!(
                "failed to read {}: {e}",
                cfg.credentials_path.display()
            ))
        })?;
        let storage = Self::new(&raw_json, &cfg.bucket, &cfg.host)?;
        info!(
            bucket = %cfg.bucket,
            project_id = cfg.project_id.as_deref().unwrap_or("-"),
            account = %storage.client_email,
            "GCS client initialized"
        );
        Ok(storage)
    }

    pub fn public_url(&self, object_path: &str) -> String {
        format!("https://{}/{}/{}", self.host, self.bucket, object_path.trim_start_matches('/'))
    }

    /// Writes the object with a long-lived cache-control header.
    pub async fn upload(&self, object_path: &str, data: Bytes, content_type: &str) -> Result<(), StorageError> {
        let headers = BTreeMap::from([
            ("cache-control", LONG_LIVED_CACHE_CONTROL.to_string()),
            ("content-type", content_type.to_string()),
        ]);
        let signed_url = self.sign_url("PUT", object_path, &[], &headers)?;
        debug!(object_path = %object_path, size = data.len(), "uploading to GCS");

        let request = headers
            .iter()
            .fold(self.http_client.put(&signed_url), |req, (name, value)| req.header(*name, value))
            .body(data);
        self.send(request, "upload").await
    }

    /// Applies the `public-read` canned ACL to an existing object.
    pub async fn make_public(&self, object_path: &str) -> Result<(), StorageError> {
        let headers = BTreeMap::from([("x-goog-acl", "public-read".to_string())]);
        let signed_url = self.sign_url("PUT", object_path, &[("acl", String::new())], &headers)?;

        let request = headers
            .iter()
            .fold(self.http_client.put(&signed_url), |req, (name, value)| req.header(*name, value))
            .body(Bytes::new());
        self.send(request, "acl").await
    }

    async fn send(&self, request: reqwest::RequestBuilder, what: &str) -> Result<(), StorageError> {
        let response = request
            .send()
            .await
            .map_err(|e| StorageError::Request(format!("GCS {what} failed: {e}")))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(StorageError::Upstream { status, body });
        }
        Ok(())
    }

    fn sign_url(
        &self,
        method: &str,
        object_path: &str,
        extra_query: &[(&str, String)],
        extra_headers: &BTreeMap<&str, String>,
    ) -> Result<String, StorageError> {
        let now = Utc::now();
        let datestamp = now.format("%Y%m%d").to_string();
        let timestamp = now.format("%Y%m%dT%H%M%SZ").to_string();

        let credential_scope = format!("{datestamp}/auto/storage/goog4_request");
        let credential = format!("{}/{}", self.client_email, credential_scope);

        let encoded_object = utf8_percent_encode(object_path.trim_start_matches('/'), PATH_SET).to_string();
        let canonical_uri = format!("/{}/{}", self.bucket, encoded_object);

        let mut headers = extra_headers.clone();
        headers.insert("host", self.host.clone());
        let canonical_headers: String = headers
            .iter()
            .map(|(name, value)| format!("{name}:{}\n", value.trim()))
            .collect();
        let signed_headers = headers.keys().copied().collect::<Vec<_>>().join(";");

        let mut query_items: Vec<(&str, String)> = vec![
            ("X-Goog-Algorithm", "GOOG4-RSA-SHA256".to_string()),
            ("X-Goog-Credential", urlencoding::encode(&credential).into_owned()),
            ("X-Goog-Date", timestamp.clone()),
            ("X-Goog-Expires", SIGNED_URL_TTL.as_secs().to_string()),
            ("X-Goog-SignedHeaders", urlencoding::encode(&signed_headers).into_owned()),
        ];
        query_items.extend(extra_query.iter().cloned());
        query_items.sort_by(|a, b| a.0.cmp(b.0));
        let canonical_query = query_items
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");

        let canonical_request = format!(
            "{method}\n{canonical_uri}\n{canonical_query}\n{canonical_headers}\n{signed_headers}\nUNSIGNED-PAYLOAD"
        );
        let canonical_hash = compute_hash(canonical_request.as_bytes());
        let string_to_sign = format!("GOOG4-RSA-SHA256\n{timestamp}\n{credential_scope}\n{canonical_hash}");

        let signing_key = SigningKey::<Sha256>::new(self.private_key.clone());
        let signature = signing_key.sign(string_to_sign.as_bytes()).to_bytes();

        Ok(format!(
            "https://{host}{canonical_uri}?{canonical_query}&X-Goog-Signature={sig}",
            host = self.host,
            sig = hex::encode(signature)
        ))
    }
}

#[async_trait]
impl ImageStore for GcsStorage {
    async fn store(
        &self,
        prefix: &str,
        filename: &str,
        bytes: Bytes,
        content_type: &str,
    ) -> Result<String, StorageError> {
        let object_path = format!("{prefix}/{filename}");
        let size = bytes.len();
        self.upload(&object_path, bytes, content_type).await?;
        self.make_public(&object_path).await?;
        info!(object_path = %object_path, size, "thumbnail uploaded to GCS");
        Ok(self.public_url(&object_path))
    }

    fn backend_name(&self) -> &'static str {
        "gcs"
    }
}
