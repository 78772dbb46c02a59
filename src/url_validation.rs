use tracing::warn;
use url::Url;

use crate::error::PipelineError;

/// Hosts accepted when `TRUSTED_IMAGE_DOMAINS` is not set. A host matches when
/// it equals an entry or is a subdomain of it.
pub const DEFAULT_TRUSTED_DOMAINS: &[&str] = &[
    "storage.googleapis.com",
    "googleusercontent.com",
    "amazonaws.com",
    "cloudinary.com",
    "cloudfront.net",
    "unsplash.com",
    "pexels.com",
    "wikimedia.org",
    "localhost",
    "127.0.0.1",
];

/// Allow-list gate in front of every outbound image fetch.
#[derive(Clone, Debug)]
pub struct UrlValidator {
    trusted_domains: Vec<String>,
}

impl UrlValidator {
    pub fn new(trusted_domains: Vec<String>) -> Self {
        let trusted_domains = trusted_domains
            .into_iter()
            .map(|domain| domain.trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|domain| !domain.is_empty())
            .collect();
        Self { trusted_domains }
    }

    pub fn with_defaults() -> Self {
        Self::new(
            DEFAULT_TRUSTED_DOMAINS
                .iter()
                .map(|domain| domain.to_string())
                .collect(),
        )
    }

    pub fn validate(&self, raw: &str) -> bool {
        self.parse(raw).is_some()
    }

    /// Same checks as [`UrlValidator::validate`], returning the parsed URL.
    pub fn validate_source_url(&self, raw: &str) -> Result<Url, PipelineError> {
        if raw.trim().is_empty() {
            return Err(PipelineError::validation("imageUrl is required"));
        }
        self.parse(raw)
            .ok_or_else(|| PipelineError::validation("imageUrl is not an allowed image source"))
    }

    fn parse(&self, raw: &str) -> Option<Url> {
        let parsed = Url::parse(raw.trim()).ok()?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return None;
        }
        let host = parsed.host_str()?.trim_end_matches('.').to_ascii_lowercase();
        if self.is_trusted(&host) {
            Some(parsed)
        } else {
            warn!(host = %host, "rejected image url from untrusted host; extend TRUSTED_IMAGE_DOMAINS to allow it");
            None
        }
    }

    fn is_trusted(&self, host: &str) -> bool {
        self.trusted_domains.iter().any(|domain| {
            host == domain
                || host
                    .strip_suffix(domain.as_str())
                    .is_some_and(|rest| rest.ends_with('.'))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_exact_and_subdomain_matches() {
        let validator = UrlValidator::with_defaults();
        assert!(validator.validate("https://storage.googleapis.com/x/photo.jpg"));
        assert!(validator.validate("https://images.unsplash.com/photo-1?w=800"));
        assert!(validator.validate("http://localhost:8080/a.png"));
        assert!(validator.validate("http://127.0.0.1:9000/a.png"));
    }

    #[test]
    fn rejects_untrusted_hosts() {
        let validator = UrlValidator::with_defaults();
        assert!(!validator.validate("https://evil.example.com/a.jpg"));
        assert!(!validator.validate("http://169.254.169.254/latest/meta-data"));
        assert!(!validator.validate("http://10.0.0.5/internal.png"));
    }

    #[test]
    fn suffix_match_requires_label_boundary() {
        let validator = UrlValidator::new(vec!["unsplash.com".into()]);
        assert!(!validator.validate("https://notunsplash.com/a.jpg"));
        assert!(!validator.validate("https://unsplash.com.evil.net/a.jpg"));
    }

    #[test]
    fn rejects_non_http_schemes_and_garbage() {
        let validator = UrlValidator::with_defaults();
        assert!(!validator.validate("file:///etc/passwd"));
        assert!(!validator.validate("ftp://storage.googleapis.com/x.jpg"));
        assert!(!validator.validate("not a url"));
        assert!(!validator.validate(""));
    }

    #[test]
    fn empty_url_is_a_validation_error() {
        let validator = UrlValidator::with_defaults();
        let err = validator.validate_source_url("  ").unwrap_err();
        assert!(matches!(err, PipelineError::Validation(_)));
    }
}
