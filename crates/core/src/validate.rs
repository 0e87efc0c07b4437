//! Pre-flight checks for a book URL, before anything is downloaded.

use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::fetch::Fetcher;

/// Why a URL was turned away. Each variant has its own reason string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum UrlRejection {
    InvalidFormat,
    NotEpub,
    ContentType(String),
    Unreachable(String),
}

impl UrlRejection {
    pub fn reason(&self) -> String {
        match self {
            UrlRejection::InvalidFormat => "Invalid URL format".to_string(),
            UrlRejection::NotEpub => "URL does not point to an EPUB file".to_string(),
            UrlRejection::ContentType(_) => "File is not a valid EPUB format".to_string(),
            UrlRejection::Unreachable(msg) => format!("URL validation failed: {msg}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlValidation {
    pub valid: bool,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection: Option<UrlRejection>,
}

impl UrlValidation {
    fn accepted() -> Self {
        Self {
            valid: true,
            reason: "Valid EPUB URL".to_string(),
            rejection: None,
        }
    }

    fn rejected(rejection: UrlRejection) -> Self {
        Self {
            valid: false,
            reason: rejection.reason(),
            rejection: Some(rejection),
        }
    }
}

/// Scheme, host, and `.epub` checks. No network.
pub fn check_url_shape(url: &str) -> Result<Url, UrlRejection> {
    let parsed = Url::parse(url).map_err(|_| UrlRejection::InvalidFormat)?;
    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return Err(UrlRejection::InvalidFormat);
    }
    if !url.to_ascii_lowercase().contains(".epub") {
        return Err(UrlRejection::NotEpub);
    }
    Ok(parsed)
}

fn acceptable_content_type(content_type: &str) -> bool {
    let ct = content_type.to_ascii_lowercase();
    ct.contains("epub") || ct.contains("application/zip")
}

/// Validate `url`; with `check_remote`, also HEAD it and inspect `Content-Type`.
/// The first failing check decides the outcome.
pub async fn validate_url(fetcher: &Fetcher, url: &str, check_remote: bool) -> UrlValidation {
    if let Err(rejection) = check_url_shape(url) {
        tracing::debug!("Rejected {}: {:?}", url, rejection);
        return UrlValidation::rejected(rejection);
    }
    if !check_remote {
        return UrlValidation::accepted();
    }

    match fetcher.content_type(url).await {
        Ok(Some(ct)) if !acceptable_content_type(&ct) => {
            UrlValidation::rejected(UrlRejection::ContentType(ct))
        }
        Ok(_) => UrlValidation::accepted(),
        Err(e) => {
            tracing::warn!("HEAD {} failed: {}", url, e);
            UrlValidation::rejected(UrlRejection::Unreachable(e.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FetchConfig;
    use pretty_assertions::assert_eq;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fetcher() -> Fetcher {
        Fetcher::new(&FetchConfig::default()).unwrap()
    }

    #[test]
    fn shape_checks_have_distinct_reasons() {
        assert_eq!(
            check_url_shape("not a url").unwrap_err(),
            UrlRejection::InvalidFormat
        );
        assert_eq!(
            check_url_shape("ftp://example.com/book.epub").unwrap_err(),
            UrlRejection::InvalidFormat
        );
        assert_eq!(
            check_url_shape("https://example.com/book.pdf").unwrap_err(),
            UrlRejection::NotEpub
        );
        assert!(check_url_shape("https://example.com/Books/Title.EPUB").is_ok());
        assert_ne!(
            UrlRejection::InvalidFormat.reason(),
            UrlRejection::NotEpub.reason()
        );
    }

    #[tokio::test]
    async fn offline_validation_skips_head() {
        let v = validate_url(&fetcher(), "https://example.invalid/a.epub", false).await;
        assert!(v.valid);
        assert_eq!(v.reason, "Valid EPUB URL");
    }

    #[tokio::test]
    async fn content_type_is_checked_when_present() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/good.epub"))
            .respond_with(
                ResponseTemplate::new(200).insert_header("content-type", "application/epub+zip"),
            )
            .mount(&server)
            .await;
        Mock::given(method("HEAD"))
            .and(path("/page.epub"))
            .respond_with(ResponseTemplate::new(200).insert_header("content-type", "text/html"))
            .mount(&server)
            .await;
        Mock::given(method("HEAD"))
            .and(path("/bare.epub"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let f = fetcher();
        let good = validate_url(&f, &format!("{}/good.epub", server.uri()), true).await;
        assert!(good.valid);

        let page = validate_url(&f, &format!("{}/page.epub", server.uri()), true).await;
        assert!(!page.valid);
        assert_eq!(page.reason, "File is not a valid EPUB format");
        assert_eq!(
            page.rejection,
            Some(UrlRejection::ContentType("text/html".into()))
        );

        let bare = validate_url(&f, &format!("{}/bare.epub", server.uri()), true).await;
        assert!(bare.valid, "missing Content-Type passes");
    }

    #[tokio::test]
    async fn unreachable_host_is_reported() {
        let v = validate_url(&fetcher(), "http://127.0.0.1:9/book.epub", true).await;
        assert!(!v.valid);
        assert!(v.reason.starts_with("URL validation failed: "));
    }
}
