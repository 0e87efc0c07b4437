//! Remote EPUB download into the scratch directory.

use std::time::Duration;

use reqwest::header::CONTENT_TYPE;

use crate::config::FetchConfig;
use crate::error::{EpubError, FetchError};
use crate::scratch::TempFile;

/// HTTP client with the download policy baked in (timeout, redirect cap, user agent).
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: reqwest::Client,
    head_timeout: Duration,
}

impl Fetcher {
    pub fn new(cfg: &FetchConfig) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .redirect(reqwest::redirect::Policy::limited(cfg.max_redirects))
            .user_agent(cfg.user_agent.clone())
            .build()?;
        Ok(Self {
            client,
            head_timeout: Duration::from_secs(cfg.head_timeout_secs),
        })
    }

    /// GET `url` and write the body to `dest`. Returns the number of bytes on disk.
    ///
    /// A zero-byte body is reported as [`EpubError::EmptyDownload`] rather than
    /// letting the parser fail on it with a less useful message.
    pub async fn download(&self, url: &str, dest: &TempFile) -> Result<u64, EpubError> {
        tracing::info!("Downloading EPUB from {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(FetchError::from)?
            .error_for_status()
            .map_err(FetchError::from)?;
        let body = response.bytes().await.map_err(FetchError::from)?;

        let write_err = |source| FetchError::Write {
            path: dest.path().display().to_string(),
            source,
        };
        tokio::fs::write(dest.path(), &body).await.map_err(write_err)?;
        let size = tokio::fs::metadata(dest.path())
            .await
            .map_err(write_err)?
            .len();

        if size == 0 {
            return Err(EpubError::EmptyDownload {
                url: url.to_string(),
            });
        }
        tracing::debug!("Downloaded {} bytes to {}", size, dest.path().display());
        Ok(size)
    }

    /// HEAD `url` and return its `Content-Type`, if the server sent one.
    pub async fn content_type(&self, url: &str) -> Result<Option<String>, FetchError> {
        let response = self
            .client
            .head(url)
            .timeout(self.head_timeout)
            .send()
            .await?
            .error_for_status()?;
        Ok(response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(String::from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scratch::ScratchDir;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fetcher() -> Fetcher {
        Fetcher::new(&FetchConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn download_writes_body_and_sends_user_agent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/book.epub"))
            .and(header("user-agent", "Reading-Book-API/1.0"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"PK\x03\x04abc".to_vec()))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let temp = ScratchDir::new(dir.path()).create_temp().unwrap();
        let n = fetcher()
            .download(&format!("{}/book.epub", server.uri()), &temp)
            .await
            .unwrap();
        assert_eq!(n, 7);
        assert_eq!(std::fs::read(temp.path()).unwrap(), b"PK\x03\x04abc");
    }

    #[tokio::test]
    async fn empty_body_is_its_own_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let temp = ScratchDir::new(dir.path()).create_temp().unwrap();
        let err = fetcher()
            .download(&format!("{}/empty.epub", server.uri()), &temp)
            .await
            .unwrap_err();
        assert!(matches!(err, EpubError::EmptyDownload { .. }));
        assert_eq!(
            err.to_string(),
            "Failed to process EPUB from URL: Downloaded file is empty"
        );
    }

    #[tokio::test]
    async fn non_success_status_is_fetch_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let temp = ScratchDir::new(dir.path()).create_temp().unwrap();
        let err = fetcher()
            .download(&format!("{}/gone.epub", server.uri()), &temp)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EpubError::Fetch(FetchError::Status { status: 404, .. })
        ));
    }

    #[tokio::test]
    async fn unreachable_host_is_transport_error() {
        let dir = tempfile::tempdir().unwrap();
        let temp = ScratchDir::new(dir.path()).create_temp().unwrap();
        // Port 9 on localhost is not listening in test environments.
        let err = fetcher()
            .download("http://127.0.0.1:9/book.epub", &temp)
            .await
            .unwrap_err();
        assert!(matches!(err, EpubError::Fetch(FetchError::Transport(_))));
    }

    #[tokio::test]
    async fn redirect_loop_stops_at_cap() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/loop.epub"))
            .respond_with(
                ResponseTemplate::new(302)
                    .insert_header("location", format!("{}/loop.epub", server.uri()).as_str()),
            )
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let temp = ScratchDir::new(dir.path()).create_temp().unwrap();
        let err = fetcher()
            .download(&format!("{}/loop.epub", server.uri()), &temp)
            .await
            .unwrap_err();
        assert!(matches!(err, EpubError::Fetch(FetchError::Transport(_))));
        let received = server.received_requests().await.unwrap();
        assert!(received.len() <= 6, "followed {} requests", received.len());
    }

    #[tokio::test]
    async fn five_redirects_are_followed() {
        let server = MockServer::start().await;
        for hop in 0..5 {
            let next = if hop == 4 {
                format!("{}/book.epub", server.uri())
            } else {
                format!("{}/hop{}", server.uri(), hop + 1)
            };
            Mock::given(method("GET"))
                .and(path(format!("/hop{}", hop)))
                .respond_with(ResponseTemplate::new(302).insert_header("location", next.as_str()))
                .mount(&server)
                .await;
        }
        Mock::given(method("GET"))
            .and(path("/book.epub"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"PK\x03\x04".to_vec()))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let temp = ScratchDir::new(dir.path()).create_temp().unwrap();
        let n = fetcher()
            .download(&format!("{}/hop0", server.uri()), &temp)
            .await
            .unwrap();
        assert_eq!(n, 4);
    }

    #[tokio::test]
    async fn head_returns_content_type() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(
                ResponseTemplate::new(200).insert_header("content-type", "application/epub+zip"),
            )
            .mount(&server)
            .await;

        let ct = fetcher()
            .content_type(&format!("{}/book.epub", server.uri()))
            .await
            .unwrap();
        assert_eq!(ct.as_deref(), Some("application/epub+zip"));
    }
}
