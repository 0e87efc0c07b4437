//! `/api/epub` routes and the response envelope.

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use readshelf_core::document::{
    ChapterContent, ChapterList, ImageList, ImageResource, MetadataSummary, RawChapter,
};
use readshelf_core::error::EpubError;
use readshelf_core::validate::{check_url_shape, UrlRejection, UrlValidation};

use crate::AppState;

/// Query params shared by every `/api/epub` route.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EpubQuery {
    pub url: Option<String>,
    pub chapter_id: Option<String>,
    pub image_id: Option<String>,
    pub file_id: Option<String>,
    /// `/file` only: send the raw bytes instead of the JSON envelope.
    #[serde(default)]
    pub download: bool,
}

#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub success: bool,
    pub data: T,
}

type ApiResult<T> = Result<Json<Envelope<T>>, ApiError>;

fn ok<T>(data: T) -> Json<Envelope<T>> {
    Json(Envelope {
        success: true,
        data,
    })
}

pub fn routes(state: AppState) -> Router {
    let epub = Router::new()
        .route("/metadata", get(metadata))
        .route("/chapters", get(chapters))
        .route("/chapter", get(chapter))
        .route("/chapter/raw", get(chapter_raw))
        .route("/image", get(image))
        .route("/file", get(file))
        .route("/images", get(images))
        .route("/validate", get(validate));

    Router::new()
        .route("/health", get(health))
        .nest("/api/epub", epub)
        .with_state(state)
}

async fn health() -> Json<Envelope<serde_json::Value>> {
    ok(serde_json::json!({ "status": "ok" }))
}

fn require<'a>(value: &'a Option<String>, name: &str) -> Result<&'a str, ApiError> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::BadRequest(format!("Missing required parameter: {name}")))
}

/// The `url` parameter, rejected early when it is not an http(s) URL at all.
/// The `.epub` suffix is not enforced here; storage links often lack it.
fn book_url(q: &EpubQuery) -> Result<&str, ApiError> {
    let url = require(&q.url, "url")?;
    match check_url_shape(url) {
        Err(rejection @ UrlRejection::InvalidFormat) => Err(ApiError::BadRequest(rejection.reason())),
        _ => Ok(url),
    }
}

async fn metadata(
    State(state): State<AppState>,
    Query(q): Query<EpubQuery>,
) -> ApiResult<MetadataSummary> {
    let url = book_url(&q)?;
    Ok(ok(state.service.metadata(url).await?))
}

async fn chapters(
    State(state): State<AppState>,
    Query(q): Query<EpubQuery>,
) -> ApiResult<ChapterList> {
    let url = book_url(&q)?;
    Ok(ok(state.service.chapters(url).await?))
}

async fn chapter(
    State(state): State<AppState>,
    Query(q): Query<EpubQuery>,
) -> ApiResult<ChapterContent> {
    let url = book_url(&q)?;
    let id = require(&q.chapter_id, "chapterId")?;
    Ok(ok(state.service.chapter_content(url, id).await?))
}

async fn chapter_raw(
    State(state): State<AppState>,
    Query(q): Query<EpubQuery>,
) -> ApiResult<RawChapter> {
    let url = book_url(&q)?;
    let id = require(&q.chapter_id, "chapterId")?;
    Ok(ok(state.service.chapter_raw(url, id).await?))
}

async fn image(
    State(state): State<AppState>,
    Query(q): Query<EpubQuery>,
) -> ApiResult<ImageResource> {
    let url = book_url(&q)?;
    let id = require(&q.image_id, "imageId")?;
    Ok(ok(state.service.image(url, id).await?))
}

async fn file(State(state): State<AppState>, Query(q): Query<EpubQuery>) -> Result<Response, ApiError> {
    let url = book_url(&q)?;
    let id = require(&q.file_id, "fileId")?;
    let file = state.service.file(url, id).await?;
    if q.download {
        return Ok(([(header::CONTENT_TYPE, file.mime_type)], file.content).into_response());
    }
    Ok(ok(file).into_response())
}

async fn images(State(state): State<AppState>, Query(q): Query<EpubQuery>) -> ApiResult<ImageList> {
    let url = book_url(&q)?;
    Ok(ok(state.service.images(url).await?))
}

/// Always answers 200 when `url` is present; the verdict is in `data.valid`.
async fn validate(
    State(state): State<AppState>,
    Query(q): Query<EpubQuery>,
) -> ApiResult<UrlValidation> {
    let url = require(&q.url, "url")?;
    Ok(ok(state.service.validate_url(url).await))
}

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Epub(EpubError),
}

impl From<EpubError> for ApiError {
    fn from(e: EpubError) -> Self {
        ApiError::Epub(e)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Epub(e) => match e.kind() {
                "not_found" => StatusCode::NOT_FOUND,
                "media_type" => StatusCode::UNSUPPORTED_MEDIA_TYPE,
                "parse" | "empty_download" => StatusCode::UNPROCESSABLE_ENTITY,
                "fetch" => StatusCode::BAD_GATEWAY,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::BadRequest(s) => write!(f, "{}", s),
            ApiError::Epub(e) => write!(f, "{}", e),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!("{} {}", status, self);
        }
        let body = serde_json::json!({
            "success": false,
            "message": self.to_string(),
        });
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use readshelf_core::error::{FetchError, ReadError, ResourceError};

    #[test]
    fn epub_errors_map_to_distinct_statuses() {
        let cases = [
            (
                EpubError::Resource(ResourceError::NotFound {
                    kind: "image",
                    id: "x".into(),
                }),
                StatusCode::NOT_FOUND,
            ),
            (
                EpubError::Resource(ResourceError::WrongMediaType {
                    kind: "image",
                    id: "x".into(),
                    media_type: "text/css".into(),
                }),
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ),
            (
                EpubError::Parse(ReadError::MalformedFile("bad".into())),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                EpubError::EmptyDownload { url: "u".into() },
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                EpubError::Fetch(FetchError::Transport("dns".into())),
                StatusCode::BAD_GATEWAY,
            ),
            (
                EpubError::Interrupted("panic".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status(), status);
        }
    }

    #[test]
    fn missing_parameter_names_the_parameter() {
        let q = EpubQuery::default();
        let err = book_url(&q).unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.to_string(), "Missing required parameter: url");
    }

    #[test]
    fn non_http_url_is_bad_request() {
        let q = EpubQuery {
            url: Some("file:///etc/passwd".into()),
            ..EpubQuery::default()
        };
        assert_eq!(book_url(&q).unwrap_err().to_string(), "Invalid URL format");
    }
}
