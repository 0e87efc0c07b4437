/// Top-level error type. Every service operation returns this.
#[derive(Debug, thiserror::Error)]
pub enum EpubError {
    #[error("Failed to process EPUB from URL: {0}")]
    Fetch(#[from] FetchError),

    #[error("Failed to process EPUB from URL: Downloaded file is empty")]
    EmptyDownload { url: String },

    #[error(
        "Failed to parse EPUB: {0}. This might be due to corrupted file, invalid EPUB format, or empty archive."
    )]
    Parse(#[from] ReadError),

    #[error(transparent)]
    Resource(#[from] ResourceError),

    #[error("Scratch directory error: {0}")]
    Scratch(#[from] std::io::Error),

    #[error("Operation interrupted: {0}")]
    Interrupted(String),
}

impl EpubError {
    /// Short machine-readable tag, used by the HTTP layer and the CLI's JSON output.
    pub fn kind(&self) -> &'static str {
        match self {
            EpubError::Fetch(_) => "fetch",
            EpubError::EmptyDownload { .. } => "empty_download",
            EpubError::Parse(_) => "parse",
            EpubError::Resource(ResourceError::NotFound { .. }) => "not_found",
            EpubError::Resource(ResourceError::WrongMediaType { .. }) => "media_type",
            EpubError::Scratch(_) => "scratch",
            EpubError::Interrupted(_) => "interrupted",
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, EpubError::Resource(ResourceError::NotFound { .. }))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("{0}")]
    Transport(String),

    #[error("Request failed with status code {status}")]
    Status { status: u16, url: String },

    #[error("Failed to write download to {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if let Some(status) = e.status() {
            return FetchError::Status {
                status: status.as_u16(),
                url: e.url().map(|u| u.to_string()).unwrap_or_default(),
            };
        }
        FetchError::Transport(e.to_string())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    #[error("Malformed EPUB file: {0}")]
    MalformedFile(String),

    #[error("Missing required content: {0}")]
    MissingContent(String),

    #[error(transparent)]
    Security(#[from] SecurityError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum SecurityError {
    #[error("Path traversal detected in archive entry: {path}")]
    PathTraversal { path: String },

    #[error("Archive contains {count} files, exceeding limit of {limit}")]
    TooManyFiles { count: u64, limit: u64 },

    #[error("Entry {name} is {size_mb}MB, exceeding limit of {limit_mb}MB")]
    OversizedEntry {
        name: String,
        size_mb: u64,
        limit_mb: u64,
    },

    #[error("DRM protected archive ({0})")]
    DrmProtected(&'static str),
}

/// Lookups of binary or textual entries inside an already parsed archive.
#[derive(Debug, thiserror::Error)]
pub enum ResourceError {
    #[error("Failed to get {kind}: no manifest entry for '{id}'")]
    NotFound { kind: &'static str, id: String },

    #[error("Failed to get {kind}: '{id}' has media type {media_type}")]
    WrongMediaType {
        kind: &'static str,
        id: String,
        media_type: String,
    },
}
