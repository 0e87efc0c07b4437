//! Scratch directory for downloaded archives and the guard that removes them.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Process-wide location for transient downloads.
#[derive(Debug, Clone)]
pub struct ScratchDir {
    root: PathBuf,
}

impl ScratchDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Create the directory (and parents) if it is missing. Safe to call repeatedly.
    pub fn ensure(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.root)
    }

    /// Reserve a fresh path in the scratch directory. The file itself is
    /// created by whoever writes to it; the guard deletes it when dropped.
    pub fn create_temp(&self) -> std::io::Result<TempFile> {
        self.ensure()?;
        let path = self.root.join(generate_name());
        tracing::debug!("Reserved temp file {}", path.display());
        Ok(TempFile {
            path,
            created_at: SystemTime::now(),
        })
    }
}

/// `epub_<unix millis>_<9 random chars>.epub`
pub fn generate_name() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    let random = uuid::Uuid::new_v4().simple().to_string();
    format!("epub_{}_{}.epub", millis, &random[..9])
}

/// Delete `path` if it exists. Failures are logged, never returned.
pub fn cleanup(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => tracing::debug!("Removed temp file {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::error!("Failed to cleanup temp file {}: {}", path.display(), e),
    }
}

/// A temp file owned by exactly one request. Dropping it deletes the file,
/// whichever way the request ends.
#[derive(Debug)]
pub struct TempFile {
    path: PathBuf,
    created_at: SystemTime,
}

impl TempFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn created_at(&self) -> SystemTime {
        self.created_at
    }
}

impl Drop for TempFile {
    fn drop(&mut self) {
        cleanup(&self.path);
    }
}
