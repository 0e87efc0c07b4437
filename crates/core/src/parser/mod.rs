//! EPUB parser: ZIP → container.xml → OPF → NAV/NCX → [`EpubDocument`].
//!
//! [`EpubArchive`] keeps the open ZIP next to the parsed document so chapter
//! and resource queries can read entries afterwards. [`parse`] is the async
//! entry point: the blocking parse runs on tokio's blocking pool and reports
//! back through a [`ParseLatch`].

pub mod href;
pub mod latch;
pub(crate) mod opf;
pub(crate) mod toc;

use std::fs::File;
use std::io::{Read, Seek};
use std::path::Path;

use crate::document::{strip_fragment, EpubDocument, ManifestEntry, NavEntry};
use crate::error::{EpubError, ReadError};
use crate::security::{self, ArchiveLimits};

pub use latch::ParseLatch;

use opf::OpfData;
use toc::TocPoint;

const CONTAINER_PATH: &str = "META-INF/container.xml";
const ENCRYPTION_PATH: &str = "META-INF/encryption.xml";

/// A parsed EPUB together with its still-open archive.
pub struct EpubArchive<R = File> {
    archive: zip::ZipArchive<R>,
    document: EpubDocument,
    limits: ArchiveLimits,
}

impl<R> std::fmt::Debug for EpubArchive<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EpubArchive")
            .field("document", &self.document)
            .finish_non_exhaustive()
    }
}

impl EpubArchive<File> {
    /// Open and parse an EPUB on disk (blocking).
    pub fn open(path: &Path, limits: &ArchiveLimits) -> Result<Self, ReadError> {
        let file = File::open(path)?;
        Self::from_reader(file, limits)
    }
}

impl<R: Read + Seek> EpubArchive<R> {
    pub fn from_reader(reader: R, limits: &ArchiveLimits) -> Result<Self, ReadError> {
        let archive = zip::ZipArchive::new(reader)
            .map_err(|e| ReadError::MalformedFile(format!("Invalid ZIP archive: {e}")))?;
        let mut this = Self {
            archive,
            document: EpubDocument::default(),
            limits: limits.clone(),
        };
        this.document = this.parse_document()?;
        Ok(this)
    }

    pub fn document(&self) -> &EpubDocument {
        &self.document
    }

    pub fn into_document(self) -> EpubDocument {
        self.document
    }

    fn parse_document(&mut self) -> Result<EpubDocument, ReadError> {
        if self.archive.is_empty() {
            return Err(ReadError::MissingContent("archive has no entries".into()));
        }
        self.limits.check_file_count(self.archive.len() as u64)?;

        if self.archive.by_name(ENCRYPTION_PATH).is_ok() {
            let xml = self.read_entry_string(ENCRYPTION_PATH)?;
            security::check_drm(&xml)?;
        }

        let container = self.read_entry_string(CONTAINER_PATH)?;
        let opf_path = opf::find_rootfile(&container)?;
        let opf_dir = href::parent_dir(&opf_path).to_string();
        let opf_content = self.read_entry_string(&opf_path)?;
        let opf = opf::parse_opf(&opf_content, &opf_dir)?;

        let points = self.read_toc(&opf);
        let toc = attach_manifest_ids(&points, &opf.manifest);
        let chapters = build_chapters(&opf, &toc);

        tracing::debug!(
            "Parsed EPUB '{}': {} spine chapters, {} toc entries, {} manifest items",
            opf.metadata.title,
            chapters.len(),
            toc.len(),
            opf.manifest.len()
        );

        Ok(EpubDocument {
            total_chapters: chapters.len(),
            metadata: opf.metadata,
            chapters,
            toc,
            manifest: opf.manifest,
        })
    }

    /// NAV first, NCX second. A missing or broken ToC is not fatal.
    fn read_toc(&mut self, opf: &OpfData) -> Vec<TocPoint> {
        if let Some(nav_path) = opf.nav_href.as_deref() {
            match self.read_entry_string(nav_path) {
                Ok(content) => {
                    if let Some(points) = toc::parse_nav_document(&content, nav_path) {
                        return points;
                    }
                }
                Err(e) => tracing::warn!("Unreadable navigation document {}: {}", nav_path, e),
            }
        }

        let ncx_path = opf
            .toc_id
            .as_deref()
            .and_then(|id| opf.manifest.iter().find(|m| m.id == id))
            .or_else(|| {
                opf.manifest
                    .iter()
                    .find(|m| m.media_type == "application/x-dtbncx+xml")
            })
            .map(|m| m.href.clone());

        if let Some(ncx_path) = ncx_path {
            match self.read_entry_string(&ncx_path) {
                Ok(content) => return toc::parse_ncx(&content, &ncx_path),
                Err(e) => tracing::warn!("Unreadable NCX {}: {}", ncx_path, e),
            }
        }

        Vec::new()
    }

    /// Raw bytes of the archive entry at `path`.
    pub fn read_entry(&mut self, path: &str) -> Result<Vec<u8>, ReadError> {
        security::check_entry_path(path)?;
        let mut file = self
            .archive
            .by_name(path)
            .map_err(|_| ReadError::MissingContent(format!("Missing file: {path}")))?;
        self.limits.check_entry_size(path, file.size())?;

        let mut buf = Vec::with_capacity(file.size() as usize);
        file.read_to_end(&mut buf)
            .map_err(|e| ReadError::MalformedFile(format!("Failed to read {path}: {e}")))?;
        Ok(buf)
    }

    pub fn read_entry_string(&mut self, path: &str) -> Result<String, ReadError> {
        let bytes = self.read_entry(path)?;
        String::from_utf8(bytes)
            .map_err(|e| ReadError::MalformedFile(format!("Invalid UTF-8 in {path}: {e}")))
    }
}

/// A ToC entry's id is the manifest id its href points at; failing that, the
/// navigation point's own id; failing that, its position.
fn attach_manifest_ids(points: &[TocPoint], manifest: &[ManifestEntry]) -> Vec<NavEntry> {
    points
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let path = strip_fragment(&p.href);
            let id = manifest
                .iter()
                .find(|m| !path.is_empty() && m.href == path)
                .map(|m| m.id.clone())
                .or_else(|| p.id.clone())
                .unwrap_or_else(|| format!("toc-{}", i + 1));
            NavEntry {
                id,
                title: Some(p.title.clone()).filter(|t| !t.is_empty()),
                href: p.href.clone(),
                level: p.level,
            }
        })
        .collect()
}

/// Spine order is kept exactly. Titles and levels come from the first ToC
/// entry pointing at the same file.
fn build_chapters(opf: &OpfData, toc: &[NavEntry]) -> Vec<NavEntry> {
    opf.spine
        .iter()
        .filter_map(|idref| {
            let item = opf.manifest.iter().find(|m| &m.id == idref);
            if item.is_none() {
                tracing::warn!("Spine item '{}' has no manifest entry, skipping", idref);
            }
            item
        })
        .map(|item| {
            let toc_hit = toc
                .iter()
                .find(|t| strip_fragment(&t.href) == item.href);
            NavEntry {
                id: item.id.clone(),
                title: toc_hit.and_then(|t| t.title.clone()),
                href: item.href.clone(),
                level: toc_hit.map_or(1, |t| t.level),
            }
        })
        .collect()
}

/// Parse the EPUB at `path` off the async executor.
///
/// The worker settles the latch exactly once with either the archive or the
/// error; if it dies without settling (panic), the caller still gets a parse
/// error instead of hanging.
pub async fn parse(path: &Path, limits: &ArchiveLimits) -> Result<EpubArchive<File>, EpubError> {
    let (mut latch, done) = ParseLatch::new();
    let path = path.to_path_buf();
    let limits = limits.clone();

    tokio::task::spawn_blocking(move || match EpubArchive::open(&path, &limits) {
        Ok(archive) => {
            latch.end(archive);
        }
        Err(e) => {
            latch.error(e);
        }
    });

    match done.await {
        Ok(outcome) => outcome.map_err(EpubError::from),
        Err(_) => Err(EpubError::Parse(ReadError::MalformedFile(
            "parser stopped before completing".into(),
        ))),
    }
}
