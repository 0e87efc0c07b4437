//! The EPUB gateway operations: download → parse → query → clean up.
//!
//! Every call owns one [`TempFile`]; the guard removes it on every exit path,
//! so nothing here deletes files explicitly. Calls share only the scratch
//! directory.

use std::fs::File;
use std::path::Path;
use std::time::Duration;

use crate::config::AppConfig;
use crate::document::{
    ChapterContent, ChapterList, EpubDocument, FileResource, ImageList, ImageResource,
    MetadataSummary, RawChapter,
};
use crate::error::EpubError;
use crate::fetch::Fetcher;
use crate::janitor::{self, SweepReport};
use crate::parser::{self, EpubArchive};
use crate::render::RenderOptions;
use crate::scratch::{ScratchDir, TempFile};
use crate::security::ArchiveLimits;
use crate::validate::{self, UrlValidation};

#[derive(Debug, Clone)]
pub struct EpubService {
    fetcher: Fetcher,
    scratch: ScratchDir,
    limits: ArchiveLimits,
    render: RenderOptions,
    max_age: Duration,
}

impl EpubService {
    pub fn new(config: AppConfig) -> Result<Self, EpubError> {
        let fetcher = Fetcher::new(&config.fetch)?;
        let scratch = ScratchDir::new(config.scratch.dir());
        scratch.ensure()?;
        Ok(Self {
            fetcher,
            scratch,
            limits: config.security.limits(),
            render: config.render.into(),
            max_age: config.scratch.max_age(),
        })
    }

    pub fn scratch(&self) -> &ScratchDir {
        &self.scratch
    }

    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    pub fn render_options(&self) -> &RenderOptions {
        &self.render
    }

    /// Download `url` into a fresh temp file and parse it. The guard is
    /// returned alongside so the file outlives the archive handle.
    async fn fetch_archive(&self, url: &str) -> Result<(TempFile, EpubArchive<File>), EpubError> {
        let temp = self.scratch.create_temp()?;
        self.fetcher.download(url, &temp).await?;
        let archive = parser::parse(temp.path(), &self.limits).await?;
        Ok((temp, archive))
    }

    async fn fetch_document(&self, url: &str) -> Result<EpubDocument, EpubError> {
        let (_temp, archive) = self.fetch_archive(url).await?;
        Ok(archive.into_document())
    }

    /// Run an entry-reading query against a freshly fetched archive off the executor.
    async fn query<T, F>(&self, url: &str, query: F) -> Result<T, EpubError>
    where
        T: Send + 'static,
        F: FnOnce(&mut EpubArchive<File>) -> Result<T, EpubError> + Send + 'static,
    {
        let (_temp, archive) = self.fetch_archive(url).await?;
        run_blocking(archive, query).await
    }

    pub async fn metadata(&self, url: &str) -> Result<MetadataSummary, EpubError> {
        let doc = logged(url, self.fetch_document(url).await)?;
        Ok(MetadataSummary {
            metadata: doc.metadata,
            total_chapters: doc.total_chapters,
            toc: doc.toc,
        })
    }

    pub async fn chapters(&self, url: &str) -> Result<ChapterList, EpubError> {
        let doc = logged(url, self.fetch_document(url).await)?;
        Ok(ChapterList {
            total_chapters: doc.total_chapters,
            chapters: doc.chapters,
        })
    }

    pub async fn chapter_content(
        &self,
        url: &str,
        chapter_id: &str,
    ) -> Result<ChapterContent, EpubError> {
        let id = chapter_id.to_string();
        let opts = self.render.clone();
        logged(
            url,
            self.query(url, move |epub| epub.chapter_content(&id, &opts))
                .await,
        )
    }

    pub async fn chapter_raw(&self, url: &str, chapter_id: &str) -> Result<RawChapter, EpubError> {
        let id = chapter_id.to_string();
        logged(url, self.query(url, move |epub| epub.chapter_raw(&id)).await)
    }

    pub async fn image(&self, url: &str, image_id: &str) -> Result<ImageResource, EpubError> {
        let id = image_id.to_string();
        logged(url, self.query(url, move |epub| epub.image(&id)).await)
    }

    pub async fn file(&self, url: &str, file_id: &str) -> Result<FileResource, EpubError> {
        let id = file_id.to_string();
        logged(url, self.query(url, move |epub| epub.file(&id)).await)
    }

    pub async fn images(&self, url: &str) -> Result<ImageList, EpubError> {
        let (_temp, archive) = logged(url, self.fetch_archive(url).await)?;
        Ok(archive.image_list())
    }

    /// Shape checks plus a HEAD request. Never downloads the book.
    pub async fn validate_url(&self, url: &str) -> UrlValidation {
        validate::validate_url(&self.fetcher, url, true).await
    }

    /// Remove scratch files older than the configured max age.
    pub async fn sweep(&self) -> Result<SweepReport, EpubError> {
        let dir = self.scratch.path().to_path_buf();
        let max_age = self.max_age;
        tokio::task::spawn_blocking(move || janitor::sweep(&dir, max_age))
            .await
            .map_err(|e| EpubError::Interrupted(e.to_string()))
    }

    /// Parse an EPUB already on disk. No temp file is involved.
    pub async fn parse_local(&self, path: &Path) -> Result<EpubDocument, EpubError> {
        Ok(parser::parse(path, &self.limits).await?.into_document())
    }

    /// Run an entry-reading query against an EPUB already on disk, off the executor.
    pub async fn query_local<T, F>(&self, path: &Path, query: F) -> Result<T, EpubError>
    where
        T: Send + 'static,
        F: FnOnce(&mut EpubArchive<File>) -> Result<T, EpubError> + Send + 'static,
    {
        let archive = parser::parse(path, &self.limits).await?;
        run_blocking(archive, query).await
    }
}

async fn run_blocking<T, F>(mut archive: EpubArchive<File>, query: F) -> Result<T, EpubError>
where
    T: Send + 'static,
    F: FnOnce(&mut EpubArchive<File>) -> Result<T, EpubError> + Send + 'static,
{
    tokio::task::spawn_blocking(move || query(&mut archive))
        .await
        .map_err(|e| EpubError::Interrupted(e.to_string()))?
}

fn logged<T>(url: &str, result: Result<T, EpubError>) -> Result<T, EpubError> {
    if let Err(e) = &result {
        if e.is_not_found() {
            tracing::warn!("{} ({})", e, url);
        } else {
            tracing::error!("Error processing EPUB from {}: {}", url, e);
        }
    }
    result
}
