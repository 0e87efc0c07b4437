use serde::{Deserialize, Serialize};

/// The parsed view of one EPUB archive. Built in a single pass by the parser
/// and never mutated afterwards.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EpubDocument {
    pub metadata: Metadata,
    /// Spine order. This is the reading order.
    pub chapters: Vec<NavEntry>,
    /// Navigation order, flattened depth-first. Membership and order can differ from `chapters`.
    pub toc: Vec<NavEntry>,
    pub manifest: Vec<ManifestEntry>,
    pub total_chapters: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    pub title: String,
    pub creator: String,
    pub publisher: String,
    pub language: String,
    pub description: String,
    pub subject: String,
    pub date: String,
    pub rights: String,
    #[serde(default)]
    pub identifier: String,
    /// Manifest id of the cover image, when the package declares one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover: Option<String>,
}

impl Default for Metadata {
    fn default() -> Self {
        Self {
            title: String::new(),
            creator: String::new(),
            publisher: String::new(),
            language: "en".to_string(),
            description: String::new(),
            subject: String::new(),
            date: String::new(),
            rights: String::new(),
            identifier: String::new(),
            cover: None,
        }
    }
}

/// A spine item or a table-of-contents point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavEntry {
    pub id: String,
    pub title: Option<String>,
    pub href: String,
    /// Nesting depth, starting at 1.
    pub level: u32,
}

impl NavEntry {
    /// Title if present and non-empty.
    pub fn title(&self) -> Option<&str> {
        self.title.as_deref().filter(|t| !t.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestEntry {
    pub id: String,
    /// Full path inside the archive (OPF directory already applied).
    pub href: String,
    pub media_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<String>,
}

impl ManifestEntry {
    pub fn is_image(&self) -> bool {
        self.media_type.starts_with("image/")
    }

    pub fn is_chapter(&self) -> bool {
        matches!(
            self.media_type.as_str(),
            "application/xhtml+xml" | "text/html" | "image/svg+xml"
        )
    }
}

impl EpubDocument {
    pub fn manifest_by_id(&self, id: &str) -> Option<&ManifestEntry> {
        self.manifest.iter().find(|m| m.id == id)
    }

    pub fn manifest_by_href(&self, href: &str) -> Option<&ManifestEntry> {
        let href = strip_fragment(href);
        self.manifest.iter().find(|m| m.href == href)
    }

    /// Manifest lookup by id first, then by archive path.
    pub fn manifest_lookup(&self, id_or_href: &str) -> Option<&ManifestEntry> {
        self.manifest_by_id(id_or_href)
            .or_else(|| self.manifest_by_href(id_or_href))
    }

    pub fn images(&self) -> impl Iterator<Item = &ManifestEntry> {
        self.manifest.iter().filter(|m| m.is_image())
    }
}

// --- Operation results ---

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataSummary {
    pub metadata: Metadata,
    pub total_chapters: usize,
    pub toc: Vec<NavEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterList {
    pub chapters: Vec<NavEntry>,
    pub total_chapters: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterContent {
    pub chapter_id: String,
    pub content: String,
    pub title: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawChapter {
    pub chapter_id: String,
    pub raw_content: String,
    pub title: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageResource {
    pub image_id: String,
    #[serde(skip)]
    pub data: Vec<u8>,
    pub mime_type: String,
    pub size: usize,
    /// `data:<mime>;base64,<payload>`
    pub base64: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileResource {
    pub file_id: String,
    #[serde(skip)]
    pub content: Vec<u8>,
    pub mime_type: String,
    pub size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageList {
    pub images: Vec<ManifestEntry>,
    pub total_images: usize,
}

pub(crate) fn strip_fragment(href: &str) -> &str {
    href.split('#').next().unwrap_or(href)
}
