//! Chapter and resource resolution against a parsed archive.
//!
//! Callers identify chapters by manifest id, ToC id, or archive path, so the
//! title lookup tries each in a fixed order before falling back to a
//! synthetic `Chapter <id>` label.

use std::io::{Read, Seek};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::document::{
    ChapterContent, EpubDocument, FileResource, ImageResource, ImageList, ManifestEntry,
    NavEntry, RawChapter,
};
use crate::error::{EpubError, ResourceError};
use crate::parser::EpubArchive;
use crate::render::{render_chapter, RenderOptions};

/// One title lookup strategy. Returns a non-empty title or `None`.
pub type Lookup = for<'a> fn(&'a EpubDocument, &str) -> Option<&'a str>;

/// Tried in order; the first strategy that yields a title wins.
pub static STRATEGIES: [(&str, Lookup); 4] = [
    ("chapter id", by_chapter_id),
    ("toc id", by_toc_id),
    ("chapter href", by_chapter_href),
    ("toc href", by_toc_href),
];

/// Title of the first entry matching `hit`. Later matches are not consulted.
fn titled<'a>(entries: &'a [NavEntry], hit: impl Fn(&NavEntry) -> bool) -> Option<&'a str> {
    entries.iter().find(|e| hit(e)).and_then(NavEntry::title)
}

pub fn by_chapter_id<'a>(doc: &'a EpubDocument, id: &str) -> Option<&'a str> {
    titled(&doc.chapters, |c| c.id == id)
}

pub fn by_toc_id<'a>(doc: &'a EpubDocument, id: &str) -> Option<&'a str> {
    titled(&doc.toc, |t| t.id == id)
}

pub fn by_chapter_href<'a>(doc: &'a EpubDocument, id: &str) -> Option<&'a str> {
    titled(&doc.chapters, |c| c.href == id)
}

pub fn by_toc_href<'a>(doc: &'a EpubDocument, id: &str) -> Option<&'a str> {
    titled(&doc.toc, |t| t.href == id)
}

pub fn fallback_title(id: &str) -> String {
    format!("Chapter {id}")
}

/// Best display title for `id`. Never fails.
pub fn resolve_title(doc: &EpubDocument, id: &str) -> String {
    for (name, lookup) in STRATEGIES.iter() {
        match lookup(doc, id) {
            Some(title) => {
                tracing::debug!("Title for '{}' found by {}: {}", id, name, title);
                return title.to_string();
            }
            None => tracing::debug!("No title for '{}' by {}", id, name),
        }
    }
    tracing::debug!("Falling back to synthetic title for '{}'", id);
    fallback_title(id)
}

impl<R: Read + Seek> EpubArchive<R> {
    /// Manifest entry by id, then by archive path.
    pub fn manifest_entry(&self, id_or_href: &str) -> Option<&ManifestEntry> {
        self.document().manifest_lookup(id_or_href)
    }

    /// The manifest entry holding chapter `id`: manifest id, then a ToC
    /// entry's target, then an archive path.
    fn locate_chapter(&self, id: &str) -> Result<ManifestEntry, ResourceError> {
        let doc = self.document();
        let entry = doc
            .manifest_by_id(id)
            .or_else(|| {
                doc.toc
                    .iter()
                    .find(|t| t.id == id)
                    .and_then(|t| doc.manifest_by_href(&t.href))
            })
            .or_else(|| doc.manifest_by_href(id))
            .ok_or_else(|| ResourceError::NotFound {
                kind: "chapter",
                id: id.to_string(),
            })?;

        if !entry.is_chapter() {
            return Err(ResourceError::WrongMediaType {
                kind: "chapter",
                id: id.to_string(),
                media_type: entry.media_type.clone(),
            });
        }
        Ok(entry.clone())
    }

    fn chapter_text(&mut self, entry: &ManifestEntry) -> Result<String, EpubError> {
        let bytes = self.read_entry(&entry.href)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    pub fn chapter_content(
        &mut self,
        id: &str,
        opts: &RenderOptions,
    ) -> Result<ChapterContent, EpubError> {
        let entry = self.locate_chapter(id)?;
        let text = self.chapter_text(&entry)?;
        let content = if entry.media_type == "image/svg+xml" {
            text
        } else {
            render_chapter(&text, &entry.href, self.document(), opts)?
        };
        Ok(ChapterContent {
            chapter_id: id.to_string(),
            content,
            title: resolve_title(self.document(), id),
        })
    }

    pub fn chapter_raw(&mut self, id: &str) -> Result<RawChapter, EpubError> {
        let entry = self.locate_chapter(id)?;
        let raw_content = self.chapter_text(&entry)?;
        Ok(RawChapter {
            chapter_id: id.to_string(),
            raw_content,
            title: resolve_title(self.document(), id),
        })
    }

    pub fn image(&mut self, id: &str) -> Result<ImageResource, EpubError> {
        let entry = self
            .manifest_entry(id)
            .cloned()
            .ok_or_else(|| ResourceError::NotFound {
                kind: "image",
                id: id.to_string(),
            })?;
        if !entry.is_image() {
            return Err(ResourceError::WrongMediaType {
                kind: "image",
                id: id.to_string(),
                media_type: entry.media_type,
            }
            .into());
        }

        let data = self.read_entry(&entry.href)?;
        let base64 = format!("data:{};base64,{}", entry.media_type, STANDARD.encode(&data));
        Ok(ImageResource {
            image_id: id.to_string(),
            size: data.len(),
            data,
            mime_type: entry.media_type,
            base64,
        })
    }

    pub fn file(&mut self, id: &str) -> Result<FileResource, EpubError> {
        let entry = self
            .manifest_entry(id)
            .cloned()
            .ok_or_else(|| ResourceError::NotFound {
                kind: "file",
                id: id.to_string(),
            })?;
        let content = self.read_entry(&entry.href)?;
        Ok(FileResource {
            file_id: id.to_string(),
            size: content.len(),
            content,
            mime_type: entry.media_type,
        })
    }

    pub fn image_list(&self) -> ImageList {
        let images: Vec<ManifestEntry> = self.document().images().cloned().collect();
        ImageList {
            total_images: images.len(),
            images,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::ArchiveLimits;
    use crate::testing::EpubBuilder;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use std::io::Cursor;

    fn entry(id: &str, title: Option<&str>, href: &str) -> NavEntry {
        NavEntry {
            id: id.into(),
            title: title.map(String::from),
            href: href.into(),
            level: 1,
        }
    }

    /// One spine chapter "Intro" at text/ch1.html and an empty ToC.
    fn intro_doc() -> EpubDocument {
        EpubDocument {
            chapters: vec![entry("ch1", Some("Intro"), "text/ch1.html")],
            total_chapters: 1,
            ..EpubDocument::default()
        }
    }

    #[test]
    fn intro_scenario() {
        let doc = intro_doc();
        assert_eq!(resolve_title(&doc, "ch1"), "Intro");
        assert_eq!(resolve_title(&doc, "text/ch1.html"), "Intro");
        assert_eq!(resolve_title(&doc, "missing"), "Chapter missing");
    }

    #[test]
    fn untitled_chapter_falls_through_to_toc_href() {
        let doc = EpubDocument {
            chapters: vec![entry("ch1", None, "text/ch1.html")],
            toc: vec![entry("nav-1", Some("Opening"), "text/ch1.html")],
            ..EpubDocument::default()
        };
        assert_eq!(resolve_title(&doc, "text/ch1.html"), "Opening");
        assert_eq!(resolve_title(&doc, "ch1"), "Chapter ch1");
    }

    #[test]
    fn only_first_matching_entry_counts() {
        let doc = EpubDocument {
            chapters: vec![entry("ch1", None, "text/ch1.html")],
            toc: vec![
                entry("ch1", None, "text/ch1.html"),
                entry("ch1", Some("Second Entry"), "text/ch1.html#part"),
            ],
            ..EpubDocument::default()
        };
        assert_eq!(by_toc_id(&doc, "ch1"), None);
        assert_eq!(resolve_title(&doc, "ch1"), "Chapter ch1");
    }

    #[test]
    fn each_strategy_in_isolation() {
        let doc = EpubDocument {
            chapters: vec![entry("c1", Some("Spine Title"), "a.xhtml")],
            toc: vec![entry("t1", Some("Toc Title"), "b.xhtml")],
            ..EpubDocument::default()
        };
        assert_eq!(by_chapter_id(&doc, "c1"), Some("Spine Title"));
        assert_eq!(by_toc_id(&doc, "t1"), Some("Toc Title"));
        assert_eq!(by_chapter_href(&doc, "a.xhtml"), Some("Spine Title"));
        assert_eq!(by_toc_href(&doc, "b.xhtml"), Some("Toc Title"));
        assert_eq!(by_chapter_id(&doc, "t1"), None);
        assert_eq!(by_toc_href(&doc, "a.xhtml"), None);
    }

    #[test]
    fn chapter_id_beats_toc_id() {
        let doc = EpubDocument {
            chapters: vec![entry("x", Some("From Spine"), "a.xhtml")],
            toc: vec![entry("x", Some("From Toc"), "b.xhtml")],
            ..EpubDocument::default()
        };
        assert_eq!(resolve_title(&doc, "x"), "From Spine");
    }

    #[test]
    fn empty_titles_do_not_match() {
        let doc = EpubDocument {
            chapters: vec![entry("x", Some(""), "a.xhtml")],
            toc: vec![entry("x", Some("Real"), "a.xhtml")],
            ..EpubDocument::default()
        };
        assert_eq!(resolve_title(&doc, "x"), "Real");
    }

    proptest! {
        #[test]
        fn unknown_ids_fall_back(id in "[a-z0-9_-]{1,12}") {
            let doc = intro_doc();
            prop_assume!(id != "ch1");
            prop_assert_eq!(resolve_title(&doc, &id), format!("Chapter {}", id));
        }
    }

    fn archive() -> EpubArchive<Cursor<Vec<u8>>> {
        let bytes = EpubBuilder::new("Resources")
            .chapter("ch1", "text/ch1.xhtml", "Intro", r#"<p>Hi <img src="../images/pic.png"/></p><script>x()</script>"#)
            .chapter("ch2", "text/ch2.xhtml", "Second", "<p>Two</p>")
            .resource("pic", "images/pic.png", "image/png", &[0x89, b'P', b'N', b'G'])
            .resource("css", "styles/main.css", "text/css", b"p { margin: 0 }")
            .build();
        EpubArchive::from_reader(Cursor::new(bytes), &ArchiveLimits::default()).unwrap()
    }

    #[test]
    fn chapter_content_is_rendered_with_resolved_title() {
        let mut epub = archive();
        let chapter = epub.chapter_content("ch1", &RenderOptions::default()).unwrap();
        assert_eq!(chapter.chapter_id, "ch1");
        assert_eq!(chapter.title, "Intro");
        assert_eq!(
            chapter.content,
            r#"<p>Hi <img src="/images/pic/OEBPS/images/pic.png"/></p>"#
        );
    }

    #[test]
    fn chapter_by_href_and_raw_content() {
        let mut epub = archive();
        let raw = epub.chapter_raw("OEBPS/text/ch2.xhtml").unwrap();
        assert_eq!(raw.title, "Second");
        assert!(raw.raw_content.contains("<p>Two</p>"));
        assert!(raw.raw_content.contains("<html"));
    }

    #[test]
    fn chapter_errors() {
        let mut epub = archive();
        let err = epub.chapter_raw("nope").unwrap_err();
        assert!(err.is_not_found());
        let err = epub.chapter_raw("pic").unwrap_err();
        assert_eq!(err.kind(), "media_type");
    }

    #[test]
    fn image_has_data_uri() {
        let mut epub = archive();
        let img = epub.image("pic").unwrap();
        assert_eq!(img.mime_type, "image/png");
        assert_eq!(img.size, 4);
        assert_eq!(img.base64, "data:image/png;base64,iVBORw==");
    }

    #[test]
    fn image_lookup_never_defaults() {
        let mut epub = archive();
        assert!(epub.image("missing").unwrap_err().is_not_found());
        assert_eq!(epub.image("css").unwrap_err().kind(), "media_type");
    }

    #[test]
    fn any_file_by_id_or_path() {
        let mut epub = archive();
        let css = epub.file("css").unwrap();
        assert_eq!(css.content, b"p { margin: 0 }");
        assert_eq!(css.mime_type, "text/css");
        let same = epub.file("OEBPS/styles/main.css").unwrap();
        assert_eq!(same.size, css.size);
        assert!(epub.file("ghost").unwrap_err().is_not_found());
    }

    #[test]
    fn image_list_filters_by_media_type() {
        let epub = archive();
        let list = epub.image_list();
        assert_eq!(list.total_images, 1);
        assert_eq!(list.images[0].id, "pic");
    }
}
