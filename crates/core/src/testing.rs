//! In-memory EPUB fixtures for tests (enabled by the `testing` feature).
//!
//! ```ignore
//! let bytes = EpubBuilder::new("Title")
//!     .chapter("ch1", "text/ch1.xhtml", "Intro", "<p>Hello</p>")
//!     .build();
//! ```

use std::io::{Cursor, Write};

use zip::result::ZipResult;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

struct Chapter {
    id: String,
    path: String,
    title: Option<String>,
    body: String,
}

struct Resource {
    id: String,
    path: String,
    media_type: String,
    data: Vec<u8>,
}

/// Builds a small but structurally complete EPUB archive.
pub struct EpubBuilder {
    title: String,
    creator: Option<String>,
    language: Option<String>,
    opf_dir: String,
    epub3: bool,
    chapters: Vec<Chapter>,
    resources: Vec<Resource>,
    toc_order: Option<Vec<String>>,
    extra: Vec<(String, Vec<u8>)>,
}

impl EpubBuilder {
    pub fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            creator: None,
            language: None,
            opf_dir: "OEBPS".to_string(),
            epub3: true,
            chapters: Vec::new(),
            resources: Vec::new(),
            toc_order: None,
            extra: Vec::new(),
        }
    }

    /// Directory holding `content.opf`; `""` puts it at the archive root.
    pub fn opf_dir(mut self, dir: &str) -> Self {
        self.opf_dir = dir.trim_matches('/').to_string();
        self
    }

    /// NCX navigation instead of an EPUB3 nav document.
    pub fn epub2(mut self) -> Self {
        self.epub3 = false;
        self
    }

    pub fn creator(mut self, creator: &str) -> Self {
        self.creator = Some(creator.to_string());
        self
    }

    pub fn language(mut self, language: &str) -> Self {
        self.language = Some(language.to_string());
        self
    }

    /// Spine item with a ToC entry. `path` is relative to the OPF directory.
    pub fn chapter(mut self, id: &str, path: &str, title: &str, body: &str) -> Self {
        self.chapters.push(Chapter {
            id: id.to_string(),
            path: path.to_string(),
            title: Some(title.to_string()),
            body: body.to_string(),
        });
        self
    }

    /// Spine item with no ToC entry.
    pub fn untitled_chapter(mut self, id: &str, path: &str, body: &str) -> Self {
        self.chapters.push(Chapter {
            id: id.to_string(),
            path: path.to_string(),
            title: None,
            body: body.to_string(),
        });
        self
    }

    pub fn resource(mut self, id: &str, path: &str, media_type: &str, data: &[u8]) -> Self {
        self.resources.push(Resource {
            id: id.to_string(),
            path: path.to_string(),
            media_type: media_type.to_string(),
            data: data.to_vec(),
        });
        self
    }

    /// ToC order by chapter id, independent of spine order.
    pub fn toc_order(mut self, ids: &[&str]) -> Self {
        self.toc_order = Some(ids.iter().map(|s| s.to_string()).collect());
        self
    }

    /// Arbitrary archive entry at a full path.
    pub fn extra_entry(mut self, path: &str, data: &[u8]) -> Self {
        self.extra.push((path.to_string(), data.to_vec()));
        self
    }

    pub fn build(self) -> Vec<u8> {
        self.try_build().expect("in-memory zip write cannot fail")
    }

    fn full_path(&self, path: &str) -> String {
        if self.opf_dir.is_empty() {
            path.to_string()
        } else {
            format!("{}/{}", self.opf_dir, path)
        }
    }

    fn toc_chapters(&self) -> Vec<&Chapter> {
        let titled = |c: &&Chapter| c.title.is_some();
        match &self.toc_order {
            Some(order) => order
                .iter()
                .filter_map(|id| self.chapters.iter().find(|c| &c.id == id))
                .filter(titled)
                .collect(),
            None => self.chapters.iter().filter(titled).collect(),
        }
    }

    fn try_build(self) -> ZipResult<Vec<u8>> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let stored: FileOptions<'_, ()> =
            FileOptions::default().compression_method(CompressionMethod::Stored);
        let deflated: FileOptions<'_, ()> =
            FileOptions::default().compression_method(CompressionMethod::Deflated);

        zip.start_file("mimetype", stored)?;
        zip.write_all(b"application/epub+zip")?;

        let opf_path = self.full_path("content.opf");
        zip.start_file("META-INF/container.xml", deflated)?;
        write!(
            zip,
            r#"<?xml version="1.0" encoding="UTF-8"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="{opf_path}" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>"#
        )?;

        zip.start_file(opf_path, deflated)?;
        zip.write_all(self.opf().as_bytes())?;

        if self.epub3 {
            zip.start_file(self.full_path("nav.xhtml"), deflated)?;
            zip.write_all(self.nav().as_bytes())?;
        } else {
            zip.start_file(self.full_path("toc.ncx"), deflated)?;
            zip.write_all(self.ncx().as_bytes())?;
        }

        for ch in &self.chapters {
            zip.start_file(self.full_path(&ch.path), deflated)?;
            write!(
                zip,
                r#"<?xml version="1.0" encoding="UTF-8"?>
<html xmlns="http://www.w3.org/1999/xhtml">
<head><title>{}</title></head>
<body>{}</body>
</html>"#,
                escape_xml(ch.title.as_deref().unwrap_or(&ch.id)),
                ch.body
            )?;
        }

        for res in &self.resources {
            zip.start_file(self.full_path(&res.path), deflated)?;
            zip.write_all(&res.data)?;
        }

        for (path, data) in &self.extra {
            zip.start_file(path.as_str(), deflated)?;
            zip.write_all(data)?;
        }

        Ok(zip.finish()?.into_inner())
    }

    fn opf(&self) -> String {
        let mut opf = String::new();
        opf.push_str(&format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="{}" unique-identifier="uid">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:title>{}</dc:title>
    <dc:identifier id="uid">urn:uuid:00000000-0000-4000-8000-000000000000</dc:identifier>
"#,
            if self.epub3 { "3.0" } else { "2.0" },
            escape_xml(&self.title)
        ));
        if let Some(creator) = &self.creator {
            opf.push_str(&format!("    <dc:creator>{}</dc:creator>\n", escape_xml(creator)));
        }
        if let Some(lang) = &self.language {
            opf.push_str(&format!("    <dc:language>{}</dc:language>\n", escape_xml(lang)));
        }
        opf.push_str("  </metadata>\n  <manifest>\n");

        if self.epub3 {
            opf.push_str(
                "    <item id=\"nav\" href=\"nav.xhtml\" media-type=\"application/xhtml+xml\" properties=\"nav\"/>\n",
            );
        } else {
            opf.push_str(
                "    <item id=\"ncx\" href=\"toc.ncx\" media-type=\"application/x-dtbncx+xml\"/>\n",
            );
        }
        for ch in &self.chapters {
            opf.push_str(&format!(
                "    <item id=\"{}\" href=\"{}\" media-type=\"application/xhtml+xml\"/>\n",
                escape_xml(&ch.id),
                escape_xml(&ch.path)
            ));
        }
        for res in &self.resources {
            opf.push_str(&format!(
                "    <item id=\"{}\" href=\"{}\" media-type=\"{}\"/>\n",
                escape_xml(&res.id),
                escape_xml(&res.path),
                escape_xml(&res.media_type)
            ));
        }

        opf.push_str("  </manifest>\n");
        opf.push_str(if self.epub3 {
            "  <spine>\n"
        } else {
            "  <spine toc=\"ncx\">\n"
        });
        for ch in &self.chapters {
            opf.push_str(&format!("    <itemref idref=\"{}\"/>\n", escape_xml(&ch.id)));
        }
        opf.push_str("  </spine>\n</package>\n");
        opf
    }

    fn nav(&self) -> String {
        let items: String = self
            .toc_chapters()
            .iter()
            .map(|c| {
                format!(
                    "      <li><a href=\"{}\">{}</a></li>\n",
                    escape_xml(&c.path),
                    escape_xml(c.title.as_deref().unwrap_or_default())
                )
            })
            .collect();
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<html xmlns="http://www.w3.org/1999/xhtml" xmlns:epub="http://www.idpf.org/2007/ops">
<head><title>Contents</title></head>
<body>
  <nav epub:type="toc" id="toc">
    <ol>
{items}    </ol>
  </nav>
</body>
</html>"#
        )
    }

    fn ncx(&self) -> String {
        let points: String = self
            .toc_chapters()
            .iter()
            .enumerate()
            .map(|(i, c)| {
                format!(
                    "    <navPoint id=\"np{n}\" playOrder=\"{n}\"><navLabel><text>{}</text></navLabel><content src=\"{}\"/></navPoint>\n",
                    escape_xml(c.title.as_deref().unwrap_or_default()),
                    escape_xml(&c.path),
                    n = i + 1
                )
            })
            .collect();
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<ncx xmlns="http://www.daisy.org/z3986/2005/ncx/" version="2005-1">
  <docTitle><text>{}</text></docTitle>
  <navMap>
{points}  </navMap>
</ncx>"#,
            escape_xml(&self.title)
        )
    }
}

/// A plain ZIP with the given entries, for archives that are not EPUBs.
pub fn zip_with(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let build = || -> ZipResult<Vec<u8>> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let opts: FileOptions<'_, ()> = FileOptions::default();
        for (name, data) in entries {
            zip.start_file(*name, opts)?;
            zip.write_all(data)?;
        }
        Ok(zip.finish()?.into_inner())
    };
    build().expect("in-memory zip write cannot fail")
}

fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
