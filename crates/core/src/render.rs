//! Chapter XHTML → embeddable HTML fragment.
//!
//! Keeps the inner markup of `<body>`, drops scripts, styles, comments and
//! inline event handlers, and points image/link references at the resource
//! routes (`<root><manifest id>/<archive path>`).

use std::borrow::Cow;

use quick_xml::events::{BytesStart, Event};
use quick_xml::{Reader as XmlReader, Writer as XmlWriter};

use crate::config::RenderConfig;
use crate::document::EpubDocument;
use crate::error::ReadError;
use crate::parser::href;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderOptions {
    pub image_root: String,
    pub link_root: String,
}

impl Default for RenderOptions {
    fn default() -> Self {
        RenderConfig::default().into()
    }
}

impl From<RenderConfig> for RenderOptions {
    fn from(cfg: RenderConfig) -> Self {
        Self {
            image_root: cfg.image_root,
            link_root: cfg.link_root,
        }
    }
}

/// Render the chapter stored at `chapter_href` (full archive path).
pub fn render_chapter(
    xhtml: &str,
    chapter_href: &str,
    doc: &EpubDocument,
    opts: &RenderOptions,
) -> Result<String, ReadError> {
    let chapter_dir = href::parent_dir(chapter_href);
    let has_body = xhtml.contains("<body");

    let mut reader = XmlReader::from_str(xhtml);
    // Chapters served as text/html are not always well-formed.
    reader.config_mut().check_end_names = false;
    let mut writer = XmlWriter::new(Vec::new());

    let mut in_body = false;
    let mut skip_depth = 0usize;

    let fail = |e: &dyn std::fmt::Display| {
        ReadError::MalformedFile(format!("Failed to render {chapter_href}: {e}"))
    };

    loop {
        let event = reader.read_event().map_err(|e| fail(&e))?;
        let emitting = !has_body || in_body;
        match event {
            Event::Eof => break,
            Event::Start(e) => {
                if skip_depth > 0 {
                    skip_depth += 1;
                    continue;
                }
                let name = tag_name(&e);
                if is_stripped(&name) {
                    skip_depth = 1;
                } else if name == "body" {
                    in_body = true;
                } else if emitting {
                    let tag = rewrite_tag(&e, &name, chapter_dir, doc, opts);
                    writer.write_event(Event::Start(tag)).map_err(|e| fail(&e))?;
                }
            }
            Event::Empty(e) => {
                let name = tag_name(&e);
                if skip_depth > 0 || is_stripped(&name) || !emitting {
                    continue;
                }
                let tag = rewrite_tag(&e, &name, chapter_dir, doc, opts);
                writer.write_event(Event::Empty(tag)).map_err(|e| fail(&e))?;
            }
            Event::End(e) => {
                if skip_depth > 0 {
                    skip_depth -= 1;
                    continue;
                }
                if e.local_name().as_ref().eq_ignore_ascii_case(b"body") {
                    in_body = false;
                } else if emitting {
                    writer.write_event(Event::End(e)).map_err(|e| fail(&e))?;
                }
            }
            Event::Comment(_) | Event::Decl(_) | Event::PI(_) | Event::DocType(_) => {}
            other => {
                if skip_depth == 0 && emitting {
                    writer.write_event(other).map_err(|e| fail(&e))?;
                }
            }
        }
    }

    let html = String::from_utf8(writer.into_inner()).map_err(|e| fail(&e))?;
    Ok(html.trim().to_string())
}

fn tag_name(e: &BytesStart) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).to_ascii_lowercase()
}

fn is_stripped(name: &str) -> bool {
    matches!(name, "script" | "style")
}

fn rewrite_tag(
    e: &BytesStart,
    name: &str,
    chapter_dir: &str,
    doc: &EpubDocument,
    opts: &RenderOptions,
) -> BytesStart<'static> {
    let qname = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    let mut out = BytesStart::new(qname);

    for attr in e.attributes().with_checks(false).flatten() {
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let local = String::from_utf8_lossy(attr.key.local_name().as_ref()).to_ascii_lowercase();
        if local.starts_with("on") {
            continue;
        }
        let value: Cow<str> = match attr.unescape_value() {
            Ok(v) => v,
            Err(_) => String::from_utf8_lossy(&attr.value).into_owned().into(),
        };

        let rewritten = match (name, local.as_str()) {
            ("img", "src") | ("image", "href") => {
                resource_url(&value, chapter_dir, doc, &opts.image_root, false)
            }
            ("a", "href") => resource_url(&value, chapter_dir, doc, &opts.link_root, true),
            _ => None,
        };
        let value = rewritten.map(Cow::Owned).unwrap_or(value);
        out.push_attribute((key.as_str(), value.as_ref()));
    }
    out
}

/// `<root><id>/<path>[#fragment]` for references to manifest entries.
fn resource_url(
    target: &str,
    chapter_dir: &str,
    doc: &EpubDocument,
    root: &str,
    keep_fragment: bool,
) -> Option<String> {
    if target.is_empty() || target.starts_with('#') || href::is_external(target) {
        return None;
    }
    let resolved = href::resolve(chapter_dir, target);
    let (path, fragment) = href::split_fragment(&resolved);
    let entry = doc.manifest_by_href(path)?;

    let mut url = format!("{root}{}/{}", entry.id, entry.href);
    if let (true, Some(frag)) = (keep_fragment, fragment) {
        url.push('#');
        url.push_str(frag);
    }
    Some(url)
}
