//! Table of contents: EPUB3 NAV document first, EPUB2 NCX as fallback.
//! Both produce a flat, depth-first list where `level` is the nesting depth.

use quick_xml::events::Event;
use quick_xml::Reader as XmlReader;
use scraper::{ElementRef, Html, Selector};

use crate::parser::href;
use crate::parser::opf::{attr, local_name};

/// A navigation point before manifest ids are attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct TocPoint {
    /// The point's own id (`navPoint@id`, `li@id` or `a@id`).
    pub id: Option<String>,
    pub title: String,
    /// Full archive path, fragment kept.
    pub href: String,
    pub level: u32,
}

/// Parse an EPUB3 navigation document located at `nav_path`.
/// Returns `None` when it has no usable `<nav>`/`<ol>`.
pub(crate) fn parse_nav_document(content: &str, nav_path: &str) -> Option<Vec<TocPoint>> {
    let document = Html::parse_document(content);
    let base_dir = href::parent_dir(nav_path);

    let nav_selector = Selector::parse("nav").ok()?;
    let navs: Vec<ElementRef> = document.select(&nav_selector).collect();
    let is_toc = |nav: &ElementRef| {
        nav.value()
            .attr("epub:type")
            .is_some_and(|t| t.split_whitespace().any(|x| x == "toc"))
            || nav.value().attr("role") == Some("doc-toc")
    };
    let nav = navs
        .iter()
        .find(|n| is_toc(n))
        .or_else(|| navs.first())
        .copied()?;

    let ol = child_elements(nav)
        .find(|e| e.value().name() == "ol")
        .or_else(|| {
            let sel = Selector::parse("ol").ok()?;
            nav.select(&sel).next()
        })?;

    let mut points = Vec::new();
    walk_nav_ol(ol, 1, base_dir, &mut points);
    Some(points)
}

fn child_elements<'a>(el: ElementRef<'a>) -> impl Iterator<Item = ElementRef<'a>> {
    el.children().filter_map(ElementRef::wrap)
}

fn walk_nav_ol(ol: ElementRef, level: u32, base_dir: &str, out: &mut Vec<TocPoint>) {
    for li in child_elements(ol).filter(|e| e.value().name() == "li") {
        let label = child_elements(li).find(|e| matches!(e.value().name(), "a" | "span"));
        if let Some(label) = label {
            let title = label
                .text()
                .collect::<String>()
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ");
            let target = label
                .value()
                .attr("href")
                .map(|h| href::resolve(base_dir, h))
                .unwrap_or_default();
            let id = li
                .value()
                .attr("id")
                .or_else(|| label.value().attr("id"))
                .map(String::from);

            if !title.is_empty() || !target.is_empty() {
                out.push(TocPoint {
                    id,
                    title,
                    href: target,
                    level,
                });
            }
        }

        if let Some(nested) = child_elements(li).find(|e| e.value().name() == "ol") {
            walk_nav_ol(nested, level + 1, base_dir, out);
        }
    }
}

/// Parse an EPUB2 NCX located at `ncx_path`.
pub(crate) fn parse_ncx(content: &str, ncx_path: &str) -> Vec<TocPoint> {
    let base_dir = href::parent_dir(ncx_path);
    let mut reader = XmlReader::from_str(content);
    let mut buf = Vec::new();

    let mut points: Vec<TocPoint> = Vec::new();
    // Indices into `points` of the currently open navPoints.
    let mut open: Vec<usize> = Vec::new();
    let mut in_label = false;
    let mut in_text = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match local_name(e).as_str() {
                "navPoint" => {
                    points.push(TocPoint {
                        id: attr(e, "id"),
                        title: String::new(),
                        href: String::new(),
                        level: open.len() as u32 + 1,
                    });
                    open.push(points.len() - 1);
                }
                "navLabel" => in_label = true,
                "text" if in_label => in_text = true,
                "content" => set_src(e, &open, &mut points, base_dir),
                _ => {}
            },
            Ok(Event::Empty(ref e)) => {
                if e.local_name().as_ref() == b"content" {
                    set_src(e, &open, &mut points, base_dir);
                }
            }
            Ok(Event::Text(ref e)) => {
                if in_text {
                    if let Some(&i) = open.last() {
                        let text = e
                            .unescape()
                            .map(|t| t.into_owned())
                            .unwrap_or_else(|_| String::from_utf8_lossy(e).into_owned());
                        points[i].title.push_str(&text);
                    }
                }
            }
            Ok(Event::End(ref e)) => match e.local_name().as_ref() {
                b"text" => in_text = false,
                b"navLabel" => in_label = false,
                b"navPoint" => {
                    if let Some(i) = open.pop() {
                        points[i].title = points[i].title.trim().to_string();
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => {
                tracing::warn!("Stopping NCX parse at malformed XML: {}", e);
                break;
            }
            _ => {}
        }
        buf.clear();
    }

    points
}

fn set_src(
    e: &quick_xml::events::BytesStart,
    open: &[usize],
    points: &mut [TocPoint],
    base_dir: &str,
) {
    if let (Some(&i), Some(src)) = (open.last(), attr(e, "src")) {
        if points[i].href.is_empty() {
            points[i].href = href::resolve(base_dir, &src);
        }
    }
}
