//! container.xml and OPF package parsing.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader as XmlReader;

use crate::document::{ManifestEntry, Metadata};
use crate::error::ReadError;
use crate::parser::href;

#[derive(Debug, Default)]
pub(crate) struct OpfData {
    pub metadata: Metadata,
    /// Declaration order; hrefs are full archive paths.
    pub manifest: Vec<ManifestEntry>,
    /// Spine idrefs in reading order.
    pub spine: Vec<String>,
    /// NCX manifest id (EPUB2).
    pub toc_id: Option<String>,
    /// NAV document archive path (EPUB3).
    pub nav_href: Option<String>,
}

/// Value of attribute `name` (matched on local name), unescaped when possible.
pub(crate) fn attr(e: &BytesStart, name: &str) -> Option<String> {
    e.attributes()
        .with_checks(false)
        .flatten()
        .find(|a| a.key.local_name().as_ref() == name.as_bytes())
        .map(|a| match a.unescape_value() {
            Ok(v) => v.into_owned(),
            Err(_) => String::from_utf8_lossy(&a.value).into_owned(),
        })
}

pub(crate) fn local_name(e: &BytesStart) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).into_owned()
}

pub(crate) fn find_rootfile(container: &str) -> Result<String, ReadError> {
    let mut reader = XmlReader::from_str(container);
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Empty(ref e)) | Ok(Event::Start(ref e))
                if e.local_name().as_ref() == b"rootfile" =>
            {
                if let Some(path) = attr(e, "full-path").filter(|p| !p.is_empty()) {
                    return Ok(path);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(ReadError::MalformedFile(format!(
                    "Failed to parse container.xml: {e}"
                )));
            }
            _ => {}
        }
        buf.clear();
    }

    Err(ReadError::MissingContent(
        "No rootfile found in container.xml".into(),
    ))
}

pub(crate) fn parse_opf(content: &str, opf_dir: &str) -> Result<OpfData, ReadError> {
    let mut reader = XmlReader::from_str(content);
    let mut buf = Vec::new();

    let mut opf = OpfData::default();
    let mut creators: Vec<String> = Vec::new();
    let mut subjects: Vec<String> = Vec::new();
    let mut cover_item: Option<String> = None;

    let mut in_metadata = false;
    let mut current_element: Option<String> = None;
    let mut current_text = String::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) => {
                let name = local_name(e);
                match name.as_str() {
                    "metadata" => in_metadata = true,
                    "title" | "creator" | "language" | "publisher" | "date" | "description"
                    | "subject" | "identifier" | "rights"
                        if in_metadata =>
                    {
                        current_element = Some(name.clone());
                        current_text.clear();
                    }
                    // <meta name="cover" content="cover-image-id"/>
                    "meta" if in_metadata => {
                        if attr(e, "name").as_deref() == Some("cover") {
                            opf.metadata.cover = attr(e, "content");
                        }
                    }
                    "item" => {
                        let id = attr(e, "id").unwrap_or_default();
                        let raw_href = attr(e, "href").unwrap_or_default();
                        let media_type = attr(e, "media-type").unwrap_or_default();
                        let properties = attr(e, "properties");

                        let full_href = href::resolve(opf_dir, &raw_href);
                        let has_property = |p: &str| {
                            properties
                                .as_deref()
                                .is_some_and(|props| props.split_whitespace().any(|x| x == p))
                        };
                        if has_property("nav") {
                            opf.nav_href = Some(full_href.clone());
                        }
                        if has_property("cover-image") {
                            cover_item = Some(id.clone());
                        }

                        opf.manifest.push(ManifestEntry {
                            id,
                            href: full_href,
                            media_type,
                            properties,
                        });
                    }
                    "spine" => opf.toc_id = attr(e, "toc"),
                    "itemref" => {
                        if let Some(idref) = attr(e, "idref") {
                            opf.spine.push(idref);
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::Text(ref e)) => {
                if current_element.is_some() {
                    match e.unescape() {
                        Ok(t) => current_text.push_str(&t),
                        Err(_) => current_text.push_str(&String::from_utf8_lossy(e)),
                    }
                }
            }
            Ok(Event::CData(ref e)) => {
                if current_element.is_some() {
                    current_text.push_str(&String::from_utf8_lossy(e));
                }
            }
            Ok(Event::End(ref e)) => {
                if e.local_name().as_ref() == b"metadata" {
                    in_metadata = false;
                }

                if let Some(elem) = current_element.take() {
                    let text = current_text.trim().to_string();
                    current_text.clear();
                    if !text.is_empty() {
                        let m = &mut opf.metadata;
                        match elem.as_str() {
                            "title" if m.title.is_empty() => m.title = text,
                            "creator" => creators.push(text),
                            "subject" => subjects.push(text),
                            "language" => m.language = text,
                            "publisher" => m.publisher = text,
                            "date" if m.date.is_empty() => m.date = text,
                            "description" => m.description = text,
                            "rights" => m.rights = text,
                            "identifier" if m.identifier.is_empty() => m.identifier = text,
                            _ => {}
                        }
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(ReadError::MalformedFile(format!("Failed to parse OPF: {e}")));
            }
            _ => {}
        }
        buf.clear();
    }

    opf.metadata.creator = creators.join(", ");
    opf.metadata.subject = subjects.join(", ");
    // EPUB3 marks the cover on the manifest item instead of a <meta>.
    if opf.metadata.cover.is_none() {
        opf.metadata.cover = cover_item;
    }

    Ok(opf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const OPF: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="3.0" unique-identifier="uid">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:title>The Long Road</dc:title>
    <dc:creator>Ana Ruiz</dc:creator>
    <dc:creator>Lee Park</dc:creator>
    <dc:language>vi</dc:language>
    <dc:publisher>Harbor &amp; Sons</dc:publisher>
    <dc:subject>Travel</dc:subject>
    <dc:subject>Memoir</dc:subject>
    <dc:identifier id="uid">urn:isbn:9780000000001</dc:identifier>
    <meta name="cover" content="cover-img"/>
  </metadata>
  <manifest>
    <item id="nav" href="nav.xhtml" media-type="application/xhtml+xml" properties="nav"/>
    <item id="ch1" href="text/ch%201.xhtml" media-type="application/xhtml+xml"/>
    <item id="cover-img" href="images/cover.jpg" media-type="image/jpeg"/>
    <item id="ncx" href="toc.ncx" media-type="application/x-dtbncx+xml"/>
  </manifest>
  <spine toc="ncx">
    <itemref idref="ch1"/>
  </spine>
</package>"#;

    #[test]
    fn finds_rootfile() {
        let container = r#"<?xml version="1.0"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles><rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/></rootfiles>
</container>"#;
        assert_eq!(find_rootfile(container).unwrap(), "OEBPS/content.opf");
    }

    #[test]
    fn container_without_rootfile_is_missing_content() {
        let container = r#"<container><rootfiles/></container>"#;
        assert!(matches!(
            find_rootfile(container),
            Err(ReadError::MissingContent(_))
        ));
    }

    #[test]
    fn parses_metadata_manifest_and_spine() {
        let opf = parse_opf(OPF, "OEBPS/").unwrap();
        let m = &opf.metadata;
        assert_eq!(m.title, "The Long Road");
        assert_eq!(m.creator, "Ana Ruiz, Lee Park");
        assert_eq!(m.language, "vi");
        assert_eq!(m.publisher, "Harbor & Sons");
        assert_eq!(m.subject, "Travel, Memoir");
        assert_eq!(m.identifier, "urn:isbn:9780000000001");
        assert_eq!(m.cover.as_deref(), Some("cover-img"));
        assert_eq!(m.rights, "");

        let hrefs: Vec<&str> = opf.manifest.iter().map(|i| i.href.as_str()).collect();
        assert_eq!(
            hrefs,
            vec![
                "OEBPS/nav.xhtml",
                "OEBPS/text/ch 1.xhtml",
                "OEBPS/images/cover.jpg",
                "OEBPS/toc.ncx"
            ]
        );
        assert_eq!(opf.spine, vec!["ch1".to_string()]);
        assert_eq!(opf.toc_id.as_deref(), Some("ncx"));
        assert_eq!(opf.nav_href.as_deref(), Some("OEBPS/nav.xhtml"));
    }

    #[test]
    fn language_defaults_to_en() {
        let opf = parse_opf(
            r#"<package><metadata><dc:title xmlns:dc="x">T</dc:title></metadata><manifest/><spine/></package>"#,
            "",
        )
        .unwrap();
        assert_eq!(opf.metadata.language, "en");
    }

    #[test]
    fn broken_opf_is_malformed() {
        let err = parse_opf("<package><metadata></package>", "").unwrap_err();
        assert!(matches!(err, ReadError::MalformedFile(_)));
    }
}
