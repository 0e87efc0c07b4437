//! Archive path arithmetic for hrefs found in OPF, NCX, NAV, and XHTML files.

use percent_encoding::percent_decode_str;

/// Directory part of an archive path, including the trailing slash ("" at root).
pub fn parent_dir(path: &str) -> &str {
    path.rfind('/').map(|i| &path[..i + 1]).unwrap_or("")
}

/// Split `a/b.xhtml#frag` into (`a/b.xhtml`, `Some("frag")`).
pub fn split_fragment(href: &str) -> (&str, Option<&str>) {
    match href.split_once('#') {
        Some((path, frag)) => (path, Some(frag)),
        None => (href, None),
    }
}

/// Resolve `href` relative to `base_dir` into a normalized archive path.
/// Percent-escapes are decoded; a fragment, if any, is kept.
pub fn resolve(base_dir: &str, href: &str) -> String {
    let (path, fragment) = split_fragment(href.trim());
    let decoded = percent_decode_str(path).decode_utf8_lossy();

    let joined = match decoded.strip_prefix('/') {
        Some(absolute) => absolute.to_string(),
        None => format!("{base_dir}{decoded}"),
    };

    let mut parts: Vec<&str> = Vec::new();
    for segment in joined.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            s => parts.push(s),
        }
    }

    let mut out = parts.join("/");
    if let Some(frag) = fragment {
        out.push('#');
        out.push_str(frag);
    }
    out
}

/// True for references that never point inside the archive.
pub fn is_external(href: &str) -> bool {
    href.contains("://") || href.starts_with("data:") || href.starts_with("mailto:")
}
