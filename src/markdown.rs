//! Markdown conversion with comrak, plus the HTML document shell the
//! renderer consumes.
//!
//! Tables are enabled on top of CommonMark (which already covers fenced
//! code). Raw HTML in the source is passed through unchanged.

use std::fs;
use std::path::Path;

use base64::{engine::general_purpose::STANDARD as BASE64_STD, Engine as _};
use comrak::{format_html, parse_document, Arena, Options};

use crate::error::{ReportError, Result};

fn options() -> Options<'static> {
    let mut options = Options::default();
    options.extension.table = true;
    options.render.unsafe_ = true;
    options
}

/// Convert Markdown to an HTML fragment.
pub fn to_html(markdown: &str) -> Result<String> {
    let options = options();
    let arena = Arena::new();
    let root = parse_document(&arena, markdown, &options);

    let mut out = Vec::with_capacity(markdown.len() * 2);
    format_html(root, &options, &mut out)
        .map_err(|e| ReportError::Conversion(format!("HTML writer failed: {e}")))?;
    String::from_utf8(out)
        .map_err(|e| ReportError::Conversion(format!("HTML writer produced invalid UTF-8: {e}")))
}

/// MIME type of an image file, by extension.
fn image_mime(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        "bmp" => Some("image/bmp"),
        _ => None,
    }
}

fn is_local(url: &str) -> bool {
    !(url.is_empty()
        || url.starts_with("data:")
        || url.starts_with('#')
        || url.contains("://"))
}

/// Load a local image as a base64 data URI.
fn data_uri(base_dir: &Path, url: &str) -> Option<String> {
    let path = base_dir.join(url);
    let Some(mime) = image_mime(&path) else {
        log::warn!("Not inlining image {}: unknown image type", path.display());
        return None;
    };
    match fs::read(&path) {
        Ok(bytes) => {
            log::debug!("Inlined image {} ({} bytes)", path.display(), bytes.len());
            Some(format!("data:{mime};base64,{}", BASE64_STD.encode(bytes)))
        }
        Err(e) => {
            log::warn!("Cannot read image {}: {e}", path.display());
            None
        }
    }
}

/// Rewrite relative `<img src="…">` references to base64 data URIs, resolving
/// them against `base_dir`. Remote, data and unreadable images are left as
/// they are.
pub fn inline_local_images(html: &str, base_dir: &Path) -> String {
    const ATTR: &str = "src=\"";

    let mut result = String::with_capacity(html.len());
    let mut pos = 0;

    while let Some(found) = html[pos..].find("<img ") {
        let tag_start = pos + found;
        let tag_end = html[tag_start..]
            .find('>')
            .map(|p| tag_start + p)
            .unwrap_or(html.len());

        let Some(attr_start) = html[tag_start..tag_end]
            .find(ATTR)
            .map(|p| tag_start + p + ATTR.len())
        else {
            result.push_str(&html[pos..tag_end]);
            pos = tag_end;
            continue;
        };
        let Some(attr_end) = html[attr_start..tag_end].find('"').map(|p| attr_start + p) else {
            result.push_str(&html[pos..tag_end]);
            pos = tag_end;
            continue;
        };

        result.push_str(&html[pos..attr_start]);
        let url = &html[attr_start..attr_end];
        match is_local(url).then(|| data_uri(base_dir, url)).flatten() {
            Some(uri) => result.push_str(&uri),
            None => result.push_str(url),
        }
        pos = attr_end;
    }

    result.push_str(&html[pos..]);
    result
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

/// Wrap an HTML fragment in a complete UTF-8 document with a `<title>`.
pub fn wrap_document(fragment: &str, title: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n    <meta charset=\"UTF-8\">\n    <title>{}</title>\n</head>\n<body>\n{}\n</body>\n</html>\n",
        escape_html(title),
        fragment
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fenced_code_becomes_pre_code() {
        let html = to_html("```rust\nfn main() {}\n```\n").unwrap();
        assert!(html.contains("<pre><code"), "got {html}");
        assert!(html.contains("fn main() {}"));
    }

    #[test]
    fn pipe_table_becomes_table() {
        let html = to_html("| A | B |\n|---|---|\n| 1 | 2 |\n").unwrap();
        assert!(html.contains("<table>"));
        assert!(html.contains("<th>A</th>"));
        assert!(html.contains("<td>1</td>"));
    }

    #[test]
    fn raw_html_passes_through() {
        let html = to_html("<div class=\"note\">kept</div>\n").unwrap();
        assert!(html.contains("<div class=\"note\">kept</div>"));
    }

    #[test]
    fn cyrillic_text_survives() {
        let html = to_html("# Отчет\n").unwrap();
        assert_eq!(html.trim(), "<h1>Отчет</h1>");
    }

    #[test]
    fn wrap_document_escapes_title() {
        let doc = wrap_document("<p>x</p>", "A & B");
        assert!(doc.contains("<title>A &amp; B</title>"));
        assert!(doc.contains("<body>\n<p>x</p>\n</body>"));
    }

    #[test]
    fn local_images_are_inlined() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("pic.png"), b"not really a png").unwrap();

        let html = "<p><img src=\"pic.png\" alt=\"p\" /><img src=\"https://x.org/a.png\" /></p>";
        let out = inline_local_images(html, dir.path());
        assert!(out.contains("src=\"data:image/png;base64,"));
        assert!(out.contains("src=\"https://x.org/a.png\""));
        assert!(out.ends_with("</p>"));
    }

    #[test]
    fn missing_images_are_left_alone() {
        let dir = tempfile::tempdir().unwrap();
        let html = "<img src=\"missing.png\" />";
        assert_eq!(inline_local_images(html, dir.path()), html);
    }
}
