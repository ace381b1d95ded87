//! Pipeline – ties together conversion, parsing, styling, layout,
//! pagination and rendering.
//!
//! [`generate_report`] is the whole job: Markdown file in, PDF file out.
//! [`render_html`] is the HTML + stylesheet → PDF stage on its own.

use std::fs;
use std::path::{Path, PathBuf};

use crate::dom::{body_children, document_title, find_element, parse_html, ElementNode, Tag};
use crate::error::{ReportError, Result};
use crate::fonts::FontManager;
use crate::layout::compute_layout;
use crate::layout_config::{LayoutConfig, PageGeometry, DEFAULT_PAGE_MARGIN_PT};
use crate::markdown;
use crate::pagination::{apply_margin_boxes, paginate};
use crate::render::render_pdf;
use crate::style::{build_styled_tree, parse_length, resolve_style, DEFAULT_FONT_SIZE};
use crate::stylesheet::Stylesheet;

/// Title of the project report, used for the document and its page header.
pub const REPORT_TITLE: &str = "AI Memory Wall - Отчет о проекте";

/// Markdown source, relative to the working directory.
pub const SOURCE_PATH: &str = "docs/report.md";

/// PDF destination, relative to the working directory.
pub const OUTPUT_PATH: &str = "docs/AI_Memory_Wall_Report.pdf";

/// Configuration for one report run.
#[derive(Debug, Clone)]
pub struct ReportConfig {
    /// Markdown source file.
    pub source: PathBuf,
    /// PDF file to create or overwrite.
    pub output: PathBuf,
    /// Document `<title>`, also the PDF metadata title.
    pub title: String,
    pub stylesheet: Stylesheet,
    pub page: PageGeometry,
}

impl Default for ReportConfig {
    fn default() -> Self {
        let stylesheet = Stylesheet::report();
        Self {
            source: PathBuf::from(SOURCE_PATH),
            output: PathBuf::from(OUTPUT_PATH),
            title: REPORT_TITLE.to_string(),
            page: page_geometry(&stylesheet),
            stylesheet,
        }
    }
}

/// What a successful run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportSummary {
    pub output: PathBuf,
    pub bytes: usize,
    pub pages: usize,
}

/// A4 portrait with the stylesheet's `@page` margin, or the default margin.
pub fn page_geometry(sheet: &Stylesheet) -> PageGeometry {
    let margin = sheet
        .page
        .margin
        .as_deref()
        .and_then(|m| parse_length(m, DEFAULT_FONT_SIZE))
        .unwrap_or(DEFAULT_PAGE_MARGIN_PT);
    PageGeometry::a4(margin)
}

/// Build the paginated layout of an HTML document, loading the stylesheet's
/// fonts into `fonts`.
pub fn compute_layout_config(
    html: &str,
    sheet: &Stylesheet,
    page: &PageGeometry,
    fonts: &mut FontManager,
) -> Result<LayoutConfig> {
    // 1. Parse HTML
    let dom = parse_html(html);

    // 2. Fonts
    fonts.ensure_default();
    fonts.load_font_faces(&sheet.font_faces)?;

    // 3. Style; the body rule cascades into the content.
    let fallback_body = ElementNode::new(Tag::Body);
    let body = find_element(&dom, &Tag::Body).unwrap_or(&fallback_body);
    let body_style = resolve_style(body, None, sheet, true);
    let styled = build_styled_tree(&body_children(&dom), Some(&body_style), sheet);

    // 4. Layout and pagination
    let boxes = compute_layout(&styled, &body_style, page, fonts)?;
    let mut layout_config = paginate(&boxes, page, fonts);
    apply_margin_boxes(&mut layout_config, &sheet.page.margin_boxes, page, fonts);

    if let Some(title) = document_title(&dom) {
        layout_config.title = title;
    }
    Ok(layout_config)
}

/// Render an HTML document with a stylesheet into PDF bytes.
///
/// Returns `(pdf_bytes, layout_config)`.
pub fn render_html(
    html: &str,
    sheet: &Stylesheet,
    page: &PageGeometry,
) -> Result<(Vec<u8>, LayoutConfig)> {
    let mut fonts = FontManager::new();
    let layout_config = compute_layout_config(html, sheet, page, &mut fonts)?;
    let pdf_bytes = render_pdf(&layout_config, &fonts)?;
    Ok((pdf_bytes, layout_config))
}

/// The complete HTML document for a Markdown source.
pub fn markdown_document(source_text: &str, base_dir: &Path, title: &str) -> Result<String> {
    let fragment = markdown::to_html(source_text)?;
    let fragment = markdown::inline_local_images(&fragment, base_dir);
    Ok(markdown::wrap_document(&fragment, title))
}

/// Write `bytes` next to `path` and rename into place, so a failed write
/// never leaves a truncated file at `path`.
fn write_atomically(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| ReportError::io(parent, e))?;
    }

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "report.pdf".to_string());
    let tmp = path.with_file_name(format!(".{file_name}.tmp"));

    fs::write(&tmp, bytes).map_err(|e| ReportError::io(&tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        ReportError::io(path, e)
    })
}

/// Convert the Markdown source to a styled PDF at the output path.
pub fn generate_report(config: &ReportConfig) -> Result<ReportSummary> {
    log::info!("Reading {}", config.source.display());
    let source_text =
        fs::read_to_string(&config.source).map_err(|e| ReportError::io(&config.source, e))?;

    let base_dir = config
        .source
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let html = markdown_document(&source_text, base_dir, &config.title)?;
    log::debug!("Converted Markdown to {} bytes of HTML", html.len());

    let (pdf_bytes, layout_config) = render_html(&html, &config.stylesheet, &config.page)?;
    write_atomically(&config.output, &pdf_bytes)?;
    log::info!(
        "Wrote {} ({} pages, {} bytes)",
        config.output.display(),
        layout_config.pages.len(),
        pdf_bytes.len()
    );

    Ok(ReportSummary {
        output: config.output.clone(),
        bytes: pdf_bytes.len(),
        pages: layout_config.pages.len(),
    })
}
