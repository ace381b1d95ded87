//! Integration tests for the report pipeline.
//!
//! These tests validate:
//! - Markdown conversion feeds the renderer the expected HTML
//! - PDF output exists, has a valid format and lands at the configured path
//! - The report stylesheet breaks pages before every `h1` but the first
//! - Headers and footers repeat on every page
//! - Failures surface as the right `ReportError` variant

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use report_forge::fonts::COURIER;
use report_forge::layout_config::{LayoutBox, LayoutConfig, PageGeometry};
use report_forge::markdown;
use report_forge::pipeline::{generate_report, render_html, ReportConfig, REPORT_TITLE};
use report_forge::stylesheet::{FontFace, Stylesheet};
use report_forge::ReportError;
use sha2::{Digest, Sha256};

// =====================================================================
// Helpers
// =====================================================================

/// The report stylesheet without its system font files, so tests run on
/// machines without CJK fonts installed.
fn portable_sheet() -> Stylesheet {
    let mut sheet = Stylesheet::report();
    sheet.font_faces.clear();
    sheet
}

/// A public-domain TTF with Cyrillic glyphs.
fn fixture_font() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/Tuffy.ttf")
}

fn config_in(dir: &Path) -> ReportConfig {
    ReportConfig {
        source: dir.join("docs/report.md"),
        output: dir.join("docs/AI_Memory_Wall_Report.pdf"),
        stylesheet: portable_sheet(),
        ..ReportConfig::default()
    }
}

fn write_source(config: &ReportConfig, markdown: &str) {
    if let Some(parent) = config.source.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&config.source, markdown).unwrap();
}

fn render_markdown(md: &str) -> (Vec<u8>, LayoutConfig) {
    let html = markdown::wrap_document(&markdown::to_html(md).unwrap(), REPORT_TITLE);
    render_html(&html, &portable_sheet(), &PageGeometry::default()).unwrap()
}

fn assert_valid_pdf(bytes: &[u8]) {
    assert!(bytes.len() > 100, "PDF too small: {} bytes", bytes.len());
    assert_eq!(&bytes[0..5], b"%PDF-", "Missing PDF header");
}

fn page_texts(config: &LayoutConfig, page: usize) -> Vec<String> {
    let mut texts = Vec::new();
    config.visit_boxes(&mut |index, b| {
        if index == page {
            if let Some(t) = &b.text {
                texts.extend(t.lines.iter().map(|l| l.text.clone()));
            }
        }
    });
    texts
}

fn find_box<'a>(config: &'a LayoutConfig, pred: &dyn Fn(&LayoutBox) -> bool) -> Option<&'a LayoutBox> {
    let mut found = None;
    config.visit_boxes(&mut |_, b| {
        if found.is_none() && pred(b) {
            found = Some(b);
        }
    });
    found
}

// =====================================================================
// End-to-end
// =====================================================================

#[test]
fn minimal_markdown_produces_pdf_at_output_path() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());
    write_source(&config, "# Title\n\nHello.\n");

    let summary = generate_report(&config).unwrap();

    assert_eq!(summary.output, config.output);
    assert_eq!(summary.pages, 1);
    let bytes = fs::read(&config.output).unwrap();
    assert_eq!(bytes.len(), summary.bytes);
    assert_valid_pdf(&bytes);
}

#[test]
fn existing_output_is_overwritten() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());
    write_source(&config, "# Title\n");
    fs::write(&config.output, b"stale").unwrap();

    generate_report(&config).unwrap();

    assert_valid_pdf(&fs::read(&config.output).unwrap());
}

#[test]
fn missing_source_is_io_error_and_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());

    let err = generate_report(&config).unwrap_err();

    match err {
        ReportError::Io { path, .. } => assert_eq!(path, config.source),
        other => panic!("Expected Io error, got {other:?}"),
    }
    assert!(!config.output.exists());
}

#[test]
fn non_utf8_source_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());
    fs::create_dir_all(config.source.parent().unwrap()).unwrap();
    fs::write(&config.source, [0xff, 0xfe, 0x00, 0x80]).unwrap();

    assert!(matches!(generate_report(&config), Err(ReportError::Io { .. })));
    assert!(!config.output.exists());
}

#[test]
fn missing_font_face_is_render_error() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config_in(dir.path());
    config.stylesheet.font_faces.push(FontFace {
        family: "Noto Sans CJK".to_string(),
        src: dir.path().join("fonts/absent.ttc"),
    });
    write_source(&config, "# Title\n");

    match generate_report(&config) {
        Err(ReportError::Render(msg)) => assert!(msg.contains("Noto Sans CJK"), "{msg}"),
        other => panic!("Expected Render error, got {other:?}"),
    }
    assert!(!config.output.exists());
}

#[test]
fn unparseable_font_face_is_render_error() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config_in(dir.path());
    let font = dir.path().join("broken.ttf");
    fs::write(&font, b"not a font").unwrap();
    config.stylesheet.font_faces.push(FontFace {
        family: "Broken".to_string(),
        src: font,
    });
    write_source(&config, "text\n");

    assert!(matches!(generate_report(&config), Err(ReportError::Render(_))));
}

// =====================================================================
// Markdown constructs
// =====================================================================

#[test]
fn fenced_code_renders_monospace_on_shaded_background() {
    let md = "# Code\n\n```python\nprint('hi')\n    indented\n```\n";
    assert!(markdown::to_html(md).unwrap().contains("<pre><code"));

    let (bytes, config) = render_markdown(md);
    assert_valid_pdf(&bytes);

    let pre = find_box(&config, &|b| {
        b.text
            .as_ref()
            .map(|t| t.lines.iter().any(|l| l.text == "    indented"))
            .unwrap_or(false)
    })
    .expect("code block box");
    let text = pre.text.as_ref().unwrap();
    assert_eq!(text.font_family, COURIER);
    assert_eq!(text.lines[0].text, "print('hi')");
    let bg = pre.background_color.expect("shaded background");
    assert!((bg[0] - 240.0 / 255.0).abs() < 0.01);
}

#[test]
fn inline_code_renders_monospace_on_shaded_background() {
    let (bytes, config) = render_markdown("Run `x` then **stop**.\n");
    assert_valid_pdf(&bytes);

    let line = find_box(&config, &|b| {
        b.text
            .as_ref()
            .map(|t| t.lines.iter().any(|l| l.text == "Run x then stop."))
            .unwrap_or(false)
    })
    .and_then(|b| b.text.as_ref())
    .map(|t| t.lines[0].clone())
    .expect("paragraph line");

    let code = line.runs.iter().find(|r| r.text == "x").expect("code run");
    assert_eq!(code.font_family, COURIER);
    let bg = code.background.expect("shaded code");
    assert!((bg[0] - 240.0 / 255.0).abs() < 0.01);
    assert!(code.inset_x > 0.0);

    let plain = &line.runs[0];
    assert_ne!(plain.font_family, COURIER);
    assert!(plain.background.is_none());

    let strong = line.runs.iter().find(|r| r.text.contains("stop")).expect("strong run");
    assert!(strong.bold);
}

#[test]
fn long_code_block_stays_inside_pages() {
    let mut md = String::from("# Listing\n\n```\n");
    for i in 0..120 {
        md.push_str(&format!("let value_{i} = {i};\n"));
    }
    md.push_str("```\n\nDone.\n");

    let (bytes, config) = render_markdown(&md);
    assert_valid_pdf(&bytes);
    assert!(config.pages.len() >= 2, "got {} pages", config.pages.len());

    let page = PageGeometry::default();
    let bottom = page.height - page.margin_bottom;
    let mut code_lines = Vec::new();
    config.visit_boxes(&mut |_, b| {
        let Some(text) = &b.text else { return };
        for line in &text.lines {
            if line.text.starts_with("let value_") {
                assert!(
                    b.y + line.y_offset + text.line_height <= bottom + 0.01,
                    "{:?} falls below the page bottom",
                    line.text
                );
                code_lines.push(line.text.clone());
            }
        }
    });
    assert_eq!(code_lines.len(), 120);
    assert_eq!(code_lines[0], "let value_0 = 0;");
    assert_eq!(code_lines[119], "let value_119 = 119;");
    assert!(page_texts(&config, config.pages.len() - 1).contains(&"Done.".to_string()));
}

#[test]
fn pipe_table_renders_header_and_cells() {
    let md = "| Name | Value |\n|------|-------|\n| a | 1 |\n| b | 2 |\n";
    let html = markdown::to_html(md).unwrap();
    assert!(html.contains("<table>"));
    assert!(html.contains("<th>"));
    assert!(html.contains("<td>"));

    let (bytes, config) = render_markdown(md);
    assert_valid_pdf(&bytes);
    let texts = page_texts(&config, 0);
    for cell in ["Name", "Value", "a", "1", "b", "2"] {
        assert!(texts.contains(&cell.to_string()), "missing cell {cell}");
    }
    let header = find_box(&config, &|b| {
        b.background_color.is_some() && b.border.is_some()
    })
    .expect("shaded header cell");
    assert!(header.width > 100.0);
}

#[test]
fn cyrillic_text_is_laid_out() {
    let (bytes, config) = render_markdown("# Отчет о проекте\n\nТекст.\n");
    assert_valid_pdf(&bytes);
    let texts = page_texts(&config, 0);
    assert!(texts.contains(&"Отчет о проекте".to_string()));
    assert!(texts.contains(&"Текст.".to_string()));
}

#[test]
fn lists_carry_markers() {
    let (_, config) = render_markdown("1. first\n2. second\n\n- bullet\n");
    let mut markers = Vec::new();
    config.visit_boxes(&mut |_, b| {
        if let Some(m) = b.text.as_ref().and_then(|t| t.list_marker.clone()) {
            markers.push(m);
        }
    });
    assert_eq!(markers, vec!["1. ", "2. ", "\u{2022} "]);
}

#[test]
fn cyrillic_header_uses_embedded_font_face() {
    let mut sheet = Stylesheet::report();
    sheet.font_faces = vec![FontFace {
        family: "Noto Sans CJK".to_string(),
        src: fixture_font(),
    }];
    let html = markdown::wrap_document(
        &markdown::to_html("# Отчет\n\nТекст.\n").unwrap(),
        REPORT_TITLE,
    );

    let (bytes, config) = render_html(&html, &sheet, &PageGeometry::default()).unwrap();
    assert_valid_pdf(&bytes);

    let page = PageGeometry::default();
    let header = config.pages[0]
        .boxes
        .iter()
        .find(|b| b.y < page.margin_top && b.text.is_some())
        .and_then(|b| b.text.as_ref())
        .expect("header box");
    assert_eq!(header.lines[0].text, REPORT_TITLE);
    assert_eq!(header.font_family, "Noto Sans CJK");
    assert!(header.lines[0]
        .runs
        .iter()
        .all(|r| r.font_family == "Noto Sans CJK"));

    // Body text resolves to the loaded face too.
    let body = find_box(&config, &|b| {
        b.text
            .as_ref()
            .map(|t| t.lines.iter().any(|l| l.text == "Текст."))
            .unwrap_or(false)
    })
    .expect("body text");
    assert_eq!(body.text.as_ref().unwrap().font_family, "Noto Sans CJK");
}

// =====================================================================
// Pagination, headers and footers
// =====================================================================

#[test]
fn stylesheet_css_declares_h1_page_breaks() {
    let css = Stylesheet::report().to_css();
    assert!(css.contains("h1 {"));
    assert!(css.contains("page-break-before: always;"));
    assert!(css.contains("h1:first-of-type {\n    page-break-before: avoid;"));
}

#[test]
fn each_top_level_heading_starts_a_page() {
    let md = "# One\n\n## Sub\n\n### Subsub\n\ntext\n\n# Two\n\ntext\n\n# Three\n\ntext\n";
    let (_, config) = render_markdown(md);
    assert_eq!(config.pages.len(), 3);
    assert!(page_texts(&config, 0).contains(&"One".to_string()));
    assert!(page_texts(&config, 1).contains(&"Two".to_string()));
    assert!(page_texts(&config, 2).contains(&"Three".to_string()));
}

#[test]
fn every_page_has_header_and_numbered_footer() {
    let mut md = String::from("# Intro\n\n");
    for i in 0..120 {
        md.push_str(&format!("Paragraph {i} of the report body.\n\n"));
    }
    md.push_str("# Appendix\n\nEnd.\n");

    let (_, config) = render_markdown(&md);
    assert!(config.pages.len() >= 3, "got {} pages", config.pages.len());

    let page = PageGeometry::default();
    for i in 0..config.pages.len() {
        let boxes = &config.pages[i].boxes;
        let header = boxes
            .iter()
            .find(|b| b.y < page.margin_top && b.text.is_some())
            .expect("header box");
        assert_eq!(header.text.as_ref().unwrap().lines[0].text, REPORT_TITLE);

        let footer = boxes
            .iter()
            .find(|b| b.y > page.height - page.margin_bottom && b.text.is_some())
            .expect("footer box");
        assert_eq!(footer.text.as_ref().unwrap().lines[0].text, (i + 1).to_string());
    }
}

#[test]
fn content_stays_inside_page_margins() {
    let mut md = String::new();
    for i in 0..200 {
        md.push_str(&format!("- item {i}\n"));
    }
    let (_, config) = render_markdown(&md);
    let page = PageGeometry::default();
    for p in &config.pages {
        for b in &p.boxes {
            assert!(b.x >= 0.0 && b.x + b.width <= page.width + 0.01);
        }
    }
    assert!(config.pages.len() > 1);
}

// =====================================================================
// Command line
// =====================================================================

#[test]
fn command_line_arguments_are_ignored() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("docs")).unwrap();
    fs::write(dir.path().join("docs/report.md"), "# Title\n").unwrap();

    let run = |args: &[&str]| {
        Command::new(env!("CARGO_BIN_EXE_report-forge"))
            .args(args)
            .current_dir(dir.path())
            .output()
            .unwrap()
    };
    let plain = run(&[]);
    let with_args = run(&["--help", "extra"]);

    assert_eq!(plain.status.success(), with_args.status.success());
    assert_eq!(plain.stdout, with_args.stdout);
    assert!(!String::from_utf8_lossy(&with_args.stderr).contains("Usage"));
}

// =====================================================================
// Stability
// =====================================================================

#[test]
fn output_is_stable_across_runs() {
    let md = "# Title\n\nSome *text* and `code`.\n\n| a | b |\n|---|---|\n| 1 | 2 |\n";
    let (bytes1, layout1) = render_markdown(md);
    let (bytes2, layout2) = render_markdown(md);

    let hash = |s: &str| Sha256::digest(s.as_bytes()).to_vec();
    assert_eq!(hash(&layout1.to_json()), hash(&layout2.to_json()));

    // printpdf writes per-run document metadata, so compare sizes only.
    let diff = (bytes1.len() as i64 - bytes2.len() as i64).unsigned_abs();
    assert!(
        diff < 200,
        "PDF outputs differ significantly: {} vs {} bytes",
        bytes1.len(),
        bytes2.len()
    );
}

#[test]
fn layout_config_json_roundtrip_renders() {
    let (_, config) = render_markdown("# Title\n\nBody.\n");
    let parsed = LayoutConfig::from_json(&config.to_json()).unwrap();
    assert_eq!(parsed.pages.len(), config.pages.len());
    assert_eq!(parsed.title, REPORT_TITLE);
}

#[test]
fn stylesheet_json_roundtrip() {
    let sheet = Stylesheet::report();
    let parsed = Stylesheet::from_json(&sheet.to_json()).unwrap();
    assert_eq!(parsed, sheet);
    assert!(matches!(
        Stylesheet::from_json("{not json"),
        Err(ReportError::Render(_))
    ));
}
