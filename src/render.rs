//! PDF renderer – takes a [`LayoutConfig`] and produces PDF bytes using
//! `printpdf` (v0.8 ops-based API).
//!
//! Families loaded from `@font-face` files are embedded and written as
//! Unicode text. The builtin families fall back to the PDF base-14 fonts
//! with WinAnsi encoding.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use base64::{engine::general_purpose::STANDARD as BASE64_STD, Engine as _};
use printpdf::*;

use crate::error::{ReportError, Result};
use crate::fonts::{FontKey, FontManager, COURIER, TIMES};
use crate::layout_config::*;

const PT_TO_MM: f32 = 0.352778;

/// Left gutter between a list marker and its item, in points.
const MARKER_GUTTER: f32 = 12.0;

/// A printpdf XObject together with the pixel dimensions of the source image.
struct ImageResource {
    xobj_id: XObjectId,
    px_width: u32,
    px_height: u32,
}

/// The PDF font a text run is written with.
#[derive(Clone)]
enum PdfFont {
    Builtin(BuiltinFont),
    Embedded(FontId),
}

/// Resources shared by every page of one document.
struct Resources<'a> {
    fonts: &'a FontManager,
    embedded: BTreeMap<String, FontId>,
    images: HashMap<String, ImageResource>,
}

impl Resources<'_> {
    fn font_for(&self, family: &str, bold: bool, italic: bool) -> PdfFont {
        if let Some(id) = self.embedded.get(family) {
            return PdfFont::Embedded(id.clone());
        }
        PdfFont::Builtin(builtin_font(family, bold, italic))
    }

    /// Distance from the top of a line box to the baseline.
    fn ascent(&self, run: &TextRun, line_height: f32) -> f32 {
        let data = self
            .fonts
            .get(&FontKey::new(&run.font_family, run.bold, run.italic));
        let glyph_ascent = run.font_size * data.ascender / data.units_per_em;
        // Half-leading above the glyphs, as CSS centres text in its line box.
        let leading = (line_height - run.font_size).max(0.0) / 2.0;
        leading + glyph_ascent
    }
}

fn builtin_font(family: &str, bold: bool, italic: bool) -> BuiltinFont {
    match (family, bold, italic) {
        (TIMES, true, true) => BuiltinFont::TimesBoldItalic,
        (TIMES, true, false) => BuiltinFont::TimesBold,
        (TIMES, false, true) => BuiltinFont::TimesItalic,
        (TIMES, false, false) => BuiltinFont::TimesRoman,
        (COURIER, true, true) => BuiltinFont::CourierBoldOblique,
        (COURIER, true, false) => BuiltinFont::CourierBold,
        (COURIER, false, true) => BuiltinFont::CourierOblique,
        (COURIER, false, false) => BuiltinFont::Courier,
        (_, true, true) => BuiltinFont::HelveticaBoldOblique,
        (_, true, false) => BuiltinFont::HelveticaBold,
        (_, false, true) => BuiltinFont::HelveticaOblique,
        (_, false, false) => BuiltinFont::Helvetica,
    }
}

/// Render a LayoutConfig into PDF bytes.
///
/// `<img>` elements whose `src` is not a base64 data URI, or whose bytes
/// cannot be decoded, are skipped with a `log::warn`. A loaded font that
/// printpdf cannot parse is an error.
pub fn render_pdf(config: &LayoutConfig, fonts: &FontManager) -> Result<Vec<u8>> {
    let page_w = Mm(config.page_width_pt * PT_TO_MM);
    let page_h = Mm(config.page_height_pt * PT_TO_MM);

    let mut doc = PdfDocument::new(&config.title);

    let embedded = embed_fonts(&mut doc, fonts)?;
    let images = register_images(&mut doc, config);
    let resources = Resources {
        fonts,
        embedded,
        images,
    };

    let mut pages = Vec::new();
    for page_layout in &config.pages {
        let mut ops = Vec::new();
        for lbox in &page_layout.boxes {
            render_box(&mut ops, lbox, config.page_height_pt, &resources);
        }
        pages.push(PdfPage::new(page_w, page_h, ops));
    }

    // Ensure at least one page.
    if pages.is_empty() {
        pages.push(PdfPage::new(page_w, page_h, Vec::new()));
    }

    doc.with_pages(pages);
    let bytes = doc.save(&PdfSaveOptions::default(), &mut Vec::new());
    log::debug!("Rendered {} pages, {} bytes", config.pages.len(), bytes.len());

    Ok(bytes)
}

/// Register every loaded font file with the document, keyed by family.
fn embed_fonts(doc: &mut PdfDocument, fonts: &FontManager) -> Result<BTreeMap<String, FontId>> {
    let mut embedded = BTreeMap::new();
    for (key, bytes) in fonts.embedded_fonts() {
        if embedded.contains_key(&key.family) {
            continue;
        }
        let mut warnings = Vec::new();
        let parsed = ParsedFont::from_bytes(bytes, 0, &mut warnings).ok_or_else(|| {
            ReportError::Render(format!("cannot embed font '{}'", key.family))
        })?;
        log::debug!("Embedding font '{}'", key.family);
        embedded.insert(key.family.clone(), doc.add_font(&parsed));
    }
    Ok(embedded)
}

/// Decode every distinct image once and register it as an XObject.
fn register_images(doc: &mut PdfDocument, config: &LayoutConfig) -> HashMap<String, ImageResource> {
    let mut all_srcs: BTreeSet<&str> = BTreeSet::new();
    config.visit_boxes(&mut |_, lbox| {
        if let Some(img) = &lbox.image {
            all_srcs.insert(img.src.as_str());
        }
    });

    let mut resources = HashMap::new();
    let mut img_warnings = Vec::new();

    for src in all_srcs {
        let bytes = match parse_data_uri(src) {
            Ok(b) => b,
            Err(e) => {
                log::warn!("Skipping image: {e}");
                continue;
            }
        };

        let dyn_img = match ::image::load_from_memory(&bytes) {
            Ok(img) => img,
            Err(e) => {
                log::warn!("Skipping image: decode error: {e}");
                continue;
            }
        };

        let raw = match RawImage::decode_from_bytes(&bytes, &mut img_warnings) {
            Ok(r) => r,
            Err(e) => {
                log::warn!("Skipping image: PDF encode error: {e}");
                continue;
            }
        };

        resources.insert(
            src.to_string(),
            ImageResource {
                xobj_id: doc.add_image(&raw),
                px_width: dyn_img.width(),
                px_height: dyn_img.height(),
            },
        );
    }
    resources
}

/// Convert a UTF-8 string to raw Windows-1252 bytes then wrap in a String so
/// printpdf writes the bytes unchanged into the PDF stream (builtin fonts use
/// WinAnsiEncoding, so each glyph is one byte 0x00–0xFF).
fn to_winlatin(s: &str) -> String {
    let bytes: Vec<u8> = s
        .chars()
        .map(|c| match c {
            '\u{20AC}' => 0x80,
            '\u{2026}' => 0x85,
            '\u{2018}' => 0x91,
            '\u{2019}' => 0x92,
            '\u{201C}' => 0x93,
            '\u{201D}' => 0x94,
            '\u{2022}' => 0x95,
            '\u{2013}' => 0x96,
            '\u{2014}' => 0x97,
            '\u{00A0}' => 0x20,
            c if (c as u32) < 256 => c as u8,
            _ => b'?',
        })
        .collect();
    // SAFETY: intentionally non-UTF-8 for 0x80-0x9F range; printpdf passes
    // these bytes straight to the PDF stream, decoded by WinAnsiEncoding.
    #[allow(unsafe_code)]
    unsafe {
        String::from_utf8_unchecked(bytes)
    }
}

/// Parse a `data:<mime>;base64,<data>` URI and return the raw decoded bytes.
fn parse_data_uri(src: &str) -> std::result::Result<Vec<u8>, String> {
    let Some(rest) = src.strip_prefix("data:") else {
        let preview: String = src.chars().take(80).collect();
        return Err(format!("not a data URI: {preview:?}"));
    };
    let (header, data) = rest
        .split_once(',')
        .ok_or_else(|| "invalid data URI: missing `,`".to_string())?;
    if !header.contains(";base64") {
        return Err("only base64 data URIs are supported".to_string());
    }
    BASE64_STD
        .decode(data.trim())
        .map_err(|e| format!("base64 decode error: {e}"))
}

fn rgb(c: &[f32; 4]) -> Color {
    Color::Rgb(Rgb {
        r: c[0],
        g: c[1],
        b: c[2],
        icc_profile: None,
    })
}

fn point(x: f32, y: f32) -> LinePoint {
    LinePoint {
        p: Point { x: Pt(x), y: Pt(y) },
        bezier: false,
    }
}

/// Corners of a rectangle in PDF space, counter-clockwise from bottom-left.
fn rect_points(x: f32, bottom: f32, width: f32, height: f32) -> Vec<LinePoint> {
    vec![
        point(x, bottom),
        point(x + width, bottom),
        point(x + width, bottom + height),
        point(x, bottom + height),
    ]
}

fn stroke_line(ops: &mut Vec<Op>, from: (f32, f32), to: (f32, f32), width: f32, color: &[f32; 4]) {
    ops.push(Op::SetOutlineThickness { pt: Pt(width) });
    ops.push(Op::SetOutlineColor { col: rgb(color) });
    ops.push(Op::DrawLine {
        line: Line {
            points: vec![point(from.0, from.1), point(to.0, to.1)],
            is_closed: false,
        },
    });
}

fn fill_rect(ops: &mut Vec<Op>, x: f32, bottom: f32, width: f32, height: f32, color: &[f32; 4]) {
    ops.push(Op::SetFillColor { col: rgb(color) });
    ops.push(Op::DrawPolygon {
        polygon: Polygon {
            rings: vec![PolygonRing {
                points: rect_points(x, bottom, width, height),
            }],
            mode: PaintMode::Fill,
            winding_order: WindingOrder::NonZero,
        },
    });
}

fn write_text(ops: &mut Vec<Op>, font: &PdfFont, x: f32, y: f32, run: &TextRun) {
    ops.push(Op::StartTextSection);
    ops.push(Op::SetTextCursor {
        pos: Point { x: Pt(x), y: Pt(y) },
    });
    ops.push(Op::SetFillColor {
        col: rgb(&run.color),
    });
    match font {
        PdfFont::Builtin(font) => {
            ops.push(Op::SetFontSizeBuiltinFont {
                size: Pt(run.font_size),
                font: *font,
            });
            ops.push(Op::WriteTextBuiltinFont {
                items: vec![TextItem::Text(to_winlatin(&run.text))],
                font: *font,
            });
        }
        PdfFont::Embedded(id) => {
            ops.push(Op::SetFontSize {
                size: Pt(run.font_size),
                font: id.clone(),
            });
            ops.push(Op::WriteText {
                items: vec![TextItem::Text(run.text.clone())],
                font: id.clone(),
            });
        }
    }
    ops.push(Op::EndTextSection);
}

/// Draw one run of a line whose box starts at `line_x` and whose line box
/// top is `line_top` (PDF space).
fn render_run(
    ops: &mut Vec<Op>,
    run: &TextRun,
    line_x: f32,
    line_top: f32,
    line_height: f32,
    res: &Resources<'_>,
) {
    let x = line_x + run.x_offset;

    if let Some(bg) = &run.background {
        let height = run.font_size * 1.2 + 2.0 * run.inset_y;
        let bottom = line_top - (line_height + height) / 2.0;
        fill_rect(ops, x, bottom, run.width, height, bg);
    }

    let font = res.font_for(&run.font_family, run.bold, run.italic);
    let baseline = line_top - res.ascent(run, line_height);
    let text_x = x + run.inset_x;
    write_text(ops, &font, text_x, baseline, run);

    if run.underline || run.strikethrough {
        let width = res.fonts.measure_text_width(
            &run.text,
            run.font_size,
            run.bold,
            run.italic,
            &run.font_family,
        );
        if run.underline {
            let y = baseline - run.font_size * 0.1;
            stroke_line(ops, (text_x, y), (text_x + width, y), 0.5, &run.color);
        }
        if run.strikethrough {
            let y = baseline + run.font_size * 0.3;
            stroke_line(ops, (text_x, y), (text_x + width, y), 0.5, &run.color);
        }
    }
}

/// Recursively render a LayoutBox and its children into PDF ops.
fn render_box(ops: &mut Vec<Op>, lbox: &LayoutBox, page_height: f32, res: &Resources<'_>) {
    // PDF origin is bottom-left; layout origin is top-left.
    let top = page_height - lbox.y;
    let bottom = top - lbox.height;

    if let Some(bg) = &lbox.background_color {
        fill_rect(ops, lbox.x, bottom, lbox.width, lbox.height, bg);
    }

    if let Some(border) = &lbox.border {
        ops.push(Op::SetOutlineColor {
            col: rgb(&border.color),
        });
        ops.push(Op::SetOutlineThickness {
            pt: Pt(border.width),
        });
        ops.push(Op::DrawLine {
            line: Line {
                points: rect_points(lbox.x, bottom, lbox.width, lbox.height),
                is_closed: true,
            },
        });
    }

    if let Some(text) = &lbox.text {
        for tline in &text.lines {
            let x = lbox.x + tline.x_offset;
            let line_top = top - tline.y_offset;
            if tline.runs.is_empty() {
                if !tline.text.is_empty() {
                    let run = TextRun::plain(text, &tline.text, tline.width);
                    render_run(ops, &run, x, line_top, text.line_height, res);
                }
                continue;
            }
            for run in &tline.runs {
                render_run(ops, run, x, line_top, text.line_height, res);
            }
        }

        if let Some(marker) = &text.list_marker {
            let width = res.fonts.measure_text_width(
                marker,
                text.font_size,
                text.bold,
                text.italic,
                &text.font_family,
            );
            let mut run = TextRun::plain(text, marker, width);
            run.underline = false;
            run.strikethrough = false;
            let x = lbox.x - width.max(MARKER_GUTTER);
            render_run(ops, &run, x, top, text.line_height, res);
        }
    }

    if let Some(img) = &lbox.image {
        if let Some(img_res) = res.images.get(&img.src) {
            // At dpi=72 printpdf renders 1 px = 1 pt, so
            // scale = desired_pt / px_dim.
            let scale = |pt: f32, px: u32| if px > 0 { pt / px as f32 } else { 1.0 };
            ops.push(Op::UseXobject {
                id: img_res.xobj_id.clone(),
                transform: XObjectTransform {
                    translate_x: Some(Pt(lbox.x)),
                    translate_y: Some(Pt(top - img.height)),
                    dpi: Some(72.0),
                    scale_x: Some(scale(img.width, img_res.px_width)),
                    scale_y: Some(scale(img.height, img_res.px_height)),
                    rotate: None,
                },
            });
        }
    }

    for child in &lbox.children {
        render_box(ops, child, page_height, res);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_box(text: &str) -> LayoutBox {
        let mut lbox = LayoutBox::new(50.0, 60.0, 200.0, 14.0);
        lbox.text = Some(TextContent {
            lines: vec![TextLine {
                text: text.to_string(),
                x_offset: 0.0,
                y_offset: 0.0,
                width: 40.0,
                runs: Vec::new(),
            }],
            font_family: "Helvetica".to_string(),
            font_size: 10.0,
            bold: false,
            italic: false,
            color: [0.0, 0.0, 0.0, 1.0],
            line_height: 14.0,
            underline: true,
            strikethrough: false,
            list_marker: None,
        });
        lbox
    }

    #[test]
    fn render_empty_page() {
        let config = LayoutConfig::for_page(&PageGeometry::default());
        let bytes = render_pdf(&config, &FontManager::default()).unwrap();
        assert!(bytes.len() > 100, "PDF should have content");
        assert_eq!(&bytes[0..5], b"%PDF-");
    }

    #[test]
    fn render_text_page() {
        let mut config = LayoutConfig::for_page(&PageGeometry::default());
        config.pages.push(PageLayout {
            page_index: 0,
            boxes: vec![text_box("Hello")],
        });
        let bytes = render_pdf(&config, &FontManager::default()).unwrap();
        assert_eq!(&bytes[0..5], b"%PDF-");
    }

    #[test]
    fn render_shaded_run() {
        let mut lbox = text_box("call f()");
        let text = lbox.text.as_mut().unwrap();
        let mut plain = TextRun::plain(text, "call ", 25.0);
        plain.underline = false;
        let mut code = TextRun::plain(text, "f()", 24.0);
        code.x_offset = 25.0;
        code.font_family = COURIER.to_string();
        code.background = Some([0.94, 0.94, 0.94, 1.0]);
        code.inset_x = 3.0;
        code.inset_y = 1.5;
        text.lines[0].runs = vec![plain, code];

        let mut config = LayoutConfig::for_page(&PageGeometry::default());
        config.pages.push(PageLayout {
            page_index: 0,
            boxes: vec![lbox],
        });
        let bytes = render_pdf(&config, &FontManager::default()).unwrap();
        assert_eq!(&bytes[0..5], b"%PDF-");
    }

    fn fixture_font() -> Vec<u8> {
        std::fs::read(concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/Tuffy.ttf")).unwrap()
    }

    #[test]
    fn loaded_family_is_written_with_embedded_font() {
        let mut fonts = FontManager::default();
        fonts.load_font("Tuffy", false, false, fixture_font()).unwrap();

        let mut doc = PdfDocument::new("fonts");
        let embedded = embed_fonts(&mut doc, &fonts).unwrap();
        assert_eq!(embedded.len(), 1);
        assert!(embedded.contains_key("Tuffy"));

        let res = Resources {
            fonts: &fonts,
            embedded,
            images: HashMap::new(),
        };
        assert!(matches!(res.font_for("Tuffy", true, false), PdfFont::Embedded(_)));
        assert!(matches!(
            res.font_for(COURIER, false, false),
            PdfFont::Builtin(BuiltinFont::Courier)
        ));
    }

    #[test]
    fn cyrillic_text_renders_with_embedded_font() {
        let mut fonts = FontManager::default();
        fonts.load_font("Tuffy", false, false, fixture_font()).unwrap();

        let mut lbox = text_box("Отчет о проекте");
        lbox.text.as_mut().unwrap().font_family = "Tuffy".to_string();
        let mut config = LayoutConfig::for_page(&PageGeometry::default());
        config.pages.push(PageLayout {
            page_index: 0,
            boxes: vec![lbox],
        });
        let bytes = render_pdf(&config, &fonts).unwrap();
        assert_eq!(&bytes[0..5], b"%PDF-");
    }

    #[test]
    fn non_data_image_is_skipped() {
        let mut config = LayoutConfig::for_page(&PageGeometry::default());
        let mut lbox = LayoutBox::new(0.0, 0.0, 10.0, 10.0);
        lbox.image = Some(ImageContent {
            src: "diagram.png".to_string(),
            width: 10.0,
            height: 10.0,
        });
        config.pages.push(PageLayout {
            page_index: 0,
            boxes: vec![lbox],
        });
        assert!(render_pdf(&config, &FontManager::default()).is_ok());
    }

    #[test]
    fn builtin_font_follows_family() {
        assert!(matches!(builtin_font(COURIER, false, false), BuiltinFont::Courier));
        assert!(matches!(builtin_font(TIMES, true, true), BuiltinFont::TimesBoldItalic));
        assert!(matches!(builtin_font("Unknown", true, false), BuiltinFont::HelveticaBold));
    }

    #[test]
    fn data_uri_requires_base64() {
        assert!(parse_data_uri("data:image/png,raw").is_err());
        assert_eq!(parse_data_uri("data:text/plain;base64,aGk=").unwrap(), b"hi");
    }
}
