//! Layout config – the intermediate representation between layout computation
//! and PDF rendering. This is the "frozen" structure that encodes exactly what
//! goes on each page.

use serde::{Deserialize, Serialize};

use crate::error::{ReportError, Result};

/// Default page margin: the CSS UA value of 75px.
pub const DEFAULT_PAGE_MARGIN_PT: f32 = 56.25;

/// Physical page size and margins, in points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageGeometry {
    pub width: f32,
    pub height: f32,
    pub margin_top: f32,
    pub margin_right: f32,
    pub margin_bottom: f32,
    pub margin_left: f32,
}

impl PageGeometry {
    /// A4 portrait with the same margin on every side.
    pub fn a4(margin: f32) -> Self {
        Self {
            // A4: 210mm × 297mm = 595.28 × 841.89 points
            width: 595.28,
            height: 841.89,
            margin_top: margin,
            margin_right: margin,
            margin_bottom: margin,
            margin_left: margin,
        }
    }

    pub fn content_width(&self) -> f32 {
        self.width - self.margin_left - self.margin_right
    }

    pub fn content_height(&self) -> f32 {
        self.height - self.margin_top - self.margin_bottom
    }
}

impl Default for PageGeometry {
    fn default() -> Self {
        Self::a4(DEFAULT_PAGE_MARGIN_PT)
    }
}

/// A complete document layout ready for rendering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutConfig {
    /// Document title embedded in the PDF metadata.
    #[serde(default = "LayoutConfig::default_title")]
    pub title: String,
    /// Width of each page in PDF points (1 pt = 1/72 inch).
    pub page_width_pt: f32,
    /// Height of each page in PDF points.
    pub page_height_pt: f32,
    /// Ordered list of pages.
    pub pages: Vec<PageLayout>,
}

/// One page of content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageLayout {
    pub page_index: usize,
    pub boxes: Vec<LayoutBox>,
}

/// A positioned rectangle with optional content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutBox {
    /// Position relative to page top-left, in points.
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,

    /// Visual styling
    pub background_color: Option<[f32; 4]>,
    pub border: Option<BorderStyle>,

    /// Content (mutually exclusive in practice)
    pub text: Option<TextContent>,
    pub image: Option<ImageContent>,

    /// Children (nested boxes)
    pub children: Vec<LayoutBox>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BorderStyle {
    pub width: f32,
    pub color: [f32; 4],
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextContent {
    /// Pre-wrapped lines of text.
    pub lines: Vec<TextLine>,
    /// Resolved family: a builtin (Helvetica, Times, Courier) or an
    /// embedded `@font-face` family.
    pub font_family: String,
    pub font_size: f32,
    pub bold: bool,
    pub italic: bool,
    pub color: [f32; 4],
    pub line_height: f32,
    pub underline: bool,
    #[serde(default)]
    pub strikethrough: bool,
    /// List bullet/number prefix (e.g. "• " or "1. ")
    pub list_marker: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextLine {
    /// The whole line, concatenated from its runs.
    pub text: String,
    /// X offset within the layout box (padding plus alignment)
    pub x_offset: f32,
    /// Y offset from the top of the layout box
    pub y_offset: f32,
    /// Measured width of the line, in points.
    #[serde(default)]
    pub width: f32,
    /// Styled pieces of the line, left to right. A line without runs is
    /// drawn as `text` in the style of its [`TextContent`].
    #[serde(default)]
    pub runs: Vec<TextRun>,
}

/// A piece of a line drawn in one font, e.g. inline `code` or `strong`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextRun {
    pub text: String,
    /// X offset from the start of the line.
    pub x_offset: f32,
    /// Advance of the run, padding included.
    pub width: f32,
    pub font_family: String,
    pub font_size: f32,
    pub bold: bool,
    pub italic: bool,
    pub color: [f32; 4],
    /// Shading behind the run (inline `code`).
    #[serde(default)]
    pub background: Option<[f32; 4]>,
    /// Padding between the shading and the glyphs.
    #[serde(default)]
    pub inset_x: f32,
    #[serde(default)]
    pub inset_y: f32,
    #[serde(default)]
    pub underline: bool,
    #[serde(default)]
    pub strikethrough: bool,
}

impl TextRun {
    /// A run covering a whole line in the style of its text box.
    pub fn plain(style: &TextContent, text: &str, width: f32) -> Self {
        Self {
            text: text.to_string(),
            x_offset: 0.0,
            width,
            font_family: style.font_family.clone(),
            font_size: style.font_size,
            bold: style.bold,
            italic: style.italic,
            color: style.color,
            background: None,
            inset_x: 0.0,
            inset_y: 0.0,
            underline: style.underline,
            strikethrough: style.strikethrough,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageContent {
    pub src: String,
    pub width: f32,
    pub height: f32,
}

impl LayoutConfig {
    /// An empty layout for the given page size.
    pub fn for_page(geometry: &PageGeometry) -> Self {
        Self {
            title: Self::default_title(),
            page_width_pt: geometry.width,
            page_height_pt: geometry.height,
            pages: Vec::new(),
        }
    }

    fn default_title() -> String {
        "report".to_string()
    }

    /// Serialise to JSON.
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }

    /// Deserialise from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| ReportError::Render(format!("invalid layout config: {e}")))
    }

    /// Depth-first visit of every box on every page.
    pub fn visit_boxes<'a>(&'a self, f: &mut dyn FnMut(usize, &'a LayoutBox)) {
        fn walk<'a>(page: usize, lbox: &'a LayoutBox, f: &mut dyn FnMut(usize, &'a LayoutBox)) {
            f(page, lbox);
            for child in &lbox.children {
                walk(page, child, f);
            }
        }
        for page in &self.pages {
            for lbox in &page.boxes {
                walk(page.page_index, lbox, f);
            }
        }
    }
}

impl LayoutBox {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
            background_color: None,
            border: None,
            text: None,
            image: None,
            children: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a4_content_area() {
        let g = PageGeometry::a4(50.0);
        assert!((g.content_width() - 495.28).abs() < 0.01);
        assert!((g.content_height() - 741.89).abs() < 0.01);
    }

    #[test]
    fn json_roundtrip_keeps_text() {
        let mut config = LayoutConfig::for_page(&PageGeometry::default());
        let mut lbox = LayoutBox::new(10.0, 20.0, 100.0, 14.0);
        lbox.text = Some(TextContent {
            lines: vec![TextLine {
                text: "Привет".to_string(),
                x_offset: 0.0,
                y_offset: 0.0,
                width: 30.0,
                runs: Vec::new(),
            }],
            font_family: "Helvetica".to_string(),
            font_size: 9.0,
            bold: false,
            italic: false,
            color: [0.0, 0.0, 0.0, 1.0],
            line_height: 13.5,
            underline: false,
            strikethrough: false,
            list_marker: None,
        });
        config.pages.push(PageLayout {
            page_index: 0,
            boxes: vec![lbox],
        });

        let parsed = LayoutConfig::from_json(&config.to_json()).unwrap();
        let mut texts = Vec::new();
        parsed.visit_boxes(&mut |_, b| {
            if let Some(t) = &b.text {
                texts.push(t.lines[0].text.clone());
            }
        });
        assert_eq!(texts, vec!["Привет"]);
    }

    #[test]
    fn runs_default_when_absent() {
        let json = r#"{"text":"a","x_offset":0.0,"y_offset":0.0}"#;
        let line: TextLine = serde_json::from_str(json).unwrap();
        assert!(line.runs.is_empty());
        assert_eq!(line.width, 0.0);
    }
}
