//! Font loading and text measurement using `ttf-parser`.
//!
//! The three PDF base families (Helvetica, Times, Courier) are always
//! available with synthetic metrics. `@font-face` files are loaded from disk
//! by path; their glyph advances feed Taffy with accurate intrinsic sizes and
//! their bytes are embedded by the renderer.

use std::collections::HashMap;
use std::fs;

use crate::error::{ReportError, Result};
use crate::stylesheet::FontFace;

/// Builtin family names.
pub const HELVETICA: &str = "Helvetica";
pub const TIMES: &str = "Times";
pub const COURIER: &str = "Courier";

/// A loaded font face with metrics.
#[derive(Clone)]
pub struct FontData {
    /// Raw font bytes (kept alive for ttf-parser's zero-copy API). Empty for
    /// builtin families.
    pub bytes: Vec<u8>,
    pub units_per_em: f32,
    pub ascender: f32,
    pub descender: f32,
    pub line_gap: f32,
}

impl FontData {
    fn builtin() -> Self {
        Self {
            bytes: Vec::new(),
            units_per_em: 1000.0,
            ascender: 750.0,
            descender: -250.0,
            line_gap: 0.0,
        }
    }
}

/// Manages loaded fonts.
pub struct FontManager {
    fonts: HashMap<FontKey, FontData>,
    /// Fallback when a key is not loaded.
    default_key: FontKey,
}

#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct FontKey {
    pub family: String,
    pub bold: bool,
    pub italic: bool,
}

impl FontKey {
    pub fn new(family: &str, bold: bool, italic: bool) -> Self {
        Self {
            family: family.to_string(),
            bold,
            italic,
        }
    }
}

/// Map a CSS generic family to a builtin family.
fn generic_family(name: &str) -> Option<&'static str> {
    match name.to_ascii_lowercase().as_str() {
        "sans-serif" | "system-ui" | "helvetica" | "arial" => Some(HELVETICA),
        "serif" | "times" | "times new roman" => Some(TIMES),
        "monospace" | "courier" | "courier new" => Some(COURIER),
        _ => None,
    }
}

impl FontManager {
    pub fn new() -> Self {
        Self {
            fonts: HashMap::new(),
            default_key: FontKey::new(HELVETICA, false, false),
        }
    }

    /// Load a TTF/OTF (or the first face of a TTC) from bytes.
    pub fn load_font(&mut self, family: &str, bold: bool, italic: bool, bytes: Vec<u8>) -> Result<()> {
        let face = ttf_parser::Face::parse(&bytes, 0)
            .map_err(|e| ReportError::Render(format!("failed to parse font '{family}': {e}")))?;

        let data = FontData {
            units_per_em: face.units_per_em() as f32,
            ascender: face.ascender() as f32,
            descender: face.descender() as f32,
            line_gap: face.line_gap() as f32,
            bytes,
        };

        self.fonts.insert(FontKey::new(family, bold, italic), data);
        Ok(())
    }

    /// Load every `@font-face` of a stylesheet from its path on disk.
    ///
    /// A face whose file is missing or unparseable is an error: the
    /// stylesheet asked for it by name.
    pub fn load_font_faces(&mut self, faces: &[FontFace]) -> Result<()> {
        for face in faces {
            let bytes = fs::read(&face.src).map_err(|e| {
                ReportError::Render(format!(
                    "cannot resolve font '{}' at '{}': {e}",
                    face.family,
                    face.src.display()
                ))
            })?;
            log::debug!(
                "Loaded font '{}' from {} ({} bytes)",
                face.family,
                face.src.display(),
                bytes.len()
            );
            self.load_font(&face.family, false, false, bytes)?;
        }
        Ok(())
    }

    /// Register the builtin families with synthetic Helvetica-like metrics.
    pub fn ensure_default(&mut self) {
        for family in [HELVETICA, TIMES, COURIER] {
            for bold in [false, true] {
                for italic in [false, true] {
                    self.fonts
                        .entry(FontKey::new(family, bold, italic))
                        .or_insert_with(FontData::builtin);
                }
            }
        }
    }

    pub fn has_family(&self, family: &str) -> bool {
        self.fonts.keys().any(|k| k.family == family)
    }

    /// Pick the first available family of a CSS `font-family` list.
    pub fn resolve_stack(&self, stack: &str) -> String {
        for name in stack.split(',') {
            let name = name.trim().trim_matches(|c| c == '\'' || c == '"').trim();
            if name.is_empty() {
                continue;
            }
            if self.has_family(name) {
                return name.to_string();
            }
            if let Some(builtin) = generic_family(name) {
                return builtin.to_string();
            }
        }
        self.default_key.family.clone()
    }

    /// Get font data for a key, falling back to the regular face of the same
    /// family and then to the default.
    pub fn get(&self, key: &FontKey) -> &FontData {
        if let Some(data) = self.fonts.get(key) {
            return data;
        }
        let regular = FontKey::new(&key.family, false, false);
        if let Some(data) = self.fonts.get(&regular) {
            return data;
        }
        self.fonts.get(&self.default_key).unwrap_or(&BUILTIN_METRICS)
    }

    /// Measure the width of a string at a given font size (in pt).
    /// With real font bytes we sum glyph advances. Builtin families use an
    /// average character width: 0.5 em proportional, 0.6 em for Courier.
    pub fn measure_text_width(&self, text: &str, font_size: f32, bold: bool, italic: bool, family: &str) -> f32 {
        let data = self.get(&FontKey::new(family, bold, italic));

        if data.bytes.is_empty() {
            let avg = if family == COURIER {
                0.6
            } else if bold {
                0.55
            } else {
                0.5
            };
            return text.chars().count() as f32 * font_size * avg;
        }

        // Parse the font and sum horizontal advances
        if let Ok(face) = ttf_parser::Face::parse(&data.bytes, 0) {
            let scale = font_size / data.units_per_em;
            let mut width = 0.0f32;
            for ch in text.chars() {
                if let Some(gid) = face.glyph_index(ch) {
                    let advance = face.glyph_hor_advance(gid).unwrap_or(0);
                    width += advance as f32 * scale;
                } else {
                    // Fallback for missing glyph
                    width += font_size * 0.5;
                }
            }
            width
        } else {
            text.chars().count() as f32 * font_size * 0.5
        }
    }

    /// Measure the line height in pt.
    pub fn line_height_px(&self, font_size: f32, line_height_factor: f32) -> f32 {
        font_size * line_height_factor
    }

    /// Loaded fonts that carry real bytes, in a stable order.
    pub fn embedded_fonts(&self) -> Vec<(&FontKey, &[u8])> {
        let mut fonts: Vec<_> = self
            .fonts
            .iter()
            .filter(|(_, d)| !d.bytes.is_empty())
            .map(|(k, d)| (k, d.bytes.as_slice()))
            .collect();
        fonts.sort_by(|a, b| a.0.cmp(b.0));
        fonts
    }
}

static BUILTIN_METRICS: FontData = FontData {
    bytes: Vec::new(),
    units_per_em: 1000.0,
    ascender: 750.0,
    descender: -250.0,
    line_gap: 0.0,
};

impl Default for FontManager {
    fn default() -> Self {
        let mut mgr = Self::new();
        mgr.ensure_default();
        mgr
    }
}

/// Slack allowed when comparing summed glyph advances against a line width,
/// so a run that fits exactly is not broken by float rounding.
pub const WIDTH_EPSILON: f32 = 0.01;

/// Word-wrap text to fit within `max_width` points. Returns a vec of lines.
pub fn wrap_text(
    text: &str,
    font_size: f32,
    bold: bool,
    italic: bool,
    family: &str,
    max_width: f32,
    fonts: &FontManager,
) -> Vec<String> {
    if max_width <= 0.0 || text.is_empty() {
        return vec![text.to_string()];
    }

    let mut lines: Vec<String> = Vec::new();
    // Split on existing newlines first
    for paragraph in text.split('\n') {
        let words: Vec<&str> = paragraph.split_whitespace().collect();
        if words.is_empty() {
            lines.push(String::new());
            continue;
        }

        let mut current_line = String::new();
        for word in &words {
            let candidate = if current_line.is_empty() {
                word.to_string()
            } else {
                format!("{} {}", current_line, word)
            };
            let w = fonts.measure_text_width(&candidate, font_size, bold, italic, family);
            if w > max_width + WIDTH_EPSILON && !current_line.is_empty() {
                lines.push(current_line);
                current_line = word.to_string();
            } else {
                current_line = candidate;
            }
        }
        if !current_line.is_empty() {
            lines.push(current_line);
        }
    }

    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}

/// Wrap preformatted text: source line breaks and indentation are kept, and
/// only lines wider than `max_width` are broken, character by character.
pub fn wrap_preformatted(
    text: &str,
    font_size: f32,
    bold: bool,
    italic: bool,
    family: &str,
    max_width: f32,
    fonts: &FontManager,
) -> Vec<String> {
    let mut lines = Vec::new();
    for source_line in text.split('\n') {
        let source_line = source_line.trim_end_matches('\r').replace('\t', "    ");
        if max_width <= 0.0
            || fonts.measure_text_width(&source_line, font_size, bold, italic, family)
                <= max_width + WIDTH_EPSILON
        {
            lines.push(source_line);
            continue;
        }
        let mut current = String::new();
        for ch in source_line.chars() {
            current.push(ch);
            let w = fonts.measure_text_width(&current, font_size, bold, italic, family);
            if w > max_width + WIDTH_EPSILON && current.chars().count() > 1 {
                current.pop();
                lines.push(std::mem::take(&mut current));
                current.push(ch);
            }
        }
        if !current.is_empty() {
            lines.push(current);
        }
    }
    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn heuristic_text_width() {
        let mgr = FontManager::default();
        let w = mgr.measure_text_width("Hello", 16.0, false, false, HELVETICA);
        // 5 chars × 16 × 0.5 = 40
        assert!((w - 40.0).abs() < 0.1);
        let mono = mgr.measure_text_width("Hello", 10.0, false, false, COURIER);
        assert!((mono - 30.0).abs() < 0.1);
    }

    #[test]
    fn word_wrap_basic() {
        let mgr = FontManager::default();
        let lines = wrap_text("Hello world foo bar", 16.0, false, false, HELVETICA, 60.0, &mgr);
        assert!(lines.len() >= 2, "Expected wrapping, got {:?}", lines);
    }

    #[test]
    fn preformatted_keeps_indentation() {
        let mgr = FontManager::default();
        let lines = wrap_preformatted("fn a() {\n    b();\n}", 10.0, false, false, COURIER, 500.0, &mgr);
        assert_eq!(lines, vec!["fn a() {", "    b();", "}"]);
    }

    #[test]
    fn preformatted_breaks_long_lines() {
        let mgr = FontManager::default();
        // 6 pt per char at 10 pt Courier → 10 chars per 60 pt.
        let lines = wrap_preformatted(&"x".repeat(25), 10.0, false, false, COURIER, 60.0, &mgr);
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0].len(), 10);
        assert_eq!(lines[2].len(), 5);
    }

    #[test]
    fn words_filling_the_line_exactly_stay_together() {
        let mgr = FontManager::default();
        // "aaaa bbbb" is 9 chars × 6 pt = 54 pt at 10 pt Courier.
        let lines = wrap_text("aaaa bbbb", 10.0, false, false, COURIER, 54.0, &mgr);
        assert_eq!(lines, vec!["aaaa bbbb"]);
    }

    #[test]
    fn stack_resolution_skips_missing_families() {
        let mgr = FontManager::default();
        assert_eq!(mgr.resolve_stack("'Noto Sans CJK', 'WenQuanYi Zen Hei', sans-serif"), HELVETICA);
        assert_eq!(mgr.resolve_stack("monospace"), COURIER);
        assert_eq!(mgr.resolve_stack("\"Unknown\""), HELVETICA);
    }

    #[test]
    fn missing_font_face_is_render_error() {
        let mut mgr = FontManager::default();
        let faces = [FontFace {
            family: "Nope".to_string(),
            src: PathBuf::from("/definitely/not/here/font.ttf"),
        }];
        let err = mgr.load_font_faces(&faces).unwrap_err();
        assert!(matches!(err, ReportError::Render(_)));
        assert!(err.to_string().contains("Nope"));
    }

    #[test]
    fn garbage_font_bytes_are_rejected() {
        let mut mgr = FontManager::default();
        let err = mgr.load_font("Bad", false, false, b"not a font".to_vec()).unwrap_err();
        assert!(matches!(err, ReportError::Render(_)));
        assert!(!mgr.has_family("Bad"));
    }
}
